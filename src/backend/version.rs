//! Backend version detection and payload adaptation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BackendVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"1.2.3"`, `"v1.2"` or `"1.2.3-beta.1"`. Missing parts are zero.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches(['v', 'V']);
        let core = raw.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for BackendVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for BackendVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BackendVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BackendVersion::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid version: {}", raw)))
    }
}

/// Result of a version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedVersion {
    Known(BackendVersion),
    /// The backend answered but did not report a usable version.
    Unknown,
}

impl DetectedVersion {
    pub fn known(&self) -> Option<BackendVersion> {
        match self {
            DetectedVersion::Known(v) => Some(*v),
            DetectedVersion::Unknown => None,
        }
    }
}

/// A request body field that older backends reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGate {
    /// Dotted path into the JSON body, e.g. `settings.callerPolicy`.
    pub path: String,
    pub min_version: BackendVersion,
}

impl FieldGate {
    pub fn new(path: impl Into<String>, min_version: BackendVersion) -> Self {
        Self {
            path: path.into(),
            min_version,
        }
    }
}

/// Gates applied when no configuration overrides them.
pub fn default_field_gates() -> Vec<FieldGate> {
    vec![
        FieldGate::new("settings.callerPolicy", BackendVersion::new(1, 0, 0)),
        FieldGate::new("settings.executionOrder", BackendVersion::new(1, 0, 0)),
        FieldGate::new("settings.timeSavedPerExecution", BackendVersion::new(1, 90, 0)),
    ]
}

/// Remove from `body` every gated field the detected backend does not support.
/// With an unknown version every gated field is removed. Returns the paths
/// that were stripped.
pub fn adapt_payload(body: &mut Value, version: DetectedVersion, gates: &[FieldGate]) -> Vec<String> {
    let mut stripped = Vec::new();
    for gate in gates {
        let supported = matches!(version, DetectedVersion::Known(v) if v >= gate.min_version);
        if !supported && remove_path(body, &gate.path) {
            stripped.push(gate.path.clone());
        }
    }
    stripped
}

fn remove_path(body: &mut Value, path: &str) -> bool {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return false;
    };
    let mut cursor = body;
    for segment in segments {
        match cursor.get_mut(segment) {
            Some(next) => cursor = next,
            None => return false,
        }
    }
    cursor
        .as_object_mut()
        .map_or(false, |object| object.remove(last).is_some())
}

/// Versions detected per (base URL, key fingerprint).
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: Mutex<HashMap<(String, String), DetectedVersion>>,
}

impl VersionCache {
    pub fn get(&self, base_url: &str, fingerprint: &str) -> Option<DetectedVersion> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(base_url.to_string(), fingerprint.to_string()))
            .copied()
    }

    pub fn insert(&self, base_url: &str, fingerprint: &str, version: DetectedVersion) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((base_url.to_string(), fingerprint.to_string()), version);
    }

    /// Drop every cached version for `base_url`. Returns how many were dropped.
    pub fn forget(&self, base_url: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(url, _), _| url != base_url);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
