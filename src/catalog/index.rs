//! Copy-on-refresh index shared by nodes and templates.
//!
//! Readers clone an `Arc<Snapshot>` under a short read lock and then work on
//! an immutable snapshot. A refresh computes its diff and builds the next
//! snapshot without holding that lock; only the final pointer swap takes the
//! write side. Refreshes are serialized by a separate mutex.

use super::search::{check_limit, compare_hits, MatchText, MatchTier, NormalizedQuery};
use super::validation::ValidationError;
use crate::error::{BridgeError, BridgeResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_INCREMENTAL_THRESHOLD: usize = 100;

/// Something that can live in a [`CatalogIndex`].
pub trait Indexed:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Filter: Send + Sync;

    /// Human name of the entity, used in errors ("node", "template").
    const ENTITY: &'static str;
    /// JSON field holding the key, used to attribute decode failures.
    const KEY_FIELD: &'static str;

    fn key(&self) -> &str;
    fn display_name(&self) -> &str;
    fn category(&self) -> &str;
    fn match_text(&self) -> MatchText;
    fn matches(&self, filter: &Self::Filter) -> bool;
    fn validate(&self) -> Result<(), ValidationError>;

    /// Keys of other catalog entries this entry points at.
    fn references(&self) -> &[String] {
        &[]
    }
}

struct Slot<T> {
    entry: Arc<T>,
    text: MatchText,
    sort_name: String,
}

impl<T: Indexed> Slot<T> {
    fn new(entry: T) -> Self {
        Self {
            text: entry.match_text(),
            sort_name: entry.display_name().to_lowercase(),
            entry: Arc::new(entry),
        }
    }
}

/// Immutable view of the index at one generation.
pub struct Snapshot<T> {
    entries: HashMap<String, Arc<Slot<T>>>,
    by_category: BTreeMap<String, BTreeSet<String>>,
    by_reference: HashMap<String, BTreeSet<String>>,
    generation: u64,
}

impl<T: Indexed> Snapshot<T> {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            by_category: BTreeMap::new(),
            by_reference: HashMap::new(),
            generation: 0,
        }
    }

    fn build(slots: impl IntoIterator<Item = Arc<Slot<T>>>, generation: u64) -> Self {
        let mut snapshot = Self {
            generation,
            ..Self::empty()
        };
        for slot in slots {
            snapshot.insert(slot);
        }
        snapshot
    }

    fn insert(&mut self, slot: Arc<Slot<T>>) {
        let key = slot.entry.key().to_string();
        self.by_category
            .entry(slot.entry.category().to_string())
            .or_default()
            .insert(key.clone());
        for reference in slot.entry.references() {
            self.by_reference
                .entry(reference.clone())
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(key, slot);
    }

    fn remove(&mut self, key: &str) {
        let Some(slot) = self.entries.remove(key) else {
            return;
        };
        let category = slot.entry.category();
        if let Some(keys) = self.by_category.get_mut(category) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_category.remove(category);
            }
        }
        for reference in slot.entry.references() {
            if let Some(keys) = self.by_reference.get_mut(reference) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_reference.remove(reference);
                }
            }
        }
    }

    fn sorted(&self, keys: &BTreeSet<String>) -> Vec<Arc<T>> {
        let mut slots: Vec<&Arc<Slot<T>>> =
            keys.iter().filter_map(|k| self.entries.get(k)).collect();
        slots.sort_by(|a, b| {
            a.sort_name
                .cmp(&b.sort_name)
                .then_with(|| a.entry.key().cmp(b.entry.key()))
        });
        slots.into_iter().map(|s| s.entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.get(key).map(|slot| slot.entry.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries in `category`. Exact match first, then case-insensitive.
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<T>> {
        if let Some(keys) = self.by_category.get(category) {
            return self.sorted(keys);
        }
        let merged: BTreeSet<String> = self
            .by_category
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(category))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect();
        self.sorted(&merged)
    }

    /// All entries, alphabetically, optionally filtered.
    pub fn list(&self, filter: &T::Filter) -> Vec<Arc<T>> {
        let keys: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.matches(filter))
            .map(|(key, _)| key.clone())
            .collect();
        self.sorted(&keys)
    }

    /// Entries that reference `key`.
    pub fn referencing(&self, key: &str) -> Vec<Arc<T>> {
        match self.by_reference.get(key) {
            Some(keys) => self.sorted(keys),
            None => Vec::new(),
        }
    }

    /// Category names with their entry counts, alphabetically.
    pub fn categories(&self) -> Vec<(String, usize)> {
        self.by_category
            .iter()
            .map(|(name, keys)| (name.clone(), keys.len()))
            .collect()
    }

    pub fn search(
        &self,
        query: &str,
        filter: &T::Filter,
        limit: Option<usize>,
        offset: usize,
    ) -> BridgeResult<SearchPage<T>> {
        let limit = check_limit(limit)?;
        let query = NormalizedQuery::parse(query)?;

        let mut hits: Vec<(MatchTier, &Slot<T>)> = self
            .entries
            .values()
            .filter(|slot| slot.entry.matches(filter))
            .filter_map(|slot| slot.text.rank(&query).map(|tier| (tier, &**slot)))
            .collect();
        hits.sort_by(|(ta, a), (tb, b)| {
            compare_hits(
                (*ta, a.sort_name.as_str(), a.entry.key()),
                (*tb, b.sort_name.as_str(), b.entry.key()),
            )
        });

        let total = hits.len();
        let hits = hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(tier, slot)| SearchHit {
                tier,
                entry: slot.entry.clone(),
            })
            .collect();

        Ok(SearchPage {
            total,
            offset,
            limit,
            hits,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit<T> {
    pub tier: MatchTier,
    pub entry: Arc<T>,
}

/// One page of ranked results; `total` counts every match.
#[derive(Debug, Clone)]
pub struct SearchPage<T> {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub hits: Vec<SearchHit<T>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshMode {
    Incremental,
    Full,
}

/// A rejected refresh entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryError {
    pub key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub errors: Vec<EntryError>,
    pub mode: RefreshMode,
    pub generation: u64,
}

impl ChangeSummary {
    pub fn changed(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

type Candidate<T> = Result<T, (Option<String>, ValidationError)>;

pub struct CatalogIndex<T> {
    current: RwLock<Arc<Snapshot<T>>>,
    refresh_lock: Mutex<()>,
    incremental_threshold: usize,
}

impl<T: Indexed> CatalogIndex<T> {
    pub fn new(incremental_threshold: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            refresh_lock: Mutex::new(()),
            incremental_threshold,
        }
    }

    /// Current snapshot. Cheap; holds the read lock only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn get(&self, key: &str) -> BridgeResult<Arc<T>> {
        self.snapshot()
            .get(key)
            .ok_or_else(|| BridgeError::not_found(T::ENTITY, key))
    }

    pub fn search(
        &self,
        query: &str,
        filter: &T::Filter,
        limit: Option<usize>,
        offset: usize,
    ) -> BridgeResult<SearchPage<T>> {
        self.snapshot().search(query, filter, limit, offset)
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<T>> {
        self.snapshot().list_by_category(category)
    }

    /// Replace the whole entry set with `entries`.
    pub fn refresh(&self, entries: Vec<T>) -> ChangeSummary {
        self.apply(entries.into_iter().map(Ok).collect())
    }

    /// Like [`refresh`](Self::refresh), decoding each JSON value first.
    /// Values that fail to decode are reported and excluded.
    pub fn refresh_raw(&self, values: Vec<Value>) -> ChangeSummary {
        let candidates = values
            .into_iter()
            .map(|value| {
                let key = value
                    .get(T::KEY_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                serde_json::from_value::<T>(value).map_err(|e| {
                    (
                        key,
                        ValidationError::Undecodable {
                            message: e.to_string(),
                        },
                    )
                })
            })
            .collect();
        self.apply(candidates)
    }

    fn apply(&self, candidates: Vec<Candidate<T>>) -> ChangeSummary {
        let _serialized = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();

        let mut errors = Vec::new();
        let mut kept: HashSet<String> = HashSet::new();
        let mut accepted: Vec<T> = Vec::with_capacity(candidates.len());
        let mut seen: HashSet<String> = HashSet::new();

        for candidate in candidates {
            let checked = candidate.and_then(|entry| {
                entry
                    .validate()
                    .map_err(|e| (Some(entry.key().to_string()), e))?;
                if !seen.insert(entry.key().to_string()) {
                    return Err((
                        Some(entry.key().to_string()),
                        ValidationError::DuplicateKey {
                            entity_type: T::ENTITY,
                            key: entry.key().to_string(),
                        },
                    ));
                }
                Ok(entry)
            });
            match checked {
                Ok(entry) => accepted.push(entry),
                Err((key, error)) => {
                    warn!(
                        "Rejected {} {}: {}",
                        T::ENTITY,
                        key.as_deref().unwrap_or("<unknown>"),
                        error
                    );
                    if let Some(key) = &key {
                        if current.contains(key) {
                            kept.insert(key.clone());
                        }
                    }
                    errors.push(EntryError {
                        key,
                        message: error.to_string(),
                    });
                }
            }
        }

        let mut added = Vec::new();
        let mut updated = Vec::new();
        for entry in accepted {
            match current.get(entry.key()) {
                None => added.push(entry),
                Some(existing) if *existing != entry => updated.push(entry),
                Some(_) => {
                    // Unchanged entries are still "present" for removal purposes
                    kept.insert(entry.key().to_string());
                }
            }
        }
        let incoming: HashSet<&str> = added
            .iter()
            .chain(updated.iter())
            .map(|e| e.key())
            .chain(kept.iter().map(String::as_str))
            .collect();
        let removed: Vec<String> = current
            .entries
            .keys()
            .filter(|k| !incoming.contains(k.as_str()))
            .cloned()
            .collect();

        let changed = added.len() + updated.len() + removed.len();
        let mode = if changed < self.incremental_threshold && !current.is_empty() {
            RefreshMode::Incremental
        } else {
            RefreshMode::Full
        };

        if changed == 0 {
            debug!("{} refresh: no changes", T::ENTITY);
            return ChangeSummary {
                added: 0,
                updated: 0,
                removed: 0,
                errors,
                mode: RefreshMode::Incremental,
                generation: current.generation,
            };
        }

        let generation = current.generation + 1;
        let (added_count, updated_count, removed_count) =
            (added.len(), updated.len(), removed.len());

        let next = match mode {
            RefreshMode::Incremental => {
                let mut next = Snapshot {
                    entries: current.entries.clone(),
                    by_category: current.by_category.clone(),
                    by_reference: current.by_reference.clone(),
                    generation,
                };
                for key in &removed {
                    next.remove(key);
                }
                for entry in updated.into_iter().chain(added) {
                    next.remove(entry.key());
                    next.insert(Arc::new(Slot::new(entry)));
                }
                next
            }
            RefreshMode::Full => {
                let retained = kept
                    .iter()
                    .filter_map(|k| current.entries.get(k).cloned());
                let fresh = added
                    .into_iter()
                    .chain(updated)
                    .map(|e| Arc::new(Slot::new(e)));
                Snapshot::build(retained.chain(fresh), generation)
            }
        };

        let total = next.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        info!(
            "{} refresh ({:?}): +{} ~{} -{} ({} rejected), {} entries at generation {}",
            T::ENTITY,
            mode,
            added_count,
            updated_count,
            removed_count,
            errors.len(),
            total,
            generation
        );

        ChangeSummary {
            added: added_count,
            updated: updated_count,
            removed: removed_count,
            errors,
            mode,
            generation,
        }
    }
}

impl<T: Indexed> Default for CatalogIndex<T> {
    fn default() -> Self {
        Self::new(DEFAULT_INCREMENTAL_THRESHOLD)
    }
}
