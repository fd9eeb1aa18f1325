//! Tool argument validation.
//!
//! Input schemas are compiled once at registration with `jsonschema`.
//! Before validation, explicit nulls are dropped and `default` values from
//! `properties` are filled in, so handlers always see complete arguments.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Tool arguments that passed validation, with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckedArgs(Map<String, Value>);

impl CheckedArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// A string argument the schema declares as required.
    pub fn required_str(&self, name: &str) -> BridgeResult<&str> {
        self.str(name)
            .ok_or_else(|| BridgeError::validation(format!("missing argument `{}`", name)))
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> BridgeResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| BridgeError::validation(format!("invalid arguments: {}", e)))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// A compiled tool input schema.
#[derive(Clone)]
pub struct ArgsSchema {
    schema: Value,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for ArgsSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgsSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ArgsSchema {
    /// Compile `schema`. Tool arguments are always an object, so the root
    /// must declare `"type": "object"`.
    pub fn compile(schema: &Value) -> BridgeResult<Self> {
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(BridgeError::validation(
                "tool input schema must have \"type\": \"object\"",
            ));
        }
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| BridgeError::validation(format!("invalid input schema: {}", e)))?;
        Ok(Self {
            schema: schema.clone(),
            validator: Arc::new(validator),
        })
    }

    /// Validate `args`. Missing or `null` arguments become an empty object.
    pub fn check(&self, args: Option<Value>) -> BridgeResult<CheckedArgs> {
        let mut value = match args {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(v) => v,
        };
        fill_defaults(&self.schema, &mut value);

        let errors: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    format!("arguments: {}", e)
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        if !errors.is_empty() {
            return Err(BridgeError::validation(errors.join("; ")));
        }

        match value {
            Value::Object(map) => Ok(CheckedArgs(map)),
            _ => Err(BridgeError::validation("arguments must be an object")),
        }
    }
}

/// Drop explicit nulls and insert property defaults, recursing into nested
/// objects and array items.
fn fill_defaults(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(object) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return;
            };
            object.retain(|_, v| !v.is_null());
            for (name, property) in properties {
                match object.get_mut(name) {
                    Some(child) => fill_defaults(property, child),
                    None => {
                        if let Some(default) = property.get("default") {
                            object.insert(name.clone(), default.clone());
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items {
                    fill_defaults(item_schema, item);
                }
            }
        }
        _ => {}
    }
}
