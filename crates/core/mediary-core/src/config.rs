//! Layered configuration loading.
//!
//! Configuration values are looked up through a stack of sources.
//! Sources added later take precedence, so the conventional layering is
//! file defaults first, then environment overrides.

use crate::error::{MediaryError, MediaryResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A provider of configuration values.
pub trait ConfigSource: Send + Sync {
    /// Look up a value by dotted key, `None` when the source has no entry.
    fn get(&self, key: &str) -> Option<Value>;

    /// A short label for diagnostics.
    fn name(&self) -> &str;
}

/// Configuration source backed by process environment variables.
///
/// A dotted key `wiring.mode` is looked up as `<PREFIX>_WIRING_MODE`.
pub struct EnvConfigSource {
    prefix: String,
}

impl EnvConfigSource {
    /// Create an environment source with the given variable prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        let suffix = key.replace(['.', '-'], "_").to_uppercase();
        format!("{}_{}", self.prefix, suffix)
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<Value> {
        std::env::var(self.var_name(key))
            .ok()
            .map(|raw| {
                // Numbers and booleans parse as themselves, everything
                // else stays a string.
                serde_json::from_str(&raw).unwrap_or(Value::String(raw))
            })
    }

    fn name(&self) -> &str {
        "environment"
    }
}

/// Configuration source backed by a TOML or JSON file.
pub struct FileConfigSource {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl FileConfigSource {
    /// Load a configuration file. The format is chosen by extension,
    /// defaulting to TOML.
    pub fn load(path: impl AsRef<Path>) -> MediaryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&path)?;
        let tree: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            _ => {
                let parsed: toml::Value = toml::from_str(&raw)?;
                serde_json::to_value(parsed)?
            }
        };
        let mut values = HashMap::new();
        flatten("", &tree, &mut values);
        Ok(Self { path, values })
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("file")
    }
}

/// An ordered stack of configuration sources.
#[derive(Default)]
pub struct ConfigManager {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a source. Later sources override earlier ones.
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Look up a raw value, consulting sources from newest to oldest.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.sources.iter().rev().find_map(|s| s.get(key))
    }

    /// Look up a string value.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Look up an integer value, failing on a present-but-unparsable entry.
    pub fn get_usize(&self, key: &str) -> MediaryResult<Option<usize>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| Some(v as usize))
                .ok_or_else(|| MediaryError::config(format!("{key}: expected a non-negative integer"))),
            Some(Value::String(s)) => s
                .parse::<usize>()
                .map(Some)
                .map_err(|_| MediaryError::config(format!("{key}: expected an integer, got '{s}'"))),
            Some(other) => Err(MediaryError::config(format!(
                "{key}: expected an integer, got {other}"
            ))),
        }
    }
}
