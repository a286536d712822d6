//! Configuration-related functionality for Vista.

use std::{collections::HashMap, fs, path::Path};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Runtime configuration, e.g. default chart dimensions and template
/// overrides.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config(HashMap<String, Value>);

impl Config {
    /// Load configuration from the given JSON file. The file must contain a
    /// single object.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(path.display().to_string(), e))?;
        let config = serde_json::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration from {}", path.display()))?;
        Ok(config)
    }

    /// Convenience method for constructing a configuration object.
    pub fn with<K, V>(mut self, key: K, value: V) -> Result<Self>
    where
        K: AsRef<str>,
        V: Serialize,
    {
        let _ = self.set(key, value)?;
        Ok(self)
    }

    /// Set the value associated with the given key.
    pub fn set<K, V>(&mut self, key: K, value: V) -> Result<Option<Value>>
    where
        K: AsRef<str>,
        V: Serialize,
    {
        let value = serde_json::to_value(value).map_err(Error::Json)?;
        let key = key.as_ref().to_string();
        let maybe_prev = self.0.insert(key, value);
        Ok(maybe_prev)
    }

    /// Get a reference to the value associated with the given key.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&Value> {
        self.0.get(key.as_ref())
    }

    /// Get the value associated with the given key as an unsigned integer.
    ///
    /// Returns `Ok(None)` if the key is absent and an error if the value is
    /// not a non-negative integer that fits into a `u32`.
    pub fn get_u32<K: AsRef<str>>(&self, key: K) -> Result<Option<u32>> {
        let key = key.as_ref();
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| Error::InvalidConfigValue(key.to_string()).into()),
        }
    }

    /// Get the value associated with the given key as a string.
    pub fn get_str<K: AsRef<str>>(&self, key: K) -> Result<Option<&str>> {
        let key = key.as_ref();
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::InvalidConfigValue(key.to_string()).into()),
        }
    }

    /// An iterator visiting all key/value pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_getters() {
        let config = Config::default()
            .with("width", 640)
            .unwrap()
            .with("background", "white")
            .unwrap()
            .with("height", -1)
            .unwrap();
        assert_eq!(config.get_u32("width").unwrap(), Some(640));
        assert_eq!(config.get_u32("padding").unwrap(), None);
        assert!(config.get_u32("height").is_err());
        assert_eq!(config.get_str("background").unwrap(), Some("white"));
        assert!(config.get_str("width").is_err());
    }

    #[test]
    fn set_returns_previous_value() {
        let mut config = Config::default().with("width", 100).unwrap();
        let prev = config.set("width", 200).unwrap();
        assert_eq!(prev, Some(Value::from(100)));
        assert_eq!(config.get_u32("width").unwrap(), Some(200));
    }

    #[test]
    fn deserializes_from_object() {
        let config: Config =
            serde_json::from_str(r#"{"width": 320, "templates": {"text": "{{text}}"}}"#).unwrap();
        assert_eq!(config.get_u32("width").unwrap(), Some(320));
        assert!(config.get("templates").unwrap().is_object());
        assert_eq!(config.iter().count(), 2);
    }
}
