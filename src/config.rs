//! Sketch configuration.
//!
//! A config lists the value slots every register carries, in order, and the
//! merge policy of each slot.  It is loaded once, then shared read-only by
//! every register of a sketch.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::sketch::SketchError;
use crate::value_function::{Aggregator, ValueFunction, DEFAULT_UNIQUE_COLLISION};

fn default_unique_collision() -> u64 {
    DEFAULT_UNIQUE_COLLISION
}

/// One value slot of a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    /// Human-readable slot label, unique within a config.
    pub name: String,
    /// Merge policy applied when two contributions land on this slot.
    pub aggregator: Aggregator,
}

impl ValueSpec {
    /// Builds a slot description.
    pub fn new(name: impl Into<String>, aggregator: Aggregator) -> Self {
        Self {
            name: name.into(),
            aggregator,
        }
    }
}

/// Ordered list of value slots shared by every register of a sketch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchConfig {
    values: Vec<ValueSpec>,
    /// Marker written into "unique" slots whose contributions disagree.
    #[serde(default = "default_unique_collision")]
    unique_collision: u64,
}

impl SketchConfig {
    /// Creates a config with the default unique-collision marker.
    pub fn new(values: Vec<ValueSpec>) -> Result<Self, SketchError> {
        Self::with_unique_collision(values, DEFAULT_UNIQUE_COLLISION)
    }

    /// Creates a config with an explicit unique-collision marker.
    pub fn with_unique_collision(
        values: Vec<ValueSpec>,
        unique_collision: u64,
    ) -> Result<Self, SketchError> {
        let config = Self {
            values,
            unique_collision,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from JSON text.
    ///
    /// ```
    /// use sketch_crypt::SketchConfig;
    ///
    /// let config = SketchConfig::from_json_str(
    ///     r#"{"values":[{"name":"frequency","aggregator":"sum"}]}"#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.slot_count(), 1);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, SketchError> {
        let config: SketchConfig =
            serde_json::from_str(json).map_err(|err| SketchError::Decode(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config from disk.
    pub fn from_json_file(path: &Path) -> Result<Self, SketchError> {
        let contents = fs::read_to_string(path).map_err(|err| SketchError::Io(err.to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Serializes the config as JSON.
    pub fn to_json_string(&self) -> Result<String, SketchError> {
        serde_json::to_string(self).map_err(|err| SketchError::Decode(err.to_string()))
    }

    fn validate(&self) -> Result<(), SketchError> {
        let mut seen = HashSet::new();
        for spec in &self.values {
            if !seen.insert(spec.name.as_str()) {
                return Err(SketchError::DuplicateSlot(spec.name.clone()));
            }
        }
        Ok(())
    }

    /// Slot descriptions in order.
    pub fn values(&self) -> &[ValueSpec] {
        &self.values
    }

    /// Number of value slots per register.
    pub fn slot_count(&self) -> usize {
        self.values.len()
    }

    /// Marker used by "unique" slots.
    pub fn unique_collision(&self) -> u64 {
        self.unique_collision
    }

    /// Merge function of the slot at position `slot`.
    pub fn value_function(&self, slot: usize) -> Option<ValueFunction> {
        self.values
            .get(slot)
            .map(|spec| spec.aggregator.value_function(self.unique_collision))
    }

    /// Merge functions of all slots, in slot order.
    pub fn value_functions(&self) -> impl Iterator<Item = ValueFunction> + '_ {
        self.values
            .iter()
            .map(|spec| spec.aggregator.value_function(self.unique_collision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_json_defaults_collision_marker() {
        let config = SketchConfig::from_json_str(
            r#"{"values":[{"name":"id","aggregator":"unique"},{"name":"freq","aggregator":"sum"}]}"#,
        )
        .unwrap();
        assert_eq!(config.slot_count(), 2);
        assert_eq!(config.unique_collision(), u64::MAX);
        assert_eq!(
            config.value_function(0),
            Some(ValueFunction::Unique {
                collision: u64::MAX
            })
        );
        assert_eq!(config.value_function(1), Some(ValueFunction::Sum));
        assert_eq!(config.value_function(2), None);
    }

    #[test]
    fn test_json_rejects_unknown_aggregator() {
        let err = SketchConfig::from_json_str(r#"{"values":[{"name":"x","aggregator":"max"}]}"#)
            .unwrap_err();
        assert!(matches!(err, SketchError::Decode(_)));
    }

    #[test]
    fn test_duplicate_slot_names_rejected() {
        let err = SketchConfig::new(vec![
            ValueSpec::new("freq", Aggregator::Sum),
            ValueSpec::new("freq", Aggregator::Unique),
        ])
        .unwrap_err();
        assert_eq!(err, SketchError::DuplicateSlot("freq".to_string()));
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let config = SketchConfig::with_unique_collision(
            vec![ValueSpec::new("freq", Aggregator::Sum)],
            42,
        )
        .unwrap();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("sketch_crypt_config_{unique}.json"));
        fs::write(&path, config.to_json_string().unwrap()).unwrap();
        let loaded = SketchConfig::from_json_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_io() {
        let err = SketchConfig::from_json_file(Path::new("/nonexistent/sketch.json")).unwrap_err();
        assert!(matches!(err, SketchError::Io(_)));
    }
}
