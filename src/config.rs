//! Map configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry bound used when no configuration is given.
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 1024;

/// Largest persisted document accepted by default (1 MiB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// When a colliding insert is applied.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Derive the key and insert before `insert` returns.
    #[default]
    Immediate,
    /// Queue the insert; it becomes visible once `delay` has elapsed and the
    /// owner calls `run_due`, or when the owner calls `settle`.
    Deferred {
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub max_collision_attempts: u32,
    pub insert_mode: InsertMode,
    pub max_document_bytes: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
            insert_mode: InsertMode::Immediate,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl MapConfig {
    /// Caps the number of candidates tried per colliding insert. Zero is
    /// raised to one so a collision always gets at least one candidate.
    pub fn max_collision_attempts(mut self, attempts: u32) -> Self {
        self.max_collision_attempts = attempts.max(1);
        self
    }

    pub fn insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }

    /// Shorthand for `insert_mode(InsertMode::Deferred { delay })`.
    pub fn deferred(self, delay: Duration) -> Self {
        self.insert_mode(InsertMode::Deferred { delay })
    }

    pub fn max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let c = MapConfig::default()
            .max_collision_attempts(0)
            .deferred(Duration::from_millis(300))
            .max_document_bytes(64);
        assert_eq!(c.max_collision_attempts, 1);
        assert_eq!(
            c.insert_mode,
            InsertMode::Deferred {
                delay: Duration::from_millis(300)
            }
        );
        assert_eq!(c.max_document_bytes, 64);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let c: MapConfig = serde_json::from_str(r#"{"max_collision_attempts": 16}"#).unwrap();
        assert_eq!(c.max_collision_attempts, 16);
        assert_eq!(c.insert_mode, InsertMode::Immediate);
        assert_eq!(c.max_document_bytes, DEFAULT_MAX_DOCUMENT_BYTES);
    }

    #[test]
    fn deferred_mode_reads_delay_in_millis() {
        let c: MapConfig =
            serde_json::from_str(r#"{"insert_mode": {"deferred": {"delay": 300}}}"#).unwrap();
        assert_eq!(c, MapConfig::default().deferred(Duration::from_millis(300)));
        let back = serde_json::to_string(&c.insert_mode).unwrap();
        assert_eq!(back, r#"{"deferred":{"delay":300}}"#);
    }
}
