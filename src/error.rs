//! Error types.

use thiserror::Error;

/// The key type has no collision derivation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported key type: {type_name}{}", underlying_suffix(.underlying))]
pub struct UnsupportedKeyType {
    /// `std::any::type_name` of the key.
    pub type_name: &'static str,
    /// Representation of an enumeration key, when that is what was rejected.
    pub underlying: Option<&'static str>,
}

fn underlying_suffix(underlying: &Option<&'static str>) -> String {
    match underlying {
        Some(repr) => format!(" (underlying {repr})"),
        None => String::new(),
    }
}

impl UnsupportedKeyType {
    pub fn of<K: ?Sized>() -> Self {
        Self {
            type_name: core::any::type_name::<K>(),
            underlying: None,
        }
    }

    pub fn with_underlying<K: ?Sized>(repr: &'static str) -> Self {
        Self {
            type_name: core::any::type_name::<K>(),
            underlying: Some(repr),
        }
    }
}

/// Why a colliding insert could not be applied. The map is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error(transparent)]
    UnsupportedKeyType(#[from] UnsupportedKeyType),

    /// Every candidate within the retry bound was already taken.
    #[error("no free key derived from {key} after {attempts} attempts")]
    CollisionResolutionExhausted {
        /// Debug rendering of the requested key.
        key: String,
        attempts: u32,
    },
}

/// Positional access past the end of the ordered projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} out of range for map of length {len}")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Failure converting a map to or from its persisted document.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document of {len} bytes exceeds the {max} byte limit")]
    DocumentTooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let e = UnsupportedKeyType {
            type_name: "demo::Key",
            underlying: Some("u16"),
        };
        assert_eq!(e.to_string(), "unsupported key type: demo::Key (underlying u16)");

        let e = InsertError::from(UnsupportedKeyType::of::<Vec<u8>>());
        assert!(e.to_string().starts_with("unsupported key type: alloc::vec::Vec<u8>"));

        let e = InsertError::CollisionResolutionExhausted {
            key: "true".into(),
            attempts: 8,
        };
        assert_eq!(e.to_string(), "no free key derived from true after 8 attempts");

        let e = IndexOutOfRange { index: 3, len: 2 };
        assert_eq!(e.to_string(), "index 3 out of range for map of length 2");
    }
}
