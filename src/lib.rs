//! collision-map: an insertion-ordered map where a duplicate insert never
//! overwrites and never fails silently; the value is stored under a key
//! derived deterministically from the requested one.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a map that can be persisted as an ordered list of
//!   `{key, value}` pairs and rebuilt from hand-edited lists without losing
//!   entries to duplicate keys.
//! - Layers:
//!   - OrderedTable<K, V, S>: structural map (hash index over generational
//!     slots plus an insertion-order vector). Rejects duplicates by handing
//!     the entry back; includes a debug-only reentrancy guard.
//!   - CollisionSafeMap<K, V, S>: public API. On a duplicate it derives a
//!     fresh key through `CollisionKey`, keeps per-key collision counters,
//!     and reports what happened to a `DiagnosticSink`.
//!   - persist: ordered snapshot / restore hooks, serde impls and JSON
//!     helpers.
//!
//! Key derivation
//! - `CollisionKey::derive_key(n)` maps the `n`th collision on a key to a
//!   candidate. Supported kinds are text, integers, floats (`F32Key`,
//!   `F64Key`), `char`, `bool` and enumerations declared with
//!   `collision_enum!` over 8-, 32- or 64-bit representations.
//! - Counters are keyed by the requested key and only advance; counters of
//!   keys that have left the map are pruned before each derivation.
//! - Candidates already present are skipped. The search is bounded by
//!   `MapConfig::max_collision_attempts`, so two-valued domains (`bool`) and
//!   narrow enumerations end in `CollisionResolutionExhausted` instead of
//!   spinning.
//! - Types with no rule can still be keys; a collision on them reports
//!   `UnsupportedKeyType` and leaves the map unchanged.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (marker in the reentrancy tracker).
//! - `index` and `order` always hold the same key set with no duplicates.
//! - The existing entry under a requested key is never touched by a
//!   colliding insert.
//!
//! Deferred inserts
//! - `InsertMode::Deferred { delay }` queues colliding inserts instead of
//!   applying them. The owner runs the queue with `run_due(now)` or
//!   `settle()`; queued inserts can be cancelled by ticket and are dropped
//!   by `clear`, by a restore, and with the map.
//!
//! Notes and non-goals
//! - No file I/O: callers persist the JSON text wherever they like.
//! - Keys are immutable post-insert; there is no `key_mut`.

mod collision_map;
#[cfg(test)]
mod collision_map_proptest;
pub mod config;
pub mod diagnostics;
mod error;
pub mod key;
mod ordered_table;
mod pending;
pub mod persist;
mod reentrancy;

// Public surface
pub use collision_map::{CollisionSafeMap, Inserted, Settled};
pub use config::{InsertMode, MapConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use error::{IndexOutOfRange, InsertError, PersistError, UnsupportedKeyType};
pub use key::{derive_enum_key, CollisionKey, EnumKey, EnumRepr, F32Key, F64Key, KeyKind};
pub use ordered_table::{Handle, Iter, IterMut};
pub use pending::Ticket;
pub use persist::{Pair, RestoreReport};
