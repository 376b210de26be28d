//! Diagnostic events raised by the map and the sinks that receive them.
//!
//! The map never logs directly; it hands a [`Diagnostic`] to its
//! [`DiagnosticSink`]. [`TracingSink`] (the default) turns events into
//! `tracing` records, [`MemorySink`] keeps them for inspection.

use crate::pending::Ticket;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::Level;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A key was inserted without collision.
    NewKey { key: String },
    /// A colliding insert was applied under a derived key.
    KeyCollision { requested: String, derived: String },
    /// A colliding insert was queued for later application.
    Deferred { requested: String, ticket: Ticket },
    /// A colliding insert was dropped because the key type has no rule.
    UnsupportedKeyType {
        type_name: &'static str,
        underlying: Option<&'static str>,
    },
    /// A colliding insert was dropped after the retry bound.
    CollisionResolutionExhausted { requested: String, attempts: u32 },
}

impl Diagnostic {
    /// Whether the event reports a dropped insert.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Diagnostic::UnsupportedKeyType { .. } | Diagnostic::CollisionResolutionExhausted { .. }
        )
    }

    /// Severity the event is reported at.
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::NewKey { .. } => Level::DEBUG,
            Diagnostic::KeyCollision { .. } | Diagnostic::Deferred { .. } => Level::INFO,
            Diagnostic::UnsupportedKeyType { .. }
            | Diagnostic::CollisionResolutionExhausted { .. } => Level::ERROR,
        }
    }
}

/// Receiver of map diagnostics.
pub trait DiagnosticSink {
    fn record(&self, diagnostic: &Diagnostic);

    /// Whether events at `level` would be kept. The map skips building
    /// events the sink would discard.
    fn enabled(&self, level: Level) -> bool {
        let _ = level;
        true
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::NewKey { key } => {
                tracing::debug!(%key, "key is new, inserted as requested");
            }
            Diagnostic::KeyCollision { requested, derived } => {
                tracing::info!(%requested, %derived, "key already present, inserted under derived key");
            }
            Diagnostic::Deferred { requested, ticket } => {
                tracing::info!(%requested, ?ticket, "key already present, insert deferred");
            }
            Diagnostic::UnsupportedKeyType {
                type_name,
                underlying,
            } => {
                tracing::error!(%type_name, ?underlying, "unsupported key type, colliding insert dropped");
            }
            Diagnostic::CollisionResolutionExhausted {
                requested,
                attempts,
            } => {
                tracing::error!(%requested, attempts, "no free derived key, colliding insert dropped");
            }
        }
    }

    fn enabled(&self, level: Level) -> bool {
        if level == Level::DEBUG {
            tracing::enabled!(Level::DEBUG)
        } else if level == Level::INFO {
            tracing::enabled!(Level::INFO)
        } else {
            true
        }
    }
}

/// Records diagnostics in memory. Clones share the same buffer, so a test
/// can keep one clone and hand the other to the map.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Rc<RefCell<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.events
            .borrow()
            .iter()
            .filter(|d| d.is_error())
            .cloned()
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: &Diagnostic) {
        self.events.borrow_mut().push(diagnostic.clone());
    }
}

/// Disabled sink.
impl DiagnosticSink for () {
    fn record(&self, _diagnostic: &Diagnostic) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}
