//! Operation Context
//!
//! The value carried through one model operation's call tree: which kind of
//! write is running, plus the clock and actor providers consulted by
//! auto-value fields.
//!
//! A context is created by the model at the start of an operation and passed
//! explicitly to the parser and to every leaf transform. It is never stored
//! and never shared between operations.

mod actor;
mod clock;

pub use actor::{ActorProvider, FixedActor, NoActor};
pub use clock::{Clock, ManualClock, SystemClock};

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

/// Kind of write a model operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Upsert,
}

impl OperationKind {
    /// Get operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Context carried through a single model operation
#[derive(Clone)]
pub struct OperationContext {
    kind: Option<OperationKind>,
    clock: Arc<dyn Clock>,
    actors: Arc<dyn ActorProvider>,
    /// First clock reading of this operation; every timestamp reuses it
    now: OnceLock<DateTime<Utc>>,
}

impl OperationContext {
    /// Create a context for an operation of the given kind
    pub fn new(kind: OperationKind, clock: Arc<dyn Clock>, actors: Arc<dyn ActorProvider>) -> Self {
        Self {
            kind: Some(kind),
            clock,
            actors,
            now: OnceLock::new(),
        }
    }

    /// Shorthand used by tests and tooling: system clock, no actor
    pub fn for_kind(kind: Option<OperationKind>) -> Self {
        Self {
            kind,
            clock: Arc::new(SystemClock),
            actors: Arc::new(NoActor),
            now: OnceLock::new(),
        }
    }

    /// The running operation, or `None` outside any model operation
    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    pub fn is_insert(&self) -> bool {
        self.kind == Some(OperationKind::Insert)
    }

    pub fn is_update(&self) -> bool {
        self.kind == Some(OperationKind::Update)
    }

    pub fn is_upsert(&self) -> bool {
        self.kind == Some(OperationKind::Upsert)
    }

    /// Current time, read once per operation at millisecond resolution
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.get_or_init(|| self.clock.now())
    }

    /// Who is making this call
    pub fn current_actor(&self) -> Option<String> {
        self.actors.current_actor()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("kind", &self.kind)
            .field("now", &self.now.get())
            .finish_non_exhaustive()
    }
}
