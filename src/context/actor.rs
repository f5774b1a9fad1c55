//! Current-actor providers for user auto-values.

/// Answers "who is making this call"
pub trait ActorProvider: Send + Sync {
    fn current_actor(&self) -> Option<String>;
}

/// No authenticated actor (background jobs, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActor;

impl ActorProvider for NoActor {
    fn current_actor(&self) -> Option<String> {
        None
    }
}

/// Always the same actor
#[derive(Debug, Clone)]
pub struct FixedActor(String);

impl FixedActor {
    pub fn new(actor: impl Into<String>) -> Self {
        Self(actor.into())
    }
}

impl ActorProvider for FixedActor {
    fn current_actor(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
