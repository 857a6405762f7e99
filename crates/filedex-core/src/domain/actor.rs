//! The actor performing an operation
//!
//! Authentication happens outside the core. Callers hand every operation an
//! already-verified [`Actor`]; the core records its id as provenance and
//! consults `privileged` only at the permanent-delete boundary.

use serde::{Deserialize, Serialize};

use super::newtypes::ActorId;

/// A verified caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    id: ActorId,
    privileged: bool,
}

impl Actor {
    /// Creates an actor with the given privilege level
    pub fn new(id: ActorId, privileged: bool) -> Self {
        Self { id, privileged }
    }

    /// Creates a non-privileged actor
    pub fn user(id: ActorId) -> Self {
        Self::new(id, false)
    }

    /// The reconciliation actor; privileged
    pub fn system() -> Self {
        Self::new(ActorId::system(), true)
    }

    /// Returns the actor's identity
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Returns true if the actor may purge recycle bin items
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_is_not_privileged() {
        let actor = Actor::user(ActorId::new("bob").unwrap());
        assert!(!actor.is_privileged());
        assert_eq!(actor.id().as_str(), "bob");
    }

    #[test]
    fn test_system_actor() {
        let actor = Actor::system();
        assert!(actor.is_privileged());
        assert_eq!(actor.id().as_str(), ActorId::SYSTEM);
    }
}
