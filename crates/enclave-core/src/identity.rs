//! Caller identity as supplied by the identity collaborator.
//!
//! Authentication happens outside the engine. Lifecycle transitions and
//! deletion checks consume exactly two facts per request: who the caller is
//! and whether they hold elevated privilege.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// The caller's user id.
    pub user_id: UserId,
    /// Whether the caller holds elevated (admin) privilege.
    pub is_admin: bool,
}

impl Caller {
    /// A regular, non-elevated caller.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// An elevated caller.
    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Whether this caller may act on a resource owned by `owner`.
    #[must_use]
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.is_admin || self.user_id == owner
    }
}
