//! Opaque UUID-backed identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing [`Uuid`].
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Return the inner [`Uuid`].
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        /// Generates a random ID, not a sentinel value.
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| CoreError::InvalidId {
                        kind: $kind,
                        value: s.to_string(),
                        message: e.to_string(),
                    })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of an uploaded plugin.
    PluginId,
    "plugin"
);

uuid_id!(
    /// Unique identifier of a registered tool.
    ToolId,
    "tool"
);

uuid_id!(
    /// Identifier of a user as supplied by the identity collaborator.
    UserId,
    "user"
);

uuid_id!(
    /// Identifier of a single plugin invocation.
    ExecutionId,
    "execution"
);
