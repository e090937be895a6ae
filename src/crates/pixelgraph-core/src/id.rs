//! Opaque identifiers for graphs, nodes, and images
//!
//! All three identifier spaces are UUID-backed newtypes. Keeping them as
//! distinct types means a `NodeId` can never be passed where an `ImageId` is
//! expected, which matters because the aggregate API crosses all three spaces
//! in nearly every call.
//!
//! # Examples
//!
//! ```rust
//! use pixelgraph_core::id::{GraphId, NodeId};
//!
//! let graph_id = GraphId::new();
//! let parsed: NodeId = "a2f1c7de-9b34-4c1d-8f22-01b7c9e4d5a6".parse().unwrap();
//! assert!(!parsed.is_nil());
//! assert!(NodeId::nil().is_nil());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing a malformed identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed identifier '{value}'")]
pub struct IdParseError {
    /// The text that failed to parse
    pub value: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The nil sentinel (all zero bits)
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Whether this identifier is the nil sentinel
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| IdParseError {
                    value: s.to_string(),
                })
            }
        }
    };
}

uuid_id! {
    /// Identifier of an [`ImageGraph`](crate::graph::ImageGraph) aggregate
    GraphId
}

uuid_id! {
    /// Identifier of a node within a graph
    NodeId
}

uuid_id! {
    /// Identifier of an image blob
    ImageId
}
