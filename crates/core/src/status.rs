//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each variant carries two encodings: the 1-based id stored in the
//! corresponding `*_statuses` table and the lowercase label used on the wire.

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = ($val:literal, $label:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant = $val ),+
        }

        impl $name {
            /// Every variant, in id order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant from its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Wire label, e.g. `"running"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|status| status.as_str() == s)
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "Unknown {} \"{s}\"",
                            stringify!($name)
                        ))
                    })
            }
        }
    };
}

define_status_enum! {
    /// Job lifecycle status. See [`crate::job`] for the transition table.
    JobStatus {
        Accepted = (1, "accepted"),
        Running = (2, "running"),
        Successful = (3, "successful"),
        Failed = (4, "failed"),
        Canceled = (5, "canceled"),
        Paused = (6, "paused"),
        Previewing = (7, "previewing"),
    }
}

define_status_enum! {
    /// Work item execution status.
    WorkItemStatus {
        Ready = (1, "ready"),
        Running = (2, "running"),
        Successful = (3, "successful"),
        Failed = (4, "failed"),
        Canceled = (5, "canceled"),
    }
}

impl WorkItemStatus {
    /// Terminal items accept no further status changes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Successful | WorkItemStatus::Failed | WorkItemStatus::Canceled
        )
    }
}
