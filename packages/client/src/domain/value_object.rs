//! Value Objects for the queue session domain.
//!
//! Identifiers are opaque, non-empty strings issued by the queue backend.
//! Credentials are wrapped so that they never leak into logs through `Debug`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ValueObjectError;

const MAX_ID_LEN: usize = 128;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier, rejecting empty or oversized values.
            pub fn new(id: impl Into<String>) -> Result<Self, ValueObjectError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValueObjectError::Empty($kind));
                }
                if id.len() > MAX_ID_LEN {
                    return Err(ValueObjectError::TooLong {
                        kind: $kind,
                        max: MAX_ID_LEN,
                        actual: id.len(),
                    });
                }
                Ok(Self(id))
            }

            /// Get the inner string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert to owned String.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a clinic's daily queue (also the name of its room).
    QueueId,
    "QueueId"
);
string_id!(
    /// Identifier of a patient's token.
    TokenId,
    "TokenId"
);
string_id!(
    /// Identifier of a clinic.
    ClinicId,
    "ClinicId"
);
string_id!(
    /// Identifier of the authenticated user.
    UserId,
    "UserId"
);

macro_rules! secret {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValueObjectError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ValueObjectError::Empty($kind));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(***)", $kind)
            }
        }
    };
}

secret!(
    /// Short-lived bearer credential used for REST calls and the socket handshake.
    AccessToken,
    "AccessToken"
);
secret!(
    /// Long-lived credential exchanged for a new access/refresh pair.
    RefreshToken,
    "RefreshToken"
);
