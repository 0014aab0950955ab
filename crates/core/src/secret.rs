//! Secret string handling
//!
//! Provider API keys and the JWT signing secret travel through configuration
//! and request construction, both of which get logged. `SecretString` keeps
//! the value out of every formatting path: `Debug` and `Display` print a
//! fixed marker, so secret material can only reach output through an
//! explicit `expose()` call.

use serde::{Deserialize, Serialize};

/// Printed in place of secret material
const REDACTED: &str = "[REDACTED]";

/// An owned string whose value never appears in formatted output.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The wrapped value. Call sites mark exactly where secret material
    /// leaves the process: request headers and token decoding.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretString").field(&REDACTED).finish()
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}
