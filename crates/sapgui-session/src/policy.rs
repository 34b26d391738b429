//! Whether this machine allows SAP GUI scripting at all.

use crate::errors::SapError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptingPolicy {
    Allowed,
    Disabled,
    /// No machine-level value; SAP GUI falls back to its own default (disabled).
    NotConfigured,
}

impl ScriptingPolicy {
    pub fn is_allowed(self) -> bool {
        self == ScriptingPolicy::Allowed
    }
}

impl fmt::Display for ScriptingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScriptingPolicy::Allowed => "allowed",
            ScriptingPolicy::Disabled => "disabled",
            ScriptingPolicy::NotConfigured => "not configured",
        };
        f.write_str(text)
    }
}

/// Reads the scripting policy of the current machine.
pub fn scripting_policy() -> Result<ScriptingPolicy, SapError> {
    crate::platforms::read_scripting_policy()
}

/// Fails with [`SapError::ScriptingNotAllowed`] unless `policy` allows scripting.
pub fn ensure_allowed(policy: ScriptingPolicy) -> Result<(), SapError> {
    if policy.is_allowed() {
        Ok(())
    } else {
        Err(SapError::ScriptingNotAllowed(format!(
            "UserScripting is {policy}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_allowed_passes() {
        assert!(ensure_allowed(ScriptingPolicy::Allowed).is_ok());
        assert!(matches!(
            ensure_allowed(ScriptingPolicy::Disabled),
            Err(SapError::ScriptingNotAllowed(_))
        ));
        assert!(matches!(
            ensure_allowed(ScriptingPolicy::NotConfigured),
            Err(SapError::ScriptingNotAllowed(_))
        ));
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn policy_is_unsupported_off_windows() {
        assert!(matches!(
            scripting_policy(),
            Err(SapError::UnsupportedPlatform(_))
        ));
    }
}
