use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Point in the rotation sequence at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationStage {
    BackingUp,
    Generating,
    WritingToUi,
    Confirming,
    Persisting,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RotationStage::BackingUp => "backup",
            RotationStage::Generating => "generate",
            RotationStage::WritingToUi => "write-to-ui",
            RotationStage::Confirming => "confirm",
            RotationStage::Persisting => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SapError {
    #[error("Credentials unavailable for {user}/{system}: {reason}")]
    CredentialUnavailable {
        user: String,
        system: String,
        reason: String,
    },

    #[error("SAP GUI scripting did not become ready within {timeout:?} ({attempts} attempts)")]
    AttachTimeout { timeout: Duration, attempts: u32 },

    #[error("Unexpected text on password prompt: {found:?}")]
    UnexpectedPromptState { found: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Password rotation failed at stage '{stage}': {source}")]
    RotationFailed {
        stage: RotationStage,
        #[source]
        source: Box<SapError>,
    },

    #[error("Scripting is disabled by the server on connection {0}")]
    ScriptingDisabledByServer(String),

    #[error("SAP GUI scripting is not allowed on this machine: {0}")]
    ScriptingNotAllowed(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Failed to launch SAP GUI: {0}")]
    Launch(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SapError {
    /// Wraps `self` as the cause of a rotation failure at `stage`.
    pub fn at_stage(self, stage: RotationStage) -> SapError {
        SapError::RotationFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// True for a missing element, including one reported from inside a rotation stage.
    pub fn is_element_not_found(&self) -> bool {
        match self {
            SapError::ElementNotFound(_) => true,
            SapError::RotationFailed { source, .. } => source.is_element_not_found(),
            _ => false,
        }
    }

    pub fn failed_stage(&self) -> Option<RotationStage> {
        match self {
            SapError::RotationFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SapError {
    fn from(e: std::io::Error) -> Self {
        SapError::CredentialStore(e.to_string())
    }
}

impl From<serde_json::Error> for SapError {
    fn from(e: serde_json::Error) -> Self {
        SapError::CredentialStore(format!("Malformed store document: {e}"))
    }
}
