//! SAP GUI session automation for robot accounts
//!
//! This crate starts SAP GUI through sapshcut, waits for its scripting session
//! to become available, changes the account password when SAP reports it as
//! expired, and logs the session off again.
//!
//! The SAP GUI object model is reached through the narrow traits in
//! [`scripting`]; the Windows COM backend lives in [`platforms`].

pub mod attach;
pub mod config;
pub mod credential;
pub mod errors;
pub mod launch;
pub mod password;
pub mod platforms;
pub mod policy;
pub mod process;
pub mod rotation;
pub mod scripting;
pub mod teardown;
#[cfg(test)]
mod tests;

pub use attach::{attach, attach_with_cancel, CancelFlag};
pub use config::{
    AttachOptions, LaunchOptions, PromptLayout, RotationOptions, ServerDisabledPolicy,
    SessionConfig, TeardownOptions,
};
pub use credential::{AccountLocks, AccountRef, Credential, CredentialStore, FileCredentialStore};
pub use errors::{RotationStage, SapError};
pub use launch::{
    launch_sap, start_session, AppLauncher, CommandLauncher, SessionEnvironment, StartError,
    StartedSession,
};
pub use password::{generate_password, GeneratedPassword, PASSWORD_LENGTH};
pub use policy::{ensure_allowed, scripting_policy, ScriptingPolicy};
pub use process::{ProcessTerminator, SystemProcessTerminator};
pub use rotation::{PasswordRotator, RotationOutcome, RotationProgress, RotationReport};
pub use scripting::{
    AutomationContext, ContextGuard, GuiConnection, GuiElement, GuiSession, NoContext,
    ScriptingEngine, ScriptingHost,
};
pub use teardown::{teardown, teardown_opt, TeardownReport};
