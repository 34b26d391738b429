//! Starting SAP GUI through sapshcut and bringing a session up end to end.

use crate::attach::attach;
use crate::config::{LaunchOptions, SessionConfig};
use crate::credential::{AccountRef, CredentialStore};
use crate::errors::SapError;
use crate::rotation::{PasswordRotator, RotationOutcome};
use crate::scripting::{AutomationContext, ContextGuard, GuiSession, ScriptingHost};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Spawns an external program without waiting for it.
pub trait AppLauncher {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<(), SapError>;
}

/// [`AppLauncher`] using `std::process::Command`; the child is detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl AppLauncher for CommandLauncher {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<(), SapError> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_child| ())
            .map_err(|e| SapError::Launch(format!("{}: {e}", program.display())))
    }
}

/// Command-line arguments for sapshcut.
pub fn sapshcut_args(options: &LaunchOptions, username: &str, password: &str) -> Vec<String> {
    vec![
        format!("-system={}", options.system_id),
        format!("-client={}", options.client),
        format!("-user={username}"),
        format!("-pw={password}"),
    ]
}

/// Starts SAP GUI logged in as `account` and waits the settle delay.
///
/// Fails with [`SapError::CredentialUnavailable`] before spawning anything if
/// the store has no complete username/password for the account.
#[instrument(skip(store, launcher, options), fields(account = %account))]
pub fn launch_sap(
    store: &dyn CredentialStore,
    launcher: &dyn AppLauncher,
    account: &AccountRef,
    options: &LaunchOptions,
) -> Result<(), SapError> {
    let credential = store.get(account)?;
    if !credential.is_complete() {
        error!("Failed to retrieve credentials for robot {}", account);
        return Err(SapError::CredentialUnavailable {
            user: account.user.clone(),
            system: account.system.clone(),
            reason: "empty username or password".to_string(),
        });
    }

    let args = sapshcut_args(options, &credential.username, &credential.password);
    launcher.spawn(&options.sapshcut_path, &args)?;
    info!(
        "Launched {} for {} on {}/{}",
        options.sapshcut_path.display(),
        credential.username,
        options.system_id,
        options.client
    );

    if !options.settle.is_zero() {
        thread::sleep(options.settle);
    }
    Ok(())
}

/// A logged-in session together with the automation context keeping it usable.
///
/// A failed rotation still yields the session, so the caller can log it off.
pub struct StartedSession {
    // Declared before the guard so it is released first.
    pub session: Box<dyn GuiSession>,
    pub rotation: Result<RotationOutcome, SapError>,
    _context: ContextGuard,
}

impl std::fmt::Debug for StartedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedSession")
            .field("session", &self.session.id())
            .field("rotation", &self.rotation)
            .finish()
    }
}

/// [`start_session`] failed before any session was attached.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StartError {
    pub error: SapError,
    /// sapshcut was spawned, so SAP GUI may be running without a reachable session.
    pub launched: bool,
}

impl From<StartError> for SapError {
    fn from(failure: StartError) -> Self {
        failure.error
    }
}

/// Everything [`start_session`] talks to.
pub struct SessionEnvironment<'a> {
    pub store: &'a dyn CredentialStore,
    pub launcher: &'a dyn AppLauncher,
    pub host: &'a dyn ScriptingHost,
    pub context: &'a dyn AutomationContext,
}

/// Launches SAP GUI, attaches to its session and rotates the password if SAP asks.
///
/// The automation context is entered for the whole sequence and handed back
/// inside [`StartedSession`], so the session stays usable after this returns.
/// Once attached, the rotation result is reported in
/// [`StartedSession::rotation`] instead of failing the call.
#[instrument(skip(env, rotator, config), fields(account = %account))]
pub fn start_session(
    env: &SessionEnvironment<'_>,
    rotator: &PasswordRotator,
    account: &AccountRef,
    config: &SessionConfig,
) -> Result<StartedSession, StartError> {
    let context = env.context.enter().map_err(|error| StartError {
        error,
        launched: false,
    })?;

    launch_sap(env.store, env.launcher, account, &config.launch).map_err(|error| StartError {
        error,
        launched: false,
    })?;
    let session = attach(env.host, env.context, &config.attach).map_err(|error| StartError {
        error,
        launched: true,
    })?;

    let rotation = rotator.rotate_if_prompted(session.as_ref(), account);
    if let Err(e) = &rotation {
        error!("Password rotation on {} failed: {}", session.id(), e);
    }

    Ok(StartedSession {
        session,
        rotation,
        _context: context,
    })
}
