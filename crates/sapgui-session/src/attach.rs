//! Waiting for a running SAP GUI to expose a scripting session.

use crate::config::{AttachOptions, ServerDisabledPolicy};
use crate::errors::SapError;
use crate::scripting::{AutomationContext, GuiSession, ScriptingHost};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Cooperative cancellation for [`attach_with_cancel`], checked before every attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polls `host` until SAP GUI has a connection with a session and returns the
/// first session of the first connection.
///
/// Lookup failures mean "not ready yet" and are retried every
/// `options.poll_interval` until `options.timeout` has elapsed, at which point
/// the call fails with [`SapError::AttachTimeout`]. The automation context is
/// held for the whole wait and released on every exit path.
pub fn attach(
    host: &dyn ScriptingHost,
    context: &dyn AutomationContext,
    options: &AttachOptions,
) -> Result<Box<dyn GuiSession>, SapError> {
    attach_with_cancel(host, context, options, None)
}

/// [`attach`] that additionally gives up with [`SapError::Cancelled`] once `cancel` is set.
#[instrument(level = "debug", skip(host, context, cancel))]
pub fn attach_with_cancel(
    host: &dyn ScriptingHost,
    context: &dyn AutomationContext,
    options: &AttachOptions,
    cancel: Option<&CancelFlag>,
) -> Result<Box<dyn GuiSession>, SapError> {
    options.validate()?;
    let _context = context.enter()?;

    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(SapError::Cancelled(format!(
                "attach cancelled after {attempts} attempts"
            )));
        }

        attempts += 1;
        if let Some(session) = try_attach(host, options.server_disabled)? {
            info!(
                "Attached to SAP GUI session {} after {} attempt(s) in {:?}",
                session.id(),
                attempts,
                start.elapsed()
            );
            return Ok(session);
        }

        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            warn!(
                "SAP GUI scripting not ready after {:?} ({} attempts)",
                elapsed, attempts
            );
            return Err(SapError::AttachTimeout {
                timeout: options.timeout,
                attempts,
            });
        }

        // Never sleep past the deadline.
        thread::sleep(options.poll_interval.min(options.timeout - elapsed));
    }
}

/// One attach attempt. `Ok(None)` means "not ready yet".
fn try_attach(
    host: &dyn ScriptingHost,
    server_disabled: ServerDisabledPolicy,
) -> Result<Option<Box<dyn GuiSession>>, SapError> {
    let engine = match host.scripting_engine() {
        Ok(engine) => engine,
        Err(e) => {
            debug!("Scripting engine not available yet: {}", e);
            return Ok(None);
        }
    };

    let connection = match engine.connections() {
        Ok(connections) => match connections.into_iter().next() {
            Some(connection) => connection,
            None => {
                debug!("SAP GUI is running but has no connections yet");
                return Ok(None);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate connections: {}", e);
            return Ok(None);
        }
    };

    match connection.disabled_by_server() {
        Ok(true) => match server_disabled {
            ServerDisabledPolicy::KeepPolling => {
                warn!(
                    "Scripting disabled by server on {}, polling again",
                    connection.id()
                );
                return Ok(None);
            }
            ServerDisabledPolicy::Fail => {
                return Err(SapError::ScriptingDisabledByServer(connection.id()));
            }
        },
        Ok(false) => {}
        Err(e) => {
            debug!("Could not read DisabledByServer on {}: {}", connection.id(), e);
            return Ok(None);
        }
    }

    match connection.sessions() {
        Ok(sessions) => {
            if sessions.is_empty() {
                debug!("Connection {} has no sessions yet", connection.id());
            }
            Ok(sessions.into_iter().next())
        }
        Err(e) => {
            debug!("Failed to enumerate sessions on {}: {}", connection.id(), e);
            Ok(None)
        }
    }
}
