//! Best-effort logoff of an SAP GUI session.

use crate::config::TeardownOptions;
use crate::errors::SapError;
use crate::process::ProcessTerminator;
use crate::scripting::GuiSession;
use tracing::{debug, info, instrument, warn};

/// What a teardown managed to do. Informational only; teardown never fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// The logoff command was written and submitted.
    pub polite_submitted: bool,
    /// A logoff confirmation popup was shown and accepted.
    pub confirmed: bool,
    pub processes_killed: usize,
}

/// Logs `session` off, swallowing every error.
///
/// Writes the logoff command into the command field and submits it; if SAP
/// shows a confirmation popup it is accepted (a missing popup is normal).
/// Only when `force_if_polite_fails` is set and submitting the command itself
/// failed are the configured SAP processes killed.
#[instrument(level = "debug", skip(session, terminator, options))]
pub fn teardown(
    session: &dyn GuiSession,
    force_if_polite_fails: bool,
    terminator: &dyn ProcessTerminator,
    options: &TeardownOptions,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    match submit_logoff(session, options) {
        Ok(()) => {
            report.polite_submitted = true;
            report.confirmed = accept_confirmation(session, options);
            info!("Logged off SAP session {}", session.id());
        }
        Err(e) => {
            warn!("Polite logoff failed: {}", e);
            if force_if_polite_fails {
                report.processes_killed = terminator.terminate(&options.process_names);
                info!(
                    "Forced SAP shutdown, {} process(es) killed",
                    report.processes_killed
                );
            }
        }
    }

    report
}

/// Like [`teardown`] but accepts a session that may never have been obtained.
///
/// With no session the polite path counts as failed.
pub fn teardown_opt(
    session: Option<&dyn GuiSession>,
    force_if_polite_fails: bool,
    terminator: &dyn ProcessTerminator,
    options: &TeardownOptions,
) -> TeardownReport {
    match session {
        Some(session) => teardown(session, force_if_polite_fails, terminator, options),
        None if force_if_polite_fails => TeardownReport {
            processes_killed: terminator.terminate(&options.process_names),
            ..TeardownReport::default()
        },
        None => TeardownReport::default(),
    }
}

fn submit_logoff(session: &dyn GuiSession, options: &TeardownOptions) -> Result<(), SapError> {
    session
        .find_by_id(&options.command_field)?
        .set_text(&options.logoff_command)?;
    session.find_by_id(&options.enter_button)?.press()
}

fn accept_confirmation(session: &dyn GuiSession, options: &TeardownOptions) -> bool {
    match session
        .find_by_id(&options.confirm_button)
        .and_then(|button| button.press())
    {
        Ok(()) => true,
        Err(e) => {
            debug!("No logoff confirmation accepted: {}", e);
            false
        }
    }
}
