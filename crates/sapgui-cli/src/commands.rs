//! Blocking SAP GUI workflows behind each subcommand.
//!
//! SAP GUI scripting objects belong to the COM apartment of the thread that
//! created them, so each workflow runs start to finish on one thread.

use anyhow::{Context, Result};
use sapgui_session::platforms::{create_automation_context, create_scripting_host};
use sapgui_session::{
    attach, ensure_allowed, generate_password, scripting_policy, start_session, teardown,
    teardown_opt, AccountRef, CommandLauncher, Credential, FileCredentialStore, PasswordRotator,
    RotationOutcome, SessionConfig, SessionEnvironment, SystemProcessTerminator, TeardownReport,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved inputs shared by every workflow.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config: SessionConfig,
    pub account: AccountRef,
}

#[derive(Debug, Clone)]
pub enum Workflow {
    Launch {
        logoff: bool,
        force: bool,
        skip_policy_check: bool,
    },
    Attach,
    Rotate,
    Logoff {
        force: bool,
    },
    Policy,
    Password {
        length: usize,
    },
    Provision {
        username: String,
        password: String,
    },
}

pub fn run(invocation: &Invocation, workflow: &Workflow) -> Result<Value> {
    let Invocation { config, account } = invocation;
    match workflow {
        Workflow::Launch {
            logoff,
            force,
            skip_policy_check,
        } => {
            if !skip_policy_check {
                ensure_allowed(scripting_policy()?)?;
            }
            let store = Arc::new(FileCredentialStore::new());
            let context = create_automation_context();
            let host = create_scripting_host()?;
            let env = SessionEnvironment {
                store: store.as_ref(),
                launcher: &CommandLauncher,
                host: host.as_ref(),
                context: context.as_ref(),
            };
            let rotator = PasswordRotator::new(store.clone(), config.rotation.clone());

            let started = match start_session(&env, &rotator, account, config) {
                Ok(started) => started,
                Err(failure) => {
                    if *logoff && failure.launched {
                        let report =
                            teardown_opt(None, *force, &SystemProcessTerminator, &config.teardown);
                        warn!(
                            "No session to log off, {} SAP process(es) killed",
                            report.processes_killed
                        );
                    }
                    return Err(anyhow::Error::new(failure.error))
                        .with_context(|| format!("failed to start SAP session for {account}"));
                }
            };

            let logoff_report = logoff.then(|| {
                teardown(
                    started.session.as_ref(),
                    *force,
                    &SystemProcessTerminator,
                    &config.teardown,
                )
            });
            let session_id = started.session.id();
            let outcome = started
                .rotation
                .with_context(|| format!("password rotation failed on {session_id}"))?;

            let mut report = json!({
                "session": session_id,
                "rotation": rotation_json(&outcome),
            });
            if let Some(logoff_report) = logoff_report {
                report["logoff"] = teardown_json(&logoff_report);
            }
            Ok(report)
        }
        Workflow::Attach => {
            let context = create_automation_context();
            let _apartment = context.enter()?;
            let host = create_scripting_host()?;
            let session = attach(host.as_ref(), context.as_ref(), &config.attach)?;
            Ok(json!({ "session": session.id() }))
        }
        Workflow::Rotate => {
            let context = create_automation_context();
            let _apartment = context.enter()?;
            let host = create_scripting_host()?;
            let session = attach(host.as_ref(), context.as_ref(), &config.attach)?;

            let rotator =
                PasswordRotator::new(Arc::new(FileCredentialStore::new()), config.rotation.clone());
            let outcome = rotator.rotate_if_prompted(session.as_ref(), account)?;
            Ok(json!({
                "session": session.id(),
                "rotation": rotation_json(&outcome),
            }))
        }
        Workflow::Logoff { force } => {
            let context = create_automation_context();
            let _apartment = context.enter()?;
            let host = create_scripting_host()?;
            let session = attach(host.as_ref(), context.as_ref(), &config.attach)?;
            let report = teardown(
                session.as_ref(),
                *force,
                &SystemProcessTerminator,
                &config.teardown,
            );
            let mut value = teardown_json(&report);
            value["session"] = json!(session.id());
            Ok(value)
        }
        Workflow::Policy => {
            let policy = scripting_policy()?;
            Ok(json!({ "user_scripting": policy, "allowed": policy.is_allowed() }))
        }
        Workflow::Password { length } => {
            let password = generate_password(*length);
            Ok(json!({ "password": password.expose(), "length": password.len() }))
        }
        Workflow::Provision { username, password } => {
            FileCredentialStore::new()
                .provision(account, &Credential::new(username, password))
                .with_context(|| {
                    format!("failed to write {}", account.store_path.display())
                })?;
            info!("Provisioned {} in {}", account, account.store_path.display());
            Ok(json!({
                "account": account.to_string(),
                "store": account.store_path.display().to_string(),
            }))
        }
    }
}

fn teardown_json(report: &TeardownReport) -> Value {
    json!({
        "polite_submitted": report.polite_submitted,
        "confirmed": report.confirmed,
        "processes_killed": report.processes_killed,
    })
}

fn rotation_json(outcome: &RotationOutcome) -> Value {
    match outcome {
        RotationOutcome::NoPromptDetected => json!({ "rotated": false }),
        RotationOutcome::Rotated(report) => json!({
            "rotated": true,
            "stages": report.progress.iter().map(|p| format!("{p:?}")).collect::<Vec<_>>(),
            "password": report.masked_password,
        }),
    }
}
