//! sapgui: SAP GUI robot logon, password rotation and logoff
//!
//! Usage:
//!   sapgui --store robot.json --user robot --system opus launch       # log on, rotate if expired
//!   sapgui --store robot.json launch --logoff                         # ... and log off again
//!   sapgui attach                                                     # wait for a running SAP GUI
//!   sapgui --store robot.json rotate                                  # rotate on an open session
//!   sapgui logoff --force                                             # log off, kill SAP if that fails
//!   sapgui policy                                                     # is UserScripting enabled?

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sapgui_session::{AccountRef, SessionConfig, PASSWORD_LENGTH};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

mod commands;
mod logging;

use commands::{Invocation, Workflow};

#[derive(Parser, Debug)]
#[command(
    name = "sapgui",
    author,
    version,
    about = "SAP GUI robot logon, password rotation and logoff"
)]
struct Cli {
    /// JSON config file (defaults to <config dir>/sapgui-session/config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credential store file
    #[arg(long, global = true, env = "SAPGUI_STORE", default_value = "sapgui-credentials.json")]
    store: PathBuf,

    /// Robot user whose credentials are used
    #[arg(long, global = true, default_value = "robot")]
    user: String,

    /// System tag of the credential record
    #[arg(long, global = true, default_value = "opus")]
    system: String,

    /// Override the attach timeout, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Override the attach poll interval, in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    /// Override the sapshcut.exe location
    #[arg(long, global = true)]
    sapshcut: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Start SAP GUI via sapshcut, attach, and rotate the password if SAP asks
    Launch {
        /// Log off once the session is up
        #[arg(long)]
        logoff: bool,
        /// With --logoff: kill SAP processes if the logoff command cannot be sent
        #[arg(long)]
        force: bool,
        /// Do not check the UserScripting registry flag first
        #[arg(long)]
        skip_policy_check: bool,
    },
    /// Wait for a running SAP GUI session and print its id
    Attach,
    /// Attach to a running session and rotate the password if SAP asks
    Rotate,
    /// Attach to a running session and log it off
    Logoff {
        /// Kill SAP processes if the logoff command cannot be sent
        #[arg(long)]
        force: bool,
    },
    /// Show whether SAP GUI scripting is allowed on this machine
    Policy,
    /// Print a freshly generated password
    Password {
        #[arg(long, default_value_t = PASSWORD_LENGTH)]
        length: usize,
    },
    /// Write the initial credential record for --user/--system into --store
    Provision {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SAPGUI_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

impl From<Commands> for Workflow {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Launch {
                logoff,
                force,
                skip_policy_check,
            } => Workflow::Launch {
                logoff,
                force,
                skip_policy_check,
            },
            Commands::Attach => Workflow::Attach,
            Commands::Rotate => Workflow::Rotate,
            Commands::Logoff { force } => Workflow::Logoff { force },
            Commands::Policy => Workflow::Policy,
            Commands::Password { length } => Workflow::Password { length },
            Commands::Provision { username, password } => {
                Workflow::Provision { username, password }
            }
        }
    }
}

impl Cli {
    fn invocation(&self) -> Result<Invocation> {
        let mut config = SessionConfig::load_or_default(self.config.as_deref())?;
        if let Some(ms) = self.timeout_ms {
            config.attach.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_ms {
            config.attach.poll_interval = Duration::from_millis(ms);
        }
        if let Some(path) = &self.sapshcut {
            config.launch.sapshcut_path = path.clone();
        }
        config.validate()?;

        Ok(Invocation {
            config,
            account: AccountRef::new(&self.store, &self.user, &self.system),
        })
    }
}

async fn execute(invocation: Invocation, workflow: Workflow) -> Result<serde_json::Value> {
    // The SAP GUI workflow is blocking and apartment-bound; give it its own thread.
    tokio::task::spawn_blocking(move || commands::run(&invocation, &workflow))
        .await
        .context("workflow thread panicked")?
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging()?;

    let invocation = cli.invocation()?;
    debug!(
        "Account {} from {}",
        invocation.account,
        invocation.account.store_path.display()
    );
    match execute(invocation, cli.command.into()).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sapgui",
            "launch",
            "--logoff",
            "--store",
            "robot.json",
            "--system",
            "ri",
        ])
        .unwrap();

        assert_eq!(cli.store, PathBuf::from("robot.json"));
        assert_eq!(cli.system, "ri");
        assert_eq!(cli.user, "robot");
        assert!(matches!(
            cli.command,
            Commands::Launch {
                logoff: true,
                force: false,
                ..
            }
        ));
    }

    #[test]
    fn flag_overrides_win_over_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "attach": {{ "timeout": 9000, "poll_interval": 900 }} }}"#).unwrap();
        let config_path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "sapgui",
            "--config",
            config_path.as_str(),
            "--timeout-ms",
            "1500",
            "attach",
        ])
        .unwrap();
        let invocation = cli.invocation().unwrap();

        assert_eq!(invocation.config.attach.timeout, Duration::from_millis(1500));
        assert_eq!(
            invocation.config.attach.poll_interval,
            Duration::from_millis(900)
        );
    }

    #[test]
    fn invalid_config_inputs_are_rejected() {
        let cli = Cli::try_parse_from([
            "sapgui",
            "--config",
            "/nonexistent/does-not-matter.json",
            "attach",
        ])
        .unwrap();
        assert!(cli.invocation().is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let config_path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from([
            "sapgui",
            "--config",
            config_path.as_str(),
            "--poll-ms",
            "0",
            "attach",
        ])
        .unwrap();
        assert!(cli.invocation().is_err());
    }

    #[tokio::test]
    async fn execute_runs_workflow_off_the_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation {
            config: SessionConfig::default(),
            account: AccountRef::new(dir.path().join("robot.json"), "robot", "opus"),
        };

        let report = execute(invocation, Workflow::Password { length: 20 })
            .await
            .unwrap();
        assert_eq!(report["length"], 20);
    }
}
