//! Configuration for launching, attaching, rotating and logging off.
//!
//! Every section has defaults matching the production robot setup, so an
//! empty (or missing) config file is valid.

use crate::errors::SapError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default SAP system id passed to sapshcut.
pub const DEFAULT_SYSTEM_ID: &str = "P02";
/// Default SAP client passed to sapshcut.
pub const DEFAULT_CLIENT: &str = "400";
/// Label shown on the change-password popup.
pub const PASSWORD_PROMPT_SENTINEL: &str = "Nyt password";
/// SAP processes terminated by a forced logoff.
pub const DEFAULT_SAP_PROCESSES: &[&str] = &["saplogon.exe", "sapgui.exe"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub launch: LaunchOptions,
    pub attach: AttachOptions,
    pub rotation: RotationOptions,
    pub teardown: TeardownOptions,
}

impl SessionConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, SapError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SapError::InvalidArgument(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: SessionConfig = serde_json::from_str(&raw).map_err(|e| {
            SapError::InvalidArgument(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, else the default location if that file exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SapError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/sapgui-session/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sapgui-session").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), SapError> {
        self.attach.validate()
    }
}

/// How sapshcut is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    pub sapshcut_path: PathBuf,
    pub system_id: String,
    pub client: String,
    /// Pause after spawning sapshcut before attaching.
    #[serde(with = "millis")]
    pub settle: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            sapshcut_path: PathBuf::from(
                r"C:\Program Files (x86)\SAP\FrontEnd\SAPgui\sapshcut.exe",
            ),
            system_id: DEFAULT_SYSTEM_ID.to_string(),
            client: DEFAULT_CLIENT.to_string(),
            settle: Duration::from_secs(1),
        }
    }
}

/// What the attach loop does with a connection whose server disabled scripting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerDisabledPolicy {
    /// Treat the attempt as "not ready" and poll again.
    #[default]
    KeepPolling,
    /// Fail the attach with `ScriptingDisabledByServer`.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachOptions {
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    pub server_disabled: ServerDisabledPolicy,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            server_disabled: ServerDisabledPolicy::default(),
        }
    }
}

impl AttachOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            ..Self::default()
        }
    }

    pub fn with_server_disabled(mut self, policy: ServerDisabledPolicy) -> Self {
        self.server_disabled = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SapError> {
        if self.poll_interval.is_zero() {
            return Err(SapError::InvalidArgument(
                "attach poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scripting ids of the change-password popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLayout {
    pub prompt_label: String,
    pub sentinel: String,
    pub new_password_field: String,
    pub confirm_password_field: String,
    pub ok_button: String,
}

impl Default for PromptLayout {
    fn default() -> Self {
        Self {
            prompt_label: "/app/con[0]/ses[0]/wnd[1]/usr/lblRSYST-NCODE_TEXT".to_string(),
            sentinel: PASSWORD_PROMPT_SENTINEL.to_string(),
            new_password_field: "/app/con[0]/ses[0]/wnd[1]/usr/pwdRSYST-NCODE".to_string(),
            confirm_password_field: "/app/con[0]/ses[0]/wnd[1]/usr/pwdRSYST-NCOD2".to_string(),
            ok_button: "/app/con[0]/ses[0]/wnd[1]/tbar[0]/btn[0]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationOptions {
    pub layout: PromptLayout,
    /// Pause after pressing OK so SAP can process the change.
    #[serde(with = "millis")]
    pub settle_after_confirm: Duration,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            layout: PromptLayout::default(),
            settle_after_confirm: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownOptions {
    pub command_field: String,
    pub enter_button: String,
    pub logoff_command: String,
    pub confirm_button: String,
    pub process_names: Vec<String>,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self {
            command_field: "/app/con[0]/ses[0]/wnd[0]/tbar[0]/okcd".to_string(),
            enter_button: "/app/con[0]/ses[0]/wnd[0]/tbar[0]/btn[0]".to_string(),
            logoff_command: "/nend".to_string(),
            confirm_button: "/app/con[0]/ses[0]/wnd[1]/usr/btnSPOP-OPTION1".to_string(),
            process_names: DEFAULT_SAP_PROCESSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.launch.system_id, "P02");
        assert_eq!(config.launch.client, "400");
        assert_eq!(config.attach.poll_interval, Duration::from_millis(500));
        assert_eq!(config.rotation.layout.sentinel, "Nyt password");
        assert_eq!(config.attach.server_disabled, ServerDisabledPolicy::KeepPolling);
    }

    #[test]
    fn password_length_is_not_configurable() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "rotation": { "password_length": 8 } }"#).unwrap();
        let written = serde_json::to_value(&config.rotation).unwrap();
        assert!(written.get("password_length").is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "attach": {{ "timeout": 5000, "server_disabled": "fail" }}, "launch": {{ "client": "100" }} }}"#
        )
        .unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.attach.timeout, Duration::from_secs(5));
        assert_eq!(config.attach.poll_interval, Duration::from_millis(500));
        assert_eq!(config.attach.server_disabled, ServerDisabledPolicy::Fail);
        assert_eq!(config.launch.client, "100");
        assert_eq!(config.launch.system_id, "P02");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "attach": {{ "poll_interval": 0 }} }}"#).unwrap();

        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(SapError::InvalidArgument(_))
        ));
    }
}
