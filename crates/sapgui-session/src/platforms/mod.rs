use crate::errors::SapError;
use crate::policy::ScriptingPolicy;
use crate::scripting::{AutomationContext, ScriptingHost};

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the scripting host for the current platform
pub fn create_scripting_host() -> Result<Box<dyn ScriptingHost>, SapError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::RunningSapGui::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(SapError::UnsupportedPlatform(
            "SAP GUI scripting is only available on Windows".to_string(),
        ))
    }
}

/// Create the per-thread automation context the scripting host needs
pub fn create_automation_context() -> Box<dyn AutomationContext> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::ComApartment)
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(crate::scripting::NoContext)
    }
}

/// Read the machine-level SAP GUI scripting switch
pub fn read_scripting_policy() -> Result<ScriptingPolicy, SapError> {
    #[cfg(target_os = "windows")]
    {
        windows::policy::read_user_scripting()
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(SapError::UnsupportedPlatform(
            "SAP GUI scripting policy lives in the Windows registry".to_string(),
        ))
    }
}
