//! Registry lookup of the SAP GUI `UserScripting` switch

use crate::errors::SapError;
use crate::policy::ScriptingPolicy;
use tracing::debug;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::ERROR_FILE_NOT_FOUND;
use windows::Win32::System::Registry::{RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_DWORD};

const SECURITY_KEYS: [PCWSTR; 2] = [
    w!("SOFTWARE\\SAP\\SAPGUI Front\\SAP Frontend Server\\Security"),
    w!("SOFTWARE\\WOW6432Node\\SAP\\SAPGUI Front\\SAP Frontend Server\\Security"),
];

pub fn read_user_scripting() -> Result<ScriptingPolicy, SapError> {
    for key in SECURITY_KEYS {
        let mut data = 0u32;
        let mut size = std::mem::size_of::<u32>() as u32;
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                key,
                w!("UserScripting"),
                RRF_RT_REG_DWORD,
                None,
                Some(&mut data as *mut u32 as *mut _),
                Some(&mut size),
            )
        };

        if status == ERROR_FILE_NOT_FOUND {
            debug!("UserScripting not set under {:?}", unsafe { key.to_string() });
            continue;
        }
        status
            .ok()
            .map_err(|e| SapError::PlatformError(format!("Failed to read UserScripting: {e}")))?;

        return Ok(if data == 1 {
            ScriptingPolicy::Allowed
        } else {
            ScriptingPolicy::Disabled
        });
    }

    Ok(ScriptingPolicy::NotConfigured)
}
