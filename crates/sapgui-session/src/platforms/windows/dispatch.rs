//! COM apartment setup and late-bound `IDispatch` helpers

use crate::errors::SapError;
use crate::scripting::{AutomationContext, ContextGuard};
use tracing::debug;
use windows::core::{Interface, GUID, HRESULT, HSTRING, IUnknown, PCWSTR, VARIANT};
use windows::Win32::System::Com::{
    CoInitializeEx, CoUninitialize, IDispatch, COINIT_APARTMENTTHREADED, DISPATCH_FLAGS,
    DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
};

// 0x80010106 = RPC_E_CHANGED_MODE (already initialized in different mode)
const RPC_E_CHANGED_MODE: HRESULT = HRESULT(0x80010106u32 as i32);
const DISPID_PROPERTYPUT: i32 = -3;
const LOCALE_USER_DEFAULT: u32 = 0x0400;

/// Single-threaded COM apartment for the calling thread.
///
/// SAP GUI scripting objects are apartment-bound, so the attach loop and every
/// later call on the session must run on the thread that entered it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComApartment;

impl AutomationContext for ComApartment {
    fn enter(&self) -> Result<ContextGuard, SapError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            // Someone else owns this thread's apartment; use it and leave it alone.
            debug!("COM already initialized in a different mode on this thread");
            return Ok(ContextGuard::noop());
        }
        if hr.is_err() {
            return Err(SapError::PlatformError(format!(
                "Failed to initialize COM: {hr}"
            )));
        }
        Ok(ContextGuard::new(|| unsafe { CoUninitialize() }))
    }
}

/// Thin late-binding wrapper over an `IDispatch` pointer.
#[derive(Clone)]
pub struct Dispatch(IDispatch);

impl Dispatch {
    pub fn new(inner: IDispatch) -> Self {
        Self(inner)
    }

    pub fn from_unknown(unknown: &IUnknown) -> Result<Self, SapError> {
        unknown
            .cast::<IDispatch>()
            .map(Self)
            .map_err(|e| SapError::PlatformError(format!("Object is not scriptable: {e}")))
    }

    fn dispid(&self, name: &str) -> Result<i32, SapError> {
        let wide = HSTRING::from(name);
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.0
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    LOCALE_USER_DEFAULT,
                    &mut dispid,
                )
                .map_err(|e| SapError::PlatformError(format!("Unknown member '{name}': {e}")))?;
        }
        Ok(dispid)
    }

    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        mut args: Vec<VARIANT>,
        named: Option<i32>,
    ) -> Result<VARIANT, SapError> {
        let dispid = self.dispid(name)?;
        // IDispatch expects arguments in reverse order.
        args.reverse();
        let mut named_args = named.into_iter().collect::<Vec<i32>>();

        let params = DISPPARAMS {
            rgvarg: if args.is_empty() {
                std::ptr::null_mut()
            } else {
                args.as_mut_ptr()
            },
            rgdispidNamedArgs: if named_args.is_empty() {
                std::ptr::null_mut()
            } else {
                named_args.as_mut_ptr()
            },
            cArgs: args.len() as u32,
            cNamedArgs: named_args.len() as u32,
        };

        let mut result = VARIANT::default();
        let mut excep = EXCEPINFO::default();
        let mut arg_err = 0u32;
        let outcome = unsafe {
            self.0.Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &params,
                Some(&mut result),
                Some(&mut excep),
                Some(&mut arg_err),
            )
        };
        let description = take_exception_text(&mut excep);
        outcome.map_err(|e| {
            if description.is_empty() {
                SapError::PlatformError(format!("{name} failed: {e}"))
            } else {
                SapError::PlatformError(format!("{name} failed: {description}"))
            }
        })?;
        Ok(result)
    }

    /// Reads a property, or calls a method without arguments.
    pub fn get(&self, name: &str) -> Result<VARIANT, SapError> {
        self.call(name, Vec::new())
    }

    pub fn call(&self, name: &str, args: Vec<VARIANT>) -> Result<VARIANT, SapError> {
        let flags = DISPATCH_FLAGS(DISPATCH_METHOD.0 | DISPATCH_PROPERTYGET.0);
        self.invoke(name, flags, args, None)
    }

    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), SapError> {
        self.invoke(
            name,
            DISPATCH_PROPERTYPUT,
            vec![value],
            Some(DISPID_PROPERTYPUT),
        )
        .map(|_| ())
    }

    pub fn get_object(&self, name: &str) -> Result<Dispatch, SapError> {
        object_from_variant(&self.get(name)?, name)
    }

    pub fn get_string(&self, name: &str) -> Result<String, SapError> {
        let value = self.get(name)?;
        windows::core::BSTR::try_from(&value)
            .map(|s| s.to_string())
            .map_err(|e| SapError::PlatformError(format!("{name} is not a string: {e}")))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, SapError> {
        let value = self.get(name)?;
        bool::try_from(&value)
            .map_err(|e| SapError::PlatformError(format!("{name} is not a boolean: {e}")))
    }

    pub fn get_i32(&self, name: &str) -> Result<i32, SapError> {
        let value = self.get(name)?;
        i32::try_from(&value)
            .map_err(|e| SapError::PlatformError(format!("{name} is not a number: {e}")))
    }
}

/// Extracts a dispatch object from a variant; empty or null variants yield `None`.
pub fn optional_object(value: &VARIANT) -> Option<Dispatch> {
    if value.is_empty() {
        return None;
    }
    IUnknown::try_from(value)
        .ok()
        .and_then(|unknown| Dispatch::from_unknown(&unknown).ok())
}

fn object_from_variant(value: &VARIANT, what: &str) -> Result<Dispatch, SapError> {
    optional_object(value)
        .ok_or_else(|| SapError::PlatformError(format!("{what} did not return an object")))
}

/// Takes the description out of an `EXCEPINFO` filled by `Invoke`.
///
/// The caller owns the exception strings, so all three are freed here.
fn take_exception_text(excep: &mut EXCEPINFO) -> String {
    drop(std::mem::take(&mut *excep.bstrSource));
    drop(std::mem::take(&mut *excep.bstrHelpFile));
    std::mem::take(&mut *excep.bstrDescription).to_string()
}
