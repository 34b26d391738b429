//! Narrow capability interface over the SAP GUI scripting object model.
//!
//! Only the handful of calls this crate needs are exposed: element lookup by id,
//! text get/set, press, and the application → connection → session hierarchy.
//! Platform backends (see [`crate::platforms`]) implement these traits; tests
//! implement them with in-memory fakes.

use crate::errors::SapError;

/// A single element of the SAP GUI element tree (text field, label, button...).
pub trait GuiElement {
    /// Displayed text of the element.
    fn text(&self) -> Result<String, SapError>;

    fn set_text(&self, value: &str) -> Result<(), SapError>;

    fn press(&self) -> Result<(), SapError>;
}

/// A live scripting session (one SAP GUI window set).
///
/// Handles are owned by one caller at a time; SAP GUI scripting is not safe
/// for concurrent calls, so this trait is deliberately not `Send`.
pub trait GuiSession {
    /// Looks up an element by its scripting id, e.g.
    /// `/app/con[0]/ses[0]/wnd[0]/tbar[0]/okcd`.
    ///
    /// A missing element is reported as [`SapError::ElementNotFound`].
    fn find_by_id(&self, id: &str) -> Result<Box<dyn GuiElement>, SapError>;

    /// Scripting id of the session itself, used for logging.
    fn id(&self) -> String {
        String::from("<session>")
    }
}

/// A connection to one SAP system, holding zero or more sessions.
pub trait GuiConnection {
    fn id(&self) -> String;

    /// Whether the server has switched scripting off for this connection.
    fn disabled_by_server(&self) -> Result<bool, SapError>;

    /// Sessions of this connection, in SAP GUI order.
    fn sessions(&self) -> Result<Vec<Box<dyn GuiSession>>, SapError>;
}

/// The scripting engine (`GuiApplication`) of a running SAP GUI.
pub trait ScriptingEngine {
    /// Open connections, in SAP GUI order.
    fn connections(&self) -> Result<Vec<Box<dyn GuiConnection>>, SapError>;
}

/// Looks up the automation root of a running SAP GUI.
///
/// Failing with any error means "not ready yet" to the attach loop.
pub trait ScriptingHost {
    fn scripting_engine(&self) -> Result<Box<dyn ScriptingEngine>, SapError>;
}

/// Per-thread automation runtime that must be active while scripting objects are used.
pub trait AutomationContext {
    /// Enters the context; it stays active until the returned guard is dropped.
    fn enter(&self) -> Result<ContextGuard, SapError>;
}

/// Releases an [`AutomationContext`] when dropped.
pub struct ContextGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl ContextGuard {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Context for hosts that need no thread-local setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

impl AutomationContext for NoContext {
    fn enter(&self) -> Result<ContextGuard, SapError> {
        Ok(ContextGuard::noop())
    }
}
