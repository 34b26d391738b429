//! SAP GUI scripting objects reached through the running object table

use super::dispatch::{optional_object, Dispatch};
use crate::errors::SapError;
use crate::scripting::{GuiConnection, GuiElement, GuiSession, ScriptingEngine, ScriptingHost};
use windows::core::{w, VARIANT};
use windows::Win32::System::Com::{
    CreateBindCtx, GetRunningObjectTable, IMoniker, MkParseDisplayName,
};

/// Looks up the running SAP GUI (`GetObject("SAPGUI")`).
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningSapGui;

impl RunningSapGui {
    pub fn new() -> Self {
        Self
    }

    fn rot_entry(&self) -> Result<Dispatch, SapError> {
        unsafe {
            let ctx = CreateBindCtx(0)
                .map_err(|e| SapError::PlatformError(format!("CreateBindCtx failed: {e}")))?;
            let mut eaten = 0u32;
            let mut moniker: Option<IMoniker> = None;
            MkParseDisplayName(&ctx, w!("SAPGUI"), &mut eaten, &mut moniker)
                .map_err(|e| SapError::PlatformError(format!("SAPGUI is not running: {e}")))?;
            let moniker = moniker.ok_or_else(|| {
                SapError::PlatformError("SAPGUI moniker could not be parsed".to_string())
            })?;

            let rot = GetRunningObjectTable(0).map_err(|e| {
                SapError::PlatformError(format!("GetRunningObjectTable failed: {e}"))
            })?;
            let unknown = rot
                .GetObject(&moniker)
                .map_err(|e| SapError::PlatformError(format!("SAPGUI not registered: {e}")))?;
            Dispatch::from_unknown(&unknown)
        }
    }
}

impl ScriptingHost for RunningSapGui {
    fn scripting_engine(&self) -> Result<Box<dyn ScriptingEngine>, SapError> {
        let sapgui = self.rot_entry()?;
        let application = sapgui.get_object("GetScriptingEngine")?;
        Ok(Box::new(SapApplication(application)))
    }
}

/// Items of a `GuiComponentCollection`, in order.
fn collection_items(collection: &Dispatch) -> Result<Vec<Dispatch>, SapError> {
    let count = collection.get_i32("Count")?.max(0);
    (0..count)
        .map(|i| {
            let item = collection.call("ElementAt", vec![VARIANT::from(i)])?;
            optional_object(&item).ok_or_else(|| {
                SapError::PlatformError(format!("collection item {i} is not an object"))
            })
        })
        .collect()
}

struct SapApplication(Dispatch);

impl ScriptingEngine for SapApplication {
    fn connections(&self) -> Result<Vec<Box<dyn GuiConnection>>, SapError> {
        let connections = self.0.get_object("Connections")?;
        Ok(collection_items(&connections)?
            .into_iter()
            .map(|c| Box::new(SapConnection(c)) as Box<dyn GuiConnection>)
            .collect())
    }
}

struct SapConnection(Dispatch);

impl GuiConnection for SapConnection {
    fn id(&self) -> String {
        self.0
            .get_string("Id")
            .unwrap_or_else(|_| "/app/con[?]".to_string())
    }

    fn disabled_by_server(&self) -> Result<bool, SapError> {
        self.0.get_bool("DisabledByServer")
    }

    fn sessions(&self) -> Result<Vec<Box<dyn GuiSession>>, SapError> {
        let sessions = self.0.get_object("Sessions")?;
        Ok(collection_items(&sessions)?
            .into_iter()
            .map(|s| Box::new(SapSession(s)) as Box<dyn GuiSession>)
            .collect())
    }
}

struct SapSession(Dispatch);

impl GuiSession for SapSession {
    fn find_by_id(&self, id: &str) -> Result<Box<dyn GuiElement>, SapError> {
        // findById(id, False) returns Nothing instead of raising when the id is missing.
        let found = self
            .0
            .call("findById", vec![VARIANT::from(id), VARIANT::from(false)])?;
        optional_object(&found)
            .map(|element| Box::new(SapElement(element)) as Box<dyn GuiElement>)
            .ok_or_else(|| SapError::ElementNotFound(id.to_string()))
    }

    fn id(&self) -> String {
        self.0
            .get_string("Id")
            .unwrap_or_else(|_| "/app/con[?]/ses[?]".to_string())
    }
}

struct SapElement(Dispatch);

impl GuiElement for SapElement {
    fn text(&self) -> Result<String, SapError> {
        self.0.get_string("Text")
    }

    fn set_text(&self, value: &str) -> Result<(), SapError> {
        self.0.put("Text", VARIANT::from(value))
    }

    fn press(&self) -> Result<(), SapError> {
        self.0.call("press", Vec::new()).map(|_| ())
    }
}
