//! Windows platform implementation of SAP GUI scripting
//!
//! SAP GUI registers itself in the COM running object table under the display
//! name `SAPGUI`. Everything below that is late-bound `IDispatch` calls.

pub mod dispatch;
pub mod engine;
pub mod policy;

pub use dispatch::ComApartment;
pub use engine::RunningSapGui;
