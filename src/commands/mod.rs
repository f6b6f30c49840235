//! Voice command module
//!
//! Maps spoken phrases and keyboard shortcuts to navigation and help, with a
//! manual command picker as the fallback for every voice input failure.

mod dispatcher;
mod table;

pub use dispatcher::{Dispatcher, DispatcherStatus};
pub use table::{CommandTable, Route, QUICK_COMMANDS};
