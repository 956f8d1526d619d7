//! Command handlers.
//!
//! Each handler does one operation against a `SyncContext` and returns an `Out` with a message
//! and, optionally, structured data. The CLI prints it; the HTTP layer turns it into a response.

mod records;
mod serve;
mod sheet;
mod status;
mod sync;

use crate::api::Mode;
use crate::error::{ErrorType, IntoResult};
use crate::sync::SyncContext;
use crate::{Config, Result};
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use records::{cached_data, forward_changes, insert_record, view_data};
pub use serve::serve;
pub use sheet::{append_data, clear_data, get_sheet_data, update_data};
pub use status::{sync_status, SyncStatus};
pub use sync::{manual_sync, sync_down, sync_up, update_sheet_data};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data to both the command line and HTTP interfaces.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Consumes the `Out` and returns the structured data.
    pub fn into_structure(self) -> Option<T> {
        self.structure
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Opens the store and the sheet for `config` and wraps them in a `SyncContext`.
pub(crate) async fn context(config: Config, mode: Mode) -> Result<SyncContext> {
    let store = crate::db::connect(&config)
        .await
        .pub_result(ErrorType::Store)?;
    let sheet = crate::api::sheet(&config, mode)
        .await
        .pub_result(ErrorType::RemoteSheet)?;
    Ok(SyncContext::new(config, store, sheet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_json() {
        let out: Out<u32> = Out::new("Done.", 3);
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            serde_json::json!({ "message": "Done.", "structure": 3 })
        );
        let out: Out<u32> = "Nothing.".into();
        assert_eq!(out.message(), "Nothing.");
        assert!(out.structure().is_none());
    }
}
