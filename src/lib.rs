mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
mod retry;
mod server;
pub mod sync;


pub use api::{Mode, Sheet, SheetSnapshot, TestSheet, TestSheetState};
pub use config::{Config, ForwardConfig, MySqlSettings, Periods, StoreConfig};
pub use db::RowStore;
pub use error::{Error, ErrorType, Result};
