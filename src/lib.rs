pub mod config;
pub mod data_model;
pub mod error;
pub mod executor;
pub mod llm;
pub mod schema;
pub mod store;
pub mod template;
pub mod utils;
pub mod watcher_logic;

pub use error::{Result, WatcherError};
