pub mod action;
pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod mode;
pub mod session;
pub mod triggers;
pub mod types;

pub use error::{AssistError, Result};
pub use session::{Assistant, Session};
