pub mod app;
pub mod cli;
pub mod compose;
pub mod email_content;
pub mod error;
pub mod gmail_api;
pub mod logging;
pub mod mime;
pub mod output;
pub mod types;

pub use error::{Error, Result};
