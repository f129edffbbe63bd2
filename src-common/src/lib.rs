//! scbridge Common Library
//!
//! Error type, shared picker/loop types, configuration and logging setup used
//! by the bridge crate and the CLI.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{BridgeError, PlatformError};
pub use types::*;
