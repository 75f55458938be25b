#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use server::Server;
