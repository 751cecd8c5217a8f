//! Shared utilities

pub mod config;
pub mod context;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;

pub use config::Config;
pub use context::GlobalContext;
pub use errors::BerthError;
