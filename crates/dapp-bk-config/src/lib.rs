//! Configuration loading for dapp-bk
//!
//! This crate handles:
//! - Project environment (`build/.env`) discovery and parsing
//! - Global configuration (`~/.config/dapp-bk/config.toml`)

mod error;
mod global;
mod project;

pub use error::*;
pub use global::*;
pub use project::*;
