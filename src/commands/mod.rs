//! Command layer behind the `flowpack` CLI.
//!
//! Each command builds its services from a [`config::Config`], runs one use
//! case and prints the outcome.

pub mod config;
mod install;
mod list;
mod search;
pub mod services;
mod uninstall;
mod update;

pub use install::{InstallFlags, install};
pub use list::list;
pub use search::search;
pub use uninstall::uninstall;
pub use update::{update, updates};
