//! Uninstall planning.
//!
//! Decides which installed packages a removal request deletes, and in which
//! order, without ever deleting a package something that stays installed
//! still requires.

mod graph;
mod plan;

pub use graph::DependencyGraph;
pub use plan::plan_uninstall;
