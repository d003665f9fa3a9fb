/// COLMAP integration module
///
/// This module handles:
/// - Building command lines and running the COLMAP executable (runner.rs)
/// - Reading back what COLMAP stored in its database (database.rs)

pub mod database;
pub mod runner;

pub use database::DatabaseSummary;
pub use runner::{Invocation, ProcessRunner, ToolRunner, ToolStatus};
