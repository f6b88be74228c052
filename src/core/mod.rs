// Orchestration core
pub mod artifacts;
pub mod build;
pub mod cleaner;
pub mod error;
pub mod project;
pub mod queue;
pub mod reaper;
pub mod release;
pub mod reporter;
pub mod runner;
pub mod session;
pub mod version;

// Configuration and filesystem layout
pub mod defaults;
pub mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use reporter::{Reporter, Severity, Status};
pub use session::{Operation, Session};
