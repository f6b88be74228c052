mod notes;
mod publisher;
mod types;

pub use notes::NotesFile;
pub use publisher::ReleasePublisher;
pub use types::{
    CreateOutput, DeleteReport, ReleaseSummary, ReleaseTask, StepResult, UpdateOutput,
};
