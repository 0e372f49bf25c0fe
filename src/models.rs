mod ids;
mod link;
mod note;

pub use ids::NoteId;
pub use link::{LinkOccurrence, TargetSpec};
pub use note::{Note, NoteBuilder};
