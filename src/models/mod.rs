pub mod summary;
pub mod track;

pub use summary::SessionSummary;
pub use track::{Difficulty, Note, TrackMetadata, TRACK_TAIL_SECONDS};
