pub mod cli;
pub mod config;
pub mod error;
pub mod query;
pub mod resolution;
pub mod store;
pub mod transcript;

pub use config::Config;
pub use error::{ArchiveError, Result};
pub use resolution::{Resolution, Status};
pub use store::{ArchiveOutcome, Episode, EpisodeStore, TransitionOutcome};
pub use transcript::{Fingerprint, Role, Transcript, Turn};
