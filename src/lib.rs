pub mod artifact;
pub mod config;
pub mod crawler;
pub mod error;
pub mod logger;
pub mod models;
pub mod pdf;
pub mod utils;

#[cfg(test)]
mod testing;

pub use artifact::{Artifact, Format};
pub use config::{Job, SiteConfig, Target};
pub use crawler::{BatoCrawler, Mode, Outcome, Report};
pub use error::{Error, Result};
pub use models::{Chapter, ChapterNumber, Page};
