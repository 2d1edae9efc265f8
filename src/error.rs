use std::path::PathBuf;

use thiserror::Error;

use crate::models::ChapterNumber;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("chapter listing for series `{series}` not recognized: {reason}")]
    Listing { series: String, reason: String },

    #[error("no page images found at {url}")]
    Extraction { url: String },

    #[error("failed to download page {index} from {url}: {reason}")]
    Download {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("failed to assemble {}: {reason}", .path.display())]
    Assembly { path: PathBuf, reason: String },

    #[error("chapter {number} not found. {hint}")]
    ChapterNotFound { number: ChapterNumber, hint: String },

    #[error("chapter {number} failed")]
    Chapter {
        number: ChapterNumber,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid series slug `{0}`")]
    InvalidSeries(String),

    #[error("not a chapter URL: {0}")]
    InvalidChapterUrl(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn in_chapter(self, number: ChapterNumber) -> Self {
        Error::Chapter {
            number,
            source: Box::new(self),
        }
    }

    /// The message followed by every underlying cause.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
