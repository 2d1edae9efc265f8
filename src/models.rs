use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// Chapter number as printed by the site. Half chapters such as `45.5` are
/// ordered between their neighbours.
#[derive(Debug, Clone, Copy)]
pub struct ChapterNumber(f64);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid chapter number `{0}`")]
pub struct ParseChapterNumberError(String);

impl ChapterNumber {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    pub fn distance(self, other: Self) -> f64 {
        (self.0 - other.0).abs()
    }
}

impl FromStr for ChapterNumber {
    type Err = ParseChapterNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('.');
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ParseChapterNumberError(s.to_owned()));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| ParseChapterNumberError(s.to_owned()))
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub number: ChapterNumber,
    pub url: String,
    pub id: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
}

impl Chapter {
    pub fn new(number: ChapterNumber, url: impl Into<String>) -> Self {
        Self {
            number,
            url: url.into(),
            id: None,
            volume: None,
            title: None,
        }
    }

    pub fn display_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(volume) = &self.volume {
            parts.push(format!("Volume {}", volume));
        }
        parts.push(format!("Chapter {}", self.number));
        if let Some(title) = &self.title {
            parts.push(format!("- {}", title));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub image_url: String,
}
