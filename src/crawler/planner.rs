use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::models::{Chapter, ChapterNumber};

const NEARBY_RANGE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Only the highest-numbered chapter.
    Latest,
    /// Every chapter numbered at least this, ascending.
    From(ChapterNumber),
    /// Exactly one chapter.
    Chapter(ChapterNumber),
}

/// Picks the chapters a run should process. `chapters` must be sorted
/// ascending, as the lister returns them.
#[instrument(skip(chapters), fields(available = chapters.len()))]
pub fn select(chapters: &[Chapter], mode: Mode) -> Result<Vec<Chapter>> {
    let selected: Vec<Chapter> = match mode {
        Mode::Latest => chapters
            .iter()
            .max_by_key(|chapter| chapter.number)
            .cloned()
            .into_iter()
            .collect(),
        Mode::From(start) => chapters
            .iter()
            .filter(|chapter| chapter.number >= start)
            .cloned()
            .collect(),
        Mode::Chapter(number) => {
            let Some(chapter) = chapters.iter().find(|chapter| chapter.number == number) else {
                return Err(Error::ChapterNotFound {
                    number,
                    hint: not_found_hint(chapters, number),
                });
            };
            vec![chapter.clone()]
        }
    };

    info!("selected {} chapters", selected.len());
    Ok(selected)
}

fn not_found_hint(chapters: &[Chapter], wanted: ChapterNumber) -> String {
    let (Some(first), Some(last)) = (chapters.first(), chapters.last()) else {
        return "The series lists no chapters.".to_owned();
    };
    let closest = chapters
        .iter()
        .min_by(|a, b| a.number.distance(wanted).total_cmp(&b.number.distance(wanted)))
        .map(|chapter| chapter.number)
        .unwrap_or(first.number);
    let nearby = chapters
        .iter()
        .filter(|chapter| chapter.number.distance(wanted) <= NEARBY_RANGE)
        .map(|chapter| chapter.number.to_string())
        .collect::<Vec<_>>();

    let mut hint = format!(
        "Closest chapter: {}. Available range: {} - {}.",
        closest, first.number, last.number
    );
    if !nearby.is_empty() {
        hint.push_str(&format!(" Nearby chapters: {}.", nearby.join(", ")));
    }
    hint
}
