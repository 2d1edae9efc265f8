use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::crawler::downloader::PageContent;
use crate::error::{Error, Result};
use crate::models::{Chapter, ChapterNumber, Page};

/// All knowledge of the site's markup lives here.
#[derive(Debug, Clone)]
pub struct Parser {
    site: SiteConfig,
}

#[derive(Deserialize)]
struct EmbeddedChapter {
    id: Scalar,
    number: Scalar,
    #[serde(default)]
    volume: Option<Scalar>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.trim().to_owned(),
        }
    }
}

impl Parser {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Chapters linked from a series page, ascending by number. The first
    /// link seen for a number wins.
    #[instrument(skip(self, page))]
    pub fn chapters(&self, page: &PageContent, series: &str) -> Result<Vec<Chapter>> {
        let listing_error = |reason: String| Error::Listing {
            series: series.to_owned(),
            reason,
        };
        let pattern = self
            .site
            .href_pattern(series)
            .map_err(|e| listing_error(format!("invalid chapter link pattern: {}", e)))?;

        let document = Html::parse_document(&page.html);
        let mut chapters: Vec<Chapter> = document
            .select(&self.site.listing.anchor)
            .filter_map(|anchor| self.anchor_chapter(anchor, &pattern, &page.url))
            .collect();

        if chapters.is_empty() {
            debug!("no chapter links matched, trying embedded chapter data");
            chapters = self.embedded_chapters(&page.html, series);
        }

        if chapters.is_empty() {
            warn!("series page layout not recognized");
            return Err(listing_error(format!(
                "no chapter links or embedded chapter data found at {}",
                page.url
            )));
        }

        chapters.sort_by_key(|chapter| chapter.number);
        chapters.dedup_by_key(|chapter| chapter.number);
        info!("found {} chapters", chapters.len());
        Ok(chapters)
    }

    /// Reads the series slug and chapter identity out of a chapter reader URL.
    pub fn chapter_from_url(&self, url: &str) -> Result<(String, Chapter)> {
        let invalid = || Error::InvalidChapterUrl(url.to_owned());
        let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
        let pattern = self.site.chapter_url_pattern().map_err(|_| invalid())?;
        let caps = pattern.captures(parsed.path()).ok_or_else(invalid)?;

        let series = caps.name("series").ok_or_else(invalid)?.as_str().to_owned();
        let number = caps
            .name("number")
            .ok_or_else(invalid)?
            .as_str()
            .parse::<ChapterNumber>()
            .map_err(|_| invalid())?;

        let chapter = Chapter {
            number,
            url: parsed.to_string(),
            id: caps.name("id").map(|m| m.as_str().to_owned()),
            volume: caps.name("volume").map(|m| m.as_str().to_owned()),
            title: None,
        };
        Ok((series, chapter))
    }

    fn anchor_chapter(&self, anchor: ElementRef, pattern: &Regex, base: &Url) -> Option<Chapter> {
        let href = anchor.value().attr("href")?;
        let caps = pattern.captures(href)?;
        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let text_caps = self.site.listing.text_pattern.captures(&text);

        let raw_number = caps
            .name("number")
            .or_else(|| text_caps.as_ref().and_then(|c| c.name("number")))?
            .as_str();
        let Ok(number) = raw_number.parse::<ChapterNumber>() else {
            debug!("skipping link {} with unreadable number {}", href, raw_number);
            return None;
        };
        let url = base.join(href).ok()?;

        let title = text_caps
            .as_ref()
            .and_then(|c| c.get(0))
            .map(|m| text[m.end()..].trim_start_matches([' ', ':', '-', '.']).trim())
            .filter(|title| !title.is_empty())
            .map(str::to_owned);

        Some(Chapter {
            number,
            url: url.to_string(),
            id: caps.name("id").map(|m| m.as_str().to_owned()),
            volume: caps.name("volume").map(|m| m.as_str().to_owned()),
            title,
        })
    }

    fn embedded_chapters(&self, html: &str, series: &str) -> Vec<Chapter> {
        let key = regex::escape(&self.site.listing.embedded_key);
        let Ok(start_re) = Regex::new(&format!(r#""{}"\s*:\s*\["#, key)) else {
            return Vec::new();
        };
        let series_url = self.site.series_url(series);

        for found in start_re.find_iter(html) {
            let array_start = found.end() - 1;
            let mut stream = serde_json::Deserializer::from_str(&html[array_start..])
                .into_iter::<Vec<serde_json::Value>>();
            let Some(Ok(entries)) = stream.next() else {
                continue;
            };

            let chapters: Vec<Chapter> = entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<EmbeddedChapter>(entry).ok())
                .filter_map(|entry| embedded_chapter(entry, &series_url))
                .collect();
            if !chapters.is_empty() {
                return chapters;
            }
        }
        Vec::new()
    }

    /// Page images of a chapter in reading order.
    #[instrument(skip_all, fields(url = %page.url))]
    pub fn pages(&self, page: &PageContent) -> Result<Vec<Page>> {
        let rules = &self.site.images;
        let document = Html::parse_document(&page.html);
        let mut urls: Vec<Url> = Vec::new();

        for img in document.select(&rules.image) {
            for attr in &rules.attributes {
                let Some(value) = img.value().attr(attr) else {
                    continue;
                };
                let candidate = if attr.contains("srcset") || value.contains(',') {
                    first_srcset_url(value)
                } else {
                    Some(value.trim())
                };
                if let Some(candidate) = candidate {
                    self.accept(&page.url, candidate, &mut urls);
                }
            }
        }

        for source in document.select(&rules.source) {
            let value = source
                .value()
                .attr("srcset")
                .or_else(|| source.value().attr("src"));
            if let Some(candidate) = value.and_then(first_srcset_url) {
                self.accept(&page.url, candidate, &mut urls);
            }
        }

        if urls.len() < rules.fallback_threshold {
            debug!("only {} images in markup, scanning page text", urls.len());
            self.scan_text(&page.html, &mut urls);
        }

        let chosen = self.one_per_page(urls);
        if chosen.is_empty() {
            return Err(Error::Extraction {
                url: page.url.to_string(),
            });
        }

        info!("found {} page images", chosen.len());
        Ok(chosen
            .into_iter()
            .enumerate()
            .map(|(i, url)| Page {
                index: i + 1,
                image_url: url.to_string(),
            })
            .collect())
    }

    fn accept(&self, base: &Url, raw: &str, urls: &mut Vec<Url>) {
        let Some(url) = resolve(base, raw) else {
            return;
        };
        if !urls.contains(&url) && self.is_page_image(&url) {
            urls.push(url);
        }
    }

    fn scan_text(&self, html: &str, urls: &mut Vec<Url>) {
        let rules = &self.site.images;
        let extensions = rules
            .extensions
            .iter()
            .map(|ext| regex::escape(ext))
            .collect::<Vec<_>>()
            .join("|");
        let Ok(re) = Regex::new(&format!(
            r#"(?i)https?://[^\s"'“”<>()]+\.(?:{})(?:\?[^\s"'“”<>)]*)?"#,
            extensions
        )) else {
            return;
        };

        let mut seen = HashSet::new();
        for found in re.find_iter(html) {
            let cleaned = found
                .as_str()
                .trim()
                .trim_end_matches([',', ';', '"', ')', '\'', ']']);
            if !seen.insert(cleaned.to_owned()) {
                continue;
            }
            let Ok(url) = Url::parse(cleaned) else {
                continue;
            };
            if urls.contains(&url) || !self.is_page_image(&url) {
                continue;
            }
            if url.as_str().contains(&rules.preferred_marker) || urls.is_empty() {
                urls.push(url);
            }
        }
    }

    /// Mirrors of one page share a file name; keep the first of each and put
    /// names that look like page scans ahead of the rest.
    fn one_per_page(&self, urls: Vec<Url>) -> Vec<Url> {
        let rules = &self.site.images;
        let mut seen = HashSet::new();
        let mut pages = Vec::new();
        let mut others = Vec::new();

        for url in urls {
            let basename = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_owned();
            if basename.is_empty() || !seen.insert(basename.clone()) {
                continue;
            }
            if rules
                .asset_markers
                .iter()
                .any(|marker| url.as_str().contains(marker.as_str()))
            {
                continue;
            }
            if rules.page_name_pattern.is_match(&basename) {
                pages.push(url);
            } else {
                others.push(url);
            }
        }

        pages.extend(others);
        pages
    }

    fn is_page_image(&self, url: &Url) -> bool {
        let rules = &self.site.images;
        let path = url.path().to_lowercase();

        let blocked = path
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .any(|token| rules.blocklist.iter().any(|word| token.starts_with(word.as_str())));
        if blocked {
            return false;
        }

        let file_name = path.rsplit('/').next().unwrap_or_default();
        if let Some((_, ext)) = file_name.rsplit_once('.') {
            if rules.extensions.iter().any(|allowed| allowed == ext) {
                return true;
            }
        }
        rules
            .cdn_markers
            .iter()
            .any(|marker| path.contains(marker.as_str()))
    }
}

fn embedded_chapter(entry: EmbeddedChapter, series_url: &str) -> Option<Chapter> {
    let id = entry.id.into_string();
    let number = entry.number.into_string().parse::<ChapterNumber>().ok()?;
    let volume = entry
        .volume
        .map(Scalar::into_string)
        .filter(|v| !v.is_empty());
    let title = entry
        .title
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());
    let volume_part = volume
        .as_ref()
        .map(|v| format!("vol_{}_", v))
        .unwrap_or_default();

    Some(Chapter {
        number,
        url: format!("{}/{}-{}ch_{}", series_url, id, volume_part, number),
        id: Some(id),
        volume,
        title,
    })
}

fn first_srcset_url(value: &str) -> Option<&str> {
    value
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .and_then(|part| part.split_whitespace().next())
}

fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let url = base.join(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
