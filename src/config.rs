use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use crate::artifact::Format;
use crate::crawler::planner::Mode;
use crate::error::Result;

static BUILTIN_SITE_CONFIG: &str = include_str!("../config/bato.toml");

static ENV_PREFIX: &str = "BATO_FETCH";

/// Site layout: where the pages live and how to read them.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,
    pub series_path: String,
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub listing: ListingRules,
    pub images: ImageRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingRules {
    #[serde(deserialize_with = "deserialize_selector")]
    pub anchor: Selector,
    /// Matched against each anchor `href`; `{series}` is replaced by the slug.
    pub href_pattern: String,
    #[serde(deserialize_with = "deserialize_regex")]
    pub text_pattern: Regex,
    pub embedded_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRules {
    #[serde(deserialize_with = "deserialize_selector")]
    pub image: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub source: Selector,
    pub attributes: Vec<String>,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub cdn_markers: Vec<String>,
    #[serde(default)]
    pub asset_markers: Vec<String>,
    pub preferred_marker: String,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: usize,
    #[serde(deserialize_with = "deserialize_regex")]
    pub page_name_pattern: Regex,
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_fallback_threshold() -> usize {
    5
}

impl SiteConfig {
    /// Built-in bato layout, then an optional override file, then
    /// `BATO_FETCH_*` environment variables.
    #[instrument]
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            BUILTIN_SITE_CONFIG,
            config::FileFormat::Toml,
        ));
        if let Some(path) = override_path {
            debug!("loading site config override from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }
        let site = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(site)
    }

    pub fn builtin() -> Result<Self> {
        let site = config::Config::builder()
            .add_source(config::File::from_str(
                BUILTIN_SITE_CONFIG,
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()?;
        Ok(site)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn series_url(&self, series: &str) -> String {
        let values = HashMap::from([("series".to_owned(), series.to_owned())]);
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            replace_params(&self.series_path, &values)
        )
    }

    pub fn href_pattern(&self, series: &str) -> std::result::Result<Regex, regex::Error> {
        let values = HashMap::from([("series".to_owned(), regex::escape(series))]);
        Regex::new(&replace_params(&self.listing.href_pattern, &values))
    }

    /// Chapter link pattern for any series, capturing the slug as `series`.
    pub fn chapter_url_pattern(&self) -> std::result::Result<Regex, regex::Error> {
        let values = HashMap::from([("series".to_owned(), r"(?P<series>[^/?#]+)".to_owned())]);
        Regex::new(&replace_params(&self.listing.href_pattern, &values))
    }
}

fn replace_params(template: &str, values: &HashMap<String, String>) -> String {
    let re = Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid");
    re.replace_all(template, |caps: &regex::Captures| {
        values
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Chapters of a series, picked from its listing.
    Series { slug: String, mode: Mode },
    /// A single chapter reader URL. The series listing is not fetched.
    ChapterUrl(String),
}

/// One run of the tool, as requested on the command line.
#[derive(Debug, Clone)]
pub struct Job {
    pub target: Target,
    pub out_dir: PathBuf,
    pub format: Format,
    pub dry_run: bool,
    pub keep_going: bool,
}

fn deserialize_selector<'de, D>(deserializer: D) -> std::result::Result<Selector, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Selector::parse(&s).map_err(|e| serde::de::Error::custom(format!("Invalid selector: {}", e)))
}

fn deserialize_regex<'de, D>(deserializer: D) -> std::result::Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Regex::new(&s).map_err(|e| serde::de::Error::custom(format!("Invalid pattern '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let site = SiteConfig::builtin().unwrap();
        assert_eq!(site.name, "bato");
        assert_eq!(site.images.fallback_threshold, 5);
        assert_eq!(site.timeout(), Duration::from_secs(20));
    }

    #[test]
    fn series_url_fills_placeholder() {
        let site = SiteConfig::builtin().unwrap();
        assert_eq!(
            site.series_url("86663-en-grand-blue-dreaming-official"),
            "https://bato.si/title/86663-en-grand-blue-dreaming-official"
        );
    }

    #[test]
    fn href_pattern_escapes_series() {
        let site = SiteConfig::builtin().unwrap();
        let re = site.href_pattern("a.b").unwrap();
        assert!(re.is_match("/title/a.b/123-ch_4"));
        assert!(!re.is_match("/title/axb/123-ch_4"));
    }

    #[test]
    fn chapter_url_pattern_captures_series() {
        let site = SiteConfig::builtin().unwrap();
        let caps = site
            .chapter_url_pattern()
            .unwrap()
            .captures("/title/86663-en-gbd/1680643-vol_11_ch_45.5")
            .unwrap();
        assert_eq!(&caps["series"], "86663-en-gbd");
        assert_eq!(&caps["volume"], "11");
        assert_eq!(&caps["number"], "45.5");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let values = HashMap::from([("series".to_owned(), "x".to_owned())]);
        assert_eq!(replace_params("/t/{series}/{id}", &values), "/t/x/{id}");
    }

    #[test]
    fn override_file_replaces_fields() {
        let path = std::env::temp_dir().join(format!(
            "bato-fetch-site-{:x}.toml",
            rand::random::<u64>()
        ));
        std::fs::write(&path, "name = \"mirror\"\nbase_url = \"https://example.org\"\n").unwrap();
        let site = SiteConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(site.name, "mirror");
        assert_eq!(site.base_url, "https://example.org");
        assert_eq!(site.listing.embedded_key, "chapters");
    }

    #[test]
    fn environment_overrides_builtin_values() {
        // SAFETY: no other test reads or writes these variables.
        unsafe {
            std::env::set_var("BATO_FETCH_TIMEOUT_SECS", "45");
            std::env::set_var("BATO_FETCH_IMAGES__FALLBACK_THRESHOLD", "9");
        }
        let site = SiteConfig::load(None);
        unsafe {
            std::env::remove_var("BATO_FETCH_TIMEOUT_SECS");
            std::env::remove_var("BATO_FETCH_IMAGES__FALLBACK_THRESHOLD");
        }

        let site = site.unwrap();
        assert_eq!(site.timeout(), Duration::from_secs(45));
        assert_eq!(site.images.fallback_threshold, 9);
        assert_eq!(site.name, "bato");
    }
}
