use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::config::SiteConfig;
use crate::error::{Error, Result};

/// HTML document together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: Url,
    pub html: String,
}

/// Transport used by the crawler. Requests are issued one at a time.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn page(&self, url: &str) -> Result<PageContent>;

    async fn image(&self, url: &str) -> Result<Bytes>;
}

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(site.user_agent.as_str())
            .timeout(site.timeout())
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let fetch_error = |e: reqwest::Error| Error::Fetch {
            url: url.to_owned(),
            reason: e.to_string(),
        };
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)
    }
}

impl Fetch for Downloader {
    #[instrument(skip(self))]
    async fn page(&self, url: &str) -> Result<PageContent> {
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| Error::Fetch {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        debug!("fetched {} bytes from {}", html.len(), final_url);
        Ok(PageContent {
            url: final_url,
            html,
        })
    }

    #[instrument(skip(self))]
    async fn image(&self, url: &str) -> Result<Bytes> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| Error::Fetch {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        debug!("downloaded {} bytes", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_builtin_config() {
        let site = SiteConfig::builtin().unwrap();
        assert!(Downloader::new(&site).is_ok());
    }
}
