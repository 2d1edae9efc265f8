use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use url::Url;

use crate::crawler::downloader::{Fetch, PageContent};
use crate::error::{Error, Result};

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("bato-fetch-test-{:x}", rand::random::<u64>()))
}

pub fn png(width: u32, height: u32) -> Bytes {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30])));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// In-memory site that records every request made against it.
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    images: HashMap<String, Bytes>,
    requests: RefCell<Vec<String>>,
}

impl FakeSite {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_owned(), html.to_owned());
        self
    }

    pub fn image(mut self, url: &str, bytes: Bytes) -> Self {
        self.images.insert(url.to_owned(), bytes);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn image_requests(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|url| self.images.contains_key(*url) || !self.pages.contains_key(*url))
            .count()
    }

    pub fn reset(&self) {
        self.requests.borrow_mut().clear();
    }
}

impl Fetch for FakeSite {
    async fn page(&self, url: &str) -> Result<PageContent> {
        self.requests.borrow_mut().push(url.to_owned());
        let html = self.pages.get(url).ok_or_else(|| Error::Fetch {
            url: url.to_owned(),
            reason: "404 Not Found".into(),
        })?;
        let url = Url::parse(url).map_err(|e| Error::Fetch {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(PageContent {
            url,
            html: html.clone(),
        })
    }

    async fn image(&self, url: &str) -> Result<Bytes> {
        self.requests.borrow_mut().push(url.to_owned());
        self.images.get(url).cloned().ok_or_else(|| Error::Fetch {
            url: url.to_owned(),
            reason: "404 Not Found".into(),
        })
    }
}
