use std::path::PathBuf;

use tokio::fs;
use tracing::{info, instrument};

use crate::artifact::{Artifact, Format, Staging, dir_has_entries};
use crate::crawler::downloader::Fetch;
use crate::error::{Error, Result};
use crate::models::{Chapter, Page};
use crate::pdf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded(PathBuf),
    /// Artifact was already on disk.
    Skipped(PathBuf),
    /// Dry run; nothing was written.
    Planned(PathBuf),
}

impl Outcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            Outcome::Downloaded(path) | Outcome::Skipped(path) | Outcome::Planned(path) => path,
        }
    }
}

/// Turns a chapter's pages into its final artifact. Nothing appears at the
/// artifact path unless every page was fetched and written.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler;

impl Assembler {
    #[instrument(skip_all, fields(chapter = %chapter.number))]
    pub async fn assemble<F: Fetch>(
        &self,
        fetcher: &F,
        chapter: &Chapter,
        pages: &[Page],
        artifact: &Artifact,
        dry_run: bool,
    ) -> Result<Outcome> {
        if dry_run {
            info!(
                "[dry-run] would save {} from {} to {}",
                chapter.display_name(),
                chapter.url,
                artifact.path.display()
            );
            return Ok(Outcome::Planned(artifact.path.clone()));
        }
        if artifact.is_complete().await {
            info!("already downloaded: {}", artifact.path.display());
            return Ok(Outcome::Skipped(artifact.path.clone()));
        }

        if pages.is_empty() {
            return Err(Error::Extraction {
                url: chapter.url.clone(),
            });
        }

        let staging = Staging::dir(artifact.staging_dir()).await?;
        let mut files = Vec::with_capacity(pages.len());
        for page in pages {
            files.push(self.save_page(fetcher, page, &staging).await?);
        }

        match artifact.format {
            Format::Images => {
                if fs::metadata(&artifact.path).await.is_ok() && !dir_has_entries(&artifact.path).await {
                    fs::remove_dir(&artifact.path).await?;
                }
                staging.publish(&artifact.path).await?;
            }
            Format::Pdf => {
                let part = Staging::file(artifact.pdf_part_path()).await?;
                pdf::compose(&files, part.path())?;
                part.publish(&artifact.path).await?;
            }
        }

        info!("saved {} to {}", chapter.display_name(), artifact.path.display());
        Ok(Outcome::Downloaded(artifact.path.clone()))
    }

    async fn save_page<F: Fetch>(
        &self,
        fetcher: &F,
        page: &Page,
        staging: &Staging,
    ) -> Result<PathBuf> {
        let download_error = |reason: String| Error::Download {
            index: page.index,
            url: page.image_url.clone(),
            reason,
        };

        info!("downloading page {}: {}", page.index, page.image_url);
        let bytes = fetcher
            .image(&page.image_url)
            .await
            .map_err(|e| download_error(e.to_string()))?;
        let format = image::guess_format(&bytes)
            .map_err(|_| download_error("response is not a recognized image".into()))?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let path = staging
            .path()
            .join(format!("{:03}.{}", page.index, extension));
        fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{image_widths, page_count};
    use crate::testing::{FakeSite, png, scratch_dir};

    fn chapter() -> Chapter {
        Chapter::new("45.5".parse().unwrap(), "https://bato.si/title/s/1-ch_45.5")
    }

    fn pages(n: usize) -> Vec<Page> {
        (1..=n)
            .map(|index| Page {
                index,
                image_url: format!("https://img.mb/media/p{}.png", index),
            })
            .collect()
    }

    fn site(n: usize) -> FakeSite {
        (1..=n).fold(FakeSite::default(), |site, index| {
            site.image(
                &format!("https://img.mb/media/p{}.png", index),
                png(20 + index as u32, 30),
            )
        })
    }

    fn artifact(out: &std::path::Path, format: Format) -> Artifact {
        Artifact::locate(out, "s", chapter().number, format).unwrap()
    }

    #[tokio::test]
    async fn saves_images_in_page_order() {
        let out = scratch_dir();
        let target = artifact(&out, Format::Images);
        let fake = site(3);

        let outcome = Assembler
            .assemble(&fake, &chapter(), &pages(3), &target, false)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Downloaded(out.join("s").join("45.5")));
        let mut names: Vec<_> = std::fs::read_dir(&target.path)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["001.png", "002.png", "003.png"]);
        assert_eq!(
            fake.requests(),
            [
                "https://img.mb/media/p1.png",
                "https://img.mb/media/p2.png",
                "https://img.mb/media/p3.png",
            ]
        );
        assert!(!target.staging_dir().exists());
        std::fs::remove_dir_all(&out).unwrap();
    }

    #[tokio::test]
    async fn builds_pdf_and_cleans_staging() {
        let out = scratch_dir();
        let target = artifact(&out, Format::Pdf);

        Assembler
            .assemble(&site(3), &chapter(), &pages(3), &target, false)
            .await
            .unwrap();

        let bytes = std::fs::read(&target.path).unwrap();
        assert_eq!(page_count(&bytes), 3);
        assert_eq!(image_widths(&bytes), [21, 22, 23]);
        assert!(!target.staging_dir().exists());
        assert!(!target.pdf_part_path().exists());
        let entries: Vec<_> = std::fs::read_dir(target.series_dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        std::fs::remove_dir_all(&out).unwrap();
    }

    #[tokio::test]
    async fn existing_artifact_is_left_untouched() {
        let out = scratch_dir();
        let target = artifact(&out, Format::Pdf);
        std::fs::create_dir_all(target.series_dir()).unwrap();
        std::fs::write(&target.path, b"%PDF-existing").unwrap();
        let fake = site(3);

        let outcome = Assembler
            .assemble(&fake, &chapter(), &pages(3), &target, false)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert!(fake.requests().is_empty());
        assert_eq!(std::fs::read(&target.path).unwrap(), b"%PDF-existing");
        std::fs::remove_dir_all(&out).unwrap();
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let out = scratch_dir();
        let fake = site(2);
        for format in [Format::Pdf, Format::Images] {
            let outcome = Assembler
                .assemble(&fake, &chapter(), &pages(2), &artifact(&out, format), true)
                .await
                .unwrap();
            assert!(matches!(outcome, Outcome::Planned(_)));
        }
        assert!(fake.requests().is_empty());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn failed_page_leaves_no_artifact() {
        let out = scratch_dir();
        // page 3 is missing on the server
        let fake = site(2);
        for format in [Format::Pdf, Format::Images] {
            let target = artifact(&out, format);
            let err = Assembler
                .assemble(&fake, &chapter(), &pages(4), &target, false)
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Download { index: 3, .. }));
            assert!(!target.path.exists());
            assert!(!target.staging_dir().exists());
            assert!(!target.pdf_part_path().exists());
        }
        assert_eq!(fake.requests().len(), 6);
        std::fs::remove_dir_all(&out).unwrap();
    }

    #[tokio::test]
    async fn non_image_response_is_a_download_error() {
        let out = scratch_dir();
        let fake = FakeSite::default().image(
            "https://img.mb/media/p1.png",
            bytes::Bytes::from_static(b"<html>rate limited</html>"),
        );
        let target = artifact(&out, Format::Images);

        let err = Assembler
            .assemble(&fake, &chapter(), &pages(1), &target, false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download { index: 1, .. }));
        assert!(!target.path.exists());
        std::fs::remove_dir_all(&out).unwrap();
    }

    #[tokio::test]
    async fn no_pages_publishes_nothing() {
        let out = scratch_dir();
        for format in [Format::Pdf, Format::Images] {
            let target = artifact(&out, format);
            let err = Assembler
                .assemble(&FakeSite::default(), &chapter(), &[], &target, false)
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Extraction { .. }));
            assert!(!target.path.exists());
            assert!(!target.staging_dir().exists());
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn empty_image_directory_is_replaced() {
        let out = scratch_dir();
        let target = artifact(&out, Format::Images);
        std::fs::create_dir_all(&target.path).unwrap();

        let outcome = Assembler
            .assemble(&site(1), &chapter(), &pages(1), &target, false)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Downloaded(_)));
        assert!(target.path.join("001.png").exists());
        std::fs::remove_dir_all(&out).unwrap();
    }
}
