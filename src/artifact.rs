use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::models::ChapterNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Images,
}

/// Final on-disk output for one chapter of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: Format,
    series_dir: PathBuf,
    stem: String,
}

impl Artifact {
    pub fn locate(
        out_dir: &Path,
        series: &str,
        number: ChapterNumber,
        format: Format,
    ) -> Result<Self> {
        let series_dir = out_dir.join(series_dir_name(series)?);
        let stem = number.to_string();
        let path = match format {
            Format::Pdf => series_dir.join(format!("{}.pdf", stem)),
            Format::Images => series_dir.join(&stem),
        };
        Ok(Self {
            path,
            format,
            series_dir,
            stem,
        })
    }

    pub fn series_dir(&self) -> &Path {
        &self.series_dir
    }

    /// Hidden directory that collects page images before they are published.
    pub fn staging_dir(&self) -> PathBuf {
        self.series_dir.join(format!(".{}.partial", self.stem))
    }

    /// Hidden file the PDF is written to before being renamed into place.
    pub fn pdf_part_path(&self) -> PathBuf {
        self.series_dir.join(format!(".{}.pdf.part", self.stem))
    }

    /// A non-empty PDF file or a non-empty image directory counts as done.
    pub async fn is_complete(&self) -> bool {
        match self.format {
            Format::Pdf => fs::metadata(&self.path)
                .await
                .map(|meta| meta.is_file() && meta.len() > 0)
                .unwrap_or(false),
            Format::Images => dir_has_entries(&self.path).await,
        }
    }
}

pub(crate) async fn dir_has_entries(path: &Path) -> bool {
    let Ok(mut entries) = fs::read_dir(path).await else {
        return false;
    };
    matches!(entries.next_entry().await, Ok(Some(_)))
}

fn series_dir_name(series: &str) -> Result<String> {
    let name = series.trim().replace(['/', '\\'], "_");
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidSeries(series.to_owned()));
    }
    Ok(name)
}

/// Scratch path that is deleted on drop unless it was published.
pub struct Staging {
    path: PathBuf,
    armed: bool,
}

impl Staging {
    /// Creates an empty staging directory, clearing leftovers of an
    /// interrupted run.
    pub async fn dir(path: PathBuf) -> Result<Self> {
        if fs::metadata(&path).await.is_ok() {
            info!("removing leftover staging directory: {}", path.display());
            fs::remove_dir_all(&path).await?;
        }
        fs::create_dir_all(&path).await?;
        Ok(Self { path, armed: true })
    }

    /// Tracks a file that does not exist yet.
    pub async fn file(path: PathBuf) -> Result<Self> {
        if fs::metadata(&path).await.is_ok() {
            fs::remove_file(&path).await?;
        }
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the staged path to `target` and stops tracking it.
    pub async fn publish(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let result = if self.path.is_dir() {
            std::fs::remove_dir_all(&self.path)
        } else if self.path.exists() {
            std::fs::remove_file(&self.path)
        } else {
            return;
        };
        match result {
            Ok(_) => info!("staging path removed: {}", self.path.display()),
            Err(e) => error!("failed to remove staging path {}: {}", self.path.display(), e),
        }
    }
}
