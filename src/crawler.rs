pub mod assembler;
pub mod downloader;
pub mod parser;
pub mod planner;

use tracing::{error, info, instrument};

use crate::artifact::Artifact;
use crate::config::{Job, SiteConfig, Target};
use crate::error::{Error, Result};
use crate::models::{Chapter, ChapterNumber, Page};

pub use assembler::{Assembler, Outcome};
pub use downloader::{Downloader, Fetch, PageContent};
pub use parser::Parser;
pub use planner::Mode;

/// What happened to each selected chapter during a run.
#[derive(Debug, Default)]
pub struct Report {
    pub outcomes: Vec<(ChapterNumber, Outcome)>,
    pub failures: Vec<Error>,
}

impl Report {
    pub fn downloaded(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Downloaded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped(_)))
    }

    pub fn planned(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Planned(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| pred(outcome)).count()
    }
}

pub struct BatoCrawler<F = Downloader> {
    fetcher: F,
    parser: Parser,
    assembler: Assembler,
}

impl BatoCrawler<Downloader> {
    pub fn new(site: SiteConfig) -> Result<Self> {
        let downloader = Downloader::new(&site)?;
        Ok(Self::with_fetcher(site, downloader))
    }
}

impl<F: Fetch> BatoCrawler<F> {
    pub fn with_fetcher(site: SiteConfig, fetcher: F) -> Self {
        Self {
            fetcher,
            parser: Parser::new(site),
            assembler: Assembler,
        }
    }

    /// Chapters currently listed for `series`, ascending.
    pub async fn chapters(&self, series: &str) -> Result<Vec<Chapter>> {
        let url = self.parser.site().series_url(series);
        info!("fetching chapter list: {}", url);
        let page = self.fetcher.page(&url).await?;
        self.parser.chapters(&page, series)
    }

    /// Page images of one chapter, in reading order.
    pub async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let page = self.fetcher.page(&chapter.url).await?;
        self.parser.pages(&page)
    }

    pub async fn run(&self, job: &Job) -> Result<Report> {
        match &job.target {
            Target::Series { slug, mode } => self.run_series(slug, *mode, job).await,
            Target::ChapterUrl(url) => self.run_chapter_url(url, job).await,
        }
    }

    #[instrument(skip(self, job))]
    async fn run_series(&self, series: &str, mode: Mode, job: &Job) -> Result<Report> {
        let chapters = self.chapters(series).await?;
        let selected = planner::select(&chapters, mode)?;
        let mut report = Report::default();
        if selected.is_empty() {
            info!("nothing to do: no listed chapter matches {:?}", mode);
            return Ok(report);
        }

        for chapter in &selected {
            match self.process(chapter, series, job).await {
                Ok(outcome) => report.outcomes.push((chapter.number, outcome)),
                Err(e) => {
                    let e = e.in_chapter(chapter.number);
                    if !job.keep_going {
                        return Err(e);
                    }
                    error!("{}", e.chain());
                    report.failures.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Lists the page images of one chapter reader URL and, unless this is a
    /// dry run, saves the chapter into the usual series layout.
    #[instrument(skip(self, job))]
    async fn run_chapter_url(&self, url: &str, job: &Job) -> Result<Report> {
        let (series, chapter) = self.parser.chapter_from_url(url)?;
        let artifact = Artifact::locate(&job.out_dir, &series, chapter.number, job.format)?;

        let pages = self
            .pages(&chapter)
            .await
            .map_err(|e| e.in_chapter(chapter.number))?;
        for page in &pages {
            info!("page {}: {}", page.index, page.image_url);
        }

        let outcome = self
            .assembler
            .assemble(&self.fetcher, &chapter, &pages, &artifact, job.dry_run)
            .await
            .map_err(|e| e.in_chapter(chapter.number))?;
        Ok(Report {
            outcomes: vec![(chapter.number, outcome)],
            failures: Vec::new(),
        })
    }

    #[instrument(skip_all, fields(chapter = %chapter.number))]
    async fn process(&self, chapter: &Chapter, series: &str, job: &Job) -> Result<Outcome> {
        let artifact = Artifact::locate(&job.out_dir, series, chapter.number, job.format)?;

        // Checked before touching the chapter page so reruns stay offline.
        if artifact.is_complete().await {
            info!(
                "skipping {}: already downloaded at {}",
                chapter.display_name(),
                artifact.path.display()
            );
            return Ok(Outcome::Skipped(artifact.path));
        }
        if job.dry_run {
            return self
                .assembler
                .assemble(&self.fetcher, chapter, &[], &artifact, true)
                .await;
        }

        info!("processing {} ({})", chapter.display_name(), chapter.url);
        let pages = self.pages(chapter).await?;
        self.assembler
            .assemble(&self.fetcher, chapter, &pages, &artifact, false)
            .await
    }
}
