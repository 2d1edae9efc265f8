use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};

use bato_fetch::{BatoCrawler, ChapterNumber, Format, Job, Mode, SiteConfig, Target, logger, utils};

/// Downloads manga chapters from bato as PDFs or image folders.
#[derive(Parser)]
#[clap(version)]
#[clap(group(ArgGroup::new("mode").required(true).args(["latest", "from", "chapter", "url"])))]
struct Opts {
    /// Series slug, e.g. 86663-en-grand-blue-dreaming-official
    #[clap(long, required_unless_present = "url", conflicts_with = "url")]
    series: Option<String>,
    /// Download only the newest chapter
    #[clap(long)]
    latest: bool,
    /// Download every chapter from this number up to the newest
    #[clap(long, value_name = "NUMBER")]
    from: Option<ChapterNumber>,
    /// Download exactly this chapter
    #[clap(long, value_name = "NUMBER")]
    chapter: Option<ChapterNumber>,
    /// Fetch this chapter reader URL directly, skipping the series listing.
    /// With --dry-run its page images are only listed.
    #[clap(long)]
    url: Option<String>,
    #[clap(short, long, default_value = "downloads")]
    out: PathBuf,
    /// Keep page images instead of building a PDF
    #[clap(long)]
    no_pdf: bool,
    /// Report what would be downloaded without writing anything
    #[clap(long)]
    dry_run: bool,
    /// Continue with the next chapter when one fails
    #[clap(long)]
    keep_going: bool,
    /// TOML file overriding the built-in site layout
    #[clap(long, value_name = "FILE")]
    site_config: Option<PathBuf>,
}

impl Opts {
    fn job(&self) -> Result<Job> {
        let mode = match (self.from, self.chapter) {
            (Some(start), _) => Mode::From(start),
            (_, Some(number)) => Mode::Chapter(number),
            _ => Mode::Latest,
        };
        let target = match (&self.url, &self.series) {
            (Some(url), _) => Target::ChapterUrl(url.clone()),
            (None, Some(slug)) => Target::Series {
                slug: slug.clone(),
                mode,
            },
            (None, None) => anyhow::bail!("either --series or --url is required"),
        };
        Ok(Job {
            target,
            out_dir: self.out.clone(),
            format: if self.no_pdf { Format::Images } else { Format::Pdf },
            dry_run: self.dry_run,
            keep_going: self.keep_going,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logger::init();
    let opts = Opts::parse();
    let job = opts.job()?;

    let site = SiteConfig::load(opts.site_config.as_deref()).context("loading site config")?;
    let crawler = BatoCrawler::new(site)?;

    let start = Instant::now();
    let report = crawler
        .run(&job)
        .await
        .with_context(|| format!("run for {:?} failed", job.target))?;
    utils::log_summary(&report, start.elapsed());

    if !report.is_success() {
        anyhow::bail!("{} chapters failed", report.failures.len());
    }
    Ok(())
}
