use std::fmt;
use std::future::Future;
use std::slice;

use tracing::{info, warn};

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use crate::exporter;
use crate::extractor::{self, ExtractionStatus, ListingSelectors, ScrapeReport};
use crate::fetcher::{self, BrowserSession, FetchSummary, PageRenderer, PageStore, StopSignal};
use crate::lock::RunLock;
use crate::tui::{keep_going, ScraperTUI};

/// Where a `Pipeline` currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Fetched,
    Extracting,
    Exported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Fetched => "fetched",
            Stage::Extracting => "extracting",
            Stage::Exported => "exported",
        };
        f.write_str(name)
    }
}

/// What a pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub fetch: Option<FetchSummary>,
    pub scrape: ScrapeReport,
    /// Rows written to the dataset; zero when nothing was exported.
    pub exported: usize,
}

/// Drives fetch, extract and export against one storage directory and one
/// dataset file.
///
/// Stages move `Idle -> Fetching -> Fetched -> Extracting -> Exported -> Idle`.
/// A failing stage drops back to `Idle`. Each operation holds a `RunLock`
/// on the storage directory while it runs.
pub struct Pipeline {
    config: CrawlerConfig,
    selectors: ListingSelectors,
    store: PageStore,
    stage: Stage,
}

impl Pipeline {
    pub fn new(config: CrawlerConfig) -> Self {
        Self::with_selectors(config, ListingSelectors::default())
    }

    pub fn with_selectors(config: CrawlerConfig, selectors: ListingSelectors) -> Self {
        let store = PageStore::new(&config.storage_dir);
        Self {
            config,
            selectors,
            store,
            stage: Stage::Idle,
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn urls(&self) -> Vec<String> {
        fetcher::get_urls(&self.config)
    }

    fn advance(&mut self, to: Stage) -> Result<()> {
        use Stage::*;

        let allowed = matches!(
            (self.stage, to),
            (Idle, Fetching)
                | (Fetching, Fetched)
                | (Fetched, Extracting)
                | (Idle, Extracting)
                | (Extracting, Exported)
                | (Exported, Idle)
                | (Fetched, Idle)
                | (Fetching, Idle)
                | (Extracting, Idle)
        );
        if !allowed {
            return Err(CrawlError::InvalidTransition {
                from: self.stage,
                to,
            });
        }

        info!("Pipeline {} -> {}", self.stage, to);
        self.stage = to;
        Ok(())
    }

    /// A finished fetch or export counts as idle for the next operation.
    fn settle(&mut self) {
        if matches!(self.stage, Stage::Fetched | Stage::Exported) {
            self.stage = Stage::Idle;
        }
    }

    fn fail<T>(&mut self, error: CrawlError) -> Result<T> {
        warn!("Pipeline failed while {}: {}", self.stage, error);
        self.stage = Stage::Idle;
        Err(error)
    }

    /// Fetches `urls` with a WebDriver browser session.
    pub async fn fetch(
        &mut self,
        urls: &[String],
        stop: &StopSignal,
        tui: Option<&mut ScraperTUI>,
    ) -> Result<FetchSummary> {
        self.settle();
        self.advance(Stage::Fetching)?;
        let _lock = match RunLock::acquire(self.store.dir()) {
            Ok(lock) => lock,
            Err(e) => return self.fail(e),
        };

        let result = fetcher::save_to_html(urls, &self.store, &self.config.browser, stop, tui).await;
        self.conclude_fetch(result)
    }

    /// Fetches `urls` through an already opened renderer, closing it afterwards.
    pub async fn fetch_with<R: PageRenderer>(
        &mut self,
        renderer: R,
        urls: &[String],
        stop: &StopSignal,
        tui: Option<&mut ScraperTUI>,
    ) -> Result<FetchSummary> {
        self.settle();
        self.advance(Stage::Fetching)?;
        let _lock = match RunLock::acquire(self.store.dir()) {
            Ok(lock) => lock,
            Err(e) => return self.fail(e),
        };

        let result = fetcher::fetch_with(renderer, urls, &self.store, stop, tui).await;
        self.conclude_fetch(result)
    }

    /// Fetches `urls` one page at a time, each with its own browser session,
    /// and stops at the first page that fails.
    pub async fn fetch_each(
        &mut self,
        urls: &[String],
        stop: &StopSignal,
        tui: Option<&mut ScraperTUI>,
    ) -> Result<FetchSummary> {
        let options = self.config.browser.clone();
        self.fetch_each_with(|| BrowserSession::connect(&options), urls, stop, tui)
            .await
    }

    /// `fetch_each` with renderers opened by `open`.
    pub async fn fetch_each_with<R, F, Fut>(
        &mut self,
        open: F,
        urls: &[String],
        stop: &StopSignal,
        tui: Option<&mut ScraperTUI>,
    ) -> Result<FetchSummary>
    where
        R: PageRenderer,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.settle();
        self.advance(Stage::Fetching)?;
        let _lock = match RunLock::acquire(self.store.dir()) {
            Ok(lock) => lock,
            Err(e) => return self.fail(e),
        };

        let result = fetch_page_by_page(&self.store, open, urls, stop, tui).await;
        self.conclude_fetch(result)
    }

    fn conclude_fetch(&mut self, result: Result<FetchSummary>) -> Result<FetchSummary> {
        match result {
            Ok(summary) => {
                self.advance(Stage::Fetched)?;
                Ok(summary)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Parses every saved page and replaces the dataset file with the result.
    ///
    /// When no listing could be parsed the existing dataset is left alone.
    pub fn extract_and_export(&mut self, mut tui: Option<&mut ScraperTUI>) -> Result<PipelineReport> {
        self.settle();
        self.advance(Stage::Extracting)?;
        let _lock = match RunLock::acquire(self.store.dir()) {
            Ok(lock) => lock,
            Err(e) => return self.fail(e),
        };

        let scrape = match extractor::scrape(&self.store, &self.selectors) {
            Ok(report) => report,
            Err(e) => return self.fail(e),
        };
        if let Some(tui) = tui.as_mut() {
            keep_going(
                tui.show_page_files(self.store.dir(), &scrape.files)
                    .and_then(|_| tui.show_scrape_report(&scrape)),
            );
        }

        if scrape.status() != ExtractionStatus::Parsed {
            info!("Nothing to export, keeping {}", self.config.output_file.display());
            self.advance(Stage::Idle)?;
            return Ok(PipelineReport {
                fetch: None,
                scrape,
                exported: 0,
            });
        }

        let exported = match exporter::export_records(&self.config.output_file, &scrape.records) {
            Ok(count) => count,
            Err(e) => return self.fail(e),
        };
        if let Some(tui) = tui.as_mut() {
            keep_going(tui.show_export(exported, &self.config.output_file));
        }
        self.advance(Stage::Exported)?;

        Ok(PipelineReport {
            fetch: None,
            scrape,
            exported,
        })
    }

    /// Fetches the configured pages, then extracts and exports them. A stop
    /// request during fetching skips the export.
    pub async fn run(&mut self, stop: &StopSignal, mut tui: Option<&mut ScraperTUI>) -> Result<PipelineReport> {
        let urls = self.urls();
        let summary = self.fetch(&urls, stop, tui.as_deref_mut()).await?;
        self.complete_run(summary, stop, tui)
    }

    /// `run` with a caller supplied renderer.
    pub async fn run_with<R: PageRenderer>(
        &mut self,
        renderer: R,
        stop: &StopSignal,
        mut tui: Option<&mut ScraperTUI>,
    ) -> Result<PipelineReport> {
        let urls = self.urls();
        let summary = self.fetch_with(renderer, &urls, stop, tui.as_deref_mut()).await?;
        self.complete_run(summary, stop, tui)
    }

    fn complete_run(
        &mut self,
        summary: FetchSummary,
        stop: &StopSignal,
        tui: Option<&mut ScraperTUI>,
    ) -> Result<PipelineReport> {
        if summary.stopped || stop.is_stopped() {
            self.advance(Stage::Idle)?;
            return Ok(PipelineReport {
                fetch: Some(summary),
                ..PipelineReport::default()
            });
        }

        let mut report = self.extract_and_export(tui)?;
        report.fetch = Some(summary);
        self.settle();
        Ok(report)
    }
}

async fn fetch_page_by_page<R, F, Fut>(
    store: &PageStore,
    mut open: F,
    urls: &[String],
    stop: &StopSignal,
    mut tui: Option<&mut ScraperTUI>,
) -> Result<FetchSummary>
where
    R: PageRenderer,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut summary = FetchSummary::default();
    if let Some(tui) = tui.as_mut() {
        keep_going(tui.start_fetching(urls.len()));
    }

    for (index, url) in urls.iter().enumerate() {
        if stop.is_stopped() {
            info!("Stop requested, {} of {} pages fetched", index, urls.len());
            summary.stopped = true;
            break;
        }

        let fetched = match open().await {
            Ok(renderer) => fetcher::fetch_with(renderer, slice::from_ref(url), store, stop, None).await,
            Err(e) => Err(e),
        };
        match fetched {
            Ok(fetched) => {
                summary.pages.extend(fetched.pages);
                if let Some(tui) = tui.as_mut() {
                    keep_going(tui.update_fetching_progress(index + 1, urls.len(), url));
                }
                if fetched.stopped {
                    summary.stopped = true;
                    break;
                }
            }
            Err(e) => {
                let ordinal = fetcher::page_number(url).unwrap_or(index + 1);
                if let Some(tui) = tui.as_mut() {
                    keep_going(tui.page_failed(ordinal, &e.to_string()));
                }
                return Err(e);
            }
        }
    }

    if let Some(tui) = tui.as_mut() {
        keep_going(tui.finish_fetching(summary.pages.len(), summary.stopped));
    }
    Ok(summary)
}
