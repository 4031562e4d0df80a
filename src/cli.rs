use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::config::{BrowserOptions, CrawlerConfig, DEFAULT_BASE_URL};
use crate::fetcher::StopSignal;
use crate::lock::RunLock;

/// Paths shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Directory holding one HTML file per downloaded page
    #[clap(short, long, default_value = "soups")]
    pub storage_dir: PathBuf,

    /// Path to output CSV file
    #[clap(short, long, default_value = "hemnet_data.csv")]
    pub output: PathBuf,

    /// Enable debug output
    #[clap(short, long)]
    pub debug: bool,
}

/// Which pages to download and with which browser.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Number of results pages to download
    #[clap(short = 'p', long, default_value = "4", value_parser = clap::value_parser!(u64).range(1..=50))]
    pub pages: u64,

    /// Hemnet location id to filter on (repeatable)
    #[clap(short, long = "location-id", default_value = "17744")]
    pub location_ids: Vec<String>,

    /// Sold-listings search URL
    #[clap(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// WebDriver endpoint
    #[clap(short, long, default_value = "http://localhost:4444")]
    pub webdriver: String,

    /// chromedriver binary to start before connecting
    #[clap(long)]
    pub chromedriver: Option<PathBuf>,

    /// Show the browser window
    #[clap(long)]
    pub headful: bool,

    /// Seconds to wait for a page's listings to render
    #[clap(short, long, default_value = "30")]
    pub timeout: u64,
}

impl StorageArgs {
    pub fn config(&self) -> CrawlerConfig {
        CrawlerConfig {
            storage_dir: self.storage_dir.clone(),
            output_file: self.output.clone(),
            ..CrawlerConfig::default()
        }
    }
}

impl FetchArgs {
    pub fn apply(&self, config: CrawlerConfig) -> CrawlerConfig {
        let defaults = BrowserOptions::default();
        CrawlerConfig {
            base_url: self.base_url.clone(),
            location_ids: self.location_ids.clone(),
            max_pages: self.pages as usize,
            browser: BrowserOptions {
                webdriver_url: self.webdriver.clone(),
                driver_path: self.chromedriver.clone(),
                headless: !self.headful,
                page_timeout: Duration::from_secs(self.timeout),
                ready_selector: defaults.ready_selector,
            },
            ..config
        }
    }
}

/// A stop signal tripped by Ctrl-C, so the current page finishes and the
/// batch ends before the next one. A second Ctrl-C quits at once.
pub fn stop_on_ctrl_c(storage_dir: &Path) -> StopSignal {
    let stop = StopSignal::new();
    let handle = stop.clone();
    let dir = storage_dir.to_path_buf();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Stopping after the current page, press Ctrl-C again to quit now");
        handle.stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            quit(&dir);
        }
    });
    stop
}

/// Quits on the first Ctrl-C.
pub fn exit_on_ctrl_c(storage_dir: &Path) {
    let dir = storage_dir.to_path_buf();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            quit(&dir);
        }
    });
}

/// `process::exit` skips destructors, so the run lock is removed here.
fn quit(storage_dir: &Path) -> ! {
    match RunLock::release_own(storage_dir) {
        Ok(true) => warn!("Interrupted, released run lock in {}", storage_dir.display()),
        Ok(false) => warn!("Interrupted"),
        Err(e) => warn!("Interrupted, {}", e),
    }
    std::process::exit(130)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[clap(flatten)]
        storage: StorageArgs,
        #[clap(flatten)]
        fetch: FetchArgs,
    }

    #[test]
    fn defaults_match_config_defaults() {
        let cli = TestCli::parse_from(["test"]);
        let config = cli.fetch.apply(cli.storage.config());

        assert_eq!(config.storage_dir, PathBuf::from("soups"));
        assert_eq!(config.output_file, PathBuf::from("hemnet_data.csv"));
        assert_eq!(config.max_pages, 4);
        assert_eq!(config.location_ids, vec!["17744"]);
        assert!(config.browser.headless);
        assert_eq!(config.browser.page_timeout, Duration::from_secs(30));
    }

    #[test]
    fn page_count_is_bounded() {
        assert!(TestCli::try_parse_from(["test", "--pages", "0"]).is_err());
        assert!(TestCli::try_parse_from(["test", "--pages", "51"]).is_err());
        let cli = TestCli::try_parse_from(["test", "-p", "7", "-l", "1", "-l", "2"]).unwrap();
        let config = cli.fetch.apply(cli.storage.config());
        assert_eq!(config.max_pages, 7);
        assert_eq!(config.location_ids, vec!["1", "2"]);
    }
}
