use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.hemnet.se/salda/bostader";

/// Where and how to crawl. Every stage takes its paths from here rather
/// than from fixed locations.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub location_ids: Vec<String>,
    pub max_pages: usize,
    pub storage_dir: PathBuf,
    pub output_file: PathBuf,
    pub browser: BrowserOptions,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            location_ids: vec!["17744".to_string()],
            max_pages: 4,
            storage_dir: PathBuf::from("soups"),
            output_file: PathBuf::from("hemnet_data.csv"),
            browser: BrowserOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// WebDriver endpoint to connect to.
    pub webdriver_url: String,
    /// chromedriver binary to spawn before connecting; `None` expects a
    /// driver already listening on `webdriver_url`.
    pub driver_path: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound for a page to show `ready_selector`.
    pub page_timeout: Duration,
    pub ready_selector: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            driver_path: None,
            headless: true,
            page_timeout: Duration::from_secs(30),
            ready_selector: "li.sold-results__normal-hit".to_string(),
        }
    }
}
