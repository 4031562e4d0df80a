use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{BrowserOptions, CrawlerConfig};
use crate::error::{CrawlError, Result};
use crate::models::ListingPage;
use crate::tui::{keep_going, ScraperTUI};

const CONNECT_ATTEMPTS: usize = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Results-page URLs for pages `1..=max_pages`, in page order.
pub fn get_urls(config: &CrawlerConfig) -> Vec<String> {
    let location_key = urlencoding::encode("location_ids[]");
    let locations: Vec<String> = config
        .location_ids
        .iter()
        .map(|id| format!("{}={}", location_key, urlencoding::encode(id)))
        .collect();

    (1..=config.max_pages)
        .map(|page| {
            let mut query = locations.clone();
            query.push(format!("page={}", page));
            format!("{}?{}", config.base_url, query.join("&"))
        })
        .collect()
}

/// The `page=N` query parameter of a results URL.
pub fn page_number(url: &str) -> Option<usize> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

/// The storage directory holding one markup file per fetched page.
#[derive(Debug, Clone)]
pub struct PageStore {
    dir: PathBuf,
}

impl PageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Zero padded so that name order is page order.
    pub fn file_name(ordinal: usize) -> String {
        format!("page_{:04}.html", ordinal)
    }

    pub fn write_page(&self, url: &str, ordinal: usize, html: &str) -> Result<ListingPage> {
        if html.trim().is_empty() {
            return Err(CrawlError::fetch(url, "browser returned an empty page"));
        }

        fs::create_dir_all(&self.dir).map_err(|e| CrawlError::io(&self.dir, e))?;
        let path = self.dir.join(Self::file_name(ordinal));
        fs::write(&path, html).map_err(|e| CrawlError::io(&path, e))?;

        Ok(ListingPage {
            url: url.to_string(),
            ordinal,
            path,
        })
    }

    /// All saved `*.html` files, sorted by name. A missing directory is empty.
    pub fn list_pages(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| CrawlError::io(&self.dir, e))?;
        let mut pages = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CrawlError::io(&self.dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "html") {
                pages.push(path);
            }
        }
        pages.sort();
        Ok(pages)
    }
}

/// Cooperative stop request, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something that can turn a URL into fully rendered markup.
#[async_trait]
pub trait PageRenderer: Send {
    async fn render(&mut self, url: &str) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub pages: Vec<ListingPage>,
    pub stopped: bool,
}

/// Fetches `urls` in order and writes each page to `store`.
///
/// The first failing URL ends the batch with `CrawlError::Fetch`; pages
/// saved before it stay on disk. Callers wanting to continue past a bad
/// page call this once per URL.
pub async fn fetch_batch<R: PageRenderer>(
    renderer: &mut R,
    urls: &[String],
    store: &PageStore,
    stop: &StopSignal,
    mut tui: Option<&mut ScraperTUI>,
) -> Result<FetchSummary> {
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

        let ordinal = page_number(url).unwrap_or(index + 1);
        debug!("Fetching page {}: {}", ordinal, url);

        let page = match renderer.render(url).await {
            Ok(html) => store.write_page(url, ordinal, &html),
            Err(e) => Err(e),
        };

        match page {
            Ok(page) => {
                info!("Saved {} to {}", url, page.path.display());
                summary.pages.push(page);
                if let Some(tui) = tui.as_mut() {
                    keep_going(tui.update_fetching_progress(index + 1, urls.len(), url));
                }
            }
            Err(e) => {
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

/// Runs a batch on `renderer` and closes it afterwards, whatever the outcome.
pub async fn fetch_with<R: PageRenderer>(
    mut renderer: R,
    urls: &[String],
    store: &PageStore,
    stop: &StopSignal,
    tui: Option<&mut ScraperTUI>,
) -> Result<FetchSummary> {
    let result = fetch_batch(&mut renderer, urls, store, stop, tui).await;

    if let Err(e) = renderer.close().await {
        warn!("Failed to close browser session: {}", e);
    }

    result
}

/// Opens a browser session, saves every URL to `store` and closes the session.
pub async fn save_to_html(
    urls: &[String],
    store: &PageStore,
    options: &BrowserOptions,
    stop: &StopSignal,
    tui: Option<&mut ScraperTUI>,
) -> Result<FetchSummary> {
    let session = BrowserSession::connect(options).await?;
    fetch_with(session, urls, store, stop, tui).await
}

/// A chromedriver child process, killed when dropped.
#[derive(Debug)]
struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    fn spawn(path: &Path, webdriver_url: &str) -> Result<Self> {
        let mut command = Command::new(path);
        if let Some(port) = endpoint_port(webdriver_url) {
            command.arg(format!("--port={}", port));
        }

        info!("Starting {}", path.display());
        let child = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CrawlError::io(path, e))?;
        Ok(Self { child })
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        debug!("Stopping webdriver process {}", self.child.id());
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill webdriver process: {}", e);
        }
        let _ = self.child.wait();
    }
}

fn endpoint_port(url: &str) -> Option<u16> {
    let authority = url.split("://").nth(1)?.split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}

/// A WebDriver browser session. Close it through `PageRenderer::close`;
/// a spawned driver process goes away with the session.
pub struct BrowserSession {
    client: Option<Client>,
    ready_selector: String,
    page_timeout: Duration,
    _driver: Option<DriverProcess>,
}

impl BrowserSession {
    pub async fn connect(options: &BrowserOptions) -> Result<Self> {
        let driver = match &options.driver_path {
            Some(path) => Some(DriverProcess::spawn(path, &options.webdriver_url)?),
            None => None,
        };

        let mut args = vec!["--disable-gpu", "--window-size=1920,1080"];
        if options.headless {
            args.push("--headless=new");
        }
        let mut capabilities = serde_json::Map::new();
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        // A freshly spawned driver needs a moment before it accepts sessions.
        let attempts = if driver.is_some() { CONNECT_ATTEMPTS } else { 1 };
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match ClientBuilder::native()
                .capabilities(capabilities.clone())
                .connect(&options.webdriver_url)
                .await
            {
                Ok(client) => {
                    info!("Connected to webdriver at {}", options.webdriver_url);
                    return Ok(Self {
                        client: Some(client),
                        ready_selector: options.ready_selector.clone(),
                        page_timeout: options.page_timeout,
                        _driver: driver,
                    });
                }
                Err(e) => {
                    debug!("Webdriver connect attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(CrawlError::Session {
            endpoint: options.webdriver_url.clone(),
            reason: last_error,
        })
    }
}

#[async_trait]
impl PageRenderer for BrowserSession {
    async fn render(&mut self, url: &str) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| CrawlError::fetch(url, "browser session already closed"))?;

        client.goto(url).await.map_err(|e| CrawlError::fetch(url, e))?;
        client
            .wait()
            .at_most(self.page_timeout)
            .for_element(Locator::Css(&self.ready_selector))
            .await
            .map_err(|e| {
                CrawlError::fetch(
                    url,
                    format!(
                        "{} did not appear within {:?}: {}",
                        self.ready_selector, self.page_timeout, e
                    ),
                )
            })?;
        client.source().await.map_err(|e| CrawlError::fetch(url, e))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            info!("Closing browser session");
            client.close().await.map_err(|e| CrawlError::Session {
                endpoint: "webdriver".to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeRenderer {
        pages: HashMap<String, String>,
        rendered: Vec<String>,
        closed: Arc<AtomicBool>,
        stop_after: Option<(usize, StopSignal)>,
    }

    impl FakeRenderer {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
                rendered: Vec::new(),
                closed: Arc::new(AtomicBool::new(false)),
                stop_after: None,
            }
        }
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(&mut self, url: &str) -> Result<String> {
            self.rendered.push(url.to_string());
            if let Some((count, stop)) = &self.stop_after {
                if self.rendered.len() >= *count {
                    stop.stop();
                }
            }
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| CrawlError::fetch(url, "timed out"))
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(pages: usize) -> CrawlerConfig {
        CrawlerConfig {
            base_url: "https://example.test/salda".to_string(),
            location_ids: vec!["17744".to_string()],
            max_pages: pages,
            ..CrawlerConfig::default()
        }
    }

    #[test]
    fn urls_are_capped_and_ordered() {
        let urls = get_urls(&config(3));
        assert_eq!(urls.len(), 3);
        assert_eq!(
            urls[0],
            "https://example.test/salda?location_ids%5B%5D=17744&page=1"
        );
        let pages: Vec<_> = urls.iter().map(|u| page_number(u)).collect();
        assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
        assert!(get_urls(&config(0)).is_empty());
    }

    #[test]
    fn page_number_reads_query() {
        assert_eq!(page_number("https://x.test/a?page=12&b=1"), Some(12));
        assert_eq!(page_number("https://x.test/a?b=1"), None);
        assert_eq!(page_number("https://x.test/a"), None);
    }

    #[test]
    fn endpoint_port_from_url() {
        assert_eq!(endpoint_port("http://localhost:4444"), Some(4444));
        assert_eq!(endpoint_port("http://127.0.0.1:9515/wd/hub"), Some(9515));
        assert_eq!(endpoint_port("http://localhost"), None);
    }

    #[test]
    fn file_names_sort_in_page_order() {
        let mut names = vec![
            PageStore::file_name(10),
            PageStore::file_name(2),
            PageStore::file_name(1),
        ];
        names.sort();
        assert_eq!(names, vec!["page_0001.html", "page_0002.html", "page_0010.html"]);
    }

    #[tokio::test]
    async fn saves_one_non_empty_file_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path().join("soups"));
        let urls = get_urls(&config(3));
        let mut renderer = FakeRenderer::new(&[
            (urls[0].as_str(), "<html>one</html>"),
            (urls[1].as_str(), "<html>two</html>"),
            (urls[2].as_str(), "<html>three</html>"),
        ]);

        let summary = fetch_batch(&mut renderer, &urls, &store, &StopSignal::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.pages.len(), 3);
        assert!(!summary.stopped);
        let files = store.list_pages().unwrap();
        assert_eq!(files.len(), 3);
        for file in &files {
            assert!(fs::metadata(file).unwrap().len() > 0);
        }
        assert_eq!(fs::read_to_string(&files[1]).unwrap(), "<html>two</html>");
    }

    #[tokio::test]
    async fn single_url_calls_keep_page_numbers_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let urls = get_urls(&config(2));
        let mut renderer = FakeRenderer::new(&[(urls[0].as_str(), "<p>1</p>"), (urls[1].as_str(), "<p>2</p>")]);

        for url in &urls {
            fetch_batch(&mut renderer, std::slice::from_ref(url), &store, &StopSignal::new(), None)
                .await
                .unwrap();
        }

        let names: Vec<_> = store
            .list_pages()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_0001.html", "page_0002.html"]);
    }

    #[tokio::test]
    async fn first_failure_aborts_batch_and_session_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let urls = get_urls(&config(3));
        let renderer = FakeRenderer::new(&[(urls[0].as_str(), "<p>1</p>"), (urls[2].as_str(), "<p>3</p>")]);
        let closed = renderer.closed.clone();

        let err = fetch_with(renderer, &urls, &store, &StopSignal::new(), None)
            .await
            .unwrap_err();

        match err {
            CrawlError::Fetch { url, .. } => assert_eq!(url, urls[1]),
            other => panic!("expected fetch error, got {:?}", other),
        }
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(store.list_pages().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_markup_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let urls = get_urls(&config(1));
        let mut renderer = FakeRenderer::new(&[(urls[0].as_str(), "   ")]);

        let err = fetch_batch(&mut renderer, &urls, &store, &StopSignal::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Fetch { .. }));
        assert!(store.list_pages().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_takes_effect_before_next_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let urls = get_urls(&config(3));
        let stop = StopSignal::new();
        let mut renderer = FakeRenderer::new(&[
            (urls[0].as_str(), "<p>1</p>"),
            (urls[1].as_str(), "<p>2</p>"),
            (urls[2].as_str(), "<p>3</p>"),
        ]);
        renderer.stop_after = Some((1, stop.clone()));

        let summary = fetch_batch(&mut renderer, &urls, &store, &stop, None)
            .await
            .unwrap();

        assert!(summary.stopped);
        assert_eq!(summary.pages.len(), 1);
        assert_eq!(renderer.rendered, vec![urls[0].clone()]);
    }

    #[tokio::test]
    async fn broken_progress_display_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let urls = get_urls(&config(2));
        let mut renderer = FakeRenderer::new(&[(urls[0].as_str(), "<p>1</p>"), (urls[1].as_str(), "<p>2</p>")]);
        let mut tui = ScraperTUI::with_writer(crate::tui::testing::BrokenPipe);

        let summary = fetch_batch(&mut renderer, &urls, &store, &StopSignal::new(), Some(&mut tui))
            .await
            .unwrap();

        assert_eq!(summary.pages.len(), 2);
        assert_eq!(store.list_pages().unwrap().len(), 2);
    }

    #[test]
    fn missing_store_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path().join("absent"));
        assert!(store.list_pages().unwrap().is_empty());
    }
}
