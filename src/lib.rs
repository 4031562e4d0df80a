pub mod cli;
pub mod config;
pub mod error;
pub mod exporter;
pub mod extractor;
pub mod fetcher;
pub mod lock;
pub mod logging;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod tui;

pub use config::CrawlerConfig;
pub use error::{CrawlError, ParseError, Result};
pub use exporter::{export, export_records, load_dataset};
pub use extractor::{scrape, ExtractionStatus, ListingSelectors, ScrapeReport};
pub use fetcher::{get_urls, save_to_html, PageRenderer, PageStore, StopSignal};
pub use models::{ListingColumns, ListingPage, ListingRecord};
pub use pipeline::{Pipeline, PipelineReport, Stage};
