use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, ParseError, Result};
use crate::fetcher::PageStore;
use crate::models::{ListingColumns, ListingRecord};
use crate::parser;

/// CSS selectors for one sold-listing card on a Hemnet results page.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub card: Selector,
    pub name: Selector,
    pub area: Selector,
    pub sold_date: Selector,
    pub final_price: Selector,
    pub price_change: Selector,
    pub size: Selector,
    pub monthly_fee: Selector,
    pub price_per_square_meter: Selector,
}

impl ListingSelectors {
    pub fn parse(css: &ListingCss) -> Result<Self, String> {
        let compile = |field: &str, css: &str| {
            Selector::parse(css).map_err(|e| format!("bad {} selector {:?}: {:?}", field, css, e))
        };

        Ok(Self {
            card: compile("card", css.card)?,
            name: compile("name", css.name)?,
            area: compile("area", css.area)?,
            sold_date: compile("sold date", css.sold_date)?,
            final_price: compile("final price", css.final_price)?,
            price_change: compile("price change", css.price_change)?,
            size: compile("size", css.size)?,
            monthly_fee: compile("monthly fee", css.monthly_fee)?,
            price_per_square_meter: compile("price per square meter", css.price_per_square_meter)?,
        })
    }
}

/// Raw CSS strings from which `ListingSelectors` are compiled.
#[derive(Debug, Clone, Copy)]
pub struct ListingCss {
    pub card: &'static str,
    pub name: &'static str,
    pub area: &'static str,
    pub sold_date: &'static str,
    pub final_price: &'static str,
    pub price_change: &'static str,
    pub size: &'static str,
    pub monthly_fee: &'static str,
    pub price_per_square_meter: &'static str,
}

pub const HEMNET_CSS: ListingCss = ListingCss {
    card: "li.sold-results__normal-hit",
    name: ".sold-property-listing__heading",
    area: ".sold-property-listing__location div",
    sold_date: ".sold-property-listing__sold-date",
    final_price: ".sold-property-listing__price .sold-property-listing__subheading",
    price_change: ".sold-property-listing__price-change",
    size: ".sold-property-listing__size .sold-property-listing__subheading",
    monthly_fee: ".sold-property-listing__fee",
    price_per_square_meter: ".sold-property-listing__price-per-m2",
};

static HEMNET_SELECTORS: LazyLock<ListingSelectors> =
    LazyLock::new(|| ListingSelectors::parse(&HEMNET_CSS).expect("built-in Hemnet selectors"));

impl Default for ListingSelectors {
    fn default() -> Self {
        HEMNET_SELECTORS.clone()
    }
}

/// A file or card that was skipped while scraping.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub file: PathBuf,
    /// Index of the card within the file; `None` when the whole file was skipped.
    pub card: Option<usize>,
    pub error: ParseError,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.card {
            Some(card) => write!(f, "{} card {}: {}", self.file.display(), card + 1, self.error),
            None => write!(f, "{}: {}", self.file.display(), self.error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// The storage directory holds no markup files yet.
    NoFiles,
    /// Files were found but none produced a listing.
    NothingParsed,
    Parsed,
}

#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub files: Vec<PathBuf>,
    pub records: Vec<ListingRecord>,
    pub warnings: Vec<ParseWarning>,
}

impl ScrapeReport {
    pub fn status(&self) -> ExtractionStatus {
        if self.files.is_empty() {
            ExtractionStatus::NoFiles
        } else if self.records.is_empty() {
            ExtractionStatus::NothingParsed
        } else {
            ExtractionStatus::Parsed
        }
    }

    pub fn columns(&self) -> ListingColumns {
        ListingColumns::from_records(&self.records)
    }
}

/// Parses every saved page in `store`, in file-name order.
///
/// Files without any listing card and cards without a name or final price
/// are skipped and reported in `ScrapeReport::warnings`. Only I/O failures
/// abort the run.
pub fn scrape(store: &PageStore, selectors: &ListingSelectors) -> Result<ScrapeReport> {
    let mut report = ScrapeReport {
        files: store.list_pages()?,
        ..ScrapeReport::default()
    };
    info!("Found {} page files in {}", report.files.len(), store.dir().display());

    for file in &report.files {
        let bytes = fs::read(file).map_err(|e| CrawlError::io(file, e))?;
        let html = String::from_utf8_lossy(&bytes);

        let cards = match parse_listing_page(&html, selectors) {
            Ok(cards) => cards,
            Err(error) => {
                warn!("Skipping {}: {}", file.display(), error);
                report.warnings.push(ParseWarning {
                    file: file.clone(),
                    card: None,
                    error,
                });
                continue;
            }
        };

        let mut parsed = 0;
        for (index, card) in cards.into_iter().enumerate() {
            match card {
                Ok(record) => {
                    report.records.push(record);
                    parsed += 1;
                }
                Err(error) => {
                    warn!("Skipping card {} in {}: {}", index + 1, file.display(), error);
                    report.warnings.push(ParseWarning {
                        file: file.clone(),
                        card: Some(index),
                        error,
                    });
                }
            }
        }
        debug!("Parsed {} listings from {}", parsed, file.display());
    }

    info!(
        "Scraped {} listings with {} warnings",
        report.records.len(),
        report.warnings.len()
    );
    Ok(report)
}

/// Splits one results page into per-card parse results.
pub fn parse_listing_page(
    html: &str,
    selectors: &ListingSelectors,
) -> Result<Vec<Result<ListingRecord, ParseError>>, ParseError> {
    let document = Html::parse_document(html);
    let cards: Vec<_> = document
        .select(&selectors.card)
        .map(|card| parse_card(card, selectors))
        .collect();

    if cards.is_empty() {
        return Err(ParseError::NoListings);
    }
    Ok(cards)
}

fn text_of(card: ElementRef, selector: &Selector) -> Option<String> {
    let element = card.select(selector).next()?;
    let text = parser::normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// A card needs a name and a final price; other fields fall back to empty.
pub fn parse_card(card: ElementRef, selectors: &ListingSelectors) -> Result<ListingRecord, ParseError> {
    let name = text_of(card, &selectors.name).ok_or(ParseError::MissingField { field: "name" })?;

    let price_text = text_of(card, &selectors.final_price)
        .ok_or(ParseError::MissingField { field: "final price" })?;
    let final_price = parser::digits_only(&price_text)
        .ok_or_else(|| ParseError::InvalidPrice { text: price_text.clone() })?;

    let sold_date = text_of(card, &selectors.sold_date)
        .map(|text| parser::strip_label(&text, &["Såld"]))
        .unwrap_or_default();

    let (square_meter, rooms) = text_of(card, &selectors.size)
        .map(|text| parser::split_size(&text))
        .unwrap_or_default();

    Ok(ListingRecord {
        name,
        area: text_of(card, &selectors.area).unwrap_or_default(),
        sold_date,
        final_price,
        price_change: text_of(card, &selectors.price_change).unwrap_or_default(),
        square_meter,
        rooms,
        monthly_fee: text_of(card, &selectors.monthly_fee).unwrap_or_default(),
        price_per_square_meter: text_of(card, &selectors.price_per_square_meter)
            .unwrap_or_default(),
    })
}
