use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static SOLD_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})\s+([a-zåäö]+)\.?\s+(\d{4})").expect("sold date regex")
});

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("iso date regex"));

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+\-−±]?)\s*(\d+(?:[.,]\d+)?)").expect("percent regex")
});

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?: \d{3})+|\d+)(?:[.,](\d+))?").expect("decimal regex")
});

static SQUARE_METER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d ,.+]*?)\s*m(?:²|2)").expect("square meter regex"));

static ROOMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*rum").expect("rooms regex"));

/// Collapses runs of whitespace (including the no-break spaces Hemnet puts
/// inside numbers) into single ASCII spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps only the digits of `text`, e.g. `"3 950 000 kr"` -> `3950000`.
pub fn digits_only(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Removes a leading label such as `Slutpris` or `Såld` from a card field.
pub fn strip_label(text: &str, labels: &[&str]) -> String {
    let text = normalize_whitespace(text);
    for label in labels {
        let width = label.chars().count();
        let split = match text.char_indices().nth(width) {
            Some((index, _)) => index,
            None if text.chars().count() == width => text.len(),
            None => continue,
        };
        if text[..split].to_lowercase() == label.to_lowercase() {
            return text[split..].trim().to_string();
        }
    }
    text
}

fn swedish_month(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    let prefix: String = name.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "maj" | "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "okt" | "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parses `12 januari 2024`, `Såld 3 feb. 2024` or `2024-01-12`.
pub fn parse_sold_date(text: &str) -> Option<NaiveDate> {
    let text = normalize_whitespace(text);

    if let Some(captures) = ISO_DATE_RE.captures(&text) {
        return NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok();
    }

    let captures = SOLD_DATE_RE.captures(&text)?;
    let day = captures[1].parse().ok()?;
    let month = swedish_month(&captures[2])?;
    let year = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses a signed percentage such as `+5 %`, `-2,3%` or `±0 %`.
pub fn parse_percent(text: &str) -> Option<f64> {
    let text = normalize_whitespace(text);
    let captures = PERCENT_RE.captures(&text)?;
    let value: f64 = captures[2].replace(',', ".").parse().ok()?;
    match &captures[1] {
        "-" | "−" => Some(-value),
        _ => Some(value),
    }
}

/// Reads the first number in `text`, honouring space thousand separators
/// and a decimal comma: `"1 062,5 m²"` -> `1062.5`.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let text = normalize_whitespace(text);
    let captures = DECIMAL_RE.captures(&text)?;
    let whole = captures[1].replace(' ', "");
    let number = match captures.get(2) {
        Some(fraction) => format!("{}.{}", whole, fraction.as_str()),
        None => whole,
    };
    number.parse().ok()
}

/// Splits Hemnet's combined size line (`"62,5 m² 2 rum"`) into the floor
/// area as displayed and the room count.
pub fn split_size(text: &str) -> (String, Option<f64>) {
    let text = normalize_whitespace(text);

    let square_meter = SQUARE_METER_RE
        .captures(&text)
        .map(|c| format!("{} m²", c[1].trim()))
        .unwrap_or_default();

    let rooms = ROOMS_RE
        .captures(&text)
        .and_then(|c| c[1].replace(',', ".").parse().ok());

    (square_meter, rooms)
}
