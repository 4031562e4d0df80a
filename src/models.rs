use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::parser;

/// Column headers of the dataset file, in export order.
pub const DATASET_HEADER: [&str; 9] = [
    "Name",
    "Area",
    "Sold date",
    "Final price (kr)",
    "Price change (%)",
    "Square meter",
    "Rooms",
    "Monthly fee",
    "Price per square meter",
];

/// One sold property as shown on a Hemnet results card.
///
/// Text fields keep the wording the site displays; the `*_value` accessors
/// give the normalized numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Area")]
    pub area: String,
    #[serde(rename = "Sold date")]
    pub sold_date: String,
    #[serde(rename = "Final price (kr)")]
    pub final_price: u64,
    #[serde(rename = "Price change (%)")]
    pub price_change: String,
    #[serde(rename = "Square meter")]
    pub square_meter: String,
    #[serde(rename = "Rooms")]
    pub rooms: Option<f64>,
    #[serde(rename = "Monthly fee")]
    pub monthly_fee: String,
    #[serde(rename = "Price per square meter")]
    pub price_per_square_meter: String,
}

impl ListingRecord {
    pub fn sold_on(&self) -> Option<NaiveDate> {
        parser::parse_sold_date(&self.sold_date)
    }

    pub fn price_change_percent(&self) -> Option<f64> {
        parser::parse_percent(&self.price_change)
    }

    pub fn square_meter_value(&self) -> Option<f64> {
        parser::parse_decimal(&self.square_meter)
    }

    pub fn monthly_fee_value(&self) -> Option<u64> {
        parser::digits_only(&self.monthly_fee)
    }

    pub fn price_per_square_meter_value(&self) -> Option<u64> {
        parser::digits_only(&self.price_per_square_meter)
    }
}

/// The nine per-field sequences the dataset is made of. Position `i` in
/// every vector describes the same listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingColumns {
    pub name: Vec<String>,
    pub area: Vec<String>,
    pub sold_date: Vec<String>,
    pub price: Vec<u64>,
    pub procent: Vec<String>,
    pub square_meter: Vec<String>,
    pub rooms: Vec<Option<f64>>,
    pub monthly_fee: Vec<String>,
    pub price_per_square_meter: Vec<String>,
}

impl ListingColumns {
    pub fn from_records(records: &[ListingRecord]) -> Self {
        let mut columns = ListingColumns::default();
        for record in records {
            columns.name.push(record.name.clone());
            columns.area.push(record.area.clone());
            columns.sold_date.push(record.sold_date.clone());
            columns.price.push(record.final_price);
            columns.procent.push(record.price_change.clone());
            columns.square_meter.push(record.square_meter.clone());
            columns.rooms.push(record.rooms);
            columns.monthly_fee.push(record.monthly_fee.clone());
            columns
                .price_per_square_meter
                .push(record.price_per_square_meter.clone());
        }
        columns
    }

    pub fn lengths(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("name", self.name.len()),
            ("area", self.area.len()),
            ("sold_date", self.sold_date.len()),
            ("price", self.price.len()),
            ("procent", self.procent.len()),
            ("square_meter", self.square_meter.len()),
            ("rooms", self.rooms.len()),
            ("monthly_fee", self.monthly_fee.len()),
            ("price_per_square_meter", self.price_per_square_meter.len()),
        ]
    }

    pub fn is_aligned(&self) -> bool {
        let lengths = self.lengths();
        lengths.iter().all(|(_, len)| *len == lengths[0].1)
    }

    /// Zips the columns back into records, or `None` if they are not aligned.
    pub fn to_records(&self) -> Option<Vec<ListingRecord>> {
        if !self.is_aligned() {
            return None;
        }

        let records = (0..self.name.len())
            .map(|i| ListingRecord {
                name: self.name[i].clone(),
                area: self.area[i].clone(),
                sold_date: self.sold_date[i].clone(),
                final_price: self.price[i],
                price_change: self.procent[i].clone(),
                square_meter: self.square_meter[i].clone(),
                rooms: self.rooms[i],
                monthly_fee: self.monthly_fee[i].clone(),
                price_per_square_meter: self.price_per_square_meter[i].clone(),
            })
            .collect();
        Some(records)
    }
}

/// A results page saved to the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub url: String,
    pub ordinal: usize,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ListingRecord {
        ListingRecord {
            name: name.to_string(),
            area: "Södermalm, Stockholm".to_string(),
            sold_date: "12 januari 2024".to_string(),
            final_price: 3_950_000,
            price_change: "+5 %".to_string(),
            square_meter: "62,5 m²".to_string(),
            rooms: Some(2.5),
            monthly_fee: "3 250 kr/mån".to_string(),
            price_per_square_meter: "63 200 kr/m²".to_string(),
        }
    }

    #[test]
    fn normalized_accessors() {
        let r = record("Götgatan 1");
        assert_eq!(r.sold_on(), NaiveDate::from_ymd_opt(2024, 1, 12));
        assert_eq!(r.price_change_percent(), Some(5.0));
        assert_eq!(r.square_meter_value(), Some(62.5));
        assert_eq!(r.monthly_fee_value(), Some(3250));
        assert_eq!(r.price_per_square_meter_value(), Some(63200));
    }

    #[test]
    fn columns_round_trip_records() {
        let records = vec![record("A"), record("B")];
        let columns = ListingColumns::from_records(&records);
        assert!(columns.is_aligned());
        assert_eq!(columns.name, vec!["A", "B"]);
        assert_eq!(columns.to_records(), Some(records));
    }

    #[test]
    fn misaligned_columns_do_not_zip() {
        let mut columns = ListingColumns::from_records(&[record("A")]);
        columns.price.push(1);
        assert!(!columns.is_aligned());
        assert_eq!(columns.to_records(), None);
    }
}
