use std::fs::File;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{CrawlError, Result};
use crate::models::{ListingColumns, ListingRecord, DATASET_HEADER};

/// Writes the nine column sequences to `filename`.
///
/// The sequences must all have the same length; otherwise nothing is
/// written. An existing file is replaced.
pub fn export(filename: impl AsRef<Path>, columns: &ListingColumns) -> Result<usize> {
    let filename = filename.as_ref();
    let records = columns.to_records().ok_or_else(|| CrawlError::LengthMismatch {
        filename: filename.to_path_buf(),
        lengths: columns.lengths(),
    })?;
    export_records(filename, &records)
}

/// Writes `records` under the dataset header, replacing `filename`.
///
/// Rows go to a temporary file next to the target which is then renamed
/// over it, so the target is either the old or the new dataset.
pub fn export_records(filename: impl AsRef<Path>, records: &[ListingRecord]) -> Result<usize> {
    let filename = filename.as_ref();
    let dir = match filename.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CrawlError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| CrawlError::io(dir, e))?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        // Written explicitly so an empty dataset still carries the header.
        writer
            .write_record(DATASET_HEADER)
            .map_err(|e| CrawlError::csv(filename, e))?;
        for record in records {
            writer
                .write_record(to_row(record))
                .map_err(|e| CrawlError::csv(filename, e))?;
        }
        writer.flush().map_err(|e| CrawlError::io(filename, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| CrawlError::io(temp.path(), e))?;
    temp.persist(filename)
        .map_err(|e| CrawlError::io(filename, e.error))?;

    info!("Saved {} listings to {}", records.len(), filename.display());
    Ok(records.len())
}

fn to_row(record: &ListingRecord) -> [String; 9] {
    [
        record.name.clone(),
        record.area.clone(),
        record.sold_date.clone(),
        record.final_price.to_string(),
        record.price_change.clone(),
        record.square_meter.clone(),
        record.rooms.map(|r| r.to_string()).unwrap_or_default(),
        record.monthly_fee.clone(),
        record.price_per_square_meter.clone(),
    ]
}

/// Reads a dataset written by `export`. A missing or empty file is an empty
/// dataset.
pub fn load_dataset(filename: impl AsRef<Path>) -> Result<Vec<ListingRecord>> {
    let filename = filename.as_ref();

    if !filename.exists() {
        info!("Dataset does not exist yet: {}", filename.display());
        return Ok(Vec::new());
    }

    let file = File::open(filename).map_err(|e| CrawlError::io(filename, e))?;
    let empty = file
        .metadata()
        .map_err(|e| CrawlError::io(filename, e))?
        .len()
        == 0;
    if empty {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(file);
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<ListingRecord>, _>>()
        .map_err(|e| CrawlError::csv(filename, e))?;

    info!("Loaded {} listings from {}", records.len(), filename.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scenario_columns() -> ListingColumns {
        ListingColumns {
            name: vec!["A".into(), "B".into()],
            area: vec!["X".into(), "Y".into()],
            sold_date: vec!["2024-01-01".into(), "2024-01-02".into()],
            price: vec![1_000_000, 2_000_000],
            procent: vec!["+5%".into(), "-2%".into()],
            square_meter: vec!["50".into(), "60".into()],
            rooms: vec![Some(2.0), Some(3.0)],
            monthly_fee: vec!["2000".into(), "2500".into()],
            price_per_square_meter: vec!["20000".into(), "33333".into()],
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        assert_eq!(export(&out, &scenario_columns()).unwrap(), 2);

        let contents = fs::read_to_string(&out).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Name,Area,Sold date,Final price (kr),Price change (%),Square meter,Rooms,Monthly fee,Price per square meter"
        );
        assert_eq!(lines[1], "A,X,2024-01-01,1000000,+5%,50,2,2000,20000");
        assert_eq!(lines[2], "B,Y,2024-01-02,2000000,-2%,60,3,2500,33333");
    }

    #[test]
    fn unequal_lengths_fail_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let mut columns = scenario_columns();
        columns.name.push("C".into());

        let err = export(&out, &columns).unwrap_err();
        match err {
            CrawlError::LengthMismatch { filename, lengths } => {
                assert_eq!(filename, out);
                assert!(lengths.contains(&("name", 3)));
                assert!(lengths.contains(&("price", 2)));
            }
            other => panic!("expected LengthMismatch, got {:?}", other),
        }
        assert!(!out.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn exporting_twice_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        export(&out, &scenario_columns()).unwrap();
        let first = fs::read_to_string(&out).unwrap();
        export(&out, &scenario_columns()).unwrap();
        let second = fs::read_to_string(&out).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.lines().count(), 3);
    }

    #[test]
    fn round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data").join("hemnet_data.csv");
        let mut columns = scenario_columns();
        columns.name[0] = "Östermalmsgatan 5, 3 tr".into();
        columns.area[0] = "Östermalm, Stockholm".into();
        columns.rooms[1] = None;

        export(&out, &columns).unwrap();
        let loaded = load_dataset(&out).unwrap();

        assert_eq!(Some(loaded), columns.to_records());
    }

    #[test]
    fn empty_dataset_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        export_records(&out, &[]).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 1);
        assert!(load_dataset(&out).unwrap().is_empty());
    }

    #[test]
    fn missing_or_blank_dataset_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("absent.csv");
        assert!(load_dataset(&out).unwrap().is_empty());

        fs::write(&out, "").unwrap();
        assert!(load_dataset(&out).unwrap().is_empty());
    }
}
