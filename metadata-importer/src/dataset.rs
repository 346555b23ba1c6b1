//! Parsing of the AppId metadata dataset.
//!
//! The dataset is a CSV export with a header row followed by positional rows:
//! `id,appName,owner,ctime`. The creation time column may be left blank.

use metadata_store::AppMetadataRecord;

const BYTE_ORDER_MARK: char = '\u{feff}';
const FIELD_COUNT: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Records extracted from one dataset, in file order.
#[derive(Debug, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<AppMetadataRecord>,
    /// Malformed rows that were dropped
    pub skipped: usize,
}

pub fn parse(text: &str) -> Result<Dataset, DatasetError> {
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut dataset = Dataset::default();

    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        if row.iter().all(str::is_empty) {
            continue;
        }

        if row.len() != FIELD_COUNT {
            tracing::warn!(line, fields = row.len(), "Skipping row with unexpected field count");
            dataset.skipped += 1;
            continue;
        }

        let (id, app_name, owner, ctime) = (&row[0], &row[1], &row[2], &row[3]);
        if id.is_empty() {
            tracing::warn!(line, "Skipping row without an AppId");
            dataset.skipped += 1;
            continue;
        }

        let ctime = (!ctime.is_empty()).then(|| ctime.to_string());
        dataset
            .records
            .push(AppMetadataRecord::new(id, app_name, owner, ctime));
    }

    Ok(dataset)
}
