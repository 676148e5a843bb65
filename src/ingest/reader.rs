use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::row::Row;

/// Streams CSV records as [`Row`]s keyed by the header line.
///
/// Records shorter than the header simply lack the trailing columns. Each
/// row's id is the line it starts on.
pub struct CsvRows<R> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
}

impl<R: Read> CsvRows<R> {
    pub fn from_reader(input: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        Ok(Self { reader, headers })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

/// Open a CSV file for row streaming.
pub fn open_rows(path: &Path) -> Result<CsvRows<File>> {
    let file = File::open(path)?;
    let rows = CsvRows::from_reader(file)?;
    log::info!(
        "Reading {} ({} columns)",
        path.display(),
        rows.headers().len()
    );
    Ok(rows)
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let fields = self
                    .headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect();
                Some(Ok(Row::new(line, fields)))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
