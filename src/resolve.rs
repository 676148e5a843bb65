//! Per-row resolution of column values and provenance URLs.

use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::coerce::{coerce, Conversion};
use crate::error::{LoaderError, Result};
use crate::mapping::{ColumnSpec, Mapping, ObjectModel, SourceSpec};
use crate::row::{is_empty, Row};
use crate::value::{Coerced, FileValue, PropertyValue};

/// Downloads the content behind `file` columns.
///
/// http(s) URLs are fetched over the network; `file://` URLs and bare paths
/// are read from disk.
#[derive(Clone)]
pub struct FileFetcher {
    client: Client,
}

impl FileFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoaderError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch the content at `location`; the error is a human-readable reason.
    pub async fn fetch(&self, location: &str) -> std::result::Result<FileValue, String> {
        let data = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_http(url).await?,
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| format!("not a local path: {}", url))?;
                read_local(path).await?
            }
            Ok(url) if url.scheme().len() > 1 => {
                return Err(format!("unsupported scheme {}", url.scheme()))
            }
            // Windows drive letters parse as one-letter schemes.
            _ => read_local(PathBuf::from(location)).await?,
        };
        log::debug!("Fetched {} ({} bytes)", location, data.len());
        Ok(FileValue {
            name: location.to_string(),
            data,
        })
    }

    async fn fetch_http(&self, url: Url) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read body: {}", e))?;
        Ok(bytes.to_vec())
    }
}

async fn read_local(path: PathBuf) -> std::result::Result<Vec<u8>, String> {
    tokio::fs::read(&path)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Resolve one column's effective value for a row.
///
/// Blank or missing cells fall back to the column default. A cell that is
/// present but does not parse resolves to `None` without consulting the
/// default.
pub async fn resolve_value(
    spec: &ColumnSpec,
    row: &Row,
    fetcher: &FileFetcher,
) -> Result<Option<Coerced>> {
    let cell = spec.column.as_deref().and_then(|c| row.get(c));
    let text = if is_empty(cell) {
        match spec.default.as_deref() {
            Some(default) if !is_empty(Some(default)) => default,
            // A blank default is no default.
            _ => return Ok(None),
        }
    } else {
        cell.unwrap_or_default()
    };

    match coerce(text, &spec.column_type) {
        None => Ok(None),
        Some(Conversion::Value(coerced)) => Ok(Some(coerced)),
        Some(Conversion::Fetch(url)) => {
            let file = fetcher
                .fetch(&url)
                .await
                .map_err(|message| LoaderError::FileFetch {
                    row: row.id,
                    url: url.clone(),
                    message,
                })?;
            Ok(Some(Coerced::plain(PropertyValue::File(file))))
        }
    }
}

/// Provenance from a row column, else the static URL.
pub fn resolve_source(spec: &SourceSpec, row: &Row) -> Option<String> {
    spec.source_url_column
        .as_deref()
        .and_then(|column| row.get(column))
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| spec.source_url.clone())
}

/// Object-level provenance, falling back to the mapping-wide default.
pub fn object_source(mapping: &Mapping, object: &ObjectModel, row: &Row) -> Option<String> {
    resolve_source(&object.source, row).or_else(|| resolve_source(&mapping.source, row))
}

/// Column-level provenance, falling back to the object's.
pub fn column_source(spec: &ColumnSpec, row: &Row, object_source: Option<&str>) -> Option<String> {
    resolve_source(&spec.source, row).or_else(|| object_source.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ColumnType, DateFormat};
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use tempfile::TempDir;

    fn text_column(object: &str, column: &str) -> ColumnSpec {
        ColumnSpec {
            object: object.to_string(),
            column: Some(column.to_string()),
            property: column.to_string(),
            column_type: ColumnType::String,
            default: None,
            required: false,
            skip_empty: true,
            unique: false,
            unique_active: false,
            source: SourceSpec::default(),
        }
    }

    fn fetcher() -> FileFetcher {
        FileFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_plain_value() {
        let row = Row::from_pairs(2, [("Name", "Ada")]);
        let spec = text_column("person", "Name");
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        assert_eq!(value.value, PropertyValue::String("Ada".to_string()));
    }

    #[tokio::test]
    async fn test_blank_falls_back_to_default() {
        let row = Row::from_pairs(2, [("Age", "   ")]);
        let mut spec = text_column("person", "Age");
        spec.column_type = ColumnType::Int;
        assert_eq!(resolve_value(&spec, &row, &fetcher()).await.unwrap(), None);

        spec.default = Some("18".to_string());
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        assert_eq!(value.value, PropertyValue::Int(18));
    }

    #[tokio::test]
    async fn test_blank_default_is_absent() {
        let row = Row::from_pairs(2, [("Flag", ""), ("Nick", " ")]);
        let mut flag = text_column("person", "Flag");
        flag.column_type = ColumnType::Bool;
        flag.default = Some(String::new());
        assert_eq!(resolve_value(&flag, &row, &fetcher()).await.unwrap(), None);

        let mut nick = text_column("person", "Nick");
        nick.default = Some("  ".to_string());
        assert_eq!(resolve_value(&nick, &row, &fetcher()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unparseable_does_not_use_default() {
        let row = Row::from_pairs(2, [("Age", "old")]);
        let mut spec = text_column("person", "Age");
        spec.column_type = ColumnType::Int;
        spec.default = Some("18".to_string());
        assert_eq!(resolve_value(&spec, &row, &fetcher()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_columnless_spec_uses_default() {
        let row = Row::from_pairs(2, [("Name", "Ada")]);
        let mut spec = text_column("person", "unused");
        spec.column = None;
        spec.property = "active".to_string();
        spec.column_type = ColumnType::Bool;
        assert_eq!(resolve_value(&spec, &row, &fetcher()).await.unwrap(), None);

        spec.default = Some("yes".to_string());
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        assert_eq!(value.value, PropertyValue::Bool(true));
    }

    #[tokio::test]
    async fn test_default_is_coerced_as_date() {
        let row = Row::from_pairs(2, [("Born", "")]);
        let mut spec = text_column("person", "Born");
        spec.column_type = ColumnType::Date(DateFormat::Natural);
        spec.default = Some("1900".to_string());
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        assert!(matches!(value.value, PropertyValue::DateTime(_)));
    }

    #[tokio::test]
    async fn test_file_column_reads_local_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"hello").unwrap();
        let location = path.to_str().unwrap().to_string();

        let row = Row::from_pairs(4, [("Doc", location.as_str())]);
        let mut spec = text_column("doc", "Doc");
        spec.column_type = ColumnType::File;
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        match value.value {
            PropertyValue::File(file) => {
                assert_eq!(file.name, location);
                assert_eq!(file.data, b"hello");
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_column_fetches_http() {
        let server = MockServer::start_async().await;
        let doc = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/report.txt");
                then.status(200).body("remote bytes");
            })
            .await;
        let url = server.url("/docs/report.txt");

        let row = Row::from_pairs(4, [("Doc", url.as_str())]);
        let mut spec = text_column("doc", "Doc");
        spec.column_type = ColumnType::File;
        let value = resolve_value(&spec, &row, &fetcher()).await.unwrap().unwrap();
        match value.value {
            PropertyValue::File(file) => {
                assert_eq!(file.name, url);
                assert_eq!(file.data, b"remote bytes");
            }
            other => panic!("unexpected value {:?}", other),
        }
        doc.assert_async().await;
    }

    #[tokio::test]
    async fn test_file_http_status_is_row_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/missing.pdf");
                then.status(404);
            })
            .await;
        let url = server.url("/docs/missing.pdf");

        let row = Row::from_pairs(12, [("Doc", url.as_str())]);
        let mut spec = text_column("doc", "Doc");
        spec.column_type = ColumnType::File;
        match resolve_value(&spec, &row, &fetcher()).await.unwrap_err() {
            LoaderError::FileFetch { row, message, .. } => {
                assert_eq!(row, 12);
                assert!(message.contains("404"), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_fetch_failure_is_row_error() {
        let row = Row::from_pairs(9, [("Doc", "/definitely/not/here.pdf")]);
        let mut spec = text_column("doc", "Doc");
        spec.column_type = ColumnType::File;
        let err = resolve_value(&spec, &row, &fetcher()).await.unwrap_err();
        match err {
            LoaderError::FileFetch { row, url, .. } => {
                assert_eq!(row, 9);
                assert_eq!(url, "/definitely/not/here.pdf");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_source_prefers_column() {
        let spec = SourceSpec {
            source_url: Some("http://static".to_string()),
            source_url_column: Some("Link".to_string()),
        };
        let row = Row::from_pairs(1, [("Link", "http://row")]);
        assert_eq!(resolve_source(&spec, &row).as_deref(), Some("http://row"));

        let blank = Row::from_pairs(1, [("Link", " ")]);
        assert_eq!(resolve_source(&spec, &blank).as_deref(), Some("http://static"));
        assert_eq!(resolve_source(&SourceSpec::default(), &row), None);
    }

    #[test]
    fn test_column_source_falls_back_to_object() {
        let row = Row::from_pairs(1, [("Name", "Ada")]);
        let spec = text_column("person", "Name");
        assert_eq!(
            column_source(&spec, &row, Some("http://object")).as_deref(),
            Some("http://object")
        );
        assert_eq!(column_source(&spec, &row, None), None);
    }
}
