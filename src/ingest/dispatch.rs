//! Fans rows out to mapping workers.
//!
//! A blocking reader task feeds a bounded queue; `workers` tasks pull rows
//! from it and map each one completely before taking the next. In fail-fast
//! mode the first failed row raises a shared cancel flag that the reader and
//! every worker check between rows.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinSet};

use crate::error::{LoaderError, Result};
use crate::mapper::RowMapper;
use crate::row::Row;

/// Shared stop signal for one run.
pub type CancelFlag = Arc<AtomicBool>;

/// How rows are dispatched.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Concurrent mapping workers; 1 processes rows strictly in order.
    pub workers: usize,
    /// Rows buffered between the reader and the workers.
    pub queue_depth: usize,
    /// Log failed rows and keep going instead of stopping the run.
    pub continue_on_error: bool,
    /// Log progress every this many rows; 0 disables.
    pub progress_every: u64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_depth: 1,
            continue_on_error: false,
            progress_every: 1000,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub rows: u64,
    pub loaded: u64,
    pub failed: u64,
    pub objects: u64,
    pub aborted: bool,
    /// The failure that stopped the run, in fail-fast mode.
    pub abort_reason: Option<String>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.rows += other.rows;
        self.loaded += other.loaded;
        self.failed += other.failed;
        self.objects += other.objects;
        self.aborted |= other.aborted;
        if self.abort_reason.is_none() {
            self.abort_reason = other.abort_reason;
        }
    }
}

/// Describe a row failure with enough context to find the input line.
pub fn describe_failure(row: Option<u64>, err: &LoaderError) -> String {
    match row {
        Some(id) if !err.names_row() => format!("Row {}: {}", id, err),
        _ => err.to_string(),
    }
}

/// Run every row through `mapper`.
pub async fn dispatch<I>(
    mapper: Arc<RowMapper>,
    rows: I,
    options: &DispatchOptions,
) -> Result<LoadReport>
where
    I: Iterator<Item = Result<Row>> + Send + 'static,
{
    let workers = options.workers.max(1);
    let (tx, rx) = mpsc::channel::<Result<Row>>(options.queue_depth.max(1));
    let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
    let processed = Arc::new(AtomicU64::new(0));

    let reader_cancel = Arc::clone(&cancel);
    let reader = task::spawn_blocking(move || {
        for item in rows {
            if reader_cancel.load(Ordering::SeqCst) {
                log::debug!("Reader stopped: run cancelled");
                break;
            }
            // All workers gone.
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    let rx = Arc::new(Mutex::new(rx));
    let mut set = JoinSet::new();
    for worker in 0..workers {
        set.spawn(run_worker(
            worker,
            Arc::clone(&mapper),
            Arc::clone(&rx),
            Arc::clone(&cancel),
            Arc::clone(&processed),
            options.clone(),
        ));
    }
    drop(rx);

    let mut report = LoadReport::default();
    while let Some(joined) = set.join_next().await {
        let stats = joined.map_err(|e| LoaderError::Worker(e.to_string()))?;
        report.merge(stats);
    }
    reader
        .await
        .map_err(|e| LoaderError::Worker(format!("reader: {}", e)))?;

    Ok(report)
}

async fn run_worker(
    worker: usize,
    mapper: Arc<RowMapper>,
    rx: Arc<Mutex<mpsc::Receiver<Result<Row>>>>,
    cancel: CancelFlag,
    processed: Arc<AtomicU64>,
    options: DispatchOptions,
) -> LoadReport {
    let mut stats = LoadReport::default();
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let item = { rx.lock().await.recv().await };
        let item = match item {
            Some(item) => item,
            None => break,
        };
        // Another worker failed while this one waited.
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        stats.rows += 1;
        let (row_id, result) = match item {
            Ok(row) => (Some(row.id), mapper.load(&row).await),
            Err(e) => (None, Err(e)),
        };

        match result {
            Ok(mapped) => {
                stats.loaded += 1;
                stats.objects += mapped.created() as u64;
            }
            Err(e) => {
                stats.failed += 1;
                let message = describe_failure(row_id, &e);
                log::error!("{}", message);
                if !options.continue_on_error {
                    log::debug!("Worker {} cancelling run", worker);
                    cancel.store(true, Ordering::SeqCst);
                    stats.aborted = true;
                    stats.abort_reason = Some(message);
                    break;
                }
            }
        }

        let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
        if options.progress_every > 0 && done % options.progress_every == 0 {
            log::info!("{} rows processed", done);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphCall, MemoryGraph};
    use crate::mapping::Mapping;
    use crate::resolve::FileFetcher;
    use std::time::Duration;

    const MAPPING: &str = r#"
entities:
  person:
    schema: Person
columns:
  - {object: person, column: Name, property: name, required: true}
"#;

    fn setup() -> (Arc<RowMapper>, MemoryGraph) {
        let graph = MemoryGraph::new();
        let mapper = RowMapper::new(
            Arc::new(Mapping::from_yaml_str(MAPPING).unwrap()),
            Arc::new(graph.clone()),
            FileFetcher::new(Duration::from_secs(5)).unwrap(),
        );
        (Arc::new(mapper), graph)
    }

    fn rows(names: &[&str]) -> Vec<Result<Row>> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Ok(Row::from_pairs(i as u64 + 2, [("Name", *n)])))
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_load() {
        let (mapper, graph) = setup();
        let report = dispatch(
            mapper,
            rows(&["Ada", "Grace", "Edsger"]).into_iter(),
            &DispatchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.rows, 3);
        assert_eq!(report.loaded, 3);
        assert_eq!(report.objects, 3);
        assert!(!report.aborted);

        let names: Vec<_> = graph
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GraphCall::Set { value, .. } => Some(value.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["Ada", "Grace", "Edsger"]);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_dispatch() {
        let (mapper, graph) = setup();
        let report = dispatch(
            mapper,
            rows(&["Ada", "", "Grace", "Edsger"]).into_iter(),
            &DispatchOptions::default(),
        )
        .await
        .unwrap();

        assert!(report.aborted);
        assert_eq!(report.failed, 1);
        assert_eq!(report.loaded, 1);
        assert_eq!(graph.saved(), 1);
        let reason = report.abort_reason.unwrap();
        assert!(reason.starts_with("Row 3:"), "{}", reason);
        assert!(reason.contains("Name"));
    }

    #[tokio::test]
    async fn test_continue_counts_failures() {
        let (mapper, graph) = setup();
        let options = DispatchOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let report = dispatch(mapper, rows(&["Ada", " ", "Grace", ""]).into_iter(), &options)
            .await
            .unwrap();

        assert!(!report.aborted);
        assert_eq!(report.rows, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.loaded, 2);
        assert_eq!(graph.saved(), 2);
    }

    #[tokio::test]
    async fn test_reader_errors_count_as_failed_rows() {
        let (mapper, _graph) = setup();
        let options = DispatchOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let mut input = rows(&["Ada"]);
        input.push(Err(LoaderError::Worker("broken record".into())));
        let report = dispatch(mapper, input.into_iter(), &options).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.loaded, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_workers_load_every_row() {
        let (mapper, graph) = setup();
        let names: Vec<String> = (0..50).map(|i| format!("person-{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let options = DispatchOptions {
            workers: 4,
            queue_depth: 8,
            ..Default::default()
        };
        let report = dispatch(mapper, rows(&refs).into_iter(), &options)
            .await
            .unwrap();

        assert_eq!(report.loaded, 50);
        assert_eq!(graph.saved(), 50);

        // Each object's calls stay in create, set, unique, save order.
        let calls = graph.calls();
        for handle in 1..=50u64 {
            let kinds: Vec<&str> = calls
                .iter()
                .filter_map(|c| match c {
                    GraphCall::MakeEntity { handle: h, .. } if *h == handle => Some("make"),
                    GraphCall::Set { handle: h, .. } if *h == handle => Some("set"),
                    GraphCall::MarkUnique { handle: h, .. } if *h == handle => Some("unique"),
                    GraphCall::Save { handle: h } if *h == handle => Some("save"),
                    _ => None,
                })
                .collect();
            assert_eq!(kinds, vec!["make", "set", "unique", "save"]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fail_fast_stops_parallel_workers() {
        let (mapper, graph) = setup();
        let mut names: Vec<String> = (0..10_000).map(|i| format!("person-{}", i)).collect();
        // Line 7 of the input.
        names[5] = String::new();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let options = DispatchOptions {
            workers: 4,
            queue_depth: 4,
            ..Default::default()
        };
        let report = dispatch(mapper, rows(&refs).into_iter(), &options)
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.failed, 1);
        assert!(report.rows < 1_000, "dispatched {} rows", report.rows);
        assert_eq!(report.loaded, report.rows - 1);
        assert_eq!(graph.saved() as u64, report.loaded);
        assert!(report.abort_reason.unwrap().starts_with("Row 7:"));
    }

    #[test]
    fn test_describe_failure() {
        let transport = LoaderError::Transport("boom".into());
        assert_eq!(describe_failure(Some(9), &transport), "Row 9: Server error: boom");
        let invalid = LoaderError::InvalidValue {
            row: 9,
            column: "Name".into(),
            value: None,
        };
        assert_eq!(describe_failure(Some(9), &invalid), invalid.to_string());
    }
}
