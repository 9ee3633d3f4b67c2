//! Assembly Integration Tests
//!
//! Runs complete requests through the async assembler against in-memory
//! fragment sources.
//!
//! # Test Coverage
//!
//! 1. **Decomposed Requests** - Grid split, reassembled into one table
//! 2. **Timeouts** - Soft and hard cancellation discard partial results
//! 3. **Stream Failures** - A broken stream fails the whole request
//! 4. **Configuration** - TOML file drives decomposition and limits

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use archive_assembly::assembly::{
    CancelMode, FragmentSource, FragmentStream, InMemoryFragmentSource, QueryAssembler,
};
use archive_assembly::clock::SamplingClock;
use archive_assembly::config::{AssemblyConfig, TimeUnit};
use archive_assembly::decomposition::{DecompositionStrategy, QueryDomain};
use archive_assembly::error::{Error, Result};
use archive_assembly::fragment::RawFragment;
use archive_assembly::table::DataTable;
use archive_assembly::types::{Value, ValueType};
use async_trait::async_trait;
use tempfile::NamedTempFile;

const MS: i64 = 1_000_000;

// =============================================================================
// Test Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Ten samples, 100us apart, starting at `start`
fn fragment(source: &str, start: i64) -> RawFragment {
    let clock = SamplingClock::new(start, 100_000, 10).unwrap();
    let values = (0..10).map(|i| Value::Long(start + i)).collect();
    RawFragment::with_clock(source, ValueType::Long, values, clock)
}

fn config(limit_ms: u64) -> AssemblyConfig {
    let mut config = AssemblyConfig::default();
    config.timeout.limit = limit_ms;
    config.timeout.unit = TimeUnit::Milliseconds;
    config.streams.poll_timeout_ms = 20;
    config
}

fn sources(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("pv:{}", i)).collect()
}

/// Source whose streams open but never yield, like a hung connection
struct StalledSource;

struct StalledStream;

#[async_trait]
impl FragmentSource for StalledSource {
    async fn open(&self, _domain: &QueryDomain) -> Result<Box<dyn FragmentStream>> {
        Ok(Box::new(StalledStream))
    }
}

#[async_trait]
impl FragmentStream for StalledStream {
    async fn next(&mut self) -> Result<Option<RawFragment>> {
        std::future::pending().await
    }
}

// =============================================================================
// Decomposed Requests
// =============================================================================

#[tokio::test]
async fn test_grid_decomposed_request_reassembles() {
    init_tracing();
    let names = sources(6);
    let mut fragments = Vec::new();
    for name in &names {
        for interval in 0..3 {
            // pv:5 has nothing in the middle interval
            if name == "pv:5" && interval == 1 {
                continue;
            }
            fragments.push(fragment(name, interval * MS));
        }
    }

    let mut config = config(5_000);
    config.decomposition.max_sources = 2;
    config.decomposition.max_duration_ms = 1;
    config.streams.max_streams = 3;
    config.correlation.pivot_size = 2;
    config.streams.batch_size = 4;

    let source = InMemoryFragmentSource::new(fragments);
    let assembler = QueryAssembler::new(config, Arc::new(source)).unwrap();
    let domain = QueryDomain::new(names.clone(), 0, 3 * MS).unwrap();

    let params = assembler.decomposer().parameters(&domain, assembler.config().decomposition.policy);
    assert_eq!(params.strategy, DecompositionStrategy::Grid);
    assert_eq!(params.sub_domain_count(), 9);

    let table = assembler.assemble(&domain).await.unwrap();
    assert_eq!(table.page_count(), 3);
    assert_eq!(table.row_count(), 30);
    assert_eq!(table.column_count(), 6);
    assert_eq!(table.column_names(), names);

    assert_eq!(table.timestamp(10).unwrap(), MS);
    assert_eq!(table.value_by_name(12, "pv:0").unwrap(), &Value::Long(MS + 2));
    let gap = table.column_data_by_name("pv:5").unwrap();
    assert!(gap[..10].iter().all(|v| !v.is_null()));
    assert!(gap[10..20].iter().all(Value::is_null));
    assert!(gap[20..].iter().all(|v| !v.is_null()));

    let snapshot = assembler.metrics().snapshot();
    assert_eq!(snapshot.sub_queries_issued, 9);
    assert_eq!(snapshot.sub_queries_completed, 9);
    assert_eq!(snapshot.fragments_received, 17);
    assert_eq!(snapshot.requests_completed, 1);
    assert_eq!(snapshot.timeouts, 0);
}

#[tokio::test]
async fn test_disabled_decomposition_issues_one_stream() {
    let names = sources(4);
    let fragments = names.iter().map(|n| fragment(n, 0)).collect();
    let mut config = config(5_000);
    config.decomposition.enabled = false;
    config.decomposition.max_sources = 1;

    let assembler = QueryAssembler::new(config, Arc::new(InMemoryFragmentSource::new(fragments))).unwrap();
    let domain = QueryDomain::new(names, 0, MS).unwrap();
    let table = assembler.assemble(&domain).await.unwrap();

    assert_eq!(table.row_count(), 10);
    assert_eq!(table.page_count(), 1);
    assert_eq!(assembler.metrics().snapshot().sub_queries_issued, 1);
}

#[tokio::test]
async fn test_empty_result_is_empty_table() {
    let assembler =
        QueryAssembler::new(config(5_000), Arc::new(InMemoryFragmentSource::default())).unwrap();
    let domain = QueryDomain::new(["pv:none"], 0, MS).unwrap();
    let table = assembler.assemble(&domain).await.unwrap();
    assert!(table.is_empty());
    assert_eq!(table.page_count(), 0);
}

// =============================================================================
// Timeouts
// =============================================================================

async fn run_slow_request(mode: CancelMode) -> (Error, Duration, QueryAssembler) {
    let fragments = (0..5).map(|i| fragment("pv:slow", i * MS)).collect();
    let source = InMemoryFragmentSource::new(fragments).with_delay(Duration::from_millis(100));
    let mut config = config(30);
    config.timeout.cancel_mode = mode;

    let assembler = QueryAssembler::new(config, Arc::new(source)).unwrap();
    let domain = QueryDomain::new(["pv:slow"], 0, 10 * MS).unwrap();
    let started = Instant::now();
    let err = assembler.assemble(&domain).await.unwrap_err();
    (err, started.elapsed(), assembler)
}

#[tokio::test]
async fn test_soft_timeout_discards_partial_results() {
    init_tracing();
    let (err, elapsed, assembler) = run_slow_request(CancelMode::Soft).await;

    assert!(err.is_timeout());
    match err {
        Error::Timeout {
            elapsed_ms,
            completed,
            total,
        } => {
            assert!(elapsed_ms >= 30);
            assert_eq!(completed, 0);
            assert_eq!(total, 1);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    // Soft cancel waits for the in-flight fragment at most
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(assembler.metrics().timeouts(), 1);
    assert_eq!(assembler.metrics().snapshot().requests_completed, 0);
}

#[tokio::test]
async fn test_hard_timeout_aborts_workers() {
    let (err, elapsed, assembler) = run_slow_request(CancelMode::Hard).await;

    assert!(matches!(err, Error::Timeout { total: 1, .. }));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(assembler.metrics().timeouts(), 1);
}

#[tokio::test]
async fn test_soft_timeout_returns_when_stream_never_yields() {
    let mut config = config(100);
    config.timeout.cancel_mode = CancelMode::Soft;
    let assembler = QueryAssembler::new(config, Arc::new(StalledSource)).unwrap();
    let domain = QueryDomain::new(["pv:stuck"], 0, MS).unwrap();

    let started = Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(3), assembler.assemble(&domain))
        .await
        .expect("soft cancel must not wait on a stalled stream");

    assert!(matches!(
        outcome,
        Err(Error::Timeout {
            completed: 0,
            total: 1,
            ..
        })
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(assembler.metrics().timeouts(), 1);
}

// =============================================================================
// Stream Failures
// =============================================================================

#[tokio::test]
async fn test_stream_failure_fails_request() {
    let names = sources(4);
    let fragments = names.iter().map(|n| fragment(n, 0)).collect();
    let source = InMemoryFragmentSource::new(fragments).with_failing_source("pv:3");
    let mut config = config(5_000);
    config.decomposition.max_sources = 1;

    let assembler = QueryAssembler::new(config, Arc::new(source)).unwrap();
    let domain = QueryDomain::new(names, 0, MS).unwrap();
    let err = assembler.assemble(&domain).await.unwrap_err();

    assert!(matches!(err, Error::Stream(ref msg) if msg.contains("pv:3")));
    assert!(!err.is_timeout());
    assert!(assembler.metrics().snapshot().stream_errors >= 1);
}

#[tokio::test]
async fn test_type_conflict_across_pages_fails_request() {
    let clock = SamplingClock::new(MS, 100_000, 2).unwrap();
    let fragments = vec![
        fragment("pv:0", 0),
        RawFragment::with_clock(
            "pv:0",
            ValueType::Double,
            vec![Value::Double(1.0), Value::Double(2.0)],
            clock,
        ),
    ];
    let assembler =
        QueryAssembler::new(config(5_000), Arc::new(InMemoryFragmentSource::new(fragments))).unwrap();
    let domain = QueryDomain::new(["pv:0"], 0, 2 * MS).unwrap();

    let err = assembler.assemble(&domain).await.unwrap_err();
    assert!(matches!(err, Error::ColumnTypeConflict { .. }));
    assert!(err.is_structural());
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_config_file_drives_assembler() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(
        file,
        r#"
[decomposition]
max_sources = 2
max_duration_ms = 1
policy = "preferred"

[streams]
max_streams = 2
poll_timeout_ms = 20

[timeout]
limit = 5
unit = "seconds"
cancel_mode = "hard"
"#
    )
    .unwrap();

    let config = AssemblyConfig::from_file(file.path()).unwrap();
    assert_eq!(config.timeout.duration(), Duration::from_secs(5));
    assert_eq!(config.timeout.cancel_mode, CancelMode::Hard);

    let names = sources(4);
    let fragments = names
        .iter()
        .flat_map(|n| [fragment(n, 0), fragment(n, 2 * MS)])
        .collect();
    let assembler =
        QueryAssembler::new(config, Arc::new(InMemoryFragmentSource::new(fragments))).unwrap();
    let domain = QueryDomain::new(names, 0, 3 * MS).unwrap();

    // 2x3 = 6 sub-queries exceeds the two-stream grid limit, so only the
    // larger axis is split
    let params = assembler
        .decomposer()
        .parameters(&domain, assembler.config().decomposition.policy);
    assert_eq!(params.strategy, DecompositionStrategy::Vertical);
    assert_eq!(params.vertical, 3);

    let table = assembler.assemble(&domain).await.unwrap();
    assert_eq!(table.page_count(), 2);
    assert_eq!(table.row_count(), 20);
    assert_eq!(table.column_count(), 4);
}
