//! Query assembler: request in, aggregate table out
//!
//! ```text
//!                              ┌─► worker ─┐
//! QueryDomain ─► decompose ────┼─► worker ─┼─► FragmentBuffer ─► correlator task
//!                              └─► worker ─┘                          │
//!                                                                     ▼
//!          AggregateTable ◄── SampledAggregate ◄── resolver ◄── correlated blocks
//! ```
//!
//! The whole run is bounded by the configured time limit. When it fires,
//! workers are cancelled (softly or by abort), partial results are dropped
//! and `Error::Timeout` is returned. A soft cancel waits one poll timeout
//! for workers to notice the flag before aborting them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::buffer::FragmentBuffer;
use super::source::FragmentSource;
use super::worker::{correlate_fragments, fetch_sub_domain, FetchContext};
use crate::config::{AssemblyConfig, CancelMode};
use crate::correlation::{CorrelatedBlock, RawDataCorrelator};
use crate::decomposition::{QueryDomain, RequestDecomposer};
use crate::error::{Error, Result};
use crate::metrics::AssemblyMetrics;
use crate::resolution::DomainCollisionResolver;
use crate::table::{AggregateTable, DataTable, SampledAggregate};

/// Drives decomposition, fetching, correlation and table building
pub struct QueryAssembler {
    config: AssemblyConfig,
    source: Arc<dyn FragmentSource>,
    decomposer: RequestDecomposer,
    metrics: Arc<AssemblyMetrics>,
}

/// Workers and consumer of one in-flight request
struct Run {
    workers: JoinSet<Result<usize>>,
    consumer: JoinHandle<Result<RawDataCorrelator>>,
    buffer: Arc<FragmentBuffer>,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl QueryAssembler {
    /// Create an assembler over a fragment source
    pub fn new(config: AssemblyConfig, source: Arc<dyn FragmentSource>) -> Result<Self> {
        config.validate()?;
        let decomposer = RequestDecomposer::from_config(&config);
        Ok(Self {
            config,
            source,
            decomposer,
            metrics: Arc::new(AssemblyMetrics::new()),
        })
    }

    /// Share an existing metrics collector
    pub fn with_metrics(mut self, metrics: Arc<AssemblyMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Arc<AssemblyMetrics> {
        &self.metrics
    }

    /// Decomposer used for incoming requests
    pub fn decomposer(&self) -> &RequestDecomposer {
        &self.decomposer
    }

    /// Fetch and correlate a request, stopping before resolution
    ///
    /// Blocks come back in start order.
    pub async fn correlate(&self, domain: &QueryDomain) -> Result<Vec<CorrelatedBlock>> {
        let started = Instant::now();
        let (correlator, _) = self.fetch_and_correlate(domain, started).await?;
        Ok(correlator.into_correlated_set())
    }

    /// Assemble a request into a paged table
    pub async fn assemble(&self, domain: &QueryDomain) -> Result<AggregateTable> {
        let started = Instant::now();
        let (correlator, sub_queries) = self.fetch_and_correlate(domain, started).await?;
        let stats = correlator.stats();
        let blocks = correlator.into_correlated_set();

        let remaining = self.config.timeout.duration().saturating_sub(started.elapsed());
        let build = tokio::task::spawn_blocking(move || build_aggregate(blocks));
        let (aggregate, super_domains) = match tokio::time::timeout(remaining, build).await {
            Ok(Ok(built)) => built?,
            Ok(Err(e)) => return Err(Error::TaskFailed(format!("table build task: {}", e))),
            Err(_) => {
                self.metrics.record_timeout();
                warn!(%domain, "Assembly timed out while building the table");
                return Err(Error::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    completed: sub_queries,
                    total: sub_queries,
                });
            }
        };
        self.metrics
            .record_resolution(stats.block_count as u64, super_domains as u64);

        let table = AggregateTable::new(Arc::new(aggregate));
        let elapsed = started.elapsed();
        self.metrics.record_completed(elapsed);
        info!(
            %domain,
            rows = table.row_count(),
            columns = table.column_count(),
            pages = table.page_count(),
            fragments = stats.fragments_processed,
            bytes = stats.bytes_processed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Assembled request"
        );
        Ok(table)
    }

    async fn fetch_and_correlate(
        &self,
        domain: &QueryDomain,
        started: Instant,
    ) -> Result<(RawDataCorrelator, usize)> {
        let sub_domains = self.decomposer.decompose_auto(domain)?;
        self.metrics.record_sub_queries(sub_domains.len() as u64);
        let mut run = self.spawn(sub_domains);
        let total = run.total;

        let limit = self.config.timeout.duration();
        match tokio::time::timeout(limit, Self::drive(&mut run)).await {
            Ok(result) => result.map(|correlator| (correlator, total)),
            Err(_) => {
                let completed = run.completed.load(Ordering::Acquire);
                self.cancel(run).await;
                self.metrics.record_timeout();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    %domain,
                    elapsed_ms,
                    completed,
                    limit_ms = limit.as_millis() as u64,
                    mode = ?self.config.timeout.cancel_mode,
                    "Assembly timed out; discarding partial results"
                );
                Err(Error::Timeout {
                    elapsed_ms,
                    completed,
                    total,
                })
            }
        }
    }

    fn spawn(&self, sub_domains: Vec<QueryDomain>) -> Run {
        let streams = &self.config.streams;
        let buffer = Arc::new(FragmentBuffer::new(streams.buffer_capacity));
        let cancelled = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicUsize::new(0));
        let ctx = FetchContext {
            source: self.source.clone(),
            buffer: buffer.clone(),
            permits: Arc::new(Semaphore::new(streams.max_streams)),
            cancelled: cancelled.clone(),
            completed: completed.clone(),
            metrics: self.metrics.clone(),
        };

        let total = sub_domains.len();
        let mut workers = JoinSet::new();
        for sub_domain in sub_domains {
            workers.spawn(fetch_sub_domain(ctx.clone(), sub_domain));
        }
        debug!(
            sub_queries = total,
            max_streams = streams.max_streams,
            "Spawned fetch workers"
        );

        let consumer = tokio::spawn(correlate_fragments(
            buffer.clone(),
            self.config.correlation.clone(),
            streams.clone(),
            self.metrics.clone(),
        ));

        Run {
            workers,
            consumer,
            buffer,
            cancelled,
            completed,
            total,
        }
    }

    /// Wait for every worker, then for the consumer to drain
    async fn drive(run: &mut Run) -> Result<RawDataCorrelator> {
        let mut first_error: Option<Error> = None;
        while let Some(joined) = run.workers.join_next().await {
            let outcome = match joined {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Error::TaskFailed(format!("fetch worker: {}", e)),
            };
            if first_error.is_none() {
                warn!(error = %outcome, "Fetch worker failed; aborting remaining workers");
                run.workers.abort_all();
                first_error = Some(outcome);
            }
        }

        run.buffer.shutdown();
        let correlated = match (&mut run.consumer).await {
            Ok(result) => result,
            Err(e) => Err(Error::TaskFailed(format!("correlation task: {}", e))),
        };

        match first_error {
            Some(e) => Err(e),
            None => correlated,
        }
    }

    async fn cancel(&self, mut run: Run) {
        match self.config.timeout.cancel_mode {
            CancelMode::Soft => {
                run.cancelled.store(true, Ordering::Release);
                run.buffer.shutdown();
                // Workers stuck inside a stream never see the flag
                let grace = self.config.streams.poll_timeout();
                let stopped = tokio::time::timeout(grace, async {
                    while run.workers.join_next().await.is_some() {}
                    let _ = (&mut run.consumer).await;
                })
                .await;
                if stopped.is_err() {
                    warn!(
                        grace_ms = grace.as_millis() as u64,
                        remaining = run.workers.len(),
                        "Workers ignored soft cancel; aborting"
                    );
                    run.workers.abort_all();
                    run.consumer.abort();
                }
            }
            CancelMode::Hard => {
                run.workers.abort_all();
                run.consumer.abort();
                run.buffer.shutdown();
            }
        }
        debug!(total = run.total, "Cancelled in-flight request");
    }
}

/// Resolve collisions and build the aggregate; returns super-domain count
fn build_aggregate(blocks: Vec<CorrelatedBlock>) -> Result<(SampledAggregate, usize)> {
    let mut resolver = DomainCollisionResolver::new();
    let resolved = resolver.resolve(blocks)?;
    let aggregate = SampledAggregate::from_resolved(resolved)?;
    Ok((aggregate, resolver.stats().super_domains))
}

impl std::fmt::Debug for QueryAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAssembler")
            .field("config", &self.config)
            .field("decomposer", &self.decomposer)
            .finish()
    }
}
