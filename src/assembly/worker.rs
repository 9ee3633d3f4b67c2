//! Fetch workers and the correlation task
//!
//! Each fetch worker drives one sub-request's stream into the shared
//! buffer. A single correlation task owns the correlator, pulls batches
//! from the buffer, and hands large batches to a blocking thread so the
//! rayon pool never runs on the async runtime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::buffer::{BufferPoll, FragmentBuffer};
use super::source::FragmentSource;
use crate::config::{CorrelationConfig, StreamConfig};
use crate::correlation::RawDataCorrelator;
use crate::decomposition::QueryDomain;
use crate::error::{Error, Result};
use crate::fragment::RawFragment;
use crate::metrics::AssemblyMetrics;

/// State shared by every fetch worker of one request
#[derive(Clone)]
pub(crate) struct FetchContext {
    pub source: Arc<dyn FragmentSource>,
    pub buffer: Arc<FragmentBuffer>,
    pub permits: Arc<Semaphore>,
    pub cancelled: Arc<AtomicBool>,
    pub completed: Arc<AtomicUsize>,
    pub metrics: Arc<AssemblyMetrics>,
}

/// Stream one sub-domain into the buffer; returns fragments delivered
pub(crate) async fn fetch_sub_domain(ctx: FetchContext, domain: QueryDomain) -> Result<usize> {
    let _permit = ctx
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| Error::ChannelClosed("fetch permits closed".to_string()))?;

    let mut stream = ctx.source.open(&domain).await.map_err(|e| {
        ctx.metrics.record_stream_error();
        e
    })?;

    let mut delivered = 0usize;
    loop {
        if ctx.cancelled.load(Ordering::Acquire) {
            debug!(%domain, delivered, "Fetch cancelled");
            return Ok(delivered);
        }
        let fragment = match stream.next().await {
            Ok(Some(fragment)) => fragment,
            Ok(None) => break,
            Err(e) => {
                ctx.metrics.record_stream_error();
                return Err(e);
            }
        };
        ctx.metrics.record_fragment(fragment.serialized_size as u64);
        ctx.buffer.push(fragment).await?;
        delivered += 1;
    }

    ctx.completed.fetch_add(1, Ordering::AcqRel);
    ctx.metrics.record_sub_query_completed();
    debug!(%domain, delivered, "Fetch complete");
    Ok(delivered)
}

/// Consume the buffer until it drains, correlating in batches
///
/// After the first correlation failure the task keeps draining, so no
/// producer stays blocked on a full buffer, and returns that failure.
pub(crate) async fn correlate_fragments(
    buffer: Arc<FragmentBuffer>,
    config: CorrelationConfig,
    streams: StreamConfig,
    metrics: Arc<AssemblyMetrics>,
) -> Result<RawDataCorrelator> {
    let mut correlator = Some(RawDataCorrelator::new(config.clone()));
    let mut batch: Vec<RawFragment> = Vec::with_capacity(streams.batch_size);
    let mut first_error: Option<Error> = None;
    let mut idle_polls = 0u32;

    loop {
        match buffer.poll(streams.poll_timeout()).await {
            BufferPoll::Fragment(fragment) => {
                idle_polls = 0;
                if first_error.is_some() {
                    continue;
                }
                batch.push(fragment);
                if batch.len() >= streams.batch_size {
                    flush(&mut correlator, &mut batch, &config, &metrics, &mut first_error).await;
                }
            }
            BufferPoll::Idle => {
                idle_polls += 1;
                metrics.record_stall();
                if idle_polls > 1 {
                    warn!(
                        idle_polls,
                        timeout_ms = streams.poll_timeout_ms,
                        "Fragment producers stalled"
                    );
                }
                if first_error.is_none() && !batch.is_empty() {
                    flush(&mut correlator, &mut batch, &config, &metrics, &mut first_error).await;
                }
            }
            BufferPoll::Drained => break,
        }
    }

    if first_error.is_none() && !batch.is_empty() {
        flush(&mut correlator, &mut batch, &config, &metrics, &mut first_error).await;
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    correlator.ok_or_else(|| Error::IllegalState("correlator lost during batch insert".to_string()))
}

async fn flush(
    slot: &mut Option<RawDataCorrelator>,
    batch: &mut Vec<RawFragment>,
    config: &CorrelationConfig,
    metrics: &AssemblyMetrics,
    first_error: &mut Option<Error>,
) {
    let fragments = std::mem::take(batch);
    let Some(mut correlator) = slot.take() else {
        first_error.get_or_insert(Error::IllegalState(
            "correlator lost during batch insert".to_string(),
        ));
        return;
    };
    let count = fragments.len();
    let before = correlator.stats().fragments_processed;

    let (correlator, result) = if config.concurrency_enabled && count > config.pivot_size {
        match tokio::task::spawn_blocking(move || {
            let result = correlator.process_batch(fragments);
            (correlator, result)
        })
        .await
        {
            Ok(done) => done,
            Err(e) => {
                first_error.get_or_insert(Error::TaskFailed(format!(
                    "batch correlation task: {}",
                    e
                )));
                return;
            }
        }
    } else {
        let result = correlator.process_batch(fragments);
        (correlator, result)
    };

    metrics.record_batch();
    let inserted = correlator.stats().fragments_processed.saturating_sub(before);
    *slot = Some(correlator);
    if let Err(e) = result {
        let rejected = (count as u64).saturating_sub(inserted);
        metrics.record_rejected(rejected);
        warn!(error = %e, fragments = count, rejected, "Batch correlation failed");
        first_error.get_or_insert(e);
    }
}
