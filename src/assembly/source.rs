//! Fragment sources: the transport seam
//!
//! A [`FragmentSource`] opens one stream per sub-request. Connection setup,
//! authentication and wire decoding live behind this trait; the pipeline
//! only sees decoded [`RawFragment`]s.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::decomposition::QueryDomain;
use crate::error::{Error, Result};
use crate::fragment::RawFragment;

/// Opens fragment streams for query domains
#[async_trait]
pub trait FragmentSource: Send + Sync + 'static {
    /// Start streaming the fragments that answer `domain`
    async fn open(&self, domain: &QueryDomain) -> Result<Box<dyn FragmentStream>>;
}

/// One open fragment stream
#[async_trait]
pub trait FragmentStream: Send {
    /// Next fragment, `None` once the stream is exhausted
    async fn next(&mut self) -> Result<Option<RawFragment>>;
}

/// Serves pre-decoded fragments from memory
///
/// A fragment answers a domain when its source is requested and its first
/// sample falls in the domain's half-open range, so adjacent sub-domains
/// never both receive it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFragmentSource {
    fragments: Vec<RawFragment>,
    delay: Option<Duration>,
    failing_source: Option<String>,
}

impl InMemoryFragmentSource {
    /// Serve the given fragments
    pub fn new(fragments: Vec<RawFragment>) -> Self {
        Self {
            fragments,
            delay: None,
            failing_source: None,
        }
    }

    /// Sleep before yielding each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail any stream at the first fragment for `source`
    pub fn with_failing_source(mut self, source: impl Into<String>) -> Self {
        self.failing_source = Some(source.into());
        self
    }

    /// Number of fragments held
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// True if no fragments are held
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[async_trait]
impl FragmentSource for InMemoryFragmentSource {
    async fn open(&self, domain: &QueryDomain) -> Result<Box<dyn FragmentStream>> {
        let pending = self
            .fragments
            .iter()
            .filter(|f| domain.contains_source(&f.source) && domain.contains_time(f.axis.start()))
            .cloned()
            .collect();
        Ok(Box::new(InMemoryStream {
            pending,
            delay: self.delay,
            failing_source: self.failing_source.clone(),
        }))
    }
}

struct InMemoryStream {
    pending: VecDeque<RawFragment>,
    delay: Option<Duration>,
    failing_source: Option<String>,
}

#[async_trait]
impl FragmentStream for InMemoryStream {
    async fn next(&mut self) -> Result<Option<RawFragment>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.pending.pop_front() {
            Some(fragment) if self.failing_source.as_deref() == Some(fragment.source.as_str()) => {
                Err(Error::Stream(format!(
                    "stream for {} reset by peer",
                    fragment.source
                )))
            }
            other => Ok(other),
        }
    }
}
