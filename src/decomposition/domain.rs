//! Query domains: source set crossed with a half-open time range

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{format_timestamp, Timestamp};

/// Sources and time range of one request
///
/// The range is half-open: `[begin, end)`. Source order is preserved and
/// used when splitting along the source axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDomain {
    sources: Vec<String>,
    begin: Timestamp,
    end: Timestamp,
}

impl QueryDomain {
    /// Create a domain, rejecting empty or reversed ranges and duplicate sources
    pub fn new<S: Into<String>>(
        sources: impl IntoIterator<Item = S>,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Self> {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(Error::InvalidDomain("no sources requested".to_string()));
        }
        if end <= begin {
            return Err(Error::InvalidDomain(format!(
                "empty time range [{}, {})",
                format_timestamp(begin),
                format_timestamp(end)
            )));
        }
        let mut seen = HashSet::with_capacity(sources.len());
        for source in &sources {
            if source.is_empty() {
                return Err(Error::InvalidDomain("empty source name".to_string()));
            }
            if !seen.insert(source.as_str()) {
                return Err(Error::InvalidDomain(format!(
                    "source {} requested twice",
                    source
                )));
            }
        }
        Ok(Self {
            sources,
            begin,
            end,
        })
    }

    /// Requested sources in request order
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of requested sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Inclusive start
    pub fn begin(&self) -> Timestamp {
        self.begin
    }

    /// Exclusive end
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Length of the range in nanoseconds
    pub fn duration(&self) -> i64 {
        self.end - self.begin
    }

    /// True if `timestamp` falls in `[begin, end)`
    pub fn contains_time(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.begin && timestamp < self.end
    }

    /// True if `source` is requested
    pub fn contains_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }

    /// Same range over a subset of sources
    pub(crate) fn with_sources(&self, sources: Vec<String>) -> Self {
        Self {
            sources,
            begin: self.begin,
            end: self.end,
        }
    }

    /// Same sources over a sub-range
    pub(crate) fn with_range(&self, begin: Timestamp, end: Timestamp) -> Self {
        Self {
            sources: self.sources.clone(),
            begin,
            end,
        }
    }
}

impl fmt::Display for QueryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources over [{}, {})",
            self.sources.len(),
            format_timestamp(self.begin),
            format_timestamp(self.end)
        )
    }
}
