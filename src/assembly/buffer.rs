//! Fragment hand-off buffer between fetch workers and the correlator
//!
//! A bounded channel plus an active flag. Producers push until the buffer
//! is shut down; the single consumer polls with a timeout so a stalled
//! producer is visible, and keeps draining after shutdown until the channel
//! is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::fragment::RawFragment;

/// Outcome of one poll
#[derive(Debug)]
pub enum BufferPoll {
    /// A fragment was available
    Fragment(RawFragment),
    /// Nothing arrived within the timeout while producers were active
    Idle,
    /// Shut down and empty
    Drained,
}

/// Bounded multi-producer, single-consumer fragment queue
#[derive(Debug)]
pub struct FragmentBuffer {
    sender: parking_lot::Mutex<Option<mpsc::Sender<RawFragment>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<RawFragment>>,
    active: AtomicBool,
    capacity: usize,
}

impl FragmentBuffer {
    /// Create a buffer holding at most `capacity` fragments
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            active: AtomicBool::new(true),
            capacity,
        }
    }

    /// Queue a fragment, waiting for space if the buffer is full
    pub async fn push(&self, fragment: RawFragment) -> Result<()> {
        if !self.is_active() {
            return Err(Error::BufferInactive);
        }
        let sender = self.sender.lock().clone().ok_or(Error::BufferInactive)?;
        sender
            .send(fragment)
            .await
            .map_err(|_| Error::ChannelClosed("fragment buffer consumer dropped".to_string()))
    }

    /// Wait up to `timeout` for the next fragment
    pub async fn poll(&self, timeout: Duration) -> BufferPoll {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(fragment)) => BufferPoll::Fragment(fragment),
            Ok(None) => BufferPoll::Drained,
            Err(_) => BufferPoll::Idle,
        }
    }

    /// Stop accepting fragments; queued ones remain pollable
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        self.sender.lock().take();
    }

    /// True until `shutdown` is called
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Maximum queued fragments
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SamplingClock;
    use crate::types::{Value, ValueType};

    fn fragment(source: &str) -> RawFragment {
        let clock = SamplingClock::new(0, 1, 1).unwrap();
        RawFragment::with_clock(source, ValueType::Int, vec![Value::Int(0)], clock)
    }

    #[tokio::test]
    async fn test_push_poll_drain() {
        let buffer = FragmentBuffer::new(4);
        buffer.push(fragment("a")).await.unwrap();
        buffer.push(fragment("b")).await.unwrap();
        buffer.shutdown();

        assert!(matches!(
            buffer.push(fragment("c")).await,
            Err(Error::BufferInactive)
        ));
        let timeout = Duration::from_millis(50);
        assert!(matches!(buffer.poll(timeout).await, BufferPoll::Fragment(f) if f.source == "a"));
        assert!(matches!(buffer.poll(timeout).await, BufferPoll::Fragment(f) if f.source == "b"));
        assert!(matches!(buffer.poll(timeout).await, BufferPoll::Drained));
        assert!(matches!(buffer.poll(timeout).await, BufferPoll::Drained));
    }

    #[tokio::test]
    async fn test_idle_while_active() {
        let buffer = FragmentBuffer::new(1);
        assert!(buffer.is_active());
        assert!(matches!(
            buffer.poll(Duration::from_millis(10)).await,
            BufferPoll::Idle
        ));
    }
}
