//! Correlation of in-flight calls with their responses.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{Result, RpchError};
use crate::protocol::{ResponseFrame, Value};

type Completion = oneshot::Sender<Result<Value>>;

/// Pending-call table for one client connection.
///
/// Sequence numbers start at 0 and increase by one per call. A response
/// completes exactly one pending call; responses for unknown sequence
/// numbers are dropped. Once [`Multiplexer::fail_all`] has run the table is
/// closed and further registrations fail.
///
/// ```
/// use rpch::mux::Multiplexer;
///
/// let mux = Multiplexer::new();
/// let (seq, _rx) = mux.register().unwrap();
/// assert_eq!(seq, 0);
/// assert_eq!(mux.pending_count(), 1);
/// ```
#[derive(Debug)]
pub struct Multiplexer {
    pending: DashMap<u64, Completion>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl Multiplexer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Allocate the next sequence number and register a pending call for it.
    ///
    /// Fails with [`RpchError::ConnectionClosed`] after [`Multiplexer::fail_all`].
    pub fn register(&self) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let (seq, (), rx) = self.register_with(|_| Ok(()))?;
        Ok((seq, rx))
    }

    /// Build a request for the next sequence number, then register it.
    ///
    /// The sequence number is taken only if `build` succeeds, so a call
    /// rejected before it is sent leaves no gap. If another caller takes
    /// the number first, `build` runs again with the next one.
    pub fn register_with<T, F>(&self, mut build: F) -> Result<(u64, T, oneshot::Receiver<Result<Value>>)>
    where
        F: FnMut(u64) -> Result<T>,
    {
        if self.is_closed() {
            return Err(RpchError::ConnectionClosed);
        }
        let mut seq = self.next_seq.load(Ordering::Relaxed);
        let built = loop {
            let built = build(seq)?;
            match self.next_seq.compare_exchange(
                seq,
                seq.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break built,
                Err(current) => seq = current,
            }
        };
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        // fail_all may have drained the table between the check and the insert.
        if self.is_closed() {
            self.pending.remove(&seq);
            return Err(RpchError::ConnectionClosed);
        }
        Ok((seq, built, rx))
    }

    /// Drop a pending call without completing it.
    pub fn unregister(&self, seq: u64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Deliver a response to the call waiting on its sequence number.
    ///
    /// Returns `false` if no call was waiting.
    pub fn complete(&self, frame: ResponseFrame) -> bool {
        let seq = frame.seq;
        match self.pending.remove(&seq) {
            Some((_, tx)) => {
                // Caller may have stopped waiting.
                let _ = tx.send(frame.into_result());
                true
            }
            None => {
                tracing::debug!(seq, "discarding response with no pending call");
                false
            }
        }
    }

    /// Close the table and fail every pending call with
    /// [`RpchError::ConnectionClosed`].
    pub fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let seqs: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for seq in seqs {
            if let Some((_, tx)) = self.pending.remove(&seq) {
                let _ = tx.send(Err(RpchError::ConnectionClosed));
            }
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check whether [`Multiplexer::fail_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}
