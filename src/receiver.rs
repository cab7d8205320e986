//! Frame hand-off between the edge callback and the consumer.
//!
//! The edge callback runs on whatever thread the GPIO watch facility uses
//! and must stay fast. Completed frames are pushed into a single-producer,
//! single-consumer queue and interpreted elsewhere (see
//! [`crate::monitor::ReadingMonitor`]).
//!
//! Shutdown order: close the producer ([`EdgeHandler::close`] or drop it)
//! first, then let the consumer drain. Frames already queued are still
//! delivered.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{EdgeClock, EdgeDecoder, EdgeEvent, EdgeSink, Frame, Level};

/// What the producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueuePolicy {
    /// Wait for space. Edge processing stalls while the queue is full, so
    /// edges arriving meanwhile are measured late and the next frame is
    /// likely lost.
    #[default]
    Block,
    /// Drop the new frame and log it.
    DropNewest,
    /// Never full.
    Unbounded,
}

/// Hand-off queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueConfig {
    /// Queue capacity for bounded policies.
    pub capacity: usize,
    /// Full-queue behaviour.
    pub policy: QueuePolicy,
}

impl QueueConfig {
    /// Default bounded capacity.
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Check the capacity is usable.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 && self.policy != QueuePolicy::Unbounded {
            return Err(Error::InvalidParameter {
                name: "queue_capacity".to_string(),
                value: self.capacity.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            policy: QueuePolicy::default(),
        }
    }
}

/// Counters for the producer side of the queue.
#[derive(Debug, Default)]
struct QueueCounters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

enum SenderInner {
    Blocking(mpsc::Sender<Frame>),
    Dropping(mpsc::Sender<Frame>),
    Unbounded(mpsc::UnboundedSender<Frame>),
}

/// Producer half of the frame queue.
pub struct FrameSender {
    inner: SenderInner,
    counters: Arc<QueueCounters>,
}

impl FrameSender {
    /// Push a completed frame.
    ///
    /// With [`QueuePolicy::Block`] this blocks the calling thread while the
    /// queue is full. Plain threads, `spawn_blocking` threads and workers of
    /// a multi-thread runtime may block; a task on a current-thread runtime
    /// must not use this policy, as tokio panics there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the consumer is gone.
    pub fn send(&self, frame: Frame) -> Result<()> {
        let result = match &self.inner {
            SenderInner::Blocking(tx) => match tx.try_send(frame) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(frame)) => {
                    debug!("Frame queue full, waiting for the consumer");
                    tokio::task::block_in_place(|| tx.blocking_send(frame))
                        .map_err(|_| Error::QueueClosed)
                }
                Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
            },
            SenderInner::Dropping(tx) => match tx.try_send(frame) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped, "Frame queue full, dropping frame");
                    return Ok(());
                }
                Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
            },
            SenderInner::Unbounded(tx) => tx.send(frame).map_err(|_| Error::QueueClosed),
        };

        if result.is_ok() {
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Frames successfully queued.
    pub fn frames_sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    /// Frames dropped because the queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Check whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Blocking(tx) | SenderInner::Dropping(tx) => tx.is_closed(),
            SenderInner::Unbounded(tx) => tx.is_closed(),
        }
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("sent", &self.frames_sent())
            .field("dropped", &self.frames_dropped())
            .finish()
    }
}

enum ReceiverInner {
    Bounded(mpsc::Receiver<Frame>),
    Unbounded(mpsc::UnboundedReceiver<Frame>),
}

/// Consumer half of the frame queue.
pub struct FrameReceiver {
    inner: ReceiverInner,
}

impl FrameReceiver {
    /// Wait for the next frame. Returns `None` once the producer is closed
    /// and every queued frame has been received.
    pub async fn recv(&mut self) -> Option<Frame> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Blocking variant of [`FrameReceiver::recv`] for non-async consumers.
    pub fn blocking_recv(&mut self) -> Option<Frame> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.blocking_recv(),
            ReceiverInner::Unbounded(rx) => rx.blocking_recv(),
        }
    }

    /// Take a frame if one is ready.
    pub fn try_recv(&mut self) -> Option<Frame> {
        let result = match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.try_recv(),
            ReceiverInner::Unbounded(rx) => rx.try_recv(),
        };
        match result {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop accepting new frames; queued frames can still be received.
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.close(),
            ReceiverInner::Unbounded(rx) => rx.close(),
        }
    }
}

impl std::fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver").finish_non_exhaustive()
    }
}

/// Create a frame queue.
pub fn frame_channel(config: &QueueConfig) -> (FrameSender, FrameReceiver) {
    let counters = Arc::new(QueueCounters::default());
    let capacity = config.capacity.max(1);

    let (inner_tx, inner_rx) = match config.policy {
        QueuePolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (SenderInner::Blocking(tx), ReceiverInner::Bounded(rx))
        }
        QueuePolicy::DropNewest => {
            let (tx, rx) = mpsc::channel(capacity);
            (SenderInner::Dropping(tx), ReceiverInner::Bounded(rx))
        }
        QueuePolicy::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (SenderInner::Unbounded(tx), ReceiverInner::Unbounded(rx))
        }
    };

    (
        FrameSender {
            inner: inner_tx,
            counters,
        },
        FrameReceiver { inner: inner_rx },
    )
}

/// Producer glue between an edge source and the frame queue.
///
/// Owns the decoder; completed frames move into the queue and become the
/// consumer's.
pub struct EdgeHandler<S = EdgeDecoder> {
    sink: S,
    tx: Option<FrameSender>,
}

impl<S: EdgeSink> EdgeHandler<S> {
    /// Create a handler feeding `tx`.
    pub fn new(sink: S, tx: FrameSender) -> Self {
        Self { sink, tx: Some(tx) }
    }

    /// Process one edge and forward a completed frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if a frame completed but the queue is
    /// closed. Decoder faults are not errors here; the sink logs them.
    pub fn handle(&mut self, event: EdgeEvent) -> Result<()> {
        match self.sink.on_edge(event) {
            Some(frame) => match &self.tx {
                Some(tx) => tx.send(frame),
                None => Err(Error::QueueClosed),
            },
            None => Ok(()),
        }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the wrapped sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The queue sender, if still open.
    pub fn sender(&self) -> Option<&FrameSender> {
        self.tx.as_ref()
    }

    /// Close the producer side of the queue.
    ///
    /// Edges are still decoded afterwards but completed frames are
    /// discarded.
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            info!(
                sent = tx.frames_sent(),
                dropped = tx.frames_dropped(),
                "Closing frame queue"
            );
        }
    }

    /// Check whether the producer side is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Wrap the handler for use from a GPIO callback that must be `Fn + Sync`.
    pub fn into_shared(self) -> SharedEdgeHandler<S> {
        SharedEdgeHandler {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

impl<S: EdgeSink + Send + 'static> EdgeHandler<S> {
    /// Turn the handler into a level callback stamped with `clock`.
    ///
    /// This is the shape most GPIO watch facilities expect: called with the
    /// level read after each transition.
    pub fn into_callback(mut self, clock: EdgeClock) -> impl FnMut(Level) + Send + 'static {
        move |level| {
            if let Err(e) = self.handle(clock.event(level)) {
                debug!("Edge dropped: {}", e);
            }
        }
    }
}

impl<S> std::fmt::Debug for EdgeHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeHandler")
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}

/// Cloneable, lock-protected [`EdgeHandler`].
///
/// The lock is uncontended as long as only one edge source calls
/// [`SharedEdgeHandler::handle`]; other holders may inspect the decoder or
/// close the queue.
pub struct SharedEdgeHandler<S = EdgeDecoder> {
    inner: Arc<Mutex<EdgeHandler<S>>>,
}

impl<S: EdgeSink> SharedEdgeHandler<S> {
    /// Process one edge.
    pub fn handle(&self, event: EdgeEvent) -> Result<()> {
        self.inner.lock().handle(event)
    }

    /// Run `f` with the wrapped sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(self.inner.lock().sink())
    }

    /// Close the producer side of the queue.
    pub fn close(&self) {
        self.inner.lock().close();
    }
}

impl<S> Clone for SharedEdgeHandler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
