//! Consumer side of the frame queue.
//!
//! A background task drains completed frames, interprets both probe
//! readings, logs them and broadcasts them to subscribers. All blocking
//! output happens here, never on the edge callback path.

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::{FrameLayout, FrameReadings, ProbeId};
use crate::error::{Error, Result};
use crate::receiver::FrameReceiver;

/// Registration returned by [`ReadingMonitor::on_reading`].
///
/// Each registration runs its callback on its own broadcast subscription.
/// Dropping the handle, or calling [`CallbackHandle::unregister`], stops
/// that task; readings already delivered are not affected.
pub struct CallbackHandle {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop delivering readings to the callback.
    pub fn unregister(mut self) {
        self.cancel_now();
    }

    /// Registration order, starting at 0 for each monitor.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Background consumer that turns frames into readings.
pub struct ReadingMonitor {
    /// Readings broadcast channel.
    readings_tx: broadcast::Sender<FrameReadings>,
    /// Frames interpreted so far.
    frames_processed: Arc<AtomicU64>,
    /// Frames where at least one probe failed to decode.
    decode_failures: Arc<AtomicU64>,
    /// Background task handle.
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl ReadingMonitor {
    /// Readings buffered per subscriber before the slowest one lags.
    pub const BROADCAST_CAPACITY: usize = 64;

    /// Start draining `receiver` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(receiver: FrameReceiver, layout: FrameLayout) -> Self {
        let (readings_tx, _) = broadcast::channel(Self::BROADCAST_CAPACITY);
        let frames_processed = Arc::new(AtomicU64::new(0));
        let decode_failures = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(Self::run(
            receiver,
            layout,
            readings_tx.clone(),
            frames_processed.clone(),
            decode_failures.clone(),
        ));

        Self {
            readings_tx,
            frames_processed,
            decode_failures,
            handle: Mutex::new(Some(handle)),
            callback_counter: AtomicU64::new(0),
        }
    }

    async fn run(
        mut receiver: FrameReceiver,
        layout: FrameLayout,
        readings_tx: broadcast::Sender<FrameReadings>,
        frames_processed: Arc<AtomicU64>,
        decode_failures: Arc<AtomicU64>,
    ) {
        info!("Reading monitor started");

        while let Some(frame) = receiver.recv().await {
            let readings = FrameReadings::interpret(&frame, &layout);
            Self::log_readings(&readings);

            if !readings.is_complete() {
                decode_failures.fetch_add(1, Ordering::Relaxed);
            }
            frames_processed.fetch_add(1, Ordering::Relaxed);

            // No subscribers is fine.
            let _ = readings_tx.send(readings);
        }

        info!(
            frames = frames_processed.load(Ordering::Relaxed),
            "Frame queue closed, reading monitor stopped"
        );
    }

    fn log_readings(readings: &FrameReadings) {
        info!("Timestamp: {}", readings.received_at);
        for probe in ProbeId::ALL {
            match readings.probe(probe) {
                Ok(reading) => info!("Temp (Probe {}): {}", probe, reading),
                Err(e) => warn!("Temp (Probe {}): {}", probe, e),
            }
        }
        debug!("Data: {}", readings.nibbles);
    }

    /// Subscribe to readings.
    pub fn subscribe(&self) -> broadcast::Receiver<FrameReadings> {
        self.readings_tx.subscribe()
    }

    /// Readings as a stream. Readings missed by a lagging consumer are
    /// skipped; the stream ends when the monitor stops.
    pub fn stream(&self) -> impl Stream<Item = FrameReadings> + Send + 'static {
        stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(readings) => return Some((readings, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reading stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Register a callback for every interpreted frame.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&FrameReadings) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.readings_tx.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(readings) => callback(&readings),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(callback_id, skipped, "Reading callback lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || task.abort())
    }

    /// Frames interpreted so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Frames where at least one probe failed to decode.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Check whether the background task is still draining.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait until the queue is closed and every queued frame is processed.
    pub async fn join(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Internal(format!("reading monitor task failed: {}", e))),
            None => Ok(()),
        }
    }

    /// Stop immediately, discarding frames still queued.
    pub fn abort(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ReadingMonitor {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProbeReading;
    use crate::protocol::{Frame, FRAME_BITS, NIBBLE_COUNT};
    use crate::receiver::{frame_channel, QueueConfig, QueuePolicy};
    use futures::StreamExt;

    fn frame_with_probes(probe1: [u8; 5], probe2: [u8; 5]) -> Frame {
        let mut nibbles = [0u8; NIBBLE_COUNT];
        nibbles[8..13].copy_from_slice(&probe1);
        nibbles[13..18].copy_from_slice(&probe2);
        let mut bits = [0u8; FRAME_BITS];
        for (i, nibble) in nibbles.iter().enumerate() {
            for j in 0..4 {
                bits[i * 4 + j] = (nibble >> (3 - j)) & 1;
            }
        }
        Frame::from_bits(&bits)
    }

    fn unbounded() -> QueueConfig {
        QueueConfig {
            capacity: 0,
            policy: QueuePolicy::Unbounded,
        }
    }

    #[tokio::test]
    async fn test_monitor_interprets_and_drains() {
        let (tx, rx) = frame_channel(&unbounded());
        let monitor = ReadingMonitor::spawn(rx, FrameLayout::default());
        let mut readings = monitor.subscribe();

        tx.send(frame_with_probes([6; 5], [10; 5])).unwrap();
        tx.send(frame_with_probes([6, 7, 6, 6, 6], [10; 5])).unwrap();
        drop(tx);

        monitor.join().await.unwrap();
        assert_eq!(monitor.frames_processed(), 2);
        assert_eq!(monitor.decode_failures(), 1);
        assert!(!monitor.is_running());

        let first = readings.recv().await.unwrap();
        assert_eq!(first.probe1, Ok(ProbeReading(-191)));
        assert_eq!(first.probe2, Ok(ProbeReading(491)));

        let second = readings.recv().await.unwrap();
        assert!(matches!(
            second.probe1,
            Err(Error::DigitDecode {
                probe: ProbeId::One,
                position: 1,
                nibble: 7
            })
        ));
        assert_eq!(second.probe2, Ok(ProbeReading(491)));
    }

    #[tokio::test]
    async fn test_stream_ends_when_monitor_dropped() {
        let (tx, rx) = frame_channel(&unbounded());
        let monitor = ReadingMonitor::spawn(rx, FrameLayout::default());
        let stream = monitor.stream();

        tx.send(frame_with_probes([5; 5], [9; 5])).unwrap();
        drop(tx);
        monitor.join().await.unwrap();
        drop(monitor);

        let collected: Vec<FrameReadings> = stream.collect().await;
        assert_eq!(collected.len(), 1);
        // 2*341 - 532 = 150
        assert_eq!(collected[0].probe2, Ok(ProbeReading(150)));
        assert_eq!(collected[0].probe1, Ok(ProbeReading(-532)));
    }

    #[tokio::test]
    async fn test_on_reading_callback() {
        let (tx, rx) = frame_channel(&unbounded());
        let monitor = ReadingMonitor::spawn(rx, FrameLayout::default());
        let seen = Arc::new(AtomicU64::new(0));

        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = {
            let seen = seen.clone();
            monitor.on_reading(move |readings| {
                seen.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(readings.probe1.clone());
            })
        };
        assert_eq!(handle.id(), 0);

        tx.send(frame_with_probes([10; 5], [10; 5])).unwrap();
        assert_eq!(done_rx.recv().await, Some(Ok(ProbeReading(491))));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        handle.unregister();
        drop(tx);
        monitor.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_callback() {
        let (tx, rx) = frame_channel(&unbounded());
        let monitor = ReadingMonitor::spawn(rx, FrameLayout::default());
        let seen = Arc::new(AtomicU64::new(0));

        let handle = {
            let seen = seen.clone();
            monitor.on_reading(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = monitor.on_reading(|_| {});
        assert_eq!(second.id(), 1);
        drop(handle);

        let mut readings = monitor.subscribe();
        tx.send(frame_with_probes([10; 5], [10; 5])).unwrap();
        drop(tx);
        monitor.join().await.unwrap();
        assert!(readings.recv().await.is_ok());

        tokio::task::yield_now().await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        second.unregister();
    }
}
