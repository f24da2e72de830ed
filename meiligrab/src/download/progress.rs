//! Progress event stream for artifact transfers.
//!
//! The engine reports through a narrow [`ProgressSink`] and never knows who is
//! listening: a headless logger, a terminal renderer fed through a channel, or
//! a test recorder.
//!
//! Per run the stream looks like:
//!
//! ```text
//! start(a, 0) [start(a, total)] progress(..)* start(b, 0) ... progress(..)* done
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A file transfer begins (or its total became known). `total` is 0 when unknown.
    Start { filename: String, total: u64 },
    /// A chunk of `chunk_size` bytes was received.
    #[serde(rename_all = "camelCase")]
    Progress { chunk_size: u64 },
    /// The whole run finished.
    Done,
}

impl ProgressEvent {
    pub fn start(filename: impl Into<String>, total: u64) -> Self {
        ProgressEvent::Start {
            filename: filename.into(),
            total,
        }
    }

    pub fn progress(chunk_size: u64) -> Self {
        ProgressEvent::Progress { chunk_size }
    }
}

/// Receiver of progress events, called in emission order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events over an unbounded channel to a renderer task.
///
/// A closed receiver is ignored; the transfer keeps going without a display.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

/// Headless sink that reports through `tracing`.
///
/// Logs each file start and completion at info level and intermediate
/// progress at debug level every `step_percent` percent.
#[derive(Debug)]
pub struct LogProgress {
    loaded: AtomicU64,
    total: AtomicU64,
    last_step: AtomicU64,
    step_percent: u64,
    filename: Mutex<String>,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl LogProgress {
    pub fn new(step_percent: u64) -> Self {
        Self {
            loaded: AtomicU64::new(0),
            total: AtomicU64::new(0),
            last_step: AtomicU64::new(0),
            step_percent: step_percent.clamp(1, 100),
            filename: Mutex::new(String::new()),
        }
    }

    /// Bytes reported for the current file.
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::SeqCst)
    }

    fn current_filename(&self) -> String {
        self.filename
            .lock()
            .map(|name| name.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for LogProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Start { filename, total } => {
                // A second start for the same file only refines the total.
                let same_file = self.current_filename() == filename;
                if !same_file {
                    self.loaded.store(0, Ordering::SeqCst);
                    self.last_step.store(0, Ordering::SeqCst);
                    if let Ok(mut name) = self.filename.lock() {
                        *name = filename.clone();
                    }
                    info!(file = %filename, "Downloading");
                }
                self.total.store(total, Ordering::SeqCst);
            }
            ProgressEvent::Progress { chunk_size } => {
                let loaded = self.loaded.fetch_add(chunk_size, Ordering::SeqCst) + chunk_size;
                let total = self.total.load(Ordering::SeqCst);
                if total == 0 {
                    return;
                }
                let percent = (loaded.saturating_mul(100) / total).min(100);
                let step = percent / self.step_percent;
                if step > self.last_step.swap(step, Ordering::SeqCst) {
                    debug!(
                        file = %self.current_filename(),
                        loaded,
                        total,
                        percent,
                        "Download progress"
                    );
                }
            }
            ProgressEvent::Done => {
                info!("All downloads complete");
            }
        }
    }
}

/// Records every event, for assertions.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Sum of all `progress` chunk sizes.
    pub fn total_progress(&self) -> u64 {
        self.events()
            .iter()
            .map(|e| match e {
                ProgressEvent::Progress { chunk_size } => *chunk_size,
                _ => 0,
            })
            .sum()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_event_wire_format() {
        assert_eq!(
            serde_json::to_string(&ProgressEvent::start("meilisearch-linux-amd64", 42)).unwrap(),
            r#"{"type":"start","filename":"meilisearch-linux-amd64","total":42}"#
        );
        assert_eq!(
            serde_json::to_string(&ProgressEvent::progress(8192)).unwrap(),
            r#"{"type":"progress","chunkSize":8192}"#
        );
        assert_eq!(
            serde_json::to_string(&ProgressEvent::Done).unwrap(),
            r#"{"type":"done"}"#
        );
    }

    #[test]
    fn test_closure_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sink = move |_event: ProgressEvent| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        };

        sink.emit(ProgressEvent::progress(1));
        sink.emit(ProgressEvent::Done);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelProgress::new(tx);

        sink.emit(ProgressEvent::start("a", 3));
        sink.emit(ProgressEvent::progress(1));
        sink.emit(ProgressEvent::progress(2));
        drop(sink);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                ProgressEvent::start("a", 3),
                ProgressEvent::progress(1),
                ProgressEvent::progress(2),
            ]
        );
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelProgress::new(tx).emit(ProgressEvent::Done);
    }

    #[test]
    fn test_log_progress_resets_per_file() {
        let sink = LogProgress::default();
        sink.emit(ProgressEvent::start("a", 0));
        sink.emit(ProgressEvent::start("a", 100));
        sink.emit(ProgressEvent::progress(60));
        assert_eq!(sink.loaded(), 60);

        // Refining the total keeps the count.
        sink.emit(ProgressEvent::start("a", 100));
        assert_eq!(sink.loaded(), 60);

        sink.emit(ProgressEvent::start("b", 0));
        assert_eq!(sink.loaded(), 0);
    }

    #[test]
    fn test_recording_progress_sum() {
        let sink = RecordingProgress::new();
        sink.emit(ProgressEvent::start("a", 0));
        sink.emit(ProgressEvent::progress(10));
        sink.emit(ProgressEvent::progress(5));
        assert_eq!(sink.total_progress(), 15);
        assert_eq!(sink.events().len(), 3);
    }
}
