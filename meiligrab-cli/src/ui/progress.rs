//! Progress bar renderer fed by the library's progress event stream.
//!
//! One bar per file. A repeated `start` for the file being shown only updates
//! its length; a `start` for a new file finishes the previous bar.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use meiligrab::ProgressEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const BAR_TEMPLATE: &str =
    "{msg:36!} [{bar:32.cyan/blue}] {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12} {eta:>4}";
const SPINNER_TEMPLATE: &str = "{msg:36!} {spinner:.cyan} {bytes:>10} {bytes_per_sec:>12}";

/// Renders [`ProgressEvent`]s as indicatif bars.
pub struct ProgressRenderer {
    bar: Option<ProgressBar>,
    current: String,
    files: usize,
    visible: bool,
}

impl ProgressRenderer {
    /// Renderer drawing to stderr.
    pub fn new() -> Self {
        Self {
            bar: None,
            current: String::new(),
            files: 0,
            visible: true,
        }
    }

    /// Renderer that tracks state without drawing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            bar: None,
            current: String::new(),
            files: 0,
            visible: false,
        }
    }

    /// Apply one event. Returns `false` once the run is done.
    pub fn handle(&mut self, event: ProgressEvent) -> bool {
        match event {
            ProgressEvent::Start { filename, total } => {
                if filename != self.current || self.bar.is_none() {
                    self.finish_bar();
                    self.bar = Some(self.new_bar(&filename));
                    self.current = filename;
                    self.files += 1;
                }
                if let Some(bar) = &self.bar {
                    set_total(bar, total);
                }
                true
            }
            ProgressEvent::Progress { chunk_size } => {
                if let Some(bar) = &self.bar {
                    bar.inc(chunk_size);
                }
                true
            }
            ProgressEvent::Done => {
                self.finish_bar();
                false
            }
        }
    }

    /// Bar for the file currently shown.
    #[cfg(test)]
    pub fn current_bar(&self) -> Option<&ProgressBar> {
        self.bar.as_ref()
    }

    /// Number of distinct files shown so far.
    #[cfg(test)]
    pub fn files(&self) -> usize {
        self.files
    }

    fn new_bar(&self, filename: &str) -> ProgressBar {
        let target = if self.visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(spinner_style());
        bar.set_message(filename.to_string());
        bar
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            // Indeterminate bars end at whatever was received.
            if bar.length().is_none() {
                bar.set_length(bar.position());
            }
            bar.finish();
        }
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressRenderer {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

fn set_total(bar: &ProgressBar, total: u64) {
    if total > 0 {
        bar.set_style(bar_style());
        bar.set_length(total);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Drive a renderer from a channel until `done` or until every sender is gone.
pub fn spawn_renderer(mut events: UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ProgressRenderer::new();
        while let Some(event) = events.recv().await {
            if !renderer.handle(event) {
                break;
            }
        }
    })
}
