//! Terminal progress display for provisioning runs.

mod progress;

pub use progress::spawn_renderer;
