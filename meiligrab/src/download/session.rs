//! Per-target download session state.
//!
//! A [`DownloadSession`] lives for one target during one provisioning pass and
//! summarizes what the engine did with it.

use std::fmt;

use crate::target::PlatformArch;

/// How a target's transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// 200: whole artifact downloaded from scratch.
    Fresh,
    /// 206: remaining bytes appended to a partial file.
    Resumed,
    /// 304: the stored validator still matches; nothing transferred.
    NotModified,
    /// 416: the local file already covers the whole artifact.
    AlreadyComplete,
}

impl Outcome {
    /// Whether body bytes were written during the session.
    pub fn wrote_body(&self) -> bool {
        matches!(self, Outcome::Fresh | Outcome::Resumed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Fresh => "downloaded",
            Outcome::Resumed => "resumed",
            Outcome::NotModified => "up to date",
            Outcome::AlreadyComplete => "already complete",
        };
        f.write_str(label)
    }
}

/// Summary of one target's transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub platform_arch: PlatformArch,
    /// Bytes on disk before the session.
    pub existing_length: u64,
    /// Expected final size; 0 when the server did not say.
    pub total_length: u64,
    /// Bytes accounted to this run for reporting. Equals `existing_length`
    /// when the file turned out to be complete already.
    pub transferred_this_run: u64,
    /// Body bytes actually written to disk during the session.
    pub bytes_written: u64,
    pub outcome: Outcome,
    /// Validator persisted for the target after the session.
    pub validator: String,
}

impl DownloadSession {
    /// Progress as a percentage of the expected size.
    ///
    /// Indeterminate (total unknown) sessions report 100 once finished.
    pub fn progress_percent(&self) -> f64 {
        if self.total_length == 0 {
            100.0
        } else {
            let done = match self.outcome {
                Outcome::Fresh => self.bytes_written,
                Outcome::Resumed => self.existing_length + self.bytes_written,
                Outcome::NotModified | Outcome::AlreadyComplete => self.existing_length,
            };
            (done as f64 / self.total_length as f64) * 100.0
        }
    }
}
