//! # Transferable Resource Handles
//!
//! Out-of-band resources (file descriptors, mach-style ports) cross the
//! transport as an opaque handle value. The envelope codec carries the handle
//! unchanged; bridging between the two structurally different OS
//! representations on either side is the transport's job.

use serde::{Deserialize, Serialize};

/// Opaque handle to an out-of-band resource carried across the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferHandle(u64);

impl TransferHandle {
    /// Wrap a raw OS handle value.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw OS handle value.
    #[must_use]
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}
