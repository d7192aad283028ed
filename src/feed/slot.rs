//! Latest-wins frame slot
//!
//! Holds at most one undecoded buffer. A producer that outpaces the
//! consumer overwrites the pending buffer instead of queueing behind it.

use crate::video::Rotation;
use std::sync::{Mutex, PoisonError};

/// Owned buffer waiting to be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    /// Raw bytes as delivered by the backend
    pub data: Vec<u8>,
    /// Rotation hint captured with the buffer
    pub rotation: Rotation,
}

/// Single-slot buffer cell
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Mutex<Option<PendingFrame>>,
}

impl FrameSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`; returns `true` if an older frame was discarded
    pub fn push(&self, frame: PendingFrame) -> bool {
        self.lock().replace(frame).is_some()
    }

    /// Remove and return the newest frame
    pub fn take(&self) -> Option<PendingFrame> {
        self.lock().take()
    }

    /// Discard any pending frame; returns `true` if one was discarded
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    /// Whether no frame is waiting
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingFrame>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
