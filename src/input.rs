//! Shared, rewindable command input
//!
//! Some administrative commands carry an input payload (for example a
//! message to be saved into a mailbox). The same payload may have to be
//! replayed on a different connection when the command is redirected
//! mid-flight, so the handle is reference-counted and seekable: clones share
//! one payload and one read position, and [`CommandInput::rewind`] restarts
//! the replay from the beginning no matter how much a previous attempt
//! consumed. The payload is released when the last clone drops.

use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Inner {
    data: Vec<u8>,
    pos: usize,
}

/// Reference-counted seekable input payload
#[derive(Debug, Clone)]
pub struct CommandInput {
    inner: Arc<Mutex<Inner>>,
}

impl CommandInput {
    /// Wrap a fully buffered payload
    #[must_use]
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                data: data.into(),
                pos: 0,
            })),
        }
    }

    /// Reset the read position to the start of the payload
    pub fn rewind(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.pos = 0;
        }
    }

    /// Read up to `buf.len()` bytes, advancing the shared position.
    /// Returns the number of bytes copied; 0 at end of payload.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let start = inner.pos;
        let n = std::cmp::min(buf.len(), inner.data.len() - start);
        buf[..n].copy_from_slice(&inner.data[start..start + n]);
        inner.pos += n;
        n
    }

    /// Copy the remaining bytes and advance the position to the end
    #[must_use]
    pub fn read_to_end(&self) -> Vec<u8> {
        let Ok(mut inner) = self.inner.lock() else {
            return Vec::new();
        };
        let rest = inner.data[inner.pos..].to_vec();
        inner.pos = inner.data.len();
        rest
    }

    /// Current read position
    #[must_use]
    pub fn position(&self) -> usize {
        self.inner.lock().map(|inner| inner.pos).unwrap_or(0)
    }

    /// Total payload length
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.data.len()).unwrap_or(0)
    }

    /// True for a zero-length payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left before the end of the payload
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.data.len() - inner.pos)
            .unwrap_or(0)
    }
}
