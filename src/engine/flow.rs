//! Firmware receive-buffer flow control.

use crate::protocol::{FIRMBUF_SIZE, TX_CHUNK_SIZE};

/// Host-side shadow of the firmware's receive buffer fill level.
///
/// Incremented by bytes actually written, decremented by one chunk per
/// processed-chunk ack. Writes are gated so the shadow never exceeds the
/// firmware capacity; a resume resets it because the device clears its
/// buffer on resume.
#[derive(Debug, Default)]
pub struct FlowController {
    used: usize,
}

impl FlowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Whether one more chunk fits in the firmware buffer.
    pub fn can_send_chunk(&self) -> bool {
        FIRMBUF_SIZE - self.used > TX_CHUNK_SIZE
    }

    pub fn note_sent(&mut self, bytes: usize) {
        self.used += bytes;
        if self.used > FIRMBUF_SIZE {
            tracing::error!(used = self.used, "firmware buffer tracking too high");
            self.used = FIRMBUF_SIZE;
        }
    }

    /// The firmware processed one chunk.
    pub fn ack_chunk(&mut self) {
        if self.used < TX_CHUNK_SIZE {
            tracing::error!(used = self.used, "firmware buffer tracking too low");
            self.used = 0;
        } else {
            self.used -= TX_CHUNK_SIZE;
        }
    }

    /// A resume clears the device-side buffer.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_blocks_at_capacity() {
        let mut flow = FlowController::new();
        while flow.can_send_chunk() {
            flow.note_sent(TX_CHUNK_SIZE);
        }
        // One chunk short of capacity must not fit (strict gate).
        assert!(flow.used() + TX_CHUNK_SIZE >= FIRMBUF_SIZE);
        flow.ack_chunk();
        assert!(flow.can_send_chunk());
    }

    #[test]
    fn shadow_stays_in_range() {
        let mut flow = FlowController::new();
        // Arbitrary interleaving of sends and acks keeps 0 <= used <= capacity.
        let events: &[(bool, usize)] = &[
            (true, 16),
            (true, 16),
            (false, 0),
            (true, 16),
            (false, 0),
            (false, 0),
            (false, 0), // stray ack
            (true, 16),
        ];
        for &(send, n) in events {
            if send {
                flow.note_sent(n);
            } else {
                flow.ack_chunk();
            }
            assert!(flow.used() <= FIRMBUF_SIZE);
        }
    }

    #[test]
    fn reset_clears_shadow() {
        let mut flow = FlowController::new();
        flow.note_sent(48);
        flow.reset();
        assert_eq!(flow.used(), 0);
    }
}
