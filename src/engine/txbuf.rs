//! Pending instruction stream, shared between callers and the link loop.

use crate::protocol::{Command, Param, codec};

/// Append-only byte sequence of queued instructions plus a read cursor.
///
/// `cursor` counts bytes already handed to the transport and `job_size`
/// the total bytes once the job is fully enqueued; `cursor / job_size`
/// is the progress estimate. All three reset together: on stop, on fault,
/// and when the cursor drains a non-empty buffer.
#[derive(Debug, Default)]
pub struct TxBuffer {
    buf: Vec<u8>,
    cursor: usize,
    job_size: usize,
}

impl TxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_command(&mut self, cmd: Command) {
        self.buf.push(cmd as u8);
        self.job_size += 1;
    }

    pub fn push_param(&mut self, param: Param, value: f64) {
        self.buf.extend_from_slice(&codec::encode_value(value));
        self.buf.push(param as u8);
        self.job_size += 5;
    }

    /// Open a raster data stream. Samples and the end marker follow in
    /// separate calls so callers can interleave with the link loop.
    pub fn raster_start(&mut self) {
        self.buf.push(Command::RasterDataStart as u8);
        self.job_size += 1;
    }

    pub fn raster_samples(&mut self, pixels: &[u8]) {
        self.buf
            .extend(pixels.iter().map(|&px| codec::encode_raster_sample(px)));
        self.job_size += pixels.len();
    }

    pub fn raster_end(&mut self) {
        self.buf.push(Command::RasterDataEnd as u8);
        self.job_size += 1;
    }

    /// Append one raster stream in full.
    pub fn push_raster_data(&mut self, pixels: &[u8]) {
        self.raster_start();
        self.raster_samples(pixels);
        self.raster_end();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn job_size(&self) -> usize {
        self.job_size
    }

    /// Bytes queued but not yet handed to the transport.
    pub fn has_pending(&self) -> bool {
        self.cursor < self.buf.len()
    }

    /// Next unsent slice, at most `max` bytes.
    pub fn peek_chunk(&self, max: usize) -> &[u8] {
        let end = (self.cursor + max).min(self.buf.len());
        &self.buf[self.cursor..end]
    }

    pub fn advance(&mut self, sent: usize) {
        self.cursor = (self.cursor + sent).min(self.buf.len());
    }

    /// The most recently transmitted bytes, for fault diagnostics.
    pub fn recent_history(&self, max: usize) -> &[u8] {
        &self.buf[self.cursor.saturating_sub(max)..self.cursor]
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
        self.job_size = 0;
    }

    /// Fraction of the job handed to the transport, 1.0 when idle.
    pub fn progress(&self) -> f64 {
        if self.job_size == 0 {
            1.0
        } else {
            (self.cursor as f64 / self.job_size as f64 * 1000.0).round() / 1000.0
        }
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_never_passes_end() {
        let mut tx = TxBuffer::new();
        tx.push_command(Command::Line);
        tx.push_param(Param::TargetX, 10.0);
        assert_eq!(tx.len(), 6);
        tx.advance(100);
        assert_eq!(tx.cursor(), 6);
        assert!(!tx.has_pending());
    }

    #[test]
    fn clear_resets_everything_together() {
        let mut tx = TxBuffer::new();
        tx.push_param(Param::Feedrate, 2000.0);
        tx.advance(3);
        tx.clear();
        assert!(tx.is_empty());
        assert_eq!(tx.cursor(), 0);
        assert_eq!(tx.job_size(), 0);
        assert_eq!(tx.progress(), 1.0);
    }

    #[test]
    fn progress_tracks_cursor() {
        let mut tx = TxBuffer::new();
        for _ in 0..10 {
            tx.push_command(Command::None);
        }
        tx.advance(5);
        assert_eq!(tx.progress(), 0.5);
        tx.advance(5);
        assert_eq!(tx.progress(), 1.0);
    }

    #[test]
    fn raster_stream_accounting() {
        let mut tx = TxBuffer::new();
        tx.push_raster_data(&[0, 128, 255]);
        assert_eq!(tx.job_size(), 5);
        assert_eq!(tx.bytes()[0], Command::RasterDataStart as u8);
        assert_eq!(tx.bytes()[4], Command::RasterDataEnd as u8);
        assert_eq!(tx.bytes()[1], 255);
        assert_eq!(tx.bytes()[3], 128);
    }

    #[test]
    fn peek_chunk_is_bounded() {
        let mut tx = TxBuffer::new();
        for _ in 0..20 {
            tx.push_command(Command::None);
        }
        assert_eq!(tx.peek_chunk(16).len(), 16);
        tx.advance(16);
        assert_eq!(tx.peek_chunk(16).len(), 4);
    }
}
