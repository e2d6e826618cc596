//! Serial transport: device open, reset, handshake and bounded I/O.

use std::io;
use std::time::Duration;

use serial2_tokio::SerialPort;
use tokio::time::{sleep, timeout};

use crate::protocol::INFO_HELLO;

/// How long one chunk write may take before it counts as failed.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Read poll budget per tick; keeps the loop from stalling on a quiet line.
const READ_POLL: Duration = Duration::from_millis(2);
/// The controller must identify itself within this window after reset.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the serial device handle. Reads are non-blocking (bounded poll),
/// writes are chunked and bounded by a short timeout. Every outbound byte
/// is physically transmitted twice; the redundancy is purely a wire-level
/// concern and invisible to the logical byte stream.
pub struct Transport {
    port: SerialPort,
}

impl Transport {
    pub fn open(path: &str, baudrate: u32) -> io::Result<Self> {
        let port = SerialPort::open(path, baudrate)?;
        Ok(Self { port })
    }

    /// Pulse DTR to reset the controller and clear both directions.
    pub async fn reset_device(&self) -> io::Result<()> {
        self.port.set_dtr(false)?;
        sleep(Duration::from_secs(1)).await;
        self.port.discard_input_buffer()?;
        self.port.set_dtr(true)?;
        self.port.discard_output_buffer()?;
        Ok(())
    }

    /// Wait for the identification byte after reset.
    ///
    /// Returns `TimedOut` if the controller stays silent; that usually
    /// means wrong port or missing firmware.
    pub async fn wait_for_hello(&self) -> io::Result<()> {
        let mut buf = [0u8; 8];
        let deadline = tokio::time::Instant::now() + HELLO_TIMEOUT;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::TimedOut, "no hello from controller")
                })?;
            match timeout(remaining, self.port.read(&mut buf)).await {
                Ok(Ok(n)) if buf[..n].contains(&INFO_HELLO) => return Ok(()),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no hello from controller",
                    ));
                }
            }
        }
    }

    /// Poll for inbound bytes; returns 0 when the line is quiet.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        match timeout(READ_POLL, self.port.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(0),
        }
    }

    /// Write a logical byte sequence, each byte doubled on the wire.
    ///
    /// Returns the number of logical bytes accepted: all of them, or zero
    /// if the write timed out (the caller re-sends the chunk later).
    pub async fn write_doubled(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut wire = Vec::with_capacity(bytes.len() * 2);
        for &b in bytes {
            wire.push(b);
            wire.push(b);
        }
        match timeout(WRITE_TIMEOUT, self.port.write_all(&wire)).await {
            Ok(Ok(())) => Ok(bytes.len()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::error!(len = bytes.len(), "serial write timed out");
                Ok(0)
            }
        }
    }

    pub fn flush_output(&self) {
        if let Err(e) = self.port.discard_output_buffer() {
            tracing::warn!("could not flush serial output: {e}");
        }
    }

    pub fn flush_all(&self) {
        if let Err(e) = self.port.discard_buffers() {
            tracing::warn!("could not flush serial buffers: {e}");
        }
    }
}
