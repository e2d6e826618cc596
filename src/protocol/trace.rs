//! Diagnostic decoding of an outbound byte stream.
//!
//! Used to dump recent transmission history when the firmware reports a
//! fault, and by tests to assert on emitted command sequences. The decoder
//! is an explicit per-session object so concurrent traces never share
//! state.

use super::codec;
use super::{Command, Param};

/// One decoded event from the outbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TxEvent {
    Command(Command),
    Param(Param, f64),
    /// A raster data stream with the number of samples it carried.
    RasterData(usize),
    /// A byte that fits no known marker at this point in the stream.
    Invalid(u8),
}

/// Incremental decoder for the transmit byte stream.
#[derive(Debug, Default)]
pub struct TxTracer {
    data: Vec<u8>,
    raster: bool,
    raster_count: usize,
}

impl TxTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a completed event if this byte finished one.
    pub fn push(&mut self, byte: u8) -> Option<TxEvent> {
        if byte >= 128 {
            if self.raster {
                self.raster_count += 1;
            } else {
                self.data.push(byte);
            }
            return None;
        }
        if let Some(param) = Param::from_byte(byte) {
            if self.data.len() == 4 {
                let value =
                    codec::decode_value([self.data[0], self.data[1], self.data[2], self.data[3]]);
                self.data.clear();
                return Some(TxEvent::Param(param, value));
            }
            self.data.clear();
            return Some(TxEvent::Invalid(byte));
        }
        self.data.clear();
        match Command::from_byte(byte) {
            Some(Command::RasterDataStart) => {
                self.raster = true;
                self.raster_count = 0;
                Some(TxEvent::Command(Command::RasterDataStart))
            }
            Some(Command::RasterDataEnd) => {
                self.raster = false;
                Some(TxEvent::RasterData(self.raster_count))
            }
            Some(cmd) => Some(TxEvent::Command(cmd)),
            None => Some(TxEvent::Invalid(byte)),
        }
    }

    /// Decode a whole chunk into events.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<TxEvent> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Render a chunk as a readable one-line trace.
    pub fn format(&mut self, bytes: &[u8]) -> String {
        let mut out = String::new();
        for event in self.decode(bytes) {
            if !out.is_empty() {
                out.push_str(", ");
            }
            match event {
                TxEvent::Command(cmd) => out.push_str(cmd.name()),
                TxEvent::Param(param, value) => {
                    out.push_str(&format!("{}({})", param.name(), value))
                }
                TxEvent::RasterData(n) => out.push_str(&format!("RASTER_DATA({n})")),
                TxEvent::Invalid(b) => out.push_str(&format!("INVALID({b})")),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_command_and_param_stream() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&codec::encode_value(100.0));
        bytes.push(Param::TargetX as u8);
        bytes.push(Command::Line as u8);

        let mut tracer = TxTracer::new();
        let events = tracer.decode(&bytes);
        assert_eq!(
            events,
            vec![
                TxEvent::Param(Param::TargetX, 100.0),
                TxEvent::Command(Command::Line),
            ]
        );
    }

    #[test]
    fn counts_raster_samples() {
        let mut bytes = vec![Command::RasterDataStart as u8];
        bytes.extend_from_slice(&[200, 210, 220]);
        bytes.push(Command::RasterDataEnd as u8);

        let mut tracer = TxTracer::new();
        let events = tracer.decode(&bytes);
        assert_eq!(
            events,
            vec![
                TxEvent::Command(Command::RasterDataStart),
                TxEvent::RasterData(3),
            ]
        );
    }

    #[test]
    fn flags_stray_param_tag() {
        let mut tracer = TxTracer::new();
        // A tag with fewer than four pending data bytes is not decodable.
        assert_eq!(
            tracer.push(Param::Feedrate as u8),
            Some(TxEvent::Invalid(Param::Feedrate as u8))
        );
    }
}
