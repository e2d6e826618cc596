//! Status frames and the incremental frame assembler.

use serde::Serialize;

use crate::protocol::{ReportTag, StopMarker, codec};

/// Stop conditions reported by the firmware. Any set flag means the
/// device is in stop mode and needs an explicit resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopFlags {
    pub x1: bool,
    pub x2: bool,
    pub y1: bool,
    pub y2: bool,
    pub z1: bool,
    pub z2: bool,
    pub requested: bool,
    pub buffer: bool,
    pub marker: bool,
    pub data: bool,
    pub command: bool,
    pub parameter: bool,
    pub transmission: bool,
}

impl StopFlags {
    pub fn any(&self) -> bool {
        self.x1
            || self.x2
            || self.y1
            || self.y2
            || self.z1
            || self.z2
            || self.requested
            || self.buffer
            || self.marker
            || self.data
            || self.command
            || self.parameter
            || self.transmission
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn set(&mut self, marker: StopMarker) {
        use StopMarker::*;
        match marker {
            LimitX1 => self.x1 = true,
            LimitX2 => self.x2 = true,
            LimitY1 => self.y1 = true,
            LimitY2 => self.y2 = true,
            LimitZ1 => self.z1 = true,
            LimitZ2 => self.z2 = true,
            StopRequest => self.requested = true,
            RxBufferOverflow => self.buffer = true,
            InvalidMarker => self.marker = true,
            InvalidData => self.data = true,
            InvalidCommand => self.command = true,
            InvalidParameter => self.parameter = true,
            TransmissionError => self.transmission = true,
        }
    }
}

/// Non-fatal conditions flagged per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InfoFlags {
    pub door_open: bool,
    pub chiller_off: bool,
}

/// One complete decoded telemetry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusFrame {
    pub ready: bool,
    pub serial_connected: bool,
    pub paused: bool,
    pub position: [f64; 3],
    pub underruns: u32,
    /// Minimal firmware stack clearance seen; must stay above zero.
    pub stackclear: i64,
    pub progress: f64,
    pub stops: StopFlags,
    pub info: InfoFlags,
    pub offset: [f64; 3],
    pub feedrate: f64,
    pub intensity: f64,
    pub duration: f64,
    pub pixel_width: f64,
    pub firmware_version: Option<String>,
    pub app_version: String,
}

impl Default for StatusFrame {
    fn default() -> Self {
        Self {
            ready: false,
            serial_connected: false,
            paused: false,
            position: [0.0; 3],
            underruns: 0,
            stackclear: 999_999,
            progress: 1.0,
            stops: StopFlags::default(),
            info: InfoFlags::default(),
            offset: [0.0; 3],
            feedrate: 0.0,
            intensity: 0.0,
            duration: 0.0,
            pixel_width: 0.0,
            firmware_version: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Double-buffered frame decoder.
///
/// The assembling frame is mutated byte by byte; the committed frame is
/// what readers see. The two are swapped only on the frame-complete
/// marker, so a committed frame is never partial.
#[derive(Debug)]
pub struct StatusAssembler {
    committed: StatusFrame,
    assembling: StatusFrame,
    data: [u8; 4],
    data_count: usize,
}

impl Default for StatusAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusAssembler {
    pub fn new() -> Self {
        Self {
            committed: StatusFrame::default(),
            assembling: StatusFrame::default(),
            data: codec::DATA_IDLE,
            data_count: 0,
        }
    }

    pub fn committed(&self) -> &StatusFrame {
        &self.committed
    }

    pub fn committed_mut(&mut self) -> &mut StatusFrame {
        &mut self.committed
    }

    /// Drop both frames back to their initial state (used on resume).
    pub fn reset(&mut self) {
        let app_version = self.committed.app_version.clone();
        self.committed = StatusFrame::default();
        self.committed.app_version = app_version.clone();
        self.assembling = StatusFrame::default();
        self.assembling.app_version = app_version;
        self.data = codec::DATA_IDLE;
        self.data_count = 0;
    }

    /// Accumulate one raw data byte (>127); errors on overrun.
    pub fn push_data(&mut self, byte: u8) {
        if self.data_count < 4 {
            self.data[self.data_count] = byte;
            self.data_count += 1;
        } else {
            tracing::error!(byte, "firmware sent a fifth data byte before a tag");
        }
    }

    /// Reset partial parameter state after an info flag or decode error.
    pub fn reset_data(&mut self) {
        self.data = codec::DATA_IDLE;
        self.data_count = 0;
    }

    /// Finalize the pending data bytes under a report tag.
    pub fn apply_report(&mut self, tag: ReportTag) {
        let value = codec::decode_value(self.data);
        let frame = &mut self.assembling;
        match tag {
            ReportTag::PosX => frame.position[0] = value,
            ReportTag::PosY => frame.position[1] = value,
            ReportTag::PosZ => frame.position[2] = value,
            ReportTag::Version => {
                frame.firmware_version = Some(format!("{}", value as i64 as f64 / 100.0));
            }
            ReportTag::Underruns => frame.underruns = value as u32,
            ReportTag::StackClearance => frame.stackclear = value as i64,
            ReportTag::OffsetX => frame.offset[0] = value,
            ReportTag::OffsetY => frame.offset[1] = value,
            ReportTag::OffsetZ => frame.offset[2] = value,
            ReportTag::Feedrate => frame.feedrate = value,
            ReportTag::Intensity => frame.intensity = 100.0 * value / 255.0,
            ReportTag::Duration => frame.duration = value,
            ReportTag::PixelWidth => frame.pixel_width = value,
        }
        self.reset_data();
    }

    /// Record a stop marker; the frame reports ready (idle, faulted).
    pub fn apply_stop(&mut self, marker: StopMarker) {
        self.assembling.stops.set(marker);
        self.assembling.ready = true;
    }

    /// Record the idle flag; only an empty tx buffer means truly ready.
    pub fn apply_idle(&mut self, tx_empty: bool) {
        if tx_empty {
            self.assembling.ready = true;
        }
        self.reset_data();
    }

    pub fn apply_door_open(&mut self) {
        self.assembling.info.door_open = true;
        self.reset_data();
    }

    pub fn apply_chiller_off(&mut self) {
        self.assembling.info.chiller_off = true;
        self.reset_data();
    }

    /// Frame-complete marker: swap the buffers and re-arm the assembler.
    ///
    /// Transient fields of the new assembling frame are cleared; counters
    /// that only ever grow are carried forward.
    pub fn commit(&mut self, paused: bool, serial_connected: bool, progress: f64) {
        std::mem::swap(&mut self.committed, &mut self.assembling);
        self.committed.paused = paused;
        self.committed.serial_connected = serial_connected;
        self.committed.progress = progress;

        self.assembling.stops.clear();
        self.assembling.info = InfoFlags::default();
        self.assembling.ready = false;
        self.assembling.underruns = self.committed.underruns;
        self.assembling.stackclear = self.committed.stackclear;
    }
}
