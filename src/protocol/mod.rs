//! Wire protocol constants and byte classification.
//!
//! The driveboard firmware speaks a byte-oriented protocol: command opcodes
//! and parameter tags live below 128, parameter data bytes are biased into
//! 128..=255 so the two can never be confused. These tables must match the
//! firmware exactly; changing any value breaks hardware interoperability.

pub mod codec;
pub mod trace;

/// Number of payload bytes the firmware consumes per processed-chunk ack.
pub const TX_CHUNK_SIZE: usize = 16;
/// Bytes requested from the serial port per read pass.
pub const RX_CHUNK_SIZE: usize = 32;
/// Capacity of the firmware's receive buffer, shadowed by the host.
pub const FIRMBUF_SIZE: usize = 256;

/// Identification byte the firmware emits after reset.
pub const INFO_HELLO: u8 = b'~';

/// Outbound command opcodes (single byte, always < 128).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Stop = 0x01,
    Resume = 0x02,
    Status = 0x03,
    SuperStatus = 0x04,
    ChunkProcessed = 0x05,
    StatusEnd = 0x06,
    RasterDataStart = 0x10,
    RasterDataEnd = 0x11,

    None = b'A',
    Line = b'B',
    Dwell = b'C',
    Raster = b'D',

    RefRelative = b'E',
    RefAbsolute = b'F',
    RefStore = b'G',
    RefRestore = b'H',

    Homing = b'I',
    OffsetStore = b'J',
    OffsetRestore = b'K',

    AirEnable = b'L',
    AirDisable = b'M',
    AuxEnable = b'N',
    AuxDisable = b'O',
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Self> {
        use Command::*;
        Some(match b {
            0x01 => Stop,
            0x02 => Resume,
            0x03 => Status,
            0x04 => SuperStatus,
            0x05 => ChunkProcessed,
            0x06 => StatusEnd,
            0x10 => RasterDataStart,
            0x11 => RasterDataEnd,
            b'A' => None,
            b'B' => Line,
            b'C' => Dwell,
            b'D' => Raster,
            b'E' => RefRelative,
            b'F' => RefAbsolute,
            b'G' => RefStore,
            b'H' => RefRestore,
            b'I' => Homing,
            b'J' => OffsetStore,
            b'K' => OffsetRestore,
            b'L' => AirEnable,
            b'M' => AirDisable,
            b'N' => AuxEnable,
            b'O' => AuxDisable,
            _ => return Option::None,
        })
    }

    pub fn name(self) -> &'static str {
        use Command::*;
        match self {
            Stop => "CMD_STOP",
            Resume => "CMD_RESUME",
            Status => "CMD_STATUS",
            SuperStatus => "CMD_SUPERSTATUS",
            ChunkProcessed => "CMD_CHUNK_PROCESSED",
            StatusEnd => "STATUS_END",
            RasterDataStart => "CMD_RASTER_DATA_START",
            RasterDataEnd => "CMD_RASTER_DATA_END",
            None => "CMD_NONE",
            Line => "CMD_LINE",
            Dwell => "CMD_DWELL",
            Raster => "CMD_RASTER",
            RefRelative => "CMD_REF_RELATIVE",
            RefAbsolute => "CMD_REF_ABSOLUTE",
            RefStore => "CMD_REF_STORE",
            RefRestore => "CMD_REF_RESTORE",
            Homing => "CMD_HOMING",
            OffsetStore => "CMD_OFFSET_STORE",
            OffsetRestore => "CMD_OFFSET_RESTORE",
            AirEnable => "CMD_AIR_ENABLE",
            AirDisable => "CMD_AIR_DISABLE",
            AuxEnable => "CMD_AUX_ENABLE",
            AuxDisable => "CMD_AUX_DISABLE",
        }
    }
}

/// Outbound parameter tags (trail the four data bytes of a value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Param {
    TargetX = b'x',
    TargetY = b'y',
    TargetZ = b'z',
    Feedrate = b'f',
    Intensity = b's',
    Duration = b'd',
    PixelWidth = b'p',
    OffsetX = b'h',
    OffsetY = b'i',
    OffsetZ = b'j',
}

impl Param {
    pub fn from_byte(b: u8) -> Option<Self> {
        use Param::*;
        Some(match b {
            b'x' => TargetX,
            b'y' => TargetY,
            b'z' => TargetZ,
            b'f' => Feedrate,
            b's' => Intensity,
            b'd' => Duration,
            b'p' => PixelWidth,
            b'h' => OffsetX,
            b'i' => OffsetY,
            b'j' => OffsetZ,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use Param::*;
        match self {
            TargetX => "PARAM_TARGET_X",
            TargetY => "PARAM_TARGET_Y",
            TargetZ => "PARAM_TARGET_Z",
            Feedrate => "PARAM_FEEDRATE",
            Intensity => "PARAM_INTENSITY",
            Duration => "PARAM_DURATION",
            PixelWidth => "PARAM_PIXEL_WIDTH",
            OffsetX => "PARAM_OFFSET_X",
            OffsetY => "PARAM_OFFSET_Y",
            OffsetZ => "PARAM_OFFSET_Z",
        }
    }
}

/// Inbound stop/fault markers, ASCII `!`..`@` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMarker {
    StopRequest,
    RxBufferOverflow,
    LimitX1,
    LimitX2,
    LimitY1,
    LimitY2,
    LimitZ1,
    LimitZ2,
    InvalidMarker,
    InvalidData,
    InvalidCommand,
    InvalidParameter,
    TransmissionError,
}

impl StopMarker {
    pub fn from_byte(b: u8) -> Option<Self> {
        use StopMarker::*;
        Some(match b {
            b'!' => StopRequest,
            b'"' => RxBufferOverflow,
            b'$' => LimitX1,
            b'%' => LimitX2,
            b'&' => LimitY1,
            b'*' => LimitY2,
            b'+' => LimitZ1,
            b'-' => LimitZ2,
            b'#' => InvalidMarker,
            b':' => InvalidData,
            b'<' => InvalidCommand,
            b'>' => InvalidParameter,
            b'=' => TransmissionError,
            _ => return None,
        })
    }

    /// Stop-request and limit hits are expected operator events; everything
    /// else warrants dumping the recent transmission for diagnostics.
    pub fn wants_tx_history(self) -> bool {
        use StopMarker::*;
        !matches!(
            self,
            StopRequest | LimitX1 | LimitX2 | LimitY1 | LimitY2 | LimitZ1 | LimitZ2
        )
    }
}

/// Inbound info flags, ASCII `A`..`Z` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoMarker {
    Idle,
    DoorOpen,
    ChillerOff,
}

impl InfoMarker {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'A' => InfoMarker::Idle,
            b'B' => InfoMarker::DoorOpen,
            b'C' => InfoMarker::ChillerOff,
            _ => return None,
        })
    }
}

/// Inbound report tags, ASCII `a`..`z` range (finalize four data bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTag {
    PosX,
    PosY,
    PosZ,
    Version,
    Underruns,
    StackClearance,
    OffsetX,
    OffsetY,
    OffsetZ,
    Feedrate,
    Intensity,
    Duration,
    PixelWidth,
}

impl ReportTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        use ReportTag::*;
        Some(match b {
            b'x' => PosX,
            b'y' => PosY,
            b'z' => PosZ,
            b'v' => Version,
            b'w' => Underruns,
            b'u' => StackClearance,
            b'a' => OffsetX,
            b'b' => OffsetY,
            b'c' => OffsetZ,
            b'g' => Feedrate,
            b'h' => Intensity,
            b'i' => Duration,
            b'j' => PixelWidth,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_match_firmware() {
        assert_eq!(Command::Stop as u8, 1);
        assert_eq!(Command::Resume as u8, 2);
        assert_eq!(Command::Status as u8, 3);
        assert_eq!(Command::SuperStatus as u8, 4);
        assert_eq!(Command::ChunkProcessed as u8, 5);
        assert_eq!(Command::StatusEnd as u8, 6);
        assert_eq!(Command::RasterDataStart as u8, 16);
        assert_eq!(Command::RasterDataEnd as u8, 17);
        assert_eq!(Command::Line as u8, b'B');
        assert_eq!(Command::AuxDisable as u8, b'O');
    }

    #[test]
    fn round_trip_lookup() {
        for b in 0u8..128 {
            if let Some(cmd) = Command::from_byte(b) {
                assert_eq!(cmd as u8, b);
            }
            if let Some(p) = Param::from_byte(b) {
                assert_eq!(p as u8, b);
            }
        }
    }

    #[test]
    fn stop_marker_classes() {
        assert_eq!(StopMarker::from_byte(b'!'), Some(StopMarker::StopRequest));
        assert_eq!(StopMarker::from_byte(b'$'), Some(StopMarker::LimitX1));
        assert!(!StopMarker::LimitY2.wants_tx_history());
        assert!(StopMarker::InvalidData.wants_tx_history());
        assert!(StopMarker::RxBufferOverflow.wants_tx_history());
    }
}
