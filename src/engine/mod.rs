//! Serial protocol engine.
//!
//! One [`Engine`] instance owns the connection to the driveboard. Callers
//! enqueue commands and parameters through short lock-guarded calls; a
//! background task ([`link`]) drains the transmit buffer toward the
//! device under flow control and decodes inbound telemetry into status
//! frames. No caller ever touches the serial port directly.

pub mod flow;
pub mod link;
pub mod status;
pub mod transport;
pub mod txbuf;

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::protocol::{Command, InfoMarker, Param, ReportTag, StopMarker, trace::TxTracer};

use flow::FlowController;
use status::StatusAssembler;
pub use status::StatusFrame;
use transport::Transport;
use txbuf::TxBuffer;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("serial port is not connected")]
    NotConnected,
    #[error("already connected; disconnect first")]
    AlreadyConnected,
    #[error("no serial port configured")]
    NoPortConfigured,
    #[error("controller did not identify itself within {0:?}")]
    HandshakeTimeout(std::time::Duration),
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Pending status request, consumed by the next write pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusRequest {
    #[default]
    None,
    Normal,
    Super,
}

/// What the link loop must do after ingesting a byte.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestAction {
    None,
    /// A stop condition arrived; drop the transport's outbound buffer.
    FlushOutput,
}

/// All mutable state shared between callers and the link loop, guarded by
/// one mutex. Every public engine operation is one short locked
/// transaction against this struct.
pub struct Shared {
    pub tx: TxBuffer,
    pub flow: FlowController,
    pub status: StatusAssembler,
    pub paused: bool,
    pub request_stop: bool,
    pub request_resume: bool,
    pub request_status: StatusRequest,
    pub connected: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            tx: TxBuffer::new(),
            flow: FlowController::new(),
            status: StatusAssembler::new(),
            paused: false,
            request_stop: false,
            request_resume: false,
            // A fresh connection wants a full picture right away.
            request_status: StatusRequest::Super,
            connected: false,
        }
    }

    /// Route one inbound byte by its numeric class.
    pub fn ingest(&mut self, byte: u8) -> IngestAction {
        match byte {
            b if b < 32 => self.ingest_flow(b),
            b if b <= 64 => self.ingest_stop(b),
            b if b <= 90 => self.ingest_info(b),
            b if (97..=122).contains(&b) => self.ingest_report(b),
            b if b > 127 => {
                self.status.push_data(b);
                IngestAction::None
            }
            b => {
                tracing::error!(byte = b, "invalid marker from firmware");
                self.status.reset_data();
                IngestAction::None
            }
        }
    }

    fn ingest_flow(&mut self, byte: u8) -> IngestAction {
        match Command::from_byte(byte) {
            Some(Command::ChunkProcessed) => self.flow.ack_chunk(),
            Some(Command::StatusEnd) => {
                let progress = self.tx.progress();
                self.status.commit(self.paused, self.connected, progress);
            }
            _ => tracing::error!(byte, "unexpected flow marker from firmware"),
        }
        IngestAction::None
    }

    fn ingest_stop(&mut self, byte: u8) -> IngestAction {
        match StopMarker::from_byte(byte) {
            Some(marker) => {
                tracing::error!(?marker, "firmware entered stop mode");
                self.status.apply_stop(marker);
                if marker.wants_tx_history() {
                    let mut tracer = TxTracer::new();
                    tracing::error!(
                        "recent transmission: {}",
                        tracer.format(self.tx.recent_history(128))
                    );
                }
            }
            None => tracing::error!(byte, "invalid stop marker from firmware"),
        }
        // Stop-mode housekeeping: the queued job is void.
        self.tx.clear();
        self.paused = false;
        self.status.reset_data();
        IngestAction::FlushOutput
    }

    fn ingest_info(&mut self, byte: u8) -> IngestAction {
        match InfoMarker::from_byte(byte) {
            Some(InfoMarker::Idle) => self.status.apply_idle(self.tx.is_empty()),
            Some(InfoMarker::DoorOpen) => self.status.apply_door_open(),
            Some(InfoMarker::ChillerOff) => self.status.apply_chiller_off(),
            None => {
                tracing::error!(byte, "invalid info flag from firmware");
                self.status.reset_data();
            }
        }
        IngestAction::None
    }

    fn ingest_report(&mut self, byte: u8) -> IngestAction {
        match ReportTag::from_byte(byte) {
            Some(tag) => self.status.apply_report(tag),
            None => {
                tracing::error!(byte, "invalid report tag from firmware");
                self.status.reset_data();
            }
        }
        IngestAction::None
    }
}

struct LinkHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Handle to one driveboard. Cheap to share behind an `Arc`; every method
/// is a short transaction against the shared state.
pub struct Engine {
    cfg: Arc<Config>,
    shared: Arc<Mutex<Shared>>,
    handle: Mutex<Option<LinkHandle>>,
}

impl Engine {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            shared: Arc::new(Mutex::new(Shared::new())),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Open the serial device, reset it, require the identification byte
    /// within the handshake window, then start the link loop.
    pub async fn connect(&self, port: Option<&str>) -> Result<(), EngineError> {
        let mut handle = self.handle.lock().await;
        if let Some(link) = handle.as_ref() {
            if !link.task.is_finished() {
                return Err(EngineError::AlreadyConnected);
            }
            // The loop died on a transport fault; clean up and reconnect.
            *handle = None;
        }

        let path = port.unwrap_or(&self.cfg.serial_port);
        if path.is_empty() {
            return Err(EngineError::NoPortConfigured);
        }

        let transport = Transport::open(path, self.cfg.baudrate)?;
        transport.reset_device().await?;
        transport.wait_for_hello().await.map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                EngineError::HandshakeTimeout(transport::HELLO_TIMEOUT)
            } else {
                EngineError::Io(e)
            }
        })?;
        tracing::info!(port = path, baudrate = self.cfg.baudrate, "controller says hello");

        {
            let mut s = self.shared.lock().await;
            *s = Shared::new();
            s.connected = true;
            s.status.committed_mut().serial_connected = true;
        }

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(link::run(self.shared.clone(), transport, shutdown_rx));
        *handle = Some(LinkHandle { shutdown, task });
        Ok(())
    }

    /// Stop the link loop and release the serial device.
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        let mut handle = self.handle.lock().await;
        match handle.take() {
            Some(link) => {
                let _ = link.shutdown.send(());
                let _ = link.task.await;
                Ok(())
            }
            None => Err(EngineError::NotConnected),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.lock().await.connected
    }

    /// Snapshot of the last committed status frame.
    ///
    /// Always internally consistent; reports not-ready/not-connected when
    /// no transport is attached.
    pub async fn status(&self) -> StatusFrame {
        let s = self.shared.lock().await;
        if s.connected {
            let mut frame = s.status.committed().clone();
            frame.serial_connected = true;
            frame
        } else {
            StatusFrame::default()
        }
    }

    async fn command(&self, cmd: Command) {
        self.shared.lock().await.tx.push_command(cmd);
    }

    async fn param(&self, param: Param, value: f64) {
        self.shared.lock().await.tx.push_param(param, value);
    }

    /// Run a homing cycle. Ignored while a job is in flight; implies a
    /// resume so it also recovers from stop mode.
    pub async fn homing(&self) {
        let mut s = self.shared.lock().await;
        if s.status.committed().ready || s.status.committed().stops.any() {
            s.request_resume = true;
            s.tx.push_command(Command::Homing);
        } else {
            tracing::warn!("ignoring homing request while job is running");
        }
    }

    pub async fn feedrate(&self, val: f64) {
        self.param(Param::Feedrate, val).await;
    }

    /// Set beam intensity as a percentage; rescaled to the wire's 0..255.
    pub async fn intensity(&self, percent: f64) {
        let val = (255.0 * percent / 100.0).clamp(0.0, 255.0);
        self.param(Param::Intensity, val).await;
    }

    pub async fn duration(&self, val: f64) {
        self.param(Param::Duration, val).await;
    }

    pub async fn pixel_width(&self, val: f64) {
        self.param(Param::PixelWidth, val).await;
    }

    pub async fn relative(&self) {
        self.command(Command::RefRelative).await;
    }

    pub async fn absolute(&self) {
        self.command(Command::RefAbsolute).await;
    }

    pub async fn move_to(&self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        let mut s = self.shared.lock().await;
        if let Some(x) = x {
            s.tx.push_param(Param::TargetX, x);
        }
        if let Some(y) = y {
            s.tx.push_param(Param::TargetY, y);
        }
        if let Some(z) = z {
            s.tx.push_param(Param::TargetZ, z);
        }
        s.tx.push_command(Command::Line);
    }

    /// Move in machine coordinates, bypassing the active offset.
    pub async fn supermove(&self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        let mut s = self.shared.lock().await;
        s.tx.push_command(Command::OffsetStore);
        s.tx.push_command(Command::RefStore);
        s.tx.push_command(Command::RefAbsolute);
        if x.is_some() {
            s.tx.push_param(Param::OffsetX, 0.0);
        }
        if y.is_some() {
            s.tx.push_param(Param::OffsetY, 0.0);
        }
        if z.is_some() {
            s.tx.push_param(Param::OffsetZ, 0.0);
        }
        s.tx.push_command(Command::RefRestore);
        if let Some(x) = x {
            s.tx.push_param(Param::TargetX, x);
        }
        if let Some(y) = y {
            s.tx.push_param(Param::TargetY, y);
        }
        if let Some(z) = z {
            s.tx.push_param(Param::TargetZ, z);
        }
        s.tx.push_command(Command::OffsetRestore);
        s.tx.push_command(Command::Line);
    }

    /// Engraving move; the intensity samples follow via [`raster_data`].
    ///
    /// [`raster_data`]: Engine::raster_data
    pub async fn rastermove(&self, x: f64, y: f64) {
        let mut s = self.shared.lock().await;
        s.tx.push_param(Param::TargetX, x);
        s.tx.push_param(Param::TargetY, y);
        s.tx.push_param(Param::TargetZ, 0.0);
        s.tx.push_command(Command::Raster);
    }

    /// Stream one segment's intensity samples. Locks per slice so a large
    /// raster stream never starves the link loop.
    pub async fn raster_data(&self, pixels: &[u8]) {
        self.shared.lock().await.tx.raster_start();
        for chunk in pixels.chunks(64) {
            self.shared.lock().await.tx.raster_samples(chunk);
        }
        self.shared.lock().await.tx.raster_end();
    }

    /// Gate transmission without losing queued work.
    pub async fn pause(&self) {
        let mut s = self.shared.lock().await;
        if !s.tx.is_empty() {
            s.paused = true;
        }
    }

    pub async fn unpause(&self) {
        self.shared.lock().await.paused = false;
    }

    /// Force a stop condition: purge queued work, raise the protocol stop.
    pub async fn stop(&self) {
        let mut s = self.shared.lock().await;
        s.tx.clear();
        s.request_stop = true;
    }

    /// Resume from a stop condition.
    pub async fn unstop(&self) {
        self.shared.lock().await.request_resume = true;
    }

    pub async fn air_on(&self) {
        self.command(Command::AirEnable).await;
    }

    pub async fn air_off(&self) {
        self.command(Command::AirDisable).await;
    }

    pub async fn aux_on(&self) {
        self.command(Command::AuxEnable).await;
    }

    pub async fn aux_off(&self) {
        self.command(Command::AuxDisable).await;
    }

    /// Brief test pulse: fire at the configured pulse intensity, then keep
    /// the air on a moment longer.
    pub async fn pulse(&self) {
        self.air_on().await;
        self.intensity(self.cfg.pulse_intensity).await;
        self.duration(self.cfg.pulse_duration).await;
        self.command(Command::Dwell).await;
        self.intensity(0.0).await;
        self.duration(0.75).await;
        self.command(Command::Dwell).await;
        self.air_off().await;
    }

    /// Set an offset relative to the present position.
    pub async fn offset(&self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        self.offset_inner(Command::RefRelative, x, y, z).await;
    }

    /// Set an offset in machine coordinates.
    pub async fn absoffset(&self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        self.offset_inner(Command::RefAbsolute, x, y, z).await;
    }

    async fn offset_inner(&self, frame: Command, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        let mut s = self.shared.lock().await;
        s.tx.push_command(Command::RefStore);
        s.tx.push_command(frame);
        if let Some(x) = x {
            s.tx.push_param(Param::OffsetX, x);
        }
        if let Some(y) = y {
            s.tx.push_param(Param::OffsetY, y);
        }
        if let Some(z) = z {
            s.tx.push_param(Param::OffsetZ, z);
        }
        s.tx.push_command(Command::RefRestore);
    }

    #[cfg(test)]
    pub(crate) async fn with_shared<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        f(&mut *self.shared.lock().await)
    }
}
