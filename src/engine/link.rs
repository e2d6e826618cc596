//! Background link loop: one read-decode pass and one flow-controlled
//! write pass per tick, periodic status requests, disconnect detection.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, MissedTickBehavior};

use crate::protocol::{Command, RX_CHUNK_SIZE, TX_CHUNK_SIZE, trace::TxTracer};

use super::transport::Transport;
use super::{IngestAction, Shared, StatusRequest};

/// Tick cadence; bounds CPU usage while staying well above the device's
/// consumption rate (32 bytes per 4 ms is 8 kB/s, rastering needs ~2 kB/s).
const TICK: Duration = Duration::from_millis(4);
/// How often to ask the device for a status frame.
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

pub(super) async fn run(
    shared: Arc<Mutex<Shared>>,
    transport: Transport,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_status_request = Instant::now() - STATUS_INTERVAL;
    let mut read_buf = [0u8; RX_CHUNK_SIZE];
    let mut tx_trace = TxTracer::new();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("link loop shutting down");
                break;
            }
            _ = interval.tick() => {
                let n = match transport.read_chunk(&mut read_buf).await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!("serial read failed, dropping connection: {e}");
                        mark_disconnected(&shared).await;
                        return;
                    }
                };

                let mut s = shared.lock().await;
                for &byte in &read_buf[..n] {
                    if s.ingest(byte) == IngestAction::FlushOutput {
                        transport.flush_output();
                    }
                }

                if last_status_request.elapsed() >= STATUS_INTERVAL {
                    s.request_status = if s.status.committed().ready {
                        StatusRequest::Super
                    } else {
                        StatusRequest::Normal
                    };
                    last_status_request = Instant::now();
                }

                if let Err(e) = write_pass(&mut s, &transport, &mut tx_trace).await {
                    drop(s);
                    tracing::error!("serial write failed, dropping connection: {e}");
                    mark_disconnected(&shared).await;
                    return;
                }
            }
        }
    }

    transport.flush_all();
    mark_disconnected(&shared).await;
}

/// One write pass, in priority order: status request, stop request,
/// resume request, then at most one paced buffer chunk. The out-of-band
/// requests are handled by the firmware's receive interrupt and do not
/// count against its buffer.
async fn write_pass(
    s: &mut Shared,
    transport: &Transport,
    tx_trace: &mut TxTracer,
) -> io::Result<()> {
    match s.request_status {
        StatusRequest::Normal => {
            transport.write_doubled(&[Command::Status as u8]).await?;
        }
        StatusRequest::Super => {
            transport.write_doubled(&[Command::SuperStatus as u8]).await?;
        }
        StatusRequest::None => {}
    }
    s.request_status = StatusRequest::None;

    if s.request_stop {
        transport.write_doubled(&[Command::Stop as u8]).await?;
        s.request_stop = false;
    }

    if s.request_resume {
        transport.write_doubled(&[Command::Resume as u8]).await?;
        // The device clears its receive buffer on resume.
        s.flow.reset();
        s.request_resume = false;
        s.status.reset();
        s.request_status = StatusRequest::Super;
    }

    if s.tx.has_pending() {
        if !s.paused && s.flow.can_send_chunk() {
            let chunk = s.tx.peek_chunk(TX_CHUNK_SIZE).to_vec();
            let sent = transport.write_doubled(&chunk).await?;
            if sent > 0 && tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!("tx: {}", tx_trace.format(&chunk[..sent]));
            }
            s.flow.note_sent(sent);
            s.tx.advance(sent);
        }
    } else if !s.tx.is_empty() {
        // Cursor reached the end: the job finished sending.
        s.tx.clear();
    }

    Ok(())
}

async fn mark_disconnected(shared: &Mutex<Shared>) {
    let mut s = shared.lock().await;
    s.connected = false;
    let frame = s.status.committed_mut();
    frame.serial_connected = false;
    frame.ready = false;
}
