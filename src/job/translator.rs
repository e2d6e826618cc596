//! Turns a validated job into the ordered command stream.
//!
//! Translation runs on the caller's task and enqueues through the
//! engine's command API in many short locked calls, so a long job fills
//! the transmit buffer concurrently with ongoing transmission.

use crate::config::Config;
use crate::engine::Engine;

use super::raster::{self, RasterPass};
use super::{AirAssist, Def, Job, JobError, JobKind, Polyline, mill, validate};

/// Validate `job` against the workspace and stream it to the engine.
///
/// Returns before any byte is enqueued if validation fails.
pub async fn run_job(engine: &Engine, cfg: &Config, job: &Job) -> Result<(), JobError> {
    let offset = engine.status().await.offset;
    validate(job, cfg.workspace, offset)?;

    match job.head.kind {
        JobKind::Mill => mill::run_job(engine, cfg, job).await,
        JobKind::Laser => run_laser(engine, cfg, job).await,
    }
}

async fn run_laser(engine: &Engine, cfg: &Config, job: &Job) -> Result<(), JobError> {
    // A previous job may have left the valve open.
    engine.air_off().await;

    for (pass_idx, pass) in job.passes.iter().enumerate() {
        let pxsize_y = pass.pxsize.unwrap_or(cfg.pxsize).max(0.01);
        // Horizontal oversampling at half the line spacing.
        let pxsize_x = 0.5 * pxsize_y;
        let seekrate = pass.seekrate.unwrap_or(cfg.seekrate);
        let feedrate = pass.feedrate.unwrap_or(cfg.feedrate);
        let air = pass.air_assist;

        engine.intensity(0.0).await;
        engine.pixel_width(pxsize_x).await;
        if air == AirAssist::Pass {
            engine.air_on().await;
        }
        if pass.relative {
            engine.relative().await;
        } else {
            engine.absolute().await;
        }

        if pass.pierce_time > 0.0 {
            // TODO: issue a dwell of pierce_time at each polyline's first
            // vertex; needs the duration parameter restored afterwards.
            tracing::warn!(pass = pass_idx, "pierce_time is not implemented yet");
        }

        for &item_idx in &pass.items {
            let item = job.items.get(item_idx).ok_or(JobError::BadItemRef {
                pass: pass_idx,
                item: item_idx,
            })?;
            let def = job.defs.get(item.def).ok_or(JobError::BadDefRef {
                item: item_idx,
                def: item.def,
            })?;
            match def {
                Def::Path { data } | Def::Fill { data, .. } => {
                    for polyline in data {
                        trace_polyline(engine, polyline, pass.seekzero, seekrate, feedrate,
                            pass.intensity, air)
                            .await;
                    }
                }
                Def::Image { data, pos, size } => {
                    let rp = RasterPass {
                        pxsize_x,
                        pxsize_y,
                        seekrate,
                        feedrate,
                        intensity: pass.intensity,
                    };
                    if air == AirAssist::Feed {
                        engine.air_on().await;
                    }
                    raster::engrave_image(engine, cfg, &rp, data, *pos, *size).await?;
                    if air == AirAssist::Feed {
                        engine.air_off().await;
                    }
                }
                Def::Mill { .. } => {
                    tracing::warn!("skipping mill def in laser job");
                }
            }
        }

        if air == AirAssist::Pass {
            engine.air_off().await;
        }
    }

    engine.absolute().await;
    engine.feedrate(cfg.seekrate).await;
    engine.intensity(0.0).await;
    if !job.head.noreturn {
        engine.move_to(Some(0.0), Some(0.0), Some(0.0)).await;
    }
    Ok(())
}

/// Seek to the first vertex, then feed through the rest.
async fn trace_polyline(
    engine: &Engine,
    polyline: &Polyline,
    seekzero: bool,
    seekrate: f64,
    feedrate: f64,
    intensity: f64,
    air: AirAssist,
) {
    let Some(first) = polyline.first() else {
        return;
    };
    engine.feedrate(seekrate).await;
    if seekzero {
        engine.intensity(0.0).await;
    } else {
        engine.intensity(intensity).await;
    }
    engine.move_to(vx(first, 0), vx(first, 1), vx(first, 2)).await;

    // A lone vertex has no feed phase; skip its parameter chatter.
    if polyline.len() > 1 {
        engine.feedrate(feedrate).await;
        engine.intensity(intensity).await;
        if air == AirAssist::Feed {
            engine.air_on().await;
        }
        for vertex in &polyline[1..] {
            engine.move_to(vx(vertex, 0), vx(vertex, 1), vx(vertex, 2)).await;
        }
        if air == AirAssist::Feed {
            engine.air_off().await;
        }
    }
}

fn vx(vertex: &[f64], axis: usize) -> Option<f64> {
    vertex.get(axis).copied()
}
