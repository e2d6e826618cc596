//! Mill job execution: a small G-code-like opcode stream.
//!
//! Rates are only retransmitted on change, so long runs of G1 moves cost
//! one parameter each. Spindle speed rides the intensity channel, scaled
//! by the configured maximum RPM.

use crate::config::Config;
use crate::engine::Engine;

use super::{Def, Job, JobError, MillOp};

pub(super) async fn run_job(engine: &Engine, cfg: &Config, job: &Job) -> Result<(), JobError> {
    engine.air_off().await;
    engine.aux_off().await;
    engine.absolute().await;
    engine.intensity(0.0).await;
    engine.feedrate(cfg.seekrate).await;
    let mut active_rate = cfg.seekrate;
    let mut ran_any = false;

    for (pass_idx, pass) in job.passes.iter().enumerate() {
        let mut feed_target = pass.feedrate.unwrap_or(cfg.feedrate);
        for &item_idx in &pass.items {
            let item = job.items.get(item_idx).ok_or(JobError::BadItemRef {
                pass: pass_idx,
                item: item_idx,
            })?;
            let def = job.defs.get(item.def).ok_or(JobError::BadDefRef {
                item: item_idx,
                def: item.def,
            })?;
            let Def::Mill { data } = def else {
                tracing::warn!(kind = def.kind_name(), "skipping non-mill def in mill job");
                continue;
            };
            run_ops(engine, cfg, data, &mut active_rate, &mut feed_target).await;
            ran_any = true;
        }
    }

    // The common importer output carries bare defs with no pass layer.
    if !ran_any {
        let mut feed_target = cfg.feedrate;
        for def in &job.defs {
            if let Def::Mill { data } = def {
                run_ops(engine, cfg, data, &mut active_rate, &mut feed_target).await;
            }
        }
    }

    // Retract before travelling home so the tool clears the stock.
    engine.air_off().await;
    engine.aux_off().await;
    engine.absolute().await;
    engine.feedrate(cfg.seekrate).await;
    engine.intensity(0.0).await;
    engine.supermove(None, None, Some(0.0)).await;
    engine.supermove(Some(0.0), Some(0.0), None).await;
    Ok(())
}

async fn run_ops(
    engine: &Engine,
    cfg: &Config,
    ops: &[MillOp],
    active_rate: &mut f64,
    feed_target: &mut f64,
) {
    for op in ops {
        match *op {
            MillOp::Seek([x, y, z]) => {
                if *active_rate != cfg.seekrate {
                    engine.feedrate(cfg.seekrate).await;
                    *active_rate = cfg.seekrate;
                }
                engine.move_to(Some(x), Some(y), Some(z)).await;
            }
            MillOp::Feed([x, y, z]) => {
                if *active_rate != *feed_target {
                    engine.feedrate(*feed_target).await;
                    *active_rate = *feed_target;
                }
                engine.move_to(Some(x), Some(y), Some(z)).await;
            }
            MillOp::FeedRate(rate) => *feed_target = rate,
            MillOp::Spindle(rpm) => {
                engine.intensity(rpm * 100.0 / cfg.mill_max_rpm).await;
            }
            MillOp::Mist(true) => engine.air_on().await,
            MillOp::Mist(false) => engine.air_off().await,
            MillOp::Flood(true) => engine.aux_on().await,
            MillOp::Flood(false) => engine.aux_off().await,
        }
    }
}
