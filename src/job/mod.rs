//! Declarative job description and workspace validation.
//!
//! A job defines passes over path, fill, image, and mill definitions.
//! Unlike G-code it is not procedural: the importer produces it once, the
//! translator consumes it once, and it is never mutated here. Structural
//! problems surface at deserialization; geometric problems surface in
//! [`validate`] before a single byte is transmitted.

pub mod dither;
pub mod mill;
pub mod raster;
pub mod translator;

use serde::Deserialize;
use serde::de::{self, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("pass {pass}: {kind} geometry exceeds the {edge} workspace edge")]
    OutOfBounds {
        pass: usize,
        kind: &'static str,
        edge: Edge,
    },
    #[error("pass {pass}: item index {item} does not exist")]
    BadItemRef { pass: usize, item: usize },
    #[error("item {item}: definition index {def} does not exist")]
    BadDefRef { item: usize, def: usize },
    #[error("image data is not a base64 data URI")]
    BadDataUri,
    #[error("cannot decode image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image resolves to zero pixels at this pixel size")]
    EmptyImage,
}

/// Workspace edge named in out-of-bounds errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Edge::Left => "left",
            Edge::Right => "right",
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        })
    }
}

/// A vertex list; vertices carry two or three coordinates.
pub type Polyline = Vec<Vec<f64>>;

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub head: JobHead,
    #[serde(default)]
    pub passes: Vec<Pass>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub defs: Vec<Def>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobHead {
    /// Do not return to origin after the job.
    #[serde(default)]
    pub noreturn: bool,
    /// Tolerance the importer optimized to, if any.
    #[serde(default)]
    pub optimized: Option<f64>,
    #[serde(default)]
    pub kind: JobKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobKind {
    Mill,
    #[default]
    Laser,
}

// Any kind other than "mill" runs as a laser job.
impl<'de> Deserialize<'de> for JobKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(if s == "mill" { JobKind::Mill } else { JobKind::Laser })
    }
}

/// When the air assist valve opens and closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirAssist {
    /// Around each feed segment.
    Feed,
    /// For the whole pass.
    #[default]
    Pass,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pass {
    /// Item indices this pass runs over.
    #[serde(default)]
    pub items: Vec<usize>,
    #[serde(default)]
    pub relative: bool,
    pub seekrate: Option<f64>,
    pub feedrate: Option<f64>,
    /// Beam intensity in percent.
    #[serde(default)]
    pub intensity: f64,
    /// Seek to the first vertex with the beam off.
    #[serde(default = "default_true")]
    pub seekzero: bool,
    #[serde(default)]
    pub pierce_time: f64,
    /// Raster line spacing override, mm.
    pub pxsize: Option<f64>,
    #[serde(default)]
    pub air_assist: AirAssist,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub def: usize,
    #[serde(default)]
    pub translate: Option<[f64; 3]>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Def {
    Path {
        data: Vec<Polyline>,
    },
    Fill {
        data: Vec<Polyline>,
        pxsize: Option<f64>,
    },
    Image {
        /// Base64 data URI, format jpg/png/gif.
        data: String,
        /// Left/top edge location, mm.
        pos: [f64; 2],
        /// Width/height, mm.
        size: [f64; 2],
    },
    Mill {
        data: Vec<MillOp>,
    },
}

impl Def {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Def::Path { .. } => "path",
            Def::Fill { .. } => "fill",
            Def::Image { .. } => "image",
            Def::Mill { .. } => "mill",
        }
    }
}

/// One opcode of the mill subset, serialized as a `[op, arg]` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum MillOp {
    /// `G0`: seek move at the seek rate.
    Seek([f64; 3]),
    /// `G1`: feed move at the active feed rate.
    Feed([f64; 3]),
    /// `F`: set the active feed rate.
    FeedRate(f64),
    /// `S`: spindle speed in RPM.
    Spindle(f64),
    /// `MIST`: air valve.
    Mist(bool),
    /// `FLOOD`: aux valve.
    Flood(bool),
}

impl<'de> Deserialize<'de> for MillOp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (op, arg): (String, serde_json::Value) = Deserialize::deserialize(deserializer)?;
        fn triple<E: de::Error>(arg: serde_json::Value) -> Result<[f64; 3], E> {
            serde_json::from_value(arg).map_err(E::custom)
        }
        fn scalar<E: de::Error>(arg: serde_json::Value) -> Result<f64, E> {
            serde_json::from_value(arg).map_err(E::custom)
        }
        fn flag<E: de::Error>(arg: serde_json::Value) -> Result<bool, E> {
            serde_json::from_value(arg).map_err(E::custom)
        }
        match op.as_str() {
            "G0" => Ok(MillOp::Seek(triple(arg)?)),
            "G1" => Ok(MillOp::Feed(triple(arg)?)),
            "F" => Ok(MillOp::FeedRate(scalar(arg)?)),
            "S" => Ok(MillOp::Spindle(scalar(arg)?)),
            "MIST" => Ok(MillOp::Mist(flag(arg)?)),
            "FLOOD" => Ok(MillOp::Flood(flag(arg)?)),
            other => Err(de::Error::unknown_variant(
                other,
                &["G0", "G1", "F", "S", "MIST", "FLOOD"],
            )),
        }
    }
}

/// Check every referenced vertex and image corner against the workspace.
///
/// The admissible range per axis is `[-offset, workspace - offset]`;
/// geometry exactly on a boundary passes. Runs before any transmission so
/// a rejected job has zero side effects on the engine.
pub fn validate(job: &Job, workspace: [f64; 3], offset: [f64; 3]) -> Result<(), JobError> {
    let check = |pass: usize, kind: &'static str, x: f64, y: f64| -> Result<(), JobError> {
        let edge = if x < -offset[0] {
            Some(Edge::Left)
        } else if x > workspace[0] - offset[0] {
            Some(Edge::Right)
        } else if y < -offset[1] {
            Some(Edge::Top)
        } else if y > workspace[1] - offset[1] {
            Some(Edge::Bottom)
        } else {
            None
        };
        match edge {
            Some(edge) => Err(JobError::OutOfBounds { pass, kind, edge }),
            None => Ok(()),
        }
    };

    for (pass_idx, pass) in job.passes.iter().enumerate() {
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
                        for vertex in polyline {
                            let x = vertex.first().copied().unwrap_or(0.0);
                            let y = vertex.get(1).copied().unwrap_or(0.0);
                            check(pass_idx, def.kind_name(), x, y)?;
                        }
                    }
                }
                Def::Image { pos, size, .. } => {
                    check(pass_idx, "image", pos[0], pos[1])?;
                    check(pass_idx, "image", pos[0] + size[0], pos[1] + size[1])?;
                }
                // Mill geometry is bracketed by its own homing moves.
                Def::Mill { .. } => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_job(vertex: [f64; 2]) -> Job {
        serde_json::from_value(serde_json::json!({
            "head": {},
            "passes": [{"items": [0], "intensity": 50}],
            "items": [{"def": 0}],
            "defs": [{"kind": "path", "data": [[[vertex[0], vertex[1]]]]}],
        }))
        .unwrap()
    }

    #[test]
    fn vertex_on_boundary_passes() {
        let job = path_job([1220.0, 610.0]);
        assert!(validate(&job, [1220.0, 610.0, 0.0], [0.0; 3]).is_ok());
        let job = path_job([0.0, 0.0]);
        assert!(validate(&job, [1220.0, 610.0, 0.0], [0.0; 3]).is_ok());
    }

    #[test]
    fn vertex_past_each_edge_names_it() {
        let ws = [1220.0, 610.0, 0.0];
        let cases = [
            ([-1.0, 10.0], Edge::Left),
            ([1221.0, 10.0], Edge::Right),
            ([10.0, -1.0], Edge::Top),
            ([10.0, 611.0], Edge::Bottom),
        ];
        for (vertex, edge) in cases {
            match validate(&path_job(vertex), ws, [0.0; 3]) {
                Err(JobError::OutOfBounds { pass: 0, kind: "path", edge: e }) => {
                    assert_eq!(e, edge)
                }
                other => panic!("expected out-of-bounds {edge:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn offset_shifts_the_admissible_range() {
        let ws = [1220.0, 610.0, 0.0];
        let offset = [100.0, 0.0, 0.0];
        assert!(validate(&path_job([-100.0, 0.0]), ws, offset).is_ok());
        assert!(validate(&path_job([1121.0, 0.0]), ws, offset).is_err());
    }

    #[test]
    fn image_corners_are_checked() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "passes": [{"items": [0]}],
            "items": [{"def": 0}],
            "defs": [{"kind": "image", "data": "", "pos": [1200.0, 0.0], "size": [100.0, 50.0]}],
        }))
        .unwrap();
        match validate(&job, [1220.0, 610.0, 0.0], [0.0; 3]) {
            Err(JobError::OutOfBounds { kind: "image", edge: Edge::Right, .. }) => {}
            other => panic!("expected right-edge violation, got {other:?}"),
        }
    }

    #[test]
    fn dangling_refs_are_rejected() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "passes": [{"items": [3]}],
            "items": [{"def": 0}],
            "defs": [{"kind": "path", "data": []}],
        }))
        .unwrap();
        assert!(matches!(
            validate(&job, [1220.0, 610.0, 0.0], [0.0; 3]),
            Err(JobError::BadItemRef { pass: 0, item: 3 })
        ));
    }

    #[test]
    fn mill_ops_deserialize_from_pairs() {
        let ops: Vec<MillOp> = serde_json::from_value(serde_json::json!([
            ["G0", [0.0, 0.0, 0.0]],
            ["F", 1000.0],
            ["G1", [10.0, 0.0, 0.0]],
            ["S", 9000.0],
            ["MIST", true],
            ["FLOOD", false],
        ]))
        .unwrap();
        assert_eq!(
            ops,
            vec![
                MillOp::Seek([0.0, 0.0, 0.0]),
                MillOp::FeedRate(1000.0),
                MillOp::Feed([10.0, 0.0, 0.0]),
                MillOp::Spindle(9000.0),
                MillOp::Mist(true),
                MillOp::Flood(false),
            ]
        );
    }

    #[test]
    fn unknown_mill_op_is_rejected() {
        let err = serde_json::from_value::<MillOp>(serde_json::json!(["G2", [0, 0, 0]]));
        assert!(err.is_err());
    }

    #[test]
    fn job_kind_defaults_to_laser() {
        let job: Job = serde_json::from_value(serde_json::json!({"head": {}})).unwrap();
        assert_eq!(job.head.kind, JobKind::Laser);
        let job: Job =
            serde_json::from_value(serde_json::json!({"head": {"kind": "mill"}})).unwrap();
        assert_eq!(job.head.kind, JobKind::Mill);
    }
}
