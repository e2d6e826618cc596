//! Raster engraving: image decode and scanline segmentation.
//!
//! Travelling over whitespace at engraving speed wastes time, so each
//! scanline is chopped into segments: leading and trailing whitespace is
//! skipped outright, and interior whitespace runs longer than twice the
//! lead-in distance split the line so the gap can be crossed at seek
//! speed. Shorter runs are engraved over; stopping for them buys nothing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::imageops::FilterType;

use crate::config::{Config, RasterMode};
use crate::engine::Engine;

use super::{JobError, dither};

const BLANK: u8 = 255;

/// Resolved per-pass parameters the raster path needs.
pub(super) struct RasterPass {
    pub pxsize_x: f64,
    pub pxsize_y: f64,
    pub seekrate: f64,
    pub feedrate: f64,
    pub intensity: f64,
}

/// Decode a base64 data URI into a dithered grayscale pixel array of
/// exactly `px_w * px_h` samples (0 = black/full power, 255 = white).
pub(super) fn decode_image(
    data_uri: &str,
    px_w: usize,
    px_h: usize,
    cfg: &Config,
) -> Result<Vec<u8>, JobError> {
    let b64 = data_uri
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .ok_or(JobError::BadDataUri)?;
    let raw = BASE64.decode(b64.trim())?;
    let img = image::load_from_memory(&raw)?;
    let img = img.resize_exact(px_w as u32, px_h as u32, FilterType::CatmullRom);

    // Transparent regions count as white (no power).
    let rgba = img.to_rgba8();
    let mut pixels: Vec<u8> = rgba
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            let alpha = a as f64 / 255.0;
            let lum = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            (lum * alpha + 255.0 * (1.0 - alpha)).round() as u8
        })
        .collect();

    if cfg.raster_invert {
        for p in &mut pixels {
            *p = 255 - *p;
        }
    }
    dither::floyd_steinberg(&mut pixels, px_w, cfg.raster_levels);
    Ok(pixels)
}

/// Split one scanline (in scan orientation) into engrave segments.
///
/// Returns half-open pixel ranges. The first non-blank pixel opens a
/// segment; an interior blank run longer than `2 * leadin` closes it at
/// the run's start, but only once the pixel after the run is known to be
/// non-blank. The caller must not pass an all-blank line.
pub(super) fn scan_segments(line: &[u8], pxsize: f64, leadin: f64) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut whitespace = 0usize;
    let mut on_starting_edge = true;
    let mut seg_start = 0usize;

    for j in 0..line.len() {
        if line[j] == BLANK {
            whitespace += 1;
        } else if on_starting_edge {
            seg_start = j;
            on_starting_edge = false;
            whitespace = 0;
        } else if whitespace as f64 * pxsize <= 2.0 * leadin {
            // Run too short to be worth a stop; engrave over it.
            whitespace = 0;
        }

        let gap_exceeded = whitespace as f64 * pxsize > 2.0 * leadin;
        let ended = j == line.len() - 1
            || (gap_exceeded && line[j + 1] != BLANK && !on_starting_edge);
        if ended {
            if !on_starting_edge {
                // Back off the trailing whitespace run.
                segments.push((seg_start, j + 1 - whitespace));
            }
            seg_start = j + 1;
            whitespace = 0;
        }
    }
    segments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Engrave one image definition.
pub(super) async fn engrave_image(
    engine: &Engine,
    cfg: &Config,
    pass: &RasterPass,
    data: &str,
    pos: [f64; 2],
    size: [f64; 2],
) -> Result<(), JobError> {
    let px_w = (size[0] / pass.pxsize_x) as usize;
    let px_h = (size[1] / pass.pxsize_y) as usize;
    if px_w == 0 || px_h == 0 {
        return Err(JobError::EmptyImage);
    }
    let pixels = decode_image(data, px_w, px_h, cfg)?;

    let workspace_x = cfg.workspace[0];
    let leadin = cfg.raster_leadin;
    let pos_x = pos[0];
    let mut line_y = pos[1] + 0.5 * pass.pxsize_y;
    let mut direction = match cfg.raster_mode {
        RasterMode::Reverse => Direction::Reverse,
        _ => Direction::Forward,
    };

    for row in pixels.chunks(px_w).take(px_h) {
        if !row.iter().all(|&px| px == BLANK) {
            let scan: Vec<u8> = match direction {
                Direction::Forward => row.to_vec(),
                Direction::Reverse => row.iter().rev().copied().collect(),
            };
            for (s, e) in scan_segments(&scan, pass.pxsize_x, leadin) {
                // Map scan indices to physical positions; pixels are
                // engraved at their centers, hence the half-pixel shifts.
                let (pos_start, pos_end, pos_leadin, pos_leadout) = match direction {
                    Direction::Forward => (
                        pos_x + (s as f64 + 0.5) * pass.pxsize_x,
                        pos_x + (e as f64 - 0.5) * pass.pxsize_x,
                        (pos_x + s as f64 * pass.pxsize_x - leadin).max(0.0),
                        (pos_x + e as f64 * pass.pxsize_x + leadin).min(workspace_x),
                    ),
                    Direction::Reverse => {
                        let hi = (px_w - s) as f64;
                        let lo = (px_w - e) as f64;
                        (
                            pos_x + (hi - 0.5) * pass.pxsize_x,
                            pos_x + (lo + 0.5) * pass.pxsize_x,
                            (pos_x + hi * pass.pxsize_x + leadin).min(workspace_x),
                            (pos_x + lo * pass.pxsize_x - leadin).max(0.0),
                        )
                    }
                };

                engine.intensity(0.0).await;
                engine.feedrate(pass.seekrate).await;
                engine.move_to(Some(pos_leadin), Some(line_y), None).await;
                engine.feedrate(pass.feedrate).await;
                engine.move_to(Some(pos_start), Some(line_y), None).await;
                engine.intensity(pass.intensity).await;
                engine.rastermove(pos_end, line_y).await;
                engine.raster_data(&scan[s..e]).await;
                engine.intensity(0.0).await;
                engine.move_to(Some(pos_leadout), Some(line_y), None).await;
            }
        }

        if cfg.raster_mode == RasterMode::Bidirectional {
            direction = match direction {
                Direction::Forward => Direction::Reverse,
                Direction::Reverse => Direction::Forward,
            };
        }
        line_y += pass.pxsize_y;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u8 = 255;
    const B: u8 = 0;

    #[test]
    fn leading_and_trailing_whitespace_is_trimmed() {
        let line = [W, W, B, B, B, W, W, W];
        assert_eq!(scan_segments(&line, 1.0, 10.0), vec![(2, 5)]);
    }

    #[test]
    fn solid_line_is_one_segment() {
        let line = [B; 6];
        assert_eq!(scan_segments(&line, 1.0, 10.0), vec![(0, 6)]);
    }

    #[test]
    fn single_pixel_segment() {
        let line = [W, W, W, B, W, W];
        assert_eq!(scan_segments(&line, 1.0, 10.0), vec![(3, 4)]);
    }

    #[test]
    fn short_interior_gap_is_engraved_over() {
        // Gap of 20px at 1mm/px equals the 2*leadin threshold: not split.
        let mut line = vec![B, B];
        line.extend([W; 20]);
        line.extend([B, B]);
        assert_eq!(scan_segments(&line, 1.0, 10.0), vec![(0, 24)]);
    }

    #[test]
    fn long_interior_gap_splits_the_line() {
        // 21px gap exceeds 2*leadin at 1mm/px: two segments.
        let mut line = vec![B, B];
        line.extend([W; 21]);
        line.extend([B, B]);
        assert_eq!(scan_segments(&line, 1.0, 10.0), vec![(0, 2), (23, 25)]);
    }

    #[test]
    fn threshold_scales_with_pixel_size() {
        // Same 21px gap is only 10.5mm at 0.5mm/px: below the threshold.
        let mut line = vec![B, B];
        line.extend([W; 21]);
        line.extend([B, B]);
        assert_eq!(scan_segments(&line, 0.5, 10.0), vec![(0, 25)]);
    }

    #[test]
    fn multiple_gaps_yield_multiple_segments() {
        let mut line = vec![B];
        line.extend([W; 30]);
        line.push(B);
        line.extend([W; 30]);
        line.extend([B, B]);
        assert_eq!(
            scan_segments(&line, 1.0, 10.0),
            vec![(0, 1), (31, 32), (62, 64)]
        );
    }

    #[test]
    fn resegmenting_own_output_is_stable() {
        // Blank out everything outside the reported segments and re-scan;
        // the boundaries must not move.
        let mut line = vec![W, W, B, B];
        line.extend([W; 25]);
        line.extend([B, W, B]);
        line.extend([W; 5]);
        let segments = scan_segments(&line, 1.0, 10.0);

        let mut cut = vec![W; line.len()];
        for &(s, e) in &segments {
            cut[s..e].copy_from_slice(&line[s..e]);
        }
        assert_eq!(scan_segments(&cut, 1.0, 10.0), segments);
    }
}
