//! Floyd-Steinberg error diffusion.

/// Quantize a grayscale image in place to `levels` evenly spaced values,
/// diffusing the residual to unvisited neighbors: 7/16 right, 1/16
/// below-left, 5/16 below, 3/16 below-right. Diffusion never wraps
/// across row boundaries.
pub fn floyd_steinberg(pixels: &mut [u8], width: usize, levels: u8) {
    if width == 0 || pixels.is_empty() {
        return;
    }
    let levels = levels.clamp(2, 128);
    let spacing = 255.0 / (levels - 1) as f64;
    let height = pixels.len() / width;

    let mut work: Vec<f64> = pixels.iter().map(|&p| p as f64).collect();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let old = work[i];
            // Nearest level at or below the cutoff (level + half spacing).
            let step = ((old + spacing / 2.0) / spacing).floor().max(0.0);
            let new = (step * spacing).min(255.0);
            work[i] = new;
            let err = old - new;

            if x + 1 < width {
                work[i + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < height {
                if x > 0 {
                    work[i + width - 1] += err * 1.0 / 16.0;
                }
                work[i + width] += err * 5.0 / 16.0;
                if x + 1 < width {
                    work[i + width + 1] += err * 3.0 / 16.0;
                }
            }
        }
    }

    for (dst, src) in pixels.iter_mut().zip(&work) {
        *dst = src.round().clamp(0.0, 255.0) as u8;
    }
}
