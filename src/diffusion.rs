// ============================================================================
// diffusion.rs — slimetrail
// Diffusion-Decay stage: current field -> next field, one cell at a time.
// Mirrors `shaders/decay_diffusion.wgsl`.
// ============================================================================

use rayon::prelude::*;

use crate::config::SimParams;
use crate::field::TrailField;

/// Constant subtracted every step so low tails die out in finite time.
pub const EXTINCTION: f32 = 0.0005;

/// New value of cell (x, y). Reads only `current`; edges clamp to themselves.
pub fn diffuse_cell(current: &TrailField, x: u32, y: u32, params: &SimParams) -> f32 {
    let (w, h) = (current.width(), current.height());
    let k = params.decay_rate;

    let center = current.at(x, y) * k;
    let left = current.at(x.saturating_sub(1), y) * k;
    let right = current.at((x + 1).min(w - 1), y) * k;
    let up = current.at(x, y.saturating_sub(1)) * k;
    let down = current.at(x, (y + 1).min(h - 1)) * k;

    let diffused = center + params.diffusion_rate * (left + right + up + down - 4.0 * center) * 0.25;
    (diffused - EXTINCTION).max(0.0)
}

/// Whole-grid pass, one rayon task per row. Writes every cell of `next`.
pub fn diffuse_field(current: &TrailField, next: &mut TrailField, params: &SimParams) {
    debug_assert_eq!(
        (current.width(), current.height()),
        (next.width(), next.height())
    );
    let w = current.width() as usize;
    next.values_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = diffuse_cell(current, x as u32, y as u32, params);
            }
        });
}
