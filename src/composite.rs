// ============================================================================
// composite.rs — slimetrail
// Compositor: trail intensity -> opaque greyscale RGBA8, plus PNG export.
// The device version lives in `shaders/composite.wgsl`.
// ============================================================================

use std::path::Path;

use rayon::prelude::*;

use crate::error::SimError;
use crate::field::TrailField;

/// Greyscale for positive intensity, pure black otherwise. No tone mapping,
/// no gamma, alpha always opaque.
pub fn shade(intensity: f32) -> [u8; 4] {
    if intensity > 0.0 {
        let level = (intensity.min(1.0) * 255.0).round() as u8;
        [level, level, level, 255]
    } else {
        [0, 0, 0, 255]
    }
}

/// Row-major RGBA8 image of the whole field.
pub fn composite_rgba(field: &TrailField) -> Vec<u8> {
    let mut rgba = vec![0u8; field.len() * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(field.values().par_iter())
        .for_each(|(px, v)| px.copy_from_slice(&shade(*v)));
    rgba
}

pub fn save_png(path: impl AsRef<Path>, field: &TrailField) -> Result<(), SimError> {
    let rgba = composite_rgba(field);
    image::save_buffer(
        path.as_ref(),
        &rgba,
        field.width(),
        field.height(),
        image::ColorType::Rgba8,
    )?;
    log::info!("Composite saved: {:?}", path.as_ref());
    Ok(())
}
