// ============================================================================
// metrics.rs — slimetrail
// Trail diagnostics from a field snapshot: coverage, intensity, spatial
// spread and histogram entropy, logged with deltas between samples.
// ============================================================================

use crate::field::TrailField;

/// Cells above this count as lit.
pub const LIT_THRESHOLD: f32 = 0.01;
const ENTROPY_BINS: usize = 16;

// ======================== Diagnostics Report ========================

/// One diagnostics sample of the trail field.
#[derive(Clone, Debug, PartialEq)]
pub struct TrailDiagnostics {
    pub total_intensity: f32,
    pub lit_cells: u32,
    pub lit_fraction: f32,
    pub max_intensity: f32,
    pub mean_lit: f32, // mean over lit cells only
    pub std_dev: f32,  // spatial uniformity over the whole field
    pub entropy: f32,  // bits, over lit-cell intensities
}

impl TrailDiagnostics {
    pub fn from_field(field: &TrailField) -> Self {
        let values = field.values();
        let n = values.len().max(1);

        let mut total = 0.0f64;
        let mut lit_cells = 0u32;
        let mut lit_total = 0.0f64;
        let mut max_intensity = 0.0f32;
        for &v in values {
            total += v as f64;
            if v > max_intensity {
                max_intensity = v;
            }
            if v > LIT_THRESHOLD {
                lit_cells += 1;
                lit_total += v as f64;
            }
        }

        let mean = total / n as f64;
        let var = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;

        TrailDiagnostics {
            total_intensity: total as f32,
            lit_cells,
            lit_fraction: lit_cells as f32 / n as f32,
            max_intensity,
            mean_lit: if lit_cells > 0 {
                (lit_total / lit_cells as f64) as f32
            } else {
                0.0
            },
            std_dev: var.sqrt() as f32,
            entropy: intensity_entropy(values, ENTROPY_BINS),
        }
    }

    /// Log at INFO level, with deltas from the previous sample if given.
    pub fn log(&self, frame: u64, prev: Option<&TrailDiagnostics>) {
        log::info!("══════════════ Frame {} Diagnostics ══════════════", frame);

        if let Some(p) = prev {
            log::info!(
                "TRENDS: Δtotal={:+.1} | Δlit={:+} | Δmax={:+.3} | Δentropy={:+.2}",
                self.total_intensity - p.total_intensity,
                self.lit_cells as i64 - p.lit_cells as i64,
                self.max_intensity - p.max_intensity,
                self.entropy - p.entropy,
            );
        }

        log::info!(
            "TRAIL: total={:.1} | lit={} ({:.1}%) | max={:.3} | mean_lit={:.3}",
            self.total_intensity,
            self.lit_cells,
            self.lit_fraction * 100.0,
            self.max_intensity,
            self.mean_lit,
        );
        log::info!(
            "SPATIAL: stddev={:.4} | entropy={:.2} bits",
            self.std_dev,
            self.entropy,
        );
    }
}

// ======================== Intensity Entropy ========================

/// Shannon entropy of the lit-cell intensity histogram.
///
/// H = -Σ p(i) * log2(p(i))
///
/// 0 when every lit cell sits in one bin (e.g. freshly deposited trails
/// only); grows as diffusion spreads intensities across the range.
pub fn intensity_entropy(values: &[f32], bins: usize) -> f32 {
    if bins == 0 {
        return 0.0;
    }
    let mut histogram = vec![0u32; bins];
    let mut lit = 0u32;
    for &v in values {
        if v <= LIT_THRESHOLD {
            continue;
        }
        let bin = ((v.min(1.0) * bins as f32) as usize).min(bins - 1);
        histogram[bin] += 1;
        lit += 1;
    }
    if lit == 0 {
        return 0.0;
    }

    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f32 / lit as f32;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_is_all_zero() {
        let d = TrailDiagnostics::from_field(&TrailField::new(8, 8));
        assert_eq!(d.total_intensity, 0.0);
        assert_eq!(d.lit_cells, 0);
        assert_eq!(d.mean_lit, 0.0);
        assert_eq!(d.std_dev, 0.0);
        assert_eq!(d.entropy, 0.0);
    }

    #[test]
    fn counts_lit_cells_and_extremes() {
        let mut field = TrailField::new(4, 4);
        field.set(1, 1, 1.0);
        field.set(2, 2, 0.5);
        field.set(3, 3, 0.005);
        let d = TrailDiagnostics::from_field(&field);
        assert_eq!(d.lit_cells, 2);
        assert_eq!(d.lit_fraction, 2.0 / 16.0);
        assert_eq!(d.max_intensity, 1.0);
        assert!((d.mean_lit - 0.75).abs() < 1e-6);
        assert!((d.total_intensity - 1.505).abs() < 1e-5);
    }

    #[test]
    fn entropy_is_one_bit_for_two_equal_bins() {
        let values = [0.05, 0.05, 0.95, 0.95, 0.0];
        assert!((intensity_entropy(&values, 16) - 1.0).abs() < 1e-6);
        assert_eq!(intensity_entropy(&[1.0, 1.0, 1.0], 16), 0.0);
    }
}
