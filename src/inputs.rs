// ============================================================================
// inputs.rs — slimetrail
// Read-only collaborator inputs: the attraction field and the fixed-capacity
// points-of-interest list.
// ============================================================================

use std::collections::TryReserveError;
use std::path::Path;

use crate::config::SceneConfig;
use crate::error::SimError;
use crate::field::to_cell;

/// Number of point-of-interest slots carried to the device.
pub const POI_CAPACITY: usize = 10;
/// Marker in the first component of an unused slot.
pub const POI_SENTINEL: f32 = -999.0;

// ======================== Attraction Field ========================

/// Externally produced scalar grid in [0, 1], same size as the trail field.
#[derive(Clone, Debug, PartialEq)]
pub struct AttractionField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl AttractionField {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    /// Fallible `zeros` for viewport-sized fields.
    pub fn try_zeros(width: u32, height: u32) -> Result<Self, TryReserveError> {
        let n = width as usize * height as usize;
        let mut values = Vec::new();
        values.try_reserve_exact(n)?;
        values.resize(n, 0.0);
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self, SimError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(SimError::InvalidInput(format!(
                "attraction field has {} cells, expected {}x{} = {}",
                values.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Rasterises a greyscale image (luma / 255) at the viewport size.
    pub fn from_image(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, SimError> {
        let img = image::open(path.as_ref())?;
        let luma = img
            .resize_exact(width, height, image::imageops::FilterType::Triangle)
            .to_luma8();
        let values = luma.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        log::info!(
            "Attraction field rasterised from {:?} at {}x{}",
            path.as_ref(),
            width,
            height
        );
        Self::from_values(width, height, values)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = y as usize * self.width as usize + x as usize;
        self.values[i] = value;
    }

    /// Value under a normalized position; outside the grid reads as 0.
    pub fn at_normalized(&self, pos: [f32; 2]) -> f32 {
        let (x, y) = to_cell(pos, self.width, self.height);
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0.0;
        }
        self.values[y as usize * self.width as usize + x as usize]
    }
}

// ======================== Points of Interest ========================

/// Axis-aligned box in normalized space with `x1 < x2`, `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        (finite && x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Inclusive on every edge.
    pub fn contains(&self, p: [f32; 2]) -> bool {
        p[0] >= self.x1 && p[0] <= self.x2 && p[1] >= self.y1 && p[1] <= self.y2
    }

    /// Closest point of the box to `p` (p itself when inside).
    pub fn clamp_point(&self, p: [f32; 2]) -> [f32; 2] {
        [p[0].clamp(self.x1, self.x2), p[1].clamp(self.y1, self.y2)]
    }
}

/// Fixed-capacity box list; `None` slots are packed as the sentinel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointsOfInterest {
    slots: [Option<BoundingBox>; POI_CAPACITY],
}

impl PointsOfInterest {
    /// Keeps the first `POI_CAPACITY` boxes; extra ones are dropped with a warning.
    pub fn new(boxes: &[BoundingBox]) -> Self {
        if boxes.len() > POI_CAPACITY {
            log::warn!(
                "{} points of interest supplied, keeping the first {}",
                boxes.len(),
                POI_CAPACITY
            );
        }
        let mut slots = [None; POI_CAPACITY];
        for (slot, b) in slots.iter_mut().zip(boxes) {
            *slot = Some(*b);
        }
        Self { slots }
    }

    /// Builds from `[x1, y1, x2, y2]` rows, rejecting malformed boxes.
    pub fn from_rects(rects: &[[f32; 4]]) -> Result<Self, SimError> {
        let boxes = rects
            .iter()
            .map(|r| {
                BoundingBox::new(r[0], r[1], r[2], r[3]).ok_or_else(|| {
                    SimError::InvalidInput(format!("malformed point of interest {r:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&boxes))
    }

    /// Decodes the 40-float wire layout. A slot whose first component is the
    /// sentinel (or that is otherwise degenerate) is unused.
    pub fn from_packed(packed: &[f32; POI_CAPACITY * 4]) -> Self {
        let mut slots = [None; POI_CAPACITY];
        for (slot, chunk) in slots.iter_mut().zip(packed.chunks_exact(4)) {
            if chunk[0] == POI_SENTINEL {
                continue;
            }
            *slot = BoundingBox::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        }
        Self { slots }
    }

    pub fn packed(&self) -> [f32; POI_CAPACITY * 4] {
        let mut out = [POI_SENTINEL; POI_CAPACITY * 4];
        for (chunk, slot) in out.chunks_exact_mut(4).zip(&self.slots) {
            if let Some(b) = slot {
                chunk.copy_from_slice(&[b.x1, b.y1, b.x2, b.y2]);
            }
        }
        out
    }

    pub fn real_boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.slots.iter().flatten()
    }

    pub fn real_count(&self) -> usize {
        self.real_boxes().count()
    }

    /// First box (in slot order) containing `p`.
    pub fn containing(&self, p: [f32; 2]) -> Option<&BoundingBox> {
        self.real_boxes().find(|b| b.contains(p))
    }

    /// Nearest box edge point strictly closer than `max_radius`.
    pub fn nearest_edge_point(&self, p: [f32; 2], max_radius: f32) -> Option<[f32; 2]> {
        let mut best = None;
        let mut min_distance = max_radius;
        for b in self.real_boxes() {
            let edge = b.clamp_point(p);
            let distance = (p[0] - edge[0]).hypot(p[1] - edge[1]);
            if distance < min_distance {
                min_distance = distance;
                best = Some(edge);
            }
        }
        best
    }
}

/// Box enclosing every attraction cell above `threshold`, in normalized space.
pub fn bounding_box_of(field: &AttractionField, threshold: f32) -> Option<BoundingBox> {
    let (w, h) = (field.width(), field.height());
    let mut min = (u32::MAX, u32::MAX);
    let mut max = (0u32, 0u32);
    let mut any = false;
    for y in 0..h {
        for x in 0..w {
            if field.values()[(y * w + x) as usize] > threshold {
                any = true;
                min = (min.0.min(x), min.1.min(y));
                max = (max.0.max(x), max.1.max(y));
            }
        }
    }
    if !any {
        return None;
    }
    let nx = |c: u32| c as f32 / w as f32 * 2.0 - 1.0;
    let ny = |c: u32| c as f32 / h as f32 * 2.0 - 1.0;
    BoundingBox::new(nx(min.0), ny(min.1), nx(max.0 + 1), ny(max.1 + 1))
}

/// Attraction cells above this are lit for automatic box derivation.
pub const AUTO_BOX_THRESHOLD: f32 = 0.1;

/// Builds both collaborator inputs for a viewport from a scene. The image is
/// rasterised at exactly `width` x `height`; explicit boxes come first and
/// the derived box (if enabled) takes the next free slot.
pub fn scene_inputs(
    scene: &SceneConfig,
    width: u32,
    height: u32,
) -> Result<(Option<AttractionField>, PointsOfInterest), SimError> {
    let attraction = scene
        .attractor_image
        .as_ref()
        .map(|path| AttractionField::from_image(path, width, height))
        .transpose()?;

    let mut rects = scene.points_of_interest.clone();
    if scene.auto_points_of_interest {
        match attraction
            .as_ref()
            .and_then(|field| bounding_box_of(field, AUTO_BOX_THRESHOLD))
        {
            Some(b) => rects.push([b.x1, b.y1, b.x2, b.y2]),
            None => log::warn!("Automatic point of interest requested but nothing is lit"),
        }
    }
    Ok((attraction, PointsOfInterest::from_rects(&rects)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_layout_uses_sentinel_for_unused_slots() {
        let b = BoundingBox::new(-0.5, -0.5, 0.5, 0.25).unwrap();
        let points = PointsOfInterest::new(&[b]);
        let packed = points.packed();
        assert_eq!(&packed[..4], &[-0.5, -0.5, 0.5, 0.25]);
        for slot in packed[4..].chunks_exact(4) {
            assert_eq!(slot[0], POI_SENTINEL);
        }
        assert_eq!(PointsOfInterest::from_packed(&packed), points);
    }

    #[test]
    fn all_sentinel_means_no_real_boxes() {
        let points = PointsOfInterest::from_packed(&[POI_SENTINEL; 40]);
        assert_eq!(points.real_count(), 0);
        assert!(points.containing([0.0, 0.0]).is_none());
        assert!(points.nearest_edge_point([0.0, 0.0], 1.5).is_none());
    }

    #[test]
    fn nearest_edge_ignores_boxes_beyond_search_radius() {
        let far = BoundingBox::new(0.9, 0.9, 1.0, 1.0).unwrap();
        let near = BoundingBox::new(0.3, -0.1, 0.4, 0.1).unwrap();
        let points = PointsOfInterest::new(&[far, near]);
        assert_eq!(points.nearest_edge_point([-1.0, -1.0], 1.5), None);
        assert_eq!(points.nearest_edge_point([0.0, 0.0], 1.5), Some([0.3, 0.0]));
    }

    #[test]
    fn malformed_rects_are_rejected() {
        assert!(PointsOfInterest::from_rects(&[[0.5, 0.0, 0.1, 1.0]]).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn attraction_lookup_treats_outside_as_zero() {
        let mut field = AttractionField::zeros(4, 4);
        field.set(3, 3, 0.7);
        assert_eq!(field.at_normalized([0.75, 0.75]), 0.7);
        assert_eq!(field.at_normalized([1.0, 0.75]), 0.0);
        assert_eq!(field.at_normalized([-1.5, 0.0]), 0.0);
    }

    #[test]
    fn try_zeros_reports_impossible_sizes() {
        assert!(AttractionField::try_zeros(u32::MAX, u32::MAX).is_err());
        assert_eq!(AttractionField::try_zeros(3, 2).unwrap(), AttractionField::zeros(3, 2));
    }

    #[test]
    fn wrong_sized_attraction_is_rejected() {
        assert!(AttractionField::from_values(4, 4, vec![0.0; 15]).is_err());
    }

    #[test]
    fn lit_region_bounding_box() {
        let mut field = AttractionField::zeros(10, 10);
        field.set(2, 3, 1.0);
        field.set(6, 4, 0.5);
        let b = bounding_box_of(&field, 0.1).unwrap();
        let expected = [-0.6, -0.4, 0.4, 0.0];
        for (got, want) in [b.x1, b.y1, b.x2, b.y2].iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
        assert!(bounding_box_of(&AttractionField::zeros(10, 10), 0.1).is_none());
    }

    #[test]
    fn scene_inputs_rasterise_image_and_derive_box() {
        let path = std::env::temp_dir().join(format!("slimetrail-attractor-{}.png", std::process::id()));
        let mut img = image::GrayImage::new(8, 8);
        for y in 2..4 {
            for x in 4..6 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        img.save(&path).unwrap();

        let scene = SceneConfig {
            attractor_image: Some(path.clone()),
            points_of_interest: vec![[-0.9, -0.9, -0.5, -0.5]],
            auto_points_of_interest: true,
            ..SceneConfig::default()
        };
        let (field, points) = scene_inputs(&scene, 8, 8).unwrap();
        let field = field.unwrap();
        assert_eq!((field.width(), field.height()), (8, 8));
        assert_eq!(field.at_normalized([0.1, -0.4]), 1.0);
        assert_eq!(points.real_count(), 2);
        let derived = points.real_boxes().nth(1).unwrap();
        assert_eq!(*derived, BoundingBox::new(0.0, -0.5, 0.5, 0.0).unwrap());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn scene_without_image_keeps_explicit_boxes_only() {
        let scene = SceneConfig {
            points_of_interest: vec![[0.0, 0.0, 0.5, 0.5]],
            auto_points_of_interest: true,
            ..SceneConfig::default()
        };
        let (field, points) = scene_inputs(&scene, 16, 16).unwrap();
        assert!(field.is_none());
        assert_eq!(points.real_count(), 1);
    }
}
