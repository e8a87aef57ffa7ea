// ============================================================================
// field.rs — slimetrail
// Trail field grid and the ping-pong Field Store.
// ============================================================================

use std::collections::TryReserveError;

/// Row-major grid of trail intensities in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct TrailField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl TrailField {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    /// Fallible allocation for viewport-sized fields.
    pub fn try_new(width: u32, height: u32) -> Result<Self, TryReserveError> {
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

    /// Wraps existing row-major data; `None` if the length does not match.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        (values.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Value at an in-bounds cell.
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.values[self.index(x, y)]
    }

    /// Value at a signed cell coordinate; out of bounds reads as `None`.
    pub fn get(&self, x: i32, y: i32) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.at(x as u32, y as u32))
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.values[i] = value;
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn fill(&mut self, value: f32) {
        self.values.fill(value);
    }
}

/// Maps a normalized [-1, 1] coordinate to a (possibly out of range) cell.
pub fn to_cell(pos: [f32; 2], width: u32, height: u32) -> (i32, i32) {
    (
        ((pos[0] + 1.0) * 0.5 * width as f32).floor() as i32,
        ((pos[1] + 1.0) * 0.5 * height as f32).floor() as i32,
    )
}

// ======================== Field Store ========================

/// Two equally sized trail fields. Exactly one is current (read this frame)
/// and one is next (written this frame); `swap` flips the roles.
pub struct FieldStore {
    buffers: [TrailField; 2],
    current: usize,
}

impl FieldStore {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffers: [TrailField::new(width, height), TrailField::new(width, height)],
            current: 0,
        }
    }

    pub fn try_new(width: u32, height: u32) -> Result<Self, TryReserveError> {
        Ok(Self {
            buffers: [TrailField::try_new(width, height)?, TrailField::try_new(width, height)?],
            current: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.buffers[0].width()
    }

    pub fn height(&self) -> u32 {
        self.buffers[0].height()
    }

    /// Index of the current (read) buffer
    pub fn cur(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &TrailField {
        &self.buffers[self.current]
    }

    pub fn next(&self) -> &TrailField {
        &self.buffers[1 - self.current]
    }

    /// Seeding hook for hosts and tests; not used by the stages.
    pub fn current_mut(&mut self) -> &mut TrailField {
        &mut self.buffers[self.current]
    }

    /// Read view of the current buffer alongside write access to the next.
    pub fn split(&mut self) -> (&TrailField, &mut TrailField) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    /// Swap ping-pong buffers after a frame
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}
