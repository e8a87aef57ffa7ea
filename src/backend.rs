// ============================================================================
// backend.rs — slimetrail
// Execution-substrate seam. Both stages can run as device compute kernels
// (`gpu`) or as parallel host loops (`cpu`); the session drives either one.
// ============================================================================

use crate::agents::AgentStore;
use crate::config::{SimConfig, SimParams};
use crate::error::SimError;
use crate::field::TrailField;
use crate::inputs::{AttractionField, PointsOfInterest};

/// One live simulation on some substrate, owning both stores.
///
/// A frame is `simulate` (diffusion-decay into next, then agent update
/// reading current and depositing into next), host composition of the next
/// buffer, then `swap`.
pub trait SimBackend {
    fn dimensions(&self) -> (u32, u32);

    fn population(&self) -> u32;

    /// Takes effect on the next dispatched frame.
    fn write_params(&mut self, params: &SimParams);

    fn write_attraction(&mut self, field: &AttractionField) -> Result<(), SimError>;

    fn write_points(&mut self, points: &PointsOfInterest);

    /// Stages (a) and (b) of a frame; must not swap.
    fn simulate(&mut self) -> Result<(), SimError>;

    fn swap(&mut self);

    /// Copy of the current buffer (the one composited last frame).
    fn read_trail(&mut self) -> Result<TrailField, SimError>;

    /// Releases every buffer; the backend is unusable afterwards.
    fn release(&mut self);
}

/// Builds backends for a session, and answers the capability query.
pub trait BackendFactory {
    type Backend: SimBackend;

    fn name(&self) -> &'static str;

    fn capability_available(&self) -> bool;

    fn create(&self, config: &SimConfig, agents: AgentStore) -> Result<Self::Backend, SimError>;
}
