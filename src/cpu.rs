// ============================================================================
// cpu.rs — slimetrail
// Host substrate: both stages as rayon-parallel loops over owned stores.
// ============================================================================

use std::collections::TryReserveError;

use crate::agents::AgentStore;
use crate::backend::{BackendFactory, SimBackend};
use crate::composite::composite_rgba;
use crate::config::{SimConfig, SimParams};
use crate::diffusion::diffuse_field;
use crate::error::SimError;
use crate::field::{FieldStore, TrailField};
use crate::inputs::{AttractionField, PointsOfInterest};
use crate::steering::update_agents;

pub struct CpuBackend {
    fields: FieldStore,
    agents: AgentStore,
    attraction: AttractionField,
    points: PointsOfInterest,
    params: SimParams,
    released: bool,
}

impl CpuBackend {
    pub fn new(config: &SimConfig, agents: AgentStore) -> Result<Self, SimError> {
        let exhausted = |what: &str, bytes: u64, err: TryReserveError| SimError::ResourceExhausted {
            what: format!("{}x{} {what}", config.width, config.height),
            bytes,
            reason: err.to_string(),
        };
        let fields = FieldStore::try_new(config.width, config.height)
            .map_err(|e| exhausted("trail field pair", config.field_bytes().saturating_mul(2), e))?;
        let attraction = AttractionField::try_zeros(config.width, config.height)
            .map_err(|e| exhausted("attraction field", config.field_bytes(), e))?;
        Ok(Self {
            fields,
            agents,
            attraction,
            points: PointsOfInterest::default(),
            params: config.params,
            released: false,
        })
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldStore {
        &mut self.fields
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Greyscale RGBA8 of the next buffer (call between `simulate` and `swap`).
    pub fn composite(&self) -> Vec<u8> {
        composite_rgba(self.fields.next())
    }
}

impl SimBackend for CpuBackend {
    fn dimensions(&self) -> (u32, u32) {
        (self.fields.width(), self.fields.height())
    }

    fn population(&self) -> u32 {
        self.agents.len() as u32
    }

    fn write_params(&mut self, params: &SimParams) {
        self.params = *params;
    }

    fn write_attraction(&mut self, field: &AttractionField) -> Result<(), SimError> {
        if (field.width(), field.height()) != self.dimensions() {
            return Err(SimError::InvalidInput(format!(
                "attraction field is {}x{}, trail field is {}x{}",
                field.width(),
                field.height(),
                self.fields.width(),
                self.fields.height()
            )));
        }
        self.attraction = field.clone();
        Ok(())
    }

    fn write_points(&mut self, points: &PointsOfInterest) {
        self.points = points.clone();
    }

    fn simulate(&mut self) -> Result<(), SimError> {
        if self.released {
            return Err(SimError::Frame("backend already released".into()));
        }
        let (current, next) = self.fields.split();
        diffuse_field(current, next, &self.params);
        // Stage boundary: every diffused cell is in `next` before any deposit.
        update_agents(
            &mut self.agents,
            current,
            next,
            &self.attraction,
            &self.points,
            &self.params,
        );
        Ok(())
    }

    fn swap(&mut self) {
        self.fields.swap();
    }

    fn read_trail(&mut self) -> Result<TrailField, SimError> {
        Ok(self.fields.current().clone())
    }

    fn release(&mut self) {
        self.fields = FieldStore::new(0, 0);
        self.agents = AgentStore::from_agents(Vec::new());
        self.attraction = AttractionField::zeros(0, 0);
        self.released = true;
    }
}

/// Always available; used for headless runs and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuFactory;

impl BackendFactory for CpuFactory {
    type Backend = CpuBackend;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn capability_available(&self) -> bool {
        true
    }

    fn create(&self, config: &SimConfig, agents: AgentStore) -> Result<CpuBackend, SimError> {
        CpuBackend::new(config, agents)
    }
}
