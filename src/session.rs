// ============================================================================
// session.rs — slimetrail
// Simulation Session: owns one backend and drives the frame state machine
// Uninitialized -> Ready -> Running -> Disposed, with Errored as the terminal
// failure state.
// ============================================================================

use std::fmt;

use crate::agents::{Agent, AgentStore};
use crate::backend::{BackendFactory, SimBackend};
use crate::config::{SimConfig, SimParams};
use crate::error::SimError;
use crate::inputs::{AttractionField, PointsOfInterest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Running,
    Disposed,
    Errored,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Disposed => "disposed",
            SessionState::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disposed | SessionState::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct SimulationSession<F: BackendFactory> {
    factory: F,
    config: SimConfig,
    state: SessionState,
    backend: Option<F::Backend>,
    attraction: Option<AttractionField>,
    points: PointsOfInterest,
    error: Option<String>,
    frames: u64,
}

impl<F: BackendFactory> SimulationSession<F> {
    pub fn new(factory: F, config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            state: SessionState::Uninitialized,
            backend: None,
            attraction: None,
            points: PointsOfInterest::default(),
            error: None,
            frames: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The single error observable: set once when the session enters Errored.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn params(&self) -> &SimParams {
        &self.config.params
    }

    pub fn points(&self) -> &PointsOfInterest {
        &self.points
    }

    /// Frames completed since the last (re)initialisation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn backend(&self) -> Option<&F::Backend> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut F::Backend> {
        self.backend.as_mut()
    }

    // ======================== Lifecycle ========================

    /// Uninitialized -> Ready: capability check, then both stores and every
    /// input buffer. Failures are fatal.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.expect_state("initialize", &[SessionState::Uninitialized])?;

        if !self.factory.capability_available() {
            return Err(self.fail(SimError::Capability(format!(
                "{} backend is not available",
                self.factory.name()
            ))));
        }

        let population = self.config.population;
        let agents = match AgentStore::try_random(population, self.config.seed) {
            Ok(agents) => agents,
            Err(err) => {
                return Err(self.fail(SimError::ResourceExhausted {
                    what: format!("{population} agents"),
                    bytes: population as u64 * std::mem::size_of::<Agent>() as u64,
                    reason: err.to_string(),
                }))
            }
        };
        let mut backend = match self.factory.create(&self.config, agents) {
            Ok(backend) => backend,
            Err(err) => return Err(self.fail(err)),
        };

        if let Some(field) = &self.attraction {
            if let Err(err) = backend.write_attraction(field) {
                backend.release();
                return Err(self.fail(err));
            }
        }
        backend.write_points(&self.points);

        self.backend = Some(backend);
        self.frames = 0;
        self.state = SessionState::Ready;
        log::info!(
            "Session ready on {}: {}x{} field, {} agents",
            self.factory.name(),
            self.config.width,
            self.config.height,
            self.config.population
        );
        Ok(())
    }

    /// Ready -> Running.
    pub fn start(&mut self) -> Result<(), SimError> {
        self.expect_state("start", &[SessionState::Ready])?;
        self.state = SessionState::Running;
        log::info!("Session running");
        Ok(())
    }

    /// One frame: both stages, then `present` (which sees the freshly written
    /// next buffer), then the swap. Any failure ends the loop: the session
    /// moves to Errored and releases its buffers.
    pub fn frame<P>(&mut self, present: P) -> Result<(), SimError>
    where
        P: FnOnce(&mut F::Backend) -> Result<(), SimError>,
    {
        self.expect_state("frame", &[SessionState::Running])?;
        let Some(backend) = self.backend.as_mut() else {
            return Err(self.fail(SimError::Frame("running session has no backend".into())));
        };

        let result = backend.simulate().and_then(|()| present(&mut *backend));
        match result {
            Ok(()) => {
                backend.swap();
                self.frames += 1;
                log::trace!("frame {} complete", self.frames);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Hot reload: takes effect on the next dispatched frame without
    /// recreating anything. Rejected tuples leave the old parameters live.
    pub fn update_parameters(&mut self, params: SimParams) -> Result<(), SimError> {
        self.expect_live("update_parameters")?;
        if let Err(err) = params.validate() {
            log::warn!("Parameter update rejected: {err}");
            return Err(err);
        }
        self.config.params = params;
        if let Some(backend) = self.backend.as_mut() {
            backend.write_params(&params);
        }
        log::debug!("Parameters updated: {:?}", params);
        Ok(())
    }

    pub fn update_attraction_field(&mut self, field: AttractionField) -> Result<(), SimError> {
        self.expect_live("update_attraction_field")?;
        if (field.width(), field.height()) != (self.config.width, self.config.height) {
            let err = SimError::InvalidInput(format!(
                "attraction field is {}x{}, viewport is {}x{}",
                field.width(),
                field.height(),
                self.config.width,
                self.config.height
            ));
            log::warn!("{err}");
            return Err(err);
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.write_attraction(&field)?;
        }
        self.attraction = Some(field);
        Ok(())
    }

    pub fn update_points_of_interest(&mut self, points: PointsOfInterest) -> Result<(), SimError> {
        self.expect_live("update_points_of_interest")?;
        if let Some(backend) = self.backend.as_mut() {
            backend.write_points(&points);
        }
        log::debug!("{} points of interest", points.real_count());
        self.points = points;
        Ok(())
    }

    /// Viewport or population change: full teardown and reinitialisation
    /// (never a resize in place). A no-op when nothing restart-relevant
    /// changed. A running session resumes running.
    pub fn reconfigure(&mut self, width: u32, height: u32, population: u32) -> Result<(), SimError> {
        self.expect_live("reconfigure")?;
        let mut config = self.config.clone();
        config.width = width;
        config.height = height;
        config.population = population;
        config.validate()?;
        if !config.needs_restart(&self.config) {
            return Ok(());
        }

        log::info!(
            "Reconfiguring: {}x{} / {} agents -> {}x{} / {} agents",
            self.config.width,
            self.config.height,
            self.config.population,
            width,
            height,
            population
        );
        if (width, height) != (self.config.width, self.config.height) && self.attraction.take().is_some() {
            log::warn!("Attraction field dropped; it no longer matches the viewport");
        }
        self.config = config;
        self.restart()
    }

    /// Tears down and rebuilds with fresh agents and a cleared field.
    pub fn restart(&mut self) -> Result<(), SimError> {
        self.expect_live("restart")?;
        let was_running = self.state == SessionState::Running;
        self.release_backend();
        self.state = SessionState::Uninitialized;
        self.initialize()?;
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Any state -> Disposed. Releases every buffer; idempotent.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        self.release_backend();
        self.state = SessionState::Disposed;
        log::info!("Session disposed after {} frames", self.frames);
    }

    // ======================== Helpers ========================

    fn release_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
    }

    /// Enters Errored, records the message and releases the backend.
    fn fail(&mut self, err: SimError) -> SimError {
        log::error!("Simulation session failed: {err}");
        self.release_backend();
        self.state = SessionState::Errored;
        self.error.get_or_insert_with(|| err.to_string());
        err
    }

    fn expect_state(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), SimError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SimError::InvalidState {
                op,
                state: self.state.name(),
            })
        }
    }

    fn expect_live(&self, op: &'static str) -> Result<(), SimError> {
        if self.state.is_terminal() {
            Err(SimError::InvalidState {
                op,
                state: self.state.name(),
            })
        } else {
            Ok(())
        }
    }
}

impl<F: BackendFactory> Drop for SimulationSession<F> {
    fn drop(&mut self) {
        self.release_backend();
    }
}
