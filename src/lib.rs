// ============================================================================
// lib.rs — slimetrail
// Slime mold trail simulation: agents sense, turn, move and deposit into a
// diffusing trail field, on the GPU or on the host.
// ============================================================================

pub mod agents;
pub mod app;
pub mod backend;
pub mod composite;
pub mod config;
pub mod controls;
pub mod cpu;
pub mod diffusion;
pub mod error;
pub mod field;
pub mod gpu;
pub mod headless;
pub mod inputs;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod steering;
pub mod world;
