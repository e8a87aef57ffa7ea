use std::f32::consts::{FRAC_PI_2, PI};
use std::path::PathBuf;

use slimetrail::agents::{Agent, AgentStore};
use slimetrail::backend::SimBackend;
use slimetrail::config::{SceneConfig, SimConfig, SimParams};
use slimetrail::cpu::{CpuBackend, CpuFactory};
use slimetrail::field::to_cell;
use slimetrail::headless::{run_headless, HeadlessConfig};
use slimetrail::inputs::{BoundingBox, PointsOfInterest};
use slimetrail::steering::{edge_jitter, shortest_arc, EDGE_PULL_SCALE};

fn params() -> SimParams {
    SimParams {
        decay_rate: 0.9,
        diffusion_rate: 0.1,
        move_speed: 0.05,
        turn_speed: 0.3,
        sensor_distance: 0.2,
        sensor_size: 1.0,
        sensor_angle: 0.5,
        attraction_strength: 1.0,
    }
}

fn backend(width: u32, height: u32, params: SimParams, agents: Vec<Agent>) -> CpuBackend {
    let config = SimConfig {
        width,
        height,
        population: agents.len() as u32,
        seed: None,
        params,
    };
    CpuBackend::new(&config, AgentStore::from_agents(agents)).unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slimetrail_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn quiet_field_agent_moves_straight() {
    let mut sim = backend(10, 10, params(), vec![Agent::new(0.0, 0.0, 0.3)]);
    sim.simulate().unwrap();

    let agent = sim.agents().agents()[0];
    assert_eq!(agent.heading, 0.3);
    assert_eq!(agent.x, 0.3f32.cos() * 0.05);
    assert_eq!(agent.y, 0.3f32.sin() * 0.05);
    assert_eq!(sim.agents().step(), 1);
}

#[test]
fn trail_straight_ahead_keeps_heading_and_deposits() {
    let params = SimParams {
        sensor_angle: 0.8,
        move_speed: 0.1,
        ..params()
    };
    let mut sim = backend(10, 10, params, vec![Agent::new(0.0, 0.0, 0.0)]);
    // Front sensor at (0.2, 0) lands in cell (6, 5).
    sim.fields_mut().current_mut().set(6, 5, 1.0);
    sim.simulate().unwrap();

    let agent = sim.agents().agents()[0];
    assert_eq!(agent.heading, 0.0);
    assert_eq!(agent.position(), [0.1, 0.0]);
    assert_eq!(to_cell(agent.position(), 10, 10), (5, 5));
    assert_eq!(sim.fields().next().at(5, 5), 1.0);
    // The seed itself only decays and diffuses.
    assert!(sim.fields().next().at(6, 5) < 1.0);
}

#[test]
fn full_field_box_without_text_applies_only_sensor_rules() {
    let mut sim = backend(40, 40, params(), vec![Agent::new(0.0, 0.0, 0.4)]);
    let points = PointsOfInterest::new(&[BoundingBox::new(-1.0, -1.0, 1.0, 1.0).unwrap()]);
    sim.write_points(&points);

    // Right sensor at heading + angle sees trail; the attraction field is all zero.
    let right = [0.2 * 0.9f32.cos(), 0.2 * 0.9f32.sin()];
    let (x, y) = to_cell(right, 40, 40);
    sim.fields_mut().current_mut().set(x as u32, y as u32, 1.0);
    sim.simulate().unwrap();

    let heading = sim.agents().agents()[0].heading;
    assert!((heading - 0.7).abs() < 1e-6, "heading {heading}");
}

#[test]
fn agent_outside_box_turns_toward_nearest_edge() {
    let params = SimParams {
        attraction_strength: 0.5,
        ..params()
    };
    let mut sim = backend(40, 40, params, vec![Agent::new(0.0, 0.0, FRAC_PI_2)]);
    let points = PointsOfInterest::new(&[BoundingBox::new(0.5, -0.1, 0.9, 0.1).unwrap()]);
    sim.write_points(&points);
    sim.simulate().unwrap();

    // Nearest edge point is (0.5, 0): target heading 0.
    let diff = shortest_arc(0.0 - FRAC_PI_2) + edge_jitter(0, 0);
    let expected = FRAC_PI_2 + diff * 0.5 * EDGE_PULL_SCALE;
    let heading = sim.agents().agents()[0].heading;
    assert!((heading - expected).abs() < 1e-6, "heading {heading}, expected {expected}");
    assert!(heading < FRAC_PI_2);
}

#[test]
fn pull_toward_box_scales_with_attraction_strength() {
    let turn = |strength: f32| {
        let params = SimParams {
            attraction_strength: strength,
            ..params()
        };
        let mut sim = backend(40, 40, params, vec![Agent::new(0.0, 0.0, FRAC_PI_2)]);
        sim.write_points(&PointsOfInterest::new(&[BoundingBox::new(0.5, -0.1, 0.9, 0.1).unwrap()]));
        sim.simulate().unwrap();
        FRAC_PI_2 - sim.agents().agents()[0].heading
    };
    assert_eq!(turn(0.0), 0.0);
    assert!((turn(1.0) - 2.0 * turn(0.5)).abs() < 1e-5);
}

#[test]
fn position_clamps_at_the_boundary_without_deposit() {
    let params = SimParams {
        move_speed: 0.01,
        sensor_distance: 0.05,
        ..params()
    };
    let mut sim = backend(
        10,
        10,
        params,
        vec![
            Agent::new(0.9999, 0.0, 0.0),
            Agent::new(-0.95, 0.0, 0.0),
            Agent::new(-0.9999, 0.0, PI),
            Agent::new(0.0, 0.9999, FRAC_PI_2),
            Agent::new(0.0, -0.9999, -FRAC_PI_2),
        ],
    );
    sim.simulate().unwrap();

    let agents = sim.agents().agents();
    assert_eq!(agents[0].x, 1.0);
    assert_eq!(agents[0].heading, 0.0);
    // Side sensors past a wall may differ by an ulp and trigger a wall turn;
    // the clamp is exact either way.
    assert_eq!(agents[2].x, -1.0);
    assert_eq!(agents[3].y, 1.0);
    assert_eq!(agents[4].y, -1.0);
    // Every agent ends up on the outer ring of cells, which never takes deposits.
    assert!(sim.fields().next().values().iter().all(|v| *v == 0.0));
}

#[test]
fn headless_cpu_run_writes_final_composite() {
    let dir = temp_dir("headless");
    let output = dir.join("final.png");
    let scene = SceneConfig {
        simulation: SimConfig {
            width: 32,
            height: 24,
            population: 200,
            seed: Some(11),
            params: SimParams {
                move_speed: 0.01,
                sensor_distance: 0.02,
                ..SimParams::default()
            },
        },
        points_of_interest: vec![[-0.5, -0.5, 0.5, 0.5]],
        metrics_interval: 10,
        ..SceneConfig::default()
    };
    let config = HeadlessConfig {
        frames: 25,
        output: Some(output.clone()),
        progress_interval: 10,
    };

    let report = run_headless(CpuFactory, &scene, &config).unwrap();
    assert_eq!(report.frames, 25);
    assert!(report.final_diagnostics.lit_cells > 0);

    let img = image::open(&output).unwrap();
    assert_eq!((img.width(), img.height()), (32, 24));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn seeded_runs_are_reproducible() {
    let scene = SceneConfig {
        simulation: SimConfig {
            width: 24,
            height: 24,
            population: 64,
            seed: Some(3),
            params: SimParams::default(),
        },
        ..SceneConfig::default()
    };
    let config = HeadlessConfig {
        frames: 15,
        output: None,
        progress_interval: 0,
    };
    let a = run_headless(CpuFactory, &scene, &config).unwrap();
    let b = run_headless(CpuFactory, &scene, &config).unwrap();
    assert_eq!(a.final_diagnostics, b.final_diagnostics);
}
