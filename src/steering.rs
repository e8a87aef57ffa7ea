// ============================================================================
// steering.rs — slimetrail
// Agent Update stage: sensing, point-of-interest steering, wall avoidance,
// sensor steering, movement and trail deposit. Mirrors `shaders/agents.wgsl`.
// ============================================================================

use std::f32::consts::{FRAC_PI_4, PI, TAU};

use rayon::prelude::*;

use crate::agents::{Agent, AgentStore};
use crate::config::SimParams;
use crate::field::{to_cell, TrailField};
use crate::inputs::{AttractionField, PointsOfInterest};

/// Beyond this distance a box does not pull an outside agent.
pub const EDGE_SEARCH_RADIUS: f32 = 1.5;
/// Attraction above this within the probe ring counts as visible text.
pub const TEXT_THRESHOLD: f32 = 0.1;
/// Outside-box steering is this fraction of in-box steering.
pub const EDGE_PULL_SCALE: f32 = 0.05;
pub const JITTER_AMPLITUDE: f32 = 0.1;
/// Intensity written by a deposit.
pub const DEPOSIT: f32 = 1.0;

/// Read-only inputs shared by every agent in one dispatch.
pub struct StepInputs<'a> {
    /// Current trail field (pre-diffusion, pre-deposit).
    pub trail: &'a TrailField,
    pub attraction: &'a AttractionField,
    pub points: &'a PointsOfInterest,
    pub params: &'a SimParams,
    pub step: u32,
}

/// New agent state plus the cell index it deposits into, if any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentOutcome {
    pub agent: Agent,
    pub deposit: Option<usize>,
}

// ======================== Helpers ========================

/// Wraps an angle difference into [-PI, PI).
pub fn shortest_arc(diff: f32) -> f32 {
    diff - TAU * ((diff + PI) / TAU).floor()
}

/// Weak deterministic jitter keyed by (agent, step), in
/// [-JITTER_AMPLITUDE, JITTER_AMPLITUDE]. Not a quality PRNG.
pub fn edge_jitter(agent_index: u32, step: u32) -> f32 {
    (agent_index as f32 * 0.1 + step as f32 * 0.01).sin() * JITTER_AMPLITUDE
}

fn offset(pos: [f32; 2], angle: f32, distance: f32) -> [f32; 2] {
    [pos[0] + angle.cos() * distance, pos[1] + angle.sin() * distance]
}

/// Mean trail intensity in a square window around `pos`. Size <= 1 is a
/// single-cell lookup; larger windows average the in-bounds cells only.
pub fn sample_trail(trail: &TrailField, pos: [f32; 2], sensor_size: f32) -> f32 {
    let size = sensor_size.max(0.0) as u32;
    if size <= 1 {
        let (x, y) = to_cell(pos, trail.width(), trail.height());
        return trail.get(x, y).unwrap_or(0.0);
    }

    let half = (size / 2) as i32;
    // Half-up rounding, identical on host and device.
    let cx = ((pos[0] + 1.0) * 0.5 * trail.width() as f32 + 0.5).floor() as i32;
    let cy = ((pos[1] + 1.0) * 0.5 * trail.height() as f32 + 0.5).floor() as i32;
    let mut total = 0.0;
    let mut count = 0u32;
    for dy in -half..=half {
        for dx in -half..=half {
            if let Some(v) = trail.get(cx + dx, cy + dy) {
                total += v;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

// ======================== Steering Rules ========================

/// Any of the 8-direction ring probes at 3x sensor distance sees text.
fn text_within_radius(pos: [f32; 2], inputs: &StepInputs) -> bool {
    let radius = inputs.params.sensor_distance * 3.0;
    (0..8).any(|i| {
        let probe = offset(pos, i as f32 * FRAC_PI_4, radius);
        inputs.attraction.at_normalized(probe) > TEXT_THRESHOLD
    })
}

/// Direction of the strongest attraction among 8 probes at sensor distance.
/// Starts from the current heading and the value under the agent.
fn strongest_attraction_heading(pos: [f32; 2], heading: f32, inputs: &StepInputs) -> f32 {
    let mut best_angle = heading;
    let mut max_attraction = inputs.attraction.at_normalized(pos);
    for i in 0..8 {
        let angle = i as f32 * FRAC_PI_4;
        let value = inputs
            .attraction
            .at_normalized(offset(pos, angle, inputs.params.sensor_distance));
        if value > max_attraction {
            max_attraction = value;
            best_angle = angle;
        }
    }
    best_angle
}

/// Box-seeking phase; a no-op when every slot is unused.
fn steer_toward_points(index: u32, pos: [f32; 2], heading: f32, inputs: &StepInputs) -> f32 {
    if inputs.points.real_count() == 0 {
        return heading;
    }
    let strength = inputs.params.attraction_strength;

    if inputs.points.containing(pos).is_some() {
        if !text_within_radius(pos, inputs) {
            return heading;
        }
        let target = strongest_attraction_heading(pos, heading, inputs);
        return heading + shortest_arc(target - heading) * strength;
    }

    match inputs.points.nearest_edge_point(pos, EDGE_SEARCH_RADIUS) {
        Some(edge) => {
            let target = (edge[1] - pos[1]).atan2(edge[0] - pos[0]);
            let diff = shortest_arc(target - heading) + edge_jitter(index, inputs.step);
            heading + diff * strength * EDGE_PULL_SCALE
        }
        None => heading,
    }
}

/// Ordered wall checks on the side sensors; the first match wins.
/// Returns the heading delta that turns back toward the interior.
fn wall_turn(left: [f32; 2], right: [f32; 2], turn_speed: f32) -> Option<f32> {
    let (lx, ly, rx, ry) = (left[0], left[1], right[0], right[1]);
    if lx <= -1.0 && lx < rx {
        Some(turn_speed)
    } else if rx <= -1.0 && rx < lx {
        Some(-turn_speed)
    } else if lx >= 1.0 && lx > rx {
        Some(turn_speed)
    } else if rx >= 1.0 && rx > lx {
        Some(-turn_speed)
    } else if ly <= -1.0 && ly < ry {
        Some(turn_speed)
    } else if ry <= -1.0 && ry < ly {
        Some(-turn_speed)
    } else if ly >= 1.0 && ly > ry {
        Some(turn_speed)
    } else if ry >= 1.0 && ry > ly {
        Some(-turn_speed)
    } else {
        None
    }
}

/// Straight when front is strictly greatest, otherwise toward the stronger
/// side (left tested first); an exact left/right tie holds course.
fn sensor_turn(front: f32, left: f32, right: f32, turn_speed: f32) -> f32 {
    if front > left && front > right {
        0.0
    } else if left > right {
        -turn_speed
    } else if right > left {
        turn_speed
    } else {
        0.0
    }
}

// ======================== Agent Update ========================

/// Advances one agent by one frame. Pure: reads only `inputs`.
pub fn update_agent(index: u32, agent: Agent, inputs: &StepInputs) -> AgentOutcome {
    let params = inputs.params;
    let pos = agent.position();

    let front_pos = offset(pos, agent.heading, params.sensor_distance);
    let left_pos = offset(pos, agent.heading - params.sensor_angle, params.sensor_distance);
    let right_pos = offset(pos, agent.heading + params.sensor_angle, params.sensor_distance);

    let front = sample_trail(inputs.trail, front_pos, params.sensor_size);
    let left = sample_trail(inputs.trail, left_pos, params.sensor_size);
    let right = sample_trail(inputs.trail, right_pos, params.sensor_size);

    let mut heading = steer_toward_points(index, pos, agent.heading, inputs);
    heading += wall_turn(left_pos, right_pos, params.turn_speed)
        .unwrap_or_else(|| sensor_turn(front, left, right, params.turn_speed));
    if !heading.is_finite() {
        heading = agent.heading;
    }

    let x = (agent.x + heading.cos() * params.move_speed).clamp(-1.0, 1.0);
    let y = (agent.y + heading.sin() * params.move_speed).clamp(-1.0, 1.0);

    let (w, h) = (inputs.trail.width(), inputs.trail.height());
    let (cx, cy) = to_cell([x, y], w, h);
    let deposit = (cx >= 1 && cx < w as i32 - 1 && cy >= 1 && cy < h as i32 - 1)
        .then(|| cy as usize * w as usize + cx as usize);

    AgentOutcome {
        agent: Agent { x, y, heading },
        deposit,
    }
}

/// Updates every agent in parallel, then applies deposits into `next` in
/// agent order (last write wins) and bumps the step counter.
pub fn update_agents(
    store: &mut AgentStore,
    trail: &TrailField,
    next: &mut TrailField,
    attraction: &AttractionField,
    points: &PointsOfInterest,
    params: &SimParams,
) {
    let inputs = StepInputs {
        trail,
        attraction,
        points,
        params,
        step: store.step(),
    };

    let deposits: Vec<Option<usize>> = store
        .agents_mut()
        .par_iter_mut()
        .enumerate()
        .map(|(i, agent)| {
            let outcome = update_agent(i as u32, *agent, &inputs);
            *agent = outcome.agent;
            outcome.deposit
        })
        .collect();

    let cells = next.values_mut();
    for cell in deposits.into_iter().flatten() {
        cells[cell] = DEPOSIT;
    }

    if !store.is_empty() {
        store.advance_step();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::BoundingBox;

    fn quiet_params() -> SimParams {
        SimParams {
            decay_rate: 1.0,
            diffusion_rate: 0.0,
            move_speed: 0.01,
            turn_speed: 0.2,
            sensor_distance: 0.1,
            sensor_size: 1.0,
            sensor_angle: 0.5,
            attraction_strength: 0.5,
        }
    }

    #[test]
    fn shortest_arc_wraps_any_magnitude() {
        assert!((shortest_arc(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((shortest_arc(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((shortest_arc(10.0 * TAU + 0.25) - 0.25).abs() < 1e-4);
        assert_eq!(shortest_arc(0.3), 0.3);
    }

    #[test]
    fn jitter_stays_within_amplitude() {
        for i in 0..500 {
            for step in [0, 1, 77, 10_000] {
                assert!(edge_jitter(i, step).abs() <= JITTER_AMPLITUDE);
            }
        }
        assert_eq!(edge_jitter(3, 9), edge_jitter(3, 9));
    }

    #[test]
    fn windowed_sensor_averages_in_bounds_cells_only() {
        let mut trail = TrailField::new(4, 4);
        trail.fill(1.0);
        // Corner window: only the in-bounds quarter is averaged.
        assert_eq!(sample_trail(&trail, [-1.0, -1.0], 3.0), 1.0);

        let mut trail = TrailField::new(5, 5);
        trail.set(2, 2, 0.9);
        // Centre of cell (2, 2) rounds to 2.5 -> 3 on both axes.
        let v = sample_trail(&trail, [0.0, 0.0], 3.0);
        assert!((v - 0.1).abs() < 1e-6);
        assert_eq!(sample_trail(&trail, [5.0, 5.0], 3.0), 0.0);
    }

    #[test]
    fn single_cell_sensor_outside_field_is_no_signal() {
        let mut trail = TrailField::new(4, 4);
        trail.fill(1.0);
        assert_eq!(sample_trail(&trail, [-1.2, 0.0], 1.0), 0.0);
        assert_eq!(sample_trail(&trail, [0.0, 1.0], 1.0), 0.0);
        assert_eq!(sample_trail(&trail, [0.0, 0.0], 1.0), 1.0);
    }

    #[test]
    fn wall_rules_take_priority_and_first_match_wins() {
        // Left sensor past the low-x wall turns positive even if sensors disagree.
        assert_eq!(wall_turn([-1.1, 0.0], [-0.9, 0.0], 0.2), Some(0.2));
        assert_eq!(wall_turn([-0.9, 0.0], [-1.1, 0.0], 0.2), Some(-0.2));
        assert_eq!(wall_turn([1.1, 0.0], [0.9, 0.0], 0.2), Some(0.2));
        assert_eq!(wall_turn([0.9, 0.0], [1.1, 0.0], 0.2), Some(-0.2));
        assert_eq!(wall_turn([0.0, -1.1], [0.0, -0.9], 0.2), Some(0.2));
        assert_eq!(wall_turn([0.0, 1.1], [0.0, 0.9], 0.2), Some(0.2));
        // Corner: the x rule is evaluated before the y rule.
        assert_eq!(wall_turn([-1.1, 1.1], [-0.9, 1.2], 0.2), Some(0.2));
        assert_eq!(wall_turn([0.0, 0.0], [0.1, 0.1], 0.2), None);
    }

    #[test]
    fn sensor_rule_tie_breaks() {
        assert_eq!(sensor_turn(1.0, 0.5, 0.5, 0.2), 0.0);
        assert_eq!(sensor_turn(0.5, 0.5, 0.1, 0.2), -0.2);
        assert_eq!(sensor_turn(0.5, 0.1, 0.7, 0.2), 0.2);
        assert_eq!(sensor_turn(0.0, 0.0, 0.0, 0.2), 0.0);
    }

    #[test]
    fn agent_turns_toward_stronger_right_sensor() {
        let params = quiet_params();
        let mut trail = TrailField::new(40, 40);
        let agent = Agent::new(0.0, 0.0, 0.0);
        let right = offset([0.0, 0.0], params.sensor_angle, params.sensor_distance);
        let (x, y) = to_cell(right, 40, 40);
        trail.set(x as u32, y as u32, 1.0);

        let attraction = AttractionField::zeros(40, 40);
        let points = PointsOfInterest::default();
        let inputs = StepInputs {
            trail: &trail,
            attraction: &attraction,
            points: &points,
            params: &params,
            step: 0,
        };
        let out = update_agent(0, agent, &inputs);
        assert_eq!(out.agent.heading, params.turn_speed);
    }

    #[test]
    fn in_box_agent_follows_strongest_attraction_probe() {
        let params = quiet_params();
        let trail = TrailField::new(40, 40);
        let mut attraction = AttractionField::zeros(40, 40);
        // Light up the cell straight "down" (angle PI/2) at sensor distance.
        let probe = offset([0.0, 0.0], PI / 2.0, params.sensor_distance);
        let (x, y) = to_cell(probe, 40, 40);
        attraction.set(x as u32, y as u32, 1.0);
        let points = PointsOfInterest::new(&[BoundingBox::new(-0.5, -0.5, 0.5, 0.5).unwrap()]);

        // Ring probes at 3x sensor distance must also see text for steering to kick in.
        let ring = offset([0.0, 0.0], PI / 2.0, params.sensor_distance * 3.0);
        let (rx, ry) = to_cell(ring, 40, 40);
        attraction.set(rx as u32, ry as u32, 1.0);

        let inputs = StepInputs {
            trail: &trail,
            attraction: &attraction,
            points: &points,
            params: &params,
            step: 0,
        };
        let heading = steer_toward_points(0, [0.0, 0.0], 0.0, &inputs);
        let expected = shortest_arc(PI / 2.0) * params.attraction_strength;
        assert!((heading - expected).abs() < 1e-6);
    }

    #[test]
    fn deposits_apply_in_agent_order_and_step_advances() {
        let params = SimParams {
            move_speed: 0.0,
            ..quiet_params()
        };
        let trail = TrailField::new(10, 10);
        let mut next = TrailField::new(10, 10);
        let attraction = AttractionField::zeros(10, 10);
        let points = PointsOfInterest::default();
        let mut store = AgentStore::from_agents(vec![
            Agent::new(0.05, 0.05, 0.0),
            Agent::new(0.05, 0.05, 1.0),
            Agent::new(-0.95, 0.0, 0.0),
        ]);

        update_agents(&mut store, &trail, &mut next, &attraction, &points, &params);

        assert_eq!(store.step(), 1);
        assert_eq!(next.at(5, 5), DEPOSIT);
        // Agent on the outermost ring leaves no mark.
        assert_eq!(next.values().iter().filter(|v| **v > 0.0).count(), 1);
    }
}
