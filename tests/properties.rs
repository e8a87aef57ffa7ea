use std::f32::consts::{FRAC_PI_2, PI, TAU};

use proptest::prelude::*;
use slimetrail::agents::Agent;
use slimetrail::config::SimParams;
use slimetrail::diffusion::diffuse_field;
use slimetrail::field::TrailField;
use slimetrail::inputs::{AttractionField, PointsOfInterest};
use slimetrail::steering::{update_agent, StepInputs};

const W: u32 = 8;
const H: u32 = 8;

prop_compose! {
    fn arb_field(max: f32)(values in prop::collection::vec(0.0f32..max, (W * H) as usize)) -> TrailField {
        TrailField::from_values(W, H, values).unwrap()
    }
}

prop_compose! {
    fn arb_params()(
        decay_rate in 0.0f32..=1.0,
        diffusion_rate in 0.0f32..=1.0,
        move_speed in 0.0f32..0.1,
        turn_speed in 0.0f32..1.0,
        sensor_distance in 0.0f32..0.2,
        sensor_size in 0.0f32..5.0,
        sensor_angle in 0.0f32..1.5,
        attraction_strength in 0.0f32..2.0
    ) -> SimParams {
        SimParams {
            decay_rate,
            diffusion_rate,
            move_speed,
            turn_speed,
            sensor_distance,
            sensor_size,
            sensor_angle,
            attraction_strength,
        }
    }
}

fn step(field: &TrailField, params: &SimParams) -> TrailField {
    let mut next = TrailField::new(field.width(), field.height());
    diffuse_field(field, &mut next, params);
    next
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn diffusion_never_goes_negative(field in arb_field(2.0), params in arb_params()) {
        let next = step(&field, &params);
        prop_assert!(next.values().iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn empty_field_stays_empty(params in arb_params()) {
        let next = step(&TrailField::new(W, H), &params);
        prop_assert!(next.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn zero_decay_clears_the_field(field in arb_field(1.0), diffusion in 0.0f32..=1.0) {
        let params = SimParams { decay_rate: 0.0, diffusion_rate: diffusion, ..SimParams::default() };
        let next = step(&field, &params);
        prop_assert!(next.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn undisturbed_trails_die_out(field in arb_field(0.05)) {
        let params = SimParams { decay_rate: 1.0, diffusion_rate: 0.0, ..SimParams::default() };
        let mut field = field;
        for _ in 0..110 {
            let next = step(&field, &params);
            for (before, after) in field.values().iter().zip(next.values()) {
                prop_assert!(*after == 0.0 || after < before);
            }
            field = next;
        }
        prop_assert!(field.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn diffusion_does_not_create_intensity(field in arb_field(1.0), params in arb_params()) {
        let before: f64 = field.values().iter().map(|v| *v as f64).sum();
        let after: f64 = step(&field, &params).values().iter().map(|v| *v as f64).sum();
        prop_assert!(after <= before * params.decay_rate as f64 + 1e-3);
    }

    #[test]
    fn without_boxes_heading_moves_by_zero_or_one_turn(
        trail in arb_field(1.0),
        x in -0.5f32..0.5,
        y in -0.5f32..0.5,
        heading in 0.0f32..TAU,
        params in arb_params(),
    ) {
        let attraction = AttractionField::zeros(W, H);
        let points = PointsOfInterest::default();
        let inputs = StepInputs { trail: &trail, attraction: &attraction, points: &points, params: &params, step: 0 };
        let out = update_agent(0, Agent::new(x, y, heading), &inputs);

        let delta = (out.agent.heading - heading).abs();
        prop_assert!(delta < 1e-5 || (delta - params.turn_speed).abs() < 1e-5, "delta {}", delta);
    }

    #[test]
    fn agents_stay_in_bounds_and_deposit_inside_margin(
        trail in arb_field(1.0),
        x in -1.0f32..=1.0,
        y in -1.0f32..=1.0,
        heading in -10.0f32..10.0,
        params in arb_params(),
    ) {
        let attraction = AttractionField::zeros(W, H);
        let points = PointsOfInterest::from_rects(&[[-0.5, -0.5, 0.5, 0.5]]).unwrap();
        let inputs = StepInputs { trail: &trail, attraction: &attraction, points: &points, params: &params, step: 7 };
        let out = update_agent(3, Agent::new(x, y, heading), &inputs);

        prop_assert!((-1.0..=1.0).contains(&out.agent.x));
        prop_assert!((-1.0..=1.0).contains(&out.agent.y));
        prop_assert!(out.agent.heading.is_finite());
        if let Some(cell) = out.deposit {
            let (cx, cy) = (cell as u32 % W, cell as u32 / W);
            prop_assert!(cx >= 1 && cx < W - 1 && cy >= 1 && cy < H - 1);
        }
    }

    #[test]
    fn agents_pushing_past_a_wall_land_exactly_on_it(
        trail in arb_field(1.0),
        along in 0.95f32..=1.0,
        across in -0.5f32..0.5,
        offset in -0.3f32..0.3,
        turn_speed in 0.0f32..0.3,
        move_speed in 0.07f32..0.1,
        wall in 0usize..4,
    ) {
        // Heading stays within 0.6 rad of the outward normal, so the step
        // always overshoots the wall.
        let (x, y, heading) = match wall {
            0 => (along, across, offset),
            1 => (-along, across, PI + offset),
            2 => (across, along, FRAC_PI_2 + offset),
            _ => (across, -along, -FRAC_PI_2 + offset),
        };
        let params = SimParams { turn_speed, move_speed, sensor_distance: 0.05, ..SimParams::default() };
        let attraction = AttractionField::zeros(W, H);
        let points = PointsOfInterest::default();
        let inputs = StepInputs { trail: &trail, attraction: &attraction, points: &points, params: &params, step: 0 };
        let out = update_agent(0, Agent::new(x, y, heading), &inputs);

        match wall {
            0 => prop_assert_eq!(out.agent.x, 1.0),
            1 => prop_assert_eq!(out.agent.x, -1.0),
            2 => prop_assert_eq!(out.agent.y, 1.0),
            _ => prop_assert_eq!(out.agent.y, -1.0),
        }
        prop_assert_eq!(out.deposit, None);
    }
}
