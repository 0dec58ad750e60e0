//! Property tests for route simplification and metrics.
//!
//! Run with: `cargo test --test simplify_properties`

use approx::assert_relative_eq;
use proptest::prelude::*;
use route_tracker::geo_utils::{haversine_distance, perpendicular_distance};
use route_tracker::{derive_metrics, simplify, simplify_indices, LocationPoint};

fn arb_route(max_len: usize) -> impl Strategy<Value = Vec<LocationPoint>> {
    prop::collection::vec((-80.0f64..80.0, -170.0f64..170.0, 0i64..1_000_000), 0..max_len)
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(lat, lng, ts)| LocationPoint::new(lat, lng, Some(ts)))
                .collect()
        })
}

/// A wandering walk: small steps so the tolerance actually matters.
fn arb_walk(max_len: usize) -> impl Strategy<Value = Vec<LocationPoint>> {
    prop::collection::vec((-0.001f64..0.001, -0.001f64..0.001), 0..max_len).prop_map(|steps| {
        let mut lat = 28.6139;
        let mut lng = 77.2090;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (dlat, dlng))| {
                lat += dlat;
                lng += dlng;
                LocationPoint::new(lat, lng, Some(i as i64 * 1_000))
            })
            .collect()
    })
}

/// A walk that returns to where it started, so the outer chord has zero length.
fn arb_loop(max_len: usize) -> impl Strategy<Value = Vec<LocationPoint>> {
    arb_walk(max_len).prop_map(|mut route| {
        if let Some(&first) = route.first() {
            route.push(first);
        }
        route
    })
}

/// Largest distance from a dropped point to the chord of the kept pair around it.
fn max_dropped_deviation(route: &[LocationPoint], kept: &[usize]) -> f64 {
    let mut worst = 0.0f64;
    for pair in kept.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        for point in &route[start + 1..end] {
            worst = worst.max(perpendicular_distance(point, &route[start], &route[end]));
        }
    }
    worst
}

proptest! {
    #[test]
    fn prop_dropped_points_within_epsilon(route in arb_walk(120), epsilon in 0.0f64..0.002) {
        let kept = simplify_indices(&route, epsilon);
        prop_assert!(max_dropped_deviation(&route, &kept) <= epsilon);
    }

    #[test]
    fn prop_closed_loop_within_epsilon(route in arb_loop(60), epsilon in 0.0f64..0.002) {
        let kept = simplify_indices(&route, epsilon);
        prop_assert!(max_dropped_deviation(&route, &kept) <= epsilon);
    }

    #[test]
    fn prop_endpoints_preserved(route in arb_route(80), epsilon in 0.0f64..5.0) {
        let simplified = simplify(&route, epsilon);
        if route.len() >= 2 {
            prop_assert_eq!(simplified.first(), route.first());
            prop_assert_eq!(simplified.last(), route.last());
        } else {
            prop_assert_eq!(&simplified, &route);
        }
    }

    #[test]
    fn prop_never_longer(route in arb_route(80), epsilon in 0.0f64..5.0) {
        prop_assert!(simplify(&route, epsilon).len() <= route.len());
    }

    #[test]
    fn prop_output_is_ordered_subsequence(route in arb_walk(120), epsilon in 0.0f64..0.002) {
        let simplified = simplify(&route, epsilon);
        let mut remaining = route.iter();
        for point in &simplified {
            prop_assert!(remaining.any(|p| p == point));
        }
    }

    #[test]
    fn prop_idempotent(route in arb_walk(120), epsilon in 0.0f64..0.002) {
        let once = simplify(&route, epsilon);
        let twice = simplify(&once, epsilon);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_monotone_in_epsilon(route in arb_walk(120), low in 0.0f64..0.001, extra in 0.0f64..0.001) {
        let fine = simplify(&route, low);
        let coarse = simplify(&route, low + extra);
        prop_assert!(coarse.len() <= fine.len());
    }

    #[test]
    fn prop_haversine_symmetric(a in arb_route(2), b in arb_route(2)) {
        if let (Some(a), Some(b)) = (a.first(), b.first()) {
            prop_assert_eq!(haversine_distance(a, a), 0.0);
            assert_relative_eq!(haversine_distance(a, b), haversine_distance(b, a), max_relative = 1e-12);
        }
    }
}

#[test]
fn test_near_colinear_collapses_to_endpoints() {
    let route = vec![
        LocationPoint::new(0.0, 0.0, Some(0)),
        LocationPoint::new(0.0001, 1.0, Some(1_000)),
        LocationPoint::new(-0.0001, 2.0, Some(2_000)),
        LocationPoint::new(0.00005, 3.0, Some(3_000)),
        LocationPoint::new(0.0, 4.0, Some(4_000)),
    ];
    let simplified = simplify(&route, 50.0);
    assert_eq!(simplified, vec![route[0], route[4]]);
}

#[test]
fn test_loop_keeps_point_furthest_from_origin() {
    let route = vec![
        LocationPoint::new(0.0, 0.0, None),
        LocationPoint::new(0.0, 0.001, None),
        LocationPoint::new(0.0, 0.003, None),
        LocationPoint::new(0.0, 0.001, None),
        LocationPoint::new(0.0, 0.0, None),
    ];
    let kept = simplify_indices(&route, 0.002);
    assert_eq!(kept, vec![0, 2, 4]);
    assert!(max_dropped_deviation(&route, &kept) <= 0.002);
}

#[test]
fn test_two_point_walk_metrics() {
    let t0 = 1_700_000_000_000;
    let route = vec![
        LocationPoint::new(28.6139, 77.2090, Some(t0)),
        LocationPoint::new(28.6150, 77.2100, Some(t0 + 95_400)),
    ];
    let metrics = derive_metrics(&route);

    assert!(metrics.distance_meters > 100.0 && metrics.distance_meters < 200.0);
    assert_eq!(metrics.duration_seconds, 95);
}

#[test]
fn test_empty_and_single_point_metrics() {
    assert_eq!(derive_metrics(&[]).distance_meters, 0.0);
    assert_eq!(derive_metrics(&[]).duration_seconds, 0);

    let single = derive_metrics(&[LocationPoint::new(1.0, 1.0, Some(5_000))]);
    assert_eq!(single.distance_meters, 0.0);
    assert_eq!(single.duration_seconds, 0);
}
