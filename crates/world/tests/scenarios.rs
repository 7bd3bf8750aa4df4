//! End-to-end behaviour of the world engine: graph, view, route and targets
//! working together through the per-user store.

use glam::{DAffine2, DVec2};
use mapspace_geo::{distance, interpolate, offset_latlng};
use mapspace_world::prelude::*;
use mapspace_world::view::classify_distance;

fn r1_location() -> LatLng {
    LatLng::new(35.0, 139.0)
}

fn add_root(graph: &mut WorldGraph, at: LatLng, radius: f64) -> String {
    graph
        .add(NewEntity::Region(NewRegion {
            type_name: "plaza".into(),
            desc: "an open plaza".into(),
            location: Some(at),
            radius: Some(radius),
            ..Default::default()
        }))
        .unwrap()
        .id
}

fn straight_route(lengths: &[f64]) -> GmRoute {
    let mut cursor = r1_location();
    let mut travelled = 0.0;
    let steps = lengths
        .iter()
        .map(|len| {
            travelled += len;
            let next = offset_latlng(r1_location(), 0.0, travelled);
            let step = GmStep {
                html_instructions: "Continue north".into(),
                distance: TextValue { text: format!("{} m", len), value: *len },
                duration: TextValue { text: "1 min".into(), value: 60.0 },
                start_location: cursor.into(),
                end_location: next.into(),
                maneuver: None,
                travel_mode: "DRIVING".into(),
            };
            cursor = next;
            step
        })
        .collect();
    GmRoute {
        summary: "straight".into(),
        legs: vec![GmLeg {
            start_address: Some("A".into()),
            end_address: Some("B".into()),
            start_location: None,
            end_location: None,
            distance: TextValue { text: String::new(), value: lengths.iter().sum() },
            duration: TextValue::default(),
            steps,
        }],
    }
}

#[test]
fn test_candidate_due_north_is_front() {
    let policy = ViewPolicy::default();
    for (lat, lng) in [(35.0, 139.0), (-33.9, 151.2), (60.1, -0.5), (0.0, 0.0)] {
        for d in [5.0, 50.0, 120.0, 190.0] {
            let observer = Pose::new(lat, lng, 0.0);
            let mut graph = WorldGraph::new();
            let id = add_root(&mut graph, offset_latlng(observer.location(), 0.0, d), 1.0);

            let records = ViewProjector::new(&graph, &policy).view(&observer);
            let record = records.iter().find(|r| r.id == id).unwrap();
            assert_eq!(record.cam_pos, CamPos::Front, "at ({}, {}) d={}", lat, lng, d);
            assert_eq!(record.cam_dist, classify_distance(&policy, d, true));
        }
    }
}

#[test]
fn test_candidate_along_any_bearing_is_front() {
    let policy = ViewPolicy::default();
    let origin = r1_location();
    for bearing in [0.0, 45.0, 90.0, 180.0, 270.0, 359.0] {
        let mut graph = WorldGraph::new();
        let target = mapspace_geo::destination_point(origin, bearing, 60.0);
        let id = add_root(&mut graph, target, 1.0);

        let records = ViewProjector::new(&graph, &policy).view(&Pose::at(origin, bearing));
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].cam_pos, CamPos::Front, "bearing {}", bearing);
    }
}

#[test]
fn test_entity_at_observer_is_none() {
    let policy = ViewPolicy::default();
    let mut graph = WorldGraph::new();
    let id = add_root(&mut graph, r1_location(), 50.0);

    for bearing in [0.0, 123.0, 270.0] {
        let records = ViewProjector::new(&graph, &policy).view(&Pose::at(r1_location(), bearing));
        let record = records.iter().find(|r| r.id == id).unwrap();
        assert_eq!(record.dist, 0.0);
        assert_eq!(record.cam_pos, CamPos::None);
    }
}

#[test]
fn test_offset_chain_matches_affine_composition() {
    let mut graph = WorldGraph::new();
    let root = graph
        .add(NewEntity::Region(NewRegion {
            type_name: "campus".into(),
            location: Some(r1_location()),
            front_angle: Some(30.0),
            radius: Some(500.0),
            ..Default::default()
        }))
        .unwrap()
        .id;

    // (offset in parent frame, own front angle)
    let levels = [
        (DVec2::new(40.0, 10.0), Some(75.0)),
        (DVec2::new(-5.0, 22.0), None),
        (DVec2::new(3.0, -8.0), Some(200.0)),
        (DVec2::new(12.0, 12.0), Some(310.0)),
    ];

    let angle_of = |front: Option<f64>| -front.unwrap_or(0.0).to_radians();
    let mut frame = DAffine2::from_angle(angle_of(Some(30.0)));
    let mut parent_angle = Some(30.0);
    let mut parent = root;

    for (offset, front) in levels {
        let child = graph
            .add(NewEntity::Region(NewRegion {
                parent_region_id: Some(parent.clone()),
                type_name: "wing".into(),
                offset: Some(Offset2 { x: offset.x, y: offset.y }),
                front_angle: front,
                ..Default::default()
            }))
            .unwrap()
            .id;

        frame = frame
            * DAffine2::from_translation(offset)
            * DAffine2::from_angle(angle_of(front) - angle_of(parent_angle));
        let enu = frame.translation;
        let expected = offset_latlng(r1_location(), enu.x, enu.y);
        let resolved = graph.resolve_absolute_position(&child).unwrap();
        assert!(
            distance(expected, resolved) < 1e-6,
            "level mismatch: {:?} vs {:?}",
            expected,
            resolved
        );

        parent = child;
        parent_angle = front;
    }
}

#[test]
fn test_proceed_to_total_length_arrives_once() {
    let mut tracker = RouteTracker::new();
    tracker
        .load_route(vec![RouteSource::Directions(straight_route(&[100.0, 150.0]))])
        .unwrap();

    let arrivals: usize = (0..5).map(|_| tracker.proceed(50.0)).filter(|o| o.arrived).count();
    assert_eq!(arrivals, 1);
    assert_eq!(tracker.offset(), tracker.total_length());
    assert!(matches!(tracker.state(), TrackerState::Arrived { .. }));

    for _ in 0..3 {
        let outcome = tracker.proceed(25.0);
        assert_eq!(outcome.status, MoveStatus::NotMoved);
        assert!(!outcome.arrived);
        assert_eq!(tracker.offset(), 250.0);
    }
}

#[test]
fn test_add_change_view_round_trip() {
    let store = WorldStore::new(ViewPolicy::default());
    let pose = Pose::at(r1_location(), 0.0);

    let added = store.write("u1", |w| {
        w.add_object(PlaceObject {
            pose: Some(pose),
            type_name: "statue".into(),
            desc: "a bronze statue".into(),
            position: Some("front".into()),
            ..Default::default()
        })
    });
    assert_eq!(added.status, AddRemoveStatus::Added);
    let object_id = added.object_id.unwrap();
    let before = store.read("u1", |w| w.graph.entity_count());

    let patch = ChangePatch {
        desc: Some("a marble statue".into()),
        type_name: Some("monument".into()),
        ..Default::default()
    };
    let changed = store.write("u1", |w| w.change_object(&pose, Some(&object_id), &[], &patch));
    assert_eq!(changed.status, AddRemoveStatus::Changed);

    let points = store.read("u1", |w| w.view_points(&pose));
    let matching: Vec<&ViewRecord> = points.iter().filter(|p| p.id == object_id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].desc, "a marble statue");
    assert_eq!(matching[0].type_name, "monument");
    assert_eq!(points.len(), before);
}

#[test]
fn test_region_with_object_to_the_east() {
    let mut graph = WorldGraph::new();
    let r1 = add_root(&mut graph, r1_location(), 50.0);
    let o1 = graph
        .add(NewEntity::Object(NewObject {
            parent_region_id: Some(r1),
            type_name: "post".into(),
            desc: "a sign post".into(),
            offset: Some(Offset3 { x: 10.0, y: 0.0, z: 0.0 }),
            ..Default::default()
        }))
        .unwrap()
        .id;

    let policy = ViewPolicy::default();
    let records = ViewProjector::new(&graph, &policy).view(&Pose::at(r1_location(), 0.0));
    let record = records.iter().find(|r| r.id == o1).unwrap();
    assert_eq!(record.cam_pos, CamPos::Right);
    assert_eq!(record.cam_dist, CamDist::VeryClose);
    assert!((record.dist - 10.0).abs() < 0.01);
}

#[test]
fn test_two_step_route_interpolation() {
    let mut tracker = RouteTracker::new();
    tracker
        .load_route(vec![RouteSource::Directions(straight_route(&[100.0, 150.0]))])
        .unwrap();

    let steps = tracker.steps().to_vec();
    assert_eq!((steps[0].start, steps[0].end), (0.0, 100.0));
    assert_eq!((steps[1].start, steps[1].end), (100.0, 250.0));

    let outcome = tracker.proceed(150.0);
    assert_eq!(outcome.step_no, Some(1));
    let expected = interpolate(steps[1].start_location(), steps[1].end_location(), 1.0 / 3.0);
    assert!(distance(outcome.pose.unwrap().location(), expected) < 1e-6);
}

#[test]
fn test_remove_unknown_target_leaves_graph_unchanged() {
    let store = WorldStore::new(ViewPolicy::default());
    let pose = Pose::at(r1_location(), 0.0);
    store.write("u1", |w| {
        w.add_object(PlaceObject {
            pose: Some(pose),
            type_name: "kiosk".into(),
            desc: "a small kiosk".into(),
            ..Default::default()
        })
    });
    let before = store.read("u1", |w| w.view_points(&pose).len());

    let reply = store.write("u1", |w| w.remove_object(&pose, Some("does-not-exist"), &[]));
    assert_eq!(reply.status, AddRemoveStatus::NotFound);
    assert_eq!(store.read("u1", |w| w.view_points(&pose).len()), before);
}

#[test]
fn test_invalid_route_keeps_previous_progress() {
    let store = WorldStore::new(ViewPolicy::default());
    store.write("u1", |w| {
        w.load_route(vec![RouteSource::Directions(straight_route(&[80.0]))]).unwrap();
        w.move_to_target(&MoveRequest { proceed: 20.0, ..Default::default() });
    });

    let bad = GmRoute { summary: "broken".into(), legs: vec![] };
    let err = store.write("u1", |w| w.load_route(vec![RouteSource::Directions(bad)]));
    assert!(matches!(err, Err(WorldError::InvalidRoute(_))));

    let progress = store.read("u1", |w| w.route_progress());
    assert_eq!(progress.offset, 20.0);
    assert_eq!(progress.total_length, 80.0);
}
