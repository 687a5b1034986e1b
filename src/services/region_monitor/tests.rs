//! Tests for the region monitor

use super::*;
use crate::domain::types::{EventKind, RawRegionState, Transition};
use std::thread;

const UUID: &str = "e2c56db5-dffb-48d2-b060-d0f5a71096e0";

fn desk() -> BeaconDefinition {
    BeaconDefinition::new(UUID, "1", "1").with_name("Desk")
}

fn door() -> BeaconDefinition {
    BeaconDefinition::new(UUID, "1", "2").with_name("Door")
}

fn create_test_monitor(definitions: &[BeaconDefinition]) -> RegionMonitor {
    let mut monitor = RegionMonitor::new(Arc::new(Metrics::new()));
    monitor.install(RegionRegistry::build(definitions).regions);
    monitor
}

fn event(def: &BeaconDefinition, kind: EventKind) -> CanonicalEvent {
    CanonicalEvent::new(def.region_id(), kind)
}

/// Feed a sequence of Enter/Exit kinds and collect what was delivered
fn run_sequence(monitor: &mut RegionMonitor, def: &BeaconDefinition, kinds: &[EventKind]) -> Vec<Transition> {
    kinds.iter().filter_map(|kind| monitor.apply(&event(def, *kind))).map(|d| d.transition).collect()
}

#[test]
fn test_transition_table() {
    use RegionState::{Inside, Outside};
    assert_eq!(next_state(Outside, EventKind::Enter), (Inside, Some(Transition::Enter)));
    assert_eq!(next_state(Inside, EventKind::Enter), (Inside, None));
    assert_eq!(next_state(Inside, EventKind::Exit), (Outside, Some(Transition::Exit)));
    assert_eq!(next_state(Outside, EventKind::Exit), (Outside, None));
    let state = EventKind::StateUnchanged(RawRegionState::Inside);
    assert_eq!(next_state(Outside, state), (Outside, None));
    assert_eq!(next_state(Inside, state), (Inside, None));
}

#[test]
fn test_new_regions_start_outside() {
    let monitor = create_test_monitor(&[desk(), door()]);
    assert_eq!(monitor.state(&desk().region_id()), Some(RegionState::Outside));
    assert_eq!(monitor.state(&door().region_id()), Some(RegionState::Outside));
    assert!(monitor.in_range().is_empty());
}

#[test]
fn test_enter_then_exit() {
    let mut monitor = create_test_monitor(&[desk()]);

    let delivered = monitor.apply(&event(&desk(), EventKind::Enter)).unwrap();
    assert_eq!(delivered.transition, Transition::Enter);
    assert_eq!(delivered.in_range, vec![desk()]);
    assert_eq!(monitor.state(&desk().region_id()), Some(RegionState::Inside));
    assert!(monitor.last_change(&desk().region_id()).is_some());

    let delivered = monitor.apply(&event(&desk(), EventKind::Exit)).unwrap();
    assert_eq!(delivered.transition, Transition::Exit);
    assert!(delivered.in_range.is_empty());
    assert!(monitor.in_range().is_empty());
}

#[test]
fn test_duplicate_enter_is_suppressed() {
    let mut monitor = create_test_monitor(&[desk()]);

    assert!(monitor.apply(&event(&desk(), EventKind::Enter)).is_some());
    assert!(monitor.apply(&event(&desk(), EventKind::Enter)).is_none());

    assert_eq!(monitor.in_range().len(), 1);
    assert!(monitor.in_range().contains(&desk().region_id()));
    assert_eq!(monitor.metrics.duplicates_suppressed_total(), 1);
}

#[test]
fn test_exit_while_outside_is_suppressed() {
    let mut monitor = create_test_monitor(&[desk()]);
    assert!(monitor.apply(&event(&desk(), EventKind::Exit)).is_none());
    assert_eq!(monitor.state(&desk().region_id()), Some(RegionState::Outside));
}

#[test]
fn test_delivered_stream_collapses_duplicates() {
    use EventKind::{Enter, Exit};
    let mut monitor = create_test_monitor(&[desk()]);

    let delivered =
        run_sequence(&mut monitor, &desk(), &[Exit, Enter, Enter, Exit, Exit, Exit, Enter, Exit, Enter]);

    assert_eq!(
        delivered,
        vec![Transition::Enter, Transition::Exit, Transition::Enter, Transition::Exit, Transition::Enter]
    );
    // Strictly alternating, starting with Enter
    for (i, transition) in delivered.iter().enumerate() {
        let expected = if i % 2 == 0 { Transition::Enter } else { Transition::Exit };
        assert_eq!(*transition, expected);
    }
    assert!(monitor.in_range().contains(&desk().region_id()));
}

#[test]
fn test_in_range_matches_last_delivery() {
    use EventKind::{Enter, Exit};
    let mut monitor = create_test_monitor(&[desk(), door()]);

    run_sequence(&mut monitor, &desk(), &[Enter, Exit, Enter]);
    run_sequence(&mut monitor, &door(), &[Enter, Enter, Exit]);

    assert!(monitor.in_range().contains(&desk().region_id()));
    assert!(!monitor.in_range().contains(&door().region_id()));
    assert_eq!(monitor.in_range().snapshot(), vec![desk()]);
}

#[test]
fn test_state_callback_is_informational() {
    let mut monitor = create_test_monitor(&[desk()]);

    let inside = EventKind::StateUnchanged(RawRegionState::Inside);
    assert!(monitor.apply(&event(&desk(), inside)).is_none());
    assert_eq!(monitor.state(&desk().region_id()), Some(RegionState::Outside));
    assert!(monitor.in_range().is_empty());
    assert_eq!(monitor.metrics.duplicates_suppressed_total(), 0);
}

#[test]
fn test_unknown_region_is_dropped() {
    let mut monitor = create_test_monitor(&[desk()]);

    let ghost = CanonicalEvent::new(RegionId::from("ghost"), EventKind::Enter);
    assert!(monitor.apply(&ghost).is_none());
    assert!(monitor.in_range().is_empty());
    assert_eq!(monitor.state(&RegionId::from("ghost")), None);
    assert_eq!(monitor.metrics.unknown_region_total(), 1);
}

#[test]
fn test_install_discards_previous_state() {
    let mut monitor = create_test_monitor(&[desk(), door()]);
    monitor.apply(&event(&desk(), EventKind::Enter));
    let first_generation = monitor.generation();

    monitor.install(RegionRegistry::build(&[door()]).regions);

    assert_eq!(monitor.generation(), first_generation + 1);
    assert!(monitor.in_range().is_empty());
    assert!(!monitor.contains(&desk().region_id()));
    // Stale callback for the removed region must not resurrect it
    assert!(monitor.apply(&event(&desk(), EventKind::Exit)).is_none());
    assert!(monitor.apply(&event(&desk(), EventKind::Enter)).is_none());
    assert!(monitor.in_range().is_empty());
}

#[test]
fn test_handle_queues_deliveries_in_order() {
    let (handle, mut rx) = create_monitor(Arc::new(Metrics::new()));
    let errors = handle.rebuild(&[desk(), door()]);
    assert!(errors.is_empty());

    handle.submit(event(&desk(), EventKind::Enter));
    handle.submit(event(&desk(), EventKind::Enter));
    handle.submit(event(&door(), EventKind::Enter));
    handle.submit(event(&desk(), EventKind::Exit));

    assert!(matches!(rx.try_recv().unwrap(), Dispatch::Rebuilt { generation: 1, .. }));

    let Dispatch::Delivered(first) = rx.try_recv().unwrap() else { panic!("expected delivery") };
    assert_eq!(first.transition, Transition::Enter);
    assert_eq!(first.in_range, vec![desk()]);

    let Dispatch::Delivered(second) = rx.try_recv().unwrap() else { panic!("expected delivery") };
    assert_eq!(second.region_id, door().region_id());
    assert_eq!(second.in_range, vec![desk(), door()]);

    let Dispatch::Delivered(third) = rx.try_recv().unwrap() else { panic!("expected delivery") };
    assert_eq!(third.transition, Transition::Exit);
    assert_eq!(third.in_range, vec![door()]);

    assert!(rx.try_recv().is_err());
}

#[test]
fn test_handle_rebuild_reports_errors_and_empties_set() {
    let (handle, mut rx) = create_monitor(Arc::new(Metrics::new()));
    handle.rebuild(&[desk()]);
    handle.submit(event(&desk(), EventKind::Enter));
    assert_eq!(handle.in_range(), vec![desk()]);

    let broken = BeaconDefinition::new("zz", "1", "1");
    let errors = handle.rebuild(&[desk(), broken.clone()]);

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].definition, broken);
    assert!(handle.in_range().is_empty());
    assert_eq!(handle.region_count(), 1);
    assert_eq!(handle.generation(), 2);
    assert_eq!(handle.state(&desk().region_id()), Some(RegionState::Outside));

    let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
    assert_eq!(last, Dispatch::Rebuilt { generation: 2, in_range: Vec::new() });
}

#[test]
fn test_concurrent_regions_keep_alternation() {
    let definitions: Vec<BeaconDefinition> =
        (0..8).map(|minor| BeaconDefinition::new(UUID, "7", &minor.to_string())).collect();
    let (handle, mut rx) = create_monitor(Arc::new(Metrics::new()));
    handle.rebuild(&definitions);

    let workers: Vec<_> = definitions
        .iter()
        .cloned()
        .map(|def| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let kind = if i % 3 == 2 { EventKind::Exit } else { EventKind::Enter };
                    handle.submit(event(&def, kind));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut last: FxHashMap<RegionId, Transition> = FxHashMap::default();
    while let Ok(dispatch) = rx.try_recv() {
        let Dispatch::Delivered(delivered) = dispatch else { continue };
        if let Some(previous) = last.insert(delivered.region_id.clone(), delivered.transition) {
            assert_ne!(previous, delivered.transition);
        } else {
            assert_eq!(delivered.transition, Transition::Enter);
        }
        let inside = delivered.in_range.iter().any(|b| b.region_id() == delivered.region_id);
        assert_eq!(inside, delivered.transition == Transition::Enter);
    }

    // i = 199 is Enter, so every region ends inside
    assert_eq!(handle.in_range().len(), definitions.len());
}
