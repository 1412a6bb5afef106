use highway_service::{HighwayConfig, NoteHighwayService};
use proptest::prelude::*;
use rhythm_core::{
    Channel, Difficulty, GateConfig, JudgeConfig, MockTimeProvider, NoteId, PitchSample,
    SessionError, SessionEvent, SessionState, TimedNote,
};

fn note(id: u32, midi: f64, start: f64, duration: f64) -> TimedNote {
    TimedNote {
        id: NoteId(id),
        midi_pitch: midi,
        start_time_ms: start,
        duration_ms: duration,
        channel: Channel(0),
    }
}

fn service(tp: &MockTimeProvider) -> NoteHighwayService<&MockTimeProvider> {
    NoteHighwayService::new(HighwayConfig::default(), tp).unwrap()
}

#[test]
fn test_in_tune_note_reaches_results() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    service.set_target_notes(vec![note(1, 60.0, 1000.0, 500.0)]).unwrap();
    service.start().unwrap();

    tp.advance_ms(1100.0);
    service.tick();
    assert!(service.record_pitch_input(Some(60.2), 0.9));
    tp.advance_ms(200.0);
    service.tick();
    assert!(service.record_pitch_input(Some(59.9), 0.8));
    assert!(service.get_performance_results().is_empty());

    tp.advance_ms(1000.0);
    let events = service.tick();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::NoteFinalized(p) if p.note_id == NoteId(1)))
    );

    let result = service.get_performance_results()[&NoteId(1)];
    assert!(result.hit);
    assert!((result.accuracy_cents.unwrap() - 5.0).abs() < 1e-6);
    assert!((result.timing_offset_ms.unwrap() - 100.0).abs() < 1e-9);
    assert!((result.sampled_duration_ratio - 0.2).abs() < 1e-9);
}

#[test]
fn test_flat_singing_is_a_miss() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    service.set_target_notes(vec![note(1, 60.0, 1000.0, 500.0)]).unwrap();
    service.start().unwrap();
    for _ in 0..40 {
        tp.advance_ms(50.0);
        service.tick();
        service.record_pitch_input(Some(63.0), 0.9);
    }
    service.tick();
    let result = service.get_performance_results()[&NoteId(1)];
    assert!(!result.hit);
    assert_eq!(result.accuracy_cents, None);
    assert_eq!(result.timing_offset_ms, None);
}

#[test]
fn test_results_survive_pause_and_stop() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    service
        .set_target_notes(vec![note(1, 60.0, 0.0, 200.0), note(2, 62.0, 1000.0, 400.0)])
        .unwrap();
    service.start().unwrap();
    tp.advance_ms(600.0);
    service.tick();
    assert_eq!(service.get_performance_results().len(), 1);

    service.pause().unwrap();
    tp.advance_ms(10_000.0);
    let paused = service.tick();
    assert!(
        !paused
            .iter()
            .any(|e| matches!(e, SessionEvent::NoteFinalized(_)))
    );
    service.resume().unwrap();
    assert_eq!(service.get_performance_results().len(), 1);

    tp.advance_ms(500.0);
    service.tick();
    service.record_pitch_input(Some(62.0), 1.0);
    let final_events = service.stop().unwrap();
    assert!(
        final_events
            .iter()
            .any(|e| matches!(e, SessionEvent::NoteFinalized(p) if p.note_id == NoteId(2)))
    );
    assert_eq!(service.get_performance_results().len(), 2);
    assert!(service.get_performance_results()[&NoteId(2)].hit);

    // stopping again changes nothing
    assert!(service.stop().unwrap().is_empty());
    assert_eq!(service.summary().total, 2);
}

#[test]
fn test_invalid_transitions_surface() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    assert!(matches!(
        service.resume(),
        Err(SessionError::InvalidTransition {
            from: SessionState::Idle,
            ..
        })
    ));
    service.start().unwrap();
    assert!(matches!(
        service.set_target_notes(Vec::new()),
        Err(SessionError::TimelineLocked { .. })
    ));
    assert!(!service.record_pitch_input(None, 0.0));
}

#[test]
fn test_invalid_target_notes_are_refused() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    let result = service.set_target_notes(vec![
        note(1, 60.0, 0.0, 500.0),
        note(1, 62.0, 1000.0, 500.0),
        note(3, 64.0, 200.0, -5.0),
    ]);
    assert!(matches!(result, Err(SessionError::InvalidTimeline(_))));
    assert!(service.referee().notes().is_empty());

    service
        .set_target_notes(vec![note(1, 60.0, 0.0, 500.0), note(2, 62.0, 1000.0, 500.0)])
        .unwrap();
    service.start().unwrap();
    tp.advance_ms(2000.0);
    service.tick();
    service.stop().unwrap();
    assert_eq!(service.get_performance_results().len(), 2);
}

#[test]
fn test_finalize_twice_keeps_one_record() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    service
        .set_target_notes(vec![note(1, 60.0, 0.0, 500.0), note(2, 62.0, 1000.0, 500.0)])
        .unwrap();
    service.start().unwrap();
    tp.advance_ms(200.0);
    service.tick();
    service.record_pitch_input(Some(60.1), 0.9);

    let first = service.finalize_note(NoteId(1));
    let second = service.finalize_note(NoteId(1));
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(service.get_performance_results().len(), 1);
    assert_eq!(service.get_performance_results().get(&NoteId(1)).copied(), first);
    assert_eq!(service.collector().in_arrival_order().count(), 1);

    // the note stays closed once its window expires
    tp.advance_ms(1000.0);
    service.tick();
    assert_eq!(service.get_performance_results().len(), 1);
    service.stop().unwrap();
    assert_eq!(service.get_performance_results().len(), 2);
    assert_eq!(service.get_performance_results().get(&NoteId(1)).copied(), first);
}

#[test]
fn test_legato_line_scores_every_note() {
    let tp = MockTimeProvider::new();
    let config = HighwayConfig {
        judge: JudgeConfig::for_difficulty(Difficulty::Advanced),
        ..Default::default()
    };
    let mut service = NoteHighwayService::new(config, &tp).unwrap();
    service
        .set_target_notes(vec![note(1, 60.0, 0.0, 200.0), note(2, 62.0, 200.0, 200.0)])
        .unwrap();
    service.start().unwrap();
    for step in 0..=20 {
        let time = f64::from(step) * 50.0;
        let midi = if time < 200.0 { 60.0 } else { 62.0 };
        service.submit_sample(PitchSample::new(time, Some(midi), 1.0));
        tp.advance_ms(50.0);
        service.tick();
    }
    service.stop().unwrap();
    let results = service.get_performance_results();
    assert!(results[&NoteId(1)].hit);
    assert!(results[&NoteId(2)].hit);
}

#[test]
fn test_geometry_tracks_session_time() {
    let tp = MockTimeProvider::new();
    let mut service = service(&tp);
    let target = note(1, 60.0, 2000.0, 500.0);
    service.set_target_notes(vec![target]).unwrap();

    let at_rest = service.note_geometry(&target);
    service.start().unwrap();
    tp.advance_ms(2000.0);
    service.tick();
    let at_line = service.note_geometry(&target);

    assert!(at_line.x < at_rest.x);
    assert!((at_line.x - service.judgment_line_x()).abs() < 1e-9);
    assert_eq!(at_line.y, at_rest.y);
    assert!((service.time_to_x(2000.0) - service.judgment_line_x()).abs() < 1e-9);
    assert_eq!(service.visible_notes().len(), 1);
}

#[test]
fn test_gate_blocks_after_misses() {
    let tp = MockTimeProvider::new();
    let config = HighwayConfig {
        gate: Some(GateConfig {
            trailing_notes: 2,
            required_hit_ratio: 0.5,
            min_sustain_ratio: None,
            gate_points_ms: vec![3000.0],
            withhold_without_evidence: false,
        }),
        ..Default::default()
    };
    let mut service = NoteHighwayService::new(config, &tp).unwrap();
    service
        .set_target_notes(vec![note(1, 60.0, 0.0, 500.0), note(2, 62.0, 1000.0, 500.0)])
        .unwrap();
    service.start().unwrap();
    tp.advance_ms(3000.0);
    service.tick();
    assert_eq!(service.summary().misses, 2);
    assert!(!service.should_advance());
}

proptest! {
    /// Same inputs on the same virtual clock give the same results.
    #[test]
    fn sessions_are_deterministic(readings in prop::collection::vec((1u32..80, 55.0f64..65.0), 1..80)) {
        let run = || {
            let tp = MockTimeProvider::new();
            let mut service = NoteHighwayService::new(HighwayConfig::default(), &tp).unwrap();
            service
                .set_target_notes(vec![note(1, 60.0, 200.0, 800.0), note(2, 62.0, 1200.0, 800.0)])
                .unwrap();
            service.start().unwrap();
            let mut events = Vec::new();
            for &(step, midi) in &readings {
                tp.advance_ms(f64::from(step));
                events.extend(service.tick());
                service.record_pitch_input(Some(midi), 0.9);
            }
            events.extend(service.stop().unwrap());
            (events, service.get_performance_results().clone())
        };
        let (first_events, first_results) = run();
        let (second_events, second_results) = run();
        prop_assert_eq!(first_events, second_events);
        prop_assert_eq!(first_results.len(), 2);
        prop_assert_eq!(first_results, second_results);
    }
}
