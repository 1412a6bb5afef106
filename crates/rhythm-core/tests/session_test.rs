use rhythm_core::{
    Channel, Chart, ChartNote, GateConfig, JudgeConfig, Meter, MockTimeProvider, NoteId,
    NotePerformance, PitchSample, Referee, RefereeConfig, SessionEvent, SessionState, TempoMap,
    to_timed_events,
};

fn one_note_chart() -> Chart {
    Chart {
        meter: Meter::default(),
        notes: vec![ChartNote {
            id: NoteId(1),
            midi_pitch: 60.0,
            start_beat: 2.0,
            duration_beats: 1.0,
            channel: Channel(0),
        }],
        length_beats: Some(4.0),
    }
}

fn finalized(events: &[SessionEvent]) -> Vec<NotePerformance> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::NoteFinalized(p) => Some(*p),
            _ => None,
        })
        .collect()
}

#[test]
fn test_chart_to_scored_note() {
    let tempo = TempoMap::constant(120.0).unwrap();
    let timeline = to_timed_events(&one_note_chart(), &tempo).unwrap();
    assert_eq!(timeline.notes[0].start_time_ms, 1000.0);
    assert_eq!(timeline.notes[0].duration_ms, 500.0);
    assert_eq!(timeline.beats.len(), 5);

    let tp = MockTimeProvider::new();
    let mut referee = Referee::new(RefereeConfig::default(), &tp);
    referee.set_timeline(timeline).unwrap();
    referee.start().unwrap();

    // 20 Hz over the note, 5 cents sharp
    for _ in 0..40 {
        tp.advance_ms(50.0);
        referee.tick();
        let now = referee.now_ms().unwrap();
        if (1000.0..1500.0).contains(&now) {
            assert!(referee.record_pitch(Channel(0), Some(60.05), 0.9));
        }
    }

    let events = referee.drain_events();
    let beats = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Beat(_)))
        .count();
    assert_eq!(beats, 5);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::NoteStarted { note_id: NoteId(1), .. }
    )));

    let records = finalized(&events);
    assert_eq!(records.len(), 1);
    let record = records[0];
    assert!(record.hit);
    assert!((record.accuracy_cents.unwrap() - 5.0).abs() < 1e-6);
    assert_eq!(record.timing_offset_ms, Some(0.0));
    assert!((record.sampled_duration_ratio - 1.0).abs() < 1e-9);
}

#[test]
fn test_silent_note_is_a_miss_after_stop() {
    let tp = MockTimeProvider::new();
    let mut referee = Referee::new(RefereeConfig::default(), &tp);
    let timeline = to_timed_events(&one_note_chart(), &TempoMap::constant(120.0).unwrap()).unwrap();
    referee.set_timeline(timeline).unwrap();
    referee.start().unwrap();
    tp.advance_ms(1100.0);
    referee.tick();
    referee.stop().unwrap();

    let records = finalized(&referee.drain_events());
    assert_eq!(records.len(), 1);
    assert!(!records[0].hit);
    assert_eq!(records[0].accuracy_cents, None);
    assert_eq!(records[0].sampled_duration_ratio, 0.0);
}

#[test]
fn test_detector_samples_stamped_while_paused_still_count() {
    let tp = MockTimeProvider::new();
    let mut referee = Referee::new(RefereeConfig::default(), &tp);
    let timeline = to_timed_events(&one_note_chart(), &TempoMap::constant(120.0).unwrap()).unwrap();
    referee.set_timeline(timeline).unwrap();
    referee.start().unwrap();
    tp.advance_ms(1300.0);
    referee.pause().unwrap();

    let late = PitchSample::new(1250.0, Some(60.0), 1.0);
    assert!(referee.submit_sample(late));
    referee.stop().unwrap();
    assert!(!referee.submit_sample(late));

    let records = finalized(&referee.drain_events());
    assert_eq!(records[0].timing_offset_ms, Some(250.0));
}

#[test]
fn test_reset_allows_replay() {
    let tp = MockTimeProvider::new();
    let mut referee = Referee::new(RefereeConfig::default(), &tp);
    let timeline = to_timed_events(&one_note_chart(), &TempoMap::constant(120.0).unwrap()).unwrap();
    referee.set_timeline(timeline).unwrap();

    referee.start().unwrap();
    tp.advance_ms(5000.0);
    referee.tick();
    referee.stop().unwrap();
    referee.reset().unwrap();
    referee.drain_events();

    assert_eq!(referee.state(), SessionState::Idle);
    assert_eq!(referee.now_ms(), None);
    referee.start().unwrap();
    assert_eq!(referee.now_ms(), Some(0.0));
    assert_eq!(referee.snapshot().open_notes, 1);
}

#[test]
fn test_gate_follows_finalized_notes() {
    let tp = MockTimeProvider::new();
    let config = RefereeConfig {
        judge: JudgeConfig::default(),
        gate: Some(GateConfig {
            trailing_notes: 1,
            required_hit_ratio: 1.0,
            min_sustain_ratio: None,
            gate_points_ms: vec![2000.0],
            withhold_without_evidence: false,
        }),
        ..Default::default()
    };
    let mut referee = Referee::new(config, &tp);
    let timeline = to_timed_events(&one_note_chart(), &TempoMap::constant(120.0).unwrap()).unwrap();
    referee.set_timeline(timeline).unwrap();
    referee.start().unwrap();

    tp.advance_ms(1900.0);
    referee.tick();
    assert!(referee.should_advance());

    tp.advance_ms(200.0);
    referee.tick();
    assert_eq!(referee.gate().and_then(|g| g.trailing_hit_ratio()), Some(0.0));
    assert!(!referee.should_advance());
}
