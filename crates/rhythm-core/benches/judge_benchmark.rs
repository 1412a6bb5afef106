use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rhythm_core::{Channel, Judge, JudgeConfig, NoteId, PitchSample, Scheduler, TimedNote};

fn dense_chart(count: u32) -> Vec<TimedNote> {
    (0..count)
        .map(|i| TimedNote {
            id: NoteId(i),
            midi_pitch: 60.0 + f64::from(i % 12),
            start_time_ms: f64::from(i) * 250.0,
            duration_ms: 240.0,
            channel: Channel((i % 2) as u8),
        })
        .collect()
}

fn judge_benchmark(c: &mut Criterion) {
    let notes = dense_chart(512);
    let mut group = c.benchmark_group("judge");

    group.bench_function("accept_sample_60hz", |b| {
        let mut judge = Judge::new(JudgeConfig::default());
        judge.load(&notes);
        let mut t = 0.0;
        b.iter(|| {
            let sample = PitchSample::new(t, Some(61.02), 0.9).on_channel(Channel(0));
            black_box(judge.accept_sample(black_box(sample)));
            t = (t + 16.7) % 128_000.0;
        });
    });

    group.bench_function("full_session_close", |b| {
        b.iter(|| {
            let mut judge = Judge::new(JudgeConfig::default());
            judge.load(&notes);
            let mut t = 0.0;
            while t < 128_000.0 {
                judge.accept_sample(PitchSample::new(t, Some(60.1), 0.9));
                judge.tick(t);
                t += 50.0;
            }
            judge.finalize_all();
            black_box(judge.drain_finalized().len())
        });
    });

    group.finish();
}

fn scheduler_benchmark(c: &mut Criterion) {
    c.bench_function("scheduler_schedule_and_drain", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new(25.0);
            for i in 0..1024u32 {
                let _ = scheduler.schedule(i, f64::from((i * 7919) % 60_000));
            }
            let mut now = 0.0;
            let mut count = 0usize;
            while !scheduler.is_empty() {
                now += 16.7;
                count += scheduler
                    .tick(now, |s| {
                        black_box(s.event);
                        Ok(())
                    })
                    .dispatched;
            }
            black_box(count)
        });
    });
}

criterion_group!(benches, judge_benchmark, scheduler_benchmark);
criterion_main!(benches);
