use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use ctf2bids::ctf::{MarkerClass, MarkerFile, MarkerSample, TrialTiming};
use ctf2bids::{RunNumber, TriggerCorrector};
use ctf2bids::consistency::{check_events, TRIGGER_LABELS};
use ctf2bids::Task;
use std::path::Path;

/// 15 classes × 120 samples, roughly one long test run.
fn synthetic_markers() -> MarkerFile {
    MarkerFile {
        dataset_path: "/data/C03_FGCM_03.ds".into(),
        classes: TRIGGER_LABELS
            .iter()
            .enumerate()
            .map(|(k, l)| MarkerClass {
                group_id: 3,
                name: l.to_string(),
                comment: String::new(),
                color: "blue".into(),
                editable: true,
                class_id: k as i32 + 1,
                samples: (0..120)
                    .map(|i| MarkerSample { trial: 0, time: (i * 15 + k) as f64 * 0.25 })
                    .collect(),
            })
            .collect(),
    }
}

fn bench_parse(c: &mut Criterion) {
    let text = synthetic_markers().render();
    c.bench_function("MarkerFile::parse [15 × 120]", |b| {
        b.iter(|| {
            let m = MarkerFile::parse(black_box(&text), Path::new("MarkerFile.mrk")).unwrap();
            black_box(m.classes.len())
        })
    });
}

fn bench_events_correct_check(c: &mut Criterion) {
    let m = synthetic_markers();
    let timing = TrialTiming { sfreq: 1200.0, samples_per_trial: 1_200_000, pre_trigger: 0 };
    let run = RunNumber::new(3).unwrap();
    let corrector = TriggerCorrector::fgcm();
    c.bench_function("events → correct → check (1800 events)", |b| {
        b.iter(|| {
            let events = m.events(&timing, run, Path::new("MarkerFile.mrk")).unwrap();
            let events = corrector.correct(black_box("C03"), events);
            black_box(check_events(Task::AudioTest, &events).is_consistent())
        })
    });
}

criterion_group!(benches, bench_parse, bench_events_correct_check);
criterion_main!(benches);
