use criterion::{Criterion, black_box, criterion_group, criterion_main};
use giztoy_microfrontend::FeatureSession;

fn make_sine(freq_hz: f64, n_samples: usize, sample_rate: usize) -> Vec<i16> {
    (0..n_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (16000.0 * (freq_hz * 2.0 * std::f64::consts::PI * t).sin()) as i16
        })
        .collect()
}

fn bench_session_1s(c: &mut Criterion) {
    let audio = make_sine(440.0, 16000, 16000);

    c.bench_function("microfrontend_1s_10ms_step", |b| {
        b.iter(|| {
            let mut session = FeatureSession::new(16000, 10).unwrap();
            let _ = black_box(session.process_samples(black_box(&audio)));
        });
    });
}

fn bench_streaming_chunks(c: &mut Criterion) {
    let audio = make_sine(1000.0, 16000, 16000);
    let mut session = FeatureSession::new(16000, 10).unwrap();

    c.bench_function("microfrontend_1s_160_sample_chunks", |b| {
        b.iter(|| {
            for chunk in audio.chunks(160) {
                let _ = black_box(session.process_samples(black_box(chunk)));
            }
        });
    });
}

criterion_group!(benches, bench_session_1s, bench_streaming_chunks);
criterion_main!(benches);
