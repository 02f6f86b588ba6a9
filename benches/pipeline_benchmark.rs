use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};

use memorease::hashing::{rotation_fingerprints, DctFingerprinter, ImageFingerprinter};
use memorease::naming::FilenameNormalizer;

/// Typical names pulled from a phone camera folder
fn sample_names() -> Vec<String> {
    let mut names = Vec::new();
    for i in 0..100 {
        names.push(format!("IMG_2024091323{:04}.jpg", i));
        names.push(format!("Screenshot_2024-09-13_10-{:02}.jpg", i % 60));
        names.push(format!("holiday 2024-07-{:02}.mp4", i % 28 + 1));
        names.push(format!("DSC_{:04}.jpg", i));
    }
    names
}

fn synthetic_image(size: u32, seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        let v = ((x * 7 + y * 13 + seed * 31) % 256) as u8;
        Rgb([v, v.wrapping_mul(3), 255 - v])
    }))
}

fn benchmark_normalizer(c: &mut Criterion) {
    let names = sample_names();
    let normalizer = FilenameNormalizer::new();
    let siblings: Vec<String> = (1..50).map(|i| format!("VID20240714_N{:04}.mp4", i)).collect();

    c.bench_function("normalize-400-names", |b| {
        b.iter(|| {
            names
                .iter()
                .map(|name| normalizer.normalize(black_box(name), &siblings))
                .count()
        })
    });
}

fn benchmark_fingerprints(c: &mut Criterion) {
    let fingerprinter = DctFingerprinter::new();

    let mut group = c.benchmark_group("Perceptual Fingerprint");
    group.sample_size(20);

    for size in [256u32, 1024].iter() {
        let image = synthetic_image(*size, 1);

        group.bench_with_input(BenchmarkId::new("upright", size), size, |b, _| {
            b.iter(|| fingerprinter.fingerprint(black_box(&image)))
        });

        group.bench_with_input(BenchmarkId::new("four-rotations", size), size, |b, _| {
            b.iter(|| rotation_fingerprints(&fingerprinter, black_box(&image)))
        });
    }

    group.finish();
}

/// Linear scan cost of the retained set, as done per candidate during dedup
fn benchmark_retained_scan(c: &mut Criterion) {
    let fingerprinter = DctFingerprinter::new();
    let retained: Vec<_> = (0..200)
        .map(|seed| fingerprinter.fingerprint(&synthetic_image(64, seed)))
        .collect();
    let candidate = rotation_fingerprints(&fingerprinter, &synthetic_image(64, 999));

    c.bench_function("scan-200-retained", |b| {
        b.iter(|| {
            retained.iter().position(|prior| {
                candidate
                    .iter()
                    .any(|hash| fingerprinter.distance(hash, prior) <= 2)
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_normalizer,
    benchmark_fingerprints,
    benchmark_retained_scan
);
criterion_main!(benches);
