use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use orderbook_manipulation_detector::detector::fingerprint;
use orderbook_manipulation_detector::{
    DetectorConfig, EnhancedManipulationDetector, ManipulationAnalyzer, OrderBook, TradeRecord, TradeSide,
};

fn tick(i: usize) -> (OrderBook, Vec<TradeRecord>) {
    let ts = 1_700_000_000_000 + i as i64 * 500;
    let drift = (i % 7) as f64 * 0.5;
    let bids = (0..25)
        .map(|k| (30_000.0 - drift - k as f64 * 0.5, 0.5 + ((i + k) % 5) as f64 * 0.3))
        .collect();
    let asks = (0..25)
        .map(|k| (30_000.5 - drift + k as f64 * 0.5, 0.5 + ((i + 2 * k) % 5) as f64 * 0.3))
        .collect();
    let trades = (0..4)
        .map(|n| {
            let side = if (i + n) % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell };
            TradeRecord::new(format!("{}-{}", i, n), 30_000.0 - drift, 0.1, side, ts - 50)
        })
        .collect();
    (OrderBook::new(bids, asks, ts), trades)
}

fn bench_enhanced_analyze(c: &mut Criterion) {
    let mut detector = EnhancedManipulationDetector::new(DetectorConfig::default()).unwrap();
    for i in 0..100 {
        let (book, trades) = tick(i);
        detector.analyze(&book, &trades).unwrap();
    }

    let mut i = 100;
    c.bench_function("enhanced_analyze_warm", |b| {
        b.iter_batched(
            || {
                i += 1;
                tick(i)
            },
            |(book, trades)| black_box(detector.analyze(&book, &trades).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let (book, trades) = tick(3);
    c.bench_function("fingerprint_25_levels", |b| {
        b.iter(|| black_box(fingerprint(black_box(&book), black_box(&trades))))
    });
}

criterion_group!(benches, bench_enhanced_analyze, bench_fingerprint);
criterion_main!(benches);
