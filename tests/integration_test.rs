mod common;

use common::{ladder_book, random_tick, spoof_sequence, Lcg, BASE_TS};
use orderbook_manipulation_detector::detector::{BatchItem, DetectorPool};
use orderbook_manipulation_detector::telemetry::DetectionLogger;
use orderbook_manipulation_detector::{
    CachedManipulationDetector, DetectorConfig, DetectorError, ManipulationAnalyzer, ManipulationType, OrderBook,
    PoolConfig, Severity,
};

fn pool(size: usize) -> DetectorPool {
    let config = PoolConfig {
        pool_size: size,
        ..Default::default()
    };
    DetectorPool::new(DetectorConfig::default(), &config).unwrap()
}

#[test]
fn test_cold_start_through_pool() {
    let pool = pool(2);
    for i in 0..9 {
        let result = pool.analyze("BTCUSDT", &ladder_book(i, None), &[]).unwrap();
        assert_eq!(result.overall_likelihood, 0.0);
        assert_eq!(result.manipulation_type, ManipulationType::None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.severity, Severity::None);
    }

    let warm = pool.analyze("BTCUSDT", &ladder_book(9, None), &[]).unwrap();
    assert!(warm.confidence > 0.0);

    println!("✅ Cold start gate verified");
}

#[test]
fn test_cached_result_is_identical_and_faster() {
    let mut detector =
        CachedManipulationDetector::enhanced(DetectorConfig::default(), DetectionLogger::new("idempotence")).unwrap();

    let sequence = spoof_sequence(0.0);
    let mut last = None;
    for (book, trades) in &sequence {
        last = Some(detector.analyze(book, trades).unwrap());
    }
    let fresh = last.unwrap();
    let (book, trades) = sequence.last().unwrap();
    let repeat = detector.analyze(book, trades).unwrap();

    assert!(!fresh.cached);
    assert!(repeat.cached);
    assert_eq!(repeat.overall_likelihood, fresh.overall_likelihood);
    assert_eq!(repeat.manipulation_type, fresh.manipulation_type);
    assert_eq!(repeat.confidence, fresh.confidence);
    assert_eq!(repeat.spoofing, fresh.spoofing);
    assert_eq!(repeat.layering, fresh.layering);
    assert_eq!(detector.snapshot_count(), sequence.len());
    assert!(
        repeat.performance.analysis_time_ms < fresh.performance.analysis_time_ms,
        "hit {}ms vs miss {}ms",
        repeat.performance.analysis_time_ms,
        fresh.performance.analysis_time_ms
    );

    println!("✅ Cache idempotence verified");
}

#[test]
fn test_pool_routing_stable_across_calls() {
    let pool = pool(4);
    let expected = pool.detector_id("SOLUSDT");

    for i in 0..100 {
        assert_eq!(pool.detector_id("SOLUSDT"), expected);
        pool.analyze("SOLUSDT", &ladder_book(i, None), &[]).unwrap();
    }

    let stats = pool.stats();
    let owner = &stats.detectors[expected];
    assert_eq!(owner.detector_id, expected);
    assert_eq!(owner.assigned_symbols, vec!["SOLUSDT".to_string()]);
    assert_eq!(owner.total_analyses, 100);
    assert!(stats
        .detectors
        .iter()
        .filter(|d| d.detector_id != expected)
        .all(|d| d.total_analyses == 0));
}

#[test]
fn test_symbols_keep_separate_histories() {
    let pool = pool(1);
    for i in 0..12 {
        pool.analyze("AAAUSDT", &ladder_book(i, None), &[]).unwrap();
    }
    let other = pool.analyze("BBBUSDT", &ladder_book(0, None), &[]).unwrap();
    assert_eq!(other.snapshots_analyzed, 1);
    assert_eq!(other.confidence, 0.0);
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let pool = pool(3);
    let poisoned = OrderBook::new(vec![(f64::NAN, 1.0)], vec![(50_001.0, 1.0)], BASE_TS);

    let items = vec![
        BatchItem::new("BTCUSDT", ladder_book(0, None), vec![]),
        BatchItem::new("ETHUSDT", poisoned, vec![]),
        BatchItem::new("SOLUSDT", ladder_book(1, None), vec![]),
        BatchItem::new("XRPUSDT", ladder_book(2, None), vec![]),
    ];
    let results = pool.batch_analyze(items).await;

    assert_eq!(results.len(), 4);
    assert!(matches!(results["ETHUSDT"], Err(DetectorError::InvalidData(_))));
    for symbol in ["BTCUSDT", "SOLUSDT", "XRPUSDT"] {
        let result = results[symbol].as_ref().unwrap();
        assert_eq!(result.snapshots_analyzed, 1);
    }

    println!("✅ Batch isolation verified");
}

#[tokio::test]
async fn test_batch_accumulates_per_symbol_state() {
    let pool = pool(2);
    for i in 0..12 {
        let items = vec![
            BatchItem::new("BTCUSDT", ladder_book(i, None), vec![]),
            BatchItem::new("ETHUSDT", ladder_book(i + 1, None), vec![]),
        ];
        let results = pool.batch_analyze(items).await;
        let btc = results["BTCUSDT"].as_ref().unwrap();
        assert_eq!(btc.snapshots_analyzed, i + 1);
    }
    assert_eq!(pool.stats().total_symbols, 2);
    assert_eq!(pool.stats().total_analyses, 24);
}

#[test]
fn test_all_scores_stay_bounded() {
    let mut rng = Lcg::new(42);
    let pool = pool(2);

    for i in 0..150 {
        let (book, trades) = random_tick(&mut rng, i);
        let result = pool.analyze("NOISE", &book, &trades).unwrap();

        assert!((0.0..=1.0).contains(&result.overall_likelihood));
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.severity, Severity::from_likelihood(result.overall_likelihood));
        for pattern in result.patterns() {
            assert!(
                (0.0..=1.0).contains(&pattern.likelihood),
                "{} out of range: {}",
                pattern.pattern,
                pattern.likelihood
            );
        }
    }
}
