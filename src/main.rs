use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use orderbook_manipulation_detector::config::Config;
use orderbook_manipulation_detector::detector::{BatchItem, DetectorPool};
use orderbook_manipulation_detector::telemetry::init_logging;
use orderbook_manipulation_detector::Severity;

/// Lines analyzed together per `batch_analyze` call.
const BATCH_SIZE: usize = 64;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config.logging.level, config.logging.json);

    info!("🚀 Order book manipulation replay starting...");
    info!("✅ Configuration loaded");
    info!("   Pool size: {}", config.pool.pool_size);
    info!(
        "   History: {} snapshots / {} trades",
        config.detector.history.max_snapshots, config.detector.history.trade_history_size
    );
    info!("   Cache TTL: {}s", config.detector.cache.cache_ttl_seconds);

    let pool = DetectorPool::new(config.detector.clone(), &config.pool)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut batch: Vec<BatchItem> = Vec::with_capacity(BATCH_SIZE);
    let mut line_no = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<BatchItem>(&line) {
                    Ok(mut item) => {
                        // Unstamped books take the ingest wall clock.
                        if item.orderbook.timestamp == 0 {
                            item.orderbook.timestamp = Utc::now().timestamp_millis();
                        }
                        batch.push(item);
                    }
                    Err(e) => warn!(line = line_no, "Skipping malformed input: {}", e),
                }
                // Same-symbol ticks must stay ordered, so a batch never holds one symbol twice.
                let repeated = batch
                    .last()
                    .map(|last| batch[..batch.len() - 1].iter().any(|item| item.symbol == last.symbol))
                    .unwrap_or(false);
                if repeated || batch.len() >= BATCH_SIZE {
                    let held = if repeated { batch.pop() } else { None };
                    flush(&pool, &mut batch).await?;
                    batch.extend(held);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    flush(&pool, &mut batch).await?;

    let stats = pool.stats();
    info!(
        symbols = stats.total_symbols,
        analyses = stats.total_analyses,
        cache_hit_rate = stats.cache_hit_rate,
        avg_analysis_time_ms = stats.avg_analysis_time_ms,
        "✅ Replay finished"
    );
    Ok(())
}

/// Analyze everything buffered and print one JSON line per symbol.
async fn flush(pool: &DetectorPool, batch: &mut Vec<BatchItem>) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let order: Vec<String> = batch.iter().map(|item| item.symbol.clone()).collect();
    let mut results = pool.batch_analyze(std::mem::take(batch)).await;

    for symbol in order {
        let Some(outcome) = results.remove(&symbol) else {
            continue;
        };
        match outcome {
            Ok(result) => {
                if result.severity >= Severity::Low {
                    warn!(
                        symbol = %symbol,
                        severity = result.severity.as_str(),
                        manipulation = result.manipulation_type.as_str(),
                        likelihood = result.overall_likelihood,
                        "Manipulation suspected"
                    );
                }
                let line = serde_json::json!({ "symbol": symbol, "result": result });
                println!("{}", serde_json::to_string(&line)?);
            }
            Err(e) => {
                let line = serde_json::json!({ "symbol": symbol, "error": e.to_string() });
                println!("{}", serde_json::to_string(&line)?);
            }
        }
    }
    Ok(())
}
