//! The demo run behind the `ttlmemo` binary
//!
//! Memoizes a slow async computation, requests every key twice and reports which calls
//! were answered from the cache.

use std::io::{self, Write};
use std::time::Duration;

use tracing::info;

use crate::cli::DemoConfig;
use crate::memo::{memoize_async, CacheStats, KeyStrategy};

/// Simulates an expensive lookup for `key`
pub async fn slow_lookup(key: String, work: Duration) -> String {
    tokio::time::sleep(work).await;
    format!("{key}TEST")
}

/// Runs the demo, writing one line per call and a final summary to `out`
pub async fn run<W: Write>(config: &DemoConfig, out: &mut W) -> io::Result<CacheStats> {
    let work = config.work;
    let keys = match &config.resolver_suffix {
        Some(suffix) => {
            let suffix = suffix.clone();
            KeyStrategy::resolver(move |(key,): &(String,)| format!("{key}{suffix}"))
        }
        None => KeyStrategy::canonical(),
    };

    let memoized = memoize_async(
        move |(key,): &(String,)| slow_lookup(key.clone(), work),
        keys,
        config.timeout,
    );
    info!(timeout = ?config.timeout, "starting demo");

    for key in &config.keys {
        for _ in 0..2 {
            let before = memoized.stats();
            let value = memoized.call((key.clone(),)).await;
            let outcome = if memoized.stats().hits > before.hits {
                "hit"
            } else {
                "miss"
            };
            writeln!(out, "{key} => {value} ({outcome})")?;
        }
    }

    let stats = memoized.stats();
    writeln!(out, "hits={} misses={}", stats.hits, stats.misses)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keys: &[&str], resolver_suffix: Option<&str>) -> DemoConfig {
        DemoConfig {
            timeout: Duration::from_secs(100),
            work: Duration::from_millis(10),
            resolver_suffix: resolver_suffix.map(str::to_string),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_hits_and_misses() {
        let mut out = Vec::new();
        let stats = run(&config(&["asd"], None), &mut out).await.unwrap();

        assert_eq!(stats, CacheStats { hits: 1, misses: 1 });
        let output = String::from_utf8(out).unwrap();
        assert_eq!(
            output,
            "asd => asdTEST (miss)\nasd => asdTEST (hit)\nhits=1 misses=1\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resolver_collapses_equal_keys() {
        let mut out = Vec::new();
        let stats = run(&config(&["a", "a", "b"], Some("HAHA")), &mut out).await.unwrap();

        assert_eq!(stats, CacheStats { hits: 4, misses: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_expired_entries_are_recomputed() {
        let mut out = Vec::new();
        let mut demo = config(&["x", "y"], None);
        demo.timeout = Duration::ZERO;

        let stats = run(&demo, &mut out).await.unwrap();
        assert_eq!(stats, CacheStats { hits: 0, misses: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_appends_suffix() {
        assert_eq!(slow_lookup("asd".into(), Duration::from_millis(5000)).await, "asdTEST");
    }
}
