//! Benchmarks for class statistics and parameter resolution

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nearby_perf_harness::config::{RawValue, TestParameters, UserParams};
use nearby_perf_harness::defaults::{UNSET_LATENCY, UNSET_THROUGHPUT_KBPS};
use nearby_perf_harness::models::NcPerformanceTestMetrics;
use nearby_perf_harness::stats::{latency_stats, throughput_stats, ClassStatistics};
use nearby_perf_harness::NearbyConnectionMedium;
use std::hint::black_box;
use std::time::Duration;

/// Latencies with every tenth iteration unreached
fn sample_latencies(count: usize) -> Vec<Duration> {
    (0..count)
        .map(|i| {
            if i % 10 == 0 {
                UNSET_LATENCY
            } else {
                Duration::from_millis(800 + (i as u64 * 37) % 4000)
            }
        })
        .collect()
}

fn sample_throughputs(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            if i % 10 == 0 {
                UNSET_THROUGHPUT_KBPS
            } else {
                8_000.0 + ((i * 7919) % 40_000) as f64
            }
        })
        .collect()
}

fn sample_metrics(count: usize) -> NcPerformanceTestMetrics {
    let mediums = [
        Some(NearbyConnectionMedium::WifiLan),
        Some(NearbyConnectionMedium::WifiDirect),
        Some(NearbyConnectionMedium::WifiHotspot),
        None,
    ];
    NcPerformanceTestMetrics {
        discoverer_wifi_sta_latencies: sample_latencies(count),
        advertiser_wifi_sta_latencies: sample_latencies(count),
        file_transfer_discovery_latencies: sample_latencies(count),
        file_transfer_connection_latencies: sample_latencies(count),
        medium_upgrade_latencies: sample_latencies(count),
        file_transfer_throughputs_kbps: sample_throughputs(count),
        upgraded_wifi_transfer_mediums: (0..count).map(|i| mediums[i % mediums.len()]).collect(),
        ..Default::default()
    }
}

fn bench_series_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_statistics");
    for count in [10usize, 100, 1000] {
        let latencies = sample_latencies(count);
        let throughputs = sample_throughputs(count);
        group.bench_with_input(BenchmarkId::new("latency", count), &latencies, |b, series| {
            b.iter(|| latency_stats(black_box(series)))
        });
        group.bench_with_input(BenchmarkId::new("throughput", count), &throughputs, |b, series| {
            b.iter(|| throughput_stats(black_box(series)))
        });
    }
    group.finish();
}

fn bench_class_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_statistics");
    for count in [10usize, 100] {
        let metrics = sample_metrics(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &metrics, |b, metrics| {
            b.iter(|| ClassStatistics::from_metrics(black_box(metrics)))
        });
    }
    group.finish();
}

fn bench_parameter_resolution(c: &mut Criterion) {
    let mut raw = UserParams::new();
    raw.insert("target_cuj_name".to_string(), RawValue::from("quick_start"));
    raw.insert("fast_fail_on_any_error".to_string(), RawValue::from("True"));
    raw.insert("keep_alive_timeout_ms".to_string(), RawValue::from("30000"));
    raw.insert("wifi_2g_ssid".to_string(), RawValue::from("lab-2g"));
    raw.insert("wifi_2g_password".to_string(), RawValue::from("secret"));
    raw.insert("unknown_key".to_string(), RawValue::from("ignored"));

    c.bench_function("from_user_params", |b| {
        b.iter(|| TestParameters::from_user_params(black_box(&raw)))
    });
}

criterion_group!(
    benches,
    bench_series_statistics,
    bench_class_statistics,
    bench_parameter_resolution
);
criterion_main!(benches);
