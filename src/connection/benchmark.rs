//! Minimum expected file transfer throughput
//!
//! The benchmark is derived from the weaker device's PHY rate and stream
//! count, the D2D band, SCC/MCC operation, DBS, the advertiser's STA link and
//! the medium the stack actually upgraded to.

use crate::defaults;
use crate::device::{DeviceCapabilities, WifiConnectionInfo};
use crate::types::{NearbyConnectionMedium, WifiD2DType};

const BITS_PER_BYTE: f64 = 8.0;

/// How the expected throughput of a test class is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputProfile {
    /// Wi-Fi D2D medium
    Wifi { d2d_type: WifiD2DType, is_dbs_mode: bool },
    ClassicBt,
    Ble,
}

/// Everything the benchmark depends on besides the profile
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkInputs<'a> {
    pub discoverer: &'a DeviceCapabilities,
    pub advertiser: &'a DeviceCapabilities,
    /// Advertiser STA association; `-1` fields when not associated
    pub advertiser_sta: WifiConnectionInfo,
    pub negotiated_medium: Option<NearbyConnectionMedium>,
}

/// Breakdown of a computed benchmark, logged with every Wi-Fi trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Benchmark {
    pub max_phy_rate_mbps: u32,
    pub min_throughput_mbyte_per_sec: u64,
}

impl Benchmark {
    pub fn kbyte_per_sec(&self) -> u64 {
        self.min_throughput_mbyte_per_sec * 1024
    }
}

fn scaled(value: u64, factor: f64) -> u64 {
    (value as f64 * factor) as u64
}

/// Wi-Fi benchmark in MB/s
pub fn wifi_benchmark(d2d_type: WifiD2DType, is_dbs_mode: bool, inputs: &BenchmarkInputs<'_>) -> Benchmark {
    let mut max_num_streams = inputs
        .discoverer
        .max_num_streams
        .min(inputs.advertiser.max_num_streams);

    if d2d_type.is_2g_d2d() {
        let max_phy_rate_mbps = inputs
            .discoverer
            .max_phy_rate_2g_mbps
            .min(inputs.advertiser.max_phy_rate_2g_mbps)
            .min(max_num_streams * defaults::MAX_PHY_RATE_PER_STREAM_N_20_MBPS);
        let min_throughput = (f64::from(max_phy_rate_mbps) * defaults::MAX_PHY_RATE_TO_MIN_THROUGHPUT_RATIO_2G
            / BITS_PER_BYTE) as u64;
        return Benchmark {
            max_phy_rate_mbps,
            min_throughput_mbyte_per_sec: min_throughput,
        };
    }

    let mut max_phy_rate_mbps = inputs
        .discoverer
        .max_phy_rate_5g_mbps
        .min(inputs.advertiser.max_phy_rate_5g_mbps);
    if is_dbs_mode {
        max_num_streams = inputs.advertiser.max_num_streams_dbs;
    }
    let max_phy_rate_ac80 = max_num_streams * defaults::MAX_PHY_RATE_PER_STREAM_AC_80_MBPS;
    max_phy_rate_mbps = max_phy_rate_mbps.min(max_phy_rate_ac80);

    // STA on a 5G channel narrower than 80 MHz caps the D2D link at AC 40
    let sta = inputs.advertiser_sta;
    if sta.frequency_mhz > 5000
        && sta.max_supported_tx_link_speed_mbps > 0
        && sta.max_supported_tx_link_speed_mbps < i64::from(max_phy_rate_ac80)
    {
        max_phy_rate_mbps = max_phy_rate_mbps.min(max_num_streams * defaults::MAX_PHY_RATE_PER_STREAM_AC_40_MBPS);
    }

    let mut min_throughput =
        (f64::from(max_phy_rate_mbps) * defaults::MAX_PHY_RATE_TO_MIN_THROUGHPUT_RATIO_5G / BITS_PER_BYTE) as u64;
    if d2d_type.is_mcc() {
        min_throughput = scaled(min_throughput, defaults::MCC_THROUGHPUT_MULTIPLIER);
    }
    match inputs.negotiated_medium {
        Some(NearbyConnectionMedium::WifiHotspot) => {
            min_throughput = scaled(min_throughput, defaults::WIFI_HOTSPOT_THROUGHPUT_MULTIPLIER);
        }
        Some(NearbyConnectionMedium::WifiLan) => {
            min_throughput = min_throughput.min(defaults::WIFI_LAN_MAX_THROUGHPUT_MBPS);
        }
        _ => {}
    }

    Benchmark {
        max_phy_rate_mbps,
        min_throughput_mbyte_per_sec: min_throughput,
    }
}

impl ThroughputProfile {
    /// Expected minimum throughput in KB/s
    pub fn benchmark_kbps(&self, inputs: &BenchmarkInputs<'_>) -> f64 {
        match *self {
            ThroughputProfile::Wifi { d2d_type, is_dbs_mode } => {
                wifi_benchmark(d2d_type, is_dbs_mode, inputs).kbyte_per_sec() as f64
            }
            ThroughputProfile::ClassicBt => defaults::CLASSIC_BT_MEDIUM_THROUGHPUT_BENCHMARK_KBPS,
            ThroughputProfile::Ble => defaults::BLE_MEDIUM_THROUGHPUT_BENCHMARK_KBPS,
        }
    }

    /// Whether the benchmark reads the advertiser's STA link
    pub fn needs_sta_info(&self) -> bool {
        matches!(self, ThroughputProfile::Wifi { .. })
    }
}
