//! Critical user journeys
//!
//! A CUJ fixes what one test class measures: the medium under test, the
//! station network, the payload, the repeat policy, the device capabilities
//! it needs and the triage tips it attaches to failures.

use crate::config::TestParameters;
use crate::connection::benchmark::ThroughputProfile;
use crate::defaults;
use crate::device::{CapabilityFlag, CapabilityRequirement};
use crate::error::{AppError, Result};
use crate::executor::RepeatPolicy;
use crate::types::{DeviceRole, NearbyConnectionMedium, NearbyMedium, WifiBand, WifiD2DType};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Name of the negotiated medium as tips print it
pub fn negotiated_medium_name(medium: Option<NearbyConnectionMedium>) -> &'static str {
    medium.map(NearbyConnectionMedium::name).unwrap_or("None")
}

/// First sentence of every throughput tip
pub fn throughput_low_string(measured_kbps: f64, benchmark_kbps: f64) -> String {
    format!(
        "The measured throughput {:.1} is lower than the expected {:.1} KBps",
        measured_kbps, benchmark_kbps
    )
}

/// One test class definition
pub trait CujTestCase: Send + Sync {
    /// Class tag used in records
    fn tag(&self) -> &'static str;

    /// Name of the repeated test
    fn test_name(&self) -> &'static str;

    fn kind(&self) -> CujKind;

    /// Medium the connection is upgraded to for the transfer
    fn upgrade_medium(&self) -> NearbyMedium;

    fn connection_medium(&self) -> NearbyMedium {
        NearbyMedium::BtOnly
    }

    /// Band whose credentials both devices associate with, if any
    fn sta_band(&self) -> Option<WifiBand>;

    /// Station credentials; `None` when the CUJ runs without a STA
    fn wifi_credentials<'a>(&self, params: &'a TestParameters) -> Option<(&'a str, &'a str)> {
        self.sta_band().map(|band| params.sta_credentials(band))
    }

    fn repeat_policy(&self) -> RepeatPolicy;

    fn transfer_file_size_kb(&self) -> u64;

    fn transfer_timeout(&self) -> Duration;

    fn throughput_profile(&self) -> ThroughputProfile;

    fn is_wifi_ap_ready(&self, params: &TestParameters) -> bool;

    fn capability_requirements(&self) -> Vec<CapabilityRequirement> {
        Vec::new()
    }

    fn country_code(&self) -> &'static str {
        defaults::DEFAULT_COUNTRY_CODE
    }

    /// Classes that must never open a prior BT connection
    fn force_disable_bt_multiplex(&self) -> bool {
        false
    }

    fn file_transfer_failure_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String;

    fn throughput_low_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String;

    /// The class's own reason to skip, checked before device capabilities
    fn skip_reason(&self, params: &TestParameters) -> Option<String> {
        if self.is_wifi_ap_ready(params) {
            None
        } else {
            Some("Wifi AP is not ready for this test.".to_string())
        }
    }
}

/// Selectable CUJ classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CujKind {
    Scc2gAllWifiSta,
    Scc5gAllWifiSta,
    BtPerformance,
}

impl CujKind {
    pub const ALL: [CujKind; 3] = [CujKind::Scc2gAllWifiSta, CujKind::Scc5gAllWifiSta, CujKind::BtPerformance];

    /// Command-line name
    pub fn as_str(self) -> &'static str {
        match self {
            CujKind::Scc2gAllWifiSta => "scc-2g-all-wifi",
            CujKind::Scc5gAllWifiSta => "scc-5g-all-wifi",
            CujKind::BtPerformance => "bt",
        }
    }

    pub fn build(self) -> Box<dyn CujTestCase> {
        match self {
            CujKind::Scc2gAllWifiSta => Box::new(Scc2gAllWifiSta),
            CujKind::Scc5gAllWifiSta => Box::new(Scc5gAllWifiSta),
            CujKind::BtPerformance => Box::new(BtPerformance),
        }
    }
}

impl fmt::Display for CujKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CujKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        CujKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<&str> = CujKind::ALL.iter().map(|k| k.as_str()).collect();
                AppError::config(format!("Unknown CUJ '{}', expected one of: {}", s, known.join(", ")))
            })
    }
}

/// Classes to run.
///
/// An explicit selection is taken as-is. Otherwise BT performance always runs
/// and each SCC class runs when its band has credentials or the access point
/// is controlled by the harness.
pub fn select_suite(requested: &[CujKind], params: &TestParameters) -> Vec<Box<dyn CujTestCase>> {
    if !requested.is_empty() {
        return requested.iter().map(|kind| kind.build()).collect();
    }

    let mut suite: Vec<Box<dyn CujTestCase>> = Vec::new();
    if !params.wifi_2g_ssid.is_empty() || params.use_auto_controlled_wifi_ap {
        suite.push(Box::new(Scc2gAllWifiSta));
    }
    if !params.wifi_5g_ssid.is_empty() || params.use_auto_controlled_wifi_ap {
        suite.push(Box::new(Scc5gAllWifiSta));
    }
    suite.push(Box::new(BtPerformance));
    suite
}

/// Wi-Fi upgrade with both devices on a 2G station network
#[derive(Debug, Clone, Copy, Default)]
pub struct Scc2gAllWifiSta;

impl CujTestCase for Scc2gAllWifiSta {
    fn tag(&self) -> &'static str {
        "Scc2gAllWifiStaTest"
    }

    fn test_name(&self) -> &'static str {
        "test_scc_2g_all_wifi_sta"
    }

    fn kind(&self) -> CujKind {
        CujKind::Scc2gAllWifiSta
    }

    fn upgrade_medium(&self) -> NearbyMedium {
        NearbyMedium::UpgradeToAllWifi
    }

    fn sta_band(&self) -> Option<WifiBand> {
        Some(WifiBand::TwoG)
    }

    fn repeat_policy(&self) -> RepeatPolicy {
        RepeatPolicy::scc()
    }

    fn transfer_file_size_kb(&self) -> u64 {
        defaults::TRANSFER_FILE_SIZE_20MB_KB
    }

    fn transfer_timeout(&self) -> Duration {
        defaults::WIFI_2G_20M_PAYLOAD_TRANSFER_TIMEOUT
    }

    fn throughput_profile(&self) -> ThroughputProfile {
        ThroughputProfile::Wifi {
            d2d_type: WifiD2DType::Scc2g,
            is_dbs_mode: false,
        }
    }

    fn is_wifi_ap_ready(&self, params: &TestParameters) -> bool {
        !params.sta_credentials(WifiBand::TwoG).0.is_empty()
    }

    fn file_transfer_failure_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "The upgraded wifi medium {} might be broken, check the related log; Or {}",
            negotiated_medium_name(negotiated),
            self.throughput_low_tip(negotiated, low_string)
        )
    }

    fn throughput_low_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "{}. The upgraded medium is {}, this is a 2G SCC case. Check with the wifi chip vendor \
             for any FW issue in this mode.",
            low_string,
            negotiated_medium_name(negotiated)
        )
    }
}

/// Wi-Fi upgrade with both devices on a 5G station network
#[derive(Debug, Clone, Copy, Default)]
pub struct Scc5gAllWifiSta;

impl CujTestCase for Scc5gAllWifiSta {
    fn tag(&self) -> &'static str {
        "Scc5gAllWifiStaTest"
    }

    fn test_name(&self) -> &'static str {
        "test_scc_5g_all_wifi_sta"
    }

    fn kind(&self) -> CujKind {
        CujKind::Scc5gAllWifiSta
    }

    fn upgrade_medium(&self) -> NearbyMedium {
        NearbyMedium::UpgradeToAllWifi
    }

    fn sta_band(&self) -> Option<WifiBand> {
        Some(WifiBand::FiveG)
    }

    fn repeat_policy(&self) -> RepeatPolicy {
        RepeatPolicy::scc()
    }

    fn transfer_file_size_kb(&self) -> u64 {
        defaults::TRANSFER_FILE_SIZE_500MB_KB
    }

    fn transfer_timeout(&self) -> Duration {
        defaults::WIFI_500M_PAYLOAD_TRANSFER_TIMEOUT
    }

    fn throughput_profile(&self) -> ThroughputProfile {
        ThroughputProfile::Wifi {
            d2d_type: WifiD2DType::Scc5g,
            is_dbs_mode: false,
        }
    }

    fn is_wifi_ap_ready(&self, params: &TestParameters) -> bool {
        !params.sta_credentials(WifiBand::FiveG).0.is_empty()
    }

    fn capability_requirements(&self) -> Vec<CapabilityRequirement> {
        vec![
            CapabilityRequirement::new(DeviceRole::SourceDevice, CapabilityFlag::Supports5g, true),
            CapabilityRequirement::new(DeviceRole::TargetDevice, CapabilityFlag::Supports5g, true),
        ]
    }

    fn file_transfer_failure_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "The upgraded wifi medium {} might be broken, check the related log; Or {}",
            negotiated_medium_name(negotiated),
            self.throughput_low_tip(negotiated, low_string)
        )
    }

    fn throughput_low_tip(&self, negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "{}. The upgraded medium is {}, this is a 5G SCC case. Check if the D2D link is on the \
             same 80MHz channel as the STA and with the wifi chip vendor for any FW issue in this mode.",
            low_string,
            negotiated_medium_name(negotiated)
        )
    }
}

/// Classic BT transfer without an upgrade or a station network
#[derive(Debug, Clone, Copy, Default)]
pub struct BtPerformance;

impl CujTestCase for BtPerformance {
    fn tag(&self) -> &'static str {
        "BtPerformanceTest"
    }

    fn test_name(&self) -> &'static str {
        "test_bt_performance"
    }

    fn kind(&self) -> CujKind {
        CujKind::BtPerformance
    }

    fn upgrade_medium(&self) -> NearbyMedium {
        NearbyMedium::BtOnly
    }

    fn sta_band(&self) -> Option<WifiBand> {
        None
    }

    fn repeat_policy(&self) -> RepeatPolicy {
        RepeatPolicy::bt()
    }

    fn transfer_file_size_kb(&self) -> u64 {
        defaults::TRANSFER_FILE_SIZE_1MB_KB
    }

    fn transfer_timeout(&self) -> Duration {
        defaults::BT_1M_PAYLOAD_TRANSFER_TIMEOUT
    }

    fn throughput_profile(&self) -> ThroughputProfile {
        ThroughputProfile::ClassicBt
    }

    fn is_wifi_ap_ready(&self, _params: &TestParameters) -> bool {
        true
    }

    fn force_disable_bt_multiplex(&self) -> bool {
        true
    }

    fn file_transfer_failure_tip(&self, _negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "The classic BT connection might be broken, check the related log; Or {}",
            self.throughput_low_tip(None, low_string)
        )
    }

    fn throughput_low_tip(&self, _negotiated: Option<NearbyConnectionMedium>, low_string: &str) -> String {
        format!(
            "{}. This is a classic BT case. Check the BT and Wi-Fi coexistence settings and the BT \
             chip FW.",
            low_string
        )
    }
}
