//! Enumerations shared across the harness
//!
//! Every enum here has a stable numeric code. Codes of
//! [`NearbyConnectionMedium`] are a wire contract with the device-side
//! connection stack (`BandwidthInfo.Medium`) and must never be renumbered.
//! Values serialize by name and deserialize from either the name or the code,
//! so testbed files may use `advertising_discovery_medium: 2` or
//! `advertising_discovery_medium: BLE_ONLY`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Either representation a coded enum accepts on input
#[derive(Deserialize)]
#[serde(untagged)]
enum CodeOrName {
    Code(i64),
    Name(String),
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $code ),+
        }

        impl $name {
            /// All variants in code order
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Stable numeric code
            pub fn code(self) -> i64 {
                self as i64
            }

            /// Upper-case name used in reports
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl TryFrom<i64> for $name {
            type Error = AppError;

            fn try_from(code: i64) -> Result<Self> {
                match code {
                    $( $code => Ok($name::$variant), )+
                    other => Err(AppError::parse(format!(
                        "{} has no value with code {}", stringify!($name), other
                    ))),
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim().to_ascii_uppercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == wanted)
                    .ok_or_else(|| AppError::parse(format!(
                        "{} has no value named '{}'", stringify!($name), s
                    )))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let parsed = match CodeOrName::deserialize(deserializer)? {
                    CodeOrName::Code(code) => $name::try_from(code),
                    CodeOrName::Name(name) => name.parse(),
                };
                parsed.map_err(serde::de::Error::custom)
            }
        }
    };
}

coded_enum! {
    /// Payload kinds the agent can send
    pub enum PayloadType {
        File = 2 => "FILE",
        Stream = 3 => "STREAM",
    }
}

coded_enum! {
    /// Requested medium for discovery, advertising, connection and upgrade
    pub enum NearbyMedium {
        Auto = 0 => "AUTO",
        BtOnly = 1 => "BT_ONLY",
        BleOnly = 2 => "BLE_ONLY",
        WifiLanOnly = 3 => "WIFILAN_ONLY",
        WifiAwareOnly = 4 => "WIFIAWARE_ONLY",
        UpgradeToWebRtc = 5 => "UPGRADE_TO_WEBRTC",
        UpgradeToWifiHotspot = 6 => "UPGRADE_TO_WIFIHOTSPOT",
        UpgradeToWifiDirect = 7 => "UPGRADE_TO_WIFIDIRECT",
        BleL2capOnly = 8 => "BLE_L2CAP_ONLY",
        /// WIFI_LAN, WIFI_HOTSPOT and WIFI_DIRECT, whichever succeeds
        UpgradeToAllWifi = 9 => "UPGRADE_TO_ALL_WIFI",
    }
}

impl NearbyMedium {
    /// Mediums that require an upgrade step after the BT/BLE connection
    pub fn is_high_quality(self) -> bool {
        matches!(
            self,
            NearbyMedium::WifiLanOnly
                | NearbyMedium::WifiAwareOnly
                | NearbyMedium::UpgradeToWebRtc
                | NearbyMedium::UpgradeToWifiHotspot
                | NearbyMedium::UpgradeToWifiDirect
                | NearbyMedium::UpgradeToAllWifi
        )
    }
}

coded_enum! {
    /// Medium the connection stack actually negotiated.
    ///
    /// Codes 1 (MDNS) and 10 are reserved on the device side.
    pub enum NearbyConnectionMedium {
        Unknown = 0 => "UNKNOWN",
        Bluetooth = 2 => "BLUETOOTH",
        WifiHotspot = 3 => "WIFI_HOTSPOT",
        Ble = 4 => "BLE",
        WifiLan = 5 => "WIFI_LAN",
        WifiAware = 6 => "WIFI_AWARE",
        Nfc = 7 => "NFC",
        WifiDirect = 8 => "WIFI_DIRECT",
        WebRtc = 9 => "WEB_RTC",
        Usb = 11 => "USB",
    }
}

coded_enum! {
    /// How the upgrade interacts with the existing BT/BLE channel
    pub enum MediumUpgradeType {
        Default = 0 => "DEFAULT",
        Disruptive = 1 => "DISRUPTIVE",
        NonDisruptive = 2 => "NON_DISRUPTIVE",
    }
}

coded_enum! {
    /// Wi-Fi D2D channel arrangement relative to the STA link
    pub enum WifiD2DType {
        Scc2g = 0 => "SCC_2G",
        Scc5g = 1 => "SCC_5G",
        Mcc2gWfd5gSta = 2 => "MCC_2G_WFD_5G_STA",
        Mcc2gWfd5gIndoorSta = 3 => "MCC_2G_WFD_5G_INDOOR_STA",
        Mcc5gWfd5gDfsSta = 4 => "MCC_5G_WFD_5G_DFS_STA",
        Mcc5gHs5gDfsSta = 5 => "MCC_5G_HS_5G_DFS_STA",
    }
}

impl WifiD2DType {
    /// Station and D2D links run on different channels
    pub fn is_mcc(self) -> bool {
        !matches!(self, WifiD2DType::Scc2g | WifiD2DType::Scc5g)
    }

    /// The D2D link itself runs on 2.4 GHz
    pub fn is_2g_d2d(self) -> bool {
        matches!(
            self,
            WifiD2DType::Scc2g | WifiD2DType::Mcc2gWfd5gSta | WifiD2DType::Mcc2gWfd5gIndoorSta
        )
    }
}

coded_enum! {
    /// Failure taxonomy of a single iteration, in phase order
    pub enum SingleTestFailureReason {
        Uninitialized = 0 => "UNINITIALIZED",
        SourceStartDiscovery = 1 => "SOURCE_START_DISCOVERY",
        TargetStartAdvertising = 2 => "TARGET_START_ADVERTISING",
        SourceRequestConnection = 3 => "SOURCE_REQUEST_CONNECTION",
        TargetAcceptConnection = 4 => "TARGET_ACCEPT_CONNECTION",
        WifiMediumUpgrade = 5 => "WIFI_MEDIUM_UPGRADE",
        FileTransferFail = 6 => "FILE_TRANSFER_FAIL",
        FileTransferThroughputLow = 7 => "FILE_TRANSFER_THROUGHPUT_LOW",
        SourceWifiConnection = 8 => "SOURCE_WIFI_CONNECTION",
        TargetWifiConnection = 9 => "TARGET_WIFI_CONNECTION",
        ApIsNotConfigured = 10 => "AP_IS_NOT_CONFIGURED",
        Success = 11 => "SUCCESS",
    }
}

impl SingleTestFailureReason {
    pub fn is_success(self) -> bool {
        self == SingleTestFailureReason::Success
    }

    /// Generic triage tip; `None` for reasons that need a tailored tip
    pub fn common_triage_tip(self) -> Option<&'static str> {
        let tip = match self {
            SingleTestFailureReason::Uninitialized => {
                "not executed, the whole test was exited earlier; the devices may be \
                 disconnected from the host, abnormal things, such as system crash, \
                 the snippet was killed; Or something wrong with the script, check \
                 the test running log and the corresponding bugreport log."
            }
            SingleTestFailureReason::Success => "success!",
            SingleTestFailureReason::SourceStartDiscovery => {
                "The source device can not start BLE scan."
            }
            SingleTestFailureReason::TargetStartAdvertising => {
                "The target device can not start BLE advertising."
            }
            SingleTestFailureReason::SourceRequestConnection => {
                "The source device can not request connection to the target device through BLE."
            }
            SingleTestFailureReason::TargetAcceptConnection => {
                "The target device can not accept the connection through BLE."
            }
            SingleTestFailureReason::SourceWifiConnection => {
                "The source device can not connect to the wifi network. \
                 1) Check if the wifi ssid or password is correct;\
                 2) Try to remove any saved wifi network from wifi settings;\
                 3) Check if other device can connect to the same AP\
                 4) Check the wifi related log on the source device."
            }
            SingleTestFailureReason::TargetWifiConnection => {
                "1) Check if the wifi ssid or password is correct;\
                 2) Try to remove any saved wifi network from wifi settings;\
                 3) Check if other device can connect to the same AP\
                 4) Check the wifi related log on the target device."
            }
            SingleTestFailureReason::ApIsNotConfigured => {
                "The test AP is not set correctly in the test configuration file."
            }
            SingleTestFailureReason::WifiMediumUpgrade
            | SingleTestFailureReason::FileTransferFail
            | SingleTestFailureReason::FileTransferThroughputLow => return None,
        };
        Some(tip)
    }
}

/// Triage tip for an upgrade failure, keyed by the requested medium
pub fn medium_upgrade_fail_tip(medium: NearbyMedium) -> String {
    const WPA_PATCH: &str = " If WFD GO fails to start, check if wpa_supplicant already has the \
        patch to avoid scan before starting GO \
        https://w1.fi/cgit/hostap/commit/?id=b18d95759375834b6ca6f864c898f27d161b14ca";
    match medium {
        NearbyMedium::WifiLanOnly => " WLAN, check if AP blocks the mDNS traffic".to_string(),
        NearbyMedium::UpgradeToWifiHotspot => format!(
            " HOTSPOT, check the related wifip2p and NearbyConnections logs to see if the WFD \
             group owner fails to start on the target side or the legacy STA fails to connect \
             on the source side.{}",
            WPA_PATCH
        ),
        NearbyMedium::UpgradeToWifiDirect => format!(
            " WFD, check the related wifip2p and NearbyConnections logs if the WFD group owner \
             fails to start on the target side or WFD group client fails to connect on the \
             source side.{}",
            WPA_PATCH
        ),
        NearbyMedium::UpgradeToAllWifi => " all WiFI mediums, check NearbyConnections logs to see \
             if WFD, WLAN and HOTSPOT mediums are tried and if the failure is on the target or \
             source side. Check directed test results to see which medium fails."
            .to_string(),
        other => format!("unexpected upgrade medium - {}", other),
    }
}

/// Role a device plays in a test class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Discoverer: scans, requests the connection and sends the payload
    SourceDevice,
    /// Advertiser: broadcasts presence, accepts, receives the payload
    TargetDevice,
}

impl DeviceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceRole::SourceDevice => "source_device",
            DeviceRole::TargetDevice => "target_device",
        }
    }
}

impl FromStr for DeviceRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "source_device" => Ok(DeviceRole::SourceDevice),
            "target_device" => Ok(DeviceRole::TargetDevice),
            other => Err(AppError::parse(format!("Unknown device role: {}", other))),
        }
    }
}

/// Which companion agent surface a call goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentSlot {
    /// Always loaded; carries the measured connection
    Primary,
    /// Loaded for BT multiplex runs; carries the prior BT connection
    Secondary,
    /// Loaded for third-party API runs
    ThirdParty,
}

impl AgentSlot {
    pub const ALL: [AgentSlot; 3] = [AgentSlot::Primary, AgentSlot::Secondary, AgentSlot::ThirdParty];

    /// Alias under which the agent RPC surface is registered
    pub fn alias(self) -> &'static str {
        match self {
            AgentSlot::Primary => "nearby",
            AgentSlot::Secondary => "nearby2",
            AgentSlot::ThirdParty => "nearby3p",
        }
    }

    /// Android package name of the agent apk
    pub fn package_name(self) -> &'static str {
        match self {
            AgentSlot::Primary => "com.google.android.nearby.mobly.snippet",
            AgentSlot::Secondary => "com.google.android.nearby.mobly.snippet.second",
            AgentSlot::ThirdParty => "com.google.android.nearby.mobly.snippet.thirdparty",
        }
    }

    /// Key of the apk path in the `files` / `mh_files` user param
    pub fn apk_file_key(self) -> &'static str {
        match self {
            AgentSlot::Primary => "nearby_snippet",
            AgentSlot::Secondary => "nearby_snippet_2",
            AgentSlot::ThirdParty => "nearby_snippet_3p",
        }
    }
}

/// Band of a controlled access point, selected by channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiBand {
    TwoG,
    FiveG,
    FiveGDfs,
}

impl WifiBand {
    pub fn channel(self) -> u32 {
        match self {
            WifiBand::TwoG => crate::defaults::CHANNEL_2G,
            WifiBand::FiveG => crate::defaults::CHANNEL_5G,
            WifiBand::FiveGDfs => crate::defaults::CHANNEL_5G_DFS,
        }
    }

    pub fn from_channel(channel: i64) -> Option<Self> {
        [WifiBand::TwoG, WifiBand::FiveG, WifiBand::FiveGDfs]
            .into_iter()
            .find(|band| i64::from(band.channel()) == channel)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "2G" => Some(WifiBand::TwoG),
            "5G" => Some(WifiBand::FiveG),
            "5G_DFS" | "5G-DFS" | "DFS_5G" => Some(WifiBand::FiveGDfs),
            _ => None,
        }
    }
}
