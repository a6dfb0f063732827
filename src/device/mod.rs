//! Device control surface
//!
//! The harness never talks ADB or snippet RPC directly. Every device is
//! reached through a [`DeviceController`] and every Nearby Connections call
//! goes to a [`NearbyAgent`] loaded on that device. Real backends implement
//! these traits out of tree; [`sim`] provides a simulated backend.

pub mod capabilities;
pub mod provision;
pub mod sim;

pub use capabilities::{
    CapabilityFlag, CapabilityOverrides, CapabilityRequirement, DeviceCapabilities, OverrideIssue,
};
pub use provision::{assign_roles, DevicePair, Provisioner, ProvisionOutcome, RoleAssignment};

use crate::error::{AppError, Result};
use crate::types::{
    AgentSlot, DeviceRole, MediumUpgradeType, NearbyConnectionMedium, NearbyMedium, PayloadType,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Endpoint id reported by the Nearby stack
pub type EndpointId = String;

/// Keep-alive settings passed with a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAlive {
    pub timeout_ms: u32,
    pub interval_ms: u32,
}

/// Parameters of `start_advertising`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingRequest {
    pub advertising_medium: NearbyMedium,
    pub connection_medium: NearbyMedium,
    pub upgrade_medium: NearbyMedium,
    pub upgrade_type: MediumUpgradeType,
}

/// Parameters of `request_connection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub connection_medium: NearbyMedium,
    pub upgrade_medium: NearbyMedium,
    pub upgrade_type: MediumUpgradeType,
    pub keep_alive: Option<KeepAlive>,
}

/// Nearby Connections RPC surface of one loaded agent.
///
/// `wait_*` calls resolve when the matching callback arrives and never time
/// out on their own; deadlines are applied by the caller.
#[async_trait]
pub trait NearbyAgent: Send + Sync {
    fn slot(&self) -> AgentSlot;

    async fn start_advertising(&self, request: &AdvertisingRequest) -> Result<()>;
    async fn start_discovery(&self, medium: NearbyMedium) -> Result<()>;
    async fn wait_for_endpoint_found(&self) -> Result<EndpointId>;
    async fn request_connection(&self, endpoint: &str, request: &ConnectionRequest) -> Result<()>;
    async fn wait_for_connection_initiated(&self) -> Result<EndpointId>;
    async fn accept_connection(&self, endpoint: &str) -> Result<()>;
    async fn wait_for_connection_result(&self, endpoint: &str) -> Result<()>;
    async fn wait_for_bandwidth_changed(&self, endpoint: &str) -> Result<NearbyConnectionMedium>;

    /// Send a payload of `size_kb` KB; resolves once the receiver has it all
    async fn send_payload(&self, endpoint: &str, size_kb: u64, payload_type: PayloadType) -> Result<()>;

    async fn disconnect_endpoint(&self, endpoint: &str) -> Result<()>;
    async fn stop_discovery(&self) -> Result<()>;
    async fn stop_advertising(&self) -> Result<()>;
    async fn stop_all_endpoints(&self) -> Result<()>;
    async fn transfer_files_cleanup(&self) -> Result<()>;
}

/// Device state tweaks applied during provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSetting {
    AutoUpdates(bool),
    VerboseNearbyLogs,
    DisableLogRedaction,
    EnableWifiAware,
    DisableWlanDenyList,
    BleScanThrottling(bool),
    CountryCode { code: String, force_telephony: bool },
    ToggleAirplaneMode,
}

impl fmt::Display for DeviceSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSetting::AutoUpdates(enabled) => {
                write!(f, "{} auto updates", if *enabled { "enable" } else { "disable" })
            }
            DeviceSetting::VerboseNearbyLogs => write!(f, "enable verbose logs"),
            DeviceSetting::DisableLogRedaction => write!(f, "disable log redaction"),
            DeviceSetting::EnableWifiAware => write!(f, "enable Wi-Fi Aware"),
            DeviceSetting::DisableWlanDenyList => write!(f, "disable WLAN deny list"),
            DeviceSetting::BleScanThrottling(enabled) => {
                write!(f, "{} BLE scan throttling", if *enabled { "enable" } else { "disable" })
            }
            DeviceSetting::CountryCode { code, .. } => write!(f, "set country code {}", code),
            DeviceSetting::ToggleAirplaneMode => write!(f, "toggle airplane mode"),
        }
    }
}

/// Current STA association as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConnectionInfo {
    /// MHz, `-1` when not associated
    pub frequency_mhz: i64,
    /// Mbps, `-1` when not associated
    pub max_supported_tx_link_speed_mbps: i64,
}

impl Default for WifiConnectionInfo {
    fn default() -> Self {
        Self {
            frequency_mhz: -1,
            max_supported_tx_link_speed_mbps: -1,
        }
    }
}

/// Control surface of one physical device
#[async_trait]
pub trait DeviceController: Send + Sync {
    fn serial(&self) -> &str;

    /// Read a system property such as `ro.product.model`
    async fn get_prop(&self, name: &str) -> Result<String>;
    async fn is_adb_root(&self) -> Result<bool>;

    async fn install_apk(&self, path: &Path) -> Result<()>;
    async fn grant_manage_external_storage(&self, package: &str) -> Result<()>;
    async fn load_agent(&self, slot: AgentSlot) -> Result<Arc<dyn NearbyAgent>>;
    async fn unload_agent(&self, slot: AgentSlot) -> Result<()>;

    async fn apply_setting(&self, setting: &DeviceSetting) -> Result<()>;

    async fn wifi_is_enabled(&self) -> Result<bool>;
    async fn wifi_enable(&self) -> Result<()>;
    async fn wifi_forget_all(&self) -> Result<()>;
    async fn wifi_disconnect(&self) -> Result<()>;
    async fn wifi_clear_configured_networks(&self) -> Result<()>;
    /// Associate with an access point; resolves once connected
    async fn wifi_connect(&self, ssid: &str, password: &str) -> Result<()>;
    async fn wifi_connection_info(&self) -> Result<WifiConnectionInfo>;

    /// Capture a bug report into `dest_dir`, returning the file path
    async fn take_bug_report(&self, dest_dir: &Path, name: &str) -> Result<PathBuf>;
    async fn create_output_excerpts(&self, dest_dir: &Path) -> Result<()>;
}

/// A provisioned device bound to its role in the class
#[derive(Clone)]
pub struct DeviceHandle {
    pub controller: Arc<dyn DeviceController>,
    pub role: DeviceRole,
    pub model: String,
    pub build_id: String,
    pub wifi_firmware: String,
    pub capabilities: DeviceCapabilities,
    agents: HashMap<AgentSlot, Arc<dyn NearbyAgent>>,
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("serial", &self.serial())
            .field("role", &self.role)
            .field("model", &self.model)
            .field("loaded_agents", &self.loaded_slots())
            .finish()
    }
}

impl DeviceHandle {
    pub fn new(controller: Arc<dyn DeviceController>, role: DeviceRole) -> Self {
        Self {
            controller,
            role,
            model: String::new(),
            build_id: String::new(),
            wifi_firmware: String::new(),
            capabilities: DeviceCapabilities::default(),
            agents: HashMap::new(),
        }
    }

    pub fn serial(&self) -> &str {
        self.controller.serial()
    }

    /// `serial(model)` tag used in log lines
    pub fn debug_tag(&self) -> String {
        if self.model.is_empty() {
            self.serial().to_string()
        } else {
            format!("{}({})", self.serial(), self.model)
        }
    }

    pub fn agent(&self, slot: AgentSlot) -> Result<Arc<dyn NearbyAgent>> {
        self.agents.get(&slot).cloned().ok_or_else(|| {
            AppError::device(format!("{} has no {} agent loaded", self.debug_tag(), slot.alias()))
        })
    }

    pub fn insert_agent(&mut self, agent: Arc<dyn NearbyAgent>) {
        self.agents.insert(agent.slot(), agent);
    }

    pub fn remove_agent(&mut self, slot: AgentSlot) -> Option<Arc<dyn NearbyAgent>> {
        self.agents.remove(&slot)
    }

    /// Loaded slots in primary, secondary, third-party order
    pub fn loaded_slots(&self) -> Vec<AgentSlot> {
        AgentSlot::ALL
            .into_iter()
            .filter(|slot| self.agents.contains_key(slot))
            .collect()
    }

    /// Attributes recorded in the class summary
    pub fn summary_attributes(&self) -> Vec<(&'static str, String)> {
        let caps = &self.capabilities;
        vec![
            ("serial", self.serial().to_string()),
            ("model", self.model.clone()),
            ("build_info", self.build_id.clone()),
            ("wifi_chipset", caps.wifi_chipset.clone()),
            ("wifi_fw", self.wifi_firmware.clone()),
            ("support_5g", caps.supports_5g.to_string()),
            ("support_dbs_sta_wfd", caps.supports_dbs_sta_wfd.to_string()),
            (
                "enable_sta_dfs_channel_for_wfd",
                caps.enable_sta_dfs_channel_for_peer_network.to_string(),
            ),
            (
                "enable_sta_indoor_channel_for_wfd",
                caps.enable_sta_indoor_channel_for_peer_network.to_string(),
            ),
            ("max_num_streams", caps.max_num_streams.to_string()),
            ("max_num_streams_dbs", caps.max_num_streams_dbs.to_string()),
            ("android_version", caps.android_version.clone()),
        ]
    }
}
