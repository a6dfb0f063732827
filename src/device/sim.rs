//! Simulated device backend
//!
//! Drives the `ncperf` binary and the tests. Callbacks arrive after fixed
//! delays measured on the tokio clock, so paused-time tests run instantly.
//!
//! Faults are scripted per trial. The trial index of a device is the number
//! of times its primary agent was reset with `stop_all_endpoints`, minus
//! one; the harness resets once before every trial.

use super::{
    AdvertisingRequest, ConnectionRequest, DeviceController, EndpointId, NearbyAgent, WifiConnectionInfo,
};
use crate::access_point::{AccessPointController, WifiApConfig, WifiInfo};
use crate::config::{Testbed, TestbedAccessPoint};
use crate::device::DeviceSetting;
use crate::error::{AppError, Result};
use crate::types::{AgentSlot, DeviceRole, NearbyConnectionMedium, NearbyMedium, PayloadType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A scripted misbehaviour of the simulated stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimFault {
    AdvertisingError,
    DiscoveryTimeout,
    ConnectionRequestError,
    ConnectionInitTimeout,
    ConnectionResultTimeout,
    UpgradeTimeout,
    TransferTimeout,
    /// Transfer completes at this rate (KBps)
    SlowTransfer(f64),
    StaConnectTimeout,
}

/// Callback delays and radio figures of a simulated device
#[derive(Debug, Clone, PartialEq)]
pub struct SimTimings {
    pub discovery: Duration,
    pub connection_init: Duration,
    pub connection_result: Duration,
    pub upgrade: Duration,
    pub sta_connect: Duration,
    pub transfer_rate_kbps: f64,
    pub upgrade_medium: NearbyConnectionMedium,
    pub sta_frequency_mhz: i64,
    pub sta_tx_link_speed_mbps: i64,
}

impl Default for SimTimings {
    fn default() -> Self {
        Self {
            discovery: Duration::from_secs(2),
            connection_init: Duration::from_millis(500),
            connection_result: Duration::from_millis(500),
            upgrade: Duration::from_secs(3),
            sta_connect: Duration::from_secs(4),
            transfer_rate_kbps: 32.0 * 1024.0,
            upgrade_medium: NearbyConnectionMedium::WifiLan,
            sta_frequency_mhz: 2437,
            sta_tx_link_speed_mbps: 144,
        }
    }
}

/// Static description of a simulated device
#[derive(Debug, Clone)]
pub struct SimDeviceSpec {
    pub serial: String,
    pub model: String,
    pub android_version: String,
    pub build_id: String,
    pub wifi_firmware: String,
    pub rooted: bool,
    pub timings: SimTimings,
    faults_by_trial: BTreeMap<u32, Vec<SimFault>>,
    faults_always: Vec<SimFault>,
}

impl SimDeviceSpec {
    pub fn new(serial: &str, model: &str) -> Self {
        Self {
            serial: serial.to_string(),
            model: model.to_string(),
            android_version: "14".to_string(),
            build_id: "AP2A.240805.005".to_string(),
            wifi_firmware: "WLAN.HMT.1.0.c6-00242".to_string(),
            rooted: true,
            timings: SimTimings::default(),
            faults_by_trial: BTreeMap::new(),
            faults_always: Vec::new(),
        }
    }

    pub fn unrooted(mut self) -> Self {
        self.rooted = false;
        self
    }

    pub fn with_timings(mut self, timings: SimTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Inject `fault` into the zero-based trial `trial`
    pub fn with_fault(mut self, trial: u32, fault: SimFault) -> Self {
        self.faults_by_trial.entry(trial).or_default().push(fault);
        self
    }

    /// Inject `fault` into every trial
    pub fn with_fault_always(mut self, fault: SimFault) -> Self {
        self.faults_always.push(fault);
        self
    }

    fn faults_for(&self, trial: u32) -> Vec<SimFault> {
        let mut faults = self.faults_always.clone();
        if let Some(scripted) = self.faults_by_trial.get(&trial) {
            faults.extend_from_slice(scripted);
        }
        faults
    }
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<String>,
    installed_apks: Vec<PathBuf>,
    settings: Vec<DeviceSetting>,
    loaded: Vec<AgentSlot>,
    primary_resets: u32,
    wifi_enabled: bool,
    associated_ssid: Option<String>,
    bug_reports: u32,
    excerpts: u32,
}

struct SimShared {
    spec: SimDeviceSpec,
    state: Mutex<SimState>,
}

impl SimShared {
    fn state(&self) -> MutexGuard<'_, SimState> {
        // a poisoned lock only means a test already panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn current_faults(&self) -> Vec<SimFault> {
        let trial = self.state().primary_resets.saturating_sub(1);
        self.spec.faults_for(trial)
    }

    fn has_fault(&self, fault: SimFault) -> bool {
        self.current_faults().contains(&fault)
    }

    fn transfer_rate_kbps(&self) -> f64 {
        self.current_faults()
            .into_iter()
            .find_map(|fault| match fault {
                SimFault::SlowTransfer(rate) => Some(rate),
                _ => None,
            })
            .unwrap_or(self.spec.timings.transfer_rate_kbps)
    }
}

/// Wait for a callback that may never arrive
async fn callback_after<T>(delay: Duration, lost: bool, value: T) -> Result<T> {
    if lost {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(delay).await;
    Ok(value)
}

/// A simulated Android device
#[derive(Clone)]
pub struct SimulatedDevice {
    shared: Arc<SimShared>,
}

impl SimulatedDevice {
    pub fn new(spec: SimDeviceSpec) -> Self {
        Self {
            shared: Arc::new(SimShared {
                spec,
                state: Mutex::new(SimState::default()),
            }),
        }
    }

    pub fn spec(&self) -> &SimDeviceSpec {
        &self.shared.spec
    }

    /// Every call made on the device and its agents, in order
    pub fn calls(&self) -> Vec<String> {
        self.shared.state().calls.clone()
    }

    pub fn installed_apks(&self) -> Vec<PathBuf> {
        self.shared.state().installed_apks.clone()
    }

    pub fn applied_settings(&self) -> Vec<DeviceSetting> {
        self.shared.state().settings.clone()
    }

    pub fn loaded_slots(&self) -> Vec<AgentSlot> {
        self.shared.state().loaded.clone()
    }

    pub fn bug_report_count(&self) -> u32 {
        self.shared.state().bug_reports
    }

    pub fn excerpt_count(&self) -> u32 {
        self.shared.state().excerpts
    }
}

#[async_trait]
impl DeviceController for SimulatedDevice {
    fn serial(&self) -> &str {
        &self.shared.spec.serial
    }

    async fn get_prop(&self, name: &str) -> Result<String> {
        let spec = &self.shared.spec;
        match name {
            "ro.build.version.release" => Ok(spec.android_version.clone()),
            "ro.product.model" => Ok(spec.model.clone()),
            "ro.build.id" => Ok(spec.build_id.clone()),
            "vendor.wlan.firmware.version" => Ok(spec.wifi_firmware.clone()),
            other => Err(AppError::device(format!("{}: unknown property {}", spec.serial, other))),
        }
    }

    async fn is_adb_root(&self) -> Result<bool> {
        Ok(self.shared.spec.rooted)
    }

    async fn install_apk(&self, path: &Path) -> Result<()> {
        self.shared.record(format!("install_apk({})", path.display()));
        self.shared.state().installed_apks.push(path.to_path_buf());
        Ok(())
    }

    async fn grant_manage_external_storage(&self, package: &str) -> Result<()> {
        self.shared.record(format!("grant_manage_external_storage({})", package));
        Ok(())
    }

    async fn load_agent(&self, slot: AgentSlot) -> Result<Arc<dyn NearbyAgent>> {
        self.shared.record(format!("load_agent({})", slot.alias()));
        self.shared.state().loaded.push(slot);
        Ok(Arc::new(SimulatedAgent {
            slot,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn unload_agent(&self, slot: AgentSlot) -> Result<()> {
        self.shared.record(format!("unload_agent({})", slot.alias()));
        self.shared.state().loaded.retain(|loaded| *loaded != slot);
        Ok(())
    }

    async fn apply_setting(&self, setting: &DeviceSetting) -> Result<()> {
        self.shared.record(format!("apply_setting({})", setting));
        self.shared.state().settings.push(setting.clone());
        Ok(())
    }

    async fn wifi_is_enabled(&self) -> Result<bool> {
        Ok(self.shared.state().wifi_enabled)
    }

    async fn wifi_enable(&self) -> Result<()> {
        self.shared.record("wifi_enable".to_string());
        self.shared.state().wifi_enabled = true;
        Ok(())
    }

    async fn wifi_forget_all(&self) -> Result<()> {
        self.shared.record("wifi_forget_all".to_string());
        self.shared.state().associated_ssid = None;
        Ok(())
    }

    async fn wifi_disconnect(&self) -> Result<()> {
        self.shared.record("wifi_disconnect".to_string());
        self.shared.state().associated_ssid = None;
        Ok(())
    }

    async fn wifi_clear_configured_networks(&self) -> Result<()> {
        self.shared.record("wifi_clear_configured_networks".to_string());
        self.shared.state().associated_ssid = None;
        Ok(())
    }

    async fn wifi_connect(&self, ssid: &str, _password: &str) -> Result<()> {
        self.shared.record(format!("wifi_connect({})", ssid));
        let lost = self.shared.has_fault(SimFault::StaConnectTimeout);
        callback_after(self.shared.spec.timings.sta_connect, lost, ()).await?;
        self.shared.state().associated_ssid = Some(ssid.to_string());
        Ok(())
    }

    async fn wifi_connection_info(&self) -> Result<WifiConnectionInfo> {
        if self.shared.state().associated_ssid.is_none() {
            return Ok(WifiConnectionInfo::default());
        }
        let timings = &self.shared.spec.timings;
        Ok(WifiConnectionInfo {
            frequency_mhz: timings.sta_frequency_mhz,
            max_supported_tx_link_speed_mbps: timings.sta_tx_link_speed_mbps,
        })
    }

    async fn take_bug_report(&self, dest_dir: &Path, name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("bugreport_{}_{}.txt", name, self.shared.spec.serial));
        tokio::fs::write(&path, format!("simulated bug report for {}\n", self.shared.spec.serial)).await?;
        self.shared.state().bug_reports += 1;
        Ok(path)
    }

    async fn create_output_excerpts(&self, _dest_dir: &Path) -> Result<()> {
        self.shared.state().excerpts += 1;
        Ok(())
    }
}

/// Nearby agent of a [`SimulatedDevice`]
pub struct SimulatedAgent {
    slot: AgentSlot,
    shared: Arc<SimShared>,
}

impl SimulatedAgent {
    fn record(&self, call: String) {
        self.shared.record(format!("{}.{}", self.slot.alias(), call));
    }

    /// Faults only hit the agent carrying the measured connection
    fn has_fault(&self, fault: SimFault) -> bool {
        self.slot == AgentSlot::Primary && self.shared.has_fault(fault)
    }

    fn peer_endpoint(&self) -> EndpointId {
        format!("{}-{}", self.slot.alias(), self.shared.spec.serial)
    }
}

#[async_trait]
impl NearbyAgent for SimulatedAgent {
    fn slot(&self) -> AgentSlot {
        self.slot
    }

    async fn start_advertising(&self, request: &AdvertisingRequest) -> Result<()> {
        self.record(format!("start_advertising({})", request.advertising_medium));
        if self.has_fault(SimFault::AdvertisingError) {
            return Err(AppError::device("advertising rejected by the stack"));
        }
        Ok(())
    }

    async fn start_discovery(&self, medium: NearbyMedium) -> Result<()> {
        self.record(format!("start_discovery({})", medium));
        Ok(())
    }

    async fn wait_for_endpoint_found(&self) -> Result<EndpointId> {
        let lost = self.has_fault(SimFault::DiscoveryTimeout);
        callback_after(self.shared.spec.timings.discovery, lost, self.peer_endpoint()).await
    }

    async fn request_connection(&self, endpoint: &str, request: &ConnectionRequest) -> Result<()> {
        self.record(format!(
            "request_connection({}, {}, {})",
            endpoint, request.connection_medium, request.upgrade_medium
        ));
        if self.has_fault(SimFault::ConnectionRequestError) {
            return Err(AppError::device("connection request rejected by the stack"));
        }
        Ok(())
    }

    async fn wait_for_connection_initiated(&self) -> Result<EndpointId> {
        let lost = self.has_fault(SimFault::ConnectionInitTimeout);
        callback_after(self.shared.spec.timings.connection_init, lost, self.peer_endpoint()).await
    }

    async fn accept_connection(&self, endpoint: &str) -> Result<()> {
        self.record(format!("accept_connection({})", endpoint));
        Ok(())
    }

    async fn wait_for_connection_result(&self, _endpoint: &str) -> Result<()> {
        let lost = self.has_fault(SimFault::ConnectionResultTimeout);
        callback_after(self.shared.spec.timings.connection_result, lost, ()).await
    }

    async fn wait_for_bandwidth_changed(&self, _endpoint: &str) -> Result<NearbyConnectionMedium> {
        let lost = self.has_fault(SimFault::UpgradeTimeout);
        let timings = &self.shared.spec.timings;
        callback_after(timings.upgrade, lost, timings.upgrade_medium).await
    }

    async fn send_payload(&self, endpoint: &str, size_kb: u64, payload_type: PayloadType) -> Result<()> {
        self.record(format!("send_payload({}, {}KB, {})", endpoint, size_kb, payload_type));
        let lost = self.has_fault(SimFault::TransferTimeout);
        let rate = self.shared.transfer_rate_kbps();
        if rate <= 0.0 {
            return Err(AppError::device("transfer stalled"));
        }
        let elapsed = Duration::from_secs_f64(size_kb as f64 / rate);
        callback_after(elapsed, lost, ()).await
    }

    async fn disconnect_endpoint(&self, endpoint: &str) -> Result<()> {
        self.record(format!("disconnect_endpoint({})", endpoint));
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.record("stop_discovery".to_string());
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<()> {
        self.record("stop_advertising".to_string());
        Ok(())
    }

    async fn stop_all_endpoints(&self) -> Result<()> {
        self.record("stop_all_endpoints".to_string());
        if self.slot == AgentSlot::Primary {
            self.shared.state().primary_resets += 1;
        }
        Ok(())
    }

    async fn transfer_files_cleanup(&self) -> Result<()> {
        self.record("transfer_files_cleanup".to_string());
        Ok(())
    }
}

/// A simulated controllable access point
#[derive(Debug)]
pub struct SimulatedAccessPoint {
    config: TestbedAccessPoint,
    started: Mutex<Vec<WifiApConfig>>,
    stopped: Mutex<u32>,
}

impl SimulatedAccessPoint {
    pub fn new(config: TestbedAccessPoint) -> Self {
        Self {
            config,
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(0),
        }
    }

    /// Configurations the AP was started with
    pub fn start_requests(&self) -> Vec<WifiApConfig> {
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn stop_count(&self) -> u32 {
        *self.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AccessPointController for SimulatedAccessPoint {
    async fn start_wifi(&self, config: &WifiApConfig) -> Result<WifiInfo> {
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(config.clone());
        Ok(WifiInfo {
            ssid: self.config.ssid.clone(),
            password: self.config.password.clone(),
        })
    }

    async fn stop_wifi(&self) -> Result<()> {
        *self.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

/// Devices and access point of a simulated testbed
pub struct SimulatedTestbed {
    pub devices: Vec<(SimulatedDevice, Option<DeviceRole>)>,
    pub access_point: Option<Arc<SimulatedAccessPoint>>,
}

impl SimulatedTestbed {
    /// Build simulated devices from the `devices` section of a testbed
    pub fn from_testbed(testbed: &Testbed) -> Self {
        let devices = testbed
            .devices
            .iter()
            .map(|device| {
                let mut spec = SimDeviceSpec::new(&device.serial, device.model.as_deref().unwrap_or("Simulated"));
                if let Some(version) = &device.android_version {
                    spec.android_version = version.clone();
                }
                if let Some(build_id) = &device.build_id {
                    spec.build_id = build_id.clone();
                }
                if let Some(firmware) = &device.wifi_firmware {
                    spec.wifi_firmware = firmware.clone();
                }
                spec.rooted = device.rooted;
                (SimulatedDevice::new(spec), device.role)
            })
            .collect();
        let access_point = testbed
            .access_point
            .clone()
            .map(|config| Arc::new(SimulatedAccessPoint::new(config)));
        Self { devices, access_point }
    }

    /// Controllers in testbed order, ready for role assignment
    pub fn controllers(&self) -> Vec<(Arc<dyn DeviceController>, Option<DeviceRole>)> {
        self.devices
            .iter()
            .map(|(device, role)| (Arc::new(device.clone()) as Arc<dyn DeviceController>, *role))
            .collect()
    }

    pub fn access_point_controller(&self) -> Option<Arc<dyn AccessPointController>> {
        self.access_point
            .as_ref()
            .map(|ap| Arc::clone(ap) as Arc<dyn AccessPointController>)
    }
}
