//! Nearby connection lifecycle
//!
//! A [`NearbyConnection`] drives one discoverer/advertiser agent pair through
//! discovery, connection, optional medium upgrade and payload transfer. Each
//! phase has its own deadline; a phase that fails or misses its deadline
//! yields a [`PhaseFailure`] carrying the failure reason of that phase.

pub mod benchmark;

pub use benchmark::{wifi_benchmark, Benchmark, BenchmarkInputs, ThroughputProfile};

use crate::defaults;
use crate::device::{
    AdvertisingRequest, ConnectionRequest, DeviceController, DevicePair, EndpointId, KeepAlive, NearbyAgent,
};
use crate::error::Result;
use crate::models::{ConnectionSetupQualityInfo, ConnectionSetupTimeouts};
use crate::types::{MediumUpgradeType, NearbyMedium, PayloadType, SingleTestFailureReason};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// A phase of a trial that did not complete
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseFailure {
    pub reason: SingleTestFailureReason,
    pub detail: String,
}

impl PhaseFailure {
    pub fn new<S: Into<String>>(reason: SingleTestFailureReason, detail: S) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

impl std::error::Error for PhaseFailure {}

pub type PhaseResult<T> = std::result::Result<T, PhaseFailure>;

/// Await `fut` within `deadline`, classifying both errors and timeouts as
/// `reason`
async fn within<T, F>(deadline: Duration, reason: SingleTestFailureReason, what: &str, fut: F) -> PhaseResult<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(PhaseFailure::new(reason, format!("{} failed: {}", what, error))),
        Err(_) => Err(PhaseFailure::new(
            reason,
            format!("{} timed out after {}s", what, deadline.as_secs()),
        )),
    }
}

/// Mediums and options of one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub advertising_discovery_medium: NearbyMedium,
    pub connection_medium: NearbyMedium,
    pub upgrade_medium: NearbyMedium,
    pub upgrade_type: MediumUpgradeType,
    pub keep_alive: Option<KeepAlive>,
}

impl ConnectionOptions {
    /// The BT-only connection held open next to the measured one
    pub fn prior_bt(advertising_discovery_medium: NearbyMedium) -> Self {
        Self {
            advertising_discovery_medium,
            connection_medium: NearbyMedium::BtOnly,
            upgrade_medium: NearbyMedium::BtOnly,
            upgrade_type: MediumUpgradeType::NonDisruptive,
            keep_alive: None,
        }
    }
}

/// One Nearby connection between a discoverer and an advertiser agent
pub struct NearbyConnection {
    discoverer: Arc<dyn NearbyAgent>,
    advertiser: Arc<dyn NearbyAgent>,
    options: ConnectionOptions,
    /// Advertiser endpoint as seen by the discoverer
    advertiser_endpoint: Option<EndpointId>,
    failure_reason: SingleTestFailureReason,
    pub quality_info: ConnectionSetupQualityInfo,
}

impl NearbyConnection {
    pub fn new(discoverer: Arc<dyn NearbyAgent>, advertiser: Arc<dyn NearbyAgent>, options: ConnectionOptions) -> Self {
        Self {
            discoverer,
            advertiser,
            options,
            advertiser_endpoint: None,
            failure_reason: SingleTestFailureReason::Uninitialized,
            quality_info: ConnectionSetupQualityInfo::default(),
        }
    }

    /// Reason of the last phase that ran; `SUCCESS` once every phase passed
    pub fn failure_reason(&self) -> SingleTestFailureReason {
        self.failure_reason
    }

    fn record<T>(&mut self, result: PhaseResult<T>) -> PhaseResult<T> {
        if let Err(failure) = &result {
            self.failure_reason = failure.reason;
        }
        result
    }

    /// Discover, connect and, for a high quality medium, wait for the upgrade
    pub async fn start_nearby_connection(&mut self, timeouts: &ConnectionSetupTimeouts) -> PhaseResult<()> {
        let outcome = self.setup(timeouts).await;
        if outcome.is_ok() {
            self.failure_reason = SingleTestFailureReason::Success;
        }
        self.record(outcome)
    }

    async fn setup(&mut self, timeouts: &ConnectionSetupTimeouts) -> PhaseResult<()> {
        use SingleTestFailureReason as Reason;

        let advertising = AdvertisingRequest {
            advertising_medium: self.options.advertising_discovery_medium,
            connection_medium: self.options.connection_medium,
            upgrade_medium: self.options.upgrade_medium,
            upgrade_type: self.options.upgrade_type,
        };
        self.advertiser
            .start_advertising(&advertising)
            .await
            .map_err(|e| PhaseFailure::new(Reason::TargetStartAdvertising, e.to_string()))?;

        let discovery_start = Instant::now();
        self.discoverer
            .start_discovery(self.options.advertising_discovery_medium)
            .await
            .map_err(|e| PhaseFailure::new(Reason::SourceStartDiscovery, e.to_string()))?;
        let endpoint = within(
            timeouts.discovery(),
            Reason::SourceStartDiscovery,
            "endpoint discovery",
            self.discoverer.wait_for_endpoint_found(),
        )
        .await?;
        self.quality_info.discovery_latency = discovery_start.elapsed();
        self.advertiser_endpoint = Some(endpoint.clone());

        let request = ConnectionRequest {
            connection_medium: self.options.connection_medium,
            upgrade_medium: self.options.upgrade_medium,
            upgrade_type: self.options.upgrade_type,
            keep_alive: self.options.keep_alive,
        };
        let connection_start = Instant::now();
        self.discoverer
            .request_connection(&endpoint, &request)
            .await
            .map_err(|e| PhaseFailure::new(Reason::SourceRequestConnection, e.to_string()))?;

        let discoverer_endpoint = within(
            timeouts.connection_init(),
            Reason::TargetAcceptConnection,
            "connection initiation",
            self.advertiser.wait_for_connection_initiated(),
        )
        .await?;
        self.advertiser
            .accept_connection(&discoverer_endpoint)
            .await
            .map_err(|e| PhaseFailure::new(Reason::TargetAcceptConnection, e.to_string()))?;

        let both_connected = async {
            futures::try_join!(
                self.discoverer.wait_for_connection_result(&endpoint),
                self.advertiser.wait_for_connection_result(&discoverer_endpoint),
            )
        };
        within(
            timeouts.connection_result(),
            Reason::TargetAcceptConnection,
            "connection result",
            both_connected,
        )
        .await?;
        self.quality_info.connection_latency = connection_start.elapsed();

        if self.options.upgrade_medium.is_high_quality() {
            self.quality_info.medium_upgrade_expected = true;
            let upgrade_start = Instant::now();
            let medium = within(
                defaults::CONNECTION_BANDWIDTH_CHANGED_TIMEOUT,
                Reason::WifiMediumUpgrade,
                "medium upgrade",
                self.discoverer.wait_for_bandwidth_changed(&endpoint),
            )
            .await?;
            self.quality_info.medium_upgrade_latency = upgrade_start.elapsed();
            self.quality_info.upgrade_medium = Some(medium);
        }
        Ok(())
    }

    /// Send a payload over the established connection and return the
    /// throughput in KB/s
    pub async fn transfer_file(&mut self, size_kb: u64, deadline: Duration, payload_type: PayloadType) -> PhaseResult<f64> {
        let outcome = self.transfer(size_kb, deadline, payload_type).await;
        self.record(outcome)
    }

    async fn transfer(&mut self, size_kb: u64, deadline: Duration, payload_type: PayloadType) -> PhaseResult<f64> {
        let endpoint = self.advertiser_endpoint.clone().ok_or_else(|| {
            PhaseFailure::new(SingleTestFailureReason::FileTransferFail, "no connected endpoint")
        })?;
        let start = Instant::now();
        within(
            deadline,
            SingleTestFailureReason::FileTransferFail,
            "payload transfer",
            self.discoverer.send_payload(&endpoint, size_kb, payload_type),
        )
        .await?;
        let elapsed = start.elapsed().max(Duration::from_millis(1));
        Ok(size_kb as f64 / elapsed.as_secs_f64())
    }

    /// Drop the connection from the discoverer side
    pub async fn disconnect_endpoint(&mut self) -> Result<()> {
        if let Some(endpoint) = self.advertiser_endpoint.take() {
            self.discoverer.disconnect_endpoint(&endpoint).await?;
        }
        Ok(())
    }
}

/// Associate a device with an access point, returning the time it took
pub async fn connect_to_wifi_sta(
    controller: &dyn DeviceController,
    ssid: &str,
    password: &str,
    reason: SingleTestFailureReason,
) -> PhaseResult<Duration> {
    let start = Instant::now();
    within(
        defaults::WIFI_STA_CONNECTING_TIME_OUT,
        reason,
        &format!("Wi-Fi association with {}", ssid),
        controller.wifi_connect(ssid, password),
    )
    .await?;
    Ok(start.elapsed())
}

/// Stop discovery, advertising and endpoints on every loaded agent, then
/// let the stack settle
pub async fn reset_nearby_connection(pair: &DevicePair) -> Result<()> {
    for slot in pair.discoverer.loaded_slots() {
        let agent = pair.discoverer.agent(slot)?;
        agent.stop_discovery().await?;
        agent.stop_all_endpoints().await?;
    }
    for slot in pair.advertiser.loaded_slots() {
        let agent = pair.advertiser.agent(slot)?;
        agent.stop_advertising().await?;
        agent.stop_all_endpoints().await?;
    }
    tokio::time::sleep(defaults::NEARBY_RESET_WAIT_TIME).await;
    Ok(())
}

/// Forget configured networks on both devices
pub async fn reset_wifi_connection(pair: &DevicePair) -> Result<()> {
    pair.discoverer.controller.wifi_clear_configured_networks().await?;
    pair.advertiser.controller.wifi_clear_configured_networks().await?;
    tokio::time::sleep(defaults::WIFI_DISCONNECTION_DELAY).await;
    Ok(())
}
