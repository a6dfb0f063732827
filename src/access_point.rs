//! Controlled Wi-Fi access point
//!
//! When `use_auto_controlled_wifi_ap` is set the harness starts an access
//! point before provisioning and writes its credentials into the parameters
//! for the band selected by the `wifi_channel` user parameter. Without one
//! the generic `wifi_ssid`/`wifi_password` fields are set.

use crate::config::{RawValue, TestParameters, UserParams};
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::types::WifiBand;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const WIFI_CHANNEL_KEY: &str = "wifi_channel";

/// Configuration an access point is started with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiApConfig {
    /// `None` lets the controller pick its default channel
    pub channel: Option<u32>,
    pub country_code: String,
}

/// Credentials of a started access point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiInfo {
    pub ssid: String,
    pub password: String,
}

/// Control surface of an access point
#[async_trait]
pub trait AccessPointController: Send + Sync {
    async fn start_wifi(&self, config: &WifiApConfig) -> Result<WifiInfo>;
    async fn stop_wifi(&self) -> Result<()>;
}

/// Resolve the `wifi_channel` user parameter.
///
/// Accepts a channel number or a band label (`2G`, `5G`, `5G_DFS`). Returns
/// `Ok(None)` when the parameter is absent.
pub fn requested_band(raw: &UserParams) -> Result<Option<WifiBand>> {
    let Some(value) = raw.get(WIFI_CHANNEL_KEY) else {
        return Ok(None);
    };
    let band = match value.clone().coerced() {
        RawValue::Int(channel) => WifiBand::from_channel(channel),
        RawValue::Str(label) => WifiBand::from_label(&label),
        _ => None,
    };
    band.map(Some)
        .ok_or_else(|| AppError::config(format!("Unknown Wi-Fi channel: {}", value)))
}

/// Owns the access point for the lifetime of one test class
pub struct ApManager {
    controller: Option<Arc<dyn AccessPointController>>,
    started: bool,
    logger: Logger,
}

impl ApManager {
    pub fn new(controller: Option<Arc<dyn AccessPointController>>, logger: &Logger) -> Self {
        Self {
            controller,
            started: false,
            logger: logger.named("AP"),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start the access point if requested and inject its credentials.
    ///
    /// `default_band` picks the channel when `wifi_channel` is absent; the
    /// credentials then go to the generic fields. With neither the
    /// controller's default channel is used.
    pub async fn setup(
        &mut self,
        params: &mut TestParameters,
        raw: &UserParams,
        country_code: &str,
        default_band: Option<WifiBand>,
    ) -> Result<Option<WifiInfo>> {
        if !params.use_auto_controlled_wifi_ap {
            return Ok(None);
        }

        let requested = requested_band(raw)?;
        let band = requested.or(default_band);
        let controller = self.controller.as_ref().ok_or_else(|| {
            AppError::config("use_auto_controlled_wifi_ap is set but no access point controller is registered")
        })?;

        let config = WifiApConfig {
            channel: band.map(WifiBand::channel),
            country_code: country_code.to_string(),
        };
        let info = controller
            .start_wifi(&config)
            .await
            .map_err(|e| AppError::access_point(format!("starting the controlled access point: {}", e)))?;
        self.started = true;

        params.set_wifi_credentials(requested, info.ssid.clone(), info.password.clone());
        self.logger
            .info(&format!("Access point {} is up", info.ssid))
            .field("ssid", &info.ssid)
            .field("channel", config.channel)
            .field("country_code", &config.country_code)
            .log()
            .await;
        Ok(Some(info))
    }

    /// Stop the access point; no-op unless this manager started it
    pub async fn teardown(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        if let Some(controller) = &self.controller {
            controller
                .stop_wifi()
                .await
                .map_err(|e| AppError::access_point(e.to_string()))?;
        }
        self.started = false;
        self.logger.info("Access point stopped").log().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestbedAccessPoint;
    use crate::device::sim::SimulatedAccessPoint;
    use crate::logging::LoggingConfig;

    fn raw_with_channel(value: RawValue) -> UserParams {
        let mut raw = UserParams::new();
        raw.insert(WIFI_CHANNEL_KEY.to_string(), value);
        raw
    }

    fn simulated_ap() -> Arc<SimulatedAccessPoint> {
        Arc::new(SimulatedAccessPoint::new(TestbedAccessPoint {
            ssid: "lab-ap".to_string(),
            password: "secret".to_string(),
        }))
    }

    fn manager(ap: &Arc<SimulatedAccessPoint>) -> ApManager {
        let controller: Arc<dyn AccessPointController> = ap.clone();
        ApManager::new(Some(controller), &Logger::with_config("TEST", &LoggingConfig::quiet()))
    }

    #[test]
    fn test_requested_band() {
        assert_eq!(requested_band(&UserParams::new()).unwrap(), None);
        assert_eq!(
            requested_band(&raw_with_channel(RawValue::Int(6))).unwrap(),
            Some(WifiBand::TwoG)
        );
        assert_eq!(
            requested_band(&raw_with_channel(RawValue::from("36"))).unwrap(),
            Some(WifiBand::FiveG)
        );
        assert_eq!(
            requested_band(&raw_with_channel(RawValue::from("5G_DFS"))).unwrap(),
            Some(WifiBand::FiveGDfs)
        );
        let err = requested_band(&raw_with_channel(RawValue::Int(11))).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Unknown Wi-Fi channel: 11");
    }

    #[tokio::test]
    async fn test_noop_when_not_requested() {
        let ap = simulated_ap();
        let mut manager = manager(&ap);
        let mut params = TestParameters::default();
        assert!(manager.setup(&mut params, &UserParams::new(), "US", None).await.unwrap().is_none());
        manager.teardown().await.unwrap();
        assert!(ap.start_requests().is_empty());
        assert_eq!(ap.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_credentials_written_to_selected_band() {
        let ap = simulated_ap();
        let mut manager = manager(&ap);
        let mut params = TestParameters {
            use_auto_controlled_wifi_ap: true,
            ..Default::default()
        };
        manager
            .setup(&mut params, &raw_with_channel(RawValue::Int(6)), "US", Some(WifiBand::FiveG))
            .await
            .unwrap();

        assert_eq!(params.wifi_2g_ssid, "lab-ap");
        assert_eq!(params.wifi_2g_password, "secret");
        assert!(params.wifi_ssid.is_empty());
        assert_eq!(
            ap.start_requests(),
            vec![WifiApConfig {
                channel: Some(6),
                country_code: "US".to_string()
            }]
        );

        manager.teardown().await.unwrap();
        manager.teardown().await.unwrap();
        assert_eq!(ap.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_unspecified_channel_uses_generic_credentials() {
        let ap = simulated_ap();
        let mut manager = manager(&ap);
        let mut params = TestParameters {
            use_auto_controlled_wifi_ap: true,
            ..Default::default()
        };
        manager.setup(&mut params, &UserParams::new(), "US", None).await.unwrap();
        assert_eq!(params.wifi_ssid, "lab-ap");
        assert_eq!(ap.start_requests()[0].channel, None);
    }

    #[tokio::test]
    async fn test_default_band_applies_without_channel() {
        let ap = simulated_ap();
        let mut manager = manager(&ap);
        let mut params = TestParameters {
            use_auto_controlled_wifi_ap: true,
            ..Default::default()
        };
        manager
            .setup(&mut params, &UserParams::new(), "US", Some(WifiBand::FiveG))
            .await
            .unwrap();
        assert_eq!(params.wifi_ssid, "lab-ap");
        assert!(params.wifi_5g_ssid.is_empty());
        assert_eq!(params.sta_credentials(WifiBand::FiveG), ("lab-ap", "secret"));
        assert_eq!(ap.start_requests()[0].channel, Some(36));
    }

    #[tokio::test]
    async fn test_missing_controller_is_config_error() {
        let mut manager = ApManager::new(None, &Logger::with_config("TEST", &LoggingConfig::quiet()));
        let mut params = TestParameters {
            use_auto_controlled_wifi_ap: true,
            ..Default::default()
        };
        let err = manager.setup(&mut params, &UserParams::new(), "US", None).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(!manager.is_started());
    }
}
