//! Role assignment, capability probing and device setup/teardown
//!
//! Every per-device step runs as its own tokio task. The first failing task
//! fails the whole fan-out.

use super::capabilities::{CapabilityOverrides, CapabilityRequirement, DeviceCapabilities};
use super::{DeviceController, DeviceHandle, DeviceSetting};
use crate::config::raw::file_entry;
use crate::config::{TestParameters, UserParams};
use crate::error::{AppError, ErrorContext, Result};
use crate::logging::{DeviceLogger, Logger};
use crate::types::{AgentSlot, DeviceRole};
use futures::future::try_join_all;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// How the discoverer and advertiser were picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAssignment {
    /// Both roles were declared by the testbed
    Declared,
    /// Roles were missing; the first device advertises, the second discovers
    Positional,
}

/// The two devices of a class
#[derive(Debug, Clone)]
pub struct DevicePair {
    pub discoverer: DeviceHandle,
    pub advertiser: DeviceHandle,
}

impl DevicePair {
    pub fn handles(&self) -> [&DeviceHandle; 2] {
        [&self.discoverer, &self.advertiser]
    }

    fn into_handles(self) -> [DeviceHandle; 2] {
        [self.discoverer, self.advertiser]
    }

    fn from_handles(handles: Vec<DeviceHandle>) -> Result<Self> {
        let mut discoverer = None;
        let mut advertiser = None;
        for handle in handles {
            match handle.role {
                DeviceRole::SourceDevice => discoverer = Some(handle),
                DeviceRole::TargetDevice => advertiser = Some(handle),
            }
        }
        match (discoverer, advertiser) {
            (Some(discoverer), Some(advertiser)) => Ok(Self { discoverer, advertiser }),
            _ => Err(AppError::internal("device task lost a role")),
        }
    }
}

/// Pick the discoverer and advertiser from the registered devices.
///
/// Declared roles win; without a declared `source_device` and
/// `target_device` the first two devices are used as advertiser and
/// discoverer.
pub fn assign_roles(
    devices: Vec<(Arc<dyn DeviceController>, Option<DeviceRole>)>,
) -> Result<(DevicePair, RoleAssignment)> {
    if devices.len() < 2 {
        return Err(AppError::config(format!(
            "At least 2 devices are required, found {}",
            devices.len()
        )));
    }

    let declared = |role: DeviceRole| {
        devices
            .iter()
            .find(|(_, declared)| *declared == Some(role))
            .map(|(controller, _)| Arc::clone(controller))
    };

    if let (Some(source), Some(target)) = (declared(DeviceRole::SourceDevice), declared(DeviceRole::TargetDevice)) {
        return Ok((
            DevicePair {
                discoverer: DeviceHandle::new(source, DeviceRole::SourceDevice),
                advertiser: DeviceHandle::new(target, DeviceRole::TargetDevice),
            },
            RoleAssignment::Declared,
        ));
    }

    let advertiser = Arc::clone(&devices[0].0);
    let discoverer = Arc::clone(&devices[1].0);
    Ok((
        DevicePair {
            discoverer: DeviceHandle::new(discoverer, DeviceRole::SourceDevice),
            advertiser: DeviceHandle::new(advertiser, DeviceRole::TargetDevice),
        },
        RoleAssignment::Positional,
    ))
}

/// Result of provisioning a pair
#[derive(Debug)]
pub enum ProvisionOutcome {
    Ready(DevicePair),
    /// The class must be skipped; nothing beyond capability probing ran
    Skipped { pair: DevicePair, reason: String },
}

/// Spawn one task per handle and wait for all of them, failing fast
async fn fan_out<F, Fut>(pair: DevicePair, task: F) -> Result<DevicePair>
where
    F: Fn(DeviceHandle) -> Fut,
    Fut: Future<Output = Result<DeviceHandle>> + Send + 'static,
{
    let tasks: Vec<JoinHandle<Result<DeviceHandle>>> =
        pair.into_handles().into_iter().map(|handle| tokio::spawn(task(handle))).collect();
    let handles = try_join_all(tasks.into_iter().map(|task| async move { task.await? })).await?;
    DevicePair::from_handles(handles)
}

/// Run one setup step and log its outcome
async fn run_step<Fut>(logger: &DeviceLogger, serial: &str, step: &str, fut: Fut) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    let outcome = fut.await;
    logger.log_step(serial, step, outcome.as_ref().map(|_| ())).await;
    outcome.with_context(|| format!("{} on {}", step, serial))
}

/// Agent slots a class needs given its parameters
pub fn required_slots(params: &TestParameters) -> Vec<AgentSlot> {
    let mut slots = vec![AgentSlot::Primary];
    if params.requires_bt_multiplex {
        slots.push(AgentSlot::Secondary);
    }
    if params.requires_3p_api_test {
        slots.push(AgentSlot::ThirdParty);
    }
    slots
}

/// Provisions the device pair of one test class
pub struct Provisioner {
    params: Arc<TestParameters>,
    overrides: Option<Arc<CapabilityOverrides>>,
    apk_paths: Vec<(AgentSlot, Option<PathBuf>)>,
    country_code: String,
    logger: DeviceLogger,
}

impl Provisioner {
    pub fn new(
        params: Arc<TestParameters>,
        raw: &UserParams,
        overrides: Option<Arc<CapabilityOverrides>>,
        country_code: &str,
        logger: &Logger,
    ) -> Self {
        let apk_paths = required_slots(&params)
            .into_iter()
            .map(|slot| (slot, file_entry(raw, slot.apk_file_key()).map(PathBuf::from)))
            .collect();
        Self {
            params,
            overrides,
            apk_paths,
            country_code: country_code.to_string(),
            logger: DeviceLogger::new(logger),
        }
    }

    /// Assign roles, probe capabilities, decide whether to skip, then set up
    /// both devices.
    ///
    /// `class_skip_reason` is the test class's own reason to skip (for
    /// example an access point that is not ready).
    pub async fn provision(
        &self,
        devices: Vec<(Arc<dyn DeviceController>, Option<DeviceRole>)>,
        requirements: &[CapabilityRequirement],
        class_skip_reason: Option<String>,
    ) -> Result<ProvisionOutcome> {
        let (pair, assignment) = assign_roles(devices)?;
        if assignment == RoleAssignment::Positional {
            crate::log_warn!(
                self.logger.logger(),
                "The source,target devices are not specified in testbed; the result may not be expected. \
                 Using {} as advertiser and {} as discoverer",
                pair.advertiser.serial(),
                pair.discoverer.serial()
            );
        }

        let pair = self.probe_capabilities(pair).await?;

        if let Some(reason) = self.skip_reason(&pair, requirements, class_skip_reason) {
            self.logger
                .logger()
                .warn(&format!("Skipping test class: {}", reason))
                .field("reason", &reason)
                .log()
                .await;
            return Ok(ProvisionOutcome::Skipped { pair, reason });
        }

        let pair = self.forget_all_wifi(pair).await?;
        let pair = self.setup_devices(pair).await?;
        Ok(ProvisionOutcome::Ready(pair))
    }

    /// Read version, model, build id and Wi-Fi firmware, then apply the
    /// model's override rule
    pub async fn probe_capabilities(&self, pair: DevicePair) -> Result<DevicePair> {
        let logger = self.logger.clone();
        let overrides = self.overrides.clone();
        fan_out(pair, move |mut handle| {
            let logger = logger.clone();
            let overrides = overrides.clone();
            async move {
                let controller = Arc::clone(&handle.controller);
                let android_version = controller.get_prop("ro.build.version.release").await?;
                handle.model = controller.get_prop("ro.product.model").await?;
                handle.build_id = controller.get_prop("ro.build.id").await?;
                let firmware = controller.get_prop("vendor.wlan.firmware.version").await?;
                handle.wifi_firmware = firmware.trim().to_string();

                let mut capabilities = DeviceCapabilities {
                    android_version: android_version.trim().to_string(),
                    ..DeviceCapabilities::default()
                };
                match overrides.as_ref().map(|o| o.rule_for(&handle.model)) {
                    Some(Some(rule)) => {
                        for issue in capabilities.apply_rule(rule) {
                            logger
                                .logger()
                                .warn(&format!("[{}] ignoring override: {}", handle.debug_tag(), issue))
                                .field("serial", handle.serial())
                                .log()
                                .await;
                        }
                    }
                    Some(None) => {
                        logger
                            .logger()
                            .warn(&format!(
                                "[{}] Model {} is not supported in config file",
                                handle.serial(),
                                handle.model
                            ))
                            .log()
                            .await;
                    }
                    None => {}
                }
                logger
                    .log_capabilities(handle.serial(), &handle.model, &capabilities)
                    .await;
                handle.capabilities = capabilities;
                Ok(handle)
            }
        })
        .await
    }

    /// Why the class must be skipped, if it must.
    ///
    /// The empty-chipset rule is checked last and replaces any earlier reason.
    pub fn skip_reason(
        &self,
        pair: &DevicePair,
        requirements: &[CapabilityRequirement],
        class_skip_reason: Option<String>,
    ) -> Option<String> {
        let mut reason = class_skip_reason.or_else(|| {
            requirements.iter().find_map(|requirement| {
                let handle = match requirement.role {
                    DeviceRole::SourceDevice => &pair.discoverer,
                    DeviceRole::TargetDevice => &pair.advertiser,
                };
                requirement.check(handle.serial(), &handle.capabilities)
            })
            .map(|mismatch| format!("The test is not required per the device capabilities. {}", mismatch))
        });

        if self.params.skip_test_if_wifi_chipset_is_empty
            && pair.handles().iter().all(|h| h.capabilities.wifi_chipset.is_empty())
        {
            reason = Some("wifi_chipset is empty in the config file".to_string());
        }
        reason
    }

    async fn forget_all_wifi(&self, pair: DevicePair) -> Result<DevicePair> {
        let logger = self.logger.clone();
        fan_out(pair, move |handle| {
            let logger = logger.clone();
            async move {
                let controller = Arc::clone(&handle.controller);
                run_step(&logger, handle.serial(), "forget all Wi-Fi", controller.wifi_forget_all()).await?;
                Ok(handle)
            }
        })
        .await
    }

    /// Root check, agent install and load, radio and logging state
    pub async fn setup_devices(&self, pair: DevicePair) -> Result<DevicePair> {
        let logger = self.logger.clone();
        let params = Arc::clone(&self.params);
        let apk_paths = self.apk_paths.clone();
        let country_code = self.country_code.clone();
        fan_out(pair, move |handle| {
            setup_device(
                handle,
                Arc::clone(&params),
                apk_paths.clone(),
                country_code.clone(),
                logger.clone(),
            )
        })
        .await
    }

    /// Clean up transfers, restore auto updates and unload every agent
    pub async fn teardown(&self, pair: DevicePair) -> Result<DevicePair> {
        let logger = self.logger.clone();
        let disconnect_wifi = self.params.disconnect_wifi_after_test;
        fan_out(pair, move |mut handle| {
            let logger = logger.clone();
            async move {
                let controller = Arc::clone(&handle.controller);
                let serial = controller.serial().to_string();
                let primary = handle.agent(AgentSlot::Primary)?;
                run_step(&logger, &serial, "transfer files cleanup", primary.transfer_files_cleanup()).await?;
                run_step(
                    &logger,
                    &serial,
                    "enable auto updates",
                    controller.apply_setting(&DeviceSetting::AutoUpdates(true)),
                )
                .await?;
                if disconnect_wifi {
                    run_step(&logger, &serial, "disconnect Wi-Fi", controller.wifi_disconnect()).await?;
                }
                for slot in handle.loaded_slots() {
                    run_step(
                        &logger,
                        &serial,
                        &format!("unload {}", slot.alias()),
                        controller.unload_agent(slot),
                    )
                    .await?;
                    handle.remove_agent(slot);
                }
                Ok(handle)
            }
        })
        .await
    }
}

async fn setup_device(
    mut handle: DeviceHandle,
    params: Arc<TestParameters>,
    apk_paths: Vec<(AgentSlot, Option<PathBuf>)>,
    country_code: String,
    logger: DeviceLogger,
) -> Result<DeviceHandle> {
    let controller = Arc::clone(&handle.controller);
    let serial = handle.debug_tag();

    if !controller.is_adb_root().await? {
        if params.allow_unrooted_device {
            logger
                .logger()
                .info(&format!("[{}] Unrooted device is detected. Test coverage is limited", serial))
                .log()
                .await;
        } else {
            return Err(AppError::aborted(format!(
                "The test only can run on rooted device ({})",
                serial
            )));
        }
    }

    run_step(
        &logger,
        &serial,
        "disable auto updates",
        controller.apply_setting(&DeviceSetting::AutoUpdates(false)),
    )
    .await?;

    for (slot, apk_path) in &apk_paths {
        match apk_path {
            Some(path) => {
                run_step(
                    &logger,
                    &serial,
                    &format!("install {}", slot.apk_file_key()),
                    controller.install_apk(path),
                )
                .await?
            }
            None => {
                logger
                    .logger()
                    .warn(&format!(
                        "[{}] {} apk is not specified, make sure it is installed in the device",
                        serial,
                        slot.apk_file_key()
                    ))
                    .log()
                    .await
            }
        }
        run_step(
            &logger,
            &serial,
            "grant manage external storage",
            controller.grant_manage_external_storage(slot.package_name()),
        )
        .await?;
        let agent = controller
            .load_agent(*slot)
            .await
            .with_context(|| format!("loading {} on {}", slot.alias(), serial))?;
        handle.insert_agent(agent);
    }

    if !controller.wifi_is_enabled().await? {
        run_step(&logger, &serial, "enable Wi-Fi", controller.wifi_enable()).await?;
    }
    run_step(&logger, &serial, "disconnect Wi-Fi", controller.wifi_disconnect()).await?;

    let mut settings = vec![
        DeviceSetting::VerboseNearbyLogs,
        DeviceSetting::DisableLogRedaction,
        DeviceSetting::EnableWifiAware,
        DeviceSetting::DisableWlanDenyList,
        DeviceSetting::BleScanThrottling(params.enable_2g_ble_scan_throttling),
        DeviceSetting::CountryCode {
            code: country_code,
            force_telephony: params.force_telephony_cc,
        },
    ];
    if !params.bypass_airplane_mode_toggling {
        settings.push(DeviceSetting::ToggleAirplaneMode);
    }
    for setting in &settings {
        run_step(&logger, &serial, &setting.to_string(), controller.apply_setting(setting)).await?;
    }

    Ok(handle)
}
