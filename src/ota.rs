//! OTA update controller.
//!
//! One update cycle, always ending in a hardware reset:
//!
//! ```text
//!   arm watchdog ─▶ load WiFi config ─▶ reset radio ─▶ connect
//!        │                │                               │
//!        │             missing ──────────┐             failed ──┐
//!        │                               ▼                      ▼
//!        └──▶ for each module: config ─▶ open ─▶ download ─▶ apply
//!                                                               │
//!                               settle ─▶ hard reset  ◀─────────┘
//! ```
//!
//! The watchdog is fed before every step that can block.  Failures are
//! values in the returned [`CycleReport`]; whatever happened, the reset
//! follows, so the node always restarts into a known image.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::{error, info, warn};

use crate::app::ports::{
    BoardPort, ConnectivityError, ModuleUpdater, NetworkPort, StoragePort, UpdateError,
    UpdateSource, WatchdogPort,
};
use crate::config::{BootConfig, WifiCredentials, load_module_config, load_wifi_config};
use crate::error::{BootError, StageOutcome};
use crate::jot;
use crate::jotter::Jotter;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one module during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleOutcome {
    /// A staged version was swapped in.
    Updated,
    /// Nothing to apply.
    UpToDate,
    /// Not attempted (config absent or malformed).
    Skipped(BootError),
    /// Download or apply failed; the installed code is unchanged.
    Failed(BootError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleReport {
    pub module: String,
    pub outcome: ModuleOutcome,
}

/// Result of the work that precedes the reset.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// `Fatal` when no network link was established.
    pub outcome: StageOutcome,
    pub modules: Vec<ModuleReport>,
}

impl CycleReport {
    fn fatal(error: BootError) -> Self {
        Self {
            outcome: StageOutcome::Fatal(error),
            modules: Vec::new(),
        }
    }

    /// Modules whose updater was opened.
    pub fn attempted(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| !matches!(m.outcome, ModuleOutcome::Skipped(_)))
            .count()
    }

    pub fn updated(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| m.outcome == ModuleOutcome::Updated)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct OtaController<'a> {
    config: &'a BootConfig,
    modules: &'a [&'a str],
    jotter: Arc<Jotter>,
}

impl<'a> OtaController<'a> {
    pub fn new(config: &'a BootConfig, modules: &'a [&'a str], jotter: Arc<Jotter>) -> Self {
        Self {
            config,
            modules,
            jotter,
        }
    }

    /// Run a full cycle and reset.  Never returns.
    pub fn run_update_cycle(
        &self,
        watchdog: &mut impl WatchdogPort,
        network: &mut impl NetworkPort,
        storage: &impl StoragePort,
        source: &mut impl UpdateSource,
        board: &mut impl BoardPort,
    ) -> ! {
        jot!(self.jotter, "OTA: update cycle starting");

        // A panicking adapter must not skip the reset.
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            self.attempt(watchdog, network, storage, source)
        }));
        match attempt {
            Ok(report) => self.record_summary(&report),
            Err(_) => {
                error!("OTA: cycle aborted by panic");
                jot!(self.jotter, "OTA: cycle aborted by panic");
            }
        }

        watchdog.feed();
        info!("OTA: resetting in {} ms", self.config.reset_settle_ms);
        jot!(self.jotter, "OTA: resetting");
        board.delay_ms(self.config.reset_settle_ms);
        board.hard_reset()
    }

    /// Everything before the reset.
    pub fn attempt(
        &self,
        watchdog: &mut impl WatchdogPort,
        network: &mut impl NetworkPort,
        storage: &impl StoragePort,
        source: &mut impl UpdateSource,
    ) -> CycleReport {
        watchdog.arm(self.config.watchdog_timeout_ms);
        watchdog.feed();

        let credentials = match self.load_credentials(storage) {
            Ok(c) => c,
            Err(e) => return self.abort(e),
        };

        watchdog.feed();
        network.reset_interface();

        watchdog.feed();
        if let Err(e) = network.connect(&credentials) {
            return self.abort(BootError::NetworkUnavailable(e));
        }
        info!("OTA: network up ({})", credentials.ssid());

        watchdog.feed();
        let mut modules = Vec::with_capacity(self.modules.len());
        for &module in self.modules {
            watchdog.feed();
            let outcome = self.update_module(module, &credentials, watchdog, storage, source);
            modules.push(ModuleReport {
                module: module.into(),
                outcome,
            });
        }

        CycleReport {
            outcome: StageOutcome::Ok,
            modules,
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn load_credentials(&self, storage: &impl StoragePort) -> Result<WifiCredentials, BootError> {
        load_wifi_config(storage, self.config).map_err(|e| match e {
            BootError::ConfigMissing { .. } => {
                BootError::NetworkUnavailable(ConnectivityError::NoCredentials)
            }
            other => other,
        })
    }

    fn update_module(
        &self,
        module: &str,
        credentials: &WifiCredentials,
        watchdog: &mut impl WatchdogPort,
        storage: &impl StoragePort,
        source: &mut impl UpdateSource,
    ) -> ModuleOutcome {
        let module_cfg = match load_module_config(storage, self.config, module) {
            Ok(cfg) => cfg,
            Err(e) => {
                info!("OTA: {} skipped ({})", module, e);
                return ModuleOutcome::Skipped(e);
            }
        };

        watchdog.feed();
        let mut updater = source.open(&module_cfg.repository_url, module, credentials.access_token());

        watchdog.feed();
        if let Err(reason) = updater.download_updates_if_available() {
            return self.module_failed(module, reason);
        }

        // Apply even when nothing new was fetched: a previous cycle may
        // have staged an update and been reset before swapping it in.
        watchdog.feed();
        match updater.apply_pending_updates_if_available() {
            Ok(true) => {
                info!("OTA: {} updated", module);
                jot!(self.jotter, "OTA: {} updated", module);
                ModuleOutcome::Updated
            }
            Ok(false) => ModuleOutcome::UpToDate,
            Err(reason) => self.module_failed(module, reason),
        }
    }

    fn module_failed(&self, module: &str, reason: UpdateError) -> ModuleOutcome {
        let e = BootError::ModuleUpdateFailed {
            module: module.into(),
            reason,
        };
        warn!("OTA: {}", e);
        self.jotter.record_fault(&e);
        ModuleOutcome::Failed(e)
    }

    fn abort(&self, e: BootError) -> CycleReport {
        error!("OTA: cycle aborted ({})", e);
        self.jotter.record_fault(&e);
        CycleReport::fatal(e)
    }

    fn record_summary(&self, report: &CycleReport) {
        if report.outcome.is_fatal() {
            return;
        }
        info!(
            "OTA: {} attempted, {} updated, {} skipped",
            report.attempted(),
            report.updated(),
            report.modules.len() - report.attempted()
        );
        jot!(
            self.jotter,
            "OTA: {} attempted, {} updated",
            report.attempted(),
            report.updated()
        );
    }
}
