//! Boot sequencer: the once-per-power-cycle state machine.
//!
//! ```text
//!   PowerCheck ──▶ [PowerOnResetUpdateCheck] ──▶ [ManualUpdateCheck]
//!       │                    │                          │
//!     halt                 OTA ─▶ reset               OTA ─▶ reset
//!                                                       │
//!              StartupSignal ──▶ [ManualUpdateCheck] ──▶ Handoff
//! ```
//!
//! Bracketed states are present or absent according to [`BootConfig`], so
//! every field variant of the boot script is one plan over the same
//! states.  A boot ends in exactly one of: the power-gate halt, an OTA
//! cycle (which resets), or the handoff to the main application.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::{error, info, warn};

use crate::app::ports::{
    AppEnvironment, BatteryPort, BoardPort, MainApplication, NetworkPort, ResetCause, StoragePort,
    UpdateSource, WatchdogPort,
};
use crate::config::{BootConfig, ManualCheckOrder};
use crate::diagnostics::panic_reason;
use crate::error::BootError;
use crate::inventory::{ModuleVersionRecord, collect_installed_versions, print_installed_versions};
use crate::jot;
use crate::jotter::Jotter;
use crate::ota::OtaController;
use crate::power::PowerGate;

// ---------------------------------------------------------------------------
// Outcomes and states
// ---------------------------------------------------------------------------

/// Decision produced by the power gate or an update trigger check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Continue,
    HaltLowPower,
    UpdateTriggered,
    UpdateNotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    PowerCheck,
    ManualUpdateCheck,
    PowerOnResetUpdateCheck,
    StartupSignal,
    Handoff,
}

impl BootState {
    pub fn name(self) -> &'static str {
        match self {
            Self::PowerCheck => "PowerCheck",
            Self::ManualUpdateCheck => "ManualUpdateCheck",
            Self::PowerOnResetUpdateCheck => "PowerOnResetUpdateCheck",
            Self::StartupSignal => "StartupSignal",
            Self::Handoff => "Handoff",
        }
    }
}

/// Upper bound on plan length (every state at most once).
pub const MAX_PLAN_LEN: usize = 5;

pub type BootPlan = heapless::Vec<BootState, MAX_PLAN_LEN>;

/// The ordered states this configuration will visit.
pub fn boot_plan(config: &BootConfig) -> BootPlan {
    let mut plan = BootPlan::new();
    let mut push = |state| {
        // Capacity covers every state once.
        let _ = plan.push(state);
    };

    push(BootState::PowerCheck);
    if config.update_on_power_on_reset {
        push(BootState::PowerOnResetUpdateCheck);
    }
    if config.manual_update_check == ManualCheckOrder::BeforeStartupSignal {
        push(BootState::ManualUpdateCheck);
    }
    push(BootState::StartupSignal);
    if config.manual_update_check == ManualCheckOrder::AfterStartupSignal {
        push(BootState::ManualUpdateCheck);
    }
    push(BootState::Handoff);
    plan
}

// ---------------------------------------------------------------------------
// Ports bundle and handoff report
// ---------------------------------------------------------------------------

/// Every collaborator a boot needs, owned for the duration of the boot.
pub struct BootPorts<Bat, Brd, Wdt, Net, Sto, Src> {
    pub battery: Bat,
    pub board: Brd,
    pub watchdog: Wdt,
    pub network: Net,
    pub storage: Sto,
    pub updates: Src,
}

/// How the main application ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AppExit {
    /// `run` returned `Ok`.
    Returned,
    /// `run` returned an error.
    Failed(String),
    /// `run` panicked.
    Panicked(String),
}

/// What the non-update path produced.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffReport {
    /// States actually visited, in order.
    pub visited: Vec<BootState>,
    /// Whether the operator window was shown.
    pub startup_window: bool,
    pub installed: ModuleVersionRecord,
    pub exit: AppExit,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct BootSequencer<'a> {
    config: &'a BootConfig,
    modules: &'a [&'a str],
    jotter: Arc<Jotter>,
}

impl<'a> BootSequencer<'a> {
    pub fn new(config: &'a BootConfig, modules: &'a [&'a str], jotter: Arc<Jotter>) -> Self {
        Self {
            config,
            modules,
            jotter,
        }
    }

    /// Walk the boot plan.  Returns only after the handoff; the halt and
    /// update paths never return.
    pub fn run<Bat, Brd, Wdt, Net, Sto, Src>(
        &self,
        ports: &mut BootPorts<Bat, Brd, Wdt, Net, Sto, Src>,
        app: &mut impl MainApplication,
    ) -> HandoffReport
    where
        Bat: BatteryPort,
        Brd: BoardPort,
        Wdt: WatchdogPort,
        Net: NetworkPort,
        Sto: StoragePort,
        Src: UpdateSource,
    {
        let plan = boot_plan(self.config);
        info!("Boot starting in state: {}", BootState::PowerCheck.name());
        jot!(self.jotter, "Boot: reset cause {:?}", ports.board.reset_cause());

        let mut visited = Vec::with_capacity(plan.len());
        let mut startup_window = false;
        let mut previous: Option<BootState> = None;

        for &state in &plan {
            if let Some(prev) = previous {
                info!("Boot transition: {} -> {}", prev.name(), state.name());
            }
            previous = Some(state);
            visited.push(state);

            match state {
                BootState::PowerCheck => {
                    let gate = PowerGate::new(self.config, Arc::clone(&self.jotter));
                    gate.evaluate(&mut ports.battery, &mut ports.board);
                }
                BootState::PowerOnResetUpdateCheck => {
                    if self.power_on_reset_trigger(&ports.board) == BootOutcome::UpdateTriggered {
                        self.start_update(ports);
                    }
                }
                BootState::ManualUpdateCheck => {
                    if self.take_update_flag(&mut ports.storage) == BootOutcome::UpdateTriggered {
                        self.start_update(ports);
                    }
                }
                BootState::StartupSignal => {
                    startup_window = self.startup_signal(&mut ports.board);
                }
                BootState::Handoff => break,
            }
        }

        let (installed, exit) = self.handoff(ports, app);
        HandoffReport {
            visited,
            startup_window,
            installed,
            exit,
        }
    }

    /// Check for the manual-update flag and consume it.
    ///
    /// The flag is deleted before anything acts on it, so an interrupted
    /// cycle cannot re-trigger itself.  If it cannot be deleted the update
    /// is not started.
    pub fn take_update_flag(&self, storage: &mut impl StoragePort) -> BootOutcome {
        let path = self.config.update_flag_path.as_str();
        if !storage.exists(path) {
            return BootOutcome::UpdateNotAvailable;
        }

        match storage.delete(path) {
            Ok(()) => {
                info!("Boot: manual update requested");
                jot!(self.jotter, "Boot: manual update flag consumed");
                BootOutcome::UpdateTriggered
            }
            Err(e) => {
                let e = BootError::StorageUnavailable(e);
                error!("Boot: cannot consume {} ({}), not updating", path, e);
                self.jotter.record_fault(&e);
                BootOutcome::UpdateNotAvailable
            }
        }
    }

    pub fn power_on_reset_trigger(&self, board: &impl BoardPort) -> BootOutcome {
        if board.reset_cause() == ResetCause::PowerOn {
            info!("Boot: power-on reset, checking for updates");
            BootOutcome::UpdateTriggered
        } else {
            BootOutcome::UpdateNotAvailable
        }
    }

    /// Light the indicators for the operator window, then clear them.
    /// Returns `false` when the window was skipped.
    pub fn startup_signal(&self, board: &mut impl BoardPort) -> bool {
        if self.config.gate_delay_on_usb_presence && board.interactive_link() == Some(false) {
            info!("Boot: no USB link, skipping startup window");
            return false;
        }

        let window_ms = self.config.startup_window_secs.saturating_mul(1_000);
        let poll_ms = self.config.startup_poll_ms.max(1);
        info!("Boot: startup window {} s", self.config.startup_window_secs);

        board.set_indicators(true);
        let mut waited = 0u32;
        while waited < window_ms {
            let step = poll_ms.min(window_ms - waited);
            board.delay_ms(step);
            waited += step;
        }
        board.set_indicators(false);
        true
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn start_update<Bat, Brd, Wdt, Net, Sto, Src>(
        &self,
        ports: &mut BootPorts<Bat, Brd, Wdt, Net, Sto, Src>,
    ) -> !
    where
        Brd: BoardPort,
        Wdt: WatchdogPort,
        Net: NetworkPort,
        Sto: StoragePort,
        Src: UpdateSource,
    {
        let ota = OtaController::new(self.config, self.modules, Arc::clone(&self.jotter));
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        )
    }

    fn handoff<Bat, Brd, Wdt, Net, Sto, Src>(
        &self,
        ports: &mut BootPorts<Bat, Brd, Wdt, Net, Sto, Src>,
        app: &mut impl MainApplication,
    ) -> (ModuleVersionRecord, AppExit)
    where
        Sto: StoragePort,
        Src: UpdateSource,
    {
        let installed = collect_installed_versions(
            self.modules,
            &ports.storage,
            self.config,
            &mut ports.updates,
            &self.jotter,
        );
        print_installed_versions(&installed);
        for (module, version) in &installed {
            info!("Boot: {} : {}", module, version);
        }

        let env = AppEnvironment {
            installed_modules: installed.clone(),
        };
        app.set_environment(&env);
        jot!(self.jotter, "Boot: starting main application");

        let exit = match catch_unwind(AssertUnwindSafe(|| app.run())) {
            Ok(Ok(())) => {
                info!("Boot: main application returned");
                AppExit::Returned
            }
            Ok(Err(e)) => {
                error!("Boot: main application failed: {:#}", e);
                jot!(self.jotter, "FAULT: main application: {:#}", e);
                AppExit::Failed(format!("{e:#}"))
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!("Boot: main application panicked: {}", reason);
                jot!(self.jotter, "FAULT: main application panicked: {}", reason);
                AppExit::Panicked(reason)
            }
        };

        if exit != AppExit::Returned {
            warn!("Boot: handing back to the supervisor");
        }
        (installed, exit)
    }
}
