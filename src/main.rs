//! Nodeboot main entry point
//!
//! Runs once per power cycle, before the sensing application.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BatteryMonitor   SystemAdapter    HardwareWatchdog            │
//! │  (BatteryPort)    (BoardPort)      (WatchdogPort)              │
//! │  WifiAdapter      FsStore          ModuleStore                 │
//! │  (NetworkPort)    (StoragePort)    (UpdateSource)              │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            BootSequencer (pure logic)                  │    │
//! │  │  PowerGate · OtaController · Inventory · Jotter        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use nodeboot::adapters::battery::BatteryMonitor;
use nodeboot::adapters::fs_store::{FLASH_MOUNT, FsStore};
use nodeboot::adapters::module_store::{EspHttpFetch, ModuleStore};
use nodeboot::adapters::system::{self, SystemAdapter};
use nodeboot::adapters::wifi::WifiAdapter;
use nodeboot::app::ports::{AppEnvironment, MainApplication};
use nodeboot::boot::{AppExit, BootPorts, BootSequencer};
use nodeboot::config::{BootConfig, OTA_MODULES, load_boot_config};
use nodeboot::diagnostics;
use nodeboot::drivers::hw_init;
use nodeboot::drivers::indicator::IndicatorPair;
use nodeboot::drivers::watchdog::{self, HardwareWatchdog};
use nodeboot::jot;
use nodeboot::jotter::JotterRegistry;

type LedPin = PinDriver<'static, AnyOutputPin, Output>;

// ── Sensing application ───────────────────────────────────────
//
// The sensing loop itself ships as an OTA module and is started by the
// module runtime; the firmware side only publishes the boot environment
// and keeps the task alive.

struct SensingApplication {
    environment: AppEnvironment,
}

impl MainApplication for SensingApplication {
    fn set_environment(&mut self, env: &AppEnvironment) {
        self.environment = env.clone();
    }

    fn run(&mut self) -> Result<()> {
        let env = serde_json::to_string(&self.environment)?;
        info!("App: environment {}", env);
        loop {
            esp_idf_hal::delay::FreeRtos::delay_ms(60_000);
            info!("App: heartbeat");
        }
    }
}

// ── Peripheral bring-up ───────────────────────────────────────
//
// Nothing here may stop the boot: the power gate has to run whatever
// else is broken, so each failure degrades to a detached adapter.

fn init_indicators(red: AnyOutputPin, green: AnyOutputPin) -> IndicatorPair<LedPin, LedPin> {
    match (PinDriver::output(red), PinDriver::output(green)) {
        (Ok(red), Ok(green)) => IndicatorPair::new(red, green),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Indicator pins unavailable ({}), running without LEDs", e);
            IndicatorPair::detached()
        }
    }
}

fn init_radio(modem: Modem) -> Result<BlockingWifi<EspWifi<'static>>> {
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = match EspDefaultNvsPartition::take() {
        Ok(nvs) => Some(nvs),
        Err(e) => {
            warn!("NVS partition unavailable ({}), WiFi runs without calibration cache", e);
            None
        }
    };
    let wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
    Ok(BlockingWifi::wrap(wifi, sysloop)?)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    if let Err(e) = esp_idf_logger::init() {
        println!("Logger init failed ({e}), continuing without log output");
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  Nodeboot v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Flash filesystem + boot config ─────────────────────
    // An unmounted store fails every access: no config, no flag, and a
    // Jotter that writes nothing.
    let storage = FsStore::mount_or_detached();
    let config = match load_boot_config(&storage) {
        Ok(cfg) => {
            info!("Boot config loaded");
            cfg
        }
        Err(e) => {
            warn!("Boot config unusable ({}), using defaults", e);
            BootConfig::default()
        }
    };

    // ── 3. Jotter + panic capture ─────────────────────────────
    let jotters = JotterRegistry::new(storage.root().join(&config.log_dir));
    let root = jotters.root();
    diagnostics::install_panic_handler(root.clone());
    system::check_rollback();

    // ── 4. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Battery reads will fail and the power gate halts the node.
        error!("HAL init failed: {}", e);
        root.record_fault(&e);
    }

    let (indicators, network) = match Peripherals::take() {
        Ok(p) => {
            let indicators =
                init_indicators(p.pins.gpio11.downgrade_output(), p.pins.gpio12.downgrade_output());
            let network = match init_radio(p.modem) {
                Ok(wifi) => WifiAdapter::new(wifi),
                Err(e) => {
                    error!("WiFi init failed ({}), OTA cycles will report no radio", e);
                    jot!(root, "Boot: WiFi init failed: {}", e);
                    WifiAdapter::unavailable()
                }
            };
            (indicators, network)
        }
        Err(e) => {
            error!("Peripherals unavailable ({}), continuing without LEDs or WiFi", e);
            jot!(root, "Boot: peripherals unavailable: {}", e);
            (IndicatorPair::detached(), WifiAdapter::unavailable())
        }
    };

    // ── 5. Boot ───────────────────────────────────────────────
    let mut ports = BootPorts {
        battery: BatteryMonitor::new(),
        board: SystemAdapter::new(indicators),
        watchdog: HardwareWatchdog::new(),
        network,
        updates: ModuleStore::new(FLASH_MOUNT, EspHttpFetch)
            .with_progress_hook(watchdog::feed_task_watchdog),
        storage,
    };
    let mut app = SensingApplication {
        environment: AppEnvironment::default(),
    };

    let report = BootSequencer::new(&config, OTA_MODULES, root).run(&mut ports, &mut app);
    match report.exit {
        AppExit::Returned => info!("App returned"),
        AppExit::Failed(reason) | AppExit::Panicked(reason) => {
            error!("App ended abnormally: {}", reason);
        }
    }
    Ok(())
}
