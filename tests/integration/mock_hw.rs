//! Recording mock adapters for integration tests.
//!
//! Every mock appends to one shared [`CallLog`], so tests can assert on the
//! interleaving of calls across collaborators (feed before connect, flag
//! deleted before arm, and so on) without touching real hardware.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nodeboot::adapters::system::SimulatedReset;
use nodeboot::app::ports::{
    AppEnvironment, BatteryPort, BoardPort, ConnectivityError, MainApplication, ModuleUpdater,
    NetworkPort, ReadingError, ResetCause, StorageError, StoragePort, UpdateError, UpdateSource,
    WatchdogPort,
};
use nodeboot::boot::BootPorts;
use nodeboot::config::{
    BootConfig, ModuleUpdateConfig, WifiCredentials, save_module_config, save_wifi_config,
};
use nodeboot::jotter::{Jotter, JotterRegistry};
use nodeboot::pins::BoardPin;

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    // Board
    Delay(u32),
    Sleep(u32),
    DisableUsb,
    Park(&'static str),
    Indicators(bool),
    HardReset,
    // Battery
    ReadVoltage,
    DisableOutput,
    // Watchdog
    Arm(u32),
    Feed,
    // Network
    ResetInterface,
    Connect(String),
    // Storage
    Delete(String),
    // Updates
    Open {
        module: String,
        url: String,
        token: Option<String>,
    },
    Version(String),
    Download(String),
    Apply(String),
    // Application
    SetEnvironment,
    AppRun,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

pub fn new_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

#[allow(dead_code)]
pub fn count(log: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
    log.borrow().iter().filter(|c| pred(c)).count()
}

#[allow(dead_code)]
pub fn position(log: &CallLog, pred: impl Fn(&Call) -> bool) -> Option<usize> {
    log.borrow().iter().position(|c| pred(c))
}

/// Panic payload used when the power-gate halt loop has slept long enough.
#[derive(Debug)]
pub struct Halted;

/// Run `f` and return its panic payload, if it unwound.
pub fn unwind_payload(f: impl FnOnce()) -> Option<Box<dyn Any + Send>> {
    catch_unwind(AssertUnwindSafe(f)).err()
}

#[allow(dead_code)]
pub fn is_reset(payload: &Option<Box<dyn Any + Send>>) -> bool {
    payload.as_ref().is_some_and(|p| p.is::<SimulatedReset>())
}

#[allow(dead_code)]
pub fn is_halt(payload: &Option<Box<dyn Any + Send>>) -> bool {
    payload.as_ref().is_some_and(|p| p.is::<Halted>())
}

// ── Board ─────────────────────────────────────────────────────

pub struct MockBoard {
    log: CallLog,
    pub reset_cause: ResetCause,
    pub usb_link: Option<bool>,
    /// Sleeps allowed in the halt loop before unwinding with [`Halted`].
    pub sleeps_before_halt: usize,
    sleeps: usize,
}

impl MockBoard {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            reset_cause: ResetCause::Software,
            usb_link: None,
            sleeps_before_halt: 2,
            sleeps: 0,
        }
    }
}

impl BoardPort for MockBoard {
    fn disable_usb_storage(&mut self) {
        self.log.borrow_mut().push(Call::DisableUsb);
    }

    fn park_pin(&mut self, pin: BoardPin) {
        self.log.borrow_mut().push(Call::Park(pin.name));
    }

    fn set_indicators(&mut self, on: bool) {
        self.log.borrow_mut().push(Call::Indicators(on));
    }

    fn interactive_link(&self) -> Option<bool> {
        self.usb_link
    }

    fn reset_cause(&self) -> ResetCause {
        self.reset_cause
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log.borrow_mut().push(Call::Delay(ms));
    }

    fn low_power_sleep(&mut self, ms: u32) {
        self.log.borrow_mut().push(Call::Sleep(ms));
        self.sleeps += 1;
        if self.sleeps >= self.sleeps_before_halt {
            std::panic::panic_any(Halted);
        }
    }

    fn hard_reset(&mut self) -> ! {
        self.log.borrow_mut().push(Call::HardReset);
        std::panic::panic_any(SimulatedReset);
    }
}

// ── Battery ───────────────────────────────────────────────────

pub struct MockBattery {
    log: CallLog,
    pub reading: Result<f32, ReadingError>,
}

impl MockBattery {
    pub fn new(log: &CallLog, volts: f32) -> Self {
        Self {
            log: Rc::clone(log),
            reading: Ok(volts),
        }
    }
}

impl BatteryPort for MockBattery {
    fn read_voltage(&mut self) -> Result<f32, ReadingError> {
        self.log.borrow_mut().push(Call::ReadVoltage);
        self.reading
    }

    fn disable_output(&mut self) {
        self.log.borrow_mut().push(Call::DisableOutput);
    }
}

// ── Watchdog ──────────────────────────────────────────────────

pub struct MockWatchdog {
    log: CallLog,
}

impl MockWatchdog {
    pub fn new(log: &CallLog) -> Self {
        Self { log: Rc::clone(log) }
    }
}

impl WatchdogPort for MockWatchdog {
    fn arm(&mut self, timeout_ms: u32) {
        self.log.borrow_mut().push(Call::Arm(timeout_ms));
    }

    fn feed(&mut self) {
        self.log.borrow_mut().push(Call::Feed);
    }
}

// ── Network ───────────────────────────────────────────────────

pub struct MockNetwork {
    log: CallLog,
    pub result: Result<(), ConnectivityError>,
    /// Block in `connect` until this latch is set (or 5 s pass).
    pub stall_until: Option<Arc<AtomicBool>>,
    pub panic_on_connect: bool,
}

impl MockNetwork {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            result: Ok(()),
            stall_until: None,
            panic_on_connect: false,
        }
    }
}

impl NetworkPort for MockNetwork {
    fn reset_interface(&mut self) {
        self.log.borrow_mut().push(Call::ResetInterface);
    }

    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), ConnectivityError> {
        self.log
            .borrow_mut()
            .push(Call::Connect(credentials.ssid().into()));
        if self.panic_on_connect {
            panic!("radio driver fault");
        }
        if let Some(latch) = &self.stall_until {
            let started = Instant::now();
            while !latch.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(ConnectivityError::Timeout);
        }
        self.result.clone()
    }
}

// ── Storage ───────────────────────────────────────────────────

pub struct MemStorage {
    log: CallLog,
    pub files: HashMap<String, String>,
    pub undeletable: HashSet<String>,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            files: HashMap::new(),
            undeletable: HashSet::new(),
        }
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Write the WiFi config through the real config writer.
    pub fn with_wifi(mut self, config: &BootConfig, token: Option<&str>) -> Self {
        let creds = WifiCredentials::new("FieldAP", "hunter2hunter2", token).unwrap();
        save_wifi_config(&mut self, config, &creds).unwrap();
        self
    }

    /// Write a repository config for each module.
    pub fn with_modules(mut self, config: &BootConfig, modules: &[&str]) -> Self {
        for &module in modules {
            let cfg = ModuleUpdateConfig {
                module_name: module.into(),
                repository_url: format!("https://updates.example/{module}"),
            };
            save_module_config(&mut self, config, &cfg).unwrap();
        }
        self
    }
}

impl StoragePort for MemStorage {
    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        self.files.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let text = String::from_utf8(data.to_vec()).map_err(|_| StorageError::InvalidData)?;
        self.files.insert(path.into(), text);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), StorageError> {
        if self.undeletable.contains(path) {
            return Err(StorageError::IoError);
        }
        self.log.borrow_mut().push(Call::Delete(path.into()));
        self.files.remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

// ── Update source ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModuleBehaviour {
    pub version: Result<String, UpdateError>,
    pub download: Result<bool, UpdateError>,
    pub apply: Result<bool, UpdateError>,
}

impl Default for ModuleBehaviour {
    fn default() -> Self {
        Self {
            version: Ok("1.0".into()),
            download: Ok(false),
            apply: Ok(false),
        }
    }
}

pub struct MockSource {
    log: CallLog,
    pub behaviours: HashMap<String, ModuleBehaviour>,
}

#[allow(dead_code)]
impl MockSource {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            behaviours: HashMap::new(),
        }
    }

    pub fn with(mut self, module: &str, behaviour: ModuleBehaviour) -> Self {
        self.behaviours.insert(module.into(), behaviour);
        self
    }
}

impl UpdateSource for MockSource {
    type Handle = MockUpdater;

    fn open(&mut self, repository_url: &str, module: &str, access_token: Option<&str>) -> MockUpdater {
        self.log.borrow_mut().push(Call::Open {
            module: module.into(),
            url: repository_url.into(),
            token: access_token.map(str::to_owned),
        });
        MockUpdater {
            log: Rc::clone(&self.log),
            module: module.into(),
            behaviour: self.behaviours.get(module).cloned().unwrap_or_default(),
        }
    }
}

pub struct MockUpdater {
    log: CallLog,
    module: String,
    behaviour: ModuleBehaviour,
}

impl ModuleUpdater for MockUpdater {
    fn current_version(&mut self) -> Result<String, UpdateError> {
        self.log.borrow_mut().push(Call::Version(self.module.clone()));
        self.behaviour.version.clone()
    }

    fn download_updates_if_available(&mut self) -> Result<bool, UpdateError> {
        self.log.borrow_mut().push(Call::Download(self.module.clone()));
        self.behaviour.download.clone()
    }

    fn apply_pending_updates_if_available(&mut self) -> Result<bool, UpdateError> {
        self.log.borrow_mut().push(Call::Apply(self.module.clone()));
        self.behaviour.apply.clone()
    }
}

// ── Main application ──────────────────────────────────────────

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppBehaviour {
    Return,
    Fail,
    Panic,
}

pub struct MockApp {
    log: CallLog,
    pub behaviour: AppBehaviour,
    pub environment: Option<AppEnvironment>,
}

impl MockApp {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            behaviour: AppBehaviour::Return,
            environment: None,
        }
    }
}

impl MainApplication for MockApp {
    fn set_environment(&mut self, env: &AppEnvironment) {
        self.log.borrow_mut().push(Call::SetEnvironment);
        self.environment = Some(env.clone());
    }

    fn run(&mut self) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::AppRun);
        match self.behaviour {
            AppBehaviour::Return => Ok(()),
            AppBehaviour::Fail => Err(anyhow::anyhow!("sensor bus unavailable")),
            AppBehaviour::Panic => panic!("main loop crashed"),
        }
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type MockPorts = BootPorts<MockBattery, MockBoard, MockWatchdog, MockNetwork, MemStorage, MockSource>;

/// Shared log, a temp-dir jotter, and boot config with short timings.
pub struct Rig {
    pub log: CallLog,
    pub config: BootConfig,
    pub jotter: Arc<Jotter>,
    _dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(BootConfig {
            battery_settle_ms: 10,
            startup_window_secs: 1,
            startup_poll_ms: 250,
            reset_settle_ms: 5,
            ..BootConfig::default()
        })
    }

    pub fn with_config(config: BootConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let jotter = JotterRegistry::new(dir.path().join("logs")).root();
        Self {
            log: new_log(),
            config,
            jotter,
            _dir: dir,
        }
    }

    /// Ports with a healthy battery and empty storage.
    pub fn ports(&self, volts: f32) -> MockPorts {
        BootPorts {
            battery: MockBattery::new(&self.log, volts),
            board: MockBoard::new(&self.log),
            watchdog: MockWatchdog::new(&self.log),
            network: MockNetwork::new(&self.log),
            storage: MemStorage::new(&self.log),
            updates: MockSource::new(&self.log),
        }
    }

    pub fn journal(&self) -> String {
        self.jotter.entries().join("\n")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }
}
