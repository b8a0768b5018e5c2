//! Hardware watchdog driver.
//!
//! Wraps the ESP-IDF Task Watchdog Timer (TWDT).  Arming reconfigures the
//! TWDT with the update-cycle timeout and panic-on-trigger, then subscribes
//! the calling task; from then on the task must call `feed()` more often
//! than the timeout or the chip resets.  There is no disarm.
//!
//! On the host a monitor thread stands in for the timer: it latches
//! [`HardwareWatchdog::expired`] when the feed gap exceeds the timeout, so
//! tests can observe a stall the way the hardware would.

use log::{info, warn};

use crate::app::ports::WatchdogPort;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(target_os = "espidf"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(target_os = "espidf"))]
use std::sync::{Arc, Mutex, PoisonError};
#[cfg(not(target_os = "espidf"))]
use std::time::{Duration, Instant};

#[cfg(not(target_os = "espidf"))]
struct SimTimer {
    timeout: Duration,
    last_feed: Mutex<Instant>,
    expired: Arc<AtomicBool>,
    alive: AtomicBool,
}

pub struct HardwareWatchdog {
    armed: bool,
    #[cfg(not(target_os = "espidf"))]
    sim: Option<Arc<SimTimer>>,
    #[cfg(not(target_os = "espidf"))]
    expired: Arc<AtomicBool>,
}

impl Default for HardwareWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareWatchdog {
    pub fn new() -> Self {
        Self {
            armed: false,
            #[cfg(not(target_os = "espidf"))]
            sim: None,
            #[cfg(not(target_os = "espidf"))]
            expired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Simulation: whether the feed gap ever exceeded the timeout.
    #[cfg(not(target_os = "espidf"))]
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Simulation: shared expiry latch, for collaborators that stall until
    /// the watchdog fires.
    #[cfg(not(target_os = "espidf"))]
    pub fn expiry_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.expired)
    }

    #[cfg(target_os = "espidf")]
    fn platform_arm(&mut self, timeout_ms: u32) {
        // SAFETY: TWDT API calls from the single boot task.
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK as i32 {
                warn!("Watchdog: reconfigure returned {} (may already be configured)", ret);
            }
            let ret = esp_task_wdt_add(core::ptr::null_mut());
            if ret != ESP_OK as i32 {
                warn!("Watchdog: failed to subscribe ({})", ret);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_arm(&mut self, timeout_ms: u32) {
        let timer = Arc::new(SimTimer {
            timeout: Duration::from_millis(u64::from(timeout_ms)),
            last_feed: Mutex::new(Instant::now()),
            expired: Arc::clone(&self.expired),
            alive: AtomicBool::new(true),
        });
        let monitor = Arc::clone(&timer);
        let tick = (monitor.timeout / 10).clamp(Duration::from_millis(1), Duration::from_millis(10));
        std::thread::spawn(move || {
            while monitor.alive.load(Ordering::SeqCst) {
                std::thread::sleep(tick);
                let last = *monitor.last_feed.lock().unwrap_or_else(PoisonError::into_inner);
                if last.elapsed() > monitor.timeout {
                    warn!("Watchdog(sim): expired after {:?} without a feed", monitor.timeout);
                    monitor.expired.store(true, Ordering::SeqCst);
                    break;
                }
            }
        });
        self.sim = Some(timer);
    }

    #[cfg(target_os = "espidf")]
    fn platform_feed(&mut self) {
        // SAFETY: the calling task was subscribed in platform_arm.
        unsafe {
            esp_task_wdt_reset();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_feed(&mut self) {
        if let Some(timer) = &self.sim {
            *timer.last_feed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        }
    }
}

impl WatchdogPort for HardwareWatchdog {
    fn arm(&mut self, timeout_ms: u32) {
        if self.armed {
            warn!("Watchdog: already armed, ignoring re-arm");
            return;
        }
        self.platform_arm(timeout_ms);
        self.armed = true;
        info!("Watchdog: armed ({} ms timeout, reset on expiry)", timeout_ms);
    }

    fn feed(&mut self) {
        if self.armed {
            self.platform_feed();
        }
    }
}

/// Feed the TWDT on behalf of the calling task without a handle.  Used as
/// the module store's progress hook during multi-file downloads.
#[cfg(target_os = "espidf")]
pub fn feed_task_watchdog() {
    // SAFETY: returns an error code, ignored, if the task is not subscribed.
    unsafe {
        esp_task_wdt_reset();
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn feed_task_watchdog() {}

#[cfg(not(target_os = "espidf"))]
impl Drop for HardwareWatchdog {
    fn drop(&mut self) {
        if let Some(timer) = &self.sim {
            timer.alive.store(false, Ordering::SeqCst);
        }
    }
}
