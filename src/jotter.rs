//! Jotter: append-only diagnostic notes on flash.
//!
//! Not a logger so much as a notebook: each named [`Jotter`] owns one text
//! file, `<log_dir>/<name>.log`, and every call appends exactly one line:
//!
//! ```text
//! 2026-03-01 04:12:55 - nodeboot::ota - 212 - OTA: connect failed
//! ```
//!
//! On a headless node this file is the only record of why the last boot
//! went wrong, so writing to it must never fail the caller: storage that is
//! absent or full turns the Jotter into a silent no-op.
//!
//! Handles come from a [`JotterRegistry`] created once at startup and passed
//! to every component that logs.  The registry hands out one shared
//! `Arc<Jotter>` per name; each Jotter serialises its own file writes.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDateTime;
use log::debug;

/// Name of the default jotter.
pub const ROOT_JOTTER: &str = "root";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upper bound on the ring slots `tail` reserves before reading.
const TAIL_PREALLOC: usize = 32;

/// Wall-clock source for entry timestamps.
pub type ClockFn = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Append one jotter entry tagged with the calling module and line.
///
/// ```ignore
/// jot!(jotter, "OTA: {} modules updated", n);
/// ```
#[macro_export]
macro_rules! jot {
    ($jotter:expr, $($arg:tt)+) => {
        $jotter.record_at(
            &::std::format!($($arg)+),
            ::core::option::Option::Some(::core::module_path!()),
            ::core::option::Option::Some(::core::line!()),
            ::core::option::Option::None,
        )
    };
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

/// Process-wide set of named jotters.
pub struct JotterRegistry {
    log_dir: PathBuf,
    clock: ClockFn,
    jotters: Mutex<HashMap<String, Arc<Jotter>>>,
}

impl JotterRegistry {
    /// Registry writing under `log_dir`, stamped with local time.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(log_dir, local_now)
    }

    pub fn with_clock(log_dir: impl Into<PathBuf>, clock: ClockFn) -> Self {
        Self {
            log_dir: log_dir.into(),
            clock,
            jotters: Mutex::new(HashMap::new()),
        }
    }

    /// The jotter for `name`, created (with its directory) on first use.
    pub fn get(&self, name: &str) -> Arc<Jotter> {
        let mut jotters = self.jotters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = jotters.get(name) {
            return Arc::clone(existing);
        }

        if let Err(e) = fs::create_dir_all(&self.log_dir) {
            debug!("Jotter: cannot create {} ({})", self.log_dir.display(), e);
        }
        let jotter = Arc::new(Jotter {
            name: name.into(),
            path: self.log_dir.join(format!("{name}.log")),
            clock: self.clock,
            write_lock: Mutex::new(()),
        });
        jotters.insert(name.into(), Arc::clone(&jotter));
        jotter
    }

    /// Shorthand for `get(ROOT_JOTTER)`.
    pub fn root(&self) -> Arc<Jotter> {
        self.get(ROOT_JOTTER)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

// ───────────────────────────────────────────────────────────────
// Jotter
// ───────────────────────────────────────────────────────────────

/// One append-only log file.
pub struct Jotter {
    name: String,
    path: PathBuf,
    clock: ClockFn,
    write_lock: Mutex<()>,
}

impl Jotter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the file.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = File::create(&self.path) {
            debug!("Jotter[{}]: clear failed ({})", self.name, e);
        }
    }

    /// Append a plain message.
    pub fn record(&self, message: &str) {
        self.record_at(message, None, None, None);
    }

    /// Append a message with an optional source location.
    pub fn record_at(
        &self,
        message: &str,
        source: Option<&str>,
        line: Option<u32>,
        function: Option<&str>,
    ) {
        let line = format_entry(self.timestamp(), message, source, line, function);
        self.append(&line);
    }

    /// Append an error and its `source()` chain as one entry.
    pub fn record_fault(&self, fault: &dyn std::error::Error) {
        let mut rendered = format!("FAULT: {fault}");
        let mut cause = fault.source();
        while let Some(c) = cause {
            rendered.push_str(" <- ");
            rendered.push_str(&c.to_string());
            cause = c.source();
        }
        self.record(&rendered);
    }

    /// Every entry, oldest first.  Empty if the file is missing.
    pub fn entries(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.for_each_entry(|entry| out.push(entry));
        out
    }

    /// The last `n` entries, oldest first.
    ///
    /// Streams the file through a ring that grows to at most `min(n, m)`
    /// entries, so memory use is bounded by the shorter of the two.
    pub fn tail(&self, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }
        let mut ring: VecDeque<String> = VecDeque::with_capacity(n.min(TAIL_PREALLOC));
        self.for_each_entry(|entry| {
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(entry);
        });
        ring.into()
    }

    /// Print every entry to the console.
    pub fn dump(&self) {
        self.for_each_entry(|entry| println!("{entry}"));
    }

    /// Print the last `n` entries to the console.
    pub fn dump_tail(&self, n: usize) {
        for entry in self.tail(n) {
            println!("{entry}");
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn timestamp(&self) -> String {
        (self.clock)().format(TIMESTAMP_FORMAT).to_string()
    }

    fn append(&self, line: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| {
                f.write_all(line.as_bytes())?;
                f.write_all(b"\n")
            });
        if let Err(e) = result {
            debug!("Jotter[{}]: write dropped ({})", self.name, e);
        }
    }

    fn for_each_entry(&self, mut f: impl FnMut(String)) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                debug!("Jotter[{}]: read failed ({})", self.name, e);
                return;
            }
        };
        // A torn write leaves invalid UTF-8; keep it lossy and read on.
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    f(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("Jotter[{}]: read stopped ({})", self.name, e);
                    return;
                }
            }
        }
    }
}

/// Render one entry.  Embedded newlines are folded so an entry is always
/// exactly one line.
fn format_entry(
    timestamp: String,
    message: &str,
    source: Option<&str>,
    line: Option<u32>,
    function: Option<&str>,
) -> String {
    let mut out = timestamp;
    out.push_str(" - ");
    if let Some(source) = source.filter(|s| !s.is_empty()) {
        out.push_str(source);
        out.push_str(" - ");
    }
    if let Some(line) = line {
        out.push_str(&line.to_string());
        out.push_str(" - ");
    }
    if let Some(function) = function.filter(|s| !s.is_empty()) {
        out.push_str(function);
        out.push_str(" - ");
    }
    for (i, part) in message.lines().enumerate() {
        if i > 0 {
            out.push_str(" | ");
        }
        out.push_str(part);
    }
    out
}
