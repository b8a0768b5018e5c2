//! Module store: the on-flash [`UpdateSource`] for OTA modules.
//!
//! Each module lives in its own directory under the store root:
//!
//! ```text
//! <root>/<module>/main/           live code, `.version` inside
//! <root>/<module>/next/           staged update, complete once `.version` exists
//! <root>/<module>/old/            transient, only during apply
//! ```
//!
//! The remote side is a static file host.  Each repository URL serves
//! `manifest.json`:
//!
//! ```json
//! { "version": "1.4.2",
//!   "files": [ { "path": "mainloop.py", "url": "files/mainloop.py", "sha256": "…" } ] }
//! ```
//!
//! Download stages every file into `next/`, checks each SHA-256, and
//! writes `next/.version` last.  Apply swaps directories with renames, so
//! an interrupted apply leaves either the old or the new tree in `main/`
//! (or `old/`, restored on the next apply).

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::app::ports::{ModuleUpdater, UpdateError, UpdateSource};

const MANIFEST_FILE: &str = "manifest.json";
const VERSION_FILE: &str = ".version";
const MAIN_DIR: &str = "main";
const NEXT_DIR: &str = "next";
const OLD_DIR: &str = "old";

/// Version reported for a module with no `.version` file.
pub const UNVERSIONED: &str = "0.0";

/// Largest single file accepted from the remote.
pub const MAX_FILE_BYTES: usize = 512 * 1024;

// ---------------------------------------------------------------------------
// HTTP port
// ---------------------------------------------------------------------------

/// Blocking HTTP GET.  Implementations must bound their own timeouts below
/// the watchdog period.
pub trait HttpFetch {
    fn get(&mut self, url: &str, access_token: Option<&str>) -> Result<Vec<u8>, UpdateError>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    version: String,
    #[serde(default)]
    files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    path: String,
    url: String,
    sha256: String,
}

// ---------------------------------------------------------------------------
// Store (factory)
// ---------------------------------------------------------------------------

pub struct ModuleStore<F> {
    root: PathBuf,
    fetch: F,
    on_progress: Option<fn()>,
}

impl<F: HttpFetch + Clone> ModuleStore<F> {
    pub fn new(root: impl Into<PathBuf>, fetch: F) -> Self {
        Self {
            root: root.into(),
            fetch,
            on_progress: None,
        }
    }

    /// Called before every network request, e.g. to feed a watchdog
    /// through long multi-file downloads.
    pub fn with_progress_hook(mut self, hook: fn()) -> Self {
        self.on_progress = Some(hook);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl<F: HttpFetch + Clone> UpdateSource for ModuleStore<F> {
    type Handle = ModuleHandle<F>;

    fn open(&mut self, repository_url: &str, module: &str, access_token: Option<&str>) -> Self::Handle {
        ModuleHandle {
            module: module.into(),
            dir: self.root.join(module),
            repository_url: repository_url.trim_end_matches('/').into(),
            access_token: access_token.map(str::to_owned),
            fetch: self.fetch.clone(),
            on_progress: self.on_progress,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-module handle
// ---------------------------------------------------------------------------

pub struct ModuleHandle<F> {
    module: String,
    dir: PathBuf,
    repository_url: String,
    access_token: Option<String>,
    fetch: F,
    on_progress: Option<fn()>,
}

impl<F: HttpFetch> ModuleHandle<F> {
    fn main_dir(&self) -> PathBuf {
        self.dir.join(MAIN_DIR)
    }

    fn next_dir(&self) -> PathBuf {
        self.dir.join(NEXT_DIR)
    }

    fn old_dir(&self) -> PathBuf {
        self.dir.join(OLD_DIR)
    }

    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, UpdateError> {
        if let Some(hook) = self.on_progress {
            hook();
        }
        debug!("ModuleStore[{}]: GET {}", self.module, url);
        self.fetch.get(url, self.access_token.as_deref())
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.into()
        } else {
            format!("{}/{}", self.repository_url, url.trim_start_matches('/'))
        }
    }

    fn fetch_manifest(&mut self) -> Result<Manifest, UpdateError> {
        let url = format!("{}/{}", self.repository_url, MANIFEST_FILE);
        let body = self.fetch(&url)?;
        let manifest: Manifest =
            serde_json::from_slice(&body).map_err(|e| UpdateError::Manifest(e.to_string()))?;
        if manifest.version.trim().is_empty() {
            return Err(UpdateError::Manifest("empty version".into()));
        }
        Ok(manifest)
    }

    /// Fetch, verify, and write every manifest file under `next/`.
    fn stage(&mut self, manifest: &Manifest) -> Result<(), UpdateError> {
        let next = self.next_dir();
        remove_dir_if_present(&next)?;
        fs::create_dir_all(&next).map_err(storage)?;

        for file in &manifest.files {
            let rel = safe_relative(&file.path)?;
            let url = self.absolute_url(&file.url);
            let body = self.fetch(&url)?;
            if body.len() > MAX_FILE_BYTES {
                return Err(UpdateError::Transfer(format!("{} exceeds size limit", file.path)));
            }
            if !digest_matches(&body, &file.sha256) {
                return Err(UpdateError::Integrity {
                    path: file.path.clone(),
                });
            }
            let target = next.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(storage)?;
            }
            fs::write(&target, &body).map_err(storage)?;
        }

        // Written last: marks the stage complete.
        fs::write(next.join(VERSION_FILE), manifest.version.trim()).map_err(storage)
    }
}

impl<F: HttpFetch> ModuleUpdater for ModuleHandle<F> {
    fn current_version(&mut self) -> Result<String, UpdateError> {
        match fs::read_to_string(self.main_dir().join(VERSION_FILE)) {
            Ok(v) => Ok(v.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(UNVERSIONED.into()),
            Err(e) => Err(storage(e)),
        }
    }

    fn download_updates_if_available(&mut self) -> Result<bool, UpdateError> {
        let current = self.current_version()?;
        let manifest = self.fetch_manifest()?;
        let latest = manifest.version.trim();
        if latest == current {
            info!("ModuleStore[{}]: up to date ({})", self.module, current);
            return Ok(false);
        }

        info!("ModuleStore[{}]: staging {} -> {}", self.module, current, latest);
        if let Err(e) = self.stage(&manifest) {
            warn!("ModuleStore[{}]: staging failed ({})", self.module, e);
            let _ = remove_dir_if_present(&self.next_dir());
            return Err(e);
        }
        Ok(true)
    }

    fn apply_pending_updates_if_available(&mut self) -> Result<bool, UpdateError> {
        let main = self.main_dir();
        let next = self.next_dir();
        let old = self.old_dir();

        // A previous apply died between the two renames.
        if !main.exists() && old.exists() {
            warn!("ModuleStore[{}]: restoring interrupted apply", self.module);
            fs::rename(&old, &main).map_err(storage)?;
        }

        if !next.join(VERSION_FILE).is_file() {
            if next.exists() {
                debug!("ModuleStore[{}]: discarding incomplete stage", self.module);
                remove_dir_if_present(&next)?;
            }
            return Ok(false);
        }

        remove_dir_if_present(&old)?;
        if main.exists() {
            fs::rename(&main, &old).map_err(storage)?;
        }
        if let Err(e) = fs::rename(&next, &main) {
            if old.exists() {
                let _ = fs::rename(&old, &main);
            }
            return Err(storage(e));
        }
        remove_dir_if_present(&old)?;

        let version = self.current_version()?;
        info!("ModuleStore[{}]: applied {}", self.module, version);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ESP-IDF HTTP client
// ---------------------------------------------------------------------------

/// HTTPS GET through the ESP-IDF client with the certificate bundle.
#[cfg(target_os = "espidf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EspHttpFetch;

#[cfg(target_os = "espidf")]
impl HttpFetch for EspHttpFetch {
    fn get(&mut self, url: &str, access_token: Option<&str>) -> Result<Vec<u8>, UpdateError> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection, FollowRedirectsPolicy};

        let transfer = |e: esp_idf_svc::sys::EspError| UpdateError::Transfer(e.to_string());

        let mut conn = EspHttpConnection::new(&Configuration {
            buffer_size: Some(4096),
            buffer_size_tx: Some(1024),
            timeout: Some(core::time::Duration::from_secs(20)),
            follow_redirects_policy: FollowRedirectsPolicy::FollowAll,
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(transfer)?;

        let auth;
        let mut headers: Vec<(&str, &str)> = vec![("User-Agent", "nodeboot")];
        if let Some(token) = access_token {
            auth = format!("token {token}");
            headers.push(("Authorization", &auth));
        }

        conn.initiate_request(Method::Get, url, &headers).map_err(transfer)?;
        conn.initiate_response().map_err(transfer)?;
        let status = conn.status();
        if !(200..300).contains(&status) {
            return Err(UpdateError::Transfer(format!("HTTP {status} for {url}")));
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = conn.read(&mut buf).map_err(transfer)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_FILE_BYTES {
                return Err(UpdateError::Transfer(format!("{url} exceeds size limit")));
            }
            body.extend_from_slice(&buf[..n]);
        }
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage(e: std::io::Error) -> UpdateError {
    UpdateError::Storage(e.to_string())
}

fn remove_dir_if_present(dir: &Path) -> Result<(), UpdateError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(storage(e)),
    }
}

/// Reject manifest paths that would escape `next/`.
fn safe_relative(path: &str) -> Result<&Path, UpdateError> {
    let p = Path::new(path);
    if path.is_empty()
        || path == VERSION_FILE
        || !p.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(UpdateError::Manifest(format!("bad file path '{path}'")));
    }
    Ok(p)
}

fn to_hex(bytes: &[u8]) -> String {
    use core::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn digest_matches(body: &[u8], expected_hex: &str) -> bool {
    to_hex(&hmac_sha256::Hash::hash(body)).eq_ignore_ascii_case(expected_hex.trim())
}
