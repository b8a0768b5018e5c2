//! Fuzz target: on-flash config parsers
//!
//! Feeds arbitrary bytes to the WiFi, module-repository and boot config
//! loaders and verifies:
//! - No panics under arbitrary input
//! - Accepted WiFi credentials always satisfy the SSID/password bounds
//! - An accepted boot config always passes `validate`
//!
//! cargo fuzz run fuzz_config_parsers

#![no_main]

use libfuzzer_sys::fuzz_target;
use nodeboot::config::{
    BOOT_CONFIG_PATH, BootConfig, load_boot_config, parse_module_config, parse_wifi_config,
};

// ── In-memory StoragePort for fuzz testing ────────────────────

use nodeboot::app::ports::{StorageError, StoragePort};
use std::collections::HashMap;

struct MemStore {
    data: HashMap<String, String>,
}

impl StoragePort for MemStore {
    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        self.data.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let text = String::from_utf8(data.to_vec()).map_err(|_| StorageError::InvalidData)?;
        self.data.insert(path.into(), text);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), StorageError> {
        self.data.remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.data.contains_key(path)
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Ok(creds) = parse_wifi_config("config/wifi_cfg.json", text) {
        assert!(!creds.ssid().is_empty() && creds.ssid().len() <= 32);
        let pw = creds.password().len();
        assert!(pw == 0 || (8..=64).contains(&pw), "password length {pw} accepted");
    }

    if let Ok(module) = parse_module_config("config/m_gitrepo_cfg.json", "m", text) {
        assert!(!module.repository_url.trim().is_empty());
    }

    let mut store = MemStore { data: HashMap::new() };
    store.data.insert(BOOT_CONFIG_PATH.into(), text.into());
    if let Ok(cfg) = load_boot_config(&store) {
        assert!(cfg.validate().is_ok());
    } else {
        // Callers fall back to the defaults, which must themselves be valid.
        assert!(BootConfig::default().validate().is_ok());
    }
});
