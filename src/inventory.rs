//! Version inventory: what is installed, without touching the network.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::app::ports::{ModuleUpdater, StoragePort, UpdateSource};
use crate::config::{BootConfig, load_module_config};
use crate::error::BootError;
use crate::jot;
use crate::jotter::Jotter;

/// Module name → installed version token.  Ordered for stable output.
pub type ModuleVersionRecord = BTreeMap<String, String>;

/// Ask each configured module for its installed version.
///
/// Modules without a repository config are skipped silently.  A module
/// whose config is malformed or whose version query fails is logged and
/// left out of the result; the rest are still collected.
pub fn collect_installed_versions<S: UpdateSource>(
    modules: &[&str],
    storage: &impl StoragePort,
    config: &BootConfig,
    source: &mut S,
    jotter: &Jotter,
) -> ModuleVersionRecord {
    let mut record = ModuleVersionRecord::new();

    for &module in modules {
        let module_cfg = match load_module_config(storage, config, module) {
            Ok(cfg) => cfg,
            Err(BootError::ConfigMissing { .. }) => {
                debug!("Inventory: {} not configured", module);
                continue;
            }
            Err(e) => {
                warn!("Inventory: {} skipped ({})", module, e);
                jotter.record_fault(&e);
                continue;
            }
        };

        let mut updater = source.open(&module_cfg.repository_url, module, None);
        match updater.current_version() {
            Ok(version) => {
                record.insert(module.into(), version);
            }
            Err(reason) => {
                warn!("Inventory: {} version unknown ({})", module, reason);
                jot!(jotter, "Inventory: {} version unknown ({})", module, reason);
            }
        }
    }

    info!("Inventory: {} of {} modules reported a version", record.len(), modules.len());
    record
}

/// Print the inventory to the console, one `module : version` per line.
pub fn print_installed_versions(record: &ModuleVersionRecord) {
    if record.is_empty() {
        return;
    }
    println!("Installed Modules");
    for (module, version) in record {
        println!("{module} : {version}");
    }
}
