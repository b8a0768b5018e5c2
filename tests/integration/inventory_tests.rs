//! Integration tests for the installed-version inventory.

use crate::mock_hw::{Call, MemStorage, MockSource, ModuleBehaviour, Rig, count};

use nodeboot::app::ports::UpdateError;
use nodeboot::inventory::collect_installed_versions;

const MODULES: &[&str] = &["mainloop", "ota_updater", "sensor_payload", "uac_modem"];

#[test]
fn only_configured_modules_are_queried() {
    let rig = Rig::new();
    let storage = MemStorage::new(&rig.log).with_modules(&rig.config, &["mainloop", "uac_modem"]);
    let mut source = MockSource::new(&rig.log);

    let record = collect_installed_versions(MODULES, &storage, &rig.config, &mut source, &rig.jotter);

    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["mainloop", "uac_modem"]);
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Version(_))), 2);
    assert!(rig.jotter.entries().is_empty(), "absent config is not a fault");
}

#[test]
fn inventory_never_passes_a_token_or_touches_the_network() {
    let rig = Rig::new();
    let storage = MemStorage::new(&rig.log).with_modules(&rig.config, MODULES);
    let mut source = MockSource::new(&rig.log);

    collect_installed_versions(MODULES, &storage, &rig.config, &mut source, &rig.jotter);

    for call in rig.calls() {
        if let Call::Open { token, .. } = call {
            assert_eq!(token, None);
        }
    }
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Download(_) | Call::Apply(_))), 0);
}

#[test]
fn malformed_config_and_failed_query_are_left_out_and_jotted() {
    let rig = Rig::new();
    let storage = MemStorage::new(&rig.log)
        .with_modules(&rig.config, &["mainloop", "uac_modem"])
        .with_file(&rig.config.module_config_path("sensor_payload"), "not json");
    let mut source = MockSource::new(&rig.log).with(
        "uac_modem",
        ModuleBehaviour {
            version: Err(UpdateError::Storage("no such directory".into())),
            ..ModuleBehaviour::default()
        },
    );

    let record = collect_installed_versions(MODULES, &storage, &rig.config, &mut source, &rig.jotter);

    assert_eq!(record.len(), 1);
    assert_eq!(record["mainloop"], "1.0");
    let journal = rig.journal();
    assert!(journal.contains("FAULT: config malformed: config/sensor_payload_gitrepo_cfg.json"));
    assert!(journal.contains("uac_modem version unknown"));
}
