//! Integration tests for the OTA update cycle.
//!
//! The cycle must end in exactly one reset whatever fails, and the
//! watchdog must be fed ahead of every blocking call.

use crate::mock_hw::{Call, MockNetwork, ModuleBehaviour, Rig, count, is_reset, position, unwind_payload};

use nodeboot::app::ports::{ConnectivityError, UpdateError};
use nodeboot::config::BootConfig;
use nodeboot::drivers::watchdog::HardwareWatchdog;
use nodeboot::error::{BootError, StageOutcome};
use nodeboot::ota::{ModuleOutcome, OtaController};

const FIVE: &[&str] = &["mainloop", "ota_updater", "pybd_expansion", "sensor_payload", "uac_modem"];

fn is_blocking(call: &Call) -> bool {
    matches!(
        call,
        Call::ResetInterface
            | Call::Connect(_)
            | Call::Open { .. }
            | Call::Download(_)
            | Call::Apply(_)
    )
}

#[test]
fn missing_wifi_config_aborts_with_network_unavailable_then_resets() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_modules(&rig.config, FIVE);
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });

    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| *c == Call::HardReset), 1);
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Connect(_) | Call::Open { .. })), 0);
    assert!(
        rig.journal()
            .contains("FAULT: network unavailable: no WiFi credentials configured")
    );
}

#[test]
fn malformed_wifi_config_is_fatal_too() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports
        .storage
        .with_file(&rig.config.wifi_config_path(), "{\"wifi\": {\"ssid\": \"\"}}");
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let report = ota.attempt(&mut ports.watchdog, &mut ports.network, &ports.storage, &mut ports.updates);

    assert!(report.outcome.is_fatal());
    assert!(matches!(report.outcome.error(), Some(BootError::ConfigMalformed { .. })));
    assert!(report.modules.is_empty());
}

#[test]
fn modules_without_config_are_skipped_and_the_rest_attempted() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports
        .storage
        .with_wifi(&rig.config, None)
        .with_modules(&rig.config, &["mainloop", "pybd_expansion", "uac_modem"]);
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let report = ota.attempt(&mut ports.watchdog, &mut ports.network, &ports.storage, &mut ports.updates);

    assert_eq!(report.outcome, StageOutcome::Ok);
    assert_eq!(report.modules.len(), 5);
    assert_eq!(report.attempted(), 3);
    assert!(matches!(
        report.modules[1].outcome,
        ModuleOutcome::Skipped(BootError::ConfigMissing { .. })
    ));
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Open { .. })), 3);

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });
    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| *c == Call::HardReset), 1);
}

#[test]
fn watchdog_is_armed_first_and_fed_before_every_blocking_step() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None).with_modules(&rig.config, FIVE);
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });
    assert!(is_reset(&payload));

    let calls = rig.calls();
    assert_eq!(calls[0], Call::Arm(rig.config.watchdog_timeout_ms));
    for (i, call) in calls.iter().enumerate().filter(|(_, c)| is_blocking(c)) {
        assert_eq!(calls[i - 1], Call::Feed, "{:?} at {} not preceded by a feed", call, i);
    }
    let last_feed = calls.iter().rposition(|c| *c == Call::Feed).unwrap();
    let reset = position(&rig.log, |c| *c == Call::HardReset).unwrap();
    assert!(last_feed < reset);
}

#[test]
fn stalled_connect_is_cut_short_by_the_watchdog_then_resets() {
    let rig = Rig::with_config(BootConfig {
        watchdog_timeout_ms: 50,
        reset_settle_ms: 1,
        ..BootConfig::default()
    });
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None);
    let mut wdt = HardwareWatchdog::new();
    let mut network = MockNetwork::new(&rig.log);
    network.stall_until = Some(wdt.expiry_signal());
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut wdt,
            &mut network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });

    assert!(wdt.expired(), "stall must be observed as a watchdog expiry");
    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| *c == Call::HardReset), 1);
    assert!(rig.journal().contains("WiFi connection timed out"));
}

#[test]
fn connect_failure_skips_every_module_and_resets() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None).with_modules(&rig.config, FIVE);
    ports.network.result = Err(ConnectivityError::ConnectionFailed);
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });

    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Open { .. })), 0);
    let reset_iface = position(&rig.log, |c| *c == Call::ResetInterface).unwrap();
    let connect = position(&rig.log, |c| matches!(c, Call::Connect(_))).unwrap();
    assert!(reset_iface < connect);
}

#[test]
fn failed_download_skips_apply_for_that_module_only() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports
        .storage
        .with_wifi(&rig.config, None)
        .with_modules(&rig.config, &["mainloop", "uac_modem"]);
    ports.updates = ports.updates.with(
        "mainloop",
        ModuleBehaviour {
            download: Err(UpdateError::Transfer("HTTP 503".into())),
            ..ModuleBehaviour::default()
        },
    );
    let ota = OtaController::new(&rig.config, &["mainloop", "uac_modem"], rig.jotter.clone());

    let report = ota.attempt(&mut ports.watchdog, &mut ports.network, &ports.storage, &mut ports.updates);

    assert!(matches!(
        report.modules[0].outcome,
        ModuleOutcome::Failed(BootError::ModuleUpdateFailed { .. })
    ));
    assert_eq!(report.modules[1].outcome, ModuleOutcome::UpToDate);
    assert!(!rig.calls().contains(&Call::Apply("mainloop".into())));
    assert!(rig.calls().contains(&Call::Apply("uac_modem".into())));
    assert!(rig.journal().contains("module update failed: mainloop (transfer failed: HTTP 503)"));
}

#[test]
fn staged_update_is_applied_even_when_nothing_new_was_downloaded() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None).with_modules(&rig.config, &["mainloop"]);
    ports.updates = ports.updates.with(
        "mainloop",
        ModuleBehaviour {
            download: Ok(false),
            apply: Ok(true),
            ..ModuleBehaviour::default()
        },
    );
    let ota = OtaController::new(&rig.config, &["mainloop"], rig.jotter.clone());

    let report = ota.attempt(&mut ports.watchdog, &mut ports.network, &ports.storage, &mut ports.updates);

    assert_eq!(report.updated(), 1);
    assert!(rig.journal().contains("OTA: mainloop updated"));
}

#[test]
fn every_module_failing_still_resets_exactly_once() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None).with_modules(&rig.config, FIVE);
    for &module in FIVE {
        ports.updates.behaviours.insert(
            module.into(),
            ModuleBehaviour {
                apply: Err(UpdateError::Storage("read-only filesystem".into())),
                ..ModuleBehaviour::default()
            },
        );
    }
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });

    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| matches!(c, Call::Apply(_))), FIVE.len());
    assert_eq!(count(&rig.log, |c| *c == Call::HardReset), 1);
    assert!(rig.journal().contains("OTA: 5 attempted, 0 updated"));
}

#[test]
fn adapter_panic_does_not_skip_the_reset() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports.storage.with_wifi(&rig.config, None);
    ports.network.panic_on_connect = true;
    let ota = OtaController::new(&rig.config, FIVE, rig.jotter.clone());

    let payload = unwind_payload(|| {
        ota.run_update_cycle(
            &mut ports.watchdog,
            &mut ports.network,
            &ports.storage,
            &mut ports.updates,
            &mut ports.board,
        );
    });

    assert!(is_reset(&payload));
    assert_eq!(count(&rig.log, |c| *c == Call::HardReset), 1);
    assert!(rig.journal().contains("cycle aborted by panic"));
}

#[test]
fn access_token_reaches_every_updater() {
    let rig = Rig::new();
    let mut ports = rig.ports(3.9);
    ports.storage = ports
        .storage
        .with_wifi(&rig.config, Some("ghp_fieldtoken"))
        .with_modules(&rig.config, &["mainloop", "uac_modem"]);
    let ota = OtaController::new(&rig.config, &["mainloop", "uac_modem"], rig.jotter.clone());

    ota.attempt(&mut ports.watchdog, &mut ports.network, &ports.storage, &mut ports.updates);

    let calls = rig.calls();
    let opens: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::Open { module, url, token } => Some((module.as_str(), url.as_str(), token.as_deref())),
            _ => None,
        })
        .collect();
    assert_eq!(
        opens,
        vec![
            ("mainloop", "https://updates.example/mainloop", Some("ghp_fieldtoken")),
            ("uac_modem", "https://updates.example/uac_modem", Some("ghp_fieldtoken")),
        ]
    );
}
