//! Panic capture.
//!
//! A panic on a headless node is otherwise invisible: the console is not
//! attached and the reset wipes RAM.  The hook installed here writes the
//! panic message and location into a Jotter before chaining to the
//! previous hook (on the device, the ESP-IDF abort path that resets).

use std::any::Any;
use std::sync::Arc;

use crate::jotter::Jotter;

/// Human-readable text of a panic payload.
pub fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Install a panic hook that jots the panic before the default handling.
///
/// Call once during init, after the Jotter's storage is mounted.  If the
/// storage is gone by the time of the panic the entry is simply lost.
pub fn install_panic_handler(jotter: Arc<Jotter>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = panic_reason(info.payload());
        log::error!("PANIC: {}", reason);

        let location = info.location();
        jotter.record_at(
            &format!("PANIC: {reason}"),
            location.map(|l| l.file()),
            location.map(|l| l.line()),
            None,
        );

        previous(info);
    }));
}
