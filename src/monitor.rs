//! Rescans the device lists every few seconds so unplugged inputs are
//! released and new ones picked up by re-invoking listen().

use std::{thread, time::Duration};

use crate::listener::MidiRx;

/// Background driver that keeps a `MidiRx`'s subscriptions in sync with the
/// current set of connected input devices.
pub struct MidiDeviceMonitor {
    _handle: thread::JoinHandle<()>, // keeps the monitor thread alive
}

impl MidiDeviceMonitor {
    pub fn start(mut midi: MidiRx, every: Duration) -> Self {
        let handle = thread::spawn(move || {
            loop {
                thread::sleep(every);

                // A refresh only updates the lists; new devices require
                // another listen() pass.
                match midi.refresh() {
                    Ok(()) => {
                        let attached = midi.listen();
                        if attached > 0 {
                            log::info!("Attached {attached} new input(s)");
                        }
                        log::debug!(
                            "{} subscription(s), {} invalid message(s) so far",
                            midi.subscription_count(),
                            midi.invalid_count()
                        );
                    }
                    Err(e) => log::warn!("Device rescan failed: {e:#}"),
                }
            }
        });

        Self { _handle: handle }
    }
}
