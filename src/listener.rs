//! Binds the decoder to every available input device and forwards decoded
//! messages to the downstream sink.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

use crate::device::{DeviceAccess, MidiDevices, RawMessageCallback, Subscription};
use crate::message::{MessageKind, NoteMessage, RxEvent, SourceId, decode};

/// Receive side of the MIDI pipeline.
///
/// Construction leaves it inert; `initialize` performs the one-time device
/// access request, and `listen` attaches one subscription per input device.
/// Subscriptions are never attached implicitly: after a `refresh` of the
/// device lists, `listen` must be invoked again to pick up new devices.
pub struct MidiRx {
    access: Box<dyn DeviceAccess>,
    devices: Option<MidiDevices>,
    subscriptions: HashMap<String, Box<dyn Subscription>>,
    sink: Sender<RxEvent>,
    filter: Option<String>,
    invalid_count: Arc<AtomicU64>,
}

impl MidiRx {
    pub fn new(access: Box<dyn DeviceAccess>, sink: Sender<RxEvent>) -> Self {
        Self {
            access,
            devices: None,
            subscriptions: HashMap::new(),
            sink,
            filter: None,
            invalid_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Only listen to inputs whose name contains `filter` (case-insensitive).
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into().to_lowercase());
        self
    }

    /// Requests the device lists from the platform layer. On denial the
    /// error propagates and no subscriptions are ever attached.
    pub fn initialize(&mut self) -> Result<()> {
        let devices = self
            .access
            .request()
            .context("requesting MIDI device access")?;

        log::info!(
            "{} MIDI input(s), {} output(s) available",
            devices.inputs.len(),
            devices.outputs.len()
        );
        for output in &devices.outputs {
            log::debug!("output present (unused): {}", output.name);
        }

        self.devices = Some(devices);
        Ok(())
    }

    /// Attaches a subscription to every known input that passes the filter
    /// and is not already subscribed. Returns the number newly attached.
    /// A no-op before `initialize` has succeeded.
    pub fn listen(&mut self) -> usize {
        let Some(devices) = &self.devices else {
            return 0;
        };

        let mut attached = 0;
        for input in &devices.inputs {
            let name = input.name();
            if !filter_matches(self.filter.as_deref(), name) {
                continue;
            }
            if self.subscriptions.contains_key(name) {
                continue;
            }

            let source = SourceId::new(name);
            let sink = self.sink.clone();
            let invalid = Arc::clone(&self.invalid_count);
            let on_message: RawMessageCallback = Box::new(move |bytes| {
                let Some(msg) = decode(&source, bytes) else {
                    return;
                };
                if msg.kind == MessageKind::Invalid {
                    invalid.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "unrecognized status byte {:#04x} from {}",
                        bytes[0],
                        source.name()
                    );
                }
                let event = match NoteMessage::from_decoded(&msg) {
                    Some(note) => RxEvent::Note(note),
                    None => RxEvent::Other(msg),
                };
                sink.send(event).ok();
            });

            match input.subscribe(on_message) {
                Ok(subscription) => {
                    log::info!("🎹 Connected to {name}");
                    self.subscriptions.insert(name.to_string(), subscription);
                    attached += 1;
                }
                Err(e) => {
                    log::warn!("Failed to connect to {name}: {e:#}");
                }
            }
        }

        attached
    }

    /// Re-requests the device lists and drops subscriptions whose device has
    /// vanished. Attaches nothing: call `listen` again for new devices.
    pub fn refresh(&mut self) -> Result<()> {
        let devices = self.access.request()?;

        let present: HashSet<&str> = devices.inputs.iter().map(|d| d.name()).collect();
        self.subscriptions.retain(|name, _| {
            if present.contains(name.as_str()) {
                true
            } else {
                log::info!("🎹 Disconnected {name}");
                false
            }
        });

        self.devices = Some(devices);
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Messages classified `Invalid` since startup.
    pub fn invalid_count(&self) -> u64 {
        self.invalid_count.load(Ordering::Relaxed)
    }
}

fn filter_matches(filter: Option<&str>, name: &str) -> bool {
    filter.is_none_or(|f| name.to_lowercase().contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InputDevice, OutputInfo};
    use std::sync::Mutex;
    use std::sync::mpsc::{Receiver, channel};

    type SharedCallbacks = Arc<Mutex<Vec<RawMessageCallback>>>;
    type SharedNames = Arc<Mutex<Vec<String>>>;

    struct FakeInput {
        name: String,
        callbacks: SharedCallbacks,
    }

    impl InputDevice for FakeInput {
        fn name(&self) -> &str {
            &self.name
        }

        fn subscribe(&self, on_message: RawMessageCallback) -> Result<Box<dyn Subscription>> {
            self.callbacks.lock().unwrap().push(on_message);
            Ok(Box::new(FakeSubscription))
        }
    }

    struct FakeSubscription;
    impl Subscription for FakeSubscription {}

    struct FakeAccess {
        names: SharedNames,
        callbacks: SharedCallbacks,
    }

    impl DeviceAccess for FakeAccess {
        fn request(&self) -> Result<MidiDevices> {
            let inputs = self
                .names
                .lock()
                .unwrap()
                .iter()
                .map(|name| {
                    Box::new(FakeInput {
                        name: name.clone(),
                        callbacks: Arc::clone(&self.callbacks),
                    }) as Box<dyn InputDevice>
                })
                .collect();
            Ok(MidiDevices {
                inputs,
                outputs: vec![OutputInfo {
                    name: "fake-output".into(),
                }],
            })
        }
    }

    struct DeniedAccess;

    impl DeviceAccess for DeniedAccess {
        fn request(&self) -> Result<MidiDevices> {
            Err(anyhow::anyhow!("access denied"))
        }
    }

    fn rig(input_names: &[&str]) -> (MidiRx, Receiver<RxEvent>, SharedCallbacks, SharedNames) {
        let names: SharedNames =
            Arc::new(Mutex::new(input_names.iter().map(|n| n.to_string()).collect()));
        let callbacks: SharedCallbacks = Arc::new(Mutex::new(Vec::new()));
        let access = FakeAccess {
            names: Arc::clone(&names),
            callbacks: Arc::clone(&callbacks),
        };
        let (tx, rx) = channel();
        (MidiRx::new(Box::new(access), tx), rx, callbacks, names)
    }

    fn fire(callbacks: &SharedCallbacks, bytes: &[u8]) {
        for cb in callbacks.lock().unwrap().iter_mut() {
            cb(bytes);
        }
    }

    #[test]
    fn listen_before_initialization_is_inert() {
        let (mut midi, _rx, _callbacks, _names) = rig(&["kb"]);
        assert_eq!(midi.listen(), 0);
        assert_eq!(midi.subscription_count(), 0);
    }

    #[test]
    fn listen_attaches_one_subscription_per_input() {
        let (mut midi, _rx, _callbacks, _names) = rig(&["kb-1", "kb-2"]);
        midi.initialize().unwrap();
        assert_eq!(midi.listen(), 2);
        assert_eq!(midi.subscription_count(), 2);
        // Already subscribed, nothing new to attach.
        assert_eq!(midi.listen(), 0);
        assert_eq!(midi.subscription_count(), 2);
    }

    #[test]
    fn note_messages_reach_the_sink_enriched() {
        let (mut midi, rx, callbacks, _names) = rig(&["kb"]);
        midi.initialize().unwrap();
        midi.listen();

        fire(&callbacks, &[0x90, 60, 100]);

        match rx.try_recv().unwrap() {
            RxEvent::Note(note) => {
                assert_eq!(note.kind, MessageKind::NoteOn);
                assert_eq!(note.note, "C5");
                assert_eq!(note.channel.get(), 1);
                assert_eq!(note.velocity, Some(100));
                assert_eq!(note.source.name(), "kb");
            }
            other => panic!("expected a note event, got {other:?}"),
        }
    }

    #[test]
    fn other_kinds_are_forwarded_not_dropped() {
        let (mut midi, rx, callbacks, _names) = rig(&["kb"]);
        midi.initialize().unwrap();
        midi.listen();

        fire(&callbacks, &[0xB0, 7, 100]);

        match rx.try_recv().unwrap() {
            RxEvent::Other(msg) => {
                assert_eq!(msg.kind, MessageKind::ControlChange);
                assert_eq!(msg.first_value, 7);
                assert_eq!(msg.second_value, Some(100));
            }
            other => panic!("expected a non-note event, got {other:?}"),
        }
    }

    #[test]
    fn invalid_messages_are_counted_and_forwarded() {
        let (mut midi, rx, callbacks, _names) = rig(&["kb"]);
        midi.initialize().unwrap();
        midi.listen();

        fire(&callbacks, &[0xF8]);

        assert_eq!(midi.invalid_count(), 1);
        match rx.try_recv().unwrap() {
            RxEvent::Other(msg) => assert_eq!(msg.kind, MessageKind::Invalid),
            other => panic!("expected the invalid decode, got {other:?}"),
        }
    }

    #[test]
    fn denied_access_attaches_nothing() {
        let (tx, _rx) = channel();
        let mut midi = MidiRx::new(Box::new(DeniedAccess), tx);
        assert!(midi.initialize().is_err());
        assert_eq!(midi.listen(), 0);
    }

    #[test]
    fn device_filter_is_case_insensitive() {
        let (midi, _rx, _callbacks, _names) = rig(&["USB Keyboard", "Internal Synth"]);
        let mut midi = midi.with_filter("usb");
        midi.initialize().unwrap();
        assert_eq!(midi.listen(), 1);
        assert_eq!(midi.subscription_count(), 1);
    }

    #[test]
    fn refresh_drops_vanished_devices_and_attaches_nothing() {
        let (mut midi, _rx, _callbacks, names) = rig(&["kb-1", "kb-2"]);
        midi.initialize().unwrap();
        assert_eq!(midi.listen(), 2);

        // kb-2 unplugged, kb-3 plugged in.
        *names.lock().unwrap() = vec!["kb-1".to_string(), "kb-3".to_string()];
        midi.refresh().unwrap();
        assert_eq!(midi.subscription_count(), 1);

        // The new device is only picked up by the next listen().
        assert_eq!(midi.listen(), 1);
        assert_eq!(midi.subscription_count(), 2);
    }
}
