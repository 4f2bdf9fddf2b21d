//! Platform seam: device access and per-device raw-message subscriptions.
//!
//! The listener only sees these traits; `midir` stays behind them so tests
//! can inject fake devices and the core never touches the OS MIDI transport
//! directly.

use anyhow::{Context, Result, anyhow};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput};

const CLIENT_NAME: &str = "midi-rx";
const SCAN_CLIENT_NAME: &str = "midi-rx-scan";

/// Callback invoked once per inbound raw MIDI message (1-3 bytes).
pub type RawMessageCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// The sole boundary call: returns every currently-present input and output
/// handle, or fails when the platform refuses access.
pub trait DeviceAccess: Send {
    fn request(&self) -> Result<MidiDevices>;
}

pub struct MidiDevices {
    pub inputs: Vec<Box<dyn InputDevice>>,
    pub outputs: Vec<OutputInfo>,
}

/// Output ports are enumerated for identity only; nothing is ever written.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub name: String,
}

/// A single input device the platform made available. Observed, not owned.
pub trait InputDevice: Send {
    fn name(&self) -> &str;

    /// Registers `on_message` for every raw message this device produces.
    /// The returned handle keeps the subscription alive; dropping it
    /// detaches the callback.
    fn subscribe(&self, on_message: RawMessageCallback) -> Result<Box<dyn Subscription>>;
}

/// RAII subscription handle.
pub trait Subscription: Send {}

// ─────────────────── midir-backed implementations ────────────────────────────

/// Production `DeviceAccess` over midir.
pub struct MidirAccess;

impl MidirAccess {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceAccess for MidirAccess {
    fn request(&self) -> Result<MidiDevices> {
        let midi_in = MidiInput::new(SCAN_CLIENT_NAME).context("MIDI input access unavailable")?;
        let mut inputs: Vec<Box<dyn InputDevice>> = Vec::new();
        for (index, port) in midi_in.ports().iter().enumerate() {
            let name = midi_in.port_name(port)?;
            inputs.push(Box::new(MidirInput { index, name }));
        }

        let midi_out =
            MidiOutput::new(SCAN_CLIENT_NAME).context("MIDI output access unavailable")?;
        let mut outputs = Vec::new();
        for port in midi_out.ports().iter() {
            outputs.push(OutputInfo {
                name: midi_out.port_name(port)?,
            });
        }

        Ok(MidiDevices { inputs, outputs })
    }
}

/// Ports are addressed by enumeration index + name and re-resolved at
/// subscribe time, so handles stay `Send` and survive device-list churn.
struct MidirInput {
    index: usize,
    name: String,
}

impl InputDevice for MidirInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self, mut on_message: RawMessageCallback) -> Result<Box<dyn Subscription>> {
        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        // Let system/realtime traffic through; the decoder classifies it.
        midi_in.ignore(Ignore::None);

        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| midi_in.port_name(p).is_ok_and(|n| n == self.name))
            .or_else(|| ports.get(self.index))
            .ok_or_else(|| anyhow!("{}: device no longer present", self.name))?;

        let conn = midi_in
            .connect(
                port,
                CLIENT_NAME,
                move |_stamp, bytes, _| on_message(bytes),
                (),
            )
            .map_err(|e| anyhow!("connect {}: {e}", self.name))?;

        Ok(Box::new(MidirSubscription { _conn: conn }))
    }
}

struct MidirSubscription {
    _conn: MidiInputConnection<()>, // RAII, stays alive
}

impl Subscription for MidirSubscription {}
