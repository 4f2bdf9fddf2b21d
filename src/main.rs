mod device;
mod listener;
mod message;
mod monitor;

use anyhow::Result;
use env_logger::Env;
use std::sync::mpsc::channel;
use std::time::Duration;

use crate::device::MidirAccess;
use crate::listener::MidiRx;
use crate::message::RxEvent;
use crate::monitor::MidiDeviceMonitor;

const RESCAN_EVERY: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // pipeline: MIDI inputs → decoder → log sink
    let (tx, rx) = channel::<RxEvent>();

    let mut midi = MidiRx::new(Box::new(MidirAccess::new()), tx);
    if let Ok(filter) = std::env::var("MIDI_INPUT_FILTER") {
        log::info!("🖖 Listening only to inputs matching {filter:?}");
        midi = midi.with_filter(filter);
    }

    midi.initialize()?;
    let attached = midi.listen();
    log::info!("Listening on {attached} input(s)");

    let _mon = MidiDeviceMonitor::start(midi, RESCAN_EVERY);

    for event in rx {
        match event {
            RxEvent::Note(note) => log::info!(
                "🎹 {} {} {} key:{} ch:{} vel:{}",
                note.source,
                note.kind,
                note.note,
                note.key,
                note.channel.get(),
                note.velocity.map_or(-1, i16::from),
            ),
            RxEvent::Other(msg) => log::debug!(
                "RX: {} channel:{}, type:{}, b2:{}, b3:{}",
                msg.source,
                msg.channel.get(),
                msg.kind,
                msg.first_value,
                msg.second_value.map_or(-1, i16::from),
            ),
        }
    }

    Ok(())
}
