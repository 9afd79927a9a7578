//! Inputs the engine understands, and the channel that merges their sources.

use crossbeam_channel::{Receiver, Sender};

/// A single performance event, already clamped to MIDI range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PianoInput {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    Panic,
}

/// Multi-producer queue drained once per host frame.
///
/// MIDI callbacks run on the driver's thread and push through a cloned
/// [`InputSender`]; the host thread owns the bus and drains it.
pub struct InputBus {
    tx: Sender<PianoInput>,
    rx: Receiver<PianoInput>,
}

/// Cloneable producer side of an [`InputBus`].
#[derive(Clone)]
pub struct InputSender(Sender<PianoInput>);

impl InputSender {
    /// Returns false once the bus has been dropped.
    pub fn send(&self, input: PianoInput) -> bool {
        self.0.send(input).is_ok()
    }
}

impl InputBus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> InputSender {
        InputSender(self.tx.clone())
    }

    pub fn push(&self, input: PianoInput) {
        // The bus owns a receiver, so this cannot disconnect.
        let _ = self.tx.send(input);
    }

    /// Take every queued input, in arrival order.
    pub fn drain(&self) -> Vec<PianoInput> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_order_across_senders() {
        let bus = InputBus::new();
        let midi = bus.sender();
        let handle = std::thread::spawn(move || {
            assert!(midi.send(PianoInput::NoteOn { note: 60, velocity: 90 }));
            assert!(midi.send(PianoInput::NoteOff { note: 60 }));
        });
        handle.join().unwrap();
        bus.push(PianoInput::Panic);

        assert_eq!(
            bus.drain(),
            vec![
                PianoInput::NoteOn { note: 60, velocity: 90 },
                PianoInput::NoteOff { note: 60 },
                PianoInput::Panic,
            ]
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn sender_reports_dropped_bus() {
        let bus = InputBus::new();
        let sender = bus.sender();
        drop(bus);
        assert!(!sender.send(PianoInput::Panic));
    }
}
