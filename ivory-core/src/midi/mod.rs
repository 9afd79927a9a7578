use midir::{MidiInput, MidiInputConnection};

use ivory_types::clamp_midi;

use crate::input::{InputSender, PianoInput};

const CLIENT_NAME: &str = "ivory";

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// MIDI input manager. Parsed messages go straight onto the input bus.
pub struct MidiInputManager {
    midi_in: Option<MidiInput>,
    connection: Option<MidiInputConnection<()>>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let midi_in = match MidiInput::new(CLIENT_NAME) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!(target: "midi", "MIDI unavailable: {}", e);
                None
            }
        };
        Self {
            midi_in,
            connection: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    /// Refresh the list of available MIDI input ports
    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();

        if let Some(ref midi_in) = self.midi_in {
            let ports = midi_in.ports();
            for (index, port) in ports.iter().enumerate() {
                if let Ok(name) = midi_in.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to the first port whose name contains `pattern` (case-insensitive).
    pub fn connect_by_name(&mut self, pattern: &str, sender: InputSender) -> Result<(), String> {
        self.refresh_ports();
        let needle = pattern.to_lowercase();
        let index = self
            .available_ports
            .iter()
            .find(|p| p.name.to_lowercase().contains(&needle))
            .map(|p| p.index)
            .ok_or_else(|| format!("No MIDI input matching '{}'", pattern))?;
        self.connect(index, sender)
    }

    /// Connect to a MIDI input port by index
    pub fn connect(&mut self, port_index: usize, sender: InputSender) -> Result<(), String> {
        self.disconnect();

        // connect() consumes the MidiInput, so use a fresh one
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| e.to_string())?;
        let ports = midi_in.ports();

        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid port index: {}", port_index))?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_in
            .connect(
                port,
                "ivory-input",
                move |_timestamp, message, _| {
                    if let Some(input) = parse_midi_message(message) {
                        sender.send(input);
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        log::info!(target: "midi", "connected to {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);

        // Recreate MidiInput for future port listing
        self.midi_in = MidiInput::new(CLIENT_NAME).ok();

        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            log::info!(target: "midi", "disconnected");
        }
        self.connected_port_name = None;
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Parse a raw MIDI message. All channels are accepted; anything other than
/// note and controller messages is ignored.
pub fn parse_midi_message(data: &[u8]) -> Option<PianoInput> {
    let (&status, rest) = data.split_first()?;
    if rest.len() < 2 {
        return None;
    }
    let a = clamp_midi(rest[0]);
    let b = clamp_midi(rest[1]);

    match status & 0xF0 {
        0x80 => Some(PianoInput::NoteOff { note: a }),
        // Note On with velocity 0 is a note off
        0x90 if b == 0 => Some(PianoInput::NoteOff { note: a }),
        0x90 => Some(PianoInput::NoteOn { note: a, velocity: b }),
        0xB0 => Some(PianoInput::ControlChange {
            controller: a,
            value: b,
        }),
        _ => None,
    }
}
