//! `VoiceBackend` that drives a SuperCollider-compatible synth server over OSC.
//!
//! Node layout: every voice lives in `VOICE_GROUP`; the shared post-filter sits
//! after that group so it processes the summed voices. Each voice reserves a
//! block of `NODES_PER_VOICE` node ids (main voice, hammer noise, damper thump).

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};

use ivory_types::{TransientKind, VoiceId};

use super::backend::{BackendError, BackendResult, VoiceBackend, VoiceSpec};

const ROOT_GROUP: i32 = 0;
const VOICE_GROUP: i32 = 100;
const FILTER_NODE: i32 = 900;
const VOICE_NODE_BASE: i32 = 1000;
const NODES_PER_VOICE: i32 = 4;
/// Node ids wrap after this many voices.
const VOICE_SLOTS: u32 = 1 << 20;

const ADD_TO_TAIL: i32 = 1;
const ADD_AFTER: i32 = 3;

const FILTER_DEF: &str = "ivory_filter";
const HAMMER_DEF: &str = "ivory_hammer";
const DAMPER_DEF: &str = "ivory_damper";

fn voice_node(voice: VoiceId) -> i32 {
    VOICE_NODE_BASE + (voice.get() % VOICE_SLOTS) as i32 * NODES_PER_VOICE
}

fn transient_node(voice: VoiceId, kind: TransientKind) -> i32 {
    match kind {
        TransientKind::AttackNoise => voice_node(voice) + 1,
        TransientKind::Release => voice_node(voice) + 2,
    }
}

pub struct OscBackend {
    socket: UdpSocket,
    server: SocketAddr,
}

impl OscBackend {
    /// Bind a local socket, then create the voice group and the shared filter on the server.
    pub fn connect(server_addr: &str) -> BackendResult<Self> {
        let server = server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| BackendError(format!("cannot resolve {}", server_addr)))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let backend = Self { socket, server };

        backend.send_message(
            "/g_new",
            vec![
                OscType::Int(VOICE_GROUP),
                OscType::Int(ADD_TO_TAIL),
                OscType::Int(ROOT_GROUP),
            ],
        )?;
        backend.create_synth(FILTER_DEF, FILTER_NODE, ADD_AFTER, VOICE_GROUP, &[])?;
        log::info!(target: "audio::output", "connected to synth server at {}", server);
        Ok(backend)
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) -> BackendResult {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&packet).map_err(|e| BackendError(e.to_string()))?;
        self.socket.send_to(&buf, self.server)?;
        Ok(())
    }

    /// /s_new synthdef node_id add_action target [param value ...]
    fn create_synth(
        &self,
        def_name: &str,
        node_id: i32,
        add_action: i32,
        target: i32,
        params: &[(&str, f32)],
    ) -> BackendResult {
        let mut args = vec![
            OscType::String(def_name.to_string()),
            OscType::Int(node_id),
            OscType::Int(add_action),
            OscType::Int(target),
        ];
        for &(name, value) in params {
            args.push(OscType::String(name.to_string()));
            args.push(OscType::Float(value));
        }
        self.send_message("/s_new", args)
    }

    fn set_params(&self, node_id: i32, params: &[(&str, f32)]) -> BackendResult {
        let mut args = vec![OscType::Int(node_id)];
        for &(name, value) in params {
            args.push(OscType::String(name.to_string()));
            args.push(OscType::Float(value));
        }
        self.send_message("/n_set", args)
    }
}

impl VoiceBackend for OscBackend {
    fn attack_voice(&self, spec: &VoiceSpec) -> BackendResult {
        let def = format!("ivory_piano_{}", spec.timbre.name());
        self.create_synth(
            &def,
            voice_node(spec.voice),
            ADD_TO_TAIL,
            VOICE_GROUP,
            &[
                ("freq", spec.frequency),
                ("amp", spec.amplitude),
                ("attack", spec.envelope.attack),
                ("decay", spec.envelope.decay),
                ("sustain", spec.envelope.sustain),
                ("release", spec.envelope.release),
                ("gate", 1.0),
            ],
        )
    }

    fn release_voice(&self, voice: VoiceId) -> BackendResult {
        self.set_params(voice_node(voice), &[("gate", 0.0)])
    }

    fn ramp_filter(&self, target_hz: f32, time_constant: f32) -> BackendResult {
        self.set_params(FILTER_NODE, &[("cutoff", target_hz), ("lag", time_constant)])
    }

    fn start_transient(
        &self,
        voice: VoiceId,
        kind: TransientKind,
        level: f32,
        duration: Duration,
    ) -> BackendResult {
        let def = match kind {
            TransientKind::AttackNoise => HAMMER_DEF,
            TransientKind::Release => DAMPER_DEF,
        };
        self.create_synth(
            def,
            transient_node(voice, kind),
            ADD_TO_TAIL,
            VOICE_GROUP,
            &[("amp", level), ("dur", duration.as_secs_f32())],
        )
    }

    fn stop_transient(&self, voice: VoiceId, kind: TransientKind) -> BackendResult {
        self.send_message("/n_free", vec![OscType::Int(transient_node(voice, kind))])
    }

    fn set_pitch_offset(&self, voice: VoiceId, cents: f32) -> BackendResult {
        self.set_params(voice_node(voice), &[("detune", cents)])
    }

    fn release_all(&self) -> BackendResult {
        self.set_params(VOICE_GROUP, &[("gate", 0.0)])
    }
}
