//! Voice backend trait: a semantic-level abstraction over the synthesis engine.
//!
//! `VoiceBackend` captures what the engine *means* to do (strike a voice, let it
//! go, move the shared filter) independently of how it's done (OSC to a synth
//! server, a test recorder). This enables unit testing of lifecycle logic
//! without a running audio server.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ivory_types::{EnvConfig, Timbre, TransientKind, VoiceId};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// Everything a backend needs to strike one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSpec {
    pub voice: VoiceId,
    pub midi_note: u8,
    pub frequency: f32,
    pub timbre: Timbre,
    pub envelope: EnvConfig,
    pub amplitude: f32,
}

/// Semantic-level synthesis backend.
///
/// Implementations must tolerate redundant calls; a release for a voice the
/// server already dropped may return an error, which the caller logs and ignores.
pub trait VoiceBackend: Send {
    /// Start a voice with its envelope, amplitude and timbre.
    fn attack_voice(&self, spec: &VoiceSpec) -> BackendResult;

    /// Move a voice into its envelope release.
    fn release_voice(&self, voice: VoiceId) -> BackendResult;

    /// Ramp the shared post-filter toward `target_hz`.
    fn ramp_filter(&self, target_hz: f32, time_constant: f32) -> BackendResult;

    /// Start a short secondary voice layered on `voice`.
    fn start_transient(
        &self,
        voice: VoiceId,
        kind: TransientKind,
        level: f32,
        duration: Duration,
    ) -> BackendResult;

    /// Stop a secondary voice early.
    fn stop_transient(&self, voice: VoiceId, kind: TransientKind) -> BackendResult;

    /// Detune a voice by `cents` from its struck frequency.
    fn set_pitch_offset(&self, voice: VoiceId, cents: f32) -> BackendResult;

    /// Release every voice the server knows about, tracked or not.
    fn release_all(&self) -> BackendResult;
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Attack(VoiceSpec),
    Release(VoiceId),
    RampFilter {
        target_hz: f32,
        time_constant: f32,
    },
    StartTransient {
        voice: VoiceId,
        kind: TransientKind,
        level: f32,
        duration: Duration,
    },
    StopTransient {
        voice: VoiceId,
        kind: TransientKind,
    },
    PitchOffset {
        voice: VoiceId,
        cents: f32,
    },
    ReleaseAll,
}

/// A test backend that records all operations into a vector for assertions.
///
/// Voices can be marked as stolen to simulate the synthesis engine dropping
/// them on its own; releasing a stolen voice then fails like a stale node would.
pub struct TestBackend {
    ops: Mutex<Vec<TestOp>>,
    stolen: Mutex<HashSet<VoiceId>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            stolen: Mutex::new(HashSet::new()),
        }
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Position of the first operation matching a predicate.
    pub fn position<F: Fn(&TestOp) -> bool>(&self, f: F) -> Option<usize> {
        self.ops.lock().unwrap().iter().position(|op| f(op))
    }

    /// Return the spec of every attacked voice, in order.
    pub fn attacks(&self) -> Vec<VoiceSpec> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::Attack(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    /// Return every released voice, in order.
    pub fn releases(&self) -> Vec<VoiceId> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::Release(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Return every filter ramp target, in order.
    pub fn filter_targets(&self) -> Vec<f32> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::RampFilter { target_hz, .. } => Some(*target_hz),
                _ => None,
            })
            .collect()
    }

    /// Simulate the synthesis engine stealing a voice.
    pub fn steal(&self, voice: VoiceId) {
        self.stolen.lock().unwrap().insert(voice);
    }
}

impl VoiceBackend for TestBackend {
    fn attack_voice(&self, spec: &VoiceSpec) -> BackendResult {
        self.ops.lock().unwrap().push(TestOp::Attack(spec.clone()));
        Ok(())
    }

    fn release_voice(&self, voice: VoiceId) -> BackendResult {
        self.ops.lock().unwrap().push(TestOp::Release(voice));
        if self.stolen.lock().unwrap().contains(&voice) {
            return Err(BackendError(format!("voice {} no longer exists", voice)));
        }
        Ok(())
    }

    fn ramp_filter(&self, target_hz: f32, time_constant: f32) -> BackendResult {
        self.ops.lock().unwrap().push(TestOp::RampFilter {
            target_hz,
            time_constant,
        });
        Ok(())
    }

    fn start_transient(
        &self,
        voice: VoiceId,
        kind: TransientKind,
        level: f32,
        duration: Duration,
    ) -> BackendResult {
        self.ops.lock().unwrap().push(TestOp::StartTransient {
            voice,
            kind,
            level,
            duration,
        });
        Ok(())
    }

    fn stop_transient(&self, voice: VoiceId, kind: TransientKind) -> BackendResult {
        self.ops
            .lock()
            .unwrap()
            .push(TestOp::StopTransient { voice, kind });
        Ok(())
    }

    fn set_pitch_offset(&self, voice: VoiceId, cents: f32) -> BackendResult {
        self.ops
            .lock()
            .unwrap()
            .push(TestOp::PitchOffset { voice, cents });
        Ok(())
    }

    fn release_all(&self) -> BackendResult {
        self.ops.lock().unwrap().push(TestOp::ReleaseAll);
        Ok(())
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `Arc<TestBackend>` to implement `VoiceBackend` so the engine can
/// own a `Box<dyn VoiceBackend>` while tests retain an `Arc` for assertions.
pub struct SharedTestBackend(pub Arc<TestBackend>);

impl VoiceBackend for SharedTestBackend {
    fn attack_voice(&self, spec: &VoiceSpec) -> BackendResult {
        self.0.attack_voice(spec)
    }
    fn release_voice(&self, voice: VoiceId) -> BackendResult {
        self.0.release_voice(voice)
    }
    fn ramp_filter(&self, target_hz: f32, time_constant: f32) -> BackendResult {
        self.0.ramp_filter(target_hz, time_constant)
    }
    fn start_transient(
        &self,
        voice: VoiceId,
        kind: TransientKind,
        level: f32,
        duration: Duration,
    ) -> BackendResult {
        self.0.start_transient(voice, kind, level, duration)
    }
    fn stop_transient(&self, voice: VoiceId, kind: TransientKind) -> BackendResult {
        self.0.stop_transient(voice, kind)
    }
    fn set_pitch_offset(&self, voice: VoiceId, cents: f32) -> BackendResult {
        self.0.set_pitch_offset(voice, cents)
    }
    fn release_all(&self) -> BackendResult {
        self.0.release_all()
    }
}

// ─── NullBackend ────────────────────────────────────────────────────

/// A no-op backend that silently succeeds. Useful as a default when
/// no synth server is connected.
pub struct NullBackend;

impl VoiceBackend for NullBackend {
    fn attack_voice(&self, _: &VoiceSpec) -> BackendResult { Ok(()) }
    fn release_voice(&self, _: VoiceId) -> BackendResult { Ok(()) }
    fn ramp_filter(&self, _: f32, _: f32) -> BackendResult { Ok(()) }
    fn start_transient(&self, _: VoiceId, _: TransientKind, _: f32, _: Duration) -> BackendResult { Ok(()) }
    fn stop_transient(&self, _: VoiceId, _: TransientKind) -> BackendResult { Ok(()) }
    fn set_pitch_offset(&self, _: VoiceId, _: f32) -> BackendResult { Ok(()) }
    fn release_all(&self) -> BackendResult { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stolen_voice_release_fails_but_is_recorded() {
        let backend = TestBackend::new();
        backend.steal(VoiceId::new(3));
        assert!(backend.release_voice(VoiceId::new(3)).is_err());
        assert!(backend.release_voice(VoiceId::new(4)).is_ok());
        assert_eq!(backend.releases(), vec![VoiceId::new(3), VoiceId::new(4)]);
    }

    #[test]
    fn shared_backend_records_into_inner() {
        let inner = Arc::new(TestBackend::new());
        let shared = SharedTestBackend(Arc::clone(&inner));
        shared.ramp_filter(1200.0, 0.05).unwrap();
        shared.release_all().unwrap();
        assert_eq!(inner.filter_targets(), vec![1200.0]);
        assert_eq!(inner.count(|op| matches!(op, TestOp::ReleaseAll)), 1);
        inner.clear();
        assert!(inner.operations().is_empty());
    }
}
