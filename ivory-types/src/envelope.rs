use serde::{Deserialize, Serialize};

/// Base ADSR envelope. Times in seconds, sustain as a level in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 1.2,
            sustain: 0.25,
            release: 0.4,
        }
    }
}
