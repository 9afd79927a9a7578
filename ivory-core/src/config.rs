use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ivory_types::{GlobalSettings, KeyboardLayout};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    settings: toml::Table,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    osc_server: Option<String>,
    midi_port: Option<String>,
    frame_rate: Option<u32>,
    keyboard_layout: Option<String>,
    velocity: Option<u8>,
}

pub struct Config {
    runtime: RuntimeConfig,
    settings: GlobalSettings,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/ivory/config.toml`, if present.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::from_file(embedded()),
        }
    }

    /// Embedded defaults overlaid with the file at `path`. Never fails: an
    /// unreadable or malformed file is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut base = embedded();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => {
                    merge_runtime(&mut base.runtime, user.runtime);
                    merge_tables(&mut base.settings, user.settings);
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        Self::from_file(base)
    }

    fn from_file(file: ConfigFile) -> Self {
        let mut settings = match toml::Value::Table(file.settings).try_into::<GlobalSettings>() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(target: "config", "invalid [settings], using defaults: {}", e);
                embedded_settings()
            }
        };
        if settings.sanitize() {
            log::warn!(target: "config", "out-of-range [settings] values were adjusted");
        }
        Config {
            runtime: file.runtime,
            settings,
        }
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn osc_server(&self) -> Option<&str> {
        self.runtime.osc_server.as_deref().filter(|s| !s.is_empty())
    }

    pub fn midi_port(&self) -> Option<&str> {
        self.runtime.midi_port.as_deref().filter(|s| !s.is_empty())
    }

    /// Host frames per second (clamped to 10..=240).
    pub fn frame_rate(&self) -> u32 {
        self.runtime.frame_rate.unwrap_or(60).clamp(10, 240)
    }

    pub fn keyboard_layout(&self) -> KeyboardLayout {
        self.runtime
            .keyboard_layout
            .as_deref()
            .and_then(parse_keyboard_layout)
            .unwrap_or_default()
    }

    /// Velocity for computer-keyboard notes (clamped to 1..=127).
    pub fn velocity(&self) -> u8 {
        self.runtime.velocity.unwrap_or(96).clamp(1, 127)
    }

    /// The effective settings as a `[settings]` TOML document.
    pub fn settings_toml(&self) -> Result<String, String> {
        #[derive(Serialize)]
        struct Printed<'a> {
            settings: &'a GlobalSettings,
        }
        toml::to_string_pretty(&Printed {
            settings: &self.settings,
        })
        .map_err(|e| e.to_string())
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml")
}

fn embedded_settings() -> GlobalSettings {
    toml::Value::Table(embedded().settings)
        .try_into()
        .unwrap_or_default()
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ivory").join("config.toml"))
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.osc_server.is_some() {
        base.osc_server = user.osc_server;
    }
    if user.midi_port.is_some() {
        base.midi_port = user.midi_port;
    }
    if user.frame_rate.is_some() {
        base.frame_rate = user.frame_rate;
    }
    if user.keyboard_layout.is_some() {
        base.keyboard_layout = user.keyboard_layout;
    }
    if user.velocity.is_some() {
        base.velocity = user.velocity;
    }
}

/// Recursively overlay `user` onto `base`; nested tables merge key by key.
fn merge_tables(base: &mut toml::Table, user: toml::Table) {
    for (key, value) in user {
        match value {
            toml::Value::Table(user_table) => {
                if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                    merge_tables(base_table, user_table);
                    continue;
                }
                base.insert(key, toml::Value::Table(user_table));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_keyboard_layout(s: &str) -> Option<KeyboardLayout> {
    match s.to_lowercase().as_str() {
        "qwerty" => Some(KeyboardLayout::Qwerty),
        "colemak" => Some(KeyboardLayout::Colemak),
        _ => None,
    }
}
