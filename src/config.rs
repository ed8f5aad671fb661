use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::player::controller::PlaybackOptions;

/// Terminal player settings, read from `~/.config/scene-replay/player.json`.
/// Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Tick period in milliseconds.
    pub tick_ms: u64,
    /// Steps per second at startup.
    pub initial_rate: f64,
    /// Amount `faster`/`slower` add to the rate magnitude.
    pub rate_step: f64,
    /// Largest rate magnitude the keys can reach.
    pub max_rate: f64,
    pub key_bindings: KeyBindings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub toggle: String,
    pub step_forward: String,
    pub step_back: String,
    pub seek_start: String,
    pub seek_end: String,
    pub faster: String,
    pub slower: String,
    pub reverse: String,
    pub next_scene: String,
    pub reset: String,
    pub quit: String,
    pub cancel: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            tick_ms: 20,
            initial_rate: 1.0,
            rate_step: 1.0,
            max_rate: 300.0,
            key_bindings: KeyBindings::default(),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        KeyBindings {
            toggle: "Space".into(),
            step_forward: "Right".into(),
            step_back: "Left".into(),
            seek_start: "Home".into(),
            seek_end: "End".into(),
            faster: "+".into(),
            slower: "-".into(),
            reverse: "r".into(),
            next_scene: "Tab".into(),
            reset: "Backspace".into(),
            quit: "q".into(),
            cancel: "Esc".into(),
        }
    }
}

impl PlayerConfig {
    /// Load the user config, or defaults when there is none. An unreadable
    /// or invalid file is logged and ignored.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<PlayerConfig>(&json) {
                Ok(config) => config.sanitized(),
                Err(e) => {
                    warn!(path = %path.display(), "invalid player config ({e}), using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let mut path = PathBuf::from(home);
        path.push(".config");
        path.push("scene-replay");
        path.push("player.json");
        path
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            tick_period: self.tick_period(),
            rate: self.initial_rate,
        }
    }

    /// Rate after one `faster` press: magnitude grows by `rate_step`, the
    /// direction is kept, and zero counts as forward.
    pub fn faster(&self, rate: f64) -> f64 {
        let sign = if rate < 0.0 { -1.0 } else { 1.0 };
        sign * (rate.abs() + self.rate_step).min(self.max_rate)
    }

    /// Rate after one `slower` press. Never crosses zero.
    pub fn slower(&self, rate: f64) -> f64 {
        let sign = if rate < 0.0 { -1.0 } else { 1.0 };
        sign * (rate.abs() - self.rate_step).max(0.0)
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.tick_ms == 0 {
            warn!("tick_ms must be positive, using {}", defaults.tick_ms);
            self.tick_ms = defaults.tick_ms;
        }
        if !self.initial_rate.is_finite() {
            self.initial_rate = defaults.initial_rate;
        }
        if !(self.rate_step.is_finite() && self.rate_step > 0.0) {
            self.rate_step = defaults.rate_step;
        }
        if !(self.max_rate.is_finite() && self.max_rate > 0.0) {
            self.max_rate = defaults.max_rate;
        }
        self
    }
}

/// Check whether a crossterm `KeyEvent` matches a binding string from config.
pub fn matches_binding(binding: &str, event: &KeyEvent) -> bool {
    if let Some(rest) = binding.strip_prefix("Alt-") {
        return event.modifiers.contains(KeyModifiers::ALT) && matches_key(rest, event.code);
    }
    if let Some(rest) = binding.strip_prefix("Ctrl-") {
        return event.modifiers.contains(KeyModifiers::CONTROL) && matches_key(rest, event.code);
    }

    // Plain bindings never fire with Ctrl or Alt held. Shift is allowed so
    // that "+" works on layouts where it needs Shift.
    if event.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        return false;
    }
    matches_key(binding, event.code)
}

fn matches_key(name: &str, code: KeyCode) -> bool {
    match name {
        "Right" => code == KeyCode::Right,
        "Left" => code == KeyCode::Left,
        "Up" => code == KeyCode::Up,
        "Down" => code == KeyCode::Down,
        "Enter" => code == KeyCode::Enter,
        "Esc" => code == KeyCode::Esc,
        "Space" => code == KeyCode::Char(' '),
        "Tab" => code == KeyCode::Tab,
        "Backspace" => code == KeyCode::Backspace,
        "Home" => code == KeyCode::Home,
        "End" => code == KeyCode::End,
        s => {
            if let Some(n) = s.strip_prefix('F').and_then(|rest| rest.parse::<u8>().ok()) {
                return code == KeyCode::F(n);
            }
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => code == KeyCode::Char(c),
                _ => false,
            }
        }
    }
}
