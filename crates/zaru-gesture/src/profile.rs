//! Controller profiles: which gestures trigger which keys, and how.
//!
//! Profiles are either built in ([`Profile::runner`], [`Profile::vehicle`]) or loaded from a TOML
//! file:
//!
//! ```toml
//! name = "truck"
//! policy = "vehicle"
//! cooldown_ms = 250
//!
//! [[bindings]]
//! gesture = "accelerate"
//! key = "up"
//! mode = "hold"
//! ```

use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{gesture::Gesture, gesture::Policy, keys::Key};

/// How a bound key is actuated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The key is held for as long as the gesture is shown.
    Hold,
    /// The key is tapped on every eligible frame. Only the cooldown limits repetition.
    Press,
    /// The key is tapped once and not again until a different gesture has been seen.
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub gesture: Gesture,
    pub key: Key,
    pub mode: Mode,
}

impl Binding {
    pub const fn new(gesture: Gesture, key: Key, mode: Mode) -> Self {
        Self { gesture, key, mode }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub name: String,
    pub policy: Policy,
    /// Minimum time between two fired actions.
    #[serde(
        rename = "cooldown_ms",
        default,
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub cooldown: Option<Duration>,
    /// Flip landmarks horizontally before classification.
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    /// Hands reported with a lower presence score are treated as absent.
    #[serde(default = "default_min_presence")]
    pub min_presence: f32,
    /// EMA alpha for landmark smoothing. `None` disables smoothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f32>,
    // Must stay last, TOML tables have to follow plain values.
    pub bindings: Vec<Binding>,
}

fn default_mirror() -> bool {
    true
}

fn default_min_presence() -> f32 {
    0.5
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_u64(d.as_millis() as u64),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

impl Profile {
    /// Names of the profiles returned by [`Profile::builtin`].
    pub const BUILTIN: &'static [&'static str] = &["runner", "vehicle"];

    /// Endless-runner controls. Every mapped gesture taps a key, rate limited to one action per
    /// second.
    pub fn runner() -> Self {
        let bindings = vec![
            Binding::new(Gesture::Jump, Key::Up, Mode::Press),
            Binding::new(Gesture::Roll, Key::Down, Mode::Press),
            Binding::new(Gesture::Left, Key::Left, Mode::Press),
            Binding::new(Gesture::Right, Key::Right, Mode::Press),
            Binding::new(Gesture::Hoverboard, Key::Space, Mode::Press),
            Binding::new(Gesture::Pause, Key::Escape, Mode::Once),
            Binding::new(Gesture::PlayAgain, Key::Enter, Mode::Once),
        ];
        Self {
            name: "runner".into(),
            policy: Policy::Runner,
            bindings,
            cooldown: Some(Duration::from_secs(1)),
            mirror: default_mirror(),
            min_presence: default_min_presence(),
            smoothing: None,
        }
    }

    /// Vehicle controls. Throttle and brake are held, gear changes and pause fire once.
    pub fn vehicle() -> Self {
        let bindings = vec![
            Binding::new(Gesture::Accelerate, Key::Space, Mode::Hold),
            Binding::new(Gesture::Brake, Key::Char('b'), Mode::Hold),
            Binding::new(Gesture::GearDrive, Key::Char('d'), Mode::Once),
            Binding::new(Gesture::GearReverse, Key::Char('r'), Mode::Once),
            Binding::new(Gesture::Pause, Key::Char('p'), Mode::Once),
        ];
        Self {
            name: "vehicle".into(),
            policy: Policy::Vehicle,
            bindings,
            cooldown: None,
            mirror: default_mirror(),
            min_presence: default_min_presence(),
            smoothing: None,
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "runner" => Some(Self::runner()),
            "vehicle" => Some(Self::vehicle()),
            _ => None,
        }
    }

    /// Loads and validates a profile from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("couldn't read profile `{}`", path.display()))?;
        let profile: Self = toml::from_str(&text)
            .with_context(|| format!("couldn't parse profile `{}`", path.display()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Checks that the profile can be used with its classification policy.
    pub fn validate(&self) -> anyhow::Result<()> {
        for binding in &self.bindings {
            if binding.gesture == Gesture::None {
                bail!("profile `{}`: `none` cannot be bound to a key", self.name);
            }
            if !self.policy.gestures().contains(&binding.gesture) {
                bail!(
                    "profile `{}`: gesture `{}` is never produced by the `{}` policy",
                    self.name,
                    binding.gesture,
                    self.policy,
                );
            }
        }
        if let Some(dup) = self.bindings.iter().map(|b| b.gesture).duplicates().next() {
            bail!("profile `{}`: gesture `{dup}` is bound more than once", self.name);
        }
        if !(0.0..=1.0).contains(&self.min_presence) {
            bail!(
                "profile `{}`: `min_presence` must be between 0 and 1, got {}",
                self.name,
                self.min_presence
            );
        }
        if let Some(alpha) = self.smoothing {
            if !(0.0..=1.0).contains(&alpha) || alpha == 0.0 {
                bail!(
                    "profile `{}`: `smoothing` must be in (0, 1], got {alpha}",
                    self.name
                );
            }
        }
        Ok(())
    }

    pub fn binding(&self, gesture: Gesture) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.gesture == gesture)
    }
}
