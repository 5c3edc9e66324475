//! Turns a per-frame gesture stream into key presses.
//!
//! # Rules
//!
//! - At most one key is held at any time. Switching to a different [`Mode::Hold`] binding releases
//!   the old key before pressing the new one. Any frame without a hold binding releases it.
//! - A [`Mode::Once`] binding fires on the first frame of its gesture and is then suppressed until
//!   a *different* gesture (including [`Gesture::None`]) has been seen.
//! - If the profile has a cooldown, no action (hold, press or once) fires until the cooldown has
//!   elapsed since the last fired action. Releasing a key is never rate limited.
//!
//! The state is only updated after the [`KeyInjector`] call succeeds, so the recorded held key
//! always matches what was sent.

use std::time::{Duration, Instant};

use crate::{
    gesture::Gesture,
    keys::{Key, KeyInjector},
    profile::{Binding, Mode, Profile},
};

/// What the dispatcher remembers between frames.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionState {
    /// The key that is currently held down.
    pub held: Option<Key>,
    /// The last [`Mode::Once`] gesture that fired, until a different gesture is seen.
    pub last_discrete: Option<Gesture>,
    /// When the last action fired.
    pub last_fired: Option<Instant>,
}

/// An action fired by [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    Hold(Key),
    Tap(Key),
}

/// Why a bound gesture did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    /// A [`Mode::Once`] gesture was repeated.
    Repeat,
    /// The cooldown has not elapsed yet.
    Cooldown,
}

/// The effects of dispatching a single frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub released: Option<Key>,
    pub fired: Option<Fired>,
    pub suppressed: Option<Suppressed>,
}

pub struct Dispatcher<K: KeyInjector> {
    bindings: Vec<Binding>,
    cooldown: Option<Duration>,
    state: ActionState,
    keys: K,
}

impl<K: KeyInjector> Dispatcher<K> {
    pub fn new(profile: &Profile, keys: K) -> Self {
        Self {
            bindings: profile.bindings.clone(),
            cooldown: profile.cooldown,
            state: ActionState::default(),
            keys,
        }
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Returns the key that is currently held, if any.
    pub fn held(&self) -> Option<Key> {
        self.state.held
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    fn binding(&self, gesture: Gesture) -> Option<Binding> {
        self.bindings.iter().find(|b| b.gesture == gesture).copied()
    }

    fn cooling_down(&self, now: Instant) -> bool {
        match (self.cooldown, self.state.last_fired) {
            (Some(cooldown), Some(last)) => now.saturating_duration_since(last) < cooldown,
            _ => false,
        }
    }

    fn release_held(&mut self, outcome: &mut Outcome) -> anyhow::Result<()> {
        if let Some(key) = self.state.held {
            self.keys.release(key)?;
            self.state.held = None;
            outcome.released = Some(key);
        }
        Ok(())
    }

    /// Handles the gesture classified for the frame captured at `now`.
    pub fn dispatch(&mut self, gesture: Gesture, now: Instant) -> anyhow::Result<Outcome> {
        let mut outcome = Outcome::default();

        if self.state.last_discrete != Some(gesture) {
            self.state.last_discrete = None;
        }

        let binding = match self.binding(gesture) {
            Some(binding) => binding,
            None => {
                self.release_held(&mut outcome)?;
                return Ok(outcome);
            }
        };

        match binding.mode {
            Mode::Hold => {
                if self.state.held == Some(binding.key) {
                    return Ok(outcome);
                }
                self.release_held(&mut outcome)?;
                if self.cooling_down(now) {
                    outcome.suppressed = Some(Suppressed::Cooldown);
                    return Ok(outcome);
                }
                self.keys.press(binding.key)?;
                self.state.held = Some(binding.key);
                self.state.last_fired = Some(now);
                outcome.fired = Some(Fired::Hold(binding.key));
                log::debug!("{gesture}: holding {}", binding.key);
            }
            Mode::Press | Mode::Once => {
                self.release_held(&mut outcome)?;
                if binding.mode == Mode::Once && self.state.last_discrete == Some(gesture) {
                    outcome.suppressed = Some(Suppressed::Repeat);
                    return Ok(outcome);
                }
                if self.cooling_down(now) {
                    outcome.suppressed = Some(Suppressed::Cooldown);
                    return Ok(outcome);
                }
                self.keys.tap(binding.key)?;
                if binding.mode == Mode::Once {
                    self.state.last_discrete = Some(gesture);
                }
                self.state.last_fired = Some(now);
                outcome.fired = Some(Fired::Tap(binding.key));
                log::debug!("{gesture}: tapped {}", binding.key);
            }
        }

        Ok(outcome)
    }

    /// Releases any held key and forgets all state.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        let mut outcome = Outcome::default();
        let res = self.release_held(&mut outcome);
        if res.is_ok() {
            self.state = ActionState::default();
        }
        if let Some(key) = outcome.released {
            log::debug!("released {key}");
        }
        res
    }
}

impl<K: KeyInjector> Drop for Dispatcher<K> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("failed to release held key: {e:#}");
        }
    }
}
