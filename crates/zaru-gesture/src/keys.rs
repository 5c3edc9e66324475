//! Keyboard event injection.
//!
//! The dispatcher only talks to the [`KeyInjector`] trait. [`EnigoKeys`] sends real OS input,
//! [`LogKeys`] only logs, and [`RecordingKeys`] remembers every event for inspection.

use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A named keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Space,
    Escape,
    Enter,
    /// A single character key, eg. `b` or `p`.
    Char(char),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Up => f.write_str("up"),
            Key::Down => f.write_str("down"),
            Key::Left => f.write_str("left"),
            Key::Right => f.write_str("right"),
            Key::Space => f.write_str("space"),
            Key::Escape => f.write_str("esc"),
            Key::Enter => f.write_str("enter"),
            Key::Char(c) => write!(f, "{c}"),
        }
    }
}

impl FromStr for Key {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s {
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "space" => Key::Space,
            "esc" | "escape" => Key::Escape,
            "enter" | "return" => Key::Enter,
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => {
                        Key::Char(c.to_ascii_lowercase())
                    }
                    _ => return Err(ParseKeyError(s.to_string())),
                }
            }
        };
        Ok(key)
    }
}

impl TryFrom<String> for Key {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown key name `{}`", self.0)
    }
}

impl Error for ParseKeyError {}

/// Sends key events to whatever is listening.
pub trait KeyInjector {
    /// Presses `key` and keeps it held.
    fn press(&mut self, key: Key) -> anyhow::Result<()>;

    /// Releases a key previously held with [`KeyInjector::press`].
    fn release(&mut self, key: Key) -> anyhow::Result<()>;

    /// Presses and immediately releases `key`.
    fn tap(&mut self, key: Key) -> anyhow::Result<()> {
        self.press(key)?;
        self.release(key)
    }
}

impl<K: KeyInjector + ?Sized> KeyInjector for &mut K {
    fn press(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).press(key)
    }

    fn release(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).release(key)
    }

    fn tap(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).tap(key)
    }
}

impl<K: KeyInjector + ?Sized> KeyInjector for Box<K> {
    fn press(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).press(key)
    }

    fn release(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).release(key)
    }

    fn tap(&mut self, key: Key) -> anyhow::Result<()> {
        (**self).tap(key)
    }
}

/// A key event recorded by [`RecordingKeys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(Key),
    Release(Key),
    Tap(Key),
}

/// Records all events instead of sending them anywhere.
#[derive(Debug, Default, Clone)]
pub struct RecordingKeys {
    events: Vec<KeyEvent>,
}

impl RecordingKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    /// Returns and clears the events recorded so far.
    pub fn take(&mut self) -> Vec<KeyEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns the keys that are currently pressed according to the recorded events.
    pub fn held(&self) -> Vec<Key> {
        let mut held = Vec::new();
        for event in &self.events {
            match *event {
                KeyEvent::Press(key) if !held.contains(&key) => held.push(key),
                KeyEvent::Release(key) => held.retain(|k| *k != key),
                _ => {}
            }
        }
        held
    }
}

impl KeyInjector for RecordingKeys {
    fn press(&mut self, key: Key) -> anyhow::Result<()> {
        self.events.push(KeyEvent::Press(key));
        Ok(())
    }

    fn release(&mut self, key: Key) -> anyhow::Result<()> {
        self.events.push(KeyEvent::Release(key));
        Ok(())
    }

    fn tap(&mut self, key: Key) -> anyhow::Result<()> {
        self.events.push(KeyEvent::Tap(key));
        Ok(())
    }
}

/// Logs key events at *info* level without injecting them.
#[derive(Debug, Default)]
pub struct LogKeys;

impl KeyInjector for LogKeys {
    fn press(&mut self, key: Key) -> anyhow::Result<()> {
        log::info!("[dry run] hold {key}");
        Ok(())
    }

    fn release(&mut self, key: Key) -> anyhow::Result<()> {
        log::info!("[dry run] release {key}");
        Ok(())
    }

    fn tap(&mut self, key: Key) -> anyhow::Result<()> {
        log::info!("[dry run] tap {key}");
        Ok(())
    }
}

#[cfg(feature = "enigo")]
pub use self::os::EnigoKeys;

#[cfg(feature = "enigo")]
mod os {
    use std::{thread, time::Duration};

    use enigo::{Direction, Enigo, Keyboard, Settings};

    use super::{Key, KeyInjector};

    /// Injects OS-level keyboard input via [`enigo`].
    pub struct EnigoKeys {
        enigo: Enigo,
        tap_duration: Duration,
    }

    impl EnigoKeys {
        /// Default time a tapped key is held down before it is released.
        pub const DEFAULT_TAP_DURATION: Duration = Duration::from_millis(100);

        pub fn new() -> anyhow::Result<Self> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| anyhow::anyhow!("failed to connect to input system: {e:?}"))?;
            Ok(Self {
                enigo,
                tap_duration: Self::DEFAULT_TAP_DURATION,
            })
        }

        /// Sets how long [`KeyInjector::tap`] keeps the key pressed.
        ///
        /// Some games poll input and miss presses shorter than a frame.
        pub fn tap_duration(self, tap_duration: Duration) -> Self {
            Self {
                tap_duration,
                ..self
            }
        }

        fn send(&mut self, key: Key, direction: Direction) -> anyhow::Result<()> {
            self.enigo
                .key(enigo_key(key), direction)
                .map_err(|e| anyhow::anyhow!("failed to send `{key}` ({direction:?}): {e:?}"))
        }
    }

    fn enigo_key(key: Key) -> enigo::Key {
        match key {
            Key::Up => enigo::Key::UpArrow,
            Key::Down => enigo::Key::DownArrow,
            Key::Left => enigo::Key::LeftArrow,
            Key::Right => enigo::Key::RightArrow,
            Key::Space => enigo::Key::Space,
            Key::Escape => enigo::Key::Escape,
            Key::Enter => enigo::Key::Return,
            Key::Char(c) => enigo::Key::Unicode(c),
        }
    }

    impl KeyInjector for EnigoKeys {
        fn press(&mut self, key: Key) -> anyhow::Result<()> {
            self.send(key, Direction::Press)
        }

        fn release(&mut self, key: Key) -> anyhow::Result<()> {
            self.send(key, Direction::Release)
        }

        fn tap(&mut self, key: Key) -> anyhow::Result<()> {
            self.send(key, Direction::Press)?;
            thread::sleep(self.tap_duration);
            self.send(key, Direction::Release)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys() {
        for (name, key) in [
            ("up", Key::Up),
            ("down", Key::Down),
            ("left", Key::Left),
            ("right", Key::Right),
            ("space", Key::Space),
            ("esc", Key::Escape),
            ("enter", Key::Enter),
            ("b", Key::Char('b')),
            ("d", Key::Char('d')),
            ("r", Key::Char('r')),
            ("p", Key::Char('p')),
        ] {
            assert_eq!(name.parse::<Key>().unwrap(), key);
            assert_eq!(key.to_string(), name);
        }

        assert_eq!("escape".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("B".parse::<Key>().unwrap(), Key::Char('b'));
        assert!("".parse::<Key>().is_err());
        assert!("shift".parse::<Key>().is_err());
        assert!("-".parse::<Key>().is_err());
    }

    #[test]
    fn default_tap_is_press_release() {
        struct PressRelease(Vec<KeyEvent>);

        impl KeyInjector for PressRelease {
            fn press(&mut self, key: Key) -> anyhow::Result<()> {
                self.0.push(KeyEvent::Press(key));
                Ok(())
            }

            fn release(&mut self, key: Key) -> anyhow::Result<()> {
                self.0.push(KeyEvent::Release(key));
                Ok(())
            }
        }

        let mut keys = PressRelease(Vec::new());
        keys.tap(Key::Char('d')).unwrap();
        assert_eq!(
            keys.0,
            [KeyEvent::Press(Key::Char('d')), KeyEvent::Release(Key::Char('d'))]
        );
    }

    #[test]
    fn recording_tracks_held_keys() {
        let mut keys = RecordingKeys::new();
        keys.press(Key::Space).unwrap();
        keys.tap(Key::Char('d')).unwrap();
        assert_eq!(keys.held(), [Key::Space]);
        keys.release(Key::Space).unwrap();
        assert!(keys.held().is_empty());
        assert_eq!(keys.take().len(), 3);
        assert!(keys.events().is_empty());
    }
}
