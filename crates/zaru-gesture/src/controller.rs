//! The per-frame gesture control loop.

use std::time::Instant;

use crate::{
    dispatch::{Dispatcher, Outcome},
    filter::{Filter, LandmarkFilter},
    gesture::{self, Gesture, Policy},
    keys::KeyInjector,
    landmark::HandLandmarks,
    profile::Profile,
    source::FrameSource,
    timer::FpsCounter,
};

/// Classifies hands and drives a [`Dispatcher`] according to a [`Profile`].
///
/// A new controller is stopped. Frames passed to a stopped controller are ignored.
pub struct Controller<K: KeyInjector> {
    policy: Policy,
    mirror: bool,
    filter: Option<LandmarkFilter>,
    dispatcher: Dispatcher<K>,
    running: bool,
    gesture: Gesture,
}

impl<K: KeyInjector> Controller<K> {
    /// Creates a controller for `profile`, which is validated first.
    pub fn new(profile: &Profile, keys: K) -> anyhow::Result<Self> {
        profile.validate()?;
        Ok(Self {
            policy: profile.policy,
            mirror: profile.mirror,
            filter: profile.smoothing.map(LandmarkFilter::new),
            dispatcher: Dispatcher::new(profile, keys),
            running: false,
            gesture: Gesture::None,
        })
    }

    pub fn start(&mut self) {
        if !self.running {
            log::info!("gesture control started ({} policy)", self.policy);
            self.running = true;
        }
    }

    /// Stops the controller, releasing any held key.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        if self.running {
            log::info!("gesture control stopped");
        }
        self.running = false;
        self.gesture = Gesture::None;
        if let Some(filter) = &mut self.filter {
            filter.reset();
        }
        self.dispatcher.stop()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The gesture recognized in the most recent frame.
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn dispatcher(&self) -> &Dispatcher<K> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<K> {
        &mut self.dispatcher
    }

    /// Processes one frame. `hand` is `None` when the detector found no hand.
    pub fn tick(&mut self, hand: Option<HandLandmarks>, now: Instant) -> anyhow::Result<Gesture> {
        Ok(self.tick_impl(hand, now)?.0)
    }

    fn tick_impl(
        &mut self,
        hand: Option<HandLandmarks>,
        now: Instant,
    ) -> anyhow::Result<(Gesture, Outcome)> {
        if !self.running {
            return Ok((Gesture::None, Outcome::default()));
        }

        let hand = match (hand, &mut self.filter) {
            (Some(hand), Some(filter)) => Some(filter.push(hand)),
            (None, Some(filter)) => {
                filter.reset();
                None
            }
            (hand, None) => hand,
        };
        let hand = if self.mirror {
            hand.map(|h| h.mirrored())
        } else {
            hand
        };

        let gesture = self.policy.classify_frame(hand.as_ref());
        if gesture != self.gesture {
            log::info!("gesture: {}", gesture.to_string().to_uppercase());
            if let Some(hand) = &hand {
                log::debug!(
                    "fingers up: {}",
                    gesture::finger_up_count(hand, self.policy.counts_thumb())
                );
            }
            self.gesture = gesture;
        }

        let outcome = self.dispatcher.dispatch(gesture, now)?;
        Ok((gesture, outcome))
    }
}

/// Feeds every frame from `source` into `controller` until the stream ends.
///
/// The controller is started first and always stopped afterwards, also when an error occurs or
/// shutdown is requested through a [`ShutdownHandle`].
///
/// [`ShutdownHandle`]: crate::source::ShutdownHandle
pub fn run<S: FrameSource, K: KeyInjector>(
    source: &mut S,
    controller: &mut Controller<K>,
) -> anyhow::Result<()> {
    controller.start();
    let res = run_impl(source, controller);
    match (res, controller.stop()) {
        (Err(e), Err(stop_err)) => {
            log::error!("failed to release keys: {stop_err:#}");
            Err(e)
        }
        (res, stop) => res.and(stop),
    }
}

fn run_impl<S: FrameSource, K: KeyInjector>(
    source: &mut S,
    controller: &mut Controller<K>,
) -> anyhow::Result<()> {
    let mut fps = FpsCounter::new("gesture control");
    while let Some(frame) = source.next_frame()? {
        let (gesture, outcome) = controller.tick_impl(frame.hand, Instant::now())?;
        if let Some(suppressed) = outcome.suppressed {
            log::trace!("{gesture} suppressed: {suppressed:?}");
        }
        fps.tick_with([controller.gesture()]);
    }
    log::info!("landmark stream ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{io::BufReader, time::Duration};

    use super::*;
    use crate::gesture::tests::HandBuilder;
    use crate::keys::{Key, KeyEvent, RecordingKeys};
    use crate::landmark::Finger;
    use crate::source::{tests::Stalled, BackgroundSource, LandmarkSource};

    fn hand(fingers: usize) -> Option<HandLandmarks> {
        Some(HandBuilder::fist().fingers(fingers).build())
    }

    #[test]
    fn brake_then_release() {
        let mut c = Controller::new(&Profile::vehicle(), RecordingKeys::new()).unwrap();
        c.start();
        let t = Instant::now();

        assert_eq!(c.tick(hand(2), t).unwrap(), Gesture::Brake);
        assert_eq!(c.dispatcher().held(), Some(Key::Char('b')));

        assert_eq!(
            c.tick(hand(0), t + Duration::from_millis(30)).unwrap(),
            Gesture::None
        );
        assert_eq!(c.dispatcher().held(), None);
        assert_eq!(
            c.dispatcher().keys().events(),
            [
                KeyEvent::Press(Key::Char('b')),
                KeyEvent::Release(Key::Char('b'))
            ]
        );
    }

    #[test]
    fn absent_hand_is_none() {
        let mut c = Controller::new(&Profile::vehicle(), RecordingKeys::new()).unwrap();
        c.start();
        let t = Instant::now();
        c.tick(hand(1), t).unwrap();
        assert_eq!(c.dispatcher().held(), Some(Key::Space));
        assert_eq!(c.tick(None, t).unwrap(), Gesture::None);
        assert_eq!(c.dispatcher().held(), None);
    }

    #[test]
    fn stopped_controller_ignores_frames() {
        let mut c = Controller::new(&Profile::vehicle(), RecordingKeys::new()).unwrap();
        assert!(!c.is_running());
        assert_eq!(c.tick(hand(1), Instant::now()).unwrap(), Gesture::None);
        assert!(c.dispatcher().keys().events().is_empty());

        c.start();
        c.tick(hand(1), Instant::now()).unwrap();
        c.stop().unwrap();
        assert!(!c.is_running());
        assert_eq!(c.dispatcher().held(), None);
        assert!(c.dispatcher().keys().held().is_empty());
    }

    #[test]
    fn mirroring_flips_thumb() {
        // Thumb sticks out to the right of its IP joint in image space.
        let right_thumb = HandBuilder::fist()
            .up(Finger::Index)
            .thumb((0.7, 0.5), (0.5, 0.45), 0.4)
            .build();

        let mut profile = Profile::runner();
        profile.cooldown = None;

        profile.mirror = false;
        let mut c = Controller::new(&profile, RecordingKeys::new()).unwrap();
        c.start();
        // Only the index finger counts; tip below IP means "roll".
        assert_eq!(c.tick(Some(right_thumb.clone()), Instant::now()).unwrap(), Gesture::Roll);

        profile.mirror = true;
        let mut c = Controller::new(&profile, RecordingKeys::new()).unwrap();
        c.start();
        assert_eq!(c.tick(Some(right_thumb), Instant::now()).unwrap(), Gesture::Left);
    }

    fn frame(hand: &HandLandmarks) -> String {
        let lms = hand
            .iter()
            .map(|lm| format!(r#"{{"x":{},"y":{}}}"#, lm.x(), lm.y()))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{\"hands\":[{{\"score\":1.0,\"landmarks\":[{lms}]}}]}}\n")
    }

    #[test]
    fn runs_stream_and_releases() {
        let accelerate = HandBuilder::fist().fingers(1).build();
        let gear = HandBuilder::fist().fingers(3).build();
        let text = [&accelerate, &accelerate, &gear, &gear, &accelerate]
            .into_iter()
            .map(frame)
            .collect::<String>();

        let mut profile = Profile::vehicle();
        profile.mirror = false;
        let mut source = LandmarkSource::new(std::io::Cursor::new(text), profile.min_presence);
        let mut c = Controller::new(&profile, RecordingKeys::new()).unwrap();
        run(&mut source, &mut c).unwrap();

        assert!(!c.is_running());
        assert_eq!(
            c.dispatcher().keys().events(),
            [
                KeyEvent::Press(Key::Space),
                KeyEvent::Release(Key::Space),
                KeyEvent::Tap(Key::Char('d')),
                KeyEvent::Press(Key::Space),
                KeyEvent::Release(Key::Space),
            ]
        );
    }

    #[test]
    fn shutdown_releases_held_key() {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel::<crate::source::ShutdownHandle>();
        let brake = frame(&HandBuilder::fist().fingers(2).build());
        let (reader, gate) = Stalled::new(brake, move || {
            if let Ok(handle) = handle_rx.recv() {
                handle.request();
            }
        });

        let mut profile = Profile::vehicle();
        profile.mirror = false;
        let mut source =
            BackgroundSource::spawn(LandmarkSource::new(BufReader::new(reader), 0.5)).unwrap();
        handle_tx.send(source.shutdown_handle()).unwrap();
        let mut c = Controller::new(&profile, RecordingKeys::new()).unwrap();
        run(&mut source, &mut c).unwrap();

        assert!(!c.is_running());
        assert_eq!(
            c.dispatcher().keys().events(),
            [
                KeyEvent::Press(Key::Char('b')),
                KeyEvent::Release(Key::Char('b'))
            ]
        );
        drop(gate);
    }

    #[test]
    fn shutdown_before_first_frame() {
        let source = LandmarkSource::new(std::io::Cursor::new(String::new()), 0.5);
        let mut source = BackgroundSource::spawn(source).unwrap();
        source.shutdown_handle().request();
        let mut c = Controller::new(&Profile::vehicle(), RecordingKeys::new()).unwrap();
        run(&mut source, &mut c).unwrap();
        assert!(c.dispatcher().keys().events().is_empty());
    }

    #[test]
    fn rejects_invalid_profile() {
        let mut profile = Profile::vehicle();
        profile.smoothing = Some(1.5);
        assert!(Controller::new(&profile, RecordingKeys::new()).is_err());

        profile.smoothing = Some(0.5);
        assert!(Controller::new(&profile, RecordingKeys::new()).is_ok());
    }

    #[test]
    fn stream_error_wins_over_release_error() {
        #[derive(Default)]
        struct StuckKeys(Vec<Key>);

        impl KeyInjector for StuckKeys {
            fn press(&mut self, key: Key) -> anyhow::Result<()> {
                self.0.push(key);
                Ok(())
            }

            fn release(&mut self, _: Key) -> anyhow::Result<()> {
                anyhow::bail!("release failed")
            }
        }

        let text = format!("{}garbage\n", frame(&HandBuilder::fist().fingers(1).build()));
        let mut profile = Profile::vehicle();
        profile.mirror = false;
        let mut source = LandmarkSource::new(std::io::Cursor::new(text), 0.5);
        let mut c = Controller::new(&profile, StuckKeys::default()).unwrap();

        let err = run(&mut source, &mut c).unwrap_err();
        assert!(format!("{err:#}").contains("invalid detector output"), "{err:#}");
        assert_eq!(c.dispatcher().keys().0, [Key::Space]);
    }
}
