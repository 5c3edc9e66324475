//! Landmark smoothing.

use crate::landmark::{HandLandmarks, Landmark, NUM_LANDMARKS};

/// A filter for values of type `V`.
pub trait Filter<V> {
    /// Adds a new value to the filter, returning the filtered value.
    fn push(&mut self, value: V) -> V;

    /// Resets the accumulated history and state of the filter to be identical to the state just
    /// after construction.
    fn reset(&mut self);
}

/// Exponential Moving Average – a weighted moving average whose weight decreases exponentially.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f32,
    last: Option<f32>,
}

impl Ema {
    /// Creates a new Exponential Moving Average calculator.
    ///
    /// The `alpha` parameter must be between 0.0 and 1.0 and defines how quickly the weight of
    /// older values should decay. Values close to 1.0 very strongly favor recent values over older
    /// values, while values closer to 0.0 favor more recent values less strongly.
    ///
    /// # Panics
    ///
    /// This method will panic if `alpha` is not in between 0.0 and 1.0.
    pub fn new(alpha: f32) -> Self {
        assert!((0.0..=1.0).contains(&alpha), "invalid EMA alpha {alpha}");
        Self { alpha, last: None }
    }
}

impl Filter<f32> for Ema {
    fn push(&mut self, value: f32) -> f32 {
        match self.last {
            Some(last) => {
                let avg = self.alpha * value + (1.0 - self.alpha) * last;
                self.last = Some(avg);
                avg
            }
            None => {
                self.last = Some(value);
                value
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// Smooths every coordinate of a hand's landmarks with its own [`Ema`].
#[derive(Debug, Clone)]
pub struct LandmarkFilter {
    filters: Vec<[Ema; 3]>,
}

impl LandmarkFilter {
    pub fn new(alpha: f32) -> Self {
        let ema = Ema::new(alpha);
        Self {
            filters: vec![[ema.clone(), ema.clone(), ema]; NUM_LANDMARKS],
        }
    }
}

impl Filter<HandLandmarks> for LandmarkFilter {
    fn push(&mut self, mut hand: HandLandmarks) -> HandLandmarks {
        for (lm, [fx, fy, fz]) in hand.landmarks_mut().iter_mut().zip(&mut self.filters) {
            *lm = Landmark::new(fx.push(lm.x()), fy.push(lm.y()), fz.push(lm.z()));
        }
        hand
    }

    fn reset(&mut self) {
        for ema in self.filters.iter_mut().flatten() {
            ema.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::landmark::LandmarkIdx;

    fn hand_at(x: f32, y: f32) -> HandLandmarks {
        HandLandmarks::from_array([Landmark::new(x, y, 0.0); NUM_LANDMARKS])
    }

    #[test]
    fn test_ema() {
        let mut filter = Ema::new(0.5);
        assert_eq!(filter.push(1.0), 1.0);
        assert_eq!(filter.push(2.0), 1.5);
        assert_eq!(filter.push(2.0), 1.75);
        filter.reset();
        assert_eq!(filter.push(4.0), 4.0);
    }

    #[test]
    #[should_panic]
    fn ema_rejects_alpha() {
        Ema::new(1.5);
    }

    #[test]
    fn landmark_filter() {
        let mut filter = LandmarkFilter::new(0.5);
        filter.push(hand_at(0.2, 0.4));
        let hand = filter.push(hand_at(0.4, 0.8));
        let tip = hand.get(LandmarkIdx::IndexFingerTip);
        assert_relative_eq!(tip.x(), 0.3);
        assert_relative_eq!(tip.y(), 0.6);

        filter.reset();
        let hand = filter.push(hand_at(0.9, 0.1));
        assert_relative_eq!(hand.get(LandmarkIdx::Wrist).x(), 0.9);
    }
}
