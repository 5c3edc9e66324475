//! Gesture classification from hand landmarks.
//!
//! Two classification [`Policy`]s exist, one per controller variant. Both are total functions:
//! every hand maps to exactly one [`Gesture`], and anything they don't recognize maps to
//! [`Gesture::None`].

use serde::{Deserialize, Serialize};

use crate::landmark::{Finger, HandLandmarks, LandmarkIdx};

/// A discrete gesture label.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gesture {
    // Runner
    Pause,
    PlayAgain,
    Roll,
    Jump,
    Left,
    Right,
    Hoverboard,
    // Vehicle
    Accelerate,
    Brake,
    GearDrive,
    GearReverse,
    #[default]
    None,
}

/// Counts the extended fingers of `hand`.
///
/// A non-thumb finger is up if its tip is above (smaller Y than) its PIP joint. The thumb extends
/// sideways, so it counts as up if its tip is left of (smaller X than) its IP joint.
pub fn finger_up_count(hand: &HandLandmarks, include_thumb: bool) -> u8 {
    let mut count = 0;
    if include_thumb && hand.get(LandmarkIdx::ThumbTip).x() < hand.get(LandmarkIdx::ThumbIp).x() {
        count += 1;
    }
    for finger in Finger::VERTICAL {
        if hand.get(finger.tip()).y() < hand.get(finger.pip()).y() {
            count += 1;
        }
    }
    count
}

/// Returns whether the thumb points straight up while the other four fingers are curled.
pub fn is_thumbs_up(hand: &HandLandmarks) -> bool {
    let tip = hand.get(LandmarkIdx::ThumbTip).y();
    let ip = hand.get(LandmarkIdx::ThumbIp).y();
    let mcp = hand.get(LandmarkIdx::ThumbMcp).y();

    tip < ip
        && ip < mcp
        && Finger::VERTICAL
            .iter()
            .all(|f| hand.get(f.tip()).y() > hand.get(f.pip()).y())
}

/// A gesture classification policy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Policy {
    /// Endless-runner controls. Counts the thumb and recognizes a thumbs-up.
    Runner,
    /// Vehicle controls. Only the four non-thumb fingers are counted.
    Vehicle,
}

impl Policy {
    pub fn classify(self, hand: &HandLandmarks) -> Gesture {
        match self {
            Policy::Runner => classify_runner(hand),
            Policy::Vehicle => classify_vehicle(hand),
        }
    }

    /// Classifies a frame in which the detector may not have found a hand.
    pub fn classify_frame(self, hand: Option<&HandLandmarks>) -> Gesture {
        hand.map_or(Gesture::None, |hand| self.classify(hand))
    }

    /// Every gesture this policy can produce, [`Gesture::None`] excluded.
    pub fn gestures(self) -> &'static [Gesture] {
        use Gesture::*;
        match self {
            Policy::Runner => &[Pause, PlayAgain, Roll, Jump, Left, Right, Hoverboard],
            Policy::Vehicle => &[Accelerate, Brake, GearDrive, GearReverse, Pause],
        }
    }

    /// Whether the thumb contributes to the finger count under this policy.
    pub fn counts_thumb(self) -> bool {
        match self {
            Policy::Runner => true,
            Policy::Vehicle => false,
        }
    }
}

fn classify_runner(hand: &HandLandmarks) -> Gesture {
    // The thumbs-up shape overrides every count-based branch.
    if is_thumbs_up(hand) {
        return Gesture::PlayAgain;
    }

    let count = finger_up_count(hand, true);
    let thumb_down = hand.get(LandmarkIdx::ThumbTip).y() > hand.get(LandmarkIdx::ThumbIp).y();
    match count {
        0 => Gesture::Pause,
        1 if thumb_down => Gesture::Roll,
        1 => Gesture::Jump,
        2 => Gesture::Left,
        3 => Gesture::Right,
        5 => Gesture::Hoverboard,
        // 4 is deliberately unmapped
        _ => Gesture::None,
    }
}

fn classify_vehicle(hand: &HandLandmarks) -> Gesture {
    match finger_up_count(hand, false) {
        1 => Gesture::Accelerate,
        2 => Gesture::Brake,
        3 => Gesture::GearDrive,
        4 => Gesture::GearReverse,
        // Only reachable if the count ever includes the thumb.
        5 => Gesture::Pause,
        _ => Gesture::None,
    }
}
