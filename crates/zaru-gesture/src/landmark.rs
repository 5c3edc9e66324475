//! Hand landmarks as produced by an external landmark detector.

use std::{error::Error, fmt};

use nalgebra::Point3;

/// Number of landmarks in a hand pose.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the hand pose landmarks, in the order the detector emits them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **IP**: Interphalangeal joint of the thumb.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// The five digits of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// The four fingers that extend vertically (everything but the thumb).
    pub const VERTICAL: [Finger; 4] = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky];

    pub fn tip(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbTip,
            Finger::Index => LandmarkIdx::IndexFingerTip,
            Finger::Middle => LandmarkIdx::MiddleFingerTip,
            Finger::Ring => LandmarkIdx::RingFingerTip,
            Finger::Pinky => LandmarkIdx::PinkyTip,
        }
    }

    /// Returns the joint two positions below the tip.
    ///
    /// For the thumb this is the MCP, since the thumb has no PIP joint.
    pub fn pip(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbMcp,
            Finger::Index => LandmarkIdx::IndexFingerPip,
            Finger::Middle => LandmarkIdx::MiddleFingerPip,
            Finger::Ring => LandmarkIdx::RingFingerPip,
            Finger::Pinky => LandmarkIdx::PinkyPip,
        }
    }
}

/// A landmark in normalized image coordinates.
///
/// X and Y are in range 0.0 to 1.0 with the origin in the top left corner of the image, so Y points
/// *down*. Z is a relative depth and unused by the classifier.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Landmark {
    pos: Point3<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            pos: Point3::new(x, y, z),
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos.y
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos.z
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// The 21 landmarks of a single detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    landmarks: [Landmark; NUM_LANDMARKS],
    presence: Option<f32>,
    handedness: Option<Handedness>,
}

impl HandLandmarks {
    /// Creates a hand from exactly [`NUM_LANDMARKS`] landmarks.
    pub fn new<I: IntoIterator<Item = Landmark>>(landmarks: I) -> Result<Self, LandmarkError> {
        let landmarks = landmarks.into_iter().collect::<Vec<_>>();
        let landmarks: [Landmark; NUM_LANDMARKS] = landmarks
            .try_into()
            .map_err(|v: Vec<Landmark>| LandmarkError::Count(v.len()))?;
        Ok(Self::from_array(landmarks))
    }

    pub fn from_array(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self {
            landmarks,
            presence: None,
            handedness: None,
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    pub fn with_handedness(self, handedness: Handedness) -> Self {
        Self {
            handedness: Some(handedness),
            ..self
        }
    }

    #[inline]
    pub fn get(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks[idx as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.landmarks.iter().copied()
    }

    pub(crate) fn landmarks_mut(&mut self) -> &mut [Landmark; NUM_LANDMARKS] {
        &mut self.landmarks
    }

    /// The detector's confidence that this is a hand, if it reported one.
    pub fn presence(&self) -> Option<f32> {
        self.presence
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Returns a copy of the hand flipped horizontally (`x` becomes `1 - x`).
    ///
    /// Handedness is flipped along with the coordinates.
    pub fn mirrored(&self) -> Self {
        let mut out = self.clone();
        for lm in out.landmarks_mut() {
            lm.pos.x = 1.0 - lm.pos.x;
        }
        out.handedness = self.handedness.map(|h| match h {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        });
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandmarkError {
    /// The detector produced the wrong number of landmarks.
    Count(usize),
}

impl fmt::Display for LandmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "expected {NUM_LANDMARKS} hand landmarks, got {n}"),
        }
    }
}

impl Error for LandmarkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_indices() {
        assert_eq!(LandmarkIdx::ThumbTip as usize, 4);
        assert_eq!(LandmarkIdx::IndexFingerTip as usize, 8);
        assert_eq!(LandmarkIdx::MiddleFingerTip as usize, 12);
        assert_eq!(LandmarkIdx::RingFingerTip as usize, 16);
        assert_eq!(LandmarkIdx::PinkyTip as usize, 20);

        for finger in Finger::ALL {
            assert_eq!(finger.tip() as usize - 2, finger.pip() as usize);
        }
        assert!(!Finger::VERTICAL.contains(&Finger::Thumb));
    }

    #[test]
    fn rejects_wrong_count() {
        let err = HandLandmarks::new(vec![Landmark::default(); 20]).unwrap_err();
        assert_eq!(err, LandmarkError::Count(20));
        assert!(HandLandmarks::new(vec![Landmark::default(); NUM_LANDMARKS]).is_ok());
    }

    #[test]
    fn mirror() {
        let hand = HandLandmarks::new((0..NUM_LANDMARKS).map(|i| Landmark::new(0.25, i as f32, 0.0)))
            .unwrap()
            .with_handedness(Handedness::Left);
        let mirrored = hand.mirrored();
        assert_eq!(mirrored.get(LandmarkIdx::Wrist).x(), 0.75);
        assert_eq!(mirrored.get(LandmarkIdx::PinkyTip).y(), 20.0);
        assert_eq!(mirrored.handedness(), Some(Handedness::Right));
        assert_eq!(mirrored.mirrored(), hand);
    }
}
