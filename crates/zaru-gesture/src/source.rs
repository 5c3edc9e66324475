//! Reading hand landmarks from an external detector.
//!
//! The detector writes one JSON object per processed video frame:
//!
//! ```json
//! {"hands": [{"score": 0.97, "handedness": "Right", "landmarks": [{"x": 0.5, "y": 0.4, "z": 0.0}, ...]}]}
//! ```
//!
//! `hands` may be empty when no hand is visible. A frame may instead carry an `"error"` string,
//! which is logged and treated like an empty frame.

use std::{
    io::{BufRead, BufReader},
    process::{Child, ChildStdout, Command, Stdio},
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::landmark::{HandLandmarks, Handedness, Landmark};

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    handedness: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct FrameJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// A single frame reported by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The hand used for gesture control, or `None` if no usable hand was detected.
    pub hand: Option<HandLandmarks>,
}

/// Anything that yields detector frames.
pub trait FrameSource {
    /// Returns the next frame, or `None` once no more frames will arrive.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// Parses newline-delimited detector output from any buffered reader.
pub struct LandmarkSource<R> {
    reader: R,
    line: String,
    line_no: usize,
    min_presence: f32,
}

impl<R: BufRead> LandmarkSource<R> {
    /// Creates a source that ignores hands whose score is below `min_presence`.
    pub fn new(reader: R, min_presence: f32) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            min_presence,
        }
    }

    /// Reads the next frame, returning `None` once the stream has ended.
    pub fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .context("failed to read from landmark detector")?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            let frame: FrameJson = serde_json::from_str(line)
                .with_context(|| format!("invalid detector output on line {}", self.line_no))?;
            return Ok(Some(self.convert(frame)));
        }
    }

    fn convert(&self, frame: FrameJson) -> Frame {
        if let Some(error) = frame.error {
            log::warn!("detector error: {error}");
            return Frame { hand: None };
        }

        // The first hand with sufficient confidence wins, matching a single-hand detector.
        for hand in frame.hands {
            let score = hand.score.unwrap_or(1.0);
            if score < self.min_presence {
                log::trace!("ignoring hand with score {score:.2}");
                continue;
            }

            let landmarks = hand
                .landmarks
                .iter()
                .map(|lm| Landmark::new(lm.x, lm.y, lm.z));
            let mut landmarks = match HandLandmarks::new(landmarks) {
                Ok(lm) => lm.with_presence(score),
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            match hand.handedness.as_deref() {
                Some("Left") => landmarks = landmarks.with_handedness(Handedness::Left),
                Some("Right") => landmarks = landmarks.with_handedness(Handedness::Right),
                _ => {}
            }

            return Frame {
                hand: Some(landmarks),
            };
        }

        Frame { hand: None }
    }
}

impl<R: BufRead> FrameSource for LandmarkSource<R> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        LandmarkSource::next_frame(self)
    }
}

/// An external detector process whose standard output is a landmark stream.
///
/// The child is killed when this is dropped.
pub struct DetectorProcess {
    child: ChildGuard,
    source: LandmarkSource<BufReader<ChildStdout>>,
}

impl DetectorProcess {
    /// Marker line a detector may print once it has finished loading.
    pub const READY: &'static str = "READY";

    /// Spawns `command_line` (program followed by whitespace-separated arguments).
    ///
    /// If the first line the detector prints is [`DetectorProcess::READY`], it is consumed.
    pub fn spawn(command_line: &str, min_presence: f32) -> anyhow::Result<Self> {
        let mut parts = command_line.split_whitespace();
        let Some(program) = parts.next() else {
            bail!("empty detector command");
        };

        log::info!("starting landmark detector `{command_line}`");
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start detector `{program}`"))?;

        let stdout = child.stdout.take();
        let child = ChildGuard(child);
        let stdout = stdout.context("failed to capture detector stdout")?;
        let mut reader = BufReader::new(stdout);

        // If there's no handshake the first line is already a frame, which has to be kept.
        let buf = reader
            .fill_buf()
            .context("failed to read from landmark detector")?;
        if buf.starts_with(Self::READY.as_bytes()) {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            log::info!("landmark detector ready");
        }

        Ok(Self {
            child,
            source: LandmarkSource::new(reader, min_presence),
        })
    }

    pub fn source(&mut self) -> &mut LandmarkSource<BufReader<ChildStdout>> {
        &mut self.source
    }

    /// OS process ID of the detector.
    pub fn id(&self) -> u32 {
        self.child.0.id()
    }

    /// Moves reading of the detector output to a background thread.
    ///
    /// The detector is killed when the returned source is dropped.
    pub fn into_background(self) -> anyhow::Result<BackgroundSource> {
        let mut background = BackgroundSource::spawn(self.source)?;
        background.detector = Some(self.child);
        Ok(background)
    }
}

impl FrameSource for DetectorProcess {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        self.source.next_frame()
    }
}

struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        match self.0.try_wait() {
            Ok(Some(status)) => log::debug!("detector exited with {status}"),
            _ => {
                if let Err(e) = self.0.kill() {
                    log::warn!("failed to kill detector: {e}");
                }
                self.0.wait().ok();
            }
        }
    }
}

enum Message {
    Frame(anyhow::Result<Option<Frame>>),
    Shutdown,
}

/// A [`FrameSource`] that reads on a background thread.
///
/// Unlike a plain [`LandmarkSource`], it can be interrupted through a [`ShutdownHandle`] while
/// the detector is silent. After a shutdown request, [`FrameSource::next_frame`] returns `None`.
pub struct BackgroundSource {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    ended: bool,
    detector: Option<ChildGuard>,
}

impl BackgroundSource {
    pub fn spawn<R>(mut source: LandmarkSource<R>) -> anyhow::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let sender = tx.clone();
        thread::Builder::new()
            .name("landmark reader".into())
            .spawn(move || loop {
                let res = source.next_frame();
                let last = !matches!(res, Ok(Some(_)));
                if sender.send(Message::Frame(res)).is_err() || last {
                    break;
                }
            })
            .context("failed to spawn landmark reader thread")?;

        Ok(Self {
            tx,
            rx,
            ended: false,
            detector: None,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.clone())
    }
}

impl FrameSource for BackgroundSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.ended {
            return Ok(None);
        }
        let res = match self.rx.recv() {
            Ok(Message::Frame(res)) => res,
            Ok(Message::Shutdown) => {
                log::info!("shutdown requested");
                Ok(None)
            }
            Err(_) => bail!("landmark reader thread died"),
        };
        if !matches!(res, Ok(Some(_))) {
            self.ended = true;
        }
        res
    }
}

/// Makes a [`BackgroundSource`] end its stream.
#[derive(Clone)]
pub struct ShutdownHandle(Sender<Message>);

impl ShutdownHandle {
    pub fn request(&self) {
        // The source being gone already means the same thing.
        self.0.send(Message::Shutdown).ok();
    }
}
