//! Playback state machine for the active effect.
//!
//! `Idle` (nothing loaded) → `Ready` (frames loaded, still) → `Playing`
//! (advancing on timer ticks) → back to `Ready` on pause/stop, or `Idle` when
//! a new load starts or the view is reset.
//!
//! This type never touches a clock. The timer task only delivers
//! [`PlaybackState::tick`] calls tagged with the playing generation they were
//! started for, and ticks from an ended generation are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::events::Frame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Ready,
    Playing,
}

/// Outcome of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not playing, or the tick belongs to an ended session.
    Stale,
    /// Show the frame at this index.
    Render(usize),
    /// Show this frame; a full loop finished with auto-advance on and
    /// playback is back to `Ready`.
    LoopComplete(usize),
}

#[derive(Debug)]
pub struct PlaybackState {
    effect: Option<PathBuf>,
    frames: Vec<Frame>,
    index: Option<usize>,
    status: PlaybackStatus,
    direction: Direction,
    interval: Duration,
    auto_advance: bool,
    generation: u64,
    /// Steps taken since entering `Playing`.
    steps: usize,
}

impl PlaybackState {
    pub fn new(interval: Duration, direction: Direction, auto_advance: bool) -> Self {
        Self {
            effect: None,
            frames: Vec::new(),
            index: None,
            status: PlaybackStatus::Idle,
            direction,
            interval,
            auto_advance,
            generation: 0,
            steps: 0,
        }
    }

    pub fn effect(&self) -> Option<&Path> {
        self.effect.as_deref()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    /// Current playing generation; ticks must carry it to be honored.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn boundary(&self) -> Option<usize> {
        match (self.frames.len(), self.direction) {
            (0, _) => None,
            (_, Direction::Forward) => Some(0),
            (n, Direction::Reverse) => Some(n - 1),
        }
    }

    fn settled_status(&self) -> PlaybackStatus {
        if self.frames.is_empty() {
            PlaybackStatus::Idle
        } else {
            PlaybackStatus::Ready
        }
    }

    /// A new effect started loading; previous frames are dropped.
    pub fn begin_loading(&mut self, effect: &Path) {
        self.effect = Some(effect.to_path_buf());
        self.frames.clear();
        self.index = None;
        self.status = PlaybackStatus::Idle;
        self.steps = 0;
    }

    /// Install freshly decoded frames. Returns the index to draw.
    pub fn load(&mut self, effect: PathBuf, frames: Vec<Frame>) -> Option<usize> {
        debug!(effect = %effect.display(), frames = frames.len(), "frames installed");
        self.effect = Some(effect);
        self.frames = frames;
        self.index = self.boundary();
        self.status = self.settled_status();
        self.steps = 0;
        self.index
    }

    /// Drop everything and return to `Idle`.
    pub fn reset(&mut self) {
        self.effect = None;
        self.frames.clear();
        self.index = None;
        self.status = PlaybackStatus::Idle;
        self.steps = 0;
    }

    /// Enter `Playing` and return the new generation.
    ///
    /// Already playing keeps the running generation.
    pub fn play(&mut self) -> Result<u64, Error> {
        if self.frames.is_empty() {
            return Err(Error::NoFrames);
        }
        if self.status != PlaybackStatus::Playing {
            self.generation += 1;
            self.steps = 0;
            self.status = PlaybackStatus::Playing;
            if self.index.is_none() {
                self.index = self.boundary();
            }
        }
        Ok(self.generation)
    }

    /// Stop advancing and keep the current frame. Returns whether playback
    /// was running.
    pub fn pause(&mut self) -> bool {
        if self.status == PlaybackStatus::Playing {
            self.status = PlaybackStatus::Ready;
            true
        } else {
            false
        }
    }

    /// Stop and rewind to the direction's first frame. Returns the index to
    /// draw.
    pub fn stop(&mut self) -> Option<usize> {
        self.status = self.settled_status();
        self.index = self.boundary();
        self.index
    }

    /// Change direction. When not playing, the index is mirrored so the
    /// visible frame stays the same; returns it in that case.
    pub fn set_direction(&mut self, direction: Direction) -> Option<usize> {
        if direction == self.direction {
            return None;
        }
        self.direction = direction;
        if self.is_playing() || self.frames.is_empty() {
            return None;
        }
        let last = self.frames.len() - 1;
        self.index = self.index.map(|i| last - i.min(last));
        self.index
    }

    pub fn toggle_direction(&mut self) -> Option<usize> {
        self.set_direction(self.direction.flipped())
    }

    /// Seconds per frame; applies from the next scheduled step.
    pub fn set_interval(&mut self, seconds: f64) -> Result<Duration, Error> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(Error::InvalidInterval(seconds));
        }
        let interval =
            Duration::try_from_secs_f64(seconds).map_err(|_| Error::InvalidInterval(seconds))?;
        if interval.is_zero() {
            return Err(Error::InvalidInterval(seconds));
        }
        self.interval = interval;
        Ok(interval)
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.auto_advance = enabled;
    }

    /// Manual scrub; pauses playback.
    pub fn select_frame(&mut self, index: usize) -> Result<usize, Error> {
        let count = self.frames.len();
        if index >= count {
            return Err(Error::FrameOutOfRange { index, count });
        }
        self.pause();
        self.index = Some(index);
        Ok(index)
    }

    /// Advance one step for the playing session `generation`.
    pub fn tick(&mut self, generation: u64) -> Tick {
        if self.status != PlaybackStatus::Playing || generation != self.generation {
            return Tick::Stale;
        }
        let count = self.frames.len();
        if count == 0 {
            self.status = PlaybackStatus::Idle;
            return Tick::Stale;
        }

        let current = self.index.unwrap_or(0).min(count - 1);
        let next = match self.direction {
            Direction::Forward => (current + 1) % count,
            Direction::Reverse => (current + count - 1) % count,
        };
        self.index = Some(next);
        self.steps += 1;

        if self.auto_advance && self.steps >= count {
            self.status = PlaybackStatus::Ready;
            return Tick::LoopComplete(next);
        }
        Tick::Render(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::sync::Arc;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame {
                source: PathBuf::from(format!("/fx/{i}.png")),
                image: Arc::new(RgbaImage::new(1, 1)),
            })
            .collect()
    }

    fn loaded(n: usize, direction: Direction, auto_advance: bool) -> PlaybackState {
        let mut state = PlaybackState::new(Duration::from_millis(100), direction, auto_advance);
        state.load(PathBuf::from("/fx"), frames(n));
        state
    }

    #[test]
    fn load_starts_at_direction_boundary() {
        assert_eq!(loaded(3, Direction::Forward, false).index(), Some(0));
        assert_eq!(loaded(3, Direction::Reverse, false).index(), Some(2));
        let empty = loaded(0, Direction::Forward, false);
        assert_eq!(empty.index(), None);
        assert_eq!(empty.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn forward_wraps_after_full_cycle() {
        let mut state = loaded(3, Direction::Forward, false);
        let generation = state.play().unwrap();
        let seen: Vec<Tick> = (0..3).map(|_| state.tick(generation)).collect();
        assert_eq!(seen, [Tick::Render(1), Tick::Render(2), Tick::Render(0)]);
        assert_eq!(state.index(), Some(0));
        assert!(state.is_playing());
    }

    #[test]
    fn reverse_wraps_after_full_cycle() {
        let mut state = loaded(3, Direction::Reverse, false);
        let generation = state.play().unwrap();
        let seen: Vec<Tick> = (0..3).map(|_| state.tick(generation)).collect();
        assert_eq!(seen, [Tick::Render(1), Tick::Render(0), Tick::Render(2)]);
        assert_eq!(state.index(), Some(2));
    }

    #[test]
    fn empty_effect_cannot_play() {
        let mut state = loaded(0, Direction::Forward, false);
        assert!(matches!(state.play(), Err(Error::NoFrames)));
        assert_eq!(state.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn pause_keeps_index_and_drops_later_ticks() {
        let mut state = loaded(4, Direction::Forward, false);
        let generation = state.play().unwrap();
        state.tick(generation);
        assert!(state.pause());
        assert_eq!(state.status(), PlaybackStatus::Ready);
        assert_eq!(state.index(), Some(1));
        assert_eq!(state.tick(generation), Tick::Stale);
        assert_eq!(state.index(), Some(1));
    }

    #[test]
    fn ticks_from_an_earlier_session_are_ignored() {
        let mut state = loaded(4, Direction::Forward, false);
        let first = state.play().unwrap();
        state.pause();
        let second = state.play().unwrap();
        assert_ne!(first, second);
        assert_eq!(state.tick(first), Tick::Stale);
        assert_eq!(state.tick(second), Tick::Render(1));
    }

    #[test]
    fn stop_rewinds_to_boundary() {
        let mut state = loaded(5, Direction::Reverse, false);
        let generation = state.play().unwrap();
        state.tick(generation);
        state.tick(generation);
        assert_eq!(state.stop(), Some(4));
        assert_eq!(state.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn toggle_direction_keeps_displayed_frame() {
        let mut state = loaded(5, Direction::Forward, false);
        state.select_frame(1).unwrap();
        assert_eq!(state.toggle_direction(), Some(3));
        assert_eq!(state.direction(), Direction::Reverse);
        assert_eq!(state.toggle_direction(), Some(1));
        assert_eq!(state.direction(), Direction::Forward);
    }

    #[test]
    fn toggle_direction_without_frames_only_flips() {
        let mut state = loaded(0, Direction::Forward, false);
        assert_eq!(state.toggle_direction(), None);
        assert_eq!(state.direction(), Direction::Reverse);
        assert_eq!(state.index(), None);
    }

    #[test]
    fn toggle_while_playing_reverses_next_step() {
        let mut state = loaded(4, Direction::Forward, false);
        let generation = state.play().unwrap();
        assert_eq!(state.tick(generation), Tick::Render(1));
        assert_eq!(state.toggle_direction(), None);
        assert_eq!(state.tick(generation), Tick::Render(0));
    }

    #[test]
    fn auto_advance_completes_after_one_loop() {
        let mut state = loaded(3, Direction::Forward, true);
        let generation = state.play().unwrap();
        assert_eq!(state.tick(generation), Tick::Render(1));
        assert_eq!(state.tick(generation), Tick::Render(2));
        assert_eq!(state.tick(generation), Tick::LoopComplete(0));
        assert_eq!(state.status(), PlaybackStatus::Ready);
        assert_eq!(state.tick(generation), Tick::Stale);
    }

    #[test]
    fn scrub_pauses_and_rejects_out_of_range() {
        let mut state = loaded(3, Direction::Forward, false);
        state.play().unwrap();
        assert_eq!(state.select_frame(2).unwrap(), 2);
        assert!(!state.is_playing());
        assert!(matches!(
            state.select_frame(3),
            Err(Error::FrameOutOfRange { index: 3, count: 3 })
        ));
        assert_eq!(state.index(), Some(2));
    }

    #[test]
    fn interval_must_be_positive() {
        let mut state = loaded(1, Direction::Forward, false);
        assert!(matches!(state.set_interval(0.0), Err(Error::InvalidInterval(_))));
        assert!(matches!(state.set_interval(-1.0), Err(Error::InvalidInterval(_))));
        assert!(matches!(state.set_interval(f64::NAN), Err(Error::InvalidInterval(_))));
        assert_eq!(state.interval(), Duration::from_millis(100));
        assert_eq!(state.set_interval(0.25).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn begin_loading_returns_to_idle() {
        let mut state = loaded(3, Direction::Forward, false);
        state.play().unwrap();
        state.begin_loading(Path::new("/other"));
        assert_eq!(state.status(), PlaybackStatus::Idle);
        assert!(state.frames().is_empty());
        assert_eq!(state.effect(), Some(Path::new("/other")));
    }
}
