use std::path::PathBuf;

use thiserror::Error;

/// Library error type for requests the engine rejects.
///
/// None of these are fatal: the session logs them and leaves its state
/// untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// A frame load for this effect is still running.
    #[error("frames for {} are already loading", .0.display())]
    LoaderBusy(PathBuf),

    /// Play was requested without any decoded frames.
    #[error("no frames loaded")]
    NoFrames,

    /// Manual scrub outside the loaded frame range.
    #[error("frame {index} is out of range for {count} frames")]
    FrameOutOfRange { index: usize, count: usize },

    /// Scan depth must reach at least the folders directly under the root.
    #[error("invalid scan depth: {0}")]
    InvalidScanDepth(usize),

    /// Frame interval must be a positive, finite number of seconds.
    #[error("invalid frame interval: {0}s")]
    InvalidInterval(f64),

    /// The path does not name an effect in the current playlist.
    #[error("unknown effect: {}", .0.display())]
    UnknownEffect(PathBuf),

    /// The effect folder no longer contains any supported images.
    #[error("effect {} has no images", .0.display())]
    EmptyEffect(PathBuf),
}
