use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use crate::playback::Direction;
use crate::scan::ScanProgress;
use crate::tree::DisplayTree;

/// One decoded, display-ready image of an effect.
#[derive(Debug, Clone)]
pub struct Frame {
    pub source: PathBuf,
    pub image: Arc<RgbaImage>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Identity of one frame-load request: the effect plus a generation number,
/// so a reload of the same effect never accepts results from an older run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub id: u64,
    pub effect: PathBuf,
}

/// Loader -> Session
#[derive(Debug)]
pub enum LoaderEvent {
    /// One file processed; `failed` when it could not be decoded.
    Progress {
        ticket: LoadTicket,
        loaded: usize,
        total: usize,
        failed: bool,
    },
    /// Every file processed, frames in file order.
    Complete {
        ticket: LoadTicket,
        frames: Vec<Frame>,
        failures: usize,
    },
}

/// Timers -> Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Frame interval elapsed for the playing session `generation`.
    Tick { generation: u64 },
    /// Delayed auto-play for the selection `selection`.
    StartPlayback { selection: u64 },
    /// Delayed move to the next playlist entry after a finished loop.
    AdvanceToNext { selection: u64 },
}

/// Front end -> Session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectDirectory(PathBuf),
    SetScanDepth(usize),
    SetFilterText(String),
    SelectEffect(PathBuf),
    SetDirection(Direction),
    SetInterval(f64),
    SetAutoAdvance(bool),
    Play,
    Pause,
    TogglePlay,
    Stop,
    SelectFrame(usize),
    Rescan,
    Reset,
}

/// Details shown when an effect is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectDetails {
    pub name: String,
    pub path: PathBuf,
    /// Path relative to the scan root, shortened for display.
    pub display_path: String,
    pub image_count: usize,
    pub size_bytes: u64,
    /// Zero-based index in the playlist, if the effect is listed.
    pub position: Option<usize>,
    pub playlist_len: usize,
}

/// Session -> Front end, as delivered by
/// [`ChannelFrontend`](crate::tasks::session::ChannelFrontend).
#[derive(Debug, Clone)]
pub enum UiEvent {
    ScanProgress(ScanProgress),
    ScanComplete { tree: DisplayTree, total: usize },
    BudgetExceeded(ScanProgress),
    EffectSelected(EffectDetails),
    LoadProgress {
        effect: String,
        loaded: usize,
        total: usize,
    },
    FrameReady { index: usize, frame: Frame },
    EffectLoaded {
        effect: String,
        frame_count: usize,
        failures: usize,
    },
    PlaybackChanged { playing: bool },
    AutoAdvance(PathBuf),
}
