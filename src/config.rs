use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::processing::layout::CanvasSize;
use crate::scan::ScanOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory scanned on startup when no directory is given on the
    /// command line.
    pub library_path: Option<PathBuf>,
    /// Directory walk limits.
    pub scan: ScanSettings,
    /// Box every decoded frame is fit into.
    pub canvas: CanvasSize,
    /// Playback defaults.
    pub playback: PlaybackSettings,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.scan.validate().context("invalid scan configuration")?;
        ensure!(
            self.canvas.width > 0 && self.canvas.height > 0,
            "canvas width and height must be greater than zero"
        );
        self.playback
            .validate()
            .context("invalid playback configuration")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Folder levels below the root that are searched for effects.
    pub max_depth: usize,
    /// Directories visited before asking whether to keep going.
    pub dir_budget: usize,
    /// Budget granted each time the scan is continued.
    pub budget_increment: usize,
    /// Directories between progress updates.
    pub progress_every: usize,
    /// Scans slower than this are reported in the log.
    #[serde(with = "humantime_serde")]
    pub slow_scan_warning: Duration,
}

impl ScanSettings {
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            max_depth: self.max_depth,
            dir_budget: self.dir_budget,
            budget_increment: self.budget_increment,
            progress_every: self.progress_every,
            slow_scan_warning: Some(self.slow_scan_warning),
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_depth >= 1, "scan.max-depth must be at least 1");
        ensure!(self.dir_budget >= 1, "scan.dir-budget must be at least 1");
        ensure!(
            self.budget_increment >= 1,
            "scan.budget-increment must be at least 1"
        );
        Ok(())
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        let defaults = ScanOptions::default();
        Self {
            max_depth: defaults.max_depth,
            dir_budget: defaults.dir_budget,
            budget_increment: defaults.budget_increment,
            progress_every: defaults.progress_every,
            slow_scan_warning: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackSettings {
    /// Time each frame stays on screen.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Start in reverse direction.
    pub reverse: bool,
    /// Move on to the next playlist entry after each full loop.
    pub auto_advance: bool,
    /// Start playing as soon as a selected effect finishes loading.
    pub play_on_select: bool,
    /// Pause between a load finishing and playback starting.
    #[serde(with = "humantime_serde")]
    pub play_delay: Duration,
    /// Pause between a loop finishing and the next effect being selected.
    #[serde(with = "humantime_serde")]
    pub advance_delay: Duration,
}

impl PlaybackSettings {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.interval.is_zero(),
            "playback.interval must be greater than zero"
        );
        Ok(())
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            reverse: false,
            auto_advance: false,
            play_on_select: true,
            play_delay: Duration::from_millis(100),
            advance_delay: Duration::from_millis(500),
        }
    }
}
