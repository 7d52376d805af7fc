//! The session is the single owner of browsing and playback state.
//!
//! It consumes [`Command`]s from the front end, frame loads from the
//! [`FrameLoader`] and timer events from the ticker, and reports everything
//! visible through a [`Frontend`]. Nothing else mutates the scan result, the
//! playlist or the playback state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Configuration;
use crate::error::Error;
use crate::events::{Command, EffectDetails, Frame, LoaderEvent, SessionEvent, UiEvent};
use crate::playback::{Direction, PlaybackState, Tick};
use crate::scan::{BudgetDecision, Effect, ScanOptions, ScanProgress, ScanResult, ScanStatus, Scanner};
use crate::stats;
use crate::tasks::loader::FrameLoader;
use crate::tasks::ticker;
use crate::tree::{self, DisplayTree, Playlist};

/// Display side of a session. Every method runs on the session task.
pub trait Frontend: Send {
    fn scan_progress(&mut self, _progress: ScanProgress) {}

    fn scan_complete(&mut self, _tree: &DisplayTree, _total: usize) {}

    /// Asked when the scan reaches its directory budget.
    fn budget_exceeded(&mut self, progress: ScanProgress) -> BudgetDecision;

    fn effect_selected(&mut self, _details: &EffectDetails) {}

    fn load_progress(&mut self, _effect: &str, _loaded: usize, _total: usize) {}

    fn frame_ready(&mut self, _index: usize, _frame: &Frame) {}

    /// Loading finished; `failures` frames could not be decoded.
    fn effect_loaded(&mut self, _effect: &str, _frame_count: usize, _failures: usize) {}

    fn playback_changed(&mut self, _playing: bool) {}

    fn auto_advance(&mut self, _next: &Path) {}
}

/// Forwards every callback as a [`UiEvent`] and answers budget prompts with
/// a fixed decision.
pub struct ChannelFrontend {
    events: UnboundedSender<UiEvent>,
    budget: BudgetDecision,
}

impl ChannelFrontend {
    pub fn new(budget: BudgetDecision) -> (Self, UnboundedReceiver<UiEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events, budget }, rx)
    }

    fn emit(&self, event: UiEvent) {
        // Receiver gone just means nobody is watching.
        let _ = self.events.send(event);
    }
}

impl Frontend for ChannelFrontend {
    fn scan_progress(&mut self, progress: ScanProgress) {
        self.emit(UiEvent::ScanProgress(progress));
    }

    fn scan_complete(&mut self, tree: &DisplayTree, total: usize) {
        self.emit(UiEvent::ScanComplete {
            tree: tree.clone(),
            total,
        });
    }

    fn budget_exceeded(&mut self, progress: ScanProgress) -> BudgetDecision {
        self.emit(UiEvent::BudgetExceeded(progress));
        self.budget
    }

    fn effect_selected(&mut self, details: &EffectDetails) {
        self.emit(UiEvent::EffectSelected(details.clone()));
    }

    fn load_progress(&mut self, effect: &str, loaded: usize, total: usize) {
        self.emit(UiEvent::LoadProgress {
            effect: effect.to_string(),
            loaded,
            total,
        });
    }

    fn frame_ready(&mut self, index: usize, frame: &Frame) {
        self.emit(UiEvent::FrameReady {
            index,
            frame: frame.clone(),
        });
    }

    fn effect_loaded(&mut self, effect: &str, frame_count: usize, failures: usize) {
        self.emit(UiEvent::EffectLoaded {
            effect: effect.to_string(),
            frame_count,
            failures,
        });
    }

    fn playback_changed(&mut self, playing: bool) {
        self.emit(UiEvent::PlaybackChanged { playing });
    }

    fn auto_advance(&mut self, next: &Path) {
        self.emit(UiEvent::AutoAdvance(next.to_path_buf()));
    }
}

pub struct Session<F: Frontend> {
    frontend: F,
    scan_options: ScanOptions,
    play_on_select: bool,
    play_delay: Duration,
    advance_delay: Duration,

    root: Option<PathBuf>,
    filter: String,
    scan: ScanResult,
    tree: DisplayTree,
    playlist: Playlist,
    /// Playlist index of the selected effect, when it is listed.
    cursor: Option<usize>,
    selected: Option<Arc<Effect>>,
    /// Bumped on every selection; delayed timer events carry it.
    selection: u64,
    play_after_load: bool,

    playback: PlaybackState,
    loader: FrameLoader,
    loader_rx: Receiver<LoaderEvent>,
    timer_tx: Sender<SessionEvent>,
    timer_rx: Receiver<SessionEvent>,
    interval_tx: watch::Sender<Duration>,
    ticker: Option<CancellationToken>,
}

impl<F: Frontend> Session<F> {
    pub fn new(cfg: &Configuration, frontend: F) -> Self {
        let (loader_tx, loader_rx) = mpsc::channel::<LoaderEvent>(64); // Loader -> Session
        let (timer_tx, timer_rx) = mpsc::channel::<SessionEvent>(64); // Timers -> Session
        let playback_cfg = &cfg.playback;
        let direction = if playback_cfg.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let (interval_tx, _) = watch::channel(playback_cfg.interval);

        Self {
            frontend,
            scan_options: cfg.scan.options(),
            play_on_select: playback_cfg.play_on_select,
            play_delay: playback_cfg.play_delay,
            advance_delay: playback_cfg.advance_delay,
            root: None,
            filter: String::new(),
            scan: ScanResult::default(),
            tree: DisplayTree::default(),
            playlist: Playlist::default(),
            cursor: None,
            selected: None,
            selection: 0,
            play_after_load: false,
            playback: PlaybackState::new(
                playback_cfg.interval,
                direction,
                playback_cfg.auto_advance,
            ),
            loader: FrameLoader::new(cfg.canvas, loader_tx),
            loader_rx,
            timer_tx,
            timer_rx,
            interval_tx,
            ticker: None,
        }
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn scan_result(&self) -> &ScanResult {
        &self.scan
    }

    pub fn tree(&self) -> &DisplayTree {
        &self.tree
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn selected(&self) -> Option<&Arc<Effect>> {
        self.selected.as_ref()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn scan_depth(&self) -> usize {
        self.scan_options.max_depth
    }

    /// Apply one front-end command.
    pub async fn handle(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::SelectDirectory(root) => self.select_directory(root).await,
            Command::SetScanDepth(depth) => self.set_scan_depth(depth).await?,
            Command::SetFilterText(text) => self.set_filter_text(text),
            Command::SelectEffect(path) => self.select_effect(&path)?,
            Command::SetDirection(direction) => self.set_direction(direction),
            Command::SetInterval(seconds) => self.set_interval(seconds)?,
            Command::SetAutoAdvance(enabled) => self.set_auto_advance(enabled),
            Command::Play => self.play()?,
            Command::Pause => self.pause(),
            Command::TogglePlay => self.toggle_play()?,
            Command::Stop => self.stop(),
            Command::SelectFrame(index) => self.select_frame(index)?,
            Command::Rescan => self.rescan().await,
            Command::Reset => self.reset(),
        }
        Ok(())
    }

    /// Point the session at a new library root and scan it.
    pub async fn select_directory(&mut self, root: PathBuf) {
        info!(root = %root.display(), "library directory selected");
        self.clear_selection();
        self.root = Some(root);
        self.rescan().await;
    }

    pub async fn set_scan_depth(&mut self, depth: usize) -> Result<(), Error> {
        if depth == 0 {
            return Err(Error::InvalidScanDepth(depth));
        }
        if depth == self.scan_options.max_depth {
            return Ok(());
        }
        debug!(depth, "scan depth changed");
        self.scan_options.max_depth = depth;
        if self.root.is_some() {
            self.rescan().await;
        }
        Ok(())
    }

    /// Refilter the current scan; no disk access.
    pub fn set_filter_text(&mut self, text: String) {
        self.filter = text;
        self.rebuild_tree();
    }

    /// Walk the current root again, replacing every discovered effect.
    pub async fn rescan(&mut self) {
        let Some(root) = self.root.clone() else {
            debug!("rescan requested without a library directory");
            return;
        };

        let mut scanner = Scanner::new(&root, self.scan_options.clone());
        loop {
            match scanner.poll() {
                ScanStatus::Progress(progress) => {
                    self.frontend.scan_progress(progress);
                    tokio::task::yield_now().await;
                }
                ScanStatus::BudgetExceeded(progress) => {
                    let decision = self.frontend.budget_exceeded(progress);
                    scanner.resume(decision);
                }
                ScanStatus::Complete => break,
            }
        }
        self.scan = scanner.finish();
        self.rebuild_tree();
    }

    fn rebuild_tree(&mut self) {
        let (tree, playlist) = tree::build(&self.scan, &self.filter);
        self.cursor = self
            .selected
            .as_ref()
            .and_then(|effect| playlist.position(&effect.path));
        self.tree = tree;
        self.playlist = playlist;
        debug!(
            effects = self.playlist.len(),
            filter = %self.filter,
            "effect tree rebuilt"
        );
        self.frontend.scan_complete(&self.tree, self.playlist.len());
    }

    /// Select the effect at `path` and start loading its frames.
    pub fn select_effect(&mut self, path: &Path) -> Result<(), Error> {
        let effect = self
            .playlist
            .iter()
            .find(|e| e.path == path)
            .or_else(|| self.scan.find(path))
            .cloned()
            .ok_or_else(|| Error::UnknownEffect(path.to_path_buf()))?;
        let position = self.playlist.position(path);
        self.load_effect(effect, position, self.play_on_select)
    }

    fn load_effect(
        &mut self,
        effect: Arc<Effect>,
        position: Option<usize>,
        autoplay: bool,
    ) -> Result<(), Error> {
        let files = effect.frame_files();
        if files.is_empty() {
            return Err(Error::EmptyEffect(effect.path.clone()));
        }
        let total = files.len();
        self.loader.start(&effect.path, files)?;

        self.halt_playback();
        self.playback.begin_loading(&effect.path);
        self.selection += 1;
        self.cursor = position;
        self.play_after_load = autoplay;
        info!(effect = %effect.name, frames = total, "loading effect");

        let details = stats::effect_details(&effect, position, self.playlist.len());
        self.selected = Some(effect);
        self.frontend.effect_selected(&details);
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), Error> {
        if self.playback.is_playing() {
            return Ok(());
        }
        let generation = self.playback.play()?;
        let cancel = CancellationToken::new();
        ticker::spawn(
            generation,
            self.interval_tx.subscribe(),
            self.timer_tx.clone(),
            cancel.clone(),
        );
        self.ticker = Some(cancel);
        debug!(generation, "playback started");
        self.frontend.playback_changed(true);
        Ok(())
    }

    pub fn pause(&mut self) {
        self.halt_playback();
    }

    pub fn toggle_play(&mut self) -> Result<(), Error> {
        if self.playback.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Pause and rewind to the first frame for the current direction.
    pub fn stop(&mut self) {
        self.halt_playback();
        if let Some(index) = self.playback.stop() {
            self.render(index);
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        if let Some(index) = self.playback.set_direction(direction) {
            self.render(index);
        }
    }

    pub fn set_interval(&mut self, seconds: f64) -> Result<(), Error> {
        let interval = self.playback.set_interval(seconds)?;
        self.interval_tx.send_replace(interval);
        Ok(())
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.playback.set_auto_advance(enabled);
    }

    /// Show frame `index`, pausing playback.
    pub fn select_frame(&mut self, index: usize) -> Result<(), Error> {
        let was_playing = self.playback.is_playing();
        let index = self.playback.select_frame(index)?;
        if was_playing {
            self.stop_ticker();
            self.frontend.playback_changed(false);
        }
        self.render(index);
        Ok(())
    }

    /// Forget the library and the selection.
    pub fn reset(&mut self) {
        info!("session reset");
        self.clear_selection();
        self.root = None;
        self.filter.clear();
        self.scan = ScanResult::default();
        self.rebuild_tree();
    }

    /// Drive the session until `cancel` fires or the command channel closes.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut commands: Receiver<Command>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            select! {
                _ = cancel.cancelled() => break,

                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        break;
                    };
                    debug!(?command, "command");
                    if let Err(err) = self.handle(command).await {
                        warn!("command rejected: {err}");
                    }
                }

                Some(event) = self.loader_rx.recv() => self.on_loader_event(event),

                Some(event) = self.timer_rx.recv() => self.on_session_event(event),
            }
        }

        self.stop_ticker();
        self.loader.cancel();
        Ok(())
    }

    fn on_loader_event(&mut self, event: LoaderEvent) {
        match event {
            LoaderEvent::Progress {
                ticket,
                loaded,
                total,
                ..
            } => {
                if !self.loader.accepts(&ticket) {
                    return;
                }
                let name = self.selected.as_ref().map_or("", |e| e.name.as_str());
                self.frontend.load_progress(name, loaded, total);
            }
            LoaderEvent::Complete {
                ticket,
                frames,
                failures,
            } => {
                if !self.loader.complete(&ticket) {
                    return;
                }
                if failures > 0 {
                    warn!(
                        effect = %ticket.effect.display(),
                        failures,
                        "some frames could not be decoded"
                    );
                }
                let count = frames.len();
                let index = self.playback.load(ticket.effect, frames);
                let name = self.selected.as_ref().map_or("", |e| e.name.as_str());
                self.frontend.effect_loaded(name, count, failures);
                if let Some(index) = index {
                    self.render(index);
                }
                if self.play_after_load && count > 0 {
                    ticker::post_after(
                        self.play_delay,
                        SessionEvent::StartPlayback {
                            selection: self.selection,
                        },
                        self.timer_tx.clone(),
                    );
                }
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Tick { generation } => match self.playback.tick(generation) {
                Tick::Stale => {}
                Tick::Render(index) => self.render(index),
                Tick::LoopComplete(index) => {
                    self.render(index);
                    self.stop_ticker();
                    self.frontend.playback_changed(false);
                    debug!("loop complete; advancing to next effect");
                    ticker::post_after(
                        self.advance_delay,
                        SessionEvent::AdvanceToNext {
                            selection: self.selection,
                        },
                        self.timer_tx.clone(),
                    );
                }
            },
            SessionEvent::StartPlayback { selection } if selection == self.selection => {
                if let Err(err) = self.play() {
                    debug!("auto-play skipped: {err}");
                }
            }
            SessionEvent::AdvanceToNext { selection } if selection == self.selection => {
                self.advance_to_next();
            }
            SessionEvent::StartPlayback { .. } | SessionEvent::AdvanceToNext { .. } => {
                debug!(?event, "dropping timer event for an earlier selection");
            }
        }
    }

    fn advance_to_next(&mut self) {
        let Some(cursor) = self.cursor else {
            debug!("selected effect is not in the playlist; not advancing");
            return;
        };
        let Some(next) = self.playlist.next_index(cursor) else {
            return;
        };
        let Some(effect) = self.playlist.get(next).cloned() else {
            return;
        };
        info!(next = %effect.name, "auto-advancing");
        self.frontend.auto_advance(&effect.path);
        if let Err(err) = self.load_effect(effect, Some(next), self.play_on_select) {
            warn!("auto-advance failed: {err}");
        }
    }

    fn render(&mut self, index: usize) {
        if let Some(frame) = self.playback.frame(index) {
            self.frontend.frame_ready(index, frame);
        }
    }

    /// End any playing session so no further ticks render.
    fn halt_playback(&mut self) {
        let was_playing = self.playback.pause();
        self.stop_ticker();
        if was_playing {
            self.frontend.playback_changed(false);
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(cancel) = self.ticker.take() {
            cancel.cancel();
        }
    }

    fn clear_selection(&mut self) {
        self.loader.cancel();
        self.halt_playback();
        self.playback.reset();
        self.selected = None;
        self.cursor = None;
        self.selection += 1;
    }
}
