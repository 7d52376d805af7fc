use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use effect_preview::config::Configuration;
use effect_preview::events::{EffectDetails, Frame};
use effect_preview::processing::layout::{CanvasSize, center_offset};
use effect_preview::scan::{self, BudgetDecision, ScanProgress};
use effect_preview::stats;
use effect_preview::tasks::session::{Frontend, Session};
use effect_preview::tree::{self, DisplayTree, TreeNode};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "effect-preview",
    version,
    about = "Find image-sequence effects in a folder tree and play them back"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the effect tree found under DIR
    Scan {
        /// Library root; defaults to `library-path` from the config
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Folder levels searched below DIR
        #[arg(long)]
        depth: Option<usize>,
        /// Only list effects whose name contains TEXT
        #[arg(long, value_name = "TEXT", default_value = "")]
        filter: String,
        /// Emit JSON instead of an indented listing
        #[arg(long)]
        json: bool,
        /// What to do when the directory budget runs out
        #[arg(long, value_enum, default_value_t = BudgetPolicy::Continue)]
        budget: BudgetPolicy,
    },
    /// Play effects headless and log every rendered frame
    Play {
        /// Library root; defaults to `library-path` from the config
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Effect (folder name) to start with; defaults to the first one
        #[arg(long, value_name = "NAME")]
        effect: Option<String>,
        /// Time per frame, e.g. `80ms`
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
        /// Play backwards
        #[arg(long)]
        reverse: bool,
        /// Move to the next effect after each full loop
        #[arg(long)]
        auto_advance: bool,
        /// Stop after this long
        #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
        duration: Duration,
        /// What to do when the directory budget runs out
        #[arg(long, value_enum, default_value_t = BudgetPolicy::Continue)]
        budget: BudgetPolicy,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BudgetPolicy {
    Continue,
    Stop,
}

impl From<BudgetPolicy> for BudgetDecision {
    fn from(policy: BudgetPolicy) -> Self {
        match policy {
            BudgetPolicy::Continue => BudgetDecision::Continue,
            BudgetPolicy::Stop => BudgetDecision::Stop,
        }
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("effect_preview={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        verbose,
        command,
    } = Args::parse();
    init_tracing(verbose)?;

    let cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;
    tracing::debug!("configuration:\n{:#?}", cfg);

    match command {
        Cmd::Scan {
            dir,
            depth,
            filter,
            json,
            budget,
        } => {
            let root = library_root(dir, &cfg)?;
            run_scan(&cfg, &root, depth, &filter, json, budget.into())
        }
        Cmd::Play {
            dir,
            effect,
            interval,
            reverse,
            auto_advance,
            duration,
            budget,
        } => {
            let root = library_root(dir, &cfg)?;
            let mut cfg = cfg;
            if let Some(interval) = interval {
                cfg.playback.interval = interval;
            }
            cfg.playback.reverse |= reverse;
            cfg.playback.auto_advance |= auto_advance;
            let cfg = cfg.validated().context("invalid playback options")?;
            run_play(&cfg, root, effect, duration, budget.into()).await
        }
    }
}

fn library_root(dir: Option<PathBuf>, cfg: &Configuration) -> Result<PathBuf> {
    dir.or_else(|| cfg.library_path.clone())
        .ok_or_else(|| anyhow!("no library directory given and library-path is not configured"))
}

fn run_scan(
    cfg: &Configuration,
    root: &Path,
    depth: Option<usize>,
    filter: &str,
    json: bool,
    budget: BudgetDecision,
) -> Result<()> {
    let mut options = cfg.scan.options();
    if let Some(depth) = depth {
        anyhow::ensure!(depth >= 1, "--depth must be at least 1");
        options.max_depth = depth;
    }
    let result = scan::scan_effects(root, &options, |progress| {
        tracing::warn!(
            scanned = progress.dirs_scanned,
            found = progress.effects_found,
            ?budget,
            "directory budget reached"
        );
        budget
    });
    let (tree, playlist) = tree::build(&result, filter);
    let summary = result.summary();

    if json {
        let report = ScanReport {
            root,
            effects: playlist.len(),
            dirs_scanned: summary.dirs_scanned,
            stopped_early: summary.stopped_early,
            tree: &tree,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_tree(&tree);
    println!(
        "# {} effects, {} directories scanned{}",
        playlist.len(),
        summary.dirs_scanned,
        if summary.stopped_early {
            " (stopped at budget)"
        } else {
            ""
        }
    );
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ScanReport<'a> {
    root: &'a Path,
    effects: usize,
    dirs_scanned: usize,
    stopped_early: bool,
    tree: &'a DisplayTree,
}

fn print_tree(tree: &DisplayTree) {
    for node in &tree.nodes {
        match node {
            TreeNode::Category { label, effects } => {
                println!("{label}/");
                for leaf in effects {
                    println!("  {}", leaf.label());
                }
            }
            TreeNode::Effect(leaf) => println!("{}", leaf.label()),
        }
    }
}

async fn run_play(
    cfg: &Configuration,
    root: PathBuf,
    effect: Option<String>,
    duration: Duration,
    budget: BudgetDecision,
) -> Result<()> {
    let mut session = Session::new(
        cfg,
        LogFrontend {
            budget,
            canvas: cfg.canvas,
        },
    );
    session.select_directory(root.clone()).await;

    let first = match &effect {
        Some(name) => session
            .playlist()
            .iter()
            .find(|e| e.name == *name)
            .ok_or_else(|| anyhow!("no effect named {name:?} under {}", root.display()))?,
        None => session
            .playlist()
            .get(0)
            .ok_or_else(|| anyhow!("no effects found under {}", root.display()))?,
    }
    .path
    .clone();
    session.select_effect(&first)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // Held open until shutdown so the session keeps running.
    let (_command_tx, command_rx) = mpsc::channel(16); // CLI -> Session

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            session
                .run(command_rx, cancel)
                .await
                .context("session task failed")
        }
    });

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {
            tracing::info!(?duration, "play time elapsed");
            cancel.cancel();
        }
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }
    Ok(())
}

/// Headless front end: reports everything through the log.
struct LogFrontend {
    budget: BudgetDecision,
    canvas: CanvasSize,
}

impl Frontend for LogFrontend {
    fn scan_progress(&mut self, progress: ScanProgress) {
        tracing::debug!(
            scanned = progress.dirs_scanned,
            found = progress.effects_found,
            "scanning"
        );
    }

    fn scan_complete(&mut self, _tree: &DisplayTree, total: usize) {
        tracing::info!(effects = total, "effect list ready");
    }

    fn budget_exceeded(&mut self, progress: ScanProgress) -> BudgetDecision {
        tracing::warn!(
            scanned = progress.dirs_scanned,
            budget = progress.budget,
            decision = ?self.budget,
            "directory budget reached"
        );
        self.budget
    }

    fn effect_selected(&mut self, details: &EffectDetails) {
        tracing::info!(
            effect = %details.name,
            path = %details.display_path,
            frames = details.image_count,
            size = %stats::format_size(details.size_bytes),
            position = ?details.position.map(|p| p + 1),
            of = details.playlist_len,
            "effect selected"
        );
    }

    fn load_progress(&mut self, effect: &str, loaded: usize, total: usize) {
        tracing::debug!(effect, loaded, total, "loading frames");
    }

    fn frame_ready(&mut self, index: usize, frame: &Frame) {
        let (x, y) = center_offset(
            frame.width(),
            frame.height(),
            self.canvas.width,
            self.canvas.height,
        );
        tracing::info!(
            index,
            width = frame.width(),
            height = frame.height(),
            x,
            y,
            source = %frame.source.display(),
            "frame"
        );
    }

    fn effect_loaded(&mut self, effect: &str, frame_count: usize, failures: usize) {
        tracing::info!(effect, frames = frame_count, failures, "effect loaded");
    }

    fn playback_changed(&mut self, playing: bool) {
        tracing::info!(playing, "playback state changed");
    }

    fn auto_advance(&mut self, next: &Path) {
        tracing::info!(next = %next.display(), "auto-advancing");
    }
}
