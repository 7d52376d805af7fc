use effect_preview::Error;
use effect_preview::config::Configuration;
use effect_preview::events::{Command, UiEvent};
use effect_preview::playback::PlaybackStatus;
use effect_preview::scan::BudgetDecision;
use effect_preview::tasks::session::{ChannelFrontend, Session};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn write_frames(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 1..=count {
        RgbaImage::from_pixel(16, 16, Rgba([i as u8, 0, 0, 255]))
            .save(dir.join(format!("{i}.png")))
            .unwrap();
    }
}

fn fast_config() -> Configuration {
    let mut cfg = Configuration::default();
    cfg.playback.interval = Duration::from_millis(5);
    cfg.playback.play_delay = Duration::from_millis(1);
    cfg.playback.advance_delay = Duration::from_millis(1);
    cfg
}

/// Wait for the first event `pick` accepts, skipping the rest.
async fn wait_for<T>(
    rx: &mut UnboundedReceiver<UiEvent>,
    mut pick: impl FnMut(UiEvent) -> Option<T>,
) -> T {
    timeout(Duration::from_secs(10), async {
        loop {
            let ev = rx.recv().await.expect("session closed");
            if let Some(out) = pick(ev) {
                return out;
            }
        }
    })
    .await
    .expect("timeout waiting for ui event")
}

/// Events delivered within `window`.
async fn drain(rx: &mut UnboundedReceiver<UiEvent>, window: Duration) -> Vec<UiEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(ev)) = timeout(window, rx.recv()).await {
        seen.push(ev);
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn auto_advance_walks_playlist_and_wraps() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("a"), 2);
    write_frames(&lib.join("b"), 2);

    let mut cfg = fast_config();
    cfg.playback.auto_advance = true;
    let (frontend, mut ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let session = Session::new(&cfg, frontend);

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cmd_rx, cancel.clone()));

    cmd_tx
        .send(Command::SelectDirectory(lib.clone()))
        .await
        .unwrap();
    let total = wait_for(&mut ui, |ev| match ev {
        UiEvent::ScanComplete { total, .. } => Some(total),
        _ => None,
    })
    .await;
    assert_eq!(total, 2);

    cmd_tx
        .send(Command::SelectEffect(lib.join("a")))
        .await
        .unwrap();

    let mut advanced: Vec<PathBuf> = Vec::new();
    while advanced.len() < 2 {
        let next = wait_for(&mut ui, |ev| match ev {
            UiEvent::AutoAdvance(path) => Some(path),
            _ => None,
        })
        .await;
        advanced.push(next);
    }
    assert_eq!(advanced, vec![lib.join("b"), lib.join("a")]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_load_never_reaches_the_screen() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("big"), 30);
    write_frames(&lib.join("small"), 1);

    let mut cfg = fast_config();
    cfg.playback.play_on_select = false;
    let (frontend, mut ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let session = Session::new(&cfg, frontend);

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cmd_rx, cancel.clone()));

    cmd_tx
        .send(Command::SelectDirectory(lib.clone()))
        .await
        .unwrap();
    cmd_tx
        .send(Command::SelectEffect(lib.join("big")))
        .await
        .unwrap();
    cmd_tx
        .send(Command::SelectEffect(lib.join("small")))
        .await
        .unwrap();

    let loaded = wait_for(&mut ui, |ev| match ev {
        UiEvent::EffectLoaded {
            effect,
            frame_count,
            ..
        } => Some((effect, frame_count)),
        _ => None,
    })
    .await;
    assert_eq!(loaded, ("small".to_string(), 1));

    let small = lib.join("small");
    let later = drain(&mut ui, Duration::from_millis(300)).await;
    for ev in &later {
        match ev {
            UiEvent::EffectLoaded { effect, .. } => panic!("stale load surfaced: {effect}"),
            UiEvent::FrameReady { frame, .. } => assert!(frame.source.starts_with(&small)),
            _ => {}
        }
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_frames_are_counted_when_loading_finishes() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("fx"), 2);
    fs::write(lib.join("fx").join("1b.png"), b"not a png").unwrap();

    let mut cfg = fast_config();
    cfg.playback.play_on_select = false;
    let (frontend, mut ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let mut session = Session::new(&cfg, frontend);
    session.select_directory(lib.clone()).await;
    session.select_effect(&lib.join("fx")).unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cmd_rx, cancel.clone()));

    let loaded = wait_for(&mut ui, |ev| match ev {
        UiEvent::EffectLoaded {
            frame_count,
            failures,
            ..
        } => Some((frame_count, failures)),
        _ => None,
    })
    .await;
    assert_eq!(loaded, (2, 1));

    drop(cmd_tx);
    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scrubbing_pauses_playback() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("loop"), 4);

    let mut cfg = fast_config();
    cfg.playback.interval = Duration::from_millis(20);
    let (frontend, mut ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let session = Session::new(&cfg, frontend);

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cmd_rx, cancel.clone()));

    cmd_tx
        .send(Command::SelectDirectory(lib.clone()))
        .await
        .unwrap();
    cmd_tx
        .send(Command::SelectEffect(lib.join("loop")))
        .await
        .unwrap();
    wait_for(&mut ui, |ev| {
        matches!(ev, UiEvent::PlaybackChanged { playing: true }).then_some(())
    })
    .await;

    cmd_tx.send(Command::SelectFrame(1)).await.unwrap();
    wait_for(&mut ui, |ev| {
        matches!(ev, UiEvent::PlaybackChanged { playing: false }).then_some(())
    })
    .await;
    let index = wait_for(&mut ui, |ev| match ev {
        UiEvent::FrameReady { index, .. } => Some(index),
        _ => None,
    })
    .await;
    assert_eq!(index, 1);

    let later = drain(&mut ui, Duration::from_millis(150)).await;
    assert!(
        !later.iter().any(|ev| matches!(ev, UiEvent::FrameReady { .. })),
        "frames rendered after pause: {later:?}"
    );

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_requests_leave_state_untouched() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("fx"), 3);
    fs::create_dir_all(lib.join("empty")).unwrap();

    let (frontend, _ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let mut session = Session::new(&fast_config(), frontend);

    assert!(matches!(session.play(), Err(Error::NoFrames)));
    assert!(matches!(session.set_interval(0.0), Err(Error::InvalidInterval(_))));
    assert!(matches!(
        session.select_frame(0),
        Err(Error::FrameOutOfRange { index: 0, count: 0 })
    ));

    session.select_directory(lib.clone()).await;
    assert_eq!(session.playlist().len(), 1);
    assert!(matches!(
        session.select_effect(&lib.join("empty")),
        Err(Error::UnknownEffect(_))
    ));

    session.select_effect(&lib.join("fx")).unwrap();
    assert!(matches!(
        session.select_effect(&lib.join("fx")),
        Err(Error::LoaderBusy(_))
    ));
    assert_eq!(session.cursor(), Some(0));
    assert_eq!(session.playback().status(), PlaybackStatus::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filter_and_depth_rebuild_the_playlist() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().to_path_buf();
    write_frames(&lib.join("fire"), 1);
    write_frames(&lib.join("deep").join("er").join("smoke"), 1);

    let (frontend, _ui) = ChannelFrontend::new(BudgetDecision::Continue);
    let mut session = Session::new(&fast_config(), frontend);
    session.select_directory(lib.clone()).await;
    assert_eq!(session.playlist().len(), 2);

    session.select_effect(&lib.join("fire")).unwrap();
    session.set_filter_text("SMO".into());
    assert_eq!(session.playlist().len(), 1);
    assert_eq!(session.cursor(), None);

    session.set_filter_text(String::new());
    assert_eq!(session.cursor(), Some(1));

    assert!(matches!(
        session.set_scan_depth(0).await,
        Err(Error::InvalidScanDepth(0))
    ));
    assert_eq!(session.scan_depth(), 5);
    assert_eq!(session.playlist().len(), 2);

    session.set_scan_depth(2).await.unwrap();
    assert_eq!(session.scan_depth(), 2);
    assert_eq!(session.playlist().len(), 1);
    assert_eq!(session.cursor(), Some(0));

    session.reset();
    assert!(session.playlist().is_empty());
    assert!(session.root().is_none());
    assert!(session.selected().is_none());
}
