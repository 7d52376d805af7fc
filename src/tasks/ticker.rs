use crate::events::SessionEvent;
use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Frame clock for one playing session.
///
/// Sleeps for the current interval, then posts a tick tagged with
/// `generation`. A new interval is picked up at the start of the next sleep.
pub async fn run(
    generation: u64,
    interval: watch::Receiver<Duration>,
    to_session: Sender<SessionEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let wait = *interval.borrow();
        select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {
                trace!(generation, "tick");
                if to_session.send(SessionEvent::Tick { generation }).await.is_err() {
                    debug!("session closed; ticker exiting");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Start a ticker for `generation`; cancelling `cancel` ends it.
pub fn spawn(
    generation: u64,
    interval: watch::Receiver<Duration>,
    to_session: Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        if let Err(err) = run(generation, interval, to_session, cancel).await {
            warn!("ticker failed: {err:#}");
        }
    });
}

/// Deliver `event` to the session after `delay`.
pub fn post_after(delay: Duration, event: SessionEvent, to_session: Sender<SessionEvent>) {
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = to_session.send(event).await;
    });
}
