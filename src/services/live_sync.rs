//! Live Sync Coordinator: one change subscription per session, each change
//! triggering a full reload of the roster.
//!
//! A failed or timed-out subscription is not retried. The status is published so
//! the UI can flag the roster as possibly stale, and manual reload keeps working.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    dao::changes::{ChannelStatus, Subscription, Table},
    services::{ride_store, sse_events},
    state::SharedState,
};

/// Open the subscription unless one is already running. Returns whether one was opened.
pub async fn start(state: &SharedState) -> bool {
    let realtime = state.config().realtime().clone();
    if !realtime.enabled {
        info!("live sync disabled by configuration");
        return false;
    }
    let Some(feed) = state.change_feed().cloned() else {
        info!("no change feed available; live sync off");
        return false;
    };

    let mut slot = state.live_sync_task().lock().await;
    if slot.as_ref().is_some_and(|task| !task.is_finished()) {
        debug!("live sync already running");
        return false;
    }

    let mut tables = vec![Table::Rides];
    if realtime.watch_participants {
        tables.push(Table::RideParticipants);
    }
    publish_status(state, ChannelStatus::Connecting);
    let subscription = feed.subscribe(tables);
    *slot = Some(tokio::spawn(run(
        state.clone(),
        subscription,
        realtime.subscribe_timeout,
    )));
    true
}

/// Tear the subscription down and report the channel as closed.
pub async fn stop(state: &SharedState) {
    let task = state.live_sync_task().lock().await.take();
    if let Some(task) = task {
        task.abort();
        let _ = task.await;
        debug!("live sync stopped");
    }
    publish_status(state, ChannelStatus::Closed);
}

async fn run(state: SharedState, mut subscription: Subscription, subscribe_timeout: Duration) {
    let status = wait_until_subscribed(&mut subscription, subscribe_timeout).await;
    publish_status(&state, status);
    if status != ChannelStatus::Subscribed {
        warn!(?status, "live sync unavailable; roster only refreshes on manual reload");
        return;
    }

    let (events, status_rx) = subscription.channels();
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Some(event) => {
                    let mut coalesced = 0usize;
                    while events.try_recv().is_ok() {
                        coalesced += 1;
                    }
                    debug!(table = event.table.name(), kind = ?event.kind, coalesced, "change received; reloading");
                    if let Err(err) = ride_store::reload(&state).await {
                        warn!(error = %err, "reload after change failed");
                    }
                }
                None => {
                    let last = *status_rx.borrow();
                    publish_status(&state, if last.is_terminal() { last } else { ChannelStatus::Closed });
                    break;
                }
            },
            changed = status_rx.changed() => {
                let current = *status_rx.borrow_and_update();
                if changed.is_err() && !current.is_terminal() {
                    publish_status(&state, ChannelStatus::Closed);
                    break;
                }
                publish_status(&state, current);
                if current.is_terminal() {
                    warn!(status = ?current, "live sync channel ended");
                    break;
                }
            }
        }
    }
}

async fn wait_until_subscribed(subscription: &mut Subscription, limit: Duration) -> ChannelStatus {
    let (_, status) = subscription.channels();
    match tokio::time::timeout(limit, status.wait_for(|s| *s != ChannelStatus::Connecting)).await {
        Ok(Ok(reached)) => *reached,
        Ok(Err(_)) => ChannelStatus::Closed,
        Err(_) => ChannelStatus::TimedOut,
    }
}

fn publish_status(state: &SharedState, status: ChannelStatus) {
    if state.set_sync_status(status) {
        info!(?status, "live sync status changed");
        sse_events::broadcast_sync_status(state, status);
    }
}
