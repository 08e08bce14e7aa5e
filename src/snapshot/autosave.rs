use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::{Duration, Instant, interval};
use tracing::{debug, warn};

use crate::forest::{ForestChange, ForestUpdate};

use super::{OrgChartSnapshot, STORAGE_KEY, SnapshotStorage, encode_snapshot};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub poll_interval: Duration,
    pub debounce_interval: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce_interval: DEFAULT_DEBOUNCE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutosaveHandle {
    command_tx: UnboundedSender<AutosaveCommand>,
}

impl AutosaveHandle {
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(AutosaveCommand::Shutdown);
    }
}

#[derive(Debug)]
enum AutosaveCommand {
    Shutdown,
}

/// Spawns a worker that consumes forest updates and persists the latest
/// snapshot once a quiet interval passes, so a burst of mutations coalesces
/// into a single write. Any still-pending snapshot is flushed on shutdown.
pub fn spawn_autosave_worker<S>(
    handle: &Handle,
    storage: S,
    update_rx: UnboundedReceiver<ForestUpdate>,
    config: AutosaveConfig,
) -> AutosaveHandle
where
    S: SnapshotStorage + Send + 'static,
{
    let (command_tx, command_rx) = unbounded_channel();
    let autosave_handle = AutosaveHandle { command_tx };

    let _task = handle.spawn(run_autosave_loop(storage, update_rx, command_rx, config));

    autosave_handle
}

async fn run_autosave_loop<S: SnapshotStorage>(
    mut storage: S,
    mut update_rx: UnboundedReceiver<ForestUpdate>,
    mut command_rx: UnboundedReceiver<AutosaveCommand>,
    config: AutosaveConfig,
) {
    let mut ticker = interval(config.poll_interval);
    let mut pending: Option<(OrgChartSnapshot, u64)> = None;
    let mut save_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            maybe_update = update_rx.recv() => {
                match maybe_update {
                    Some(update) => {
                        // The initial subscription snapshot is what we just
                        // loaded; only actual mutations schedule a write.
                        if update.change == ForestChange::Subscribed {
                            continue;
                        }
                        pending = Some((snapshot_from_update(&update), update.revision));
                        save_deadline = Some(Instant::now() + config.debounce_interval);
                    }
                    None => break,
                }
            }
            maybe_command = command_rx.recv() => {
                match maybe_command {
                    Some(AutosaveCommand::Shutdown) | None => break,
                }
            }
            _ = ticker.tick() => {}
        }

        if let Some(deadline) = save_deadline
            && Instant::now() >= deadline
            && let Some((snapshot, revision)) = pending.take()
        {
            persist(&mut storage, &snapshot, revision);
            save_deadline = None;
        }
    }

    // Updates still queued when the shutdown command won the select race
    // would otherwise be lost; drain them so the final flush sees the
    // latest committed state.
    while let Ok(update) = update_rx.try_recv() {
        if update.change == ForestChange::Subscribed {
            continue;
        }
        pending = Some((snapshot_from_update(&update), update.revision));
    }
    if let Some((snapshot, revision)) = pending.take() {
        persist(&mut storage, &snapshot, revision);
    }
}

fn snapshot_from_update(update: &ForestUpdate) -> OrgChartSnapshot {
    OrgChartSnapshot {
        positions: update.positions.clone(),
        levels: update.levels.clone(),
        org_nodes: update.nodes.clone(),
    }
}

fn persist<S: SnapshotStorage>(storage: &mut S, snapshot: &OrgChartSnapshot, revision: u64) {
    let encoded = match encode_snapshot(snapshot) {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(revision, error = %error, "autosave failed to serialize snapshot");
            return;
        }
    };

    match storage.set(STORAGE_KEY, &encoded) {
        Ok(()) => debug!(revision, "autosaved org chart snapshot"),
        Err(error) => warn!(revision, error = %error, "autosave failed to write snapshot"),
    }
}
