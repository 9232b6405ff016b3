//! Single-writer actor around `PagingWindow`.
//!
//! Swipes and external date selections arrive as commands on one channel and
//! are applied in order by one task, which also owns the settle timer. A
//! replaced or cancelled recenter simply drops its deadline, so a stale timer
//! cannot fire.

use crate::domain::paging::{
    PagingError, PagingWindow, SelectionOutcome, SwipeOutcome, WINDOW_SIZE,
};
use crate::infrastructure::config::TimelineConfig;
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingSnapshot {
    pub anchor_date: NaiveDate,
    pub current_index: usize,
    pub selected_date: NaiveDate,
    pub is_resettling: bool,
    pub dates: [NaiveDate; WINDOW_SIZE],
}

impl From<&PagingWindow> for PagingSnapshot {
    fn from(window: &PagingWindow) -> Self {
        Self {
            anchor_date: window.anchor_date(),
            current_index: window.current_index(),
            selected_date: window.selected_date(),
            is_resettling: window.is_resettling(),
            dates: window.dates(),
        }
    }
}

enum Command {
    SwipeSettled {
        index: usize,
        reply: oneshot::Sender<Result<SwipeOutcome, PagingError>>,
    },
    SelectDate {
        date: NaiveDate,
        reply: oneshot::Sender<SelectionOutcome>,
    },
}

struct PendingTimer {
    token: u64,
    deadline: Instant,
}

pub struct PagingController {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<PagingSnapshot>,
    task: JoinHandle<()>,
}

impl PagingController {
    /// Spawns the actor on the current tokio runtime.
    pub fn spawn(anchor_date: NaiveDate, settle_delay: Duration) -> Self {
        let window = PagingWindow::new(anchor_date);
        let (snapshot_tx, snapshots) = watch::channel(PagingSnapshot::from(&window));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(window, settle_delay, command_rx, snapshot_tx));
        Self {
            commands,
            snapshots,
            task,
        }
    }

    /// Spawns the actor with the configured settle delay. Hosts start here.
    pub fn from_config(anchor_date: NaiveDate, config: &TimelineConfig) -> Self {
        Self::spawn(anchor_date, config.settle_delay())
    }

    pub async fn swipe_settled(&self, index: usize) -> Result<SwipeOutcome, PagingError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SwipeSettled { index, reply })
            .await
            .map_err(|_| PagingError::ControllerStopped)?;
        response.await.map_err(|_| PagingError::ControllerStopped)?
    }

    pub async fn select_date(&self, date: NaiveDate) -> Result<SelectionOutcome, PagingError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SelectDate { date, reply })
            .await
            .map_err(|_| PagingError::ControllerStopped)?;
        response.await.map_err(|_| PagingError::ControllerStopped)
    }

    pub fn snapshot(&self) -> PagingSnapshot {
        *self.snapshots.borrow()
    }

    /// Receiver that reports changes made after this call.
    pub fn subscribe(&self) -> watch::Receiver<PagingSnapshot> {
        let mut receiver = self.snapshots.clone();
        receiver.borrow_and_update();
        receiver
    }

    /// Stops accepting commands and waits for the actor to exit. A pending
    /// recenter is dropped.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

async fn run(
    mut window: PagingWindow,
    settle_delay: Duration,
    mut commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<PagingSnapshot>,
) {
    let mut pending: Option<PendingTimer> = None;

    loop {
        let deadline = pending.as_ref().map(|timer| timer.deadline);
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                match command {
                    Command::SwipeSettled { index, reply } => {
                        let outcome = window.swipe_settled(index);
                        if let Ok(swipe) = &outcome {
                            if let Some(superseded) = swipe.superseded {
                                debug!(token = superseded, "pending recenter superseded by swipe");
                            }
                            pending = swipe.recenter.map(|recenter| {
                                debug!(
                                    token = recenter.token,
                                    shift_days = recenter.shift_days,
                                    "recenter scheduled"
                                );
                                PendingTimer {
                                    token: recenter.token,
                                    deadline: Instant::now() + settle_delay,
                                }
                            });
                            snapshots.send_replace(PagingSnapshot::from(&window));
                        }
                        let _ = reply.send(outcome);
                    }
                    Command::SelectDate { date, reply } => {
                        let outcome = window.select_date(date);
                        if let SelectionOutcome::Reanchored { cancelled } = outcome {
                            if let Some(token) = cancelled {
                                info!(token, %date, "external date cancelled pending recenter");
                            }
                            pending = None;
                            snapshots.send_replace(PagingSnapshot::from(&window));
                        }
                        let _ = reply.send(outcome);
                    }
                }
            }
            _ = wait_until(deadline) => {
                if let Some(timer) = pending.take() {
                    if window.complete_recenter(timer.token) {
                        debug!(anchor = %window.anchor_date(), "recenter completed");
                        snapshots.send_replace(PagingSnapshot::from(&window));
                    }
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
