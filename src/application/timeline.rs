use crate::application::day_loader::{DayLoad, DayLoader};
use crate::application::day_pages::{DayPage, DayPageSet, FetchTicket};
use crate::application::paging_controller::PagingSnapshot;
use crate::domain::paging::{PagingError, WINDOW_SIZE};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Monotonic "events changed, refetch" counter bumped after out-of-band
/// mutations.
#[derive(Debug)]
pub struct RefreshSignal {
    sender: watch::Sender<u64>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        let (sender, _) = watch::channel(0);
        Self { sender }
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter and returns its new value.
    pub fn notify(&self) -> u64 {
        let mut value = 0;
        self.sender.send_modify(|current| {
            *current = current.wrapping_add(1);
            value = *current;
        });
        value
    }

    pub fn current(&self) -> u64 {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

/// Keeps the five window pages loaded for whatever the paging controller
/// currently shows.
pub struct TimelineService {
    loader: Arc<DayLoader>,
    pages: Arc<Mutex<DayPageSet>>,
    updates: watch::Sender<u64>,
}

impl TimelineService {
    pub fn new(loader: Arc<DayLoader>, dates: [NaiveDate; WINDOW_SIZE]) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            loader,
            pages: Arc::new(Mutex::new(DayPageSet::new(dates))),
            updates,
        }
    }

    pub fn loader(&self) -> &Arc<DayLoader> {
        &self.loader
    }

    pub async fn pages(&self) -> Vec<DayPage> {
        self.pages.lock().await.pages().to_vec()
    }

    pub async fn page_for(&self, date: NaiveDate) -> Option<DayPage> {
        self.pages
            .lock()
            .await
            .pages()
            .iter()
            .find(|page| page.date == date)
            .cloned()
    }

    /// Bumped every time a fetch result lands on a page.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Aligns pages with `snapshot` and loads every page that is empty or
    /// stale, the visible page first. Returns how many results were applied.
    pub async fn show_window(&self, snapshot: &PagingSnapshot) -> Result<usize, PagingError> {
        let tickets = self.issue_window(snapshot).await?;
        Ok(self.load_tickets(tickets).await)
    }

    /// Refetches the visible page and marks the others stale so they reload
    /// when next shown.
    pub async fn handle_refresh(&self, visible_index: usize) -> Result<bool, PagingError> {
        let ticket = self.issue_refresh(visible_index).await?;
        Ok(self.load_tickets(vec![ticket]).await == 1)
    }

    /// Follows paging snapshots and refresh signals until either sender is
    /// dropped. Page loads run in the background; a result is applied when
    /// it lands and dropped if its page has moved on.
    pub async fn run(
        &self,
        mut paging: watch::Receiver<PagingSnapshot>,
        mut refresh: watch::Receiver<u64>,
    ) -> Result<(), PagingError> {
        let mut loads = JoinSet::new();
        let initial = *paging.borrow_and_update();
        refresh.borrow_and_update();
        for ticket in self.issue_window(&initial).await? {
            self.spawn_load(&mut loads, ticket);
        }

        loop {
            tokio::select! {
                changed = paging.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *paging.borrow_and_update();
                    for ticket in self.issue_window(&snapshot).await? {
                        self.spawn_load(&mut loads, ticket);
                    }
                }
                changed = refresh.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let signal = *refresh.borrow_and_update();
                    let visible = paging.borrow().current_index;
                    debug!(signal, "refresh signal observed");
                    let ticket = self.issue_refresh(visible).await?;
                    self.spawn_load(&mut loads, ticket);
                }
                Some(joined) = loads.join_next(), if !loads.is_empty() => {
                    self.apply_joined(joined).await;
                }
            }
        }
        Ok(())
    }

    async fn issue_window(&self, snapshot: &PagingSnapshot) -> Result<Vec<FetchTicket>, PagingError> {
        let tickets = {
            let mut pages = self.pages.lock().await;
            pages.sync_dates(snapshot.dates);
            let slots = pages.slots_needing_fetch(snapshot.current_index);
            slots
                .into_iter()
                .map(|slot| pages.begin_fetch(slot))
                .collect::<Result<Vec<_>, _>>()?
        };
        debug!(
            anchor = %snapshot.anchor_date,
            visible = %snapshot.selected_date,
            fetches = tickets.len(),
            "showing window"
        );
        Ok(tickets)
    }

    async fn issue_refresh(&self, visible_index: usize) -> Result<FetchTicket, PagingError> {
        let ticket = {
            let mut pages = self.pages.lock().await;
            pages.mark_stale_except(visible_index);
            pages.begin_fetch(visible_index)?
        };
        info!(date = %ticket.date, "refreshing visible day");
        Ok(ticket)
    }

    fn spawn_load(&self, loads: &mut JoinSet<(FetchTicket, DayLoad)>, ticket: FetchTicket) {
        let loader = Arc::clone(&self.loader);
        loads.spawn(async move {
            let load = loader.load_day(ticket.date).await;
            (ticket, load)
        });
    }

    async fn apply_joined(&self, joined: Result<(FetchTicket, DayLoad), JoinError>) -> bool {
        let (ticket, load) = match joined {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "day load task failed");
                return false;
            }
        };
        let applied = self.pages.lock().await.apply(ticket, load);
        if applied {
            self.updates.send_modify(|version| *version = version.wrapping_add(1));
        }
        applied
    }

    async fn load_tickets(&self, tickets: Vec<FetchTicket>) -> usize {
        let mut loads = JoinSet::new();
        for ticket in tickets {
            self.spawn_load(&mut loads, ticket);
        }

        let mut applied = 0;
        while let Some(joined) = loads.join_next().await {
            if self.apply_joined(joined).await {
                applied += 1;
            }
        }
        applied
    }
}
