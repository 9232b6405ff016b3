//! Content of the five window pages and the fetch bookkeeping that keeps a
//! slow response from overwriting a page that has since moved on.
//!
//! Every fetch is issued with a ticket carrying the requested date and a
//! generation number unique across the set. A result is applied only to a page
//! that still shows that date at that generation; anything else is stale.

use crate::application::day_loader::DayLoad;
use crate::domain::paging::{PagingError, WINDOW_SIZE};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Empty,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub slot: usize,
    pub date: NaiveDate,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPage {
    pub date: NaiveDate,
    pub generation: u64,
    pub status: PageStatus,
    pub load: Option<DayLoad>,
    /// Content predates the latest refresh signal.
    pub stale: bool,
    /// Results from fetches issued before this generation arrive stale.
    stale_before: u64,
}

impl DayPage {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            generation: 0,
            status: PageStatus::Empty,
            load: None,
            stale: false,
            stale_before: 0,
        }
    }

    pub fn needs_fetch(&self) -> bool {
        self.status == PageStatus::Empty || (self.stale && self.status != PageStatus::Loading)
    }
}

#[derive(Debug, Clone)]
pub struct DayPageSet {
    pages: Vec<DayPage>,
    next_generation: u64,
}

impl DayPageSet {
    pub fn new(dates: [NaiveDate; WINDOW_SIZE]) -> Self {
        Self {
            pages: dates.into_iter().map(DayPage::empty).collect(),
            next_generation: 1,
        }
    }

    pub fn pages(&self) -> &[DayPage] {
        &self.pages
    }

    pub fn page(&self, slot: usize) -> Option<&DayPage> {
        self.pages.get(slot)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.pages.iter().map(|page| page.date).collect()
    }

    /// Re-targets the pages at `dates`. A date already in the set keeps its
    /// content (and any in-flight fetch); new dates start empty.
    pub fn sync_dates(&mut self, dates: [NaiveDate; WINDOW_SIZE]) {
        let mut previous: Vec<Option<DayPage>> = self.pages.drain(..).map(Some).collect();
        self.pages = dates
            .into_iter()
            .map(|date| {
                previous
                    .iter_mut()
                    .find(|page| page.as_ref().is_some_and(|page| page.date == date))
                    .and_then(Option::take)
                    .unwrap_or_else(|| DayPage::empty(date))
            })
            .collect();
    }

    /// Slots that have never loaded or hold stale content, `first` leading.
    pub fn slots_needing_fetch(&self, first: usize) -> Vec<usize> {
        let mut slots: Vec<usize> = (0..self.pages.len())
            .filter(|slot| self.pages[*slot].needs_fetch())
            .collect();
        if let Some(position) = slots.iter().position(|slot| *slot == first) {
            slots.remove(position);
            slots.insert(0, first);
        }
        slots
    }

    /// Marks `slot` loading under a fresh generation. Any fetch issued earlier
    /// for this page becomes stale.
    pub fn begin_fetch(&mut self, slot: usize) -> Result<FetchTicket, PagingError> {
        let generation = self.next_generation;
        let page = self.pages.get_mut(slot).ok_or(PagingError::IndexOutOfRange {
            index: slot,
            window_size: WINDOW_SIZE,
        })?;
        self.next_generation = self.next_generation.wrapping_add(1);
        page.generation = generation;
        page.status = PageStatus::Loading;
        Ok(FetchTicket {
            slot,
            date: page.date,
            generation,
        })
    }

    /// Stores `load` if the ticket still matches its page. Returns whether it
    /// was applied.
    pub fn apply(&mut self, ticket: FetchTicket, load: DayLoad) -> bool {
        let Some(page) = self
            .pages
            .iter_mut()
            .find(|page| page.date == ticket.date && page.generation == ticket.generation)
        else {
            debug!(
                date = %ticket.date,
                generation = ticket.generation,
                "discarding stale day fetch"
            );
            return false;
        };

        page.status = if load.error.is_some() {
            PageStatus::Failed
        } else {
            PageStatus::Ready
        };
        page.stale = ticket.generation < page.stale_before;
        page.load = Some(load);
        true
    }

    /// Flags every page except `keep` for refetch on its next display. A
    /// page still loading keeps the flag once its earlier fetch lands.
    pub fn mark_stale_except(&mut self, keep: usize) {
        let threshold = self.next_generation;
        for (slot, page) in self.pages.iter_mut().enumerate() {
            if slot != keep && page.status != PageStatus::Empty {
                page.stale = true;
                page.stale_before = threshold;
            }
        }
    }
}
