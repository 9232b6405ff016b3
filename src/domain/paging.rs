//! Sliding five-page day window with a deferred recenter.
//!
//! # Invariants
//! - `date_for_index(i) == anchor_date + (i - CENTER_INDEX)` days.
//! - At most one recenter is pending; its token identifies the timer that may
//!   complete it, so a cancelled or replaced timer can never re-anchor.
//! - While a recenter is pending, a date selection equal to the page the user
//!   just swiped to is an echo and is ignored.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;

pub const WINDOW_SIZE: usize = 5;
pub const CENTER_INDEX: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PagingError {
    #[error("page index {index} is outside the {window_size}-page window")]
    IndexOutOfRange { index: usize, window_size: usize },
    #[error("paging controller is no longer running")]
    ControllerStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingRecenter {
    pub token: u64,
    pub shift_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PagingState {
    Idle,
    SettlingRecenter { pending: PendingRecenter },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub selected_date: NaiveDate,
    /// Recenter to schedule after the settle delay, if the swipe left center.
    pub recenter: Option<PendingRecenter>,
    /// Token of a previously pending recenter this swipe superseded.
    pub superseded: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Unchanged,
    IgnoredWhileSettling,
    Reanchored { cancelled: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct PagingWindow {
    anchor_date: NaiveDate,
    current_index: usize,
    state: PagingState,
    next_token: u64,
}

impl PagingWindow {
    pub fn new(anchor_date: NaiveDate) -> Self {
        Self {
            anchor_date,
            current_index: CENTER_INDEX,
            state: PagingState::Idle,
            next_token: 1,
        }
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_date
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn state(&self) -> PagingState {
        self.state
    }

    pub fn is_resettling(&self) -> bool {
        matches!(self.state, PagingState::SettlingRecenter { .. })
    }

    pub fn date_for_index(&self, index: usize) -> NaiveDate {
        let offset = index as i64 - CENTER_INDEX as i64;
        self.anchor_date + Duration::days(offset)
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.date_for_index(self.current_index)
    }

    pub fn dates(&self) -> [NaiveDate; WINDOW_SIZE] {
        std::array::from_fn(|index| self.date_for_index(index))
    }

    /// The host's paging control finished its settle animation on `index`.
    pub fn swipe_settled(&mut self, index: usize) -> Result<SwipeOutcome, PagingError> {
        if index >= WINDOW_SIZE {
            return Err(PagingError::IndexOutOfRange {
                index,
                window_size: WINDOW_SIZE,
            });
        }

        let superseded = self.take_pending();
        self.current_index = index;
        let selected_date = self.date_for_index(index);

        if index == CENTER_INDEX {
            return Ok(SwipeOutcome {
                selected_date,
                recenter: None,
                superseded,
            });
        }

        let pending = PendingRecenter {
            token: self.issue_token(),
            shift_days: index as i64 - CENTER_INDEX as i64,
        };
        self.state = PagingState::SettlingRecenter { pending };
        Ok(SwipeOutcome {
            selected_date,
            recenter: Some(pending),
            superseded,
        })
    }

    /// Applies the pending recenter if `token` still identifies it.
    pub fn complete_recenter(&mut self, token: u64) -> bool {
        let PagingState::SettlingRecenter { pending } = self.state else {
            return false;
        };
        if pending.token != token {
            return false;
        }

        self.anchor_date += Duration::days(pending.shift_days);
        self.current_index = CENTER_INDEX;
        self.state = PagingState::Idle;
        true
    }

    /// A date chosen outside the paging control, e.g. from a date picker.
    pub fn select_date(&mut self, date: NaiveDate) -> SelectionOutcome {
        if self.is_resettling() {
            if date == self.selected_date() {
                return SelectionOutcome::IgnoredWhileSettling;
            }
            let cancelled = self.take_pending();
            self.anchor_date = date;
            self.current_index = CENTER_INDEX;
            return SelectionOutcome::Reanchored { cancelled };
        }

        if (date - self.anchor_date).num_days() == 0 {
            return SelectionOutcome::Unchanged;
        }
        self.anchor_date = date;
        self.current_index = CENTER_INDEX;
        SelectionOutcome::Reanchored { cancelled: None }
    }

    fn take_pending(&mut self) -> Option<u64> {
        let previous = match self.state {
            PagingState::SettlingRecenter { pending } => Some(pending.token),
            PagingState::Idle => None,
        };
        self.state = PagingState::Idle;
        previous
    }

    fn issue_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn window_dates_surround_anchor() {
        let window = PagingWindow::new(date("2026-02-16"));

        assert_eq!(
            window.dates(),
            [
                date("2026-02-14"),
                date("2026-02-15"),
                date("2026-02-16"),
                date("2026-02-17"),
                date("2026-02-18"),
            ]
        );
        assert_eq!(window.selected_date(), date("2026-02-16"));
    }

    #[test]
    fn swipe_forward_emits_date_then_recenters() {
        let mut window = PagingWindow::new(date("2026-02-16"));

        let outcome = window.swipe_settled(CENTER_INDEX + 1).expect("valid index");
        assert_eq!(outcome.selected_date, date("2026-02-17"));
        let pending = outcome.recenter.expect("recenter scheduled");
        assert_eq!(pending.shift_days, 1);
        assert!(window.is_resettling());
        assert_eq!(window.anchor_date(), date("2026-02-16"));

        assert!(window.complete_recenter(pending.token));
        assert_eq!(window.anchor_date(), date("2026-02-17"));
        assert_eq!(window.current_index(), CENTER_INDEX);
        assert_eq!(window.state(), PagingState::Idle);
    }

    #[test]
    fn swipe_onto_center_needs_no_recenter() {
        let mut window = PagingWindow::new(date("2026-02-16"));

        let outcome = window.swipe_settled(CENTER_INDEX).expect("valid index");

        assert!(outcome.recenter.is_none());
        assert!(!window.is_resettling());
    }

    #[test]
    fn swipe_outside_window_is_rejected() {
        let mut window = PagingWindow::new(date("2026-02-16"));

        let error = window.swipe_settled(WINDOW_SIZE).expect_err("index out of range");

        assert_eq!(
            error,
            PagingError::IndexOutOfRange {
                index: WINDOW_SIZE,
                window_size: WINDOW_SIZE
            }
        );
    }

    #[test]
    fn external_date_during_settle_cancels_recenter() {
        let mut window = PagingWindow::new(date("2026-02-16"));
        let outcome = window.swipe_settled(CENTER_INDEX + 1).expect("valid index");
        let pending = outcome.recenter.expect("recenter scheduled");

        let selection = window.select_date(date("2026-02-19"));

        assert_eq!(
            selection,
            SelectionOutcome::Reanchored {
                cancelled: Some(pending.token)
            }
        );
        assert!(!window.complete_recenter(pending.token));
        assert_eq!(window.anchor_date(), date("2026-02-19"));
        assert_eq!(window.current_index(), CENTER_INDEX);
    }

    #[test]
    fn echo_of_swiped_date_is_ignored_while_settling() {
        let mut window = PagingWindow::new(date("2026-02-16"));
        let outcome = window.swipe_settled(CENTER_INDEX - 1).expect("valid index");

        let selection = window.select_date(outcome.selected_date);

        assert_eq!(selection, SelectionOutcome::IgnoredWhileSettling);
        assert!(window.is_resettling());
    }

    #[test]
    fn second_swipe_supersedes_pending_recenter() {
        let mut window = PagingWindow::new(date("2026-02-16"));
        let first = window.swipe_settled(CENTER_INDEX + 1).expect("valid index");
        let first_token = first.recenter.expect("first recenter").token;

        let second = window.swipe_settled(CENTER_INDEX + 2).expect("valid index");

        assert_eq!(second.superseded, Some(first_token));
        assert!(!window.complete_recenter(first_token));
        let second_pending = second.recenter.expect("second recenter");
        assert_eq!(second_pending.shift_days, 2);
        assert!(window.complete_recenter(second_pending.token));
        assert_eq!(window.anchor_date(), date("2026-02-18"));
    }

    #[test]
    fn selecting_anchor_while_idle_is_a_no_op() {
        let mut window = PagingWindow::new(date("2026-02-16"));

        assert_eq!(window.select_date(date("2026-02-16")), SelectionOutcome::Unchanged);
    }

    proptest! {
        #[test]
        fn center_matches_anchor_after_every_recenter(swipes in prop::collection::vec(0usize..WINDOW_SIZE, 1..32)) {
            let mut window = PagingWindow::new(date("2026-02-16"));
            for index in swipes {
                let outcome = window.swipe_settled(index).expect("valid index");
                if let Some(pending) = outcome.recenter {
                    prop_assert!(window.complete_recenter(pending.token));
                }
                prop_assert_eq!(window.date_for_index(CENTER_INDEX), window.anchor_date());
                prop_assert_eq!(window.current_index(), CENTER_INDEX);
            }
        }
    }
}
