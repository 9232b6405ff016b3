//! Overlap resolution for timed events of a single day.
//!
//! Columns are assigned greedily in start order; each slot's width is the
//! widest column among the events it directly overlaps. Widths are therefore a
//! local pairwise maximum, not agreed across a whole overlap cluster: in a
//! chain of staggered events two slots that never touch may end up with
//! different `total_columns`.

use crate::domain::models::{CalendarEvent, DayWindow, LayoutSlot};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub fn compute_layout(events: &[CalendarEvent]) -> Vec<LayoutSlot> {
    let mut timed: Vec<&CalendarEvent> = events.iter().filter(|event| !event.is_all_day).collect();
    timed.sort_by(|left, right| layout_order(left, right));

    let mut column_end: Vec<DateTime<Utc>> = Vec::new();
    let mut columns = Vec::with_capacity(timed.len());
    for event in &timed {
        let free = column_end
            .iter()
            .position(|end| *end <= event.start_date);
        let column = match free {
            Some(column) => {
                column_end[column] = event.end_date;
                column
            }
            None => {
                column_end.push(event.end_date);
                column_end.len() - 1
            }
        };
        columns.push(column);
    }

    timed
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let max_column = timed
                .iter()
                .enumerate()
                .filter(|(other_index, other)| *other_index != index && event.overlaps(other))
                .map(|(other_index, _)| columns[other_index])
                .fold(columns[index], usize::max);
            LayoutSlot {
                event_id: event.id.clone(),
                column: columns[index],
                total_columns: max_column + 1,
            }
        })
        .collect()
}

// start ascending, end descending, id ascending
fn layout_order(left: &CalendarEvent, right: &CalendarEvent) -> Ordering {
    left.start_date
        .cmp(&right.start_date)
        .then_with(|| right.end_date.cmp(&left.end_date))
        .then_with(|| left.id.cmp(&right.id))
}

/// Start and end of `event` as fractions of `window`, each in `[0, 1]`.
pub fn time_fractions(event: &CalendarEvent, window: &DayWindow) -> (f64, f64) {
    let length = window.length().num_seconds();
    if length <= 0 {
        return (0.0, 0.0);
    }
    let fraction = |instant: DateTime<Utc>| {
        let offset = (instant - window.start).num_seconds().clamp(0, length);
        offset as f64 / length as f64
    };
    (fraction(event.start_date), fraction(event.end_date))
}
