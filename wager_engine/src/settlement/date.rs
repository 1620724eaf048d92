//! Date settlement. Distances are whole days.

use crate::wager::DateRule;
use chrono::NaiveDate;

/// Winning guesses under `rule`. Unparseable guesses never win.
pub(crate) fn winners(rule: DateRule, target: NaiveDate, guesses: &[Option<NaiveDate>]) -> Vec<bool> {
    let distances: Vec<Option<i64>> = guesses
        .iter()
        .map(|guess| guess.map(|g| (g - target).num_days().abs()))
        .collect();

    match rule {
        DateRule::Exact => distances.iter().map(|d| *d == Some(0)).collect(),
        DateRule::WithinDays { days } => distances
            .iter()
            .map(|d| d.is_some_and(|d| d <= days))
            .collect(),
        DateRule::Closest => {
            let best = distances.iter().flatten().min().copied();
            distances
                .iter()
                .map(|d| d.is_some() && *d == best)
                .collect()
        }
    }
}
