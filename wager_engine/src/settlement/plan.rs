//! Per-entry settlement decisions.
//!
//! Every wager type reduces to the same shape: pick the winning entries, then
//! each entry is paid out, recorded as lost, or refunded when nobody won.

use super::payout::PayoutPolicy;
use super::{categorical, date, numeric};
use crate::wager::{Answer, WagerEntry, WagerOptions};

/// What settlement does to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryOutcome {
    Win { payout: i64 },
    Lose,
    Refund,
}

/// Decide every entry of a wager settled with `outcome`
pub(crate) fn settle_entries(
    options: &WagerOptions,
    outcome: &Answer,
    entries: &[WagerEntry],
    policy: PayoutPolicy,
) -> Vec<EntryOutcome> {
    let won = match (options, outcome) {
        (WagerOptions::Binary | WagerOptions::MultipleChoice { .. }, _) => {
            categorical::winners(options, outcome, entries)
        }
        (WagerOptions::Numeric { rule, .. }, Answer::Number(target)) => {
            let guesses = guesses(options, entries, |answer| match answer {
                Answer::Number(value) => Some(value),
                _ => None,
            });
            numeric::winners(*rule, *target, &guesses)
        }
        (WagerOptions::Date { rule, .. }, Answer::Date(target)) => {
            let guesses = guesses(options, entries, |answer| match answer {
                Answer::Date(value) => Some(value),
                _ => None,
            });
            date::winners(*rule, *target, &guesses)
        }
        // An outcome of another type matches nobody
        (WagerOptions::Numeric { .. } | WagerOptions::Date { .. }, _) => vec![false; entries.len()],
    };

    if !won.contains(&true) {
        return vec![EntryOutcome::Refund; entries.len()];
    }

    let pool: i64 = entries.iter().map(|e| e.points_wagered).sum();
    let winning_stakes: Vec<i64> = entries
        .iter()
        .zip(&won)
        .filter(|(_, won)| **won)
        .map(|(entry, _)| entry.points_wagered)
        .collect();
    let mut payouts = policy.split(pool, &winning_stakes).into_iter();

    won.iter()
        .map(|&won| match won.then(|| payouts.next()).flatten() {
            Some(payout) => EntryOutcome::Win { payout },
            None => EntryOutcome::Lose,
        })
        .collect()
}

fn guesses<T>(
    options: &WagerOptions,
    entries: &[WagerEntry],
    pick: impl Fn(Answer) -> Option<T>,
) -> Vec<Option<T>> {
    entries
        .iter()
        .map(|entry| options.parse_outcome(&entry.answer_value).ok().and_then(&pick))
        .collect()
}
