//! Binary and multiple-choice settlement: matching answers win.

use crate::wager::{Answer, WagerEntry, WagerOptions};

pub(crate) fn winners(options: &WagerOptions, outcome: &Answer, entries: &[WagerEntry]) -> Vec<bool> {
    entries
        .iter()
        .map(|entry| {
            options
                .parse_outcome(&entry.answer_value)
                .is_ok_and(|answer| answer == *outcome)
        })
        .collect()
}
