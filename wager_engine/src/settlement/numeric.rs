//! Numeric settlement.
//!
//! Distances are compared in exact decimal so that guesses equally far from
//! the outcome in their written form tie (`0.1` and `0.5` around `0.3`).
//! Values outside the decimal range fall back to binary floating point.

use crate::wager::NumericRule;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Winning guesses under `rule`. Unparseable guesses never win.
pub(crate) fn winners(rule: NumericRule, target: f64, guesses: &[Option<f64>]) -> Vec<bool> {
    match exact_distances(rule, target, guesses) {
        Some((distances, tolerance)) => pick(rule, &distances, tolerance),
        None => {
            let distances: Vec<Option<f64>> = guesses
                .iter()
                .map(|guess| guess.map(|g| (g - target).abs()))
                .collect();
            let tolerance = match rule {
                NumericRule::Within { tolerance } => tolerance,
                _ => 0.0,
            };
            pick(rule, &distances, tolerance)
        }
    }
}

/// `None` when any value cannot be represented as a decimal
fn exact_distances(
    rule: NumericRule,
    target: f64,
    guesses: &[Option<f64>],
) -> Option<(Vec<Option<Decimal>>, Decimal)> {
    let target = to_decimal(target)?;
    let tolerance = match rule {
        NumericRule::Within { tolerance } => to_decimal(tolerance)?,
        _ => Decimal::ZERO,
    };
    let distances = guesses
        .iter()
        .map(|guess| match guess {
            Some(g) => to_decimal(*g)?.checked_sub(target).map(|d| Some(d.abs())),
            None => Some(None),
        })
        .collect::<Option<Vec<_>>>()?;
    Some((distances, tolerance))
}

// Display on f64 yields the shortest text that round-trips, i.e. what was typed
fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string()).ok()
}

fn pick<T: PartialOrd + Copy + Default>(
    rule: NumericRule,
    distances: &[Option<T>],
    tolerance: T,
) -> Vec<bool> {
    match rule {
        NumericRule::Exact => distances
            .iter()
            .map(|d| d.is_some_and(|d| d == T::default()))
            .collect(),
        NumericRule::Within { .. } => distances
            .iter()
            .map(|d| d.is_some_and(|d| d <= tolerance))
            .collect(),
        NumericRule::Closest => {
            let best = distances
                .iter()
                .flatten()
                .copied()
                .reduce(|a, b| if b < a { b } else { a });
            distances
                .iter()
                .map(|d| d.is_some() && *d == best)
                .collect()
        }
    }
}
