//! Creation-time checks on a [`WagerDraft`].

use super::errors::{WagerError, WagerResult};
use super::models::{DateRule, NumericRule, WagerDraft, WagerOptions};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Longest accepted question, in characters
pub const MAX_QUESTION_LEN: usize = 500;

/// Fewest choices a multiple-choice wager may declare
pub const MIN_CHOICES: usize = 2;

impl WagerDraft {
    /// Reject drafts that could never be joined or settled
    pub fn validate(&self, now: DateTime<Utc>) -> WagerResult<()> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(invalid("question must not be empty"));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(invalid(format!(
                "question must be at most {MAX_QUESTION_LEN} characters"
            )));
        }

        if let Some(stake) = self.stake
            && stake <= 0
        {
            return Err(invalid(format!("stake must be positive, got {stake}")));
        }

        if self.deadline <= now {
            return Err(invalid("deadline must be in the future"));
        }

        validate_options(&self.options)
    }
}

fn validate_options(options: &WagerOptions) -> WagerResult<()> {
    match options {
        WagerOptions::Binary => Ok(()),
        WagerOptions::MultipleChoice { choices } => {
            if choices.len() < MIN_CHOICES {
                return Err(invalid(format!(
                    "multiple choice wagers need at least {MIN_CHOICES} choices"
                )));
            }
            let mut seen = HashSet::new();
            for choice in choices {
                let label = choice.trim().to_ascii_lowercase();
                if label.is_empty() {
                    return Err(invalid("choices must not be empty"));
                }
                if !seen.insert(label) {
                    return Err(invalid(format!("duplicate choice '{}'", choice.trim())));
                }
            }
            Ok(())
        }
        WagerOptions::Numeric { min, max, rule } => {
            if min.is_some_and(|v| !v.is_finite()) || max.is_some_and(|v| !v.is_finite()) {
                return Err(invalid("numeric bounds must be finite"));
            }
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(invalid(format!("minimum {min} exceeds maximum {max}")));
            }
            if let NumericRule::Within { tolerance } = rule
                && !(tolerance.is_finite() && *tolerance >= 0.0)
            {
                return Err(invalid("tolerance must be a non-negative number"));
            }
            Ok(())
        }
        WagerOptions::Date {
            earliest,
            latest,
            rule,
        } => {
            if let (Some(earliest), Some(latest)) = (earliest, latest)
                && earliest > latest
            {
                return Err(invalid(format!("earliest {earliest} is after latest {latest}")));
            }
            if let DateRule::WithinDays { days } = rule
                && *days < 0
            {
                return Err(invalid("day window must not be negative"));
            }
            Ok(())
        }
    }
}

fn invalid(message: impl Into<String>) -> WagerError {
    WagerError::InvalidWager(message.into())
}
