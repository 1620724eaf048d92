//! Answer parsing and validation against a wager's option set.
//!
//! Answers travel as text (`answer_value`). Each wager type has one canonical
//! encoding: `yes`/`no`, the declared choice label, a decimal number, or an
//! ISO `YYYY-MM-DD` date.

use super::models::{WagerOptions, WagerType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A parsed answer or outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Binary(bool),
    Choice(String),
    Number(f64),
    Date(NaiveDate),
}

impl Answer {
    /// Canonical text encoding stored on entries and wagers
    pub fn encode(&self) -> String {
        match self {
            Answer::Binary(true) => "yes".to_string(),
            Answer::Binary(false) => "no".to_string(),
            Answer::Choice(label) => label.clone(),
            Answer::Number(value) => value.to_string(),
            Answer::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// The set of values a wager accepts, reported back on rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerDomain {
    YesNo,
    Choices {
        choices: Vec<String>,
    },
    NumberRange {
        min: Option<f64>,
        max: Option<f64>,
    },
    DateRange {
        earliest: Option<NaiveDate>,
        latest: Option<NaiveDate>,
    },
}

impl std::fmt::Display for AnswerDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerDomain::YesNo => write!(f, "yes or no"),
            AnswerDomain::Choices { choices } => write!(f, "one of [{}]", choices.join(", ")),
            AnswerDomain::NumberRange { min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "a number between {min} and {max}"),
                (Some(min), None) => write!(f, "a number of at least {min}"),
                (None, Some(max)) => write!(f, "a number of at most {max}"),
                (None, None) => write!(f, "any number"),
            },
            AnswerDomain::DateRange { earliest, latest } => match (earliest, latest) {
                (Some(a), Some(b)) => write!(f, "a date between {a} and {b}"),
                (Some(a), None) => write!(f, "a date on or after {a}"),
                (None, Some(b)) => write!(f, "a date on or before {b}"),
                (None, None) => write!(f, "any date (YYYY-MM-DD)"),
            },
        }
    }
}

/// Why a raw value was rejected
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRejection {
    pub wager_type: WagerType,
    pub value: String,
    pub expected: AnswerDomain,
}

impl std::fmt::Display for AnswerRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' for {} wager: expected {}",
            self.value, self.wager_type, self.expected
        )
    }
}

impl WagerOptions {
    /// Values this wager accepts from entrants
    pub fn domain(&self) -> AnswerDomain {
        match self {
            WagerOptions::Binary => AnswerDomain::YesNo,
            WagerOptions::MultipleChoice { choices } => AnswerDomain::Choices {
                choices: choices.clone(),
            },
            WagerOptions::Numeric { min, max, .. } => AnswerDomain::NumberRange {
                min: *min,
                max: *max,
            },
            WagerOptions::Date {
                earliest, latest, ..
            } => AnswerDomain::DateRange {
                earliest: *earliest,
                latest: *latest,
            },
        }
    }

    /// Parse an entrant's answer, enforcing declared bounds (inclusive)
    pub fn parse_answer(&self, raw: &str) -> Result<Answer, AnswerRejection> {
        let answer = self.parse_value(raw)?;
        let in_bounds = match (&answer, self) {
            (Answer::Number(v), WagerOptions::Numeric { min, max, .. }) => {
                min.is_none_or(|min| *v >= min) && max.is_none_or(|max| *v <= max)
            }
            (
                Answer::Date(d),
                WagerOptions::Date {
                    earliest, latest, ..
                },
            ) => earliest.is_none_or(|e| *d >= e) && latest.is_none_or(|l| *d <= l),
            _ => true,
        };

        if in_bounds {
            Ok(answer)
        } else {
            Err(self.reject(raw))
        }
    }

    /// Parse a settlement outcome. Outcomes must be well-formed for the type
    /// but may fall outside the entrants' bounds.
    pub fn parse_outcome(&self, raw: &str) -> Result<Answer, AnswerRejection> {
        self.parse_value(raw)
    }

    fn parse_value(&self, raw: &str) -> Result<Answer, AnswerRejection> {
        let trimmed = raw.trim();
        match self {
            WagerOptions::Binary => match trimmed.to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" => Ok(Answer::Binary(true)),
                "no" | "n" | "false" => Ok(Answer::Binary(false)),
                _ => Err(self.reject(raw)),
            },
            WagerOptions::MultipleChoice { choices } => choices
                .iter()
                .find(|choice| choice.trim().eq_ignore_ascii_case(trimmed))
                .map(|choice| Answer::Choice(choice.clone()))
                .ok_or_else(|| self.reject(raw)),
            WagerOptions::Numeric { .. } => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Answer::Number)
                .ok_or_else(|| self.reject(raw)),
            WagerOptions::Date { .. } => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Answer::Date)
                .map_err(|_| self.reject(raw)),
        }
    }

    fn reject(&self, raw: &str) -> AnswerRejection {
        AnswerRejection {
            wager_type: self.wager_type(),
            value: raw.to_string(),
            expected: self.domain(),
        }
    }
}
