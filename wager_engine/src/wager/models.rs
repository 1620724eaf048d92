//! Wager and entry data models.

use crate::ids::{EntryId, GroupId, UserId, WagerId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Wager type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerType {
    Binary,
    MultipleChoice,
    Numeric,
    Date,
}

impl std::fmt::Display for WagerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WagerType::Binary => write!(f, "binary"),
            WagerType::MultipleChoice => write!(f, "multiple_choice"),
            WagerType::Numeric => write!(f, "numeric"),
            WagerType::Date => write!(f, "date"),
        }
    }
}

impl FromStr for WagerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(WagerType::Binary),
            "multiple_choice" => Ok(WagerType::MultipleChoice),
            "numeric" => Ok(WagerType::Numeric),
            "date" => Ok(WagerType::Date),
            other => Err(format!("unknown wager type '{other}'")),
        }
    }
}

/// Wager lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    /// Accepting entries
    Open,
    /// Closed to entries, awaiting settlement
    Locked,
    /// Outcome declared and payouts made
    Settled,
    /// Called off, all stakes refunded
    Cancelled,
}

impl WagerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WagerStatus::Settled | WagerStatus::Cancelled)
    }
}

impl std::fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WagerStatus::Open => write!(f, "open"),
            WagerStatus::Locked => write!(f, "locked"),
            WagerStatus::Settled => write!(f, "settled"),
            WagerStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for WagerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(WagerStatus::Open),
            "locked" => Ok(WagerStatus::Locked),
            "settled" => Ok(WagerStatus::Settled),
            "cancelled" => Ok(WagerStatus::Cancelled),
            other => Err(format!("unknown wager status '{other}'")),
        }
    }
}

/// How a numeric guess is compared against the outcome
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericRule {
    /// Only guesses equal to the outcome win
    Exact,
    /// The guesses nearest the outcome win; ties share
    #[default]
    Closest,
    /// Guesses within `tolerance` of the outcome win
    Within { tolerance: f64 },
}

/// How a date guess is compared against the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRule {
    Exact,
    #[default]
    Closest,
    WithinDays { days: i64 },
}

/// Type-specific option set declared at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WagerOptions {
    /// Answers are `yes` or `no`
    Binary,
    /// Answers must be one of the declared choices
    MultipleChoice { choices: Vec<String> },
    /// Answers are numbers inside the optional bounds
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        #[serde(default)]
        rule: NumericRule,
    },
    /// Answers are calendar dates (`YYYY-MM-DD`) inside the optional bounds
    Date {
        earliest: Option<NaiveDate>,
        latest: Option<NaiveDate>,
        #[serde(default)]
        rule: DateRule,
    },
}

impl WagerOptions {
    pub fn wager_type(&self) -> WagerType {
        match self {
            WagerOptions::Binary => WagerType::Binary,
            WagerOptions::MultipleChoice { .. } => WagerType::MultipleChoice,
            WagerOptions::Numeric { .. } => WagerType::Numeric,
            WagerOptions::Date { .. } => WagerType::Date,
        }
    }
}

/// Wager model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub group_id: GroupId,
    pub creator_id: UserId,
    pub question: String,
    pub options: WagerOptions,
    /// Fixed per-entry stake; `None` lets each entrant choose
    pub stake: Option<i64>,
    pub deadline: DateTime<Utc>,
    pub status: WagerStatus,
    pub outcome: Option<String>,
    pub settlement_note: Option<String>,
    pub settled_by: Option<UserId>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Wager {
    pub fn wager_type(&self) -> WagerType {
        self.options.wager_type()
    }

    /// Settlement fields are populated exactly when the wager is settled
    pub fn settlement_fields_consistent(&self) -> bool {
        let settled = self.status == WagerStatus::Settled;
        settled == self.outcome.is_some()
            && settled == self.settled_at.is_some()
            && (settled || self.settled_by.is_none())
    }
}

/// Caller-supplied description of a wager to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerDraft {
    pub question: String,
    pub options: WagerOptions,
    pub stake: Option<i64>,
    pub deadline: DateTime<Utc>,
}

/// Wager row awaiting insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewWager {
    pub group_id: GroupId,
    pub creator_id: UserId,
    pub question: String,
    pub options: WagerOptions,
    pub stake: Option<i64>,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One user's stake and answer on a wager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerEntry {
    pub id: EntryId,
    pub wager_id: WagerId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub answer_value: String,
    pub points_wagered: i64,
    /// `None` until settled, and for refunded entries
    pub is_winner: Option<bool>,
    pub points_won: i64,
    pub created_at: DateTime<Utc>,
}

/// Entry row awaiting insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWagerEntry {
    pub wager_id: WagerId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub answer_value: String,
    pub points_wagered: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_serialize_with_type_tag() {
        let options = WagerOptions::Numeric {
            min: Some(0.0),
            max: Some(100.0),
            rule: NumericRule::Within { tolerance: 2.5 },
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["type"], "numeric");
        assert_eq!(json["rule"]["kind"], "within");

        let back: WagerOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_missing_rule_defaults_to_closest() {
        let json = serde_json::json!({ "type": "date", "earliest": null, "latest": "2026-12-31" });
        let options: WagerOptions = serde_json::from_value(json).unwrap();
        assert_eq!(
            options,
            WagerOptions::Date {
                earliest: None,
                latest: NaiveDate::from_ymd_opt(2026, 12, 31),
                rule: DateRule::Closest,
            }
        );
    }

    #[test]
    fn test_status_text_and_terminality() {
        for status in [
            WagerStatus::Open,
            WagerStatus::Locked,
            WagerStatus::Settled,
            WagerStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<WagerStatus>(), Ok(status));
        }
        assert!(!WagerStatus::Open.is_terminal());
        assert!(!WagerStatus::Locked.is_terminal());
        assert!(WagerStatus::Settled.is_terminal());
        assert!(WagerStatus::Cancelled.is_terminal());
    }
}
