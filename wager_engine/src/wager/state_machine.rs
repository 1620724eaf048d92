//! Wager lifecycle transitions.
//!
//! ```text
//! open --lock--> locked --settle--> settled
//!   |               |
//!   +----settle-----+
//!   |               |
//!   +----cancel-----+--> cancelled
//! ```
//!
//! `settled` and `cancelled` are terminal.

use super::errors::{WagerError, WagerResult};
use super::models::{Wager, WagerStatus};

/// Operation requested on a wager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerAction {
    Join,
    Lock,
    Settle,
    Cancel,
}

impl WagerAction {
    fn verb(self) -> &'static str {
        match self {
            WagerAction::Join => "join",
            WagerAction::Lock => "lock",
            WagerAction::Settle => "settle",
            WagerAction::Cancel => "cancel",
        }
    }
}

/// Status the wager ends up in after `action`, or why it cannot happen
pub fn next_status(wager: &Wager, action: WagerAction) -> WagerResult<WagerStatus> {
    use WagerStatus::{Cancelled, Locked, Open, Settled};

    match (action, wager.status) {
        (WagerAction::Join, Open) => Ok(Open),
        (WagerAction::Join, status) => Err(WagerError::WagerNotOpen {
            wager_id: wager.id,
            status,
        }),

        (WagerAction::Lock, Open) => Ok(Locked),

        (WagerAction::Settle, Open | Locked) => Ok(Settled),
        (WagerAction::Cancel, Open | Locked) => Ok(Cancelled),
        (WagerAction::Settle | WagerAction::Cancel, status @ (Settled | Cancelled)) => {
            Err(WagerError::WagerAlreadySettled {
                wager_id: wager.id,
                status,
            })
        }

        (WagerAction::Lock, from @ (Locked | Settled | Cancelled)) => {
            Err(WagerError::InvalidWagerTransition {
                wager_id: wager.id,
                from,
                action: action.verb(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wager::WagerOptions;
    use chrono::Utc;

    fn wager(status: WagerStatus) -> Wager {
        Wager {
            id: 1,
            group_id: 1,
            creator_id: 1,
            question: "Will it rain?".to_string(),
            options: WagerOptions::Binary,
            stake: Some(10),
            deadline: Utc::now(),
            status,
            outcome: None,
            settlement_note: None,
            settled_by: None,
            settled_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_legal_transitions() {
        use WagerStatus::*;
        assert_eq!(next_status(&wager(Open), WagerAction::Lock).unwrap(), Locked);
        assert_eq!(next_status(&wager(Open), WagerAction::Settle).unwrap(), Settled);
        assert_eq!(next_status(&wager(Locked), WagerAction::Settle).unwrap(), Settled);
        assert_eq!(next_status(&wager(Open), WagerAction::Cancel).unwrap(), Cancelled);
        assert_eq!(next_status(&wager(Locked), WagerAction::Cancel).unwrap(), Cancelled);
        assert_eq!(next_status(&wager(Open), WagerAction::Join).unwrap(), Open);
    }

    #[test]
    fn test_terminal_states_reject_settle_and_cancel() {
        for status in [WagerStatus::Settled, WagerStatus::Cancelled] {
            for action in [WagerAction::Settle, WagerAction::Cancel] {
                let err = next_status(&wager(status), action).unwrap_err();
                assert!(
                    matches!(err, WagerError::WagerAlreadySettled { status: s, .. } if s == status)
                );
            }
        }
    }

    #[test]
    fn test_lock_only_from_open() {
        let err = next_status(&wager(WagerStatus::Locked), WagerAction::Lock).unwrap_err();
        assert!(matches!(
            err,
            WagerError::InvalidWagerTransition {
                from: WagerStatus::Locked,
                action: "lock",
                ..
            }
        ));
    }

    #[test]
    fn test_join_requires_open() {
        let err = next_status(&wager(WagerStatus::Locked), WagerAction::Join).unwrap_err();
        assert!(matches!(err, WagerError::WagerNotOpen { status: WagerStatus::Locked, .. }));
    }
}
