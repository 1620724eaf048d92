//! Wager and entry model: types, answer validation and lifecycle rules.
//!
//! These types carry no storage concerns. Persistence goes through
//! [`crate::store::AtomicUnit`].

pub mod answer;
pub mod errors;
pub mod models;
pub mod state_machine;
pub mod validation;

pub use answer::{Answer, AnswerDomain, AnswerRejection};
pub use errors::{ErrorKind, WagerError, WagerResult};
pub use models::{
    DateRule, NewWager, NewWagerEntry, NumericRule, Wager, WagerDraft, WagerEntry, WagerOptions,
    WagerStatus, WagerType,
};
pub use state_machine::{WagerAction, next_status};
