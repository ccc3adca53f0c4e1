//! The outstanding answer a process waits for.

use serde::{Deserialize, Serialize};

use crate::error::TicketError;
use crate::ticket::{Secret, Ticket};

/// The one answer a process currently accepts.
///
/// Persisted as `[callbackName, ticket, interaction | null]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AnswerRecord", into = "AnswerRecord")]
pub struct ExpectedAnswer {
    pub callback: String,
    pub ticket: Ticket,
    /// Renderer of the interaction shown to whoever answers.
    pub interaction: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct AnswerRecord(String, Ticket, Option<String>);

impl From<AnswerRecord> for ExpectedAnswer {
    fn from(AnswerRecord(callback, ticket, interaction): AnswerRecord) -> Self {
        Self {
            callback,
            ticket,
            interaction,
        }
    }
}

impl From<ExpectedAnswer> for AnswerRecord {
    fn from(answer: ExpectedAnswer) -> Self {
        Self(answer.callback, answer.ticket, answer.interaction)
    }
}

impl ExpectedAnswer {
    /// Checks an incoming answer against this expectation.
    ///
    /// The callback must match exactly and the ticket must be the stored one
    /// and still verify under `secret`.
    pub fn accepts(&self, callback: &str, ticket: &Ticket, secret: &Secret) -> Result<(), TicketError> {
        if callback != self.callback {
            return Err(TicketError::WrongCallback {
                received: callback.to_string(),
            });
        }
        if *ticket != self.ticket {
            return Err(TicketError::Mismatch);
        }
        ticket.verify(callback, secret)
    }
}
