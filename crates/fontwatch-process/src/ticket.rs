//! Single-use answer tickets.
//!
//! A ticket binds one answer to one request. It is rendered as
//! `<isoTimestamp>;<hex sha256(isoTimestamp ‖ callbackName ‖ secret)>` and
//! can only be forged by someone who knows the secret. Verification always
//! recomputes the hash over the embedded timestamp with the current secret,
//! so rotating the secret invalidates every outstanding ticket.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TicketError;

/// Secret keying the ticket hashes.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A minted ticket. Timestamps carry microseconds so that two tickets
/// minted by consecutive steps never coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    timestamp: String,
    hash: String,
}

impl Ticket {
    /// Mints a ticket for `callback` at `now`.
    pub fn mint(callback: &str, secret: &Secret, now: DateTime<Utc>) -> Self {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let hash = digest(&timestamp, callback, secret);
        Self { timestamp, hash }
    }

    /// The timestamp part, verbatim.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Checks that the ticket was minted for `callback` under `secret`.
    pub fn verify(&self, callback: &str, secret: &Secret) -> Result<(), TicketError> {
        let expected = digest(&self.timestamp, callback, secret);
        if constant_time_eq(expected.as_bytes(), self.hash.as_bytes()) {
            Ok(())
        } else {
            Err(TicketError::Mismatch)
        }
    }
}

fn digest(timestamp: &str, callback: &str, secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(callback.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.timestamp, self.hash)
    }
}

impl FromStr for Ticket {
    type Err = TicketError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (timestamp, hash) = raw.split_once(';').ok_or(TicketError::Malformed)?;
        if timestamp.is_empty() || hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TicketError::Malformed);
        }
        DateTime::parse_from_rfc3339(timestamp).map_err(|_| TicketError::Malformed)?;
        Ok(Self {
            timestamp: timestamp.to_string(),
            hash: hash.to_string(),
        })
    }
}

impl Serialize for Ticket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ticket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format() {
        let ticket = Ticket::mint("callbackApprove", &Secret::new("s3cr3t"), now());
        let rendered = ticket.to_string();
        let (timestamp, hash) = rendered.split_once(';').unwrap();
        assert_eq!(timestamp, "2024-03-01T12:00:00.000000Z");
        assert_eq!(hash.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"2024-03-01T12:00:00.000000ZcallbackApproves3cr3t");
        assert_eq!(hash, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_verify_binds_callback_and_secret() {
        let secret = Secret::new("s3cr3t");
        let ticket = Ticket::mint("callbackFoo", &secret, now());

        assert!(ticket.verify("callbackFoo", &secret).is_ok());
        assert_eq!(ticket.verify("callbackBar", &secret), Err(TicketError::Mismatch));
        assert_eq!(ticket.verify("callbackFoo", &Secret::new("rotated")), Err(TicketError::Mismatch));
    }

    #[test]
    fn test_tampered_timestamp_is_rejected() {
        let secret = Secret::new("s3cr3t");
        let ticket = Ticket::mint("callbackFoo", &secret, now()).to_string();
        let tampered: Ticket = ticket.replacen("12:00:00", "12:00:01", 1).parse().unwrap();
        assert_eq!(tampered.verify("callbackFoo", &secret), Err(TicketError::Mismatch));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "no-separator", ";abc", "2024-03-01T12:00:00.000000Z;xyz", "yesterday;"] {
            assert_eq!(raw.parse::<Ticket>(), Err(TicketError::Malformed), "{raw}");
        }
        let ticket = Ticket::mint("callbackFoo", &Secret::new("s"), now());
        assert_eq!(ticket.to_string().parse::<Ticket>().unwrap(), ticket);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", Secret::new("s3cr3t")), "Secret(***)");
    }
}
