use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod watch;

pub use watch::*;

/// Recoverable reasons a check cycle did not end in a delivered alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum FailureKind {
    FetchFailed,
    NoPriceFound,
    ParseError,
    DispatchFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FetchFailed => "fetch_failed",
            FailureKind::NoPriceFound => "no_price_found",
            FailureKind::ParseError => "parse_error",
            FailureKind::DispatchFailed => "dispatch_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch_failed" => Ok(FailureKind::FetchFailed),
            "no_price_found" => Ok(FailureKind::NoPriceFound),
            "parse_error" => Ok(FailureKind::ParseError),
            "dispatch_failed" => Ok(FailureKind::DispatchFailed),
            other => Err(format!("unknown failure kind: {}", other)),
        }
    }
}
