//! Vendor response code translation.
//!
//! The billing service reports every call outcome as a small integer. This
//! module turns it into a closed enumeration and the outward reason string
//! carried on failure events. Translation is total: anything outside the
//! table, or a missing code, becomes [`ResponseCode::Unknown`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single vendor call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseCode {
    Ok,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    InvalidArguments,
    FatalError,
    AlreadyOwned,
    ItemNotOwned,
    Unknown,
}

impl ResponseCode {
    /// Translate a raw vendor code.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => Self::Ok,
            Some(1) => Self::UserCanceled,
            Some(2) => Self::ServiceUnavailable,
            Some(3) => Self::BillingUnavailable,
            Some(4) => Self::ItemUnavailable,
            Some(5) => Self::InvalidArguments,
            Some(6) => Self::FatalError,
            Some(7) => Self::AlreadyOwned,
            Some(8) => Self::ItemNotOwned,
            _ => Self::Unknown,
        }
    }

    /// The vendor integer for this code, if it has one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Ok => Some(0),
            Self::UserCanceled => Some(1),
            Self::ServiceUnavailable => Some(2),
            Self::BillingUnavailable => Some(3),
            Self::ItemUnavailable => Some(4),
            Self::InvalidArguments => Some(5),
            Self::FatalError => Some(6),
            Self::AlreadyOwned => Some(7),
            Self::ItemNotOwned => Some(8),
            Self::Unknown => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Reason string carried on outward failure events.
    pub fn as_reason(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserCanceled => "cancel",
            Self::ServiceUnavailable => "service",
            Self::BillingUnavailable => "billing unavailable",
            Self::ItemUnavailable => "item unavailable",
            Self::InvalidArguments => "invalid arguments provided to API",
            Self::FatalError => "fatal error in API",
            Self::AlreadyOwned => "already owned",
            Self::ItemNotOwned => "item not owned",
            Self::Unknown => "unknown error",
        }
    }
}

impl From<i64> for ResponseCode {
    fn from(code: i64) -> Self {
        Self::from_code(Some(code))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table() {
        let expected = [
            (0, ResponseCode::Ok),
            (1, ResponseCode::UserCanceled),
            (2, ResponseCode::ServiceUnavailable),
            (3, ResponseCode::BillingUnavailable),
            (4, ResponseCode::ItemUnavailable),
            (5, ResponseCode::InvalidArguments),
            (6, ResponseCode::FatalError),
            (7, ResponseCode::AlreadyOwned),
            (8, ResponseCode::ItemNotOwned),
        ];
        for (raw, code) in expected {
            assert_eq!(ResponseCode::from_code(Some(raw)), code);
            assert_eq!(code.code(), Some(raw));
        }
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(ResponseCode::from_code(None), ResponseCode::Unknown);
        assert_eq!(ResponseCode::from_code(Some(9)), ResponseCode::Unknown);
        assert_eq!(ResponseCode::from_code(Some(-1)), ResponseCode::Unknown);
        assert_eq!(ResponseCode::Unknown.as_reason(), "unknown error");
    }

    #[test]
    fn test_reasons() {
        assert!(ResponseCode::Ok.is_ok());
        assert!(!ResponseCode::UserCanceled.is_ok());
        assert_eq!(ResponseCode::UserCanceled.to_string(), "cancel");
        assert_eq!(ResponseCode::ItemNotOwned.as_reason(), "item not owned");
    }
}
