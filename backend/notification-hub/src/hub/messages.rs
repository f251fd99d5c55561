//! Outbound notification envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Notification types emitted by in-process callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Transaction,
    FraudAlert,
    FinancialAdvice,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Transaction => "transaction",
            NotificationKind::FraudAlert => "fraud_alert",
            NotificationKind::FinancialAdvice => "financial_advice",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire message pushed to clients: `{"type": ..., "data": ...}`
///
/// `data` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl NotificationMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn typed(kind: NotificationKind, data: Value) -> Self {
        Self::new(kind.as_str(), data)
    }

    pub fn transaction(data: Value) -> Self {
        Self::typed(NotificationKind::Transaction, data)
    }

    pub fn fraud_alert(data: Value) -> Self {
        Self::typed(NotificationKind::FraudAlert, data)
    }

    pub fn financial_advice(data: Value) -> Self {
        Self::typed(NotificationKind::FinancialAdvice, data)
    }
}
