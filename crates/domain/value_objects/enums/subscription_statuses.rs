use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    TrialActive,
    ActivePaid,
    PastDue,
    Grace,
    Restricted,
    Canceled,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            SubscriptionStatus::TrialActive => "trial_active",
            SubscriptionStatus::ActivePaid => "active_paid",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Grace => "grace",
            SubscriptionStatus::Restricted => "restricted",
            SubscriptionStatus::Canceled => "canceled",
        };
        write!(f, "{}", status)
    }
}

impl SubscriptionStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "trial_active" => Some(SubscriptionStatus::TrialActive),
            "active_paid" => Some(SubscriptionStatus::ActivePaid),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "grace" => Some(SubscriptionStatus::Grace),
            "restricted" => Some(SubscriptionStatus::Restricted),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// Canceled is the only terminal status; no scheduler pass touches it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }
}
