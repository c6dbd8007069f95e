//! Alerting on monitor status changes.
//!
//! The dispatcher listens on the monitor event bus and fans each status
//! change out to the enabled channels. Delivery failures are logged and never
//! reach the monitoring loop.

pub mod channels;
pub mod dispatcher;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use channels::{LogNotifier, Notifier, WebhookNotifier};
pub use dispatcher::{AlertDispatcher, DispatcherHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Toast,
    Email,
    Sms,
    Webhook,
}

impl AlertChannel {
    pub const ALL: [AlertChannel; 4] =
        [AlertChannel::Toast, AlertChannel::Email, AlertChannel::Sms, AlertChannel::Webhook];
}

impl fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertChannel::Toast => write!(f, "toast"),
            AlertChannel::Email => write!(f, "email"),
            AlertChannel::Sms => write!(f, "sms"),
            AlertChannel::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}
