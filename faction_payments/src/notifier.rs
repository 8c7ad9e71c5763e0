//! Outbound notifications about payment requests.
//!
//! The reconciliation engine tells a [`PaymentNotifier`] when a request needs paying (again) and when a deposit has
//! settled it. Delivery is best effort: a notifier reports failure by returning `false`, and the caller counts and logs
//! it. Nothing is retried.
use std::{fmt::Display, sync::Arc, time::Duration};

use faction_common::Money;
use log::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{DepositEvidence, PaymentRequest};

#[allow(async_fn_in_trait)]
pub trait PaymentNotifier {
    /// Announces that `request` is waiting for someone to pay it.
    async fn notify_payment_needed(&self, request: &PaymentRequest) -> bool;

    /// Announces that `request` has been paid, as shown by `evidence`.
    async fn notify_payment_fulfilled(&self, request: &PaymentRequest, evidence: &DepositEvidence) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentNeeded,
    PaymentFulfilled,
}

/// The JSON document posted by [`WebhookNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub kind: NotificationKind,
    pub request_id: String,
    pub faction_id: i64,
    pub user_id: i64,
    pub username: String,
    pub item_required: String,
    pub item_value: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit: Option<DepositEvidence>,
    pub message: String,
}

impl PaymentNotification {
    pub fn payment_needed(request: &PaymentRequest) -> Self {
        let message = format!(
            "{} needs {} for a {} (request {})",
            request.username, request.item_value, request.item_required, request.request_id
        );
        Self::new(NotificationKind::PaymentNeeded, request, None, message)
    }

    pub fn payment_fulfilled(request: &PaymentRequest, evidence: &DepositEvidence) -> Self {
        let message = format!(
            "{} paid {} {} for a {} (request {})",
            evidence.depositor_name, request.username, evidence.amount, request.item_required, request.request_id
        );
        Self::new(NotificationKind::PaymentFulfilled, request, Some(evidence.clone()), message)
    }

    fn new(
        kind: NotificationKind,
        request: &PaymentRequest,
        deposit: Option<DepositEvidence>,
        message: String,
    ) -> Self {
        Self {
            kind,
            request_id: request.request_id.clone(),
            faction_id: request.faction_id,
            user_id: request.user_id,
            username: request.username.clone(),
            item_required: request.item_required.clone(),
            item_value: request.item_value,
            deposit,
            message,
        }
    }
}

impl Display for PaymentNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[faction {}] {}", self.faction_id, self.message)
    }
}

//--------------------------------------     LogNotifier     ---------------------------------------------------------
/// Writes notifications to the log and nowhere else.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl PaymentNotifier for LogNotifier {
    async fn notify_payment_needed(&self, request: &PaymentRequest) -> bool {
        info!("📣️ {}", PaymentNotification::payment_needed(request));
        true
    }

    async fn notify_payment_fulfilled(&self, request: &PaymentRequest, evidence: &DepositEvidence) -> bool {
        info!("📣️ {}", PaymentNotification::payment_fulfilled(request, evidence));
        true
    }
}

//--------------------------------------   WebhookNotifier   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Could not initialize notifier: {0}")]
    Initialization(String),
}

/// POSTs each [`PaymentNotification`] as JSON to a fixed URL. Any 2xx response counts as delivered.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Arc<Client>,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Initialization(e.to_string()))?;
        Ok(Self { url: url.to_string(), client: Arc::new(client) })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub async fn post(&self, notification: &PaymentNotification) -> bool {
        trace!("📣️ Posting notification for request {} to webhook", notification.request_id);
        match self.client.post(&self.url).json(notification).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("📣️ Notification for request {} delivered", notification.request_id);
                true
            },
            Ok(response) => {
                warn!(
                    "📣️ Webhook rejected the notification for request {} with status {}",
                    notification.request_id,
                    response.status()
                );
                false
            },
            Err(e) => {
                warn!("📣️ Could not deliver the notification for request {}. {e}", notification.request_id);
                false
            },
        }
    }
}

impl PaymentNotifier for WebhookNotifier {
    async fn notify_payment_needed(&self, request: &PaymentRequest) -> bool {
        self.post(&PaymentNotification::payment_needed(request)).await
    }

    async fn notify_payment_fulfilled(&self, request: &PaymentRequest, evidence: &DepositEvidence) -> bool {
        self.post(&PaymentNotification::payment_fulfilled(request, evidence)).await
    }
}

//--------------------------------------  NotificationChannel  -------------------------------------------------------
/// The notifier chosen at start-up.
#[derive(Debug, Clone)]
pub enum NotificationChannel {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl NotificationChannel {
    /// A webhook channel if `webhook_url` is given, otherwise log-only.
    pub fn new(webhook_url: Option<&str>, timeout: Duration) -> Result<Self, NotifierError> {
        match webhook_url {
            Some(url) => {
                info!("📣️ Notifications will be posted to {url}");
                Ok(Self::Webhook(WebhookNotifier::new(url, timeout)?))
            },
            None => {
                info!("📣️ No webhook configured. Notifications will only be logged.");
                Ok(Self::Log(LogNotifier))
            },
        }
    }
}

impl PaymentNotifier for NotificationChannel {
    async fn notify_payment_needed(&self, request: &PaymentRequest) -> bool {
        match self {
            Self::Log(n) => n.notify_payment_needed(request).await,
            Self::Webhook(n) => n.notify_payment_needed(request).await,
        }
    }

    async fn notify_payment_fulfilled(&self, request: &PaymentRequest, evidence: &DepositEvidence) -> bool {
        match self {
            Self::Log(n) => n.notify_payment_fulfilled(request, evidence).await,
            Self::Webhook(n) => n.notify_payment_fulfilled(request, evidence).await,
        }
    }
}
