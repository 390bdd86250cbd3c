//! Push-mode delivery to consumer webhooks.
//!
//! The coordinator calls [`WebhookHook::on_fulfilled`] while holding its lock,
//! so the hook only enqueues. A background notifier POSTs the notice and logs
//! failures; nothing flows back into the coordinator.

use std::sync::Arc;
use std::time::Duration;

use rng_coordinator::{ConsumerHook, FulfillmentNotice, HookError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

#[derive(Debug)]
pub struct WebhookDelivery {
    pub url: Arc<str>,
    pub notice: FulfillmentNotice,
}

pub struct WebhookHook {
    url: Arc<str>,
    deliveries: mpsc::Sender<WebhookDelivery>,
}

impl WebhookHook {
    pub fn new(url: impl Into<Arc<str>>, deliveries: mpsc::Sender<WebhookDelivery>) -> Self {
        Self {
            url: url.into(),
            deliveries,
        }
    }
}

impl ConsumerHook for WebhookHook {
    fn on_fulfilled(&self, notice: &FulfillmentNotice) -> Result<(), HookError> {
        self.deliveries
            .try_send(WebhookDelivery {
                url: self.url.clone(),
                notice: notice.clone(),
            })
            .map_err(|e| HookError(format!("webhook queue rejected notice: {e}")))
    }
}

/// Drain queued notices until every hook has been dropped.
pub async fn run_notifier(
    mut rx: mpsc::Receiver<WebhookDelivery>,
    timeout: Duration,
    metrics: Arc<Metrics>,
) {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Failed to build webhook client, push delivery disabled");
            return;
        }
    };

    while let Some(delivery) = rx.recv().await {
        let request_id = delivery.notice.request_id;
        let result = client
            .post(delivery.url.as_ref())
            .json(&delivery.notice)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(response) => debug!(
                request_id,
                url = %delivery.url,
                status = %response.status(),
                "Webhook delivered"
            ),
            Err(e) => {
                metrics.record_hook_failure();
                warn!(request_id, url = %delivery.url, error = %e, "Webhook delivery failed");
            }
        }
    }

    info!("Webhook channel closed, shutting down notifier");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rng_coordinator::{Commitment, RandomWord};
    use solana_sdk::pubkey::Pubkey;

    fn notice() -> FulfillmentNotice {
        FulfillmentNotice {
            request_id: 3,
            requester: Pubkey::new_unique(),
            beneficiary: Pubkey::new_unique(),
            commitment: Commitment::ZERO,
            words: vec![RandomWord([1u8; 32])],
        }
    }

    #[tokio::test]
    async fn hook_enqueues_notice() {
        let (tx, mut rx) = mpsc::channel(1);
        let hook = WebhookHook::new("http://consumer.local/hook", tx);

        hook.on_fulfilled(&notice()).unwrap();
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.notice.request_id, 3);
        assert_eq!(delivery.url.as_ref(), "http://consumer.local/hook");
    }

    #[test]
    fn full_queue_surfaces_as_hook_error() {
        let (tx, _rx) = mpsc::channel(1);
        let hook = WebhookHook::new("http://consumer.local/hook", tx);

        hook.on_fulfilled(&notice()).unwrap();
        assert!(hook.on_fulfilled(&notice()).is_err());
    }
}
