//! Post-commit side-effect dispatch.
//!
//! Purchases, transfers and refunds enqueue a notification after their
//! transaction commits; a background worker delivers them with bounded
//! retries. Delivery is best-effort by contract: a failure here is logged
//! and dropped, never propagated back into the workflow that enqueued it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_DELIVERY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub enum Notification {
    PurchaseConfirmed {
        email: String,
        order_id: Uuid,
        event_id: Uuid,
        quantity: i32,
        total_amount: Decimal,
    },
    TicketTransferred {
        sender_email: String,
        recipient_email: String,
        purchase_id: Uuid,
    },
    OrderRefunded {
        email: String,
        order_id: Uuid,
        amount: Decimal,
    },
}

impl Notification {
    /// (recipient, subject, body) for the outbound email.
    fn compose(&self) -> (String, String, String) {
        match self {
            Notification::PurchaseConfirmed {
                email,
                order_id,
                quantity,
                total_amount,
                ..
            } => (
                email.clone(),
                "Your tickets are confirmed".to_string(),
                format!(
                    "Order {order_id}: {quantity} ticket(s), total {total_amount}. \
                     Your QR codes are attached to the order."
                ),
            ),
            Notification::TicketTransferred {
                recipient_email,
                purchase_id,
                ..
            } => (
                recipient_email.clone(),
                "A ticket was transferred to you".to_string(),
                format!("Ticket {purchase_id} is now registered to this account."),
            ),
            Notification::OrderRefunded {
                email,
                order_id,
                amount,
            } => (
                email.clone(),
                "Your order was refunded".to_string(),
                format!("Order {order_id} was refunded for {amount}."),
            ),
        }
    }
}

/// Outbound email transport. The default [`LogSender`] just records the
/// send; real deployments plug an SMTP/provider implementation in here.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Transport that logs instead of sending. Useful in development and as
/// the stand-in while the delivery provider is wired up elsewhere.
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        info!(%to, %subject, body_len = body.len(), "Email dispatched (log transport)");
        Ok(())
    }
}

/// Handle for enqueueing notifications. Cloneable; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Dispatcher {
    /// Spawns the delivery worker and returns the enqueue handle.
    pub fn start(sender: Arc<dyn EmailSender>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                deliver_with_retry(sender.as_ref(), &job).await;
            }
            debug!("Notification worker stopped");
        });

        Self { tx }
    }

    /// Fire-and-forget. A closed queue is logged, not surfaced; the caller
    /// has already committed its transaction.
    pub fn enqueue(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("Notification queue is closed; dropping job");
        }
    }
}

async fn deliver_with_retry(sender: &dyn EmailSender, job: &Notification) {
    let (to, subject, body) = job.compose();

    for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
        match sender.send(&to, &subject, &body).await {
            Ok(()) => {
                debug!(%to, attempt, "Notification delivered");
                return;
            }
            Err(err) => {
                warn!(%to, attempt, %err, "Notification delivery failed");
                if attempt < MAX_DELIVERY_ATTEMPTS {
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
            }
        }
    }

    error!(%to, "Giving up on notification after {MAX_DELIVERY_ATTEMPTS} attempts");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records sends; fails the first `fail_first` attempts.
    struct RecordingSender {
        fail_first: u32,
        attempts: Mutex<u32>,
        delivered: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                attempts: Mutex::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), String> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if *attempts <= self.fail_first {
                return Err("simulated transport failure".to_string());
            }
            self.delivered
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn purchase_note() -> Notification {
        Notification::PurchaseConfirmed {
            email: "buyer@example.com".to_string(),
            order_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            quantity: 2,
            total_amount: Decimal::new(5000, 2),
        }
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let sender = RecordingSender::new(0);
        deliver_with_retry(&sender, &purchase_note()).await;

        let delivered = sender.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "buyer@example.com");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let sender = RecordingSender::new(2);
        deliver_with_retry(&sender, &purchase_note()).await;

        assert_eq!(*sender.attempts.lock().unwrap(), 3);
        assert_eq!(sender.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_without_panicking() {
        let sender = RecordingSender::new(10);
        deliver_with_retry(&sender, &purchase_note()).await;

        assert_eq!(*sender.attempts.lock().unwrap(), MAX_DELIVERY_ATTEMPTS);
        assert!(sender.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_feeds_the_worker() {
        let sender = Arc::new(RecordingSender::new(0));
        let dispatcher = Dispatcher::start(sender.clone());

        dispatcher.enqueue(purchase_note());

        // The worker runs on its own task; poll briefly for completion.
        for _ in 0..100 {
            if !sender.delivered.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification was not delivered");
    }
}
