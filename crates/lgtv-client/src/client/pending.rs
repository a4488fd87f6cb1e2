//! Outstanding correlated calls
//!
//! Every call the client is waiting on has exactly one entry keyed by its
//! correlation id. One-shot requests also hold a deadline in a
//! [`DelayQueue`]; whichever of response or deadline is processed first
//! removes the entry and consumes its completion, so the other finds
//! nothing and a caller is answered at most once.

use std::collections::HashMap;
use std::future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::{delay_queue, DelayQueue};

use lgtv_core::ClientError;
use lgtv_protocol::CorrelationId;

/// Result delivered to a request caller
pub(crate) type CallResult = Result<Value, ClientError>;

/// Where the answer to a one-shot request goes
#[derive(Debug)]
pub(crate) enum Completion {
    /// A `request` caller waiting on a [`ResponseFuture`](super::ResponseFuture)
    Caller(oneshot::Sender<CallResult>),
    /// A channel-descriptor lookup for the secondary channel at `address`
    Descriptor { address: String },
}

/// One outstanding call
#[derive(Debug)]
pub(crate) enum PendingCall {
    /// One-shot call with a timeout
    Request {
        completion: Completion,
        deadline: delay_queue::Key,
    },
    /// Pairing handshake; no timeout, may be answered twice (prompt, then key)
    Register { sent_token: Option<String> },
    /// Subscription; every pushed update goes to `updates`
    Subscription {
        updates: mpsc::UnboundedSender<CallResult>,
    },
}

/// Correlation table plus request deadlines
#[derive(Debug)]
pub(crate) struct PendingCalls {
    calls: HashMap<CorrelationId, PendingCall>,
    deadlines: DelayQueue<CorrelationId>,
    timeout: Duration,
}

impl PendingCalls {
    pub fn new(timeout: Duration) -> Self {
        Self {
            calls: HashMap::new(),
            deadlines: DelayQueue::new(),
            timeout,
        }
    }

    /// Request timeout applied to one-shot calls
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn insert_request(&mut self, id: CorrelationId, completion: Completion) {
        let deadline = self.deadlines.insert(id.clone(), self.timeout);
        self.insert(id, PendingCall::Request { completion, deadline });
    }

    pub fn insert_register(&mut self, id: CorrelationId, sent_token: Option<String>) {
        self.insert(id, PendingCall::Register { sent_token });
    }

    pub fn insert_subscription(
        &mut self,
        id: CorrelationId,
        updates: mpsc::UnboundedSender<CallResult>,
    ) {
        self.insert(id, PendingCall::Subscription { updates });
    }

    fn insert(&mut self, id: CorrelationId, call: PendingCall) {
        if let Some(PendingCall::Request { deadline, .. }) = self.calls.insert(id.clone(), call) {
            // Ids are never reused; a collision means the generator is broken
            tracing::error!("Correlation id {} was already pending", id);
            self.deadlines.remove(&deadline);
        }
    }

    /// Put back a multi-answer call taken with [`take`](Self::take)
    ///
    /// Only registrations and subscriptions can be restored; they carry no
    /// deadline.
    pub fn restore(&mut self, id: CorrelationId, call: PendingCall) {
        debug_assert!(!matches!(call, PendingCall::Request { .. }));
        self.calls.insert(id, call);
    }

    /// Remove the entry for `id`, cancelling its deadline
    pub fn take(&mut self, id: &CorrelationId) -> Option<PendingCall> {
        let call = self.calls.remove(id)?;
        if let PendingCall::Request { deadline, .. } = &call {
            self.deadlines.remove(deadline);
        }
        Some(call)
    }

    /// Wait for the next request deadline to pass
    ///
    /// The entry is removed before its id and completion are returned. Never
    /// resolves while no request is outstanding.
    pub async fn next_expired(&mut self) -> (CorrelationId, Completion) {
        loop {
            if self.deadlines.is_empty() {
                return future::pending().await;
            }

            let expired = match future::poll_fn(|cx| self.deadlines.poll_expired(cx)).await {
                Some(expired) => expired.into_inner(),
                None => return future::pending().await,
            };

            if let Some(PendingCall::Request { completion, .. }) = self.calls.remove(&expired) {
                return (expired, completion);
            }
        }
    }

    /// Drop the calls a closed connection can never answer
    ///
    /// Registrations and subscriptions are bound to the socket they were sent
    /// on. One-shot requests stay until their deadline.
    pub fn drop_connection_bound(&mut self) -> usize {
        let before = self.calls.len();
        self.calls
            .retain(|_, call| matches!(call, PendingCall::Request { .. }));
        before - self.calls.len()
    }

    /// Drop subscriptions whose [`Subscription`](super::Subscription) has
    /// been dropped
    pub fn prune_abandoned_subscriptions(&mut self) -> usize {
        let before = self.calls.len();
        self.calls.retain(|_, call| match call {
            PendingCall::Subscription { updates } => !updates.is_closed(),
            _ => true,
        });
        before - self.calls.len()
    }

    /// Drop every call without answering it
    ///
    /// Callers observe the dropped completion as [`ClientError::Disconnected`].
    /// Returns the addresses of interrupted descriptor lookups.
    pub fn clear(&mut self) -> Vec<String> {
        self.deadlines.clear();
        self.calls
            .drain()
            .filter_map(|(_, call)| match call {
                PendingCall::Request {
                    completion: Completion::Descriptor { address },
                    ..
                } => Some(address),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_cancels_deadline() {
        let mut pending = PendingCalls::new(Duration::from_secs(15));
        let (tx, _rx) = oneshot::channel();
        pending.insert_request(id("a"), Completion::Caller(tx));

        assert!(matches!(
            pending.take(&id("a")),
            Some(PendingCall::Request { .. })
        ));
        assert!(pending.take(&id("a")).is_none());

        let expired = tokio::time::timeout(Duration::from_secs(60), pending.next_expired()).await;
        assert!(expired.is_err(), "no deadline should remain");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_removes_entry() {
        let mut pending = PendingCalls::new(Duration::from_secs(15));
        let (tx, _rx) = oneshot::channel();
        pending.insert_request(id("a"), Completion::Caller(tx));

        let start = tokio::time::Instant::now();
        let (expired, completion) = pending.next_expired().await;
        assert_eq!(expired, id("a"));
        assert!(matches!(completion, Completion::Caller(_)));
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert!(pending.take(&id("a")).is_none());
    }

    #[tokio::test]
    async fn test_close_keeps_only_requests() {
        let mut pending = PendingCalls::new(Duration::from_secs(15));
        let (tx, _rx) = oneshot::channel();
        let (updates, mut updates_rx) = mpsc::unbounded_channel();

        pending.insert_request(id("req"), Completion::Caller(tx));
        pending.insert_register(id("reg"), None);
        pending.insert_subscription(id("sub"), updates);

        assert_eq!(pending.drop_connection_bound(), 2);
        assert_eq!(pending.len(), 1);
        assert!(updates_rx.recv().await.is_none());
    }

    #[test]
    fn test_prune_drops_only_abandoned_subscriptions() {
        let mut pending = PendingCalls::new(Duration::from_secs(15));
        let (live, _live_rx) = mpsc::unbounded_channel();
        let (gone, gone_rx) = mpsc::unbounded_channel();

        pending.insert_register(id("reg"), None);
        pending.insert_subscription(id("live"), live);
        pending.insert_subscription(id("gone"), gone);
        drop(gone_rx);

        assert_eq!(pending.prune_abandoned_subscriptions(), 1);
        assert!(pending.take(&id("gone")).is_none());
        assert!(matches!(
            pending.take(&id("live")),
            Some(PendingCall::Subscription { .. })
        ));
        assert!(matches!(
            pending.take(&id("reg")),
            Some(PendingCall::Register { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_reports_descriptor_lookups() {
        let mut pending = PendingCalls::new(Duration::from_secs(15));
        let (tx, rx) = oneshot::channel();
        pending.insert_request(id("req"), Completion::Caller(tx));
        pending.insert_request(
            id("desc"),
            Completion::Descriptor {
                address: "ssap://input".to_string(),
            },
        );

        assert_eq!(pending.clear(), vec!["ssap://input".to_string()]);
        assert_eq!(pending.len(), 0);
        assert!(rx.await.is_err());
    }
}
