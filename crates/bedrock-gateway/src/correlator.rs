//! Command correlation
//!
//! Each outstanding request owns one table entry keyed by its correlation id.
//! The entry is removed by exactly one of: a matching response, its deadline,
//! or the transport closing. Whoever removes it delivers the result, so a
//! caller never sees more than one completion. A caller that stops waiting
//! takes its entry with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bedrock_protocol::CommandResponse;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

type Table = Mutex<HashMap<String, PendingEntry>>;

/// How a registered request finished
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The peer answered
    Responded(CommandResponse),
    /// The deadline passed first
    Expired,
    /// The transport went away first
    Closed,
}

impl Completion {
    pub fn is_expired(&self) -> bool {
        matches!(self, Completion::Expired)
    }

    /// Result handed to command callers
    pub fn into_response(self) -> CommandResponse {
        match self {
            Completion::Responded(response) => response,
            Completion::Expired => CommandResponse::timeout(),
            Completion::Closed => CommandResponse::closed(),
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    responder: oneshot::Sender<Completion>,
    deadline: Instant,
    ticket: u64,
}

/// Caller's half of a registered request
///
/// Dropping it before completion removes the entry.
#[derive(Debug)]
pub struct PendingCommand {
    request_id: String,
    ticket: u64,
    deadline: Instant,
    receiver: oneshot::Receiver<Completion>,
    table: Weak<Table>,
}

impl PendingCommand {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut pending = table.lock();
        // Only our own entry; the id may have been reused since.
        if pending
            .get(&self.request_id)
            .is_some_and(|entry| entry.ticket == self.ticket)
        {
            pending.remove(&self.request_id);
        }
    }
}

/// Per-session table of outstanding requests
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    pending: Arc<Table>,
    next_ticket: AtomicU64,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; `None` if the id is already in use
    pub fn register(&self, request_id: &str, deadline: Instant) -> Option<PendingCommand> {
        let mut pending = self.pending.lock();
        if pending.contains_key(request_id) {
            return None;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        pending.insert(
            request_id.to_string(),
            PendingEntry {
                responder,
                deadline,
                ticket,
            },
        );

        Some(PendingCommand {
            request_id: request_id.to_string(),
            ticket,
            deadline,
            receiver,
            table: Arc::downgrade(&self.pending),
        })
    }

    /// Deliver a response. Returns false for unknown, late or duplicate ids.
    pub fn resolve(&self, request_id: &str, response: CommandResponse) -> bool {
        let entry = self.pending.lock().remove(request_id);
        match entry {
            Some(entry) => {
                let _ = entry.responder.send(Completion::Responded(response));
                true
            }
            None => false,
        }
    }

    /// Expire a request whose deadline has passed
    ///
    /// Returns false if the entry is gone or still within its deadline.
    pub fn expire(&self, request_id: &str, now: Instant) -> bool {
        let mut pending = self.pending.lock();
        let overdue = pending
            .get(request_id)
            .is_some_and(|entry| entry.deadline <= now);
        if !overdue {
            return false;
        }

        if let Some(entry) = pending.remove(request_id) {
            let _ = entry.responder.send(Completion::Expired);
        }
        true
    }

    /// Fail every outstanding request, used when the transport closes
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingEntry> = self.pending.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.responder.send(Completion::Closed);
        }
        count
    }

    /// Wait for the single completion of a registered request
    pub async fn wait(&self, mut pending: PendingCommand) -> Completion {
        match tokio::time::timeout_at(pending.deadline, &mut pending.receiver).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_)) => Completion::Closed,
            Err(_) => {
                // A response may have won the race right at the deadline.
                self.expire(&pending.request_id, Instant::now());
                pending.receiver.try_recv().unwrap_or(Completion::Closed)
            }
        }
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let correlator = CommandCorrelator::new();
        let pending = correlator.register("req-1", later()).unwrap();

        let body = json!({ "statusCode": 0, "players": "Steve" });
        assert!(correlator.resolve("req-1", CommandResponse::from_body(body)));
        assert!(!correlator.resolve("req-1", CommandResponse::ok()));
        assert!(!correlator.expire("req-1", later()));

        let response = correlator.wait(pending).await.into_response();
        assert!(response.is_success());
        assert_eq!(response.player_names(), vec!["Steve"]);
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let correlator = CommandCorrelator::new();
        let _first = correlator.register("req-1", later()).unwrap();
        assert!(correlator.register("req-1", later()).is_none());
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_expire_respects_deadline() {
        let correlator = CommandCorrelator::new();
        let deadline = later();
        let _pending = correlator.register("req-1", deadline).unwrap();

        assert!(!correlator.expire("req-1", Instant::now()));
        assert!(correlator.is_pending("req-1"));
        assert!(correlator.expire("req-1", deadline));
        assert!(!correlator.is_pending("req-1"));

        // Id is free again straight away
        let _reused = correlator.register("req-1", later()).unwrap();
        assert!(correlator.is_pending("req-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let correlator = CommandCorrelator::new();
        let pending = correlator
            .register("req-1", Instant::now() + Duration::from_secs(10))
            .unwrap();

        let completion = correlator.wait(pending).await;
        assert!(completion.is_expired());
        assert_eq!(completion.into_response(), CommandResponse::timeout());
        assert!(correlator.is_empty());
        assert!(!correlator.resolve("req-1", CommandResponse::ok()));
    }

    #[tokio::test]
    async fn test_peer_timeout_text_is_a_response() {
        let correlator = CommandCorrelator::new();
        let pending = correlator.register("req-1", later()).unwrap();

        correlator.resolve("req-1", CommandResponse::timeout());
        let completion = correlator.wait(pending).await;
        assert!(!completion.is_expired());
        assert_eq!(completion, Completion::Responded(CommandResponse::timeout()));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let correlator = CommandCorrelator::new();
        let first = correlator.register("a", later()).unwrap();
        let second = correlator.register("b", later()).unwrap();

        assert_eq!(correlator.fail_all(), 2);
        assert_eq!(correlator.wait(first).await, Completion::Closed);
        assert_eq!(
            correlator.wait(second).await.into_response(),
            CommandResponse::closed()
        );
        assert_eq!(correlator.fail_all(), 0);
    }

    #[test]
    fn test_dropped_caller_removes_entry() {
        let correlator = CommandCorrelator::new();
        let pending = correlator.register("req-1", later()).unwrap();
        assert_eq!(correlator.len(), 1);

        drop(pending);
        assert!(correlator.is_empty());
        assert!(!correlator.resolve("req-1", CommandResponse::ok()));
    }

    #[test]
    fn test_stale_caller_leaves_reused_id_alone() {
        let correlator = CommandCorrelator::new();
        let deadline = later();
        let stale = correlator.register("req-1", deadline).unwrap();
        assert!(correlator.expire("req-1", deadline));

        let _fresh = correlator.register("req-1", later()).unwrap();
        drop(stale);
        assert!(correlator.is_pending("req-1"));
    }
}
