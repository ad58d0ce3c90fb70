//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Correlation of helper replies with outstanding calls.
//!
//! Replies land in an ordered [`CorrelationTable`] as they arrive. A call
//! claims its reply by id; replies nobody claimed stay in the table, in
//! arrival order, until claimed or until the session is abandoned.
//!
//! Waiting callers do not poll the table. The connection keeps one oneshot
//! waiter per outstanding call and hands the reply over as soon as it lands.

use crate::codec::{CallId, Reply};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Ordered buffer of replies not yet claimed by a caller.
///
/// # Example
///
/// ```rust
/// use helper_bridge::codec::Reply;
/// use helper_bridge::correlation::CorrelationTable;
///
/// let mut table = CorrelationTable::new();
/// table.push(Reply::new(7, true, "a"));
/// table.push(Reply::new(8, true, "b"));
/// table.push(Reply::new(7, false, "c"));
///
/// let claimed = table.claim(7);
/// assert_eq!(claimed.len(), 2);
/// assert_eq!(claimed[0].message, "a");
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CorrelationTable {
    replies: VecDeque<Reply>,
}

impl CorrelationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply at the tail.
    pub fn push(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }

    /// Remove and return every reply for `call_id`, in arrival order.
    ///
    /// Entries for other ids keep their relative order. An empty result means
    /// nothing has arrived for that id.
    pub fn claim(&mut self, call_id: CallId) -> Vec<Reply> {
        if !self.contains(call_id) {
            return Vec::new();
        }

        let (claimed, kept): (Vec<Reply>, Vec<Reply>) = self
            .replies
            .drain(..)
            .partition(|reply| reply.call_id == call_id);
        self.replies = kept.into();
        claimed
    }

    /// Drop every unclaimed reply.
    pub fn clear(&mut self) {
        self.replies.clear();
    }

    /// Whether any reply for `call_id` is waiting.
    pub fn contains(&self, call_id: CallId) -> bool {
        self.replies.iter().any(|reply| reply.call_id == call_id)
    }

    /// Number of unclaimed replies.
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Waiters for calls that are still inside their budget.
///
/// At most one waiter exists per call id.
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    waiters: HashMap<CallId, oneshot::Sender<Reply>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `call_id`, replacing any stale one.
    pub(crate) fn register(&mut self, call_id: CallId) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(call_id, tx);
        rx
    }

    pub(crate) fn contains(&self, call_id: CallId) -> bool {
        self.waiters.contains_key(&call_id)
    }

    /// Hand `reply` to its waiter.
    ///
    /// Returns the reply back if nobody is listening any more, so the caller
    /// can keep it claimable.
    pub(crate) fn complete(&mut self, reply: Reply) -> Result<(), Reply> {
        match self.waiters.remove(&reply.call_id) {
            Some(tx) => tx.send(reply),
            None => Err(reply),
        }
    }

    /// Drop the waiter for `call_id`. Returns `true` if one was registered.
    pub(crate) fn cancel(&mut self, call_id: CallId) -> bool {
        self.waiters.remove(&call_id).is_some()
    }

    /// Forget waiters whose caller has gone away. Returns how many.
    pub(crate) fn prune_closed(&mut self) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|_, tx| !tx.is_closed());
        before - self.waiters.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_missing_id_is_empty() {
        let mut table = CorrelationTable::new();
        table.push(Reply::new(1, true, "x"));
        assert!(table.claim(2).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_claim_preserves_order_of_others() {
        let mut table = CorrelationTable::new();
        for (id, msg) in [(1, "a"), (2, "b"), (3, "c"), (2, "d"), (4, "e")] {
            table.push(Reply::new(id, true, msg));
        }

        let claimed = table.claim(2);
        assert_eq!(
            claimed.iter().map(|r| r.message.as_str()).collect::<Vec<_>>(),
            vec!["b", "d"]
        );

        let rest: Vec<CallId> = table.replies.iter().map(|r| r.call_id).collect();
        assert_eq!(rest, vec![1, 3, 4]);
    }

    #[test]
    fn test_clear() {
        let mut table = CorrelationTable::new();
        table.push(Reply::new(1, true, "x"));
        table.push(Reply::new(2, true, "y"));
        assert!(table.contains(1));
        table.clear();
        assert!(table.is_empty());
        assert!(!table.contains(1));
    }

    #[tokio::test]
    async fn test_pending_complete() {
        let mut pending = PendingCalls::new();
        let rx = pending.register(9);
        assert!(pending.contains(9));

        assert!(pending.complete(Reply::new(9, true, "done")).is_ok());
        assert_eq!(rx.await.unwrap().message, "done");
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_pending_complete_without_waiter_returns_reply() {
        let mut pending = PendingCalls::new();
        let reply = Reply::new(3, true, "late");
        assert_eq!(pending.complete(reply.clone()), Err(reply));
    }

    #[test]
    fn test_pending_complete_dropped_receiver_returns_reply() {
        let mut pending = PendingCalls::new();
        drop(pending.register(4));
        assert!(pending.complete(Reply::new(4, true, "late")).is_err());
    }

    #[tokio::test]
    async fn test_pending_cancel() {
        let mut pending = PendingCalls::new();
        let rx = pending.register(5);
        assert!(pending.cancel(5));
        assert!(!pending.cancel(5));
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_pending_prune_closed() {
        let mut pending = PendingCalls::new();
        drop(pending.register(1));
        let _live = pending.register(2);
        drop(pending.register(3));

        assert_eq!(pending.prune_closed(), 2);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(2));
        assert_eq!(pending.prune_closed(), 0);
    }
}
