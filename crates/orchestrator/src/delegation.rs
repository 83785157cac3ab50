//! FIFO queue of sub-tasks bound for the delegate provider.
//!
//! Filled during the loop, drained in one batch after it.

use siloed_core::task::DelegationRequest;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct DelegationQueue {
    pending: VecDeque<DelegationRequest>,
}

impl DelegationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: DelegationRequest) {
        self.pending.push_back(request);
    }

    pub fn extend(&mut self, requests: impl IntoIterator<Item = DelegationRequest>) {
        self.pending.extend(requests);
    }

    /// Remove and return everything pending, oldest first.
    pub fn drain_all(&mut self) -> Vec<DelegationRequest> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_fifo_and_empties_queue() {
        let mut queue = DelegationQueue::new();
        queue.enqueue(DelegationRequest::new("A"));
        queue.enqueue(DelegationRequest::new("B"));
        queue.enqueue(DelegationRequest::new("C"));
        assert_eq!(queue.len(), 3);

        let drained: Vec<String> = queue.drain_all().into_iter().map(|r| r.task_text).collect();
        assert_eq!(drained, vec!["A", "B", "C"]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn order_holds_across_batches() {
        let mut queue = DelegationQueue::new();
        queue.extend(["1", "2"].map(DelegationRequest::new));
        queue.enqueue(DelegationRequest::new("3"));
        queue.extend(["4"].map(DelegationRequest::new));

        let drained: Vec<String> = queue.drain_all().into_iter().map(|r| r.task_text).collect();
        assert_eq!(drained, vec!["1", "2", "3", "4"]);
    }
}
