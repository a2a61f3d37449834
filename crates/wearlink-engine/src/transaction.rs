//! Atomic groups of requests.

use crate::{DeviceSession, Request, RequestHandle, Transport};

/// Collects requests and queues them as one unit.
///
/// Every request is built before any is enqueued. If one fails to build,
/// it reports its creation error, the others report
/// [`BatchAborted`](crate::RequestError::BatchAborted), and nothing reaches
/// the transport.
#[derive(Debug)]
pub struct TransactionBuilder {
    name: String,
    requests: Vec<Request>,
}

impl TransactionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        TransactionBuilder {
            name: name.into(),
            requests: Vec::new(),
        }
    }

    /// Append a request.
    pub fn add(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Build and enqueue all requests. Handles are in insertion order.
    pub fn queue<T: Transport>(self, session: &mut DeviceSession<T>) -> Vec<RequestHandle> {
        session.submit_batch(&self.name, self.requests)
    }
}
