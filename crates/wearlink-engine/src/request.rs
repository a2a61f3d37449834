//! Requests and their completion handles.
//!
//! A [`Request`] is plain data plus a body closure. The closure runs when the
//! request is enqueued, so it sees the parameters negotiated by the
//! handshake (slice size, session key). Building produces the wire frames;
//! the session writes them and resolves the request's completion slot exactly
//! once.

use tokio::sync::oneshot;
use wearlink_packet::{slice_packet, Packet, PacketError, SessionKey, Tlv};

use crate::{RequestError, Response, ResponseKind, SessionParams};

/// Parameters visible to a body closure.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Slice size frames are cut to.
    pub slice_size: usize,
    /// Negotiated parameters, once the handshake has run.
    pub params: Option<&'a SessionParams>,
}

type BodyFn = Box<dyn FnOnce(&BuildContext<'_>) -> Result<Tlv, PacketError> + Send>;

/// What a request waits for after its frames are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// One response of this kind.
    Kind(ResponseKind),
    /// One response of any kind.
    Any,
    /// Nothing; the request completes once written.
    Nothing,
}

/// Where a request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Built,
    Enqueued,
    Sent,
    AwaitingResponse,
    Completed,
    Failed,
}

/// An outbound command.
pub struct Request {
    name: &'static str,
    service_id: u8,
    command_id: u8,
    expect: Expect,
    self_queue: bool,
    plaintext: bool,
    body: BodyFn,
}

impl Request {
    /// A request expecting one response of `expected` kind.
    pub fn new<F>(
        name: &'static str,
        service_id: u8,
        command_id: u8,
        expected: ResponseKind,
        body: F,
    ) -> Self
    where
        F: FnOnce(&BuildContext<'_>) -> Result<Tlv, PacketError> + Send + 'static,
    {
        Request {
            name,
            service_id,
            command_id,
            expect: Expect::Kind(expected),
            self_queue: false,
            plaintext: false,
            body: Box::new(body),
        }
    }

    /// A request accepting any response.
    pub fn raw(name: &'static str, service_id: u8, command_id: u8, body: Tlv) -> Self {
        let mut request = Self::new(name, service_id, command_id, ResponseKind::Raw, move |_| {
            Ok(body)
        });
        request.expect = Expect::Any;
        request
    }

    /// Complete as soon as the frames are written.
    pub fn no_response(mut self) -> Self {
        self.expect = Expect::Nothing;
        self
    }

    /// Dispatch without waiting for the queue head.
    pub fn self_queued(mut self) -> Self {
        self.self_queue = true;
        self
    }

    /// Never encrypt the body, even when a session key is installed.
    pub fn plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// (service, command) pair responses are matched on.
    pub fn key(&self) -> (u8, u8) {
        (self.service_id, self.command_id)
    }

    pub fn expect(&self) -> Expect {
        self.expect
    }

    pub fn is_self_queued(&self) -> bool {
        self.self_queue
    }

    /// Run the body closure, encrypt and slice.
    pub(crate) fn build(
        self,
        ctx: &BuildContext<'_>,
        key: Option<&SessionKey>,
    ) -> Result<BuiltRequest, RequestError> {
        let tlv = (self.body)(ctx).map_err(RequestError::Creation)?;
        let mut packet = Packet::new(self.service_id, self.command_id, tlv);
        if let (Some(key), false) = (key, self.plaintext) {
            packet = packet
                .encrypt(key)
                .map_err(|e| RequestError::Creation(PacketError::Crypto(e)))?;
        }
        let frames = slice_packet(&packet.encode(), ctx.slice_size).map_err(RequestError::Creation)?;
        Ok(BuiltRequest {
            name: self.name,
            key: (self.service_id, self.command_id),
            expect: self.expect,
            self_queue: self.self_queue,
            frames,
        })
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("name", &self.name)
            .field("service_id", &self.service_id)
            .field("command_id", &self.command_id)
            .field("expect", &self.expect)
            .field("self_queue", &self.self_queue)
            .finish_non_exhaustive()
    }
}

/// A request whose frames are ready to write.
#[derive(Debug, Clone)]
pub(crate) struct BuiltRequest {
    pub name: &'static str,
    pub key: (u8, u8),
    pub expect: Expect,
    pub self_queue: bool,
    pub frames: Vec<Vec<u8>>,
}

// ============================================================================
// Completion
// ============================================================================

/// Sending half of a completion slot. Consumed on use.
#[derive(Debug)]
pub(crate) struct Completer<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Completer<T, E> {
    pub fn complete(self, result: Result<T, E>) {
        // The caller may have dropped its handle.
        let _ = self.tx.send(result);
    }
}

/// Errors a completion reports when its session vanished.
pub trait ClosedError {
    fn closed() -> Self;
}

impl ClosedError for RequestError {
    fn closed() -> Self {
        RequestError::SessionClosed
    }
}

impl ClosedError for crate::HandshakeError {
    fn closed() -> Self {
        crate::HandshakeError::SessionClosed
    }
}

/// Receiving half of a completion slot.
#[derive(Debug)]
pub struct Completion<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

pub(crate) fn completion<T, E>() -> (Completer<T, E>, Completion<T, E>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Completion { rx })
}

impl<T, E: ClosedError> Completion<T, E> {
    /// Take the result if it is available.
    ///
    /// Yields the result once; afterwards the slot reads as closed.
    pub fn try_result(&mut self) -> Option<Result<T, E>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(E::closed())),
        }
    }

    /// Wait for the result.
    pub async fn wait(self) -> Result<T, E> {
        self.rx.await.unwrap_or_else(|_| Err(E::closed()))
    }
}

/// Completion of one request.
pub type RequestHandle = Completion<Response, RequestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use wearlink_packet::{generate_random_key, SliceReassembler};

    fn ctx(slice_size: usize) -> BuildContext<'static> {
        BuildContext {
            slice_size,
            params: None,
        }
    }

    #[test]
    fn test_build_plaintext() {
        let request = Request::new("test", 0x01, 0x04, ResponseKind::Ack, |_| {
            Ok(Tlv::new().put_u8(0x01, 2))
        });
        let built = request.build(&ctx(244), None).unwrap();
        assert_eq!(built.key, (0x01, 0x04));
        assert_eq!(built.frames.len(), 1);

        let mut reassembler = SliceReassembler::default();
        reassembler.push(&built.frames[0]);
        let bytes = reassembler.next_packet().unwrap().unwrap();
        assert_eq!(bytes, vec![0x01, 0x04, 0x01, 0x01, 0x02]);
    }

    #[test]
    fn test_build_encrypts_with_key() {
        let key = generate_random_key();
        let request = Request::new("test", 0x07, 0x16, ResponseKind::Ack, |_| {
            Ok(Tlv::new().put_bool(0x01, true))
        });
        let built = request.build(&ctx(244), Some(&key)).unwrap();

        let mut reassembler = SliceReassembler::default();
        reassembler.push(&built.frames[0]);
        let packet = Packet::decode(&reassembler.next_packet().unwrap().unwrap()).unwrap();
        assert!(packet.is_encrypted());
        let packet = packet.decrypt(Some(&key)).unwrap();
        assert!(packet.tlv.get_bool(0x01).unwrap());
    }

    #[test]
    fn test_plaintext_request_ignores_key() {
        let key = generate_random_key();
        let request = Request::raw("test", 0x01, 0x01, Tlv::new().put_empty(0x01)).plaintext();
        let built = request.build(&ctx(244), Some(&key)).unwrap();
        assert_eq!(built.expect, Expect::Any);

        let mut reassembler = SliceReassembler::default();
        reassembler.push(&built.frames[0]);
        let packet = Packet::decode(&reassembler.next_packet().unwrap().unwrap()).unwrap();
        assert!(!packet.is_encrypted());
    }

    #[test]
    fn test_build_slices_large_bodies() {
        let request = Request::new("big", 0x0A, 0x01, ResponseKind::Ack, |_| {
            Ok(Tlv::new().put_bytes(0x01, vec![0xAB; 100]))
        });
        let built = request.build(&ctx(20), None).unwrap();
        assert!(built.frames.len() > 1);
    }

    #[test]
    fn test_body_failure_is_creation_error() {
        let request = Request::new("broken", 0x01, 0x01, ResponseKind::Ack, |_| {
            Err(PacketError::invalid_format("no body"))
        });
        assert_eq!(
            request.build(&ctx(244), None).unwrap_err(),
            RequestError::Creation(PacketError::invalid_format("no body"))
        );
    }

    #[test]
    fn test_completion_once() {
        let (completer, mut handle): (Completer<Response, RequestError>, RequestHandle) =
            completion();
        assert!(handle.try_result().is_none());
        completer.complete(Ok(Response::Ack));
        assert_eq!(handle.try_result(), Some(Ok(Response::Ack)));
        assert_eq!(handle.try_result(), Some(Err(RequestError::SessionClosed)));
    }

    #[test]
    fn test_dropped_completer_reads_closed() {
        let (completer, mut handle): (Completer<Response, RequestError>, RequestHandle) =
            completion();
        drop(completer);
        assert_eq!(handle.try_result(), Some(Err(RequestError::SessionClosed)));
    }
}
