//! Device session: request queue and response matching.
//!
//! A [`DeviceSession`] is sans-IO. Frames go out through a [`Transport`];
//! inbound bytes are fed to [`DeviceSession::on_receive`] and timeouts are
//! driven by [`DeviceSession::poll_timeouts`]. The async
//! [`SessionDriver`](crate::SessionDriver) wires these to tokio.
//!
//! ## Ordering
//!
//! Ordinary requests are strict FIFO: the queue head is written and the next
//! request waits until the head resolves. Self-queued requests are written at
//! once and matched on their own. Inbound packets are matched on
//! (service, command) against self-queued requests first, then the head;
//! anything else is returned to the caller as unsolicited.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};
use wearlink_common::EngineConfig;
use wearlink_metrics::{metric_defs, SessionLabels};
use wearlink_packet::{CryptoError, Packet, PacketError, SessionKey, SliceReassembler};

use crate::commands::device_config::LinkParams;
use crate::handshake::{Handshake, HandshakeStep};
use crate::request::{completion, BuiltRequest, Completer};
use crate::{
    BuildContext, Expect, Request, RequestError, RequestHandle, RequestState, Response,
    Transport, TransportError,
};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not started.
    Disconnected,
    Handshaking,
    /// Handshake complete; ordinary requests accepted.
    Ready,
    /// Handshake failed. Reconnect with a new session.
    Failed,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Parameters negotiated by the handshake. Read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// What the device offered.
    pub link: LinkParams,
    /// Our nonce for this session.
    pub client_nonce: Vec<u8>,
}

impl SessionParams {
    pub fn protocol_version(&self) -> u8 {
        self.link.protocol_version
    }

    pub fn auth_mode(&self) -> u8 {
        self.link.auth_mode
    }

    pub fn auth_version(&self) -> u16 {
        self.link.auth_version
    }

    pub fn slice_size(&self) -> usize {
        self.link.slice_size as usize
    }

    pub fn mtu(&self) -> u16 {
        self.link.mtu
    }

    pub fn bond_state(&self) -> u8 {
        self.link.bond_state
    }
}

/// Who is waiting for a request to resolve.
#[derive(Debug)]
pub(crate) enum Waiter {
    Request(Completer<Response, RequestError>),
    Handshake(HandshakeStep),
}

#[derive(Debug)]
pub(crate) struct Pending {
    built: BuiltRequest,
    waiter: Waiter,
    state: RequestState,
    sent_at: Option<Instant>,
    timeout: Duration,
}

impl Pending {
    fn expired(&self, now: Instant) -> bool {
        self.sent_at
            .is_some_and(|sent| now.saturating_duration_since(sent) >= self.timeout)
    }
}

/// One live connection to a device.
pub struct DeviceSession<T: Transport> {
    transport: T,
    pub(crate) config: EngineConfig,
    pub(crate) labels: SessionLabels,
    pub(crate) state: SessionState,
    pub(crate) params: Option<SessionParams>,
    pub(crate) key: Option<SessionKey>,
    pub(crate) handshake: Option<Handshake>,
    reassembler: SliceReassembler,
    queue: VecDeque<Pending>,
    head: Option<Pending>,
    self_queued: Vec<Pending>,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        let reassembler = SliceReassembler::new(config.reassembly_limit);
        DeviceSession {
            transport,
            config,
            labels: SessionLabels::default(),
            state: SessionState::Disconnected,
            params: None,
            key: None,
            handshake: None,
            reassembler,
            queue: VecDeque::new(),
            head: None,
            self_queued: Vec::new(),
        }
    }

    /// Set the labels used in logs and metrics.
    pub fn with_labels(mut self, labels: SessionLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Negotiated parameters, once the handshake has completed.
    pub fn params(&self) -> Option<&SessionParams> {
        self.params.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn labels(&self) -> &SessionLabels {
        &self.labels
    }

    /// Requests waiting behind the head.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Requests written and awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.head.is_some() as usize + self.self_queued.len()
    }

    /// (service, command) and state of the queue head.
    pub fn head(&self) -> Option<((u8, u8), RequestState)> {
        self.head.as_ref().map(|p| (p.built.key, p.state))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Build and enqueue one request.
    ///
    /// Failures are reported through the returned handle, never here.
    pub fn submit(&mut self, request: Request) -> RequestHandle {
        let (completer, handle) = completion();
        if let Err(e) = self.check_accepting() {
            debug!(
                "DeviceSession[{}]: rejecting {}: {}",
                self.labels.device,
                request.name(),
                e
            );
            completer.complete(Err(e));
            return handle;
        }
        match self.build(request) {
            Ok(built) => {
                let timeout = self.config.response_timeout();
                self.enqueue(built, Waiter::Request(completer), timeout);
            }
            Err(e) => self.fail_unsent(completer, e),
        }
        handle
    }

    /// Build every request, then enqueue all of them or none.
    pub(crate) fn submit_batch(&mut self, name: &str, requests: Vec<Request>) -> Vec<RequestHandle> {
        let mut completers = Vec::with_capacity(requests.len());
        let mut handles = Vec::with_capacity(requests.len());
        for _ in 0..requests.len() {
            let (completer, handle) = completion();
            completers.push(completer);
            handles.push(handle);
        }

        if let Err(e) = self.check_accepting() {
            for completer in completers {
                self.fail_unsent(completer, e.clone());
            }
            return handles;
        }

        let built: Vec<Result<BuiltRequest, RequestError>> =
            requests.into_iter().map(|r| self.build(r)).collect();

        if built.iter().any(Result::is_err) {
            warn!(
                "DeviceSession[{}]: transaction {} aborted, a request failed to build",
                self.labels.device, name
            );
            for (completer, result) in completers.into_iter().zip(built) {
                let err = match result {
                    Ok(_) => RequestError::BatchAborted,
                    Err(e) => e,
                };
                self.fail_unsent(completer, err);
            }
            return handles;
        }

        debug!(
            "DeviceSession[{}]: queueing transaction {} ({} requests)",
            self.labels.device,
            name,
            handles.len()
        );
        let timeout = self.config.response_timeout();
        for (completer, built) in completers.into_iter().zip(built.into_iter().flatten()) {
            self.enqueue(built, Waiter::Request(completer), timeout);
        }
        handles
    }

    fn check_accepting(&self) -> Result<(), RequestError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(RequestError::SessionClosed),
            _ => Err(RequestError::NotReady),
        }
    }

    pub(crate) fn build(&self, request: Request) -> Result<BuiltRequest, RequestError> {
        let ctx = BuildContext {
            slice_size: self
                .params
                .as_ref()
                .map(SessionParams::slice_size)
                .unwrap_or(self.config.default_slice_size),
            params: self.params.as_ref(),
        };
        let name = request.name();
        request.build(&ctx, self.key.as_ref()).inspect_err(|e| {
            warn!(
                "DeviceSession[{}]: failed to create {}: {}",
                self.labels.device, name, e
            );
        })
    }

    fn fail_unsent(&self, completer: Completer<Response, RequestError>, err: RequestError) {
        metrics::counter!(
            metric_defs::REQUEST_FAILED.name,
            &self.labels.with(&[("reason", err.reason().to_string())])
        )
        .increment(1);
        completer.complete(Err(err));
    }

    pub(crate) fn enqueue(&mut self, built: BuiltRequest, waiter: Waiter, timeout: Duration) {
        let pending = Pending {
            built,
            waiter,
            state: RequestState::Built,
            sent_at: None,
            timeout,
        };
        if pending.built.self_queue {
            trace!(
                "DeviceSession[{}]: dispatching self-queued {}",
                self.labels.device,
                pending.built.name
            );
            self.dispatch(pending);
        } else {
            self.queue.push_back(Pending {
                state: RequestState::Enqueued,
                ..pending
            });
            self.dispatch_next();
        }
        self.record_queue_depth();
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Write queued requests until one is waiting for a response.
    fn dispatch_next(&mut self) {
        while self.head.is_none() {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            self.dispatch(pending);
        }
        self.record_queue_depth();
    }

    /// Write one request and park it where its response will be matched.
    fn dispatch(&mut self, mut pending: Pending) {
        if let Err(e) = self.write(&mut pending) {
            self.finish(pending, Err(e.into()));
            return;
        }
        if pending.built.expect == Expect::Nothing {
            self.finish(pending, Ok(Response::Written));
            return;
        }
        pending.state = RequestState::AwaitingResponse;
        if pending.built.self_queue {
            self.self_queued.push(pending);
        } else {
            self.head = Some(pending);
        }
    }

    fn write(&mut self, pending: &mut Pending) -> Result<(), TransportError> {
        let labels = self.labels.to_labels();
        for frame in &pending.built.frames {
            self.transport.send(frame).inspect_err(|e| {
                warn!(
                    "DeviceSession[{}]: write of {} failed: {}",
                    self.labels.device, pending.built.name, e
                );
            })?;
            metrics::counter!(metric_defs::LINK_FRAMES_TX.name, &labels).increment(1);
            metrics::counter!(metric_defs::LINK_BYTES_TX.name, &labels)
                .increment(frame.len() as u64);
        }
        let (service, command) = pending.built.key;
        metrics::counter!(
            metric_defs::REQUEST_SENT.name,
            &self.labels.with(&[
                ("service", format!("{:02x}", service)),
                ("command", format!("{:02x}", command)),
            ])
        )
        .increment(1);
        debug!(
            "DeviceSession[{}]: sent {} ({:02X}/{:02X}, {} frames)",
            self.labels.device,
            pending.built.name,
            service,
            command,
            pending.built.frames.len()
        );
        pending.state = RequestState::Sent;
        pending.sent_at = Some(Instant::now());
        Ok(())
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Feed inbound transport bytes.
    ///
    /// Returns packets that matched no outstanding request. Malformed input
    /// is logged and dropped.
    pub fn on_receive(&mut self, data: &[u8]) -> Vec<Packet> {
        let labels = self.labels.to_labels();
        metrics::counter!(metric_defs::LINK_BYTES_RX.name, &labels).increment(data.len() as u64);

        self.reassembler.push(data);
        let mut unsolicited = Vec::new();
        while let Some(result) = self.reassembler.next_packet() {
            let packet = match result.and_then(|bytes| Packet::decode(&bytes)) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("DeviceSession[{}]: dropping inbound data: {}", self.labels.device, e);
                    metrics::counter!(metric_defs::LINK_RX_ERRORS.name, &labels).increment(1);
                    continue;
                }
            };
            trace!("DeviceSession[{}]: received {}", self.labels.device, packet);
            if let Some(packet) = self.route(packet) {
                unsolicited.push(packet);
            }
        }
        unsolicited
    }

    fn route(&mut self, packet: Packet) -> Option<Packet> {
        let key = packet.key();

        if let Some(index) = self.self_queued.iter().position(|p| p.built.key == key) {
            let pending = self.self_queued.remove(index);
            self.resolve(pending, packet);
            return None;
        }

        if self.head.as_ref().is_some_and(|p| p.built.key == key) {
            if let Some(pending) = self.head.take() {
                self.resolve(pending, packet);
            }
            self.dispatch_next();
            return None;
        }

        let labels = self.labels.to_labels();
        match packet.decrypt(self.key.as_ref()) {
            Ok(packet) => {
                debug!("DeviceSession[{}]: unsolicited {}", self.labels.device, packet);
                metrics::counter!(metric_defs::LINK_UNSOLICITED.name, &labels).increment(1);
                Some(packet)
            }
            Err(e) => {
                warn!(
                    "DeviceSession[{}]: cannot decrypt unsolicited packet: {}",
                    self.labels.device, e
                );
                metrics::counter!(metric_defs::LINK_RX_ERRORS.name, &labels).increment(1);
                None
            }
        }
    }

    fn resolve(&mut self, pending: Pending, packet: Packet) {
        let result = match packet.decrypt(self.key.as_ref()) {
            Ok(packet) => {
                let response = Response::decode(packet);
                match pending.built.expect {
                    Expect::Kind(kind) => response.expect(kind),
                    Expect::Any | Expect::Nothing => Ok(response),
                }
            }
            Err(PacketError::Crypto(e)) => Err(RequestError::Crypto(e)),
            Err(e) => Err(RequestError::Crypto(CryptoError::Decrypt(e.to_string()))),
        };
        self.finish(pending, result);
    }

    /// Resolve a request exactly once.
    fn finish(&mut self, mut pending: Pending, result: Result<Response, RequestError>) {
        match &result {
            Ok(_) => {
                pending.state = RequestState::Completed;
                let labels = self.labels.to_labels();
                metrics::counter!(metric_defs::REQUEST_COMPLETED.name, &labels).increment(1);
                if let Some(sent) = pending.sent_at {
                    metrics::histogram!(metric_defs::REQUEST_LATENCY.name, &labels)
                        .record(sent.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                pending.state = RequestState::Failed;
                warn!(
                    "DeviceSession[{}]: {} failed: {}",
                    self.labels.device, pending.built.name, e
                );
                metrics::counter!(
                    metric_defs::REQUEST_FAILED.name,
                    &self.labels.with(&[("reason", e.reason().to_string())])
                )
                .increment(1);
            }
        }
        trace!(
            "DeviceSession[{}]: {} is {:?}",
            self.labels.device,
            pending.built.name,
            pending.state
        );

        match pending.waiter {
            Waiter::Request(completer) => completer.complete(result),
            Waiter::Handshake(step) => self.on_handshake_step(step, result),
        }
    }

    // ========================================================================
    // Timeouts and Shutdown
    // ========================================================================

    /// Fail every request whose response window has passed.
    ///
    /// Returns the number of requests that timed out. There is no retry.
    pub fn poll_timeouts(&mut self, now: Instant) -> usize {
        let (expired, waiting): (Vec<Pending>, Vec<Pending>) = self
            .self_queued
            .drain(..)
            .partition(|p| p.expired(now));
        self.self_queued = waiting;

        let mut expired = expired;
        if self.head.as_ref().is_some_and(|p| p.expired(now)) {
            expired.extend(self.head.take());
        }

        let count = expired.len();
        for pending in expired {
            self.finish(pending, Err(RequestError::Timeout));
        }
        if count > 0 {
            self.dispatch_next();
        }
        count
    }

    /// Earliest instant at which [`poll_timeouts`](Self::poll_timeouts) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.head
            .iter()
            .chain(&self.self_queued)
            .filter_map(|p| p.sent_at.map(|sent| sent + p.timeout))
            .min()
    }

    /// Close the session.
    ///
    /// Every outstanding request fails with
    /// [`SessionClosed`](RequestError::SessionClosed) and a running
    /// handshake is aborted.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!("DeviceSession[{}]: disconnecting", self.labels.device);

        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
        self.state = SessionState::Closed;

        let outstanding: Vec<Pending> = self
            .head
            .take()
            .into_iter()
            .chain(self.self_queued.drain(..))
            .chain(self.queue.drain(..))
            .collect();
        for pending in outstanding {
            self.finish(pending, Err(RequestError::SessionClosed));
        }
        self.reassembler.reset();
        self.key = None;
        self.record_queue_depth();
    }

    /// Drop handshake requests still waiting for a response.
    pub(crate) fn drop_handshake_requests(&mut self) {
        self.self_queued
            .retain(|p| !matches!(p.waiter, Waiter::Handshake(_)));
    }

    pub(crate) fn reset_link(&mut self) {
        self.reassembler.reset();
    }

    fn record_queue_depth(&self) {
        metrics::gauge!(metric_defs::REQUEST_QUEUE_DEPTH.name, &self.labels.to_labels())
            .set(self.queue.len() as f64);
    }

    /// Install a ready session without a handshake.
    #[cfg(test)]
    pub(crate) fn force_ready(&mut self, params: Option<SessionParams>, key: Option<SessionKey>) {
        self.params = params;
        self.key = key;
        self.state = SessionState::Ready;
    }
}

impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
