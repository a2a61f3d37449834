//! Async driver for a [`DeviceSession`].
//!
//! The driver owns the session in a spawned task. Submissions arrive over a
//! command channel, inbound link bytes over a byte channel, and timeouts are
//! polled on an interval. Unsolicited packets are forwarded to the receiver
//! returned by [`SessionDriver::spawn`], and every state change is published
//! on [`SessionDriver::state`]. Dropping every inbound sender or calling
//! [`SessionDriver::shutdown`] closes the session.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use wearlink_packet::Packet;

use crate::{
    DeviceSession, HandshakeError, HandshakeHandle, KeyAgreement, Request, RequestError,
    RequestHandle, Response, SessionParams, SessionState, TransactionBuilder, Transport,
};

enum Command {
    Handshake(Box<dyn KeyAgreement>, oneshot::Sender<HandshakeHandle>),
    Submit(Request, oneshot::Sender<RequestHandle>),
    Post(Request),
    Transaction(TransactionBuilder, oneshot::Sender<Vec<RequestHandle>>),
    Shutdown,
}

/// Handle to a session running in its own task.
#[derive(Debug)]
pub struct SessionDriver {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionDriver {
    /// Spawn the session task on the current runtime.
    pub fn spawn<T: Transport + 'static>(
        session: DeviceSession<T>,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(session.state());
        let task = tokio::spawn(run_session(
            session,
            command_rx,
            inbound,
            unsolicited_tx,
            state_tx,
        ));
        (
            SessionDriver {
                commands,
                state,
                task,
            },
            unsolicited_rx,
        )
    }

    /// Watch the session state. The last value is `Closed` once the task ends.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// A cloneable handle for fire-and-forget submissions.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands.clone(),
        }
    }

    /// Run the handshake and wait for it to finish.
    pub async fn handshake(
        &self,
        agreement: impl KeyAgreement + 'static,
    ) -> Result<SessionParams, HandshakeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Handshake(Box::new(agreement), reply))
            .map_err(|_| HandshakeError::SessionClosed)?;
        let handle = rx.await.map_err(|_| HandshakeError::SessionClosed)?;
        handle.wait().await
    }

    /// Submit a request and wait for its response.
    pub async fn request(&self, request: Request) -> Result<Response, RequestError> {
        self.submit(request).await?.wait().await
    }

    /// Submit a request and return its handle once it is enqueued.
    pub async fn submit(&self, request: Request) -> Result<RequestHandle, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit(request, reply))
            .map_err(|_| RequestError::SessionClosed)?;
        rx.await.map_err(|_| RequestError::SessionClosed)
    }

    /// Queue a transaction and wait for all of its responses.
    pub async fn transaction(
        &self,
        transaction: TransactionBuilder,
    ) -> Vec<Result<Response, RequestError>> {
        let count = transaction.len();
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Transaction(transaction, reply))
            .is_err()
        {
            return vec![Err(RequestError::SessionClosed); count];
        }
        let Ok(handles) = rx.await else {
            return vec![Err(RequestError::SessionClosed); count];
        };
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.wait().await);
        }
        results
    }

    /// Close the session and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            debug!("SessionDriver: task ended abnormally: {}", e);
        }
    }
}

/// Submits requests to a driven session without waiting on them.
///
/// Requests go through the session queue like any other, so they are
/// rejected until the handshake completes and encrypted afterwards. Failures
/// are logged by the session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Hand a request to the session task.
    ///
    /// Fails only when the session task has ended.
    pub fn post(&self, request: Request) -> Result<(), RequestError> {
        self.commands
            .send(Command::Post(request))
            .map_err(|_| RequestError::SessionClosed)
    }
}

async fn run_session<T: Transport>(
    mut session: DeviceSession<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
    unsolicited: mpsc::UnboundedSender<Packet>,
    states: watch::Sender<SessionState>,
) {
    let mut ticker = tokio::time::interval(session.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut posted: Vec<(&'static str, RequestHandle)> = Vec::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Handshake(agreement, reply)) => {
                    let _ = reply.send(session.start_handshake(agreement));
                }
                Some(Command::Submit(request, reply)) => {
                    let _ = reply.send(session.submit(request));
                }
                Some(Command::Post(request)) => {
                    let name = request.name();
                    posted.push((name, session.submit(request)));
                }
                Some(Command::Transaction(transaction, reply)) => {
                    let _ = reply.send(transaction.queue(&mut session));
                }
                Some(Command::Shutdown) | None => break,
            },
            data = inbound.recv() => match data {
                Some(bytes) => {
                    for packet in session.on_receive(&bytes) {
                        // Nobody listening for unsolicited traffic is fine.
                        let _ = unsolicited.send(packet);
                    }
                }
                None => {
                    debug!("SessionDriver[{}]: link closed", session.labels().device);
                    break;
                }
            },
            _ = ticker.tick() => {
                session.poll_timeouts(Instant::now());
            }
        }

        reap_posted(&mut posted, session.labels().device.as_str());
        let now = session.state();
        states.send_if_modified(|state| {
            let changed = *state != now;
            *state = now;
            changed
        });
    }

    session.disconnect();
    reap_posted(&mut posted, session.labels().device.as_str());
    states.send_replace(session.state());
}

/// Drop resolved fire-and-forget requests, logging the failed ones.
fn reap_posted(posted: &mut Vec<(&'static str, RequestHandle)>, device: &str) {
    posted.retain_mut(|(name, handle)| match handle.try_result() {
        None => true,
        Some(Ok(_)) => false,
        Some(Err(e)) => {
            warn!("SessionDriver[{}]: {} failed: {}", device, name, e);
            false
        }
    });
}
