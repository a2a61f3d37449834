//! Routes one logical command channel across the registered services.

use tracing::{debug, trace, warn};
use wearlink_common::{keys, MemoryPreferences, Preferences};
use wearlink_engine::SessionState;
use wearlink_metrics::{metric_defs, SessionLabels};

use crate::channel::CommandChannel;
use crate::envelope::{Command, EnvelopeCodec};
use crate::error::{EnvelopeError, MuxError};
use crate::registry::ServiceRegistry;
use crate::service::{Clock, Service, ServiceContext, SystemClock};
use crate::telemetry::{DeviceEvent, NullSink, TelemetrySink};

/// Outcome of one inbound dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A service took the command.
    Handled {
        command_type: u8,
        subtype: u8,
        service: &'static str,
    },
    /// The service could not process the command.
    Failed {
        command_type: u8,
        subtype: u8,
        error: MuxError,
    },
    /// No service is registered for this type.
    UnknownType(u8),
    /// The bytes were not a valid envelope.
    Malformed(EnvelopeError),
}

/// Command multiplexer for one device connection.
///
/// Inbound envelopes are routed by command type. Everything sent (directly or
/// queued by a service callback) goes out on one channel in call order.
pub struct CommandMultiplexer<C, E> {
    registry: ServiceRegistry,
    codec: E,
    channel: C,
    prefs: Box<dyn Preferences>,
    clock: Box<dyn Clock>,
    sink: Box<dyn TelemetrySink>,
    labels: SessionLabels,
    session_ready: bool,
    initialized: bool,
    events: Vec<DeviceEvent>,
}

impl<C: CommandChannel, E: EnvelopeCodec> CommandMultiplexer<C, E> {
    pub fn new(registry: ServiceRegistry, codec: E, channel: C) -> Self {
        Self {
            registry,
            codec,
            channel,
            prefs: Box::new(MemoryPreferences::new()),
            clock: Box::new(SystemClock),
            sink: Box::new(NullSink),
            labels: SessionLabels::default(),
            session_ready: false,
            initialized: false,
            events: Vec::new(),
        }
    }

    pub fn with_preferences(mut self, prefs: impl Preferences + 'static) -> Self {
        self.prefs = Box::new(prefs);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_labels(mut self, labels: SessionLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Replace the preference store. Follow with
    /// [`on_send_configuration`](Self::on_send_configuration) for each
    /// changed key.
    pub fn set_preferences(&mut self, prefs: impl Preferences + 'static) {
        self.prefs = Box::new(prefs);
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn labels(&self) -> &SessionLabels {
        &self.labels
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_session_ready(&self) -> bool {
        self.session_ready
    }

    /// Follow the state of the session carrying the channel.
    ///
    /// Only `Ready` allows traffic. Leaving it lets the next connection
    /// initialize again. Returns whether the session is ready.
    pub fn on_session_state(&mut self, state: SessionState) -> bool {
        let ready = state == SessionState::Ready;
        if self.session_ready != ready {
            debug!(
                "CommandMultiplexer[{}]: session {}",
                self.labels.device, state
            );
        }
        self.session_ready = ready;
        if !ready {
            self.initialized = false;
        }
        ready
    }

    /// Events raised by services since the last drain.
    pub fn drain_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize every service once, in registry order.
    ///
    /// When [`keys::DATETIME_SYNC_ON_CONNECT`] is set (the default) the time
    /// is synced first, so later services can rely on it. A failed write
    /// leaves the multiplexer uninitialized, so the call can be retried.
    pub fn initialize(&mut self) -> Result<(), MuxError> {
        if !self.session_ready {
            return Err(MuxError::NotReady);
        }
        if self.initialized {
            return Err(MuxError::AlreadyInitialized);
        }
        debug!(
            "CommandMultiplexer[{}]: initializing {} services",
            self.labels.device,
            self.registry.len()
        );

        if self.prefs.get_bool(keys::DATETIME_SYNC_ON_CONNECT, true) {
            self.broadcast_time()?;
        }
        for index in 0..self.registry.services.len() {
            self.run(index, |service, ctx| service.initialize(ctx))?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Push the host time to every service that cares.
    pub fn set_time(&mut self) -> Result<(), MuxError> {
        if !self.session_ready {
            return Err(MuxError::NotReady);
        }
        self.broadcast_time()
    }

    fn broadcast_time(&mut self) -> Result<(), MuxError> {
        for index in 0..self.registry.services.len() {
            self.run(index, |service, ctx| service.on_set_time(ctx))?;
        }
        Ok(())
    }

    /// Offer a changed preference to each service; the first claimant wins.
    pub fn on_send_configuration(&mut self, key: &str) -> Result<bool, MuxError> {
        if !self.session_ready {
            return Err(MuxError::NotReady);
        }
        for index in 0..self.registry.services.len() {
            if self.run(index, |service, ctx| service.on_send_configuration(key, ctx))? {
                trace!(
                    "CommandMultiplexer[{}]: {} handled config {}",
                    self.labels.device,
                    self.registry.services[index].name(),
                    key
                );
                return Ok(true);
            }
        }
        warn!(
            "CommandMultiplexer[{}]: unhandled config {}",
            self.labels.device, key
        );
        Ok(false)
    }

    /// Run a host-side operation on the registered service of type `S`.
    pub fn invoke<S: Service, R>(
        &mut self,
        f: impl FnOnce(&mut S, &mut ServiceContext<'_>) -> R,
    ) -> Result<R, MuxError> {
        let index = self
            .registry
            .services
            .iter_mut()
            .position(|s| s.as_any_mut().is::<S>())
            .ok_or(MuxError::ServiceNotRegistered(std::any::type_name::<S>()))?;
        let result = self.run(index, |service, ctx| {
            service
                .as_any_mut()
                .downcast_mut::<S>()
                .map(|service| f(service, ctx))
        })?;
        result.ok_or(MuxError::ServiceNotRegistered(std::any::type_name::<S>()))
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Decode one envelope and hand it to its service.
    ///
    /// Never fails: unknown types and malformed envelopes are logged and
    /// dropped, and the channel stays usable.
    pub fn dispatch_inbound(&mut self, bytes: &[u8]) -> Dispatch {
        let command = match self.codec.decode(bytes) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    "CommandMultiplexer[{}]: malformed envelope ({} bytes): {}",
                    self.labels.device,
                    bytes.len(),
                    e
                );
                self.count_dropped("malformed");
                return Dispatch::Malformed(e);
            }
        };

        let Some(index) = self.registry.position(command.command_type) else {
            warn!(
                "CommandMultiplexer[{}]: unexpected command type {} (subtype {})",
                self.labels.device, command.command_type, command.subtype
            );
            self.count_dropped("unknown_type");
            return Dispatch::UnknownType(command.command_type);
        };

        let service = self.registry.services[index].name();
        trace!(
            "CommandMultiplexer[{}]: {} <- subtype {} ({})",
            self.labels.device,
            service,
            command.subtype,
            hex::encode(&command.payload)
        );
        metrics::counter!(
            metric_defs::MUX_INBOUND.name,
            &self.labels.with(&[("service", service.to_string())])
        )
        .increment(1);

        let outcome = self.run(index, |handler, ctx| handler.handle_command(&command, ctx));
        match outcome.and_then(|handled| handled) {
            Ok(()) => Dispatch::Handled {
                command_type: command.command_type,
                subtype: command.subtype,
                service,
            },
            Err(error) => {
                warn!(
                    "CommandMultiplexer[{}]: {} failed on subtype {}: {}",
                    self.labels.device, service, command.subtype, error
                );
                Dispatch::Failed {
                    command_type: command.command_type,
                    subtype: command.subtype,
                    error,
                }
            }
        }
    }

    /// Encode and write one command.
    pub fn dispatch_outbound(
        &mut self,
        command_type: u8,
        subtype: u8,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), MuxError> {
        self.write(&Command::new(command_type, subtype, payload))
    }

    fn write(&mut self, command: &Command) -> Result<(), MuxError> {
        let bytes = self.codec.encode(command)?;
        trace!(
            "CommandMultiplexer[{}]: -> {}/{} ({} bytes)",
            self.labels.device,
            command.command_type,
            command.subtype,
            bytes.len()
        );
        self.channel.write(bytes)?;
        metrics::counter!(metric_defs::MUX_OUTBOUND.name, &self.labels.to_labels()).increment(1);
        Ok(())
    }

    fn count_dropped(&self, reason: &str) {
        metrics::counter!(
            metric_defs::MUX_DROPPED.name,
            &self.labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
    }

    /// Run one service callback, then flush what it queued.
    fn run<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn Service, &mut ServiceContext<'_>) -> R,
    ) -> Result<R, MuxError> {
        let mut ctx = ServiceContext::new(
            self.prefs.as_ref(),
            self.clock.as_ref(),
            self.sink.as_mut(),
            &self.labels,
        );
        let result = f(self.registry.services[index].as_mut(), &mut ctx);
        let (outbox, events) = ctx.into_parts();
        self.events.extend(events);
        for command in &outbox {
            self.write(command)?;
        }
        Ok(result)
    }
}
