//! Routing, lifecycle and configuration through a full multiplexer.

use std::any::Any;
use std::sync::{Arc, Mutex};

use prost::Message;
use tokio::sync::mpsc;
use wearlink_common::{keys, MemoryPreferences};
use wearlink_engine::SessionState;
use wearlink_mux::services::{
    health, music, notification, system, HealthService, MusicService, SystemService,
};
use wearlink_mux::{
    proto, ChannelWriter, Command, CommandChannel, CommandMultiplexer, DeviceEvent, Dispatch,
    EnvelopeCodec, EnvelopeError, FixedClock, MuxError, ProtobufEnvelope, Service,
    ServiceContext, ServiceRegistry, TaggedEnvelope,
};
use wearlink_record::{encode, monitoring, Record, RecordBuilder};

type Log = Arc<Mutex<Vec<String>>>;

/// Service that records every callback and echoes commands back.
struct Recorder {
    command_type: u8,
    name: &'static str,
    claims: &'static str,
    log: Log,
}

impl Recorder {
    fn new(command_type: u8, name: &'static str, claims: &'static str, log: &Log) -> Self {
        Self {
            command_type,
            name,
            claims,
            log: Arc::clone(log),
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Service for Recorder {
    fn command_type(&self) -> u8 {
        self.command_type
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        self.record(format!("{}:init", self.name));
        ctx.send(self.command_type, 0xF0, Vec::new());
        ctx.send(self.command_type, 0xF1, Vec::new());
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        self.record(format!("{}:cmd:{}", self.name, command.subtype));
        ctx.send(self.command_type, command.subtype, command.payload.clone());
        Ok(())
    }

    fn on_send_configuration(&mut self, key: &str, _ctx: &mut ServiceContext<'_>) -> bool {
        self.record(format!("{}:config:{}", self.name, key));
        key == self.claims
    }

    fn on_set_time(&mut self, _ctx: &mut ServiceContext<'_>) {
        self.record(format!("{}:time", self.name));
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn recorders(log: &Log) -> ServiceRegistry {
    ServiceRegistry::new()
        .register(Recorder::new(0x20, "first", "shared", log))
        .unwrap()
        .register(Recorder::new(0x21, "second", "shared", log))
        .unwrap()
}

/// Channel whose first `failures` writes fail.
struct FlakyChannel {
    failures: usize,
    inner: ChannelWriter,
}

impl CommandChannel for FlakyChannel {
    fn write(&mut self, bytes: Vec<u8>) -> Result<(), MuxError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(MuxError::Channel("link busy".to_string()));
        }
        self.inner.write(bytes)
    }
}

fn entries(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Command> {
    let mut commands = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        commands.push(ProtobufEnvelope.decode(&bytes).unwrap());
    }
    commands
}

fn recording_mux(
    log: &Log,
) -> (
    CommandMultiplexer<ChannelWriter, ProtobufEnvelope>,
    mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let (writer, rx) = ChannelWriter::pair();
    (
        CommandMultiplexer::new(recorders(log), ProtobufEnvelope, writer),
        rx,
    )
}

fn envelope(command_type: u8, subtype: u8, payload: Vec<u8>) -> Vec<u8> {
    ProtobufEnvelope
        .encode(&Command::new(command_type, subtype, payload))
        .unwrap()
}

#[test]
fn test_routes_by_command_type() {
    let log = Log::default();
    let (mut mux, mut rx) = recording_mux(&log);

    let outcome = mux.dispatch_inbound(&envelope(0x21, 7, vec![1, 2]));
    assert_eq!(
        outcome,
        Dispatch::Handled {
            command_type: 0x21,
            subtype: 7,
            service: "second",
        }
    );
    assert_eq!(entries(&log), vec!["second:cmd:7"]);
    assert_eq!(drain(&mut rx), vec![Command::new(0x21, 7, vec![1, 2])]);
}

#[test]
fn test_unknown_type_dropped_channel_stays_usable() {
    let log = Log::default();
    let (mut mux, mut rx) = recording_mux(&log);

    assert_eq!(
        mux.dispatch_inbound(&envelope(0x63, 1, vec![])),
        Dispatch::UnknownType(0x63)
    );
    assert!(entries(&log).is_empty());
    assert!(drain(&mut rx).is_empty());

    assert!(matches!(
        mux.dispatch_inbound(&envelope(0x20, 1, vec![])),
        Dispatch::Handled { .. }
    ));
    assert_eq!(entries(&log), vec!["first:cmd:1"]);
}

#[test]
fn test_malformed_envelope_discarded() {
    let log = Log::default();
    let (mut mux, _rx) = recording_mux(&log);

    assert!(matches!(
        mux.dispatch_inbound(&[0xFF, 0xFF, 0xFF]),
        Dispatch::Malformed(EnvelopeError::Protobuf(_))
    ));
    assert!(matches!(
        mux.dispatch_inbound(&envelope(0x20, 2, vec![])),
        Dispatch::Handled { .. }
    ));
}

#[test]
fn test_initialize_requires_ready_session() {
    let log = Log::default();
    let (mut mux, mut rx) = recording_mux(&log);

    assert_eq!(mux.initialize(), Err(MuxError::NotReady));
    assert!(drain(&mut rx).is_empty());
    assert!(!mux.is_initialized());
}

#[test]
fn test_initialize_once_in_registry_order() {
    let log = Log::default();
    let (mut mux, mut rx) = recording_mux(&log);
    mux.on_session_state(SessionState::Ready);

    mux.initialize().unwrap();
    assert_eq!(
        entries(&log),
        vec!["first:time", "second:time", "first:init", "second:init"]
    );
    let keys: Vec<_> = drain(&mut rx).iter().map(Command::key).collect();
    assert_eq!(keys, vec![(0x20, 0xF0), (0x20, 0xF1), (0x21, 0xF0), (0x21, 0xF1)]);

    assert_eq!(mux.initialize(), Err(MuxError::AlreadyInitialized));

    // A new connection initializes again.
    mux.on_session_state(SessionState::Disconnected);
    mux.on_session_state(SessionState::Ready);
    assert!(mux.initialize().is_ok());
}

#[test]
fn test_initialize_retried_after_failed_write() {
    let log = Log::default();
    let (writer, mut rx) = ChannelWriter::pair();
    let channel = FlakyChannel {
        failures: 1,
        inner: writer,
    };
    let mut mux = CommandMultiplexer::new(recorders(&log), ProtobufEnvelope, channel);
    mux.on_session_state(SessionState::Ready);

    assert!(matches!(mux.initialize(), Err(MuxError::Channel(_))));
    assert!(!mux.is_initialized());
    assert_eq!(entries(&log), vec!["first:time", "second:time", "first:init"]);
    assert!(drain(&mut rx).is_empty());

    mux.initialize().unwrap();
    assert!(mux.is_initialized());
    let keys: Vec<_> = drain(&mut rx).iter().map(Command::key).collect();
    assert_eq!(keys, vec![(0x20, 0xF0), (0x20, 0xF1), (0x21, 0xF0), (0x21, 0xF1)]);
    assert_eq!(mux.initialize(), Err(MuxError::AlreadyInitialized));
}

#[test]
fn test_session_states_gate_traffic() {
    let log = Log::default();
    let (mut mux, mut rx) = recording_mux(&log);

    for state in [
        SessionState::Disconnected,
        SessionState::Handshaking,
        SessionState::Failed,
    ] {
        assert!(!mux.on_session_state(state));
        assert_eq!(mux.initialize(), Err(MuxError::NotReady));
    }
    assert!(drain(&mut rx).is_empty());

    assert!(mux.on_session_state(SessionState::Ready));
    mux.initialize().unwrap();
    assert!(!mux.on_session_state(SessionState::Closed));
    assert!(!mux.is_initialized());
    assert_eq!(mux.set_time(), Err(MuxError::NotReady));
}

#[test]
fn test_time_sync_on_connect_can_be_disabled() {
    let log = Log::default();
    let (mux, _rx) = recording_mux(&log);
    let mut mux = mux.with_preferences(
        MemoryPreferences::new().with(keys::DATETIME_SYNC_ON_CONNECT, false),
    );
    mux.on_session_state(SessionState::Ready);
    mux.initialize().unwrap();
    assert_eq!(entries(&log), vec!["first:init", "second:init"]);
}

#[test]
fn test_first_config_claimant_wins() {
    let log = Log::default();
    let (mut mux, _rx) = recording_mux(&log);
    mux.on_session_state(SessionState::Ready);

    assert_eq!(mux.on_send_configuration("shared"), Ok(true));
    assert_eq!(entries(&log), vec!["first:config:shared"]);

    assert_eq!(mux.on_send_configuration("nobody"), Ok(false));
    assert_eq!(
        entries(&log),
        vec!["first:config:nobody", "second:config:nobody"]
    );
}

#[test]
fn test_outbound_uses_codec_and_keeps_order() {
    let (writer, mut rx) = ChannelWriter::pair();
    let mut mux = CommandMultiplexer::new(ServiceRegistry::new(), TaggedEnvelope, writer);

    mux.dispatch_outbound(2, 3, vec![0xAA]).unwrap();
    mux.dispatch_outbound(7, 0, vec![]).unwrap();

    assert_eq!(rx.try_recv().unwrap(), vec![2, 3, 1, 0, 0xAA]);
    assert_eq!(rx.try_recv().unwrap(), vec![7, 0, 0, 0]);

    drop(rx);
    assert!(matches!(
        mux.dispatch_outbound(1, 1, vec![]),
        Err(MuxError::Channel(_))
    ));
}

#[test]
fn test_standard_services_on_connect() {
    let (writer, mut rx) = ChannelWriter::pair();
    let mut mux = CommandMultiplexer::new(ServiceRegistry::standard().unwrap(), ProtobufEnvelope, writer)
        .with_clock(FixedClock::new(1_700_000_000));
    mux.on_session_state(SessionState::Ready);
    mux.initialize().unwrap();

    let sent = drain(&mut rx);
    // Time goes out before any service initializes.
    assert_eq!(sent[0].key(), (system::COMMAND_TYPE, system::CLOCK));
    let clock: proto::Clock = sent[0].decode_payload().unwrap();
    assert_eq!(clock.unix_seconds, 1_700_000_000);

    let health_config = sent
        .iter()
        .position(|c| c.key() == (health::COMMAND_TYPE, health::HEART_RATE_CONFIG))
        .unwrap();
    let device_info = sent
        .iter()
        .position(|c| c.key() == (system::COMMAND_TYPE, system::DEVICE_INFO))
        .unwrap();
    assert!(health_config < device_info);
}

#[test]
fn test_activity_record_reaches_sink() {
    let (writer, _rx) = ChannelWriter::pair();
    let (records_tx, mut records_rx) = mpsc::unbounded_channel::<Record>();
    let registry = ServiceRegistry::new().register(HealthService::new()).unwrap();
    let mut mux = CommandMultiplexer::new(registry, ProtobufEnvelope, writer).with_sink(records_tx);

    let record = RecordBuilder::new(monitoring::schema())
        .set(monitoring::field::HEART_RATE, 64u8)
        .unwrap()
        .build()
        .unwrap();
    let outcome = mux.dispatch_inbound(&envelope(
        health::COMMAND_TYPE,
        health::ACTIVITY_RECORD,
        encode(&record),
    ));

    assert!(matches!(outcome, Dispatch::Handled { service: "health", .. }));
    let delivered = records_rx.try_recv().unwrap();
    assert_eq!(delivered.unsigned(monitoring::field::HEART_RATE), Some(64));
}

#[test]
fn test_bad_service_payload_reported() {
    let (writer, _rx) = ChannelWriter::pair();
    let registry = ServiceRegistry::new().register(MusicService::new()).unwrap();
    let mut mux = CommandMultiplexer::new(registry, ProtobufEnvelope, writer);

    let outcome = mux.dispatch_inbound(&envelope(music::COMMAND_TYPE, music::MEDIA_KEY, vec![0xFF]));
    assert!(matches!(
        outcome,
        Dispatch::Failed {
            error: MuxError::Envelope(EnvelopeError::Protobuf(_)),
            ..
        }
    ));
}

#[test]
fn test_invoke_and_events() {
    let (writer, mut rx) = ChannelWriter::pair();
    let mut mux = CommandMultiplexer::new(ServiceRegistry::standard().unwrap(), ProtobufEnvelope, writer);

    mux.invoke::<SystemService, _>(|system, ctx| system.find_device(true, ctx))
        .unwrap();
    let sent = drain(&mut rx);
    assert_eq!(sent[0].key(), (system::COMMAND_TYPE, system::FIND_DEVICE));

    let find = proto::Find { start: true }.encode_to_vec();
    mux.dispatch_inbound(&envelope(system::COMMAND_TYPE, system::FIND_PHONE, find));
    assert_eq!(mux.drain_events(), vec![DeviceEvent::FindPhone { start: true }]);
    assert!(mux.drain_events().is_empty());
}

#[test]
fn test_notification_subscription_acknowledged() {
    let (writer, mut rx) = ChannelWriter::pair();
    let mut mux = CommandMultiplexer::new(ServiceRegistry::standard().unwrap(), ProtobufEnvelope, writer);

    let request = proto::NotificationSubscription {
        enable: true,
        flags: 3,
    }
    .encode_to_vec();
    let outcome = mux.dispatch_inbound(&envelope(
        notification::COMMAND_TYPE,
        notification::SUBSCRIPTION,
        request,
    ));

    assert!(matches!(
        outcome,
        Dispatch::Handled {
            service: "notification",
            ..
        }
    ));
    assert_eq!(
        mux.drain_events(),
        vec![DeviceEvent::NotificationSubscription { enabled: true }]
    );
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].key(),
        (notification::COMMAND_TYPE, notification::SUBSCRIPTION)
    );
    let status: proto::SubscriptionStatus = sent[0].decode_payload().unwrap();
    assert_eq!(status.status(), proto::ReplyStatus::Ack);
    assert_eq!(status.result(), proto::SubscriptionResult::Accepted);
    assert!(status.enable);
    assert_eq!(status.flags, 3);
}

#[test]
fn test_invoke_unregistered_service() {
    let (writer, _rx) = ChannelWriter::pair();
    let mut mux = CommandMultiplexer::new(ServiceRegistry::new(), ProtobufEnvelope, writer);
    assert!(matches!(
        mux.invoke::<MusicService, _>(|music, _| music.info().volume),
        Err(MuxError::ServiceNotRegistered(_))
    ));
}
