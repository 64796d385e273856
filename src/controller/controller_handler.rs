use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::assistant::gemini_client::GeminiAssistant;
use crate::assistant::types::Assistant;
use crate::beverage::BeverageKind;
use crate::configuration::config::Config;
use crate::configuration::types::TransportKind;
use crate::error_handling::types::*;
use crate::network::broadcast_bus::{self, BusPublisher, BusSubscription, LocalChannel};
use crate::network::types::{BusMessage, PeerId};
use crate::network::udp_channel::UdpChannel;
use crate::presence::clock::{Clock, SystemClock};
use crate::presence::peer_tracker::PeerPresenceTracker;
use crate::session_management::chat::ChatMessage;
use crate::session_management::session::{Session, SessionSummary};
use crate::session_management::session_controller::SessionController;
use crate::session_management::SessionEvent;
use crate::storage::counter_store::PersistedCounterStore;
use crate::storage::file_storage::FileStorage;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::CounterStorage;
use crate::storage::types::LifetimeStats;

/// User intents accepted by a running controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetDuration(u32),
    Start(BeverageKind),
    Sip,
    Exit,
    Restart,
    Chat(String),
    Shutdown,
}

/// Everything a front end needs to render the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub session: Session,
    pub selected_duration: u32,
    pub max_sips: u32,
    pub stats: LifetimeStats,
    pub transcript: Vec<ChatMessage>,
    pub summary: Option<SessionSummary>,
}

/// The structure driving one instance.
///
/// # Fields Overview
///
/// - `config`: validated runtime configuration
/// - `sessions`: session state machine, owner of the counter store and publisher
/// - `tracker`: liveness of this instance and its peers
/// - `subscription`: inbound side of the broadcast bus
/// - `online_rx`: live count published by `tracker`, mirrored into the stats
/// - `events_rx`: countdown and barista results for `sessions`
/// - `receive_failures`: consecutive bus receive errors
/// - `snapshot_tx`: latest `Snapshot`, republished after every handled input
pub struct Controller {
    config: Config,
    sessions: SessionController,
    tracker: PeerPresenceTracker,
    subscription: BusSubscription,
    online_rx: watch::Receiver<usize>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    receive_failures: u32,
    snapshot_tx: watch::Sender<Snapshot>,
}

/// Consecutive receive errors after which the bus is abandoned.
const MAX_RECEIVE_FAILURES: u32 = 5;

impl Controller {
    /// Builds a controller from configuration.
    ///
    /// Storage, transport and barista failures degrade the instance instead of
    /// aborting it: counters fall back to memory, the bus to a detached pair,
    /// and the chat to an offline notice.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        let self_id = PeerId::generate();
        info!("Starting instance {}", self_id);

        let storage: Arc<dyn CounterStorage> = match FileStorage::new(&config.storage_path) {
            Ok(storage) => {
                debug!("Counter record at {}", storage.record_path().display());
                Arc::new(storage)
            }
            Err(e) => {
                warn!("Counter storage unavailable, counts will not survive restart: {}", e);
                Arc::new(MemoryStorage::new())
            }
        };

        let bus = match config.transport {
            TransportKind::Udp => match UdpChannel::join(&config.channel_dir(), self_id.clone()).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Unable to join channel {}: {}", config.channel_name, e);
                    broadcast_bus::detached(self_id.clone())
                }
            },
            TransportKind::Local => LocalChannel::new().join(self_id.clone()),
        };

        let assistant: Option<Arc<dyn Assistant>> = match GeminiAssistant::new(&config.assistant) {
            Ok(gemini) => Some(Arc::new(gemini)),
            Err(AssistantError::MissingApiKey) => {
                info!("No API key configured, barista stays offline");
                None
            }
            Err(e) => {
                warn!("Barista unavailable: {}", e);
                None
            }
        };

        Ok(Self::with_parts(config, storage, bus, assistant, Arc::new(SystemClock)))
    }

    /// Builds a controller from already constructed collaborators.
    pub fn with_parts(
        config: Config,
        storage: Arc<dyn CounterStorage>,
        bus: (BusPublisher, BusSubscription),
        assistant: Option<Arc<dyn Assistant>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (publisher, subscription) = bus;
        let self_id = publisher.origin().clone();
        let counters = PersistedCounterStore::load(storage);
        let tracker = PeerPresenceTracker::new(self_id, &config.presence, clock);
        let online_rx = tracker.subscribe();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sessions = SessionController::new(
            config.session.clone(),
            counters,
            publisher,
            assistant,
            events_tx,
        );

        let initial = Self::build_snapshot(&sessions);
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            config,
            sessions,
            tracker,
            subscription,
            online_rx,
            events_rx,
            receive_failures: 0,
            snapshot_tx,
        }
    }

    pub fn id(&self) -> &PeerId {
        self.tracker.self_id()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Self::build_snapshot(&self.sessions)
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    pub fn tracker(&self) -> &PeerPresenceTracker {
        &self.tracker
    }

    /// False once the bus subscription has been closed or never opened.
    pub fn is_listening(&self) -> bool {
        !self.subscription.is_detached()
    }

    /// Runs the instance until `Command::Shutdown` arrives or every command
    /// sender is gone.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), ControllerError> {
        info!("[{}] controller running", self.id());
        // The first tick completes immediately, so presence is announced on join.
        let mut heartbeat = tokio::time::interval(self.config.presence.heartbeat_period());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Polled in order: a queued user command wins over a queued expiry,
            // so the last sip of the budget is never lost to the countdown.
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events_rx.recv() => self.sessions.handle_event(event),
                Ok(()) = self.online_rx.changed() => {
                    let online = *self.online_rx.borrow_and_update();
                    self.sessions.counters_mut().set_online_count(online);
                }
                _ = heartbeat.tick() => self.on_heartbeat_tick(),
                message = self.subscription.recv() => match message {
                    Ok(message) => {
                        self.receive_failures = 0;
                        self.handle_bus_message(message);
                    }
                    Err(e) => self.on_receive_error(e),
                },
            }
            self.publish_snapshot();
        }

        self.shutdown();
        Ok(())
    }

    pub fn handle_command(&mut self, command: Command) {
        debug!("[{}] command {:?}", self.id(), command);
        match command {
            Command::SetDuration(secs) => {
                self.sessions.set_duration(secs);
            }
            Command::Start(kind) => {
                self.sessions.start_selected(kind);
            }
            Command::Sip => {
                self.sessions.sip();
            }
            Command::Exit => self.sessions.exit(),
            Command::Restart => {
                self.sessions.restart();
            }
            Command::Chat(text) => {
                self.sessions.send_chat_message(&text);
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    /// Applies a message from a peer. Never touches the local session.
    pub fn handle_bus_message(&mut self, message: BusMessage) {
        match &message {
            BusMessage::Heartbeat { id } => {
                self.tracker.on_heartbeat(id);
            }
            BusMessage::CupFinished { coffee_type } => match message.finished_kind() {
                Some(kind) => {
                    let count = self.sessions.counters_mut().apply_remote_increment(kind);
                    info!("[{}] a peer finished a {}, count is now {}", self.id(), kind, count);
                }
                None => warn!("[{}] ignoring unknown beverage {:?}", self.id(), coffee_type),
            },
        }
    }

    /// Announces this instance and prunes silent peers.
    pub fn on_heartbeat_tick(&mut self) {
        if let Some(heartbeat) = self.tracker.heartbeat() {
            if let Err(e) = self.sessions.publisher().publish(&heartbeat) {
                warn!("[{}] heartbeat not sent: {}", self.id(), e);
            }
        }
        self.tracker.tick();
    }

    /// Gives up on the bus when it is closed or keeps failing. The instance
    /// then only sees itself.
    pub fn on_receive_error(&mut self, error: TransportError) {
        if matches!(error, TransportError::ChannelClosed) {
            warn!("[{}] broadcast channel closed, continuing alone", self.id());
            self.subscription.close();
            return;
        }

        self.receive_failures += 1;
        warn!(
            "[{}] bus receive failed ({}/{}): {}",
            self.id(),
            self.receive_failures,
            MAX_RECEIVE_FAILURES,
            error
        );
        if self.receive_failures >= MAX_RECEIVE_FAILURES {
            error!("[{}] leaving the broadcast channel after repeated failures", self.id());
            self.subscription.close();
        }
    }

    /// Stops presence and leaves the channel. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.tracker.is_torn_down() {
            return;
        }
        info!("[{}] shutting down", self.id());
        self.sessions.shutdown();
        self.tracker.teardown();
        self.subscription.close();
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(Self::build_snapshot(&self.sessions));
    }

    fn build_snapshot(sessions: &SessionController) -> Snapshot {
        Snapshot {
            session: sessions.session().clone(),
            selected_duration: sessions.selected_duration(),
            max_sips: sessions.max_sips(),
            stats: sessions.counters().stats().clone(),
            transcript: sessions.transcript().to_vec(),
            summary: sessions.summary(),
        }
    }
}
