use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::assistant::types::{Assistant, AssistantRequest};
use crate::beverage::BeverageKind;
use crate::configuration::types::SessionSettings;
use crate::network::broadcast_bus::BusPublisher;
use crate::network::types::BusMessage;
use crate::session_management::chat::{self, ChatMessage};
use crate::session_management::countdown_timer::CountdownTimer;
use crate::session_management::session::{Session, SessionSummary};
use crate::session_management::{FinishReason, SessionEvent, SessionState};
use crate::storage::counter_store::PersistedCounterStore;

pub const OPENING_FALLBACK: &str = "Coffee's ready. (AI Connection Issue)";
pub const OPENING_EMPTY: &str = "Here's your fuel. Enjoy.";
pub const REPLY_EMPTY: &str = "...";
pub const OFFLINE_NOTICE: &str = "Barista is offline: no API key configured.";

/// The break session state machine.
///
/// Owns the single live `Session`, its countdown and chat transcript, and the
/// lifetime counters. Every mutation happens through `&mut self`, so callers
/// serialize user actions, timer events and assistant replies on one task.
///
/// # Fields Overview
///
/// - `settings`: sip budget and duration bounds
/// - `selected_duration`: duration used by the next start, always normalized
/// - `timer`: countdown of the active session, `None` otherwise
/// - `counters`: persisted lifetime counts, shared with remote updates
/// - `publisher`: where `CUP_FINISHED` goes after a completed cup
/// - `assistant`: optional barista, `None` when no key is configured
/// - `events_tx`: loops timer and assistant results back into `handle_event`
pub struct SessionController {
    settings: SessionSettings,
    session: Session,
    selected_duration: u32,
    transcript: Vec<ChatMessage>,
    timer: Option<CountdownTimer>,
    counters: PersistedCounterStore,
    publisher: BusPublisher,
    assistant: Option<Arc<dyn Assistant>>,
    events_tx: UnboundedSender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        counters: PersistedCounterStore,
        publisher: BusPublisher,
        assistant: Option<Arc<dyn Assistant>>,
        events_tx: UnboundedSender<SessionEvent>,
    ) -> Self {
        let selected_duration = settings.normalize_duration(settings.default_duration_secs);
        Self {
            session: Session::idle(selected_duration, 0),
            selected_duration,
            transcript: Vec::new(),
            timer: None,
            counters,
            publisher,
            assistant,
            events_tx,
            settings,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn counters(&self) -> &PersistedCounterStore {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut PersistedCounterStore {
        &mut self.counters
    }

    pub fn publisher(&self) -> &BusPublisher {
        &self.publisher
    }

    pub fn selected_duration(&self) -> u32 {
        self.selected_duration
    }

    pub fn max_sips(&self) -> u32 {
        self.settings.max_sips
    }

    /// Picks the break length for the next session. Ignored unless idle.
    pub fn set_duration(&mut self, secs: u32) -> u32 {
        if self.session.state != SessionState::Idle {
            debug!("Ignoring duration change while {:?}", self.session.state);
            return self.selected_duration;
        }
        self.selected_duration = self.settings.normalize_duration(secs);
        self.session.duration_secs = self.selected_duration;
        self.session.remaining_secs = self.selected_duration;
        self.selected_duration
    }

    /// Starts a break with the currently selected duration.
    pub fn start_selected(&mut self, kind: BeverageKind) -> bool {
        self.start(kind, self.selected_duration)
    }

    /// Idle -> Active. Returns false when a session is already running or ended.
    pub fn start(&mut self, kind: BeverageKind, duration_secs: u32) -> bool {
        if self.session.state != SessionState::Idle {
            debug!("Ignoring start while {:?}", self.session.state);
            return false;
        }

        let duration = self.settings.normalize_duration(duration_secs);
        let epoch = self.session.epoch + 1;
        self.session = Session {
            state: SessionState::Active,
            beverage_kind: Some(kind),
            duration_secs: duration,
            remaining_secs: duration,
            sips_taken: 0,
            finish_reason: None,
            started_at: Some(Utc::now()),
            ended_at: None,
            epoch,
        };
        self.selected_duration = duration;
        self.transcript.clear();
        self.timer = Some(CountdownTimer::start(epoch, duration, self.events_tx.clone()));
        info!("Session {} started: {} for {}s", epoch, kind, duration);

        self.request_opening_line(kind, duration, epoch);
        true
    }

    /// Takes one sip. The last sip of the budget finishes the session.
    pub fn sip(&mut self) -> bool {
        if self.session.state != SessionState::Active {
            debug!("Ignoring sip while {:?}", self.session.state);
            return false;
        }
        self.session.sips_taken = (self.session.sips_taken + 1).min(self.settings.max_sips);
        debug!(
            "Sip {}/{} in session {}",
            self.session.sips_taken, self.settings.max_sips, self.session.epoch
        );
        if self.session.sips_taken >= self.settings.max_sips {
            self.finish(FinishReason::Consumed);
        }
        true
    }

    /// Active -> Ended. A second call is a no-op.
    ///
    /// A consumed cup is counted locally first and then announced on the bus;
    /// a failed publish only loses the remote update.
    pub fn finish(&mut self, reason: FinishReason) {
        if self.session.state != SessionState::Active {
            debug!("Ignoring finish ({:?}) while {:?}", reason, self.session.state);
            return;
        }

        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        self.session.state = SessionState::Ended;
        self.session.finish_reason = Some(reason);
        self.session.ended_at = Some(Utc::now());
        info!("Session {} ended: {:?}", self.session.epoch, reason);

        if !reason.is_completed() {
            return;
        }
        if let Some(kind) = self.session.beverage_kind {
            let total = self.counters.increment(kind);
            info!("{} count is now {}", kind, total);
            if let Err(e) = self.publisher.publish(&BusMessage::cup_finished(kind)) {
                warn!("Unable to announce finished {}: {}", kind, e);
            }
        }
    }

    /// Leaves the running break early.
    pub fn exit(&mut self) {
        self.finish(FinishReason::Exited);
    }

    /// Ended -> Idle. Anything still in flight for the old session is dropped.
    pub fn restart(&mut self) -> bool {
        if self.session.state != SessionState::Ended {
            debug!("Ignoring restart while {:?}", self.session.state);
            return false;
        }
        self.session = Session::idle(self.selected_duration, self.session.epoch + 1);
        info!("Back to the menu");
        true
    }

    /// Appends a user message and asks the barista for a reply.
    ///
    /// Whitespace-only input is ignored and returns false.
    pub fn send_chat_message(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let history = chat::history(&self.transcript);
        self.transcript.push(ChatMessage::from_user(text));

        let (Some(assistant), Some(kind)) = (self.assistant.clone(), self.session.beverage_kind) else {
            debug!("No barista to answer");
            return true;
        };
        let request = AssistantRequest {
            context: AssistantRequest::context_for(
                self.session.duration_secs,
                kind,
                self.counters.stats().total_cups() + 1,
            ),
            message: text.to_string(),
            history,
        };
        let epoch = self.session.epoch;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = assistant.reply(request).await;
            let _ = events.send(SessionEvent::Reply { epoch, result });
        });
        true
    }

    /// Applies a timer tick or assistant result. Events from a replaced
    /// session are discarded.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if event.epoch() != self.session.epoch {
            debug!(
                "Dropping stale event for session {} (current {})",
                event.epoch(),
                self.session.epoch
            );
            return;
        }

        match event {
            SessionEvent::Tick { remaining_secs, .. } => {
                if self.session.state == SessionState::Active {
                    self.session.remaining_secs = remaining_secs.min(self.session.remaining_secs);
                }
            }
            SessionEvent::Expired { .. } => {
                if self.session.state == SessionState::Active {
                    self.session.remaining_secs = 0;
                    self.finish(FinishReason::TimeExpired);
                }
            }
            SessionEvent::OpeningLine { result, .. } => {
                let text = match result {
                    Ok(text) if text.trim().is_empty() => OPENING_EMPTY.to_string(),
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Barista failed to serve: {}", e);
                        OPENING_FALLBACK.to_string()
                    }
                };
                self.transcript.push(ChatMessage::from_barista(text));
            }
            SessionEvent::Reply { result, .. } => match result {
                Ok(text) if text.trim().is_empty() => {
                    self.transcript.push(ChatMessage::from_barista(REPLY_EMPTY))
                }
                Ok(text) => self.transcript.push(ChatMessage::from_barista(text)),
                Err(e) => warn!("Barista reply failed: {}", e),
            },
        }
    }

    /// The finished screen of an ended session.
    pub fn summary(&self) -> Option<SessionSummary> {
        if self.session.state != SessionState::Ended {
            return None;
        }
        let kind = self.session.beverage_kind?;
        let reason = self.session.finish_reason?;
        Some(SessionSummary::new(
            kind,
            reason,
            self.session.sips_taken,
            self.settings.max_sips,
        ))
    }

    /// Stops the countdown without changing session state.
    pub fn shutdown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
    }

    fn request_opening_line(&mut self, kind: BeverageKind, duration: u32, epoch: u64) {
        let Some(assistant) = self.assistant.clone() else {
            self.transcript.push(ChatMessage::from_barista(OFFLINE_NOTICE));
            return;
        };
        let request = AssistantRequest {
            context: AssistantRequest::context_for(duration, kind, self.counters.stats().total_cups() + 1),
            message: AssistantRequest::opening_line(kind),
            history: Vec::new(),
        };
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = assistant.reply(request).await;
            let _ = events.send(SessionEvent::OpeningLine { epoch, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::AssistantError;
    use crate::network::broadcast_bus::{BusSubscription, LocalChannel};
    use crate::network::types::PeerId;
    use crate::storage::memory_storage::MemoryStorage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// Answers from a script, optionally after a delay.
    struct ScriptedBarista {
        replies: Mutex<VecDeque<Result<String, AssistantError>>>,
        requests: Mutex<Vec<AssistantRequest>>,
        delay: Duration,
    }

    impl ScriptedBarista {
        fn new(replies: Vec<Result<String, AssistantError>>) -> Arc<Self> {
            Self::delayed(replies, Duration::ZERO)
        }

        fn delayed(replies: Vec<Result<String, AssistantError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl Assistant for ScriptedBarista {
        async fn reply(&self, request: AssistantRequest) -> Result<String, AssistantError> {
            self.requests.lock().unwrap().push(request);
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::from("ok")));
            tokio::time::sleep(self.delay).await;
            next
        }
    }

    struct Harness {
        controller: SessionController,
        events: UnboundedReceiver<SessionEvent>,
        observer: BusSubscription,
        storage: Arc<MemoryStorage>,
    }

    impl Harness {
        fn new(assistant: Option<Arc<dyn Assistant>>) -> Self {
            Self::with_settings(SessionSettings::default(), assistant)
        }

        fn with_settings(settings: SessionSettings, assistant: Option<Arc<dyn Assistant>>) -> Self {
            let channel = LocalChannel::new();
            let (publisher, _own) = channel.join(PeerId::from("self"));
            let (_other, observer) = channel.join(PeerId::from("observer"));
            let storage = Arc::new(MemoryStorage::new());
            let counters = PersistedCounterStore::load(storage.clone());
            let (tx, events) = mpsc::unbounded_channel();
            Self {
                controller: SessionController::new(settings, counters, publisher, assistant, tx),
                events,
                observer,
                storage,
            }
        }

        /// Feeds the next queued event into the controller.
        async fn pump(&mut self) {
            let event = self.events.recv().await.expect("event channel closed");
            self.controller.handle_event(event);
        }

        async fn pump_until<F: Fn(&SessionController) -> bool>(&mut self, done: F) {
            while !done(&self.controller) {
                self.pump().await;
            }
        }
    }

    fn sip_to_the_bottom(controller: &mut SessionController) {
        for _ in 0..controller.max_sips() {
            controller.sip();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_from_idle() {
        let mut h = Harness::new(None);
        assert!(h.controller.start(BeverageKind::Cappuccino, 120));

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.beverage_kind, Some(BeverageKind::Cappuccino));
        assert_eq!(session.remaining_secs, 120);
        assert_eq!(session.sips_taken, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_ignored() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::Cappuccino, 120);
        assert!(!h.controller.start(BeverageKind::IcedCoffee, 60));
        assert_eq!(h.controller.session().beverage_kind, Some(BeverageKind::Cappuccino));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_normalizes_duration() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::DoubleDouble, 10_000);
        assert_eq!(h.controller.session().duration_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_duration_only_while_idle() {
        let mut h = Harness::new(None);
        assert_eq!(h.controller.set_duration(95), 90);
        h.controller.start_selected(BeverageKind::IcedCoffee);
        assert_eq!(h.controller.session().duration_secs, 90);
        assert_eq!(h.controller.set_duration(240), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sips_complete_and_announce() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::IcedCoffee, 300);
        sip_to_the_bottom(&mut h.controller);

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Ended);
        assert_eq!(session.sips_taken, 30);
        assert!(session.completed());
        assert_eq!(h.controller.counters().count(BeverageKind::IcedCoffee), 1);
        assert_eq!(
            h.storage.raw().unwrap(),
            r#"{"ICED_COFFEE":1,"DOUBLE_DOUBLE":0,"CAPPUCCINO":0}"#
        );

        let message = h.observer.recv().await.unwrap();
        assert_eq!(message.finished_kind(), Some(BeverageKind::IcedCoffee));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sips_after_end_are_ignored() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::IcedCoffee, 300);
        sip_to_the_bottom(&mut h.controller);
        assert!(!h.controller.sip());
        assert_eq!(h.controller.session().sips_taken, 30);
        assert_eq!(h.controller.counters().count(BeverageKind::IcedCoffee), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_does_not_count() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::Cappuccino, 60);
        h.controller.sip();
        h.controller.exit();

        assert_eq!(h.controller.state(), SessionState::Ended);
        assert_eq!(h.controller.session().finish_reason, Some(FinishReason::Exited));
        assert_eq!(h.controller.counters().stats().total_cups(), 0);
        assert!(h.storage.raw().is_none());

        let silent = tokio::time::timeout(Duration::from_secs(1), h.observer.recv()).await;
        assert!(silent.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_is_idempotent() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::Cappuccino, 60);
        sip_to_the_bottom(&mut h.controller);
        h.controller.finish(FinishReason::Consumed);
        h.controller.finish(FinishReason::Exited);

        assert_eq!(h.controller.session().finish_reason, Some(FinishReason::Consumed));
        assert_eq!(h.controller.counters().count(BeverageKind::Cappuccino), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires_without_counting() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::DoubleDouble, 60);
        for _ in 0..5 {
            h.controller.sip();
        }
        h.pump_until(|c| c.state() == SessionState::Ended).await;

        let session = h.controller.session();
        assert_eq!(session.remaining_secs, 0);
        assert_eq!(session.finish_reason, Some(FinishReason::TimeExpired));
        assert_eq!(h.controller.counters().stats().total_cups(), 0);

        let summary = h.controller.summary().unwrap();
        assert_eq!(summary.percent_consumed, 17);
        assert_eq!(summary.headline(), "Break's Over");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_count_down() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::DoubleDouble, 60);
        h.pump().await;
        h.pump().await;
        assert_eq!(h.controller.session().remaining_secs, 58);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_returns_to_idle() {
        let mut h = Harness::new(None);
        assert!(!h.controller.restart());
        h.controller.start(BeverageKind::DoubleDouble, 60);
        h.controller.exit();
        assert!(h.controller.restart());

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.beverage_kind.is_none());
        assert_eq!(session.sips_taken, 0);
        assert!(h.controller.summary().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_timer_cannot_end_new_session() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::DoubleDouble, 60);
        h.controller.exit();
        h.controller.restart();
        h.controller.start(BeverageKind::Cappuccino, 300);

        tokio::time::sleep(Duration::from_millis(61_500)).await;
        while let Ok(event) = h.events.try_recv() {
            h.controller.handle_event(event);
        }
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.session().remaining_secs, 239);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_barista_notice() {
        let mut h = Harness::new(None);
        h.controller.start(BeverageKind::Cappuccino, 60);
        assert_eq!(h.controller.transcript().len(), 1);
        assert_eq!(h.controller.transcript()[0].text, OFFLINE_NOTICE);

        assert!(h.controller.send_chat_message("hello?"));
        assert_eq!(h.controller.transcript().len(), 2);
        assert!(h.controller.transcript()[1].is_user);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_line_and_chat() {
        let barista = ScriptedBarista::new(vec![
            Ok(String::from("Iced and nice.")),
            Ok(String::from("Slow down.")),
        ]);
        let mut h = Harness::new(Some(barista.clone()));
        h.controller.start(BeverageKind::IcedCoffee, 60);
        h.pump_until(|c| !c.transcript().is_empty()).await;
        assert_eq!(h.controller.transcript()[0].text, "Iced and nice.");

        assert!(h.controller.send_chat_message("  another?  "));
        h.pump_until(|c| c.transcript().len() == 3).await;
        assert_eq!(h.controller.transcript()[1].text, "another?");
        assert_eq!(h.controller.transcript()[2].text, "Slow down.");

        let requests = barista.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].context.contains("cup #1 today"));
        assert_eq!(requests[1].message, "another?");
        assert_eq!(requests[1].history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_chat_is_ignored() {
        let barista = ScriptedBarista::new(vec![]);
        let mut h = Harness::new(Some(barista.clone()));
        h.controller.start(BeverageKind::IcedCoffee, 60);
        h.pump_until(|c| !c.transcript().is_empty()).await;

        assert!(!h.controller.send_chat_message("   "));
        assert_eq!(h.controller.transcript().len(), 1);
        assert_eq!(barista.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_line_fallbacks() {
        let barista = ScriptedBarista::new(vec![Err(AssistantError::Timeout)]);
        let mut h = Harness::new(Some(barista));
        h.controller.start(BeverageKind::IcedCoffee, 60);
        h.pump_until(|c| !c.transcript().is_empty()).await;
        assert_eq!(h.controller.transcript()[0].text, OPENING_FALLBACK);

        let barista = ScriptedBarista::new(vec![Ok(String::new())]);
        let mut h = Harness::new(Some(barista));
        h.controller.start(BeverageKind::IcedCoffee, 60);
        h.pump_until(|c| !c.transcript().is_empty()).await;
        assert_eq!(h.controller.transcript()[0].text, OPENING_EMPTY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chat_reply_adds_nothing() {
        let barista = ScriptedBarista::new(vec![
            Ok(String::from("Hi.")),
            Err(AssistantError::Status(500)),
            Ok(String::new()),
        ]);
        let mut h = Harness::new(Some(barista));
        h.controller.start(BeverageKind::Cappuccino, 120);
        h.pump_until(|c| c.transcript().len() == 1).await;

        h.controller.send_chat_message("one");
        h.pump().await;
        assert_eq!(h.controller.transcript().len(), 2);

        h.controller.send_chat_message("two");
        h.pump_until(|c| c.transcript().len() == 4).await;
        assert_eq!(h.controller.transcript()[3].text, REPLY_EMPTY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_dropped() {
        let barista = ScriptedBarista::delayed(
            vec![Ok(String::from("first")), Ok(String::from("second"))],
            Duration::from_millis(500),
        );
        let mut h = Harness::new(Some(barista));
        h.controller.start(BeverageKind::Cappuccino, 120);
        h.controller.exit();
        h.controller.restart();
        h.controller.start(BeverageKind::IcedCoffee, 120);

        tokio::time::sleep(Duration::from_millis(600)).await;
        while let Ok(event) = h.events.try_recv() {
            h.controller.handle_event(event);
        }
        // Only the opening line of the second session survives.
        assert_eq!(h.controller.transcript().len(), 1);
        assert_eq!(h.controller.session().beverage_kind, Some(BeverageKind::IcedCoffee));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_keeps_count_and_announces() {
        let channel = LocalChannel::new();
        let (publisher, _own) = channel.join(PeerId::from("self"));
        let (_other, mut observer) = channel.join(PeerId::from("observer"));
        let counters = PersistedCounterStore::load(Arc::new(MemoryStorage::read_only()));
        let (tx, _events) = mpsc::unbounded_channel();
        let mut controller =
            SessionController::new(SessionSettings::default(), counters, publisher, None, tx);

        controller.start(BeverageKind::DoubleDouble, 60);
        sip_to_the_bottom(&mut controller);
        assert_eq!(controller.counters().count(BeverageKind::DoubleDouble), 1);
        assert!(observer.recv().await.is_ok());
    }
}
