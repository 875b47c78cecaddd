use std::time::{Duration, Instant};

use ecovision_contracts::events::{EventPayload, EventWriter};
use ecovision_contracts::history::{ClassificationResult, HistoryEvent, HistoryObserver, HistoryStore};
use ecovision_contracts::waste::{ProbabilityDistribution, SummaryResult};
use ecovision_contracts::ScanError;
use serde_json::{json, Value};

use crate::capture::{CameraBackend, CaptureAdapter};
use crate::config::EngineConfig;
use crate::ClassificationEngine;

/// Fewest history entries before the front end offers a summary.
pub const MIN_SUMMARY_ENTRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Ready,
    InFlight,
    CoolingDown(Duration),
}

/// One scan at a time, and none until the cooldown after the previous one has passed.
#[derive(Debug, Clone)]
pub struct ScanGate {
    cooldown: Duration,
    in_flight: bool,
    last_finished: Option<Instant>,
}

impl ScanGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            in_flight: false,
            last_finished: None,
        }
    }

    pub fn state_at(&self, now: Instant) -> GateState {
        if self.in_flight {
            return GateState::InFlight;
        }
        match self.last_finished {
            Some(finished) => {
                let elapsed = now.saturating_duration_since(finished);
                if elapsed < self.cooldown {
                    GateState::CoolingDown(self.cooldown - elapsed)
                } else {
                    GateState::Ready
                }
            }
            None => GateState::Ready,
        }
    }

    /// Marks a scan as started when the gate is open; otherwise reports why not.
    pub fn try_begin_at(&mut self, now: Instant) -> GateState {
        let state = self.state_at(now);
        if state == GateState::Ready {
            self.in_flight = true;
        }
        state
    }

    /// Success and failure both start the cooldown.
    pub fn finish_at(&mut self, now: Instant) {
        self.in_flight = false;
        self.last_finished = Some(now);
    }

    pub fn try_begin(&mut self) -> GateState {
        self.try_begin_at(Instant::now())
    }

    pub fn finish(&mut self) {
        self.finish_at(Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Stored(ClassificationResult),
    Busy(GateState),
}

/// Mirrors history changes into the session event log.
pub struct EventLogObserver {
    events: EventWriter,
}

impl EventLogObserver {
    pub fn new(events: EventWriter) -> Self {
        Self { events }
    }
}

impl HistoryObserver for EventLogObserver {
    fn notify(&self, event: &HistoryEvent) {
        let payload = match event {
            HistoryEvent::Added(result) => match serde_json::to_value(result) {
                Ok(value) => json!({ "result": value }),
                Err(err) => {
                    tracing::warn!(error = %err, "history entry not serializable");
                    return;
                }
            },
            HistoryEvent::Cleared { removed } => json!({ "removed": removed }),
        };
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = self.events.emit(event.event_type(), payload) {
            tracing::warn!(error = %format!("{err:#}"), "event log write failed");
        }
    }
}

/// A scanning session: one camera, one engine, one history.
pub struct ScanSession {
    capture: CaptureAdapter,
    engine: ClassificationEngine,
    history: HistoryStore,
    gate: ScanGate,
}

impl ScanSession {
    pub fn new(config: &EngineConfig, engine: ClassificationEngine) -> Self {
        Self {
            capture: CaptureAdapter::new(None, config.jpeg_quality),
            engine,
            history: HistoryStore::new(),
            gate: ScanGate::new(config.scan_cooldown),
        }
    }

    /// Routes engine and history events to `events` and records the session start.
    pub fn attach_event_log(&mut self, events: EventWriter) -> anyhow::Result<()> {
        self.engine.set_event_writer(events.clone());
        self.history.subscribe(EventLogObserver::new(events.clone()));
        let models: Vec<&str> = self
            .engine
            .model_registry()
            .list()
            .map(|model| model.name.as_str())
            .collect();
        let mut payload = EventPayload::new();
        payload.insert("providers".to_string(), json!(self.engine.providers().names()));
        payload.insert("models".to_string(), json!(models));
        payload.insert("requested_model".to_string(), json!(self.engine.model()));
        events.emit("session_started", payload)?;
        Ok(())
    }

    pub fn subscribe<O: HistoryObserver + 'static>(&mut self, observer: O) {
        self.history.subscribe(observer);
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn engine(&self) -> &ClassificationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ClassificationEngine {
        &mut self.engine
    }

    pub fn gate(&self) -> &ScanGate {
        &self.gate
    }

    pub fn camera_active(&self) -> bool {
        self.capture.is_active()
    }

    /// Switches to `camera` and starts streaming from it.
    pub fn use_camera(&mut self, camera: Box<dyn CameraBackend>) -> Result<(), ScanError> {
        self.capture.set_backend(camera);
        self.capture.start_capture()
    }

    pub fn start_camera(&mut self) -> Result<(), ScanError> {
        self.capture.start_capture()
    }

    pub fn stop_camera(&mut self) {
        self.capture.stop_capture();
    }

    /// Captures a frame and classifies it. History only changes on success.
    pub fn scan(&mut self) -> Result<ScanOutcome, ScanError> {
        let state = self.gate.try_begin();
        if state != GateState::Ready {
            tracing::debug!(?state, "scan rejected by gate");
            return Ok(ScanOutcome::Busy(state));
        }
        let classified = self
            .capture
            .capture_frame()
            .and_then(|image| self.engine.classify(&image));
        self.gate.finish();
        let result = classified?;
        Ok(ScanOutcome::Stored(self.history.add(result).clone()))
    }

    pub fn probe(&mut self) -> Result<ProbabilityDistribution, ScanError> {
        let image = self.capture.capture_frame()?;
        self.engine.classify_continuous(&image)
    }

    pub fn summary_available(&self) -> bool {
        self.history.len() >= MIN_SUMMARY_ENTRIES
    }

    pub fn summarize_history(&mut self) -> Result<SummaryResult, ScanError> {
        let categories = self.history.categories_oldest_first();
        self.engine.summarize(&categories)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("capture", &self.capture)
            .field("engine", &self.engine)
            .field("history", &self.history.len())
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use ecovision_contracts::events::EventWriter;
    use ecovision_contracts::waste::WasteCategory;
    use ecovision_contracts::ScanError;
    use image::{Rgb, RgbImage};
    use serde_json::Value;

    use super::{GateState, ScanGate, ScanOutcome, ScanSession};
    use crate::capture::StillImageCamera;
    use crate::config::EngineConfig;
    use crate::test_support::scripted_engine;

    fn session(temp: &tempfile::TempDir) -> anyhow::Result<(ScanSession, crate::test_support::ScriptedProvider)> {
        let path = temp.path().join("item.png");
        RgbImage::from_pixel(8, 8, Rgb([200, 120, 40])).save(&path)?;
        let config = EngineConfig {
            scan_cooldown: Duration::ZERO,
            ..EngineConfig::default()
        };
        let (engine, provider) = scripted_engine()?;
        let mut session = ScanSession::new(&config, engine);
        session.use_camera(Box::new(StillImageCamera::new(path)))?;
        Ok((session, provider))
    }

    #[test]
    fn gate_blocks_while_in_flight_and_during_cooldown() {
        let start = Instant::now();
        let mut gate = ScanGate::new(Duration::from_secs(3));
        assert_eq!(gate.try_begin_at(start), GateState::Ready);
        assert_eq!(gate.try_begin_at(start), GateState::InFlight);

        let finished = start + Duration::from_secs(1);
        gate.finish_at(finished);
        assert_eq!(
            gate.try_begin_at(finished + Duration::from_secs(1)),
            GateState::CoolingDown(Duration::from_secs(2))
        );
        assert_eq!(
            gate.try_begin_at(finished + Duration::from_secs(3)),
            GateState::Ready
        );
    }

    #[test]
    fn failed_scan_leaves_history_unchanged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut session, provider) = session(&temp)?;
        provider.reply(r#"{"itemName":"Battery","category":"Domestic Hazardous","recyclingTips":"x"}"#);
        assert!(matches!(
            session.scan(),
            Err(ScanError::SchemaValidation { .. })
        ));
        assert!(session.history().is_empty());
        assert_eq!(session.gate().state_at(Instant::now()), GateState::Ready);
        Ok(())
    }

    #[test]
    fn scans_accumulate_newest_first_and_feed_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut session, provider) = session(&temp)?;
        let events = EventWriter::in_memory("session-test");
        session.attach_event_log(events.clone())?;
        provider
            .reply(r#"{"itemName":"Bottle","category":"Recyclable","recyclingTips":"Reuse it"}"#)
            .reply(r#"{"itemName":"Peel","category":"Biodegradable"}"#)
            .reply(r#"{"itemName":"Paint","category":"Domestic Hazardous"}"#)
            .reply(r#"{"summary":"Nice mix of items."}"#);

        for _ in 0..3 {
            assert!(matches!(session.scan()?, ScanOutcome::Stored(_)));
        }
        assert!(session.summary_available());
        let head = session.history().latest().map(|entry| entry.category);
        assert_eq!(head, Some(WasteCategory::DomesticHazardous));
        assert_eq!(session.summarize_history()?.summary, "Nice mix of items.");

        let seen = provider.seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        let prompt = seen[3].prompt.text();
        let recyclable = prompt.find("- Recyclable").unwrap_or(usize::MAX);
        let hazardous = prompt.find("- Domestic Hazardous").unwrap_or(0);
        assert!(recyclable < hazardous);
        drop(seen);

        session.clear_history();
        assert!(session.history().is_empty());
        let kinds: Vec<String> = events
            .recorded()
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str).map(str::to_string))
            .filter(|kind| !kind.starts_with("flow_"))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "session_started",
                "classification_added",
                "classification_added",
                "classification_added",
                "history_cleared",
            ]
        );
        Ok(())
    }

    #[test]
    fn scan_without_camera_is_not_ready() -> anyhow::Result<()> {
        let (engine, provider) = scripted_engine()?;
        let mut session = ScanSession::new(&EngineConfig::default(), engine);
        assert_eq!(session.scan(), Err(ScanError::NotReady));
        assert_eq!(provider.calls(), 0);
        assert!(matches!(
            session.scan(),
            Ok(ScanOutcome::Busy(GateState::CoolingDown(_)))
        ));
        Ok(())
    }
}
