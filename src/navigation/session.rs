//! Periodic tick loop for one navigation session
//!
//! The session owns the engine and the tracking source. A tokio interval
//! drives `tick`; every tick is awaited before the next one so two ticks
//! never overlap. Descriptions are generated on spawned tasks with a timeout
//! and come back through a channel, to be emitted on a later iteration. The
//! loop ends as soon as the engine leaves `Navigating`.

use crate::error::WayfindingError;
use crate::external::description::DescriptionGenerator;
use crate::external::narrator::Narrator;
use crate::external::tracking::TrackingSource;
use crate::navigation::engine::{NavigationProgressEngine, TickStatus};
use crate::navigation::events::NavigationEvent;
use crate::navigation::guidance::fallback_description;
use crate::navigation::state::NavigationProgress;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Control messages accepted while the loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Cancel,
}

/// Caller's side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    progress: watch::Receiver<Option<NavigationProgress>>,
    status: watch::Receiver<Option<TickStatus>>,
}

impl SessionHandle {
    /// Returns false once the session loop has finished
    pub fn pause(&self) -> bool {
        self.commands.send(SessionCommand::Pause).is_ok()
    }

    pub fn cancel(&self) -> bool {
        self.commands.send(SessionCommand::Cancel).is_ok()
    }

    /// Latest progress snapshot
    pub fn progress(&self) -> Option<NavigationProgress> {
        self.progress.borrow().clone()
    }

    pub fn progress_receiver(&self) -> watch::Receiver<Option<NavigationProgress>> {
        self.progress.clone()
    }

    /// Outcome of the latest tick; `None` before the first one.
    /// `WaitingForTracking` means the progress snapshot is stale.
    pub fn status(&self) -> Option<TickStatus> {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<Option<TickStatus>> {
        self.status.clone()
    }
}

pub struct NavigationSession<S: TrackingSource> {
    engine: NavigationProgressEngine,
    tracking: S,
    narrator: Arc<dyn Narrator>,
    describer: Option<Arc<dyn DescriptionGenerator>>,
    events: mpsc::UnboundedSender<NavigationEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    progress: watch::Sender<Option<NavigationProgress>>,
    status: watch::Sender<Option<TickStatus>>,
}

impl<S: TrackingSource> NavigationSession<S> {
    /// Build a session around an engine that already has a route.
    /// Returns the session, the event stream and a control handle.
    pub fn new(
        engine: NavigationProgressEngine,
        tracking: S,
        narrator: Arc<dyn Narrator>,
    ) -> (Self, mpsc::UnboundedReceiver<NavigationEvent>, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(engine.progress().cloned());
        let (status_tx, status_rx) = watch::channel(None);
        let session = Self {
            engine,
            tracking,
            narrator,
            describer: None,
            events: events_tx,
            commands: commands_rx,
            progress: progress_tx,
            status: status_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            progress: progress_rx,
            status: status_rx,
        };
        (session, events_rx, handle)
    }

    pub fn with_description_generator(mut self, generator: Arc<dyn DescriptionGenerator>) -> Self {
        self.describer = Some(generator);
        self
    }

    /// Run until the engine stops navigating; hands the engine back
    pub async fn run(mut self) -> NavigationProgressEngine {
        let mut interval = time::interval(self.engine.config().tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (descriptions_tx, mut descriptions_rx) = mpsc::unbounded_channel();

        // Anything queued by `select_destination` goes out first
        self.dispatch(&descriptions_tx);
        self.request_description(&descriptions_tx);
        info!(state = %self.engine.state(), "navigation session started");

        while self.engine.state().is_navigating() {
            tokio::select! {
                _ = interval.tick() => {
                    let sample = self.tracking.latest_sample();
                    let now = time::Instant::now().into_std();
                    let status = self.engine.tick(sample, now);
                    if status == TickStatus::Updated {
                        self.progress.send_replace(self.engine.progress().cloned());
                    }
                    self.publish_status(status);
                    self.dispatch(&descriptions_tx);
                }
                Some(command) = self.commands.recv() => {
                    debug!(?command, "session command");
                    match command {
                        SessionCommand::Pause => {
                            if let Err(e) = self.engine.pause() {
                                debug!(error = %e, "pause ignored");
                            }
                        }
                        SessionCommand::Cancel => {
                            self.engine.cancel();
                        }
                    }
                    self.dispatch(&descriptions_tx);
                }
                Some(event) = descriptions_rx.recv() => {
                    self.publish(event);
                }
            }
        }

        info!(state = %self.engine.state(), "navigation session finished");
        self.engine
    }

    /// Receivers are only woken when the status changes
    fn publish_status(&self, status: TickStatus) {
        self.status.send_if_modified(|current| {
            if *current == Some(status) {
                return false;
            }
            match status {
                TickStatus::WaitingForTracking => warn!("tracking lost, waiting for frames"),
                _ => debug!(?status, "tick status changed"),
            }
            *current = Some(status);
            true
        });
    }

    fn publish(&self, event: NavigationEvent) {
        self.narrator.announce(&event);
        // A dropped receiver only means nobody is listening
        let _ = self.events.send(event);
    }

    /// Forward engine events; a non-final arrival asks for the next description
    fn dispatch(&mut self, descriptions: &mpsc::UnboundedSender<NavigationEvent>) {
        let mut describe_next = false;
        for event in self.engine.drain_events() {
            if matches!(event, NavigationEvent::Arrived { .. }) {
                describe_next = true;
            }
            self.publish(event);
        }
        if describe_next && self.engine.state().is_navigating() {
            self.request_description(descriptions);
        }
    }

    fn request_description(&self, descriptions: &mpsc::UnboundedSender<NavigationEvent>) {
        let Some(context) = self.engine.description_context() else {
            return;
        };
        let fallback = fallback_description(&context);

        let Some(generator) = self.describer.clone() else {
            let _ = descriptions.send(NavigationEvent::Description {
                waypoint_index: context.waypoint_index,
                text: fallback,
                generated: false,
            });
            return;
        };

        let timeout = self.engine.config().description_timeout();
        let descriptions = descriptions.clone();
        tokio::spawn(async move {
            let (text, generated) = match time::timeout(timeout, generator.generate_description(&context)).await {
                Ok(Ok(text)) => (text, true),
                Ok(Err(e)) => {
                    debug!(error = %e, "description generation failed, using fallback");
                    (fallback, false)
                }
                Err(_) => {
                    let e = WayfindingError::DescriptionGenerationFailed(format!(
                        "no answer within {} ms",
                        timeout.as_millis()
                    ));
                    debug!(error = %e, "description generation timed out, using fallback");
                    (fallback, false)
                }
            };
            let _ = descriptions.send(NavigationEvent::Description {
                waypoint_index: context.waypoint_index,
                text,
                generated,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::coordinates::CoordinateTransform;
    use crate::core::{Beacon, BeaconCategory, TrackingSample};
    use crate::external::mock::{
        EchoDescriptionGenerator, InMemoryFloorplan, RecordingNarrator, ScriptedTrackingSource,
        StraightLinePlanner, UnavailableDescriptionGenerator,
    };
    use crate::navigation::state::NavigationState;
    use crate::utils::config::NavigationConfig;
    use nalgebra::Vector3;
    use std::time::Duration;

    fn office() -> Arc<InMemoryFloorplan> {
        let mut plan = InMemoryFloorplan::new();
        plan.add_room("hall", "Hall");
        plan.add_room("kitchen", "Kitchen");
        plan.add_beacon(Beacon::new("h1", "Bench", Vector3::new(0.0, -1.0, 0.0), "hall", BeaconCategory::Furniture));
        plan.add_beacon(Beacon::new("k1", "Fridge", Vector3::new(0.0, 8.0, 0.0), "kitchen", BeaconCategory::Destination));
        plan.add_doorway("d1", "Kitchen Door", Vector3::new(0.0, 4.0, 0.0), "hall", "kitchen");
        Arc::new(plan)
    }

    fn started_engine(plan: Arc<InMemoryFloorplan>) -> NavigationProgressEngine {
        let planner = Arc::new(StraightLinePlanner::new(plan.clone()));
        let fridge = plan.beacon("k1").cloned().unwrap();
        let mut engine = NavigationProgressEngine::new(
            NavigationConfig::default(),
            CoordinateTransform::identity(),
            plan,
            planner,
        );
        engine.select_destination(&fridge, Vector3::zeros()).unwrap();
        engine
    }

    /// Walk north at 0.1 m per frame, then stand still at the end
    fn walk_to(y_end: f64) -> ScriptedTrackingSource {
        let steps = (y_end / 0.1).round() as usize;
        let mut source = ScriptedTrackingSource::new(
            (0..=steps).map(|i| TrackingSample::new(Vector3::new(0.0, i as f64 * 0.1, 0.0), 0.0)),
        );
        for _ in 0..50 {
            source.push(TrackingSample::new(Vector3::new(0.0, y_end, 0.0), 0.0));
        }
        source
    }

    fn stand_still() -> ScriptedTrackingSource {
        let mut source = ScriptedTrackingSource::default();
        for _ in 0..10_000 {
            source.push(TrackingSample::new(Vector3::new(0.0, -0.8, 0.0), 0.0));
        }
        source
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_walks_to_destination() {
        let narrator = Arc::new(RecordingNarrator::new());
        let (session, mut events, handle) = NavigationSession::new(started_engine(office()), walk_to(8.0), narrator.clone());
        let engine = session.run().await;

        assert_eq!(engine.state(), &NavigationState::Arrived);
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received, narrator.events());

        let arrivals: Vec<usize> = received
            .iter()
            .filter_map(|e| match e {
                NavigationEvent::Arrived { waypoint_index, .. } => Some(*waypoint_index),
                _ => None,
            })
            .collect();
        assert_eq!(arrivals, vec![0, 1, 2]);
        assert_eq!(received.iter().filter(|e| e.kind() == "doorway_crossing").count(), 1);
        assert_eq!(received.iter().filter(|e| e.kind() == "destination_reached").count(), 1);
        assert!(handle.progress().is_some());
        assert!(!handle.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_the_loop() {
        let narrator = Arc::new(RecordingNarrator::new());
        let (session, _events, handle) = NavigationSession::new(started_engine(office()), stand_still(), narrator);
        assert!(handle.cancel());
        let engine = session.run().await;
        assert_eq!(engine.state(), &NavigationState::NotStarted);
        assert!(engine.path().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_the_loop() {
        let narrator = Arc::new(RecordingNarrator::new());
        let (session, _events, handle) = NavigationSession::new(started_engine(office()), stand_still(), narrator);
        assert!(handle.pause());
        let engine = session.run().await;
        assert_eq!(engine.state(), &NavigationState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_tracking_is_visible() {
        let mut source = ScriptedTrackingSource::default();
        for _ in 0..3 {
            source.push(TrackingSample::new(Vector3::new(0.0, -0.8, 0.0), 0.0));
        }
        for _ in 0..50 {
            source.push_gap();
        }
        let narrator = Arc::new(RecordingNarrator::new());
        let (session, _events, handle) = NavigationSession::new(started_engine(office()), source, narrator);
        assert_eq!(handle.status(), None);
        let runner = tokio::spawn(session.run());

        let mut status = handle.status_receiver();
        status.wait_for(|s| *s == Some(TickStatus::WaitingForTracking)).await.unwrap();

        // The last snapshot is kept while tracking is gone
        assert!(handle.progress().is_some());
        assert_eq!(handle.status(), Some(TickStatus::WaitingForTracking));

        handle.cancel();
        let engine = runner.await.unwrap();
        assert_eq!(engine.state(), &NavigationState::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gaps_only_report_waiting() {
        let mut source = ScriptedTrackingSource::default();
        for _ in 0..20 {
            source.push_gap();
        }
        let narrator = Arc::new(RecordingNarrator::new());
        let (session, _events, handle) = NavigationSession::new(started_engine(office()), source, narrator.clone());
        let runner = tokio::spawn(session.run());

        let mut status = handle.status_receiver();
        status.wait_for(|s| *s == Some(TickStatus::WaitingForTracking)).await.unwrap();
        handle.cancel();
        runner.await.unwrap();
        assert!(narrator.events().iter().all(|e| !matches!(e, NavigationEvent::Arrived { .. })));
    }

    async fn first_description(
        generator: Option<Arc<dyn DescriptionGenerator>>,
    ) -> NavigationEvent {
        let narrator = Arc::new(RecordingNarrator::new());
        let (mut session, mut events, handle) = NavigationSession::new(started_engine(office()), stand_still(), narrator);
        if let Some(generator) = generator {
            session = session.with_description_generator(generator);
        }
        let runner = tokio::spawn(session.run());
        let description = loop {
            match events.recv().await {
                Some(event @ NavigationEvent::Description { .. }) => break event,
                Some(_) => continue,
                None => panic!("session ended without a description"),
            }
        };
        handle.cancel();
        runner.await.unwrap();
        description
    }

    #[tokio::test(start_paused = true)]
    async fn test_description_without_generator_uses_fallback() {
        match first_description(None).await {
            NavigationEvent::Description { waypoint_index, generated, text } => {
                assert_eq!(waypoint_index, 0);
                assert!(!generated);
                assert!(text.starts_with("Start in the Hall"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_generator_falls_back() {
        match first_description(Some(Arc::new(UnavailableDescriptionGenerator))).await {
            NavigationEvent::Description { generated, text, .. } => {
                assert!(!generated);
                assert!(text.contains("Hall"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generator_times_out() {
        let slow = EchoDescriptionGenerator::with_delay(Duration::from_secs(10));
        match first_description(Some(Arc::new(slow))).await {
            NavigationEvent::Description { generated, .. } => assert!(!generated),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generated_description_is_used() {
        match first_description(Some(Arc::new(EchoDescriptionGenerator::default()))).await {
            NavigationEvent::Description { generated, text, .. } => {
                assert!(generated);
                assert_eq!(text, "Next up: Start in the Hall.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
