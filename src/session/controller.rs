use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    error::{EngineError, EngineResult},
    features::{validate_gestational_week, SensorMode},
    log_error, log_info,
    models::{CountingMethod, KickSession, SessionOutcome, TARGET_KICKS},
    service::AssessmentService,
};

use super::{ticker::RepeatingTask, SessionState, SessionStatus};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_ms: u64,
    /// Fixed-duration sessions only.
    pub remaining_ms: Option<u64>,
    /// Count-to-target sessions only.
    pub kicks_remaining: Option<u32>,
}

impl SessionSnapshot {
    fn capture(state: &SessionState) -> Self {
        Self {
            elapsed_ms: state.current_elapsed_ms(),
            remaining_ms: state.remaining_ms(),
            kicks_remaining: state.kicks_remaining(),
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRequest {
    pub method: CountingMethod,
    pub target_duration_minutes: Option<u32>,
    pub sensor_mode: Option<SensorMode>,
    pub gestational_week: Option<u32>,
}

impl SessionRequest {
    pub fn count_to_target() -> Self {
        Self {
            method: CountingMethod::CountToTarget,
            target_duration_minutes: None,
            sensor_mode: None,
            gestational_week: None,
        }
    }

    pub fn fixed_duration(minutes: Option<u32>) -> Self {
        Self {
            method: CountingMethod::FixedDuration,
            target_duration_minutes: minutes,
            ..Self::count_to_target()
        }
    }

    pub fn with_sensor_mode(mut self, sensor_mode: SensorMode) -> Self {
        self.sensor_mode = Some(sensor_mode);
        self
    }

    pub fn with_gestational_week(mut self, week: u32) -> Self {
        self.gestational_week = Some(week);
        self
    }
}

/// Marks a submit in flight. Cleared on drop, so an abandoned `submit()`
/// future leaves the session submittable again.
struct SubmitGuard(Arc<AtomicBool>);

impl SubmitGuard {
    /// Must be called with the state lock held.
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| Self(Arc::clone(flag)))
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one kick-counting session at a time.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    submitting: Arc<AtomicBool>,
    ticker: Arc<Mutex<Option<RepeatingTask>>>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    service: Arc<AssessmentService>,
    tick_interval: Duration,
    log_ticks: bool,
}

impl SessionController {
    pub fn new(service: Arc<AssessmentService>) -> Self {
        let settings = service.settings();
        let tick_interval = Duration::from_millis(settings.tick_interval_ms.max(1));
        let log_ticks = settings.debug_ticks;
        let (snapshots, _) = watch::channel(SessionSnapshot::capture(&SessionState::new()));

        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            submitting: Arc::new(AtomicBool::new(false)),
            ticker: Arc::new(Mutex::new(None)),
            snapshots: Arc::new(snapshots),
            service,
            tick_interval,
            log_ticks,
        }
    }

    /// Receives a snapshot on every clock tick and every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut guard = self.state.lock().await;
        guard.sync_elapsed();
        SessionSnapshot::capture(&guard)
    }

    pub async fn start(
        &self,
        method: CountingMethod,
        target_duration_minutes: Option<u32>,
    ) -> EngineResult<SessionSnapshot> {
        let request = match method {
            CountingMethod::CountToTarget => SessionRequest::count_to_target(),
            CountingMethod::FixedDuration => {
                SessionRequest::fixed_duration(target_duration_minutes)
            }
        };
        self.start_with(request).await
    }

    pub async fn start_with(&self, request: SessionRequest) -> EngineResult<SessionSnapshot> {
        let settings = self.service.settings();

        let target_duration_minutes = match request.method {
            CountingMethod::CountToTarget => None,
            CountingMethod::FixedDuration => {
                let minutes = request
                    .target_duration_minutes
                    .unwrap_or(settings.default_fixed_duration_minutes);
                if minutes == 0 {
                    return Err(EngineError::MalformedInput(
                        "fixed-duration session needs a target of at least one minute".into(),
                    ));
                }
                Some(minutes)
            }
        };
        let gestational_week = request
            .gestational_week
            .unwrap_or(settings.default_gestational_week);
        validate_gestational_week(gestational_week)?;

        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status != SessionStatus::Idle {
                return Err(EngineError::invalid_state("start a session", state.status));
            }

            let session = KickSession {
                id: Uuid::new_v4().to_string(),
                method: request.method,
                started_at: Utc::now(),
                ended_at: None,
                kick_count: 0,
                target_duration_minutes,
                target_kicks: (request.method == CountingMethod::CountToTarget)
                    .then_some(TARGET_KICKS),
                sensor_mode: request.sensor_mode.unwrap_or(settings.default_sensor_mode),
                gestational_week,
            };

            log_info!(
                "Starting {:?} session {} (target {:?} min)",
                session.method, session.id, target_duration_minutes
            );
            state.begin(session, Instant::now());
            SessionSnapshot::capture(&state)
        };

        self.spawn_ticker().await;
        self.snapshots.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn record_event(&self) -> EngineResult<SessionSnapshot> {
        let (snapshot, completed) = {
            let mut state = self.state.lock().await;
            let completed = state.record_kick(Instant::now(), Utc::now())?;
            (SessionSnapshot::capture(&state), completed)
        };

        if completed {
            log_info!(
                "Session reached {TARGET_KICKS} kicks after {} ms",
                snapshot.elapsed_ms
            );
            self.cancel_ticker().await;
        }

        self.snapshots.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// Assesses the completed session and returns the controller to `Idle`.
    pub async fn submit(&self) -> EngineResult<SessionOutcome> {
        let (session, duration_minutes, _in_flight) = {
            let state = self.state.lock().await;
            if state.status != SessionStatus::ReadyToSubmit {
                return Err(EngineError::invalid_state("submit", state.status));
            }
            let session = state
                .session
                .clone()
                .ok_or_else(|| EngineError::invalid_state("submit", SessionStatus::Idle))?;
            let in_flight = SubmitGuard::acquire(&self.submitting)
                .ok_or_else(|| EngineError::invalid_state("submit", state.status))?;
            (session, state.duration_minutes(), in_flight)
        };

        self.cancel_ticker().await;

        let assessment = self
            .service
            .assess(
                session.kick_count,
                duration_minutes,
                session.gestational_week,
                session.sensor_mode,
            )
            .await;

        {
            let mut state = self.state.lock().await;
            let same_session = state
                .session
                .as_ref()
                .is_some_and(|current| current.id == session.id);
            if same_session {
                state.reset();
                self.snapshots.send_replace(SessionSnapshot::capture(&state));
            }
        }

        log_info!(
            "Submitted session {}: {} kicks in {} min -> {}",
            session.id,
            session.kick_count,
            duration_minutes,
            assessment.status_tier.as_str()
        );

        Ok(SessionOutcome {
            session,
            duration_minutes,
            assessment,
        })
    }

    /// Discards the session. The returned snapshot reports `Cancelled`.
    pub async fn cancel(&self) -> EngineResult<SessionSnapshot> {
        let cancelled = {
            let mut state = self.state.lock().await;
            match state.status {
                SessionStatus::Counting => {}
                SessionStatus::ReadyToSubmit if !self.submitting.load(Ordering::Acquire) => {}
                status => return Err(EngineError::invalid_state("cancel", status)),
            }
            state.sync_elapsed();
            let mut cancelled = SessionSnapshot::capture(&state);
            cancelled.state.status = SessionStatus::Cancelled;
            state.reset();
            cancelled
        };

        self.cancel_ticker().await;

        if let Some(session) = cancelled.state.session.as_ref() {
            log_info!(
                "Cancelled session {} after {} ms",
                session.id,
                cancelled.elapsed_ms
            );
        }
        self.snapshots.send_replace(cancelled.clone());
        self.snapshots
            .send_replace(SessionSnapshot::capture(&SessionState::new()));
        Ok(cancelled)
    }

    /// Teardown: stops the clock and drops any session without assessing it.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            if state.status != SessionStatus::Idle {
                log_info!("Discarding active session on shutdown");
            }
            state.reset();
        }
        self.cancel_ticker().await;
        self.snapshots
            .send_replace(SessionSnapshot::capture(&SessionState::new()));
    }

    pub async fn clock_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            drop(previous);
        }

        let state = Arc::clone(&self.state);
        let snapshots = Arc::clone(&self.snapshots);
        let log_ticks = self.log_ticks;

        let task = RepeatingTask::spawn(self.tick_interval, move || {
            let state = Arc::clone(&state);
            let snapshots = Arc::clone(&snapshots);
            async move {
                let mut guard = state.lock().await;
                if guard.status != SessionStatus::Counting {
                    return ControlFlow::Break(());
                }

                let completed = guard.check_duration(Instant::now(), Utc::now());
                let snapshot = SessionSnapshot::capture(&guard);
                drop(guard);

                if log_ticks {
                    log::debug!(
                        "tick: {} ms, {} kicks",
                        snapshot.elapsed_ms,
                        snapshot.state.session.as_ref().map_or(0, |s| s.kick_count)
                    );
                }
                snapshots.send_replace(snapshot);

                if completed {
                    log_info!("Fixed-duration session reached its target");
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        *ticker_guard = Some(task);
    }

    async fn cancel_ticker(&self) {
        let task = self.ticker.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.stop().await {
                log_error!("Session clock did not shut down cleanly: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;
    use crate::{assessment::StatusTier, settings::EngineSettings};

    fn controller() -> (tempfile::TempDir, SessionController) {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings {
            model_dir: dir.path().join("missing"),
            ..EngineSettings::default()
        };
        (dir, SessionController::new(AssessmentService::new(settings)))
    }

    fn assert_invalid(err: EngineError) {
        assert!(
            matches!(err, EngineError::InvalidSessionState { .. }),
            "unexpected error {err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn count_to_target_completes_on_tenth_kick() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        assert!(controller.clock_running().await);

        for expected in 1..10 {
            let snapshot = controller.record_event().await.unwrap();
            assert_eq!(snapshot.state.status, SessionStatus::Counting);
            assert_eq!(snapshot.kicks_remaining, Some(10 - expected));
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        let done = controller.record_event().await.unwrap();
        assert_eq!(done.state.status, SessionStatus::ReadyToSubmit);
        let ended_at = done.state.session.as_ref().unwrap().ended_at;
        assert!(ended_at.is_some());
        assert!(!controller.clock_running().await);

        assert_invalid(controller.record_event().await.unwrap_err());
        let after = controller.snapshot().await;
        assert_eq!(after.state.kick_count(), 10);
        assert_eq!(after.state.session.as_ref().unwrap().ended_at, ended_at);
        assert_eq!(after.elapsed_ms, done.elapsed_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_returns_assessment_and_resets() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(250)).await;
            controller.record_event().await.unwrap();
        }

        let outcome = controller.submit().await.unwrap();
        assert_eq!(outcome.duration_minutes, 41);
        assert_eq!(outcome.session.kick_count, 10);
        assert!(outcome.session.ended_at.is_some());
        assert_ne!(outcome.assessment.status_tier, StatusTier::Unknown);
        assert!((outcome.assessment.kicks_per_hour - 14.6).abs() < 0.1);

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state.status, SessionStatus::Idle);
        assert!(snapshot.state.session.is_none());
        assert_invalid(controller.submit().await.unwrap_err());
    }

    #[tokio::test(start_paused = true)]
    async fn quick_session_reports_one_minute() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        for _ in 0..10 {
            controller.record_event().await.unwrap();
        }

        let outcome = controller.submit().await.unwrap();
        assert_eq!(outcome.duration_minutes, 1);
        assert_eq!(outcome.assessment.kicks_per_hour, 600.0);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_duration_completes_from_the_clock() {
        let (_dir, controller) = controller();
        let mut updates = controller.subscribe();
        controller
            .start(CountingMethod::FixedDuration, Some(1))
            .await
            .unwrap();
        controller.record_event().await.unwrap();
        controller.record_event().await.unwrap();

        let ready = tokio::time::timeout(
            Duration::from_secs(120),
            updates.wait_for(|s| s.state.status == SessionStatus::ReadyToSubmit),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(ready.elapsed_ms, 60_000);
        assert_eq!(ready.remaining_ms, Some(0));

        assert_invalid(controller.record_event().await.unwrap_err());

        let outcome = controller.submit().await.unwrap();
        assert_eq!(outcome.duration_minutes, 1);
        assert_eq!(outcome.session.kick_count, 2);
        assert_eq!(outcome.assessment.kicks_per_hour, 120.0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_publishes_elapsed_time() {
        let (_dir, controller) = controller();
        let updates = controller.subscribe();
        controller
            .start(CountingMethod::FixedDuration, Some(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(updates.borrow().elapsed_ms, 3000);
        assert_eq!(updates.borrow().state.kick_count(), 0);
        assert_eq!(controller.snapshot().await.elapsed_ms, 3500);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_session() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::FixedDuration, Some(5))
            .await
            .unwrap();
        controller.record_event().await.unwrap();

        let cancelled = controller.cancel().await.unwrap();
        assert_eq!(cancelled.state.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.state.kick_count(), 1);
        assert!(!controller.clock_running().await);

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state.status, SessionStatus::Idle);
        assert_invalid(controller.submit().await.unwrap_err());
        assert_invalid(controller.cancel().await.unwrap_err());
    }

    #[tokio::test]
    async fn transitions_outside_their_state_are_rejected() {
        let (_dir, controller) = controller();
        assert_invalid(controller.record_event().await.unwrap_err());
        assert_invalid(controller.submit().await.unwrap_err());

        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        assert_invalid(
            controller
                .start(CountingMethod::FixedDuration, Some(10))
                .await
                .unwrap_err(),
        );
        assert_invalid(controller.submit().await.unwrap_err());
        assert_eq!(controller.snapshot().await.state.kick_count(), 0);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn zero_minute_target_is_malformed() {
        let (_dir, controller) = controller();
        let err = controller
            .start(CountingMethod::FixedDuration, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
        assert_eq!(controller.snapshot().await.state.status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn only_one_submit_in_flight() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        for _ in 0..10 {
            controller.record_event().await.unwrap();
        }

        let (first, second) = tokio::join!(controller.submit(), controller.submit());
        assert!(first.is_ok());
        assert_invalid(second.unwrap_err());
    }

    #[tokio::test]
    async fn abandoned_submit_leaves_session_submittable() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        for _ in 0..10 {
            controller.record_event().await.unwrap();
        }

        // Holding the clock slot parks submit() after it claims the session.
        let clock = controller.ticker.lock().await;
        let mut pending = Box::pin(controller.submit());
        std::future::poll_fn(|cx| {
            assert!(pending.as_mut().poll(cx).is_pending());
            std::task::Poll::Ready(())
        })
        .await;
        assert!(controller.submitting.load(Ordering::Acquire));
        drop(pending);
        drop(clock);

        assert!(!controller.submitting.load(Ordering::Acquire));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state.status, SessionStatus::ReadyToSubmit);

        let outcome = controller.submit().await.unwrap();
        assert_eq!(outcome.session.kick_count, 10);
        assert_eq!(controller.snapshot().await.state.status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn abandoned_submit_still_allows_cancel() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        for _ in 0..10 {
            controller.record_event().await.unwrap();
        }

        let clock = controller.ticker.lock().await;
        let mut pending = Box::pin(controller.submit());
        std::future::poll_fn(|cx| {
            assert!(pending.as_mut().poll(cx).is_pending());
            std::task::Poll::Ready(())
        })
        .await;
        assert_invalid(controller.cancel().await.unwrap_err());
        drop(pending);
        drop(clock);

        let cancelled = controller.cancel().await.unwrap();
        assert_eq!(cancelled.state.status, SessionStatus::Cancelled);
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn out_of_range_week_is_rejected_at_start() {
        let (_dir, controller) = controller();
        for week in [0, 46, 60] {
            let err = controller
                .start_with(SessionRequest::count_to_target().with_gestational_week(week))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::MalformedInput(_)), "{err:?}");
        }
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state.status, SessionStatus::Idle);
        assert!(!controller.clock_running().await);
    }

    #[tokio::test]
    async fn snapshot_serializes_elapsed_once() {
        let (_dir, controller) = controller();
        controller
            .start(CountingMethod::CountToTarget, None)
            .await
            .unwrap();
        controller.record_event().await.unwrap();

        let value = serde_json::to_value(controller.snapshot().await).unwrap();
        assert!(value.get("elapsedMs").is_some());
        assert!(value["state"].get("elapsedMs").is_none());
        assert_eq!(value["state"]["session"]["kickCount"], 1);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_clock() {
        let (_dir, controller) = controller();
        let updates = controller.subscribe();
        controller
            .start(CountingMethod::FixedDuration, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        controller.shutdown().await;
        assert!(!controller.clock_running().await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(updates.borrow().state.status, SessionStatus::Idle);
        assert_eq!(updates.borrow().elapsed_ms, 0);
    }

    #[tokio::test]
    async fn request_overrides_defaults() {
        let (_dir, controller) = controller();
        let snapshot = controller
            .start_with(
                SessionRequest::fixed_duration(Some(20))
                    .with_sensor_mode(SensorMode::OnAbdomen)
                    .with_gestational_week(34),
            )
            .await
            .unwrap();

        let session = snapshot.state.session.unwrap();
        assert_eq!(session.sensor_mode, SensorMode::OnAbdomen);
        assert_eq!(session.gestational_week, 34);
        assert_eq!(session.target_duration_minutes, Some(20));
        assert_eq!(session.target_kicks, None);
        controller.shutdown().await;
    }
}
