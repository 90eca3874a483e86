use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{FrameSource, ShotDetector},
    config::SupervisorConfig,
    errors::{ErrorKind, ErrorRegistry, Severity},
    events::{EventBus, SupervisorEvent},
    models::{Detection, EmbeddedShot, Frame, SessionSettings},
};

use super::{
    aggregator::{ShotAggregator, ShotDraft},
    health::MissWindow,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything one session's poll loop needs. Built by the session
/// controller, moved into the loop task.
#[derive(Clone)]
pub struct PollContext {
    pub session_id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub settings: SessionSettings,
    pub frames: Arc<dyn FrameSource>,
    pub detector: Arc<dyn ShotDetector>,
    pub aggregator: ShotAggregator,
    pub registry: ErrorRegistry,
    pub events: EventBus,
    pub config: Arc<SupervisorConfig>,
}

/// Strictly sequential: the next request goes out only after the previous
/// one answered or timed out. A request still in flight when the token is
/// cancelled completes, but its frame is dropped.
pub async fn poll_loop(ctx: PollContext, cancel_token: CancellationToken) {
    let mut health = MissWindow::new(ctx.config.miss_escalation);

    log_info!(
        "polling device {} for session {}",
        ctx.device_id,
        ctx.session_id
    );

    while !cancel_token.is_cancelled() {
        let outcome =
            time::timeout(ctx.config.poll_timeout(), ctx.frames.latest_frame(&ctx.device_id)).await;

        if cancel_token.is_cancelled() {
            log_debug!("discarding frame that arrived after polling stopped");
            break;
        }

        let fetched = match outcome {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "frame request timed out after {}ms",
                ctx.config.poll_timeout_ms
            )),
        };

        match fetched {
            Ok(frame) => {
                health.record_success();
                if let Err(err) = process_frame(&ctx, frame).await {
                    if cancel_token.is_cancelled() {
                        log_debug!("session {} stopped mid-frame: {err:#}", ctx.session_id);
                        break;
                    }
                    log_warn!("frame processing failed for session {}: {err:#}", ctx.session_id);
                    ctx.registry
                        .record(
                            ErrorKind::Data,
                            Severity::Medium,
                            format!("Could not process frame: {err:#}"),
                            false,
                        )
                        .await;
                }
                tokio::task::yield_now().await;
            }
            Err(err) => {
                log_warn!("frame request failed for device {}: {err:#}", ctx.device_id);
                ctx.registry
                    .record(
                        ErrorKind::Device,
                        Severity::Medium,
                        format!("Missed frame from {}: {err:#}", ctx.device_id),
                        false,
                    )
                    .await;

                if health.record_miss() {
                    ctx.registry
                        .record(
                            ErrorKind::Device,
                            Severity::High,
                            format!(
                                "Device {} is dropping frames ({} recent misses)",
                                ctx.device_id,
                                health.misses()
                            ),
                            true,
                        )
                        .await;
                }

                tokio::select! {
                    _ = time::sleep(ctx.config.poll_error_backoff()) => {}
                    _ = cancel_token.cancelled() => break,
                }
            }
        }
    }

    log_info!("polling loop for session {} shutting down", ctx.session_id);
}

/// Returns how many shots were appended.
async fn process_frame(ctx: &PollContext, frame: Frame) -> Result<usize> {
    if let Some(last) = ctx.aggregator.note_sequence(frame.sequence).await {
        if frame.sequence == last {
            return Ok(0);
        }
        if frame.sequence < last {
            log_warn!(
                "device {} sequence went backwards ({} -> {})",
                ctx.device_id,
                last,
                frame.sequence
            );
        }
    }

    if !frame.has_shot {
        return Ok(0);
    }

    let timestamp = seconds_since(ctx.started_at, frame.timestamp);

    if let Some(embedded) = frame.shot.as_ref().filter(|shot| shot.score.is_some()) {
        let appended = append_pre_scored(ctx, embedded, timestamp).await?;
        return Ok(appended as usize);
    }

    let detections = ctx
        .detector
        .detect(&frame)
        .await
        .with_context(|| format!("shot detection failed on frame {}", frame.sequence))?;

    if detections.is_empty() {
        // device saw a shot the detector could not place; fall back to its
        // own coordinates
        if let Some(embedded) = frame.shot.as_ref() {
            let fallback = Detection {
                class: "embedded".into(),
                confidence: embedded.confidence,
                x: embedded.x,
                y: embedded.y,
            };
            let appended = append_detection(ctx, &fallback, timestamp).await?;
            return Ok(appended as usize);
        }
        log_debug!("frame {} flagged a shot but nothing was detected", frame.sequence);
        return Ok(0);
    }

    let mut appended = 0;
    for detection in &detections {
        if append_detection(ctx, detection, timestamp).await? {
            appended += 1;
        }
    }
    Ok(appended)
}

async fn append_pre_scored(ctx: &PollContext, embedded: &EmbeddedShot, timestamp: f64) -> Result<bool> {
    if !embedded.x.is_finite() || !embedded.y.is_finite() {
        report_malformed(ctx, "pre-scored shot with non-finite coordinates").await;
        return Ok(false);
    }

    let distance = embedded.x.hypot(embedded.y);
    let zone = match &embedded.zone {
        Some(zone) => zone.clone(),
        None => ctx.settings.score_at(distance).1,
    };
    let score = embedded.score.unwrap_or_default().clamp(0.0, 10.0);

    let draft = ShotDraft {
        timestamp,
        x: embedded.x,
        y: embedded.y,
        score,
        confidence: embedded.confidence.clamp(0.0, 1.0),
        zone,
    };
    publish(ctx, draft).await?;
    Ok(true)
}

async fn append_detection(ctx: &PollContext, detection: &Detection, timestamp: f64) -> Result<bool> {
    if !detection.is_well_formed() {
        report_malformed(
            ctx,
            &format!(
                "detection at ({}, {}) with confidence {}",
                detection.x, detection.y, detection.confidence
            ),
        )
        .await;
        return Ok(false);
    }

    if detection.confidence < ctx.settings.detection_sensitivity {
        log_debug!(
            "dropping detection below sensitivity ({:.2} < {:.2})",
            detection.confidence,
            ctx.settings.detection_sensitivity
        );
        return Ok(false);
    }

    if ctx
        .aggregator
        .contains_near(detection.x, detection.y, ctx.settings.duplicate_radius_mm)
        .await
    {
        log_debug!(
            "detection at ({:.1}, {:.1}) matches a buffered shot",
            detection.x,
            detection.y
        );
        return Ok(false);
    }

    let (score, zone) = ctx.settings.score_at(detection.x.hypot(detection.y));
    let draft = ShotDraft {
        timestamp,
        x: detection.x,
        y: detection.y,
        score,
        confidence: detection.confidence,
        zone,
    };
    publish(ctx, draft).await?;
    Ok(true)
}

async fn publish(ctx: &PollContext, draft: ShotDraft) -> Result<()> {
    let shot = ctx.aggregator.append(&ctx.session_id, draft).await?;
    log_info!(
        "session {} shot #{} scored {} ({})",
        ctx.session_id,
        shot.shot_number,
        shot.score,
        shot.zone
    );
    ctx.events.emit(SupervisorEvent::ShotDetected { shot });
    Ok(())
}

async fn report_malformed(ctx: &PollContext, what: &str) {
    log_warn!("skipping malformed {what}");
    ctx.registry
        .record(
            ErrorKind::Data,
            Severity::Low,
            format!("Skipped malformed {what}"),
            false,
        )
        .await;
}

fn seconds_since(started_at: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    let elapsed = (at - started_at).num_milliseconds().max(0);
    elapsed as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissEscalation;
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
        time::Duration,
    };
    use tokio::sync::watch;

    struct ScriptedFrames {
        latency: Duration,
        script: StdMutex<VecDeque<Result<Frame>>>,
    }

    impl ScriptedFrames {
        fn new(latency_ms: u64, script: Vec<Result<Frame>>) -> Arc<Self> {
            Arc::new(Self {
                latency: Duration::from_millis(latency_ms),
                script: StdMutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedFrames {
        async fn latest_frame(&self, _device_id: &str) -> Result<Frame> {
            time::sleep(self.latency).await;
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    struct StaticDetector {
        detections: Vec<Detection>,
        calls: AtomicUsize,
    }

    impl StaticDetector {
        fn new(detections: Vec<Detection>) -> Arc<Self> {
            Arc::new(Self {
                detections,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ShotDetector for StaticDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }
    }

    fn frame(sequence: u64, shot: Option<EmbeddedShot>) -> Frame {
        Frame {
            sequence,
            timestamp: Utc::now(),
            image_ref: format!("frame-{sequence}"),
            has_shot: true,
            shot,
        }
    }

    fn pre_scored(x: f64, y: f64, score: f64) -> Option<EmbeddedShot> {
        Some(EmbeddedShot {
            x,
            y,
            score: Some(score),
            confidence: 0.99,
            zone: None,
        })
    }

    fn detection(x: f64, y: f64, confidence: f64) -> Detection {
        Detection {
            class: "hole".into(),
            confidence,
            x,
            y,
        }
    }

    fn context(
        config: SupervisorConfig,
        frames: Arc<dyn FrameSource>,
        detector: Arc<dyn ShotDetector>,
    ) -> (PollContext, watch::Sender<bool>) {
        let config = Arc::new(config);
        let events = EventBus::new();
        let (tx, rx) = watch::channel(true);
        let registry = ErrorRegistry::new(config.clone(), rx, events.clone());
        let ctx = PollContext {
            session_id: "session-1".into(),
            device_id: "device-a".into(),
            started_at: Utc::now(),
            settings: SessionSettings::default(),
            frames,
            detector,
            aggregator: ShotAggregator::open("session-1", config.buffer_capacity),
            registry,
            events,
            config,
        };
        (ctx, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn pre_scored_frames_skip_detection() {
        let frames = ScriptedFrames::new(20, vec![Ok(frame(1, pre_scored(1.0, 1.0, 9.0)))]);
        let detector = StaticDetector::new(vec![detection(0.0, 0.0, 0.9)]);
        let (ctx, _tx) = context(SupervisorConfig::default(), frames, detector.clone());
        let aggregator = ctx.aggregator.clone();

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let shots = aggregator.recent_shots().await;
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].score, 9.0);
        assert_eq!(shots[0].zone, "10-ring");
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_is_recorded_and_polling_continues() {
        let frames = ScriptedFrames::new(
            20,
            vec![
                Err(anyhow!("socket reset")),
                Ok(frame(1, pre_scored(2.0, 0.0, 10.0))),
            ],
        );
        let (ctx, _tx) = context(
            SupervisorConfig::default(),
            frames,
            StaticDetector::new(Vec::new()),
        );
        let aggregator = ctx.aggregator.clone();
        let registry = ctx.registry.clone();

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_secs(2)).await;
        token.cancel();

        assert_eq!(aggregator.shot_count().await, 1);
        let errors = registry.unresolved().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Device);
        assert_eq!(errors[0].severity, Severity::Medium);
        assert!(!errors[0].auto_retry);
        assert!(errors[0].next_retry_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn detections_are_filtered_scored_and_deduplicated() {
        let frames = ScriptedFrames::new(20, vec![Ok(frame(1, None)), Ok(frame(2, None))]);
        let detector = StaticDetector::new(vec![
            detection(0.0, 0.0, 0.9),
            detection(0.5, 0.5, 0.95),
            detection(50.0, 0.0, 0.2),
            detection(f64::NAN, 1.0, 0.9),
        ]);
        let (ctx, _tx) = context(SupervisorConfig::default(), frames, detector.clone());
        let aggregator = ctx.aggregator.clone();
        let registry = ctx.registry.clone();

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let shots = aggregator.recent_shots().await;
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].score, 10.0);
        assert_eq!(shots[0].zone, "10-ring");
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);

        let data_errors: Vec<_> = registry
            .unresolved()
            .await
            .into_iter()
            .filter(|record| record.kind == ErrorKind::Data)
            .collect();
        assert_eq!(data_errors.len(), 2);
        assert!(data_errors.iter().all(|record| record.severity == Severity::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_sequence_is_not_reprocessed() {
        let frames = ScriptedFrames::new(
            20,
            vec![
                Ok(frame(7, pre_scored(1.0, 0.0, 10.0))),
                Ok(frame(7, pre_scored(1.0, 0.0, 10.0))),
            ],
        );
        let (ctx, _tx) = context(
            SupervisorConfig::default(),
            frames,
            StaticDetector::new(Vec::new()),
        );
        let aggregator = ctx.aggregator.clone();

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        assert_eq!(aggregator.shot_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_in_flight_at_cancel_is_discarded() {
        let frames = ScriptedFrames::new(5_000, vec![Ok(frame(1, pre_scored(0.0, 0.0, 10.0)))]);
        let (ctx, _tx) = context(
            SupervisorConfig::default(),
            frames,
            StaticDetector::new(Vec::new()),
        );
        let aggregator = ctx.aggregator.clone();

        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        handle.await.unwrap();
        assert_eq!(aggregator.shot_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_misses_escalate_when_configured() {
        let config = SupervisorConfig {
            miss_escalation: Some(MissEscalation {
                window: 3,
                max_misses: 2,
            }),
            ..SupervisorConfig::default()
        };
        let frames = ScriptedFrames::new(
            20,
            vec![Err(anyhow!("timeout")), Err(anyhow!("timeout"))],
        );
        let (ctx, _tx) = context(config, frames, StaticDetector::new(Vec::new()));
        let registry = ctx.registry.clone();

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(ctx, token.clone()));
        time::sleep(Duration::from_millis(800)).await;
        token.cancel();

        let escalations: Vec<_> = registry
            .snapshot()
            .await
            .into_iter()
            .filter(|record| record.severity == Severity::High)
            .collect();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].kind, ErrorKind::Device);
        assert!(escalations[0].auto_retry);
    }
}
