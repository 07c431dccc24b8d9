//! The pipeline control loop.
//!
//! A single task drives fetch, estimation, packaging, transmission, and
//! pacing, supervising the source through stalls and disconnects. The
//! only suspension points are the source fetch (caller-bounded), the
//! pacer (at most one interval), and the sink transmit (bounded by the
//! adapter).

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::Sender;
use tracing::{debug, error, info, warn};

use crate::capture::frame::Residency;
use crate::capture::source::{FrameSource, SourceStatus};
use crate::engine::MotionEstimator;
use crate::error::PipelineError;
use crate::net::sink::FrameSink;
use crate::pipeline::events::ControlView;
use crate::pipeline::pacer::Pacer;
use crate::pipeline::packager::ResultPackager;
use crate::pipeline::ring::FrameRing;
use crate::pipeline::state::PipelineState;
use crate::pipeline::stats::{IterationReport, PipelineStats};
use crate::EstimatorParams;

/// Knobs the controller needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub params: EstimatorParams,
    pub fetch_timeout: Duration,
    pub interval: Duration,
    pub residency: Residency,
}

/// Outcome of a priming fetch into the `previous` slot.
enum Primed {
    Ready,
    Closed,
    Stopped,
}

pub struct PipelineController<S, E, K> {
    source: S,
    engine: E,
    sink: K,
    events: ControlView,
    packager: ResultPackager,
    settings: ControllerSettings,
    state: PipelineState,
    stats: Arc<PipelineStats>,
    reports: Option<Sender<IterationReport>>,
}

impl<S, E, K> PipelineController<S, E, K>
where
    S: FrameSource,
    E: MotionEstimator,
    K: FrameSink,
{
    pub fn new(source: S, engine: E, sink: K, events: ControlView, settings: ControllerSettings) -> Self {
        Self {
            source,
            engine,
            sink,
            events,
            packager: ResultPackager::new(),
            settings,
            state: PipelineState::Initializing,
            stats: Arc::new(PipelineStats::new()),
            reports: None,
        }
    }

    /// Send an [`IterationReport`] down this channel after every
    /// completed iteration. Reports are dropped when the channel is full.
    pub fn with_reports(mut self, tx: Sender<IterationReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Counter handle; stays valid after `run` consumes the controller.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        if self.state != next {
            debug!("pipeline state: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Fetch into `previous`, retrying timeouts indefinitely. The stop
    /// flag is polled between attempts so a stalled source cannot wedge
    /// shutdown.
    async fn prime_previous(&mut self, ring: &mut FrameRing) -> Primed {
        loop {
            if self.events.snapshot().stop {
                return Primed::Stopped;
            }
            match self
                .source
                .fetch(ring.previous_mut(), self.settings.fetch_timeout)
                .await
            {
                SourceStatus::Ok => return Primed::Ready,
                SourceStatus::Timeout => continue,
                SourceStatus::Closed => return Primed::Closed,
            }
        }
    }

    fn initialize_engine(&mut self, ring: &FrameRing) -> Result<(), PipelineError> {
        let (prev, curr) = ring.pair();
        if let Err(e) = self.engine.initialize(prev, curr, &self.settings.params) {
            error!("Engine initialization failed: {e}");
            self.transition(PipelineState::Stopped);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reopen the source, re-prime `previous`, and re-initialize the
    /// engine with the original parameters.
    async fn recover(&mut self, ring: &mut FrameRing) -> Result<(), PipelineError> {
        self.transition(PipelineState::Recovering);
        warn!("Frame source closed; attempting to reopen");

        if !self.source.reopen().await {
            error!("Failed to reopen the source");
            self.transition(PipelineState::Stopped);
            return Err(PipelineError::RecoveryFailed("reopen failed"));
        }

        match self.prime_previous(ring).await {
            Primed::Ready => {}
            Primed::Stopped => {
                self.transition(PipelineState::Stopped);
                return Ok(());
            }
            Primed::Closed => {
                error!("Source has no frames after reopen");
                self.transition(PipelineState::Stopped);
                return Err(PipelineError::RecoveryFailed("no frames after reopen"));
            }
        }

        self.initialize_engine(ring)?;
        self.stats.record_reconnect();
        self.transition(PipelineState::Running);
        info!("Source recovered; estimation engine re-initialized");
        Ok(())
    }

    /// Drive the pipeline until a stop request or a fatal error.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        if !self.source.open().await {
            self.transition(PipelineState::Stopped);
            return Err(PipelineError::SourceUnavailable);
        }
        let (width, height) = self.source.frame_dimensions();
        let format = self.source.pixel_format();

        if !self.sink.open().await {
            self.transition(PipelineState::Stopped);
            return Err(PipelineError::TransmitSetup);
        }

        let mut ring = FrameRing::allocate(width, height, format, self.settings.residency);

        match self.prime_previous(&mut ring).await {
            Primed::Ready => {}
            Primed::Stopped => {
                self.transition(PipelineState::Stopped);
                return Ok(());
            }
            Primed::Closed => {
                error!("Source has no frames");
                self.transition(PipelineState::Stopped);
                return Err(PipelineError::NoFrames);
            }
        }

        self.initialize_engine(&ring)?;

        let mut pacer = Pacer::arm(self.settings.interval);
        self.transition(PipelineState::Running);
        info!(
            "Pipeline running: {width}x{height} {format}, interval {:?}",
            self.settings.interval
        );

        loop {
            let iteration_started = Instant::now();

            // One stable reading per iteration.
            let flags = self.events.snapshot();

            if flags.stop {
                self.transition(PipelineState::Stopped);
                break;
            }

            let mut proc = Duration::ZERO;
            if flags.pause {
                if !self.state.is_paused() {
                    self.transition(PipelineState::Paused);
                    info!("Pipeline paused");
                }
                self.stats.record_paused_iteration();
            } else {
                if self.state.is_paused() {
                    self.transition(PipelineState::Running);
                    info!("Pipeline resumed");
                }

                match self
                    .source
                    .fetch(ring.current_mut(), self.settings.fetch_timeout)
                    .await
                {
                    SourceStatus::Timeout => {
                        // The fetch already consumed the wait; retry the
                        // same slot without pacing or aging.
                        self.stats.record_fetch_timeout();
                        continue;
                    }
                    SourceStatus::Closed => {
                        // Whatever was computed this cycle is dropped.
                        self.recover(&mut ring).await?;
                        if self.state.is_stopped() {
                            break;
                        }
                        continue;
                    }
                    SourceStatus::Ok => {
                        let step_started = Instant::now();
                        let (prev, curr) = ring.pair();
                        if let Err(e) = self.engine.compute_step(prev, curr) {
                            error!("Estimation step failed: {e}");
                            self.transition(PipelineState::Stopped);
                            return Err(e.into());
                        }
                        proc = step_started.elapsed();
                        self.stats.record_step();
                    }
                }
            }

            // Package and transmit the newest result. While paused this
            // re-sends the stale field against the last completed frame.
            // Nothing to send before the first completed step.
            let mut transmitted = false;
            if let Some(field) = self.engine.motion_field() {
                let frame = if flags.pause {
                    ring.previous()
                } else {
                    ring.current()
                };
                match self.packager.package(field, frame) {
                    Ok(payload) => {
                        if self.sink.transmit(&payload).await {
                            transmitted = true;
                            self.stats.record_transmit();
                        } else {
                            warn!("Transmit failed; dropping this iteration's output");
                            self.stats.record_transmit_failure();
                        }
                    }
                    Err(e) => {
                        warn!("Result extraction failed: {e}");
                        self.stats.record_package_failure();
                    }
                }
            }

            pacer.synchronize().await;

            if !flags.pause {
                ring.age();
            }

            if let Some(tx) = &self.reports {
                let _ = tx.try_send(IterationReport {
                    proc,
                    total: iteration_started.elapsed(),
                    transmitted,
                    paused: flags.pause,
                });
            }
        }

        info!("Pipeline stopped");
        Ok(())
    }
}
