//! Look-ahead playback scheduler
//!
//! Accepts arbitrarily-timed chunks of PCM, resamples them to the device
//! rate, and schedules gap-free playback against the device clock. Never
//! drops unplayed audio; never reorders. While the start gate is closed
//! nothing is consumed from the queue, so audio accumulates until the
//! predictor signals it is safe to begin. An underrun schedules nothing;
//! silence follows until more chunks arrive.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use speech_stream_config::SchedulerConfig;
use speech_stream_core::audio::{resample_linear, AudioChunk, OnStart};

use crate::device::{OutputDevice, SourceId};
use crate::AudioError;

/// Chunk-start callbacks fire once `now >= start_time - epsilon`.
const CALLBACK_EPSILON_SECS: f64 = 0.005;

/// Cushion after the fade-out ramp before suspending, so the render thread
/// does not cut the ramp mid-sample.
const SUSPEND_CUSHION_SECS: f64 = 0.005;

/// Observable playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Playback not requested.
    Paused,
    /// Playback requested but the start gate is still closed.
    Waiting,
    /// Playback requested and the gate is open.
    Playing,
}

struct Inner {
    /// Not-yet-scheduled audio, insertion order = playback order.
    queue: VecDeque<AudioChunk>,
    /// Sum of durations of chunks currently in `queue`.
    queued_secs: f64,
    /// Device-clock time at which the next dequeued chunk will start.
    next_time: f64,
    /// Sources already handed to the device, with their end times.
    scheduled: Vec<(SourceId, f64)>,
    /// Start callbacks waiting for their start time to elapse.
    pending_callbacks: VecDeque<(f64, OnStart)>,
    /// Start gate; closed means the queue is not consumed.
    gate_open: bool,
    /// User intent; audibility additionally requires the gate and the clock.
    play_requested: bool,
}

/// FIFO look-ahead scheduler over a schedulable output device.
pub struct PlaybackScheduler {
    config: SchedulerConfig,
    device: Arc<dyn OutputDevice>,
    inner: Mutex<Inner>,
    disposed: AtomicBool,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackScheduler {
    /// Create a scheduler over `device`. The device starts suspended; the
    /// tick loop is not running until [`PlaybackScheduler::start`].
    pub fn new(config: SchedulerConfig, device: Arc<dyn OutputDevice>) -> Arc<Self> {
        let next_time = device.now() + config.safety_secs;
        let gate_open = config.start_gate_initially_open;

        Arc::new(Self {
            config,
            device,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                queued_secs: 0.0,
                next_time,
                scheduled: Vec::new(),
                pending_callbacks: VecDeque::new(),
                gate_open,
                play_requested: false,
            }),
            disposed: AtomicBool::new(false),
            tick_task: Mutex::new(None),
        })
    }

    /// Spawn the fixed-interval tick task on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.tick_task.lock();
        if task.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.tick_ms);
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(scheduler) => scheduler.tick(),
                    None => break,
                }
            }
        }));
    }

    /// Enqueue a mono chunk for sequential playback.
    ///
    /// Resamples to the device rate. Zero-length input is a no-op.
    pub fn enqueue(
        &self,
        samples: &[f32],
        source_rate: u32,
        on_start: Option<OnStart>,
    ) -> Result<(), AudioError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AudioError::Disposed);
        }
        if samples.is_empty() {
            return Ok(());
        }

        let device_rate = self.device.sample_rate();
        let pcm = resample_linear(samples, source_rate, device_rate);
        let mut chunk = AudioChunk::new(pcm, device_rate);
        chunk.on_start = on_start;

        let mut inner = self.inner.lock();
        inner.queued_secs += chunk.duration_secs();
        inner.queue.push_back(chunk);
        Ok(())
    }

    /// Open or close the start gate.
    ///
    /// Opening re-anchors the timeline to `now + safety` so the backlog is
    /// not scheduled into a long-gone past. The gate never closes on its own.
    pub fn set_start_gate_open(&self, open: bool) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut inner = self.inner.lock();
        let was_open = inner.gate_open;
        inner.gate_open = open;

        if !was_open && open {
            inner.next_time = self.device.now() + self.config.safety_secs;
        }
    }

    /// Open the gate when the predictor signals it is safe. Only ever opens.
    pub fn update_should_start(&self, should_start: bool) {
        if should_start {
            self.set_start_gate_open(true);
        }
    }

    pub fn is_start_gate_open(&self) -> bool {
        self.inner.lock().gate_open
    }

    /// Request playback and resume the output clock with a short fade-in.
    /// Idempotent.
    pub async fn play(&self) -> Result<(), AudioError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AudioError::Disposed);
        }

        self.inner.lock().play_requested = true;

        if self.device.is_running() {
            return Ok(());
        }

        let t = self.device.now();
        self.device.hold_gain_at(t);
        self.device.set_gain_at(0.0, t);
        self.device.ramp_gain_to(1.0, t + self.config.ramp_secs);
        self.device.resume();
        Ok(())
    }

    /// Fade out, wait for the ramp, then suspend the clock. Buffered audio is
    /// not consumed; resume continues at the correct sample. Idempotent.
    pub async fn pause(&self) -> Result<(), AudioError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }

        {
            let mut inner = self.inner.lock();
            if !inner.play_requested {
                return Ok(());
            }
            inner.play_requested = false;
        }

        if !self.device.is_running() {
            return Ok(());
        }

        let t = self.device.now();
        self.device.hold_gain_at(t);
        self.device.ramp_gain_to(0.0, t + self.config.ramp_secs);

        tokio::time::sleep(Duration::from_secs_f64(
            self.config.ramp_secs + SUSPEND_CUSHION_SECS,
        ))
        .await;

        let t = self.device.now();
        self.device.hold_gain_at(t);
        self.device.set_gain_at(0.0, t);
        self.device.suspend();
        Ok(())
    }

    /// Drop all queued and already-scheduled audio and re-anchor the
    /// timeline. Play intent and gate state are untouched.
    pub fn clear(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.clear_inner();
    }

    fn clear_inner(&self) {
        let mut inner = self.inner.lock();
        for (source, _) in inner.scheduled.drain(..) {
            self.device.stop(source);
        }
        inner.queue.clear();
        inner.queued_secs = 0.0;
        inner.pending_callbacks.clear();
        inner.next_time = self.device.now() + self.config.safety_secs;
    }

    /// Seconds of audio guaranteed not to underrun if no more chunks arrive
    /// (scheduled ahead of the clock plus still queued). The safety-margin
    /// anchor itself does not count as buffered audio.
    pub fn buffered_secs(&self) -> f64 {
        let inner = self.inner.lock();
        let now = self.device.now();
        let scheduled_ahead = (inner.next_time - now - self.config.safety_secs).max(0.0);
        scheduled_ahead + inner.queued_secs
    }

    /// True only when play was requested, the gate is open, and the output
    /// clock is running.
    pub fn is_playing(&self) -> bool {
        let inner = self.inner.lock();
        inner.play_requested && inner.gate_open && self.device.is_running()
    }

    /// Observable state: paused, waiting on the gate, or playing.
    pub fn state(&self) -> PlaybackState {
        let inner = self.inner.lock();
        if !inner.play_requested {
            PlaybackState::Paused
        } else if inner.gate_open {
            PlaybackState::Playing
        } else {
            PlaybackState::Waiting
        }
    }

    /// One scheduler tick: fire due chunk-start callbacks, then move queued
    /// chunks onto the device timeline up to the look-ahead horizon.
    ///
    /// Normally driven by the task spawned in [`PlaybackScheduler::start`];
    /// exposed so hosts with their own timer can drive it directly.
    pub fn tick(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        self.flush_started_callbacks();

        let mut inner = self.inner.lock();
        if !inner.play_requested || !inner.gate_open {
            return;
        }

        let now = self.device.now();

        // Underrun or reset: re-anchor so nothing is scheduled in the past.
        if inner.next_time < now + self.config.safety_secs {
            inner.next_time = now + self.config.safety_secs;
        }

        let horizon = now + self.config.schedule_ahead_secs;

        while inner.next_time < horizon {
            let Some(mut chunk) = inner.queue.pop_front() else {
                // Queue drained before the horizon filled: silence until more
                // chunks arrive.
                break;
            };

            let duration = chunk.duration_secs();
            inner.queued_secs = (inner.queued_secs - duration).max(0.0);

            let start_time = inner.next_time;
            let on_start = chunk.on_start.take();
            let source = self.device.schedule(chunk.samples, start_time);

            inner.scheduled.push((source, start_time + duration));
            if let Some(callback) = on_start {
                inner.pending_callbacks.push_back((start_time, callback));
            }

            inner.next_time = start_time + duration;
        }

        // Forget sources that have finished playing.
        inner.scheduled.retain(|&(_, end)| end > now);
    }

    /// Fire `on_start` callbacks whose start time has elapsed, in chunk
    /// order, exactly once each. A panicking callback is isolated.
    fn flush_started_callbacks(&self) {
        let due: Vec<OnStart> = {
            let mut inner = self.inner.lock();
            let now = self.device.now();
            let mut due = Vec::new();
            while inner
                .pending_callbacks
                .front()
                .is_some_and(|(start, _)| *start <= now + CALLBACK_EPSILON_SECS)
            {
                let (_, callback) = inner.pending_callbacks.pop_front().unwrap();
                due.push(callback);
            }
            due
        };

        for callback in due {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::warn!("chunk start callback panicked");
            }
        }
    }

    /// Tear down: stop the tick task, discard all audio, and reject further
    /// operations.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = self.tick_task.lock().take() {
            task.abort();
        }

        // Past the disposed flag; release scheduled sources directly.
        let mut inner = self.inner.lock();
        for (source, _) in inner.scheduled.drain(..) {
            self.device.stop(source);
        }
        inner.queue.clear();
        inner.queued_secs = 0.0;
        inner.pending_callbacks.clear();
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.tick_task.lock().take() {
            task.abort();
        }
    }
}
