//! Output device contract
//!
//! The playback scheduler talks to the host audio runtime through
//! [`OutputDevice`]: a monotonic clock that can be suspended and resumed, a
//! schedulable buffer sink, and a gain stage with linear ramp scheduling and
//! a cancel-and-hold primitive. [`VirtualOutputDevice`] is a deterministic
//! implementation used by tests and useful for offline rendering.

use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier of one scheduled buffer on the device.
pub type SourceId = u64;

/// Host audio runtime contract.
///
/// All methods are non-blocking; scheduling and gain changes take effect on
/// the device timeline, not synchronously.
pub trait OutputDevice: Send + Sync {
    /// Monotonic device clock in seconds. Does not advance while suspended.
    fn now(&self) -> f64;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Is the output clock currently running?
    fn is_running(&self) -> bool;

    /// Resume the output clock.
    fn resume(&self);

    /// Suspend the output clock.
    fn suspend(&self);

    /// Schedule a mono buffer to start playing at `start_time` (device clock).
    fn schedule(&self, samples: Arc<[f32]>, start_time: f64) -> SourceId;

    /// Stop a scheduled buffer, whether or not it has started.
    fn stop(&self, source: SourceId);

    /// Pin the gain to an exact value at `time`.
    fn set_gain_at(&self, value: f32, time: f64);

    /// Linearly ramp the gain from its current trajectory to `target`,
    /// finishing at `end_time`.
    fn ramp_gain_to(&self, target: f32, end_time: f64);

    /// Cancel scheduled gain changes after `time` and hold the value the gain
    /// has at that moment.
    fn hold_gain_at(&self, time: f64);
}

/// A buffer that was handed to the virtual device.
#[derive(Debug, Clone)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_time: f64,
    pub samples: Arc<[f32]>,
    pub stopped: bool,
}

impl ScheduledSource {
    /// Duration of this source in seconds at the given device rate.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}

#[derive(Debug)]
struct VirtualState {
    now: f64,
    running: bool,
    gain: f32,
    sources: Vec<ScheduledSource>,
    next_id: SourceId,
}

/// Deterministic in-memory output device.
///
/// The clock advances only through [`VirtualOutputDevice::advance`] and only
/// while running, mirroring a real audio context. Starts suspended.
pub struct VirtualOutputDevice {
    sample_rate: u32,
    state: Mutex<VirtualState>,
}

impl VirtualOutputDevice {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            state: Mutex::new(VirtualState {
                now: 0.0,
                running: false,
                gain: 1.0,
                sources: Vec::new(),
                next_id: 1,
            }),
        })
    }

    /// Advance the clock by `dt` seconds if the device is running.
    pub fn advance(&self, dt: f64) {
        let mut state = self.state.lock();
        if state.running {
            state.now += dt;
        }
    }

    /// Snapshot of every buffer ever scheduled, in scheduling order.
    pub fn scheduled(&self) -> Vec<ScheduledSource> {
        self.state.lock().sources.clone()
    }

    /// Buffers scheduled and not stopped.
    pub fn active_sources(&self) -> usize {
        self.state.lock().sources.iter().filter(|s| !s.stopped).count()
    }

    /// Last pinned gain value.
    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }
}

impl OutputDevice for VirtualOutputDevice {
    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn resume(&self) {
        self.state.lock().running = true;
    }

    fn suspend(&self) {
        self.state.lock().running = false;
    }

    fn schedule(&self, samples: Arc<[f32]>, start_time: f64) -> SourceId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.sources.push(ScheduledSource {
            id,
            start_time,
            samples,
            stopped: false,
        });
        id
    }

    fn stop(&self, source: SourceId) {
        let mut state = self.state.lock();
        if let Some(s) = state.sources.iter_mut().find(|s| s.id == source) {
            s.stopped = true;
        }
    }

    fn set_gain_at(&self, value: f32, _time: f64) {
        self.state.lock().gain = value;
    }

    fn ramp_gain_to(&self, target: f32, _end_time: f64) {
        // The virtual device applies ramp targets immediately.
        self.state.lock().gain = target;
    }

    fn hold_gain_at(&self, _time: f64) {}
}
