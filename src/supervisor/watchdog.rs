//! Resource watchdog
//!
//! Samples host CPU load on a fixed interval. Sustained overload means the
//! process is likely wedged (a stuck renderer, runaway children), so the
//! watchdog asks the crawl loop to checkpoint and exit for a restart.

use crate::config::WatchdogConfig;
use crate::supervisor::{StopHandle, StopReason};
use std::time::Duration;
use sysinfo::System;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Source of host load readings, in percent
pub trait LoadSampler: Send {
    fn sample(&mut self) -> f32;
}

/// Global CPU usage as reported by the operating system
///
/// Each reading covers the time since the previous one, so the first reading
/// after construction is not meaningful until some time has passed.
pub struct SystemLoadSampler {
    system: System,
}

impl SystemLoadSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SystemLoadSampler {
    fn sample(&mut self) -> f32 {
        self.system.refresh_cpu_usage();
        self.system.global_cpu_usage()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Normal,
    Overloaded,
}

/// Counts consecutive overloaded samples
///
/// Trips exactly once, on the sample that completes the streak. Any sample
/// below the threshold resets the streak.
#[derive(Debug, Clone)]
pub struct OverloadDetector {
    threshold: f32,
    sustain: u32,
    consecutive: u32,
    tripped: bool,
}

impl OverloadDetector {
    pub fn new(threshold: f32, sustain: u32) -> Self {
        Self {
            threshold,
            sustain: sustain.max(1),
            consecutive: 0,
            tripped: false,
        }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(config.threshold_percent, config.sustain_samples)
    }

    /// Records a sample; returns true if this sample trips the detector
    pub fn observe(&mut self, load: f32) -> bool {
        if load < self.threshold {
            self.consecutive = 0;
            return false;
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if !self.tripped && self.consecutive >= self.sustain {
            self.tripped = true;
            return true;
        }
        false
    }

    pub fn state(&self) -> LoadState {
        if self.consecutive > 0 {
            LoadState::Overloaded
        } else {
            LoadState::Normal
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

/// Starts the watchdog task
///
/// The task ends after requesting a stop, or when aborted by the caller.
pub fn spawn_watchdog<L>(config: &WatchdogConfig, mut sampler: L, stop: StopHandle) -> JoinHandle<()>
where
    L: LoadSampler + 'static,
{
    let mut detector = OverloadDetector::from_config(config);
    let period = Duration::from_millis(config.sample_interval_ms);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let load = sampler.sample();
            tracing::trace!("CPU usage: {:.1}%", load);

            if detector.observe(load) {
                tracing::error!(
                    "CPU usage at or above {:.0}% for {} consecutive samples. Forcing restart...",
                    detector.threshold,
                    detector.sustain
                );
                stop.request(StopReason::Overloaded);
                return;
            }
        }
    })
}
