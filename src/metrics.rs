//! Resource sampling of the synthesis subprocess.

use serde::Serialize;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessMetrics {
    pub cpu_percent_average: f64,
    pub memory_mb_average: f64,
    pub memory_mb_peak: f64,
    pub processing_time_seconds: f64,
    pub text_length: usize,
}

/// Running totals over the samples taken so far.
#[derive(Debug, Default, Clone)]
pub struct ResourceSamples {
    count: u32,
    cpu_sum: f64,
    memory_sum: f64,
    memory_peak: f64,
}

impl ResourceSamples {
    pub fn record(&mut self, cpu_percent: f32, memory_bytes: u64) {
        let memory_mb = memory_bytes as f64 / MB;
        self.count += 1;
        self.cpu_sum += f64::from(cpu_percent);
        self.memory_sum += memory_mb;
        self.memory_peak = self.memory_peak.max(memory_mb);
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(&self, elapsed: Duration, text_length: usize) -> ProcessMetrics {
        let (cpu, memory) = if self.count == 0 {
            (0.0, 0.0)
        } else {
            let n = f64::from(self.count);
            (self.cpu_sum / n, self.memory_sum / n)
        };
        ProcessMetrics {
            cpu_percent_average: round_to(cpu, 1),
            memory_mb_average: round_to(memory, 2),
            memory_mb_peak: round_to(self.memory_peak, 2),
            processing_time_seconds: round_to(elapsed.as_secs_f64(), 2),
            text_length,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Polls CPU and resident memory of `pid` every `period` until `stop` fires,
/// the sender goes away, or the process disappears.
pub async fn sample_process(
    pid: u32,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> ResourceSamples {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    let mut samples = ResourceSamples::default();

    // First refresh only establishes the CPU baseline.
    if !system.refresh_process(pid) {
        debug!(%pid, "process exited before sampling started");
        return samples;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if !system.refresh_process(pid) {
                    break;
                }
                match system.process(pid) {
                    Some(process) => samples.record(process.cpu_usage(), process.memory()),
                    None => break,
                }
            }
        }
    }

    debug!(%pid, samples = samples.len(), "resource sampling stopped");
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_peak() {
        let mut s = ResourceSamples::default();
        s.record(50.0, 100 * 1024 * 1024);
        s.record(100.0, 200 * 1024 * 1024);
        let m = s.finish(Duration::from_millis(1234), 42);
        assert_eq!(m.cpu_percent_average, 75.0);
        assert_eq!(m.memory_mb_average, 150.0);
        assert_eq!(m.memory_mb_peak, 200.0);
        assert_eq!(m.processing_time_seconds, 1.23);
        assert_eq!(m.text_length, 42);
    }

    #[test]
    fn no_samples_yields_zeroes() {
        let m = ResourceSamples::default().finish(Duration::ZERO, 0);
        assert_eq!(m, ProcessMetrics::default());
    }

    #[tokio::test]
    async fn sampler_stops_on_signal() {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(sample_process(
            std::process::id(),
            Duration::from_millis(20),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        let samples = task.await.unwrap();
        assert!(!samples.is_empty());
    }
}
