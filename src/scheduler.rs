//! Periodic scan loop.
//!
//! Each tick reads every monitored block, runs its detector, publishes the
//! resulting presses and feeds timing diagnostics into the status snapshot.
//! A failing block is logged and skipped; the rest of the tick carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{FieldbusSettings, Timing};
use crate::detect::{EdgeDetector, PressEvent};
use crate::source::FieldSource;
use crate::status::{round_ms, StatusAggregator, TimingStats, OUTPUT_TOPIC};

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub scan: u64,
    /// Wall time of the tick in milliseconds, rounded to two decimals.
    pub elapsed_ms: f64,
    pub events: Vec<PressEvent>,
    /// Labels of the blocks whose read or evaluation failed.
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn is_online(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives all edge detectors against one field source.
#[derive(Debug)]
pub struct Scheduler {
    source: Arc<dyn FieldSource>,
    detectors: Vec<EdgeDetector>,
    status: StatusAggregator,
    stats: TimingStats,
    timing: Timing,
    read_timeout: Duration,
}

/// Shortest scan period the loop will run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Scheduler {
    /// Build one detector per configured block and publish the initial facts.
    pub fn new(
        settings: &FieldbusSettings,
        source: Arc<dyn FieldSource>,
        status: StatusAggregator,
    ) -> Self {
        let timing = settings.timing();
        let detectors = settings
            .read
            .iter()
            .map(|block| EdgeDetector::new(block, &timing))
            .collect();

        status.update_status(
            [
                ("overtime_count", 0u64),
                ("scan_time", millis(timing.scan_period)),
                ("long_click_time", millis(timing.long_press)),
            ],
            true,
        );

        Self {
            source,
            detectors,
            status,
            stats: TimingStats::new(timing.scan_period),
            timing,
            read_timeout: settings.read_timeout(),
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn stats(&self) -> &TimingStats {
        &self.stats
    }

    pub fn detectors(&self) -> &[EdgeDetector] {
        &self.detectors
    }

    pub fn status(&self) -> &StatusAggregator {
        &self.status
    }

    /// Run one scan across all blocks.
    pub async fn tick(&mut self) -> ScanReport {
        let scan = self.stats.next_scan();
        let started = Instant::now();

        let source = self.source.as_ref();
        let mut events = Vec::new();
        let mut failed = Vec::new();

        for detector in self.detectors.iter_mut() {
            match detector.evaluate(source, self.read_timeout).await {
                Ok(found) => {
                    for event in found {
                        if let Err(e) = self.status.publish_change(OUTPUT_TOPIC, &event) {
                            warn!("Failed to queue press event {:?}: {}", event, e);
                        }
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to read {} from {}: {}",
                        detector.label(),
                        source.description(),
                        e
                    );
                    failed.push(detector.label());
                }
            }
        }

        self.stats.set_online(failed.is_empty(), &self.status);

        let elapsed_ms = round_ms(started.elapsed().as_secs_f64() * 1000.0);
        self.stats.record_run_time(elapsed_ms, &self.status);

        ScanReport {
            scan,
            elapsed_ms,
            events,
            failed,
        }
    }

    /// Apply new scan and long-press timings.
    ///
    /// A zero scan period is rejected and the current timing kept.
    pub fn retime(&mut self, timing: Timing) {
        if timing.scan_period.is_zero() {
            warn!("Ignoring zero scan period");
            return;
        }

        for detector in self.detectors.iter_mut() {
            detector.retime(&timing);
        }
        self.stats.set_scan_period(timing.scan_period);
        self.timing = timing;

        self.status.update_status(
            [
                ("scan_time", millis(timing.scan_period)),
                ("long_click_time", millis(timing.long_press)),
            ],
            true,
        );
    }

    /// Start ticking every scan period on a background task.
    ///
    /// The first tick happens one period after the call. Dropping the
    /// returned handle stops the loop.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (timing_tx, timing_rx) = watch::channel(self.timing);
        let task = tokio::spawn(self.run(stop_rx, timing_rx));

        SchedulerHandle {
            stop_tx,
            timing_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut stop_rx: watch::Receiver<bool>,
        mut timing_rx: watch::Receiver<Timing>,
    ) -> Self {
        let mut period = self.timing.scan_period;
        let mut ticker = scan_interval(period);
        info!(
            "Scanning {} blocks from {} every {} ms",
            self.detectors.len(),
            self.source.description(),
            millis(period)
        );

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                changed = timing_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let timing = *timing_rx.borrow_and_update();
                    self.retime(timing);
                    if self.timing.scan_period != period {
                        period = self.timing.scan_period;
                        ticker = scan_interval(period);
                    }
                }
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(
                        "Scan {} took {} ms, {} events, {} failed",
                        report.scan,
                        report.elapsed_ms,
                        report.events.len(),
                        report.failed.len()
                    );
                }
            }
        }

        info!("Scheduler stopped after {} scans", self.stats.scan_count());
        self
    }
}

/// Ticker for the scan loop. Periods below 1 ms are raised to 1 ms.
fn scan_interval(period: Duration) -> tokio::time::Interval {
    let period = period.max(MIN_PERIOD);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Handle for a running [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    timing_tx: watch::Sender<Timing>,
    task: JoinHandle<Scheduler>,
}

impl SchedulerHandle {
    /// Request the loop to stop. An in-flight tick completes first.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Change scan and long-press timings while running.
    pub fn retime(&self, timing: Timing) {
        let _ = self.timing_tx.send(timing);
    }

    /// Wait for the loop to end and take the scheduler back.
    pub async fn join(self) -> Result<Scheduler, JoinError> {
        self.task.await
    }
}
