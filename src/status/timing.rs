//! Scan timing diagnostics.

use std::time::Duration;

use super::StatusAggregator;

pub const KEY_SCANS: &str = "scans";
pub const KEY_OVERTIME: &str = "overtime_count";
pub const KEY_HIGHEST: &str = "highest_scan_time";
pub const KEY_LOWEST: &str = "lowest_scan_time";
pub const KEY_ONLINE: &str = "online";

/// Round a millisecond figure to two decimals.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Running statistics about scan cycles and device reachability.
///
/// Every change is pushed into the [`StatusAggregator`] as it happens.
#[derive(Debug, Clone)]
pub struct TimingStats {
    scan_period_ms: f64,
    scan_count: u64,
    overtime_count: u64,
    min_run_time: f64,
    max_run_time: f64,
    /// `None` until the first scan completes.
    online: Option<bool>,
}

impl TimingStats {
    pub fn new(scan_period: Duration) -> Self {
        Self {
            scan_period_ms: scan_period.as_secs_f64() * 1000.0,
            scan_count: 0,
            overtime_count: 0,
            min_run_time: f64::MAX,
            max_run_time: 0.0,
            online: None,
        }
    }

    pub fn set_scan_period(&mut self, scan_period: Duration) {
        self.scan_period_ms = scan_period.as_secs_f64() * 1000.0;
    }

    /// Advance and return the scan counter.
    pub fn next_scan(&mut self) -> u64 {
        self.scan_count += 1;
        self.scan_count
    }

    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn overtime_count(&self) -> u64 {
        self.overtime_count
    }

    /// Fastest scan so far, if any scan completed.
    pub fn min_run_time(&self) -> Option<f64> {
        (self.min_run_time != f64::MAX).then_some(self.min_run_time)
    }

    /// Slowest scan so far, if any scan took measurable time.
    pub fn max_run_time(&self) -> Option<f64> {
        (self.max_run_time > 0.0).then_some(self.max_run_time)
    }

    /// Device reachability as of the last scan, if any scan ran yet.
    pub fn online(&self) -> Option<bool> {
        self.online
    }

    /// Account for one finished scan that took `elapsed_ms`.
    pub fn record_run_time(&mut self, elapsed_ms: f64, status: &StatusAggregator) {
        let t = round_ms(elapsed_ms);

        if t > self.scan_period_ms {
            self.overtime_count += 1;
            status.update_status([(KEY_OVERTIME, self.overtime_count)], true);
        }

        if t > self.max_run_time {
            self.max_run_time = t;
            status.update_status([(KEY_HIGHEST, t)], true);
        }

        if t < self.min_run_time {
            self.min_run_time = t;
            status.update_status([(KEY_LOWEST, t)], true);
        }

        status.update_status([(KEY_SCANS, self.scan_count)], false);
    }

    /// Record device reachability.
    ///
    /// The first call always reaches the status snapshot; after that only
    /// changes do.
    pub fn set_online(&mut self, online: bool, status: &StatusAggregator) {
        if self.online != Some(online) {
            self.online = Some(online);
            status.update_status([(KEY_ONLINE, online)], true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::Outbox;
    use crate::status::StatusValue;

    fn status() -> StatusAggregator {
        let (outbox, _rx) = Outbox::channel(1);
        StatusAggregator::new("t", outbox)
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_ms(12.3456), 12.35);
        assert_eq!(round_ms(0.004), 0.0);
        assert_eq!(round_ms(99.995), 100.0);
    }

    #[test]
    fn tracks_overtime_and_extremes() {
        let status = status();
        let mut stats = TimingStats::new(Duration::from_millis(100));

        for t in [50.0, 150.0, 90.0] {
            stats.next_scan();
            stats.record_run_time(t, &status);
        }

        assert_eq!(stats.overtime_count(), 1);
        assert_eq!(stats.max_run_time(), Some(150.0));
        assert_eq!(stats.min_run_time(), Some(50.0));

        assert_eq!(status.get(KEY_OVERTIME), Some(StatusValue::Int(1)));
        assert_eq!(status.get(KEY_HIGHEST), Some(StatusValue::Float(150.0)));
        assert_eq!(status.get(KEY_LOWEST), Some(StatusValue::Float(50.0)));
        assert_eq!(status.get(KEY_SCANS), Some(StatusValue::Int(3)));
    }

    #[test]
    fn exactly_on_period_is_not_overtime() {
        let status = status();
        let mut stats = TimingStats::new(Duration::from_millis(100));
        stats.record_run_time(100.0, &status);
        assert_eq!(stats.overtime_count(), 0);
        assert_eq!(status.get(KEY_OVERTIME), None);
    }

    #[test]
    fn no_scans_means_no_extremes() {
        let stats = TimingStats::new(Duration::from_millis(100));
        assert_eq!(stats.min_run_time(), None);
        assert_eq!(stats.max_run_time(), None);
    }

    #[test]
    fn first_online_report_is_always_published() {
        let status = status();
        let mut stats = TimingStats::new(Duration::from_millis(100));
        assert_eq!(stats.online(), None);

        stats.set_online(false, &status);
        assert_eq!(status.get(KEY_ONLINE), Some(StatusValue::Bool(false)));
        assert_eq!(stats.online(), Some(false));
    }

    #[test]
    fn online_is_edge_triggered() {
        let status = status();
        let mut stats = TimingStats::new(Duration::from_millis(100));

        stats.set_online(true, &status);
        assert_eq!(status.get(KEY_ONLINE), Some(StatusValue::Bool(true)));

        // An unchanged report does not touch the snapshot.
        status.update_status([(KEY_ONLINE, "marker")], false);
        stats.set_online(true, &status);
        assert_eq!(status.get(KEY_ONLINE), Some(StatusValue::from("marker")));

        stats.set_online(false, &status);
        assert_eq!(status.get(KEY_ONLINE), Some(StatusValue::Bool(false)));
        assert_eq!(stats.online(), Some(false));
    }

    #[test]
    fn scan_period_change_moves_overtime_threshold() {
        let status = status();
        let mut stats = TimingStats::new(Duration::from_millis(100));
        stats.set_scan_period(Duration::from_millis(20));
        stats.record_run_time(50.0, &status);
        assert_eq!(stats.overtime_count(), 1);
    }
}
