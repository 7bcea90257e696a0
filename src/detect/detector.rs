//! Press detection for one monitored block.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::window::{has_falling_edge, has_high_run, Window};
use crate::config::{BlockSettings, InputKind, Timing};
use crate::error::FieldSourceError;
use crate::source::FieldSource;

/// How long an input was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressKind {
    Short,
    Long,
}

/// A debounced activation of one input, published on the output topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressEvent {
    pub address: u16,
    #[serde(rename = "press")]
    pub kind: PressKind,
}

impl PressEvent {
    pub fn short(address: u16) -> Self {
        Self {
            address,
            kind: PressKind::Short,
        }
    }

    pub fn long(address: u16) -> Self {
        Self {
            address,
            kind: PressKind::Long,
        }
    }
}

/// Turns a stream of block samples into press events.
///
/// The detector keeps the last `D` samples of its block, where `D` is the
/// debounce depth derived from the scan period and long-press duration.
/// For each input:
///
/// - `D` consecutive highs is a long press;
/// - otherwise a high followed by a low is a short press, unless a short
///   press was already recorded for that input on the previous scan.
///
/// Either match clears the input's history so the same activation is not
/// reported twice. After a long press the input stays latched until a low
/// sample is seen, so holding past `D` scans and then releasing yields
/// nothing more.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    kind: InputKind,
    start: u16,
    count: u16,
    depth: usize,
    window: Window,
    scan: u64,
    /// Scan of the last short-press match per input.
    last_short: Vec<u64>,
    /// Inputs that fired a long press and have not been released yet.
    held: Vec<bool>,
    polling: bool,
}

impl EdgeDetector {
    pub fn new(block: &BlockSettings, timing: &Timing) -> Self {
        let depth = timing.debounce_depth();
        let width = usize::from(block.count);
        Self {
            kind: block.kind,
            start: block.start,
            count: block.count,
            depth,
            window: Window::new(width, depth),
            scan: 0,
            last_short: vec![0; width],
            held: vec![false; width],
            polling: false,
        }
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn scan(&self) -> u64 {
        self.scan
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Human-readable block identifier for logs.
    pub fn label(&self) -> String {
        format!("{}@{}+{}", self.kind, self.start, self.count)
    }

    /// Recompute the debounce depth. The window is resized on the next sample.
    pub fn retime(&mut self, timing: &Timing) {
        let depth = timing.debounce_depth();
        if depth != self.depth {
            debug!(
                "Block {} debounce depth {} -> {}",
                self.label(),
                self.depth,
                depth
            );
            self.depth = depth;
        }
    }

    /// Read the block from the field device and run one debounce cycle.
    pub async fn evaluate(
        &mut self,
        source: &dyn FieldSource,
        timeout: Duration,
    ) -> Result<Vec<PressEvent>, FieldSourceError> {
        let sample = tokio::time::timeout(timeout, source.read(self.kind, self.start, self.count))
            .await
            .map_err(|_| FieldSourceError::Timeout(timeout))??;

        let events = self.observe(&sample)?;

        if !self.polling {
            info!("Module {} is polling.", self.label());
            self.polling = true;
        }
        Ok(events)
    }

    /// Feed one sample into the window and collect the presses it completes.
    pub fn observe(&mut self, sample: &[bool]) -> Result<Vec<PressEvent>, FieldSourceError> {
        let width = usize::from(self.count);
        if sample.len() < width {
            return Err(FieldSourceError::ShortRead {
                expected: width,
                actual: sample.len(),
            });
        }

        self.scan += 1;
        if self.window.capacity() != self.depth {
            self.window.resize(self.depth);
        }
        self.window.push(&sample[..width]);

        let mut events = Vec::new();
        for index in 0..width {
            let address = self.start.wrapping_add(index as u16);

            if self.held[index] {
                if !sample[index] {
                    self.held[index] = false;
                }
                self.window.clear_index(index);
                continue;
            }

            if has_high_run(self.window.history(index), self.depth) {
                events.push(PressEvent::long(address));
                self.held[index] = true;
                self.window.clear_index(index);
                continue;
            }

            if has_falling_edge(self.window.history(index)) {
                if self.short_press_due(index) {
                    events.push(PressEvent::short(address));
                }
                self.last_short[index] = self.scan;
                self.window.clear_index(index);
            }
        }
        Ok(events)
    }

    /// A short press is suppressed on the scan right after the previous match.
    fn short_press_due(&self, index: usize) -> bool {
        self.scan > self.last_short[index] + 1
    }
}
