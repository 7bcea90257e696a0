//! Scripted field source.
//!
//! Plays back queued samples per block. Useful for tests and for running
//! the bridge without hardware.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::FieldSource;
use crate::config::InputKind;
use crate::error::FieldSourceError;

#[derive(Debug, Clone)]
enum Step {
    Sample(Vec<bool>),
    Fail(String),
    Stall(Duration),
}

/// A field source that answers reads from per-block queues.
///
/// Each `(kind, start)` pair has its own queue. When a queue runs dry the
/// last returned sample is repeated, or all inputs read low if nothing was
/// ever queued.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queues: Mutex<HashMap<(InputKind, u16), VecDeque<Step>>>,
    last: Mutex<HashMap<(InputKind, u16), Vec<bool>>>,
    reads: Mutex<u64>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a sample for the block starting at `start`.
    pub fn push_sample(&self, kind: InputKind, start: u16, bits: Vec<bool>) {
        self.push(kind, start, Step::Sample(bits));
    }

    /// Queue a sequence of single-input samples given as 0/1 values.
    pub fn push_levels(&self, kind: InputKind, start: u16, levels: &[u8]) {
        for &level in levels {
            self.push_sample(kind, start, vec![level != 0]);
        }
    }

    /// Queue a transport failure for the block starting at `start`.
    pub fn push_failure(&self, kind: InputKind, start: u16, reason: &str) {
        self.push(kind, start, Step::Fail(reason.to_string()));
    }

    /// Queue a read that sleeps for `delay` and then fails with a timeout.
    pub fn push_stall(&self, kind: InputKind, start: u16, delay: Duration) {
        self.push(kind, start, Step::Stall(delay));
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> u64 {
        *self.reads.lock()
    }

    fn push(&self, kind: InputKind, start: u16, step: Step) {
        self.queues
            .lock()
            .entry((kind, start))
            .or_default()
            .push_back(step);
    }
}

#[async_trait]
impl FieldSource for ScriptedSource {
    async fn read(
        &self,
        kind: InputKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, FieldSourceError> {
        *self.reads.lock() += 1;

        let step = self
            .queues
            .lock()
            .get_mut(&(kind, start))
            .and_then(|queue| queue.pop_front());

        match step {
            Some(Step::Sample(bits)) => {
                self.last.lock().insert((kind, start), bits.clone());
                Ok(bits)
            }
            Some(Step::Fail(reason)) => Err(FieldSourceError::Transport(reason)),
            Some(Step::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Err(FieldSourceError::Timeout(delay))
            }
            None => {
                let last = self.last.lock().get(&(kind, start)).cloned();
                Ok(last.unwrap_or_else(|| vec![false; usize::from(count)]))
            }
        }
    }

    fn description(&self) -> &str {
        "scripted"
    }
}
