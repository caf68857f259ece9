use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Observation;
use crate::frame::Frame;

/// Stub backend for testing and dry runs.
///
/// Idle by default (never sees a subject). A scripted stub replays a fixed
/// list of observations, one per frame, and repeats the list when it runs out.
pub struct StubBackend {
    script: VecDeque<Observation>,
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            frames_seen: 0,
        }
    }

    pub fn scripted(observations: Vec<Observation>) -> Self {
        Self {
            script: observations.into(),
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Observation> {
        self.frames_seen += 1;
        let Some(next) = self.script.pop_front() else {
            return Ok(Observation::empty());
        };
        self.script.push_back(next.clone());
        Ok(next)
    }
}
