// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::events::epoch_secs;

/// Outcome of the two-modality pairing policy (see the entry recognizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    QrMatched,
    QrMatchedAiFallback,
    AiMatched(String),
    AiMatchedQrFallback(String),
    AllFailed,
}

impl JobStatus {
    /// Human-readable form matching the persisted/displayed shape, e.g.
    /// `"AI_MATCHED (APPLE)"`.
    pub fn label(&self) -> String {
        match self {
            Self::QrMatched => "QR_MATCHED".to_owned(),
            Self::QrMatchedAiFallback => "QR_MATCHED (AI_FALLBACK)".to_owned(),
            Self::AiMatched(class) => format!("AI_MATCHED ({class})"),
            Self::AiMatchedQrFallback(class) => format!("AI_MATCHED ({class}) (QR_FALLBACK)"),
            Self::AllFailed => "ALL_FAILED".to_owned(),
        }
    }
}

/// One item moving down the belt, from recognition to lane consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub lane_index: usize,
    pub status: JobStatus,
    pub entry_time: f64,
    pub track_id: Option<u32>,
}

impl Job {
    pub fn new(lane_index: usize, status: JobStatus, track_id: Option<u32>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().simple().to_string()[..8].to_owned(),
            lane_index,
            status,
            entry_time: epoch_secs(),
            track_id,
        }
    }
}

/// FIFO of pending jobs awaiting their lane-sensor event.
///
/// Callers are responsible for holding the surrounding lock; this type only
/// owns the ordering discipline and the head-residency clock.
#[derive(Debug, Default)]
pub struct ProcessingQueue {
    jobs: VecDeque<Job>,
    head_since: Option<Instant>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, job: Job) {
        self.jobs.push_back(job);
        if self.head_since.is_none() {
            self.head_since = Some(Instant::now());
        }
    }

    pub fn pop_head(&mut self) -> Option<Job> {
        let popped = self.jobs.pop_front();
        self.head_since = if self.jobs.is_empty() { None } else { Some(Instant::now()) };
        popped
    }

    pub fn peek_head(&self) -> Option<&Job> {
        self.jobs.front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn head_since(&self) -> Option<Instant> {
        self.head_since
    }

    pub fn snapshot_indices(&self) -> Vec<usize> {
        self.jobs.iter().map(|j| j.lane_index).collect()
    }

    /// Restore queue contents from persisted jobs, resetting the head clock
    /// to "now" if the queue ends up non-empty (see persistence's restart
    /// handling).
    pub fn restore(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs.into();
        self.head_since = if self.jobs.is_empty() { None } else { Some(Instant::now()) };
    }

    pub fn drain_all(&mut self) -> Vec<Job> {
        self.head_since = None;
        self.jobs.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
