// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Visual classifier evidence: confidence filtering, best-of selection, and
//! the configured class-to-lane lookup. Actual detection (model inference,
//! tracking) is an external collaborator.

use std::collections::HashMap;

use crate::canon::canon_id;
use crate::frame::Frame;

/// One raw detection from the external detector, before confidence
/// filtering or class-to-lane mapping.
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub track_id: Option<u32>,
}

/// External collaborator producing raw detections for a frame.
pub trait Classifier: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<Detection>;
}

/// Evidence from the visual classifier, already resolved to a lane.
#[derive(Debug, Clone)]
pub struct AiEvidence {
    pub lane_index: usize,
    pub class_name: String,
    pub track_id: Option<u32>,
}

/// Run the classifier over a frame and resolve its best surviving detection
/// to a lane index via `class_to_lane`, keyed by canonicalized class name.
/// Returns `None` if disabled (no detections), below threshold, or unmapped.
pub fn classify(
    frame: &Frame,
    classifier: &dyn Classifier,
    min_confidence: f32,
    class_to_lane: &HashMap<String, usize>,
) -> Option<AiEvidence> {
    classifier
        .detect(frame)
        .into_iter()
        .filter(|d| d.confidence >= min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .and_then(|best| {
            let class_name = best.class_name.to_uppercase();
            let key = canon_id(&class_name);
            class_to_lane
                .get(&key)
                .map(|&lane_index| AiEvidence { lane_index, class_name, track_id: best.track_id })
        })
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
