//! Nearest-neighbour matching of a probe embedding against the gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};

/// Maximum Euclidean distance accepted as a positive identification.
///
/// A calibration constant of the embedding space, not a per-call knob.
pub const ACCEPT_THRESHOLD: f32 = 0.6;

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// Linear-scan Euclidean matcher.
///
/// Ties resolve to the entry loaded first. The scan is linear in gallery
/// size, which is fine for tens of identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strict `<` keeps the earliest entry on ties; NaN never wins.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= ACCEPT_THRESHOLD => MatchResult {
                identity: gallery.entries()[idx].identity.clone(),
                confidence: ((1.0 - best_dist) * 100.0).clamp(0.0, 100.0),
                distance: best_dist,
            },
            _ => MatchResult::unknown(best_dist),
        }
    }
}
