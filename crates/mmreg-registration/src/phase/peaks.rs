//! Local maxima of the joint histogram.
//!
//! A bucket is a candidate when it holds positive mass and no bucket within
//! a Chebyshev window of radius `max(min_distance, 1)` holds more.
//! Candidates are ranked by mass (scan order on ties) and accepted greedily
//! when further than `min_distance` from every accepted peak.

use crate::histogram::JointHistogram;
use super::gaussian::Peak;

/// Detect at most `max_peaks` local maxima, heaviest first.
pub fn find_local_maxima(
    hist: &JointHistogram,
    min_distance: usize,
    max_peaks: usize,
) -> Vec<Peak> {
    if max_peaks == 0 {
        return Vec::new();
    }
    let bins = hist.bins();
    let window = min_distance.max(1);

    let mut candidates = Vec::new();
    for row in 0..bins {
        for col in 0..bins {
            let mass = hist.get(row, col);
            if mass > 0.0 && is_window_maximum(hist, row, col, window) {
                candidates.push(Peak { row, col, mass });
            }
        }
    }

    // stable: equal masses keep scan order
    candidates.sort_by(|p, q| q.mass.total_cmp(&p.mass));

    let mut peaks: Vec<Peak> = Vec::with_capacity(max_peaks.min(candidates.len()));
    for candidate in candidates {
        let far_enough = peaks
            .iter()
            .all(|p| chebyshev(p, &candidate) > min_distance);
        if far_enough {
            peaks.push(candidate);
            if peaks.len() == max_peaks {
                break;
            }
        }
    }
    tracing::debug!("found {} local maxima (min distance {})", peaks.len(), min_distance);
    peaks
}

fn is_window_maximum(hist: &JointHistogram, row: usize, col: usize, window: usize) -> bool {
    let bins = hist.bins();
    let value = hist.get(row, col);
    let r0 = row.saturating_sub(window);
    let r1 = (row + window).min(bins - 1);
    let c0 = col.saturating_sub(window);
    let c1 = (col + window).min(bins - 1);
    (r0..=r1).all(|r| (c0..=c1).all(|c| hist.get(r, c) <= value))
}

#[inline]
fn chebyshev(p: &Peak, q: &Peak) -> usize {
    p.row.abs_diff(q.row).max(p.col.abs_diff(q.col))
}
