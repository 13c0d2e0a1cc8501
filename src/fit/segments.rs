//! Gap statistics over calendar segments.
//!
//! Segment bounds are inclusive on both ends and compared at month granularity.
//! Pre-period and post-1 are relative to the fit specification; the pandemic
//! interval and the post-2 start come from `EventWindows`.

use chrono::NaiveDate;

use crate::domain::{FitSpec, SegmentStats, SegmentSummary};
use crate::math::finite_rms_and_mean;

/// Added to the pre-period RMSPE so an exact pre-fit does not divide by zero.
pub const RATIO_EPS: f64 = 1e-12;

/// RMS and mean of the finite gap values dated within `[start, end]`.
pub fn segment_stats(dates: &[NaiveDate], gap: &[f64], start: NaiveDate, end: NaiveDate) -> SegmentStats {
    let (rmspe, mean_gap, n) = finite_rms_and_mean(
        dates
            .iter()
            .zip(gap.iter())
            .filter(|(d, _)| **d >= start && **d <= end)
            .map(|(_, g)| *g),
    );
    if n == 0 {
        return SegmentStats::undefined();
    }
    SegmentStats { rmspe, mean_gap, n }
}

/// The four fixed segments of one fit.
pub fn summarize_segments(
    dates: &[NaiveDate],
    gap: &[f64],
    spec: &FitSpec,
) -> SegmentSummary {
    let windows = &spec.windows;
    SegmentSummary {
        pre: segment_stats(dates, gap, spec.pre_start, spec.pre_end()),
        post1: segment_stats(dates, gap, spec.t0, spec.fit_end),
        pandemic: segment_stats(dates, gap, windows.pandemic_start, windows.pandemic_end),
        post2: segment_stats(dates, gap, windows.post2_start, spec.full_end),
    }
}

/// `segment / (pre + ε)`; NaN in either input gives NaN.
pub fn error_ratio(segment_rmspe: f64, pre_rmspe: f64) -> f64 {
    segment_rmspe / (pre_rmspe + RATIO_EPS)
}
