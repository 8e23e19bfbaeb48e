//! Regulatory time buckets for EVE breakdown reporting.
//!
//! Two bucket sets exist: the regulatory-compliance default (§6) and a
//! coarser visualisation variant. Both are contiguous, ordered, half-open
//! `[start, end)` intervals in years with an open-ended final bucket.

/// One `[start_years, end_years)` time bucket. `end_years` is `None` for
/// the open-ended final bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBucket {
    pub name: &'static str,
    pub start_years: f64,
    pub end_years: Option<f64>,
}

impl TimeBucket {
    /// The fallback representative `t` for this bucket: its midpoint, or
    /// `open_ended_point` years for the open-ended final bucket.
    pub fn representative_t(&self, open_ended_point: f64) -> f64 {
        match self.end_years {
            Some(end) => (self.start_years + end) / 2.0,
            None => open_ended_point,
        }
    }

    pub fn contains(&self, t_years: f64) -> bool {
        match self.end_years {
            Some(end) => t_years >= self.start_years && t_years < end,
            None => t_years >= self.start_years,
        }
    }
}

/// Default `open_ended_point` for the final bucket's representative `t`.
pub const DEFAULT_OPEN_ENDED_POINT_YEARS: f64 = 10.0;

/// The regulatory-compliance default EVE bucket grid (§6).
pub const EVE_REGULATORY_BUCKETS: [TimeBucket; 18] = [
    TimeBucket { name: "0_1M", start_years: 0.0, end_years: Some(1.0 / 12.0) },
    TimeBucket { name: "1M_3M", start_years: 1.0 / 12.0, end_years: Some(3.0 / 12.0) },
    TimeBucket { name: "3M_6M", start_years: 3.0 / 12.0, end_years: Some(6.0 / 12.0) },
    TimeBucket { name: "6M_9M", start_years: 6.0 / 12.0, end_years: Some(9.0 / 12.0) },
    TimeBucket { name: "9M_1Y", start_years: 9.0 / 12.0, end_years: Some(1.0) },
    TimeBucket { name: "1Y_1.5Y", start_years: 1.0, end_years: Some(1.5) },
    TimeBucket { name: "1.5Y_2Y", start_years: 1.5, end_years: Some(2.0) },
    TimeBucket { name: "2Y_3Y", start_years: 2.0, end_years: Some(3.0) },
    TimeBucket { name: "3Y_4Y", start_years: 3.0, end_years: Some(4.0) },
    TimeBucket { name: "4Y_5Y", start_years: 4.0, end_years: Some(5.0) },
    TimeBucket { name: "5Y_6Y", start_years: 5.0, end_years: Some(6.0) },
    TimeBucket { name: "6Y_7Y", start_years: 6.0, end_years: Some(7.0) },
    TimeBucket { name: "7Y_8Y", start_years: 7.0, end_years: Some(8.0) },
    TimeBucket { name: "8Y_9Y", start_years: 8.0, end_years: Some(9.0) },
    TimeBucket { name: "9Y_10Y", start_years: 9.0, end_years: Some(10.0) },
    TimeBucket { name: "10Y_15Y", start_years: 10.0, end_years: Some(15.0) },
    TimeBucket { name: "15Y_20Y", start_years: 15.0, end_years: Some(20.0) },
    TimeBucket { name: "20Y_PLUS", start_years: 20.0, end_years: None },
];

/// A coarser, reporting-friendly grid for dashboard/chart consumption.
/// Collapses the sub-year detail into quarters and merges the long end.
pub const VISUALISATION_BUCKETS: [TimeBucket; 10] = [
    TimeBucket { name: "0_3M", start_years: 0.0, end_years: Some(0.25) },
    TimeBucket { name: "3M_6M", start_years: 0.25, end_years: Some(0.5) },
    TimeBucket { name: "6M_1Y", start_years: 0.5, end_years: Some(1.0) },
    TimeBucket { name: "1Y_2Y", start_years: 1.0, end_years: Some(2.0) },
    TimeBucket { name: "2Y_3Y", start_years: 2.0, end_years: Some(3.0) },
    TimeBucket { name: "3Y_5Y", start_years: 3.0, end_years: Some(5.0) },
    TimeBucket { name: "5Y_7Y", start_years: 5.0, end_years: Some(7.0) },
    TimeBucket { name: "7Y_10Y", start_years: 7.0, end_years: Some(10.0) },
    TimeBucket { name: "10Y_20Y", start_years: 10.0, end_years: Some(20.0) },
    TimeBucket { name: "20Y_PLUS", start_years: 20.0, end_years: None },
];

/// Find the bucket containing `t_years` in a given grid. `t_years < 0` is
/// clamped into the first bucket (a flow dated at or before the analysis
/// date, which should not occur per the "all flows after analysis_date"
/// invariant, but clamping keeps this a total function).
pub fn bucket_for(grid: &[TimeBucket], t_years: f64) -> &TimeBucket {
    let t = t_years.max(0.0);
    grid.iter().find(|b| b.contains(t)).unwrap_or_else(|| grid.last().expect("bucket grid is non-empty"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grids_are_contiguous_and_ascending() {
        for grid in [EVE_REGULATORY_BUCKETS.as_slice(), VISUALISATION_BUCKETS.as_slice()] {
            for pair in grid.windows(2) {
                let end_of_first = pair[0].end_years.expect("only the last bucket is open-ended");
                assert!((end_of_first - pair[1].start_years).abs() < 1e-12);
            }
            assert!(grid.last().unwrap().end_years.is_none());
        }
    }

    #[test]
    fn bucket_for_finds_the_open_ended_bucket_beyond_20y() {
        let b = bucket_for(&EVE_REGULATORY_BUCKETS, 45.0);
        assert_eq!(b.name, "20Y_PLUS");
        assert_eq!(b.representative_t(DEFAULT_OPEN_ENDED_POINT_YEARS), DEFAULT_OPEN_ENDED_POINT_YEARS);
    }

    #[test]
    fn bucket_for_finds_sub_year_bucket() {
        let b = bucket_for(&EVE_REGULATORY_BUCKETS, 0.2);
        assert_eq!(b.name, "1M_3M");
    }
}
