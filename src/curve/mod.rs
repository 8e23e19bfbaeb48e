//! Forward-rate curves and curve sets.
//!
//! A `ForwardCurve` is a sorted list of `(t_years, rate)` samples from which
//! discount factors and equivalent zero rates are derived by piecewise
//! log-linear interpolation of the discount factor (equivalently: flat
//! instantaneous forward rate between samples). A `ForwardCurveSet` groups
//! one `ForwardCurve` per index, all sharing the same analysis date and
//! daycount base, and is the unit the cashflow generator and shock engine
//! both consume.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::daycount::{yearfrac, DaycountBase};
use crate::error::{EngineError, EngineResult};

/// A single `(t_years, rate)` sample on a forward curve. `rate` is the
/// continuously-compounded equivalent zero rate observed at `t_years`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub t_years: f64,
    pub rate: f64,
}

/// A single index's term structure: sorted samples plus their implied
/// discount factors, precomputed once so repeated `discount_factor`/`rate`
/// queries don't re-walk the sample list from the first point each time.
#[derive(Debug, Clone)]
pub struct ForwardCurve {
    /// `(t_years, rate, discount_factor)`, sorted ascending by `t_years`.
    samples: Vec<(f64, f64, f64)>,
}

impl ForwardCurve {
    /// Build a curve from unsorted `(t_years, rate)` samples. Discount
    /// factors are integrated forward from `t = 0` assuming the rate is
    /// the continuously-compounded zero rate at each sample (flat
    /// instantaneous forward between samples): `DF(t_i) = exp(-r_i * t_i)`.
    pub fn from_points(mut points: Vec<CurvePoint>) -> Self {
        points.sort_by(|a, b| a.t_years.partial_cmp(&b.t_years).expect("non-NaN tenor"));
        let samples = points
            .into_iter()
            .map(|p| (p.t_years, p.rate, (-p.rate * p.t_years).exp()))
            .collect();
        ForwardCurve { samples }
    }

    /// Discount factor at `t` years from the curve's analysis date.
    /// Interpolates `ln(DF)` linearly in `t` between bracketing samples
    /// (equivalent to piecewise log-linear DF / piecewise-constant
    /// instantaneous forward). Extrapolates flat (constant zero rate)
    /// beyond either end.
    pub fn discount_factor(&self, t: f64) -> f64 {
        match self.bracket(t) {
            Bracket::BeforeFirst(rate) => (-rate * t).exp(),
            Bracket::AfterLast(rate) => (-rate * t).exp(),
            Bracket::Between((t0, _, df0), (t1, _, df1)) => {
                let ln_df0 = df0.ln();
                let ln_df1 = df1.ln();
                let weight = (t - t0) / (t1 - t0);
                (ln_df0 + weight * (ln_df1 - ln_df0)).exp()
            }
            Bracket::Exact(_, _, df) => df,
        }
    }

    /// The curve's original `(t_years, rate)` samples, in ascending order.
    /// Used by the shock engine to rebuild a curve with shifted rates
    /// without re-deriving sample tenors from scratch.
    pub fn points(&self) -> Vec<CurvePoint> {
        self.samples.iter().map(|(t, r, _)| CurvePoint { t_years: *t, rate: *r }).collect()
    }

    /// Equivalent continuously-compounded zero rate at `t`:
    /// `r(t) = -ln(DF(t)) / t`. At `t == 0` this is the short end of the
    /// curve's first sample rate (avoids a division by zero).
    pub fn rate(&self, t: f64) -> f64 {
        if t.abs() < 1e-12 {
            return self.samples.first().map(|(_, r, _)| *r).unwrap_or(0.0);
        }
        -self.discount_factor(t).ln() / t
    }

    fn bracket(&self, t: f64) -> Bracket {
        if self.samples.is_empty() {
            return Bracket::BeforeFirst(0.0);
        }
        if t <= self.samples[0].0 {
            return Bracket::BeforeFirst(self.samples[0].1);
        }
        let last = *self.samples.last().expect("checked non-empty");
        if t >= last.0 {
            return Bracket::AfterLast(last.1);
        }
        for window in self.samples.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            if (t - lo.0).abs() < 1e-12 {
                return Bracket::Exact(lo.0, lo.1, lo.2);
            }
            if t > lo.0 && t < hi.0 {
                return Bracket::Between(lo, hi);
            }
        }
        Bracket::Exact(last.0, last.1, last.2)
    }
}

enum Bracket {
    BeforeFirst(f64),
    AfterLast(f64),
    Between((f64, f64, f64), (f64, f64, f64)),
    Exact(f64, f64, f64),
}

/// A full set of per-index forward curves sharing an analysis date and
/// daycount base, the unit the rest of the engine queries rates against.
#[derive(Debug, Clone)]
pub struct ForwardCurveSet {
    pub analysis_date: NaiveDate,
    pub daycount_base: DaycountBase,
    curves: BTreeMap<String, ForwardCurve>,
}

impl ForwardCurveSet {
    pub fn new(analysis_date: NaiveDate, daycount_base: DaycountBase, curves: BTreeMap<String, ForwardCurve>) -> Self {
        ForwardCurveSet { analysis_date, daycount_base, curves }
    }

    pub fn available_indices(&self) -> Vec<&str> {
        self.curves.keys().map(String::as_str).collect()
    }

    pub fn get(&self, index_name: &str) -> EngineResult<&ForwardCurve> {
        self.curves.get(index_name).ok_or_else(|| EngineError::MissingCurve {
            contract_id: None,
            index_name: index_name.to_string(),
        })
    }

    /// Fail fast if any of `required_indices` is absent from this set.
    /// Called once before projection starts so a missing index surfaces
    /// as a single, upfront error rather than partway through a run.
    pub fn require_indices<'a>(&self, required_indices: impl IntoIterator<Item = &'a str>) -> EngineResult<()> {
        let mut required: Vec<&str> = required_indices.into_iter().filter(|ix| !ix.trim().is_empty()).collect();
        required.sort_unstable();
        required.dedup();
        for index_name in required {
            if !self.curves.contains_key(index_name) {
                return Err(EngineError::MissingCurve { contract_id: None, index_name: index_name.to_string() });
            }
        }
        Ok(())
    }

    fn t(&self, d: NaiveDate) -> f64 {
        yearfrac(self.analysis_date, d, self.daycount_base)
    }

    pub fn rate_on_date(&self, index_name: &str, d: NaiveDate) -> EngineResult<f64> {
        Ok(self.get(index_name)?.rate(self.t(d)))
    }

    pub fn df_on_date(&self, index_name: &str, d: NaiveDate) -> EngineResult<f64> {
        Ok(self.get(index_name)?.discount_factor(self.t(d)))
    }
}
