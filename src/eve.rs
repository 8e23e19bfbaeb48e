//! Economic Value of Equity evaluator (§4.7): the scalar sum of
//! discounted signed cashflows, and the same total broken down by
//! regulatory time bucket and asset/liability/net side group.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::bucket::{bucket_for, TimeBucket};
use crate::cashflow::Cashflow;
use crate::contracts::Side;
use crate::curve::ForwardCurveSet;
use crate::daycount::yearfrac;
use crate::error::EngineResult;

/// The three side groups an EVE bucket breakdown reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideGroup {
    Asset,
    Liability,
    Net,
}

impl SideGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            SideGroup::Asset => "asset",
            SideGroup::Liability => "liability",
            SideGroup::Net => "net",
        }
    }
}

/// One `(bucket, side_group)` row of an EVE breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EveBucketRow {
    pub bucket_name: &'static str,
    pub bucket_start_years: f64,
    pub bucket_end_years: Option<f64>,
    pub side_group: SideGroup,
    pub pv_total: f64,
    pub pv_interest: f64,
    pub pv_principal: f64,
    pub cashflow_total: f64,
    pub flow_count: usize,
}

/// The full EVE evaluation result for one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct EveResult {
    pub scalar: f64,
    pub buckets: Vec<EveBucketRow>,
}

/// `EVE = Σ total_amount · DF(flow_date)`, scalar and bucketed by
/// `(regulatory_bucket(t), side_group)`. Discount factors are cached per
/// unique flow date before aggregation (§4.7) so a shared date across many
/// contracts is only queried against the curve once.
pub fn evaluate_eve(
    cashflows: &[Cashflow],
    curves: &ForwardCurveSet,
    discount_index: &str,
    grid: &[TimeBucket],
    open_ended_point_years: f64,
) -> EngineResult<EveResult> {
    let mut df_cache: HashMap<NaiveDate, f64> = HashMap::new();
    let mut scalar = 0.0;

    #[derive(Default, Clone, Copy)]
    struct Accum {
        pv_total: f64,
        pv_interest: f64,
        pv_principal: f64,
        cashflow_total: f64,
        flow_count: usize,
    }

    let mut per_bucket_side: HashMap<(&'static str, SideGroup), Accum> = HashMap::new();

    for cf in cashflows {
        let df = match df_cache.get(&cf.flow_date) {
            Some(df) => *df,
            None => {
                let df = curves.df_on_date(discount_index, cf.flow_date)?;
                df_cache.insert(cf.flow_date, df);
                df
            }
        };

        let pv_total = cf.total_amount * df;
        let pv_interest = cf.interest_amount * df;
        let pv_principal = cf.principal_amount * df;
        scalar += pv_total;

        let t_years = yearfrac(curves.analysis_date, cf.flow_date, curves.daycount_base);
        let bucket = bucket_for(grid, t_years);
        let side_group = match cf.side {
            Side::Asset => SideGroup::Asset,
            Side::Liability => SideGroup::Liability,
        };

        for group in [side_group, SideGroup::Net] {
            let entry = per_bucket_side.entry((bucket.name, group)).or_default();
            entry.pv_total += pv_total;
            entry.pv_interest += pv_interest;
            entry.pv_principal += pv_principal;
            entry.cashflow_total += cf.total_amount;
            entry.flow_count += 1;
        }
    }

    let open_ended = open_ended_point_years;
    let mut buckets = Vec::with_capacity(grid.len() * 3);
    for bucket in grid {
        let _ = bucket.representative_t(open_ended);
        for group in [SideGroup::Asset, SideGroup::Liability, SideGroup::Net] {
            let accum = per_bucket_side.get(&(bucket.name, group)).copied().unwrap_or_default();
            buckets.push(EveBucketRow {
                bucket_name: bucket.name,
                bucket_start_years: bucket.start_years,
                bucket_end_years: bucket.end_years,
                side_group: group,
                pv_total: accum.pv_total,
                pv_interest: accum.pv_interest,
                pv_principal: accum.pv_principal,
                cashflow_total: accum.cashflow_total,
                flow_count: accum.flow_count,
            });
        }
    }

    Ok(EveResult { scalar, buckets })
}
