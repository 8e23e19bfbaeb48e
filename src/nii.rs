//! Twelve-month Net Interest Income projector (§4.8): monthly
//! interest-income/expense accrual over the horizon, with optional
//! balance-constant rollover of contracts that mature inside it.

use chrono::NaiveDate;

use crate::behavioural::nmd_beta_correction;
use crate::cashflow::{generate_cashflows, BehaviouralRates, Cashflow};
use crate::contracts::{Contract, RateType, Side, SourceContractType};
use crate::curve::ForwardCurveSet;
use crate::daycount::yearfrac;
use crate::error::EngineResult;
use crate::margin::MarginSet;

/// One month's aggregated NII row. `month_index` is 1-based; `month_label`
/// is the calendar month the window ends in (`"YYYY-MM"`).
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyNiiRow {
    pub month_index: u32,
    pub month_label: String,
    pub interest_income: f64,
    pub interest_expense: f64,
    pub net_nii: f64,
}

/// `analysis_date + 0..=horizon_months` calendar-month boundaries.
fn month_boundaries(analysis_date: NaiveDate, horizon_months: u32) -> Vec<NaiveDate> {
    let freq = crate::daycount::Frequency { count: 1, unit: crate::daycount::FrequencyUnit::Months };
    let mut boundaries = vec![analysis_date];
    let mut d = analysis_date;
    for _ in 0..horizon_months {
        d = crate::daycount::add_frequency(d, freq);
        boundaries.push(d);
    }
    boundaries
}

/// 1-based month index `k` such that `boundaries[k-1] < date <= boundaries[k]`,
/// or `None` if `date` falls outside the horizon.
fn month_index_for(date: NaiveDate, boundaries: &[NaiveDate]) -> Option<u32> {
    for (k, pair) in boundaries.windows(2).enumerate() {
        if date > pair[0] && date <= pair[1] {
            return Some(k as u32 + 1);
        }
    }
    None
}

/// Sum `interest_amount` per calendar month, per side, over
/// `analysis_date .. analysis_date + horizon_months`. Every month `1..=H`
/// is present even when no flow lands in it.
pub fn monthly_breakdown(cashflows: &[Cashflow], analysis_date: NaiveDate, horizon_months: u32) -> Vec<MonthlyNiiRow> {
    let boundaries = month_boundaries(analysis_date, horizon_months);
    let mut rows: Vec<MonthlyNiiRow> = (1..=horizon_months)
        .map(|k| MonthlyNiiRow {
            month_index: k,
            month_label: boundaries[k as usize].format("%Y-%m").to_string(),
            interest_income: 0.0,
            interest_expense: 0.0,
            net_nii: 0.0,
        })
        .collect();

    for cf in cashflows {
        let Some(month_index) = month_index_for(cf.flow_date, &boundaries) else { continue };
        let row = &mut rows[(month_index - 1) as usize];
        match cf.side {
            Side::Asset => row.interest_income += cf.interest_amount,
            Side::Liability => row.interest_expense += cf.interest_amount,
        }
        row.net_nii = row.interest_income + row.interest_expense;
    }

    rows
}

/// `NII_12m = Σ_month net_nii`.
pub fn nii_scalar(monthly: &[MonthlyNiiRow]) -> f64 {
    monthly.iter().map(|r| r.net_nii).sum()
}

/// NII β-repricing correction for non-maturity deposits (§4.6): a fixed
/// NMD's client rate does not move with the cashflow generator's own
/// projection (it has none — `fixed_rate` is a flat stub), but under a
/// shocked scenario with risk-free delta `delta_r` the book is assumed to
/// reprice by `beta * delta_r`, floored so the client rate never goes
/// negative. Applied once per calendar month over the whole horizon
/// (every month the deposit is assumed outstanding, not just the months a
/// behavioural bucket's synthetic maturity happens to fall in), on the
/// contract's full notional — the core/non-core split drives EVE bucket
/// placement, not whether the balance earns interest in a given month.
/// No-op for non-NMD contracts, NMDs without parameters, and `delta_r ==
/// 0.0` (the base scenario).
pub fn apply_nmd_beta_correction(monthly: &mut [MonthlyNiiRow], contract: &Contract, delta_r: f64, analysis_date: NaiveDate, horizon_months: u32) {
    if contract.source_contract_type != SourceContractType::FixedNonMaturity || delta_r == 0.0 {
        return;
    }
    let Some(params) = contract.nmd_params.as_ref() else { return };
    let client_rate = contract.fixed_rate.unwrap_or(0.0);
    let beta = params.beta();
    let sign = contract.side.sign();

    let boundaries = month_boundaries(analysis_date, horizon_months);
    for (k, pair) in boundaries.windows(2).enumerate() {
        let yf = yearfrac(pair[0], pair[1], contract.daycount_base);
        let correction = sign * nmd_beta_correction(contract.notional, client_rate, beta, delta_r, yf);
        let row = &mut monthly[k];
        match contract.side {
            Side::Asset => row.interest_income += correction,
            Side::Liability => row.interest_expense += correction,
        }
        row.net_nii = row.interest_income + row.interest_expense;
    }
}

/// Maximum rollover cycles per contract — a defensive bound, not a
/// regulatory parameter: a sane horizon (≤ a few years) and a sane tenor
/// (≥ overnight) never approach it.
const MAX_ROLLOVER_CYCLES: u32 = 64;

/// Generate a contract's cashflows for the NII horizon, replacing it with
/// an identical-shape renewal at `renewal_rate = rf(cycle_maturity) +
/// margin` (fixed) or `forward_index(cycle_start) + spread` (float) each
/// time it matures before `horizon_end`, until a renewal's maturity
/// reaches or passes the horizon (§4.8). NMDs have no maturity and are
/// never rolled; scheduled contracts are rolled as their own shape but
/// carry no scheduled-flow continuation (their tail principal was already
/// absorbed at the original maturity).
pub fn generate_with_rollover(
    contract: &Contract,
    curves: &ForwardCurveSet,
    analysis_date: NaiveDate,
    horizon_end: NaiveDate,
    margin_set: &MarginSet,
    risk_free_index: &str,
    behavioural_rates: BehaviouralRates,
) -> EngineResult<Vec<Cashflow>> {
    let mut all = Vec::new();
    let mut current = contract.clone();
    let mut cycle = 0u32;

    // Fall back to the contract's own originating margin when the
    // calibrated set has nothing for its profile — a renewal should never
    // hard-fail a scenario run just because no recent originations share
    // its shape.
    let originating_margin = match (contract.rate_type, contract.fixed_rate, contract.maturity_date) {
        (RateType::Fixed, Some(fixed_rate), Some(maturity)) => {
            curves.rate_on_date(risk_free_index, maturity).ok().map(|rf| fixed_rate - rf)
        }
        _ => None,
    };

    loop {
        let flows = generate_cashflows(&current, curves, analysis_date, &[], behavioural_rates)?;
        all.extend(flows);

        let Some(maturity) = current.maturity_date else { break };
        if maturity >= horizon_end {
            break;
        }
        cycle += 1;
        if cycle > MAX_ROLLOVER_CYCLES {
            break;
        }

        let tenor_days = (maturity - current.start_date).num_days().max(1);
        let new_start = maturity;
        let new_maturity = new_start + chrono::Duration::days(tenor_days);

        let mut renewed = current.clone();
        renewed.contract_id = format!("{}__renewal{}", contract.contract_id, cycle);
        renewed.start_date = new_start;
        renewed.maturity_date = Some(new_maturity);

        match current.rate_type {
            RateType::Fixed => {
                let margin = margin_set.lookup(
                    current.source_contract_type,
                    current.side,
                    current.repricing_freq.as_deref(),
                    current.index_name.as_deref(),
                    originating_margin,
                )?;
                let rf = curves.rate_on_date(risk_free_index, maturity)?;
                renewed.fixed_rate = Some(rf + margin);
            }
            RateType::Float => {
                renewed.next_reprice_date = Some(new_start);
            }
        }
        current = renewed;
    }

    Ok(all)
}
