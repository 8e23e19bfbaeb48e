//! Behavioural overlays (§4.6): NMD core/non-core expansion, the CPR
//! prepayment overlay (and its TDRR analogue on term deposits), and the
//! NII β-repricing correction for non-maturity deposits.

use chrono::NaiveDate;

use crate::cashflow::FlowPoint;
use crate::contracts::{eba_bucket_midpoint_years, Contract, DaycountBase};
use crate::error::EngineResult;

/// Expand a fixed NMD into its behavioural cashflow map: one non-core row
/// one day after the analysis date, and one core row per EBA bucket with
/// a non-zero distribution weight, dated at the bucket's representative
/// midpoint in years (`× 365.25` days, per spec.md §4.6). Interest is
/// always zero here — NMD interest income/expense is produced by the NII
/// β-repricing correction, not by this expansion.
pub fn expand_fixed_nmd(contract: &Contract, analysis_date: NaiveDate) -> EngineResult<Vec<FlowPoint>> {
    let params = contract.nmd_params.as_ref().ok_or_else(|| {
        crate::error::EngineError::invalid_input(contract.contract_id.clone(), "fixed_non_maturity requires NMD behavioural parameters".to_string())
    })?;

    let mut points = Vec::with_capacity(params.distribution.len() + 1);

    let non_core = contract.notional * (1.0 - params.core_proportion / 100.0);
    if non_core.abs() > 0.0 {
        points.push(FlowPoint { date: analysis_date + chrono::Duration::days(1), interest: 0.0, principal: non_core });
    }

    for (bucket, pct) in &params.distribution {
        if *pct <= 0.0 {
            continue;
        }
        let years = eba_bucket_midpoint_years(bucket, Some(params.core_average_maturity))
            .map_err(|_| crate::error::EngineError::invalid_input(contract.contract_id.clone(), format!("unknown EBA NMD bucket: {bucket}")))?;
        let days = (years * 365.25).round() as i64;
        let date = analysis_date + chrono::Duration::days(days.max(1));
        points.push(FlowPoint { date, interest: 0.0, principal: contract.notional * (*pct / 100.0) });
    }

    points.sort_by_key(|p| p.date);
    Ok(points)
}

/// Apply the Banca Etica dual-schedule CPR/TDRR overlay to a contract's
/// raw (contractual) flow map, walking forward with behavioural balance
/// `DRm` and contractual balance `DRc` both seeded at `notional`.
/// `CPRp(t) = 1 - (1 - annual_rate)^(days/base)` where `days` is measured
/// from the contract's `start_date` and `base` is 360 or 365 per the
/// daycount convention.
pub fn apply_prepayment_overlay(
    flows: &[FlowPoint],
    notional: f64,
    start_date: NaiveDate,
    annual_rate: f64,
    daycount_base: DaycountBase,
) -> Vec<FlowPoint> {
    let base_days = match daycount_base {
        DaycountBase::Act360 | DaycountBase::Thirty360 => 360.0,
        DaycountBase::Act365 => 365.0,
    };

    let mut behavioural_balance = notional;
    let mut contractual_balance = notional;
    let mut out = Vec::with_capacity(flows.len());

    for flow in flows {
        let days_since_start = (flow.date - start_date).num_days().max(0) as f64;
        let cprp = 1.0 - (1.0 - annual_rate).powf(days_since_start / base_days);

        let amort_rate = if contractual_balance.abs() > 1e-10 { flow.principal / contractual_balance } else { 0.0 };
        let combined = (amort_rate + cprp).min(1.0).max(0.0);

        let behavioural_principal = behavioural_balance * combined;
        let behavioural_interest =
            if contractual_balance.abs() > 1e-10 { flow.interest * behavioural_balance / contractual_balance } else { 0.0 };

        out.push(FlowPoint { date: flow.date, interest: behavioural_interest, principal: behavioural_principal });

        behavioural_balance = (behavioural_balance - behavioural_principal).max(0.0);
        contractual_balance = (contractual_balance - flow.principal).max(0.0);
    }

    out
}

/// The NII β-repricing correction for a fixed NMD bucket's flow, applied
/// per shocked scenario (§4.6): for a bucket of notional `n_bucket`
/// accruing at `client_rate`, a curve shock of `delta_r` on the risk-free
/// index shifts the client rate by `β · delta_r`, floored at zero (client
/// rates do not go negative). Returns the interest correction to add to
/// the affected month, signed so it can be added directly to income
/// (assets) or expense (liabilities) once the caller applies its own
/// side sign.
pub fn nmd_beta_correction(n_bucket: f64, client_rate: f64, beta: f64, delta_r: f64, yf_in_month: f64) -> f64 {
    let shocked_rate = (client_rate + beta * delta_r).max(0.0);
    n_bucket * (shocked_rate - client_rate) * yf_in_month
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AnnuityPaymentMode, NmdParams, RateType, Side, SourceContractType};
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn nmd_expansion_splits_core_and_non_core_and_sums_to_notional() {
        let mut distribution = BTreeMap::new();
        distribution.insert("ON_1M".to_string(), 20.0);
        distribution.insert("1Y_18M".to_string(), 40.0);
        let params = NmdParams { core_proportion: 60.0, pass_through_rate: 5.0, core_average_maturity: 3.0, distribution };

        let contract = Contract {
            contract_id: "D1".to_string(),
            side: Side::Liability,
            start_date: d(2020, 1, 1),
            maturity_date: None,
            notional: 1_000_000.0,
            daycount_base: DaycountBase::Act365,
            source_contract_type: SourceContractType::FixedNonMaturity,
            rate_type: RateType::Fixed,
            fixed_rate: Some(0.0),
            index_name: None,
            spread: None,
            repricing_freq: None,
            next_reprice_date: None,
            floor_rate: None,
            cap_rate: None,
            payment_freq: None,
            is_term_deposit: false,
            annuity_payment_mode: AnnuityPaymentMode::RepriceOnReset,
            nmd_params: Some(params),
        };

        let analysis_date = d(2026, 1, 1);
        let points = expand_fixed_nmd(&contract, analysis_date).unwrap();
        let total: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total - 1_000_000.0).abs() < 1e-6);
        assert!(points.iter().all(|p| p.date > analysis_date));
    }

    /// Scenario S3: CPR shortens duration but preserves total principal.
    #[test]
    fn cpr_overlay_preserves_total_principal_and_shortens_tail() {
        let annual_coupon_flows: Vec<FlowPoint> = (1..=5)
            .map(|year| FlowPoint {
                date: d(2025 + year, 1, 1),
                interest: 100_000.0 * 0.05,
                principal: if year == 5 { 100_000.0 } else { 0.0 },
            })
            .collect();

        let overlaid = apply_prepayment_overlay(&annual_coupon_flows, 100_000.0, d(2025, 1, 1), 0.05, DaycountBase::Act365);
        let total_principal: f64 = overlaid.iter().map(|p| p.principal).sum();
        assert!((total_principal - 100_000.0).abs() < 1e-6);

        assert!(overlaid[0].principal > 0.0, "CPR should prepay in earlier periods too");
        assert!(overlaid.last().unwrap().principal < 100_000.0, "CPR should leave less than full notional for the final period");
    }

    #[test]
    fn beta_correction_floors_client_rate_at_zero() {
        // S4: 1,000,000 liability NMD at 0% client rate, beta=5%, shocked +200bp.
        let correction = nmd_beta_correction(1_000_000.0, 0.0, 0.05, 0.02, 1.0);
        assert!((correction - 1_000.0).abs() < 1e-6);
    }
}
