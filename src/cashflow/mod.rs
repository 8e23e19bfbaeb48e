//! The cashflow generator — the engine's single entry point for turning a
//! `Contract` into dated, signed `(interest, principal)` flows (§4.5, the
//! largest component by line share).
//!
//! `generate_cashflows` dispatches on `source_contract_type`, delegates to
//! the matching shape function in `shapes`, then (for assets and
//! term-deposit liabilities) runs the CPR/TDRR prepayment overlay on the
//! unsigned flow map before appending the contract's side sign.

pub mod reset;
pub mod shapes;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::behavioural;
use crate::contracts::{Contract, RateType, ScheduledFlow, Side, SourceContractType};
use crate::curve::ForwardCurveSet;
use crate::daycount::{add_frequency, parse_frequency_token, Frequency};
use crate::error::EngineResult;

/// An unsigned `(date, interest, principal)` point on a contract's raw
/// flow map, before the side sign is appended and before (or after) the
/// behavioural overlay. Magnitudes only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowPoint {
    pub date: NaiveDate,
    pub interest: f64,
    pub principal: f64,
}

/// A single signed cashflow row, the unit the EVE evaluator and NII
/// projector both consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cashflow {
    pub contract_id: String,
    pub source_contract_type: SourceContractType,
    pub rate_type: RateType,
    pub side: Side,
    pub index_name: Option<String>,
    pub flow_date: NaiveDate,
    pub interest_amount: f64,
    pub principal_amount: f64,
    pub total_amount: f64,
}

/// Behavioural decay rates applied by the cashflow generator. `cpr_annual`
/// decays asset balances (loan prepayment); `tdrr_annual` decays liability
/// balances flagged `is_term_deposit` only — other liabilities receive no
/// behavioural decay (spec.md §4.6, §9 open question).
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviouralRates {
    pub cpr_annual: f64,
    pub tdrr_annual: f64,
}

/// Build the boundary dates `[start, ..., maturity]` stepping by
/// `payment_freq`; the last boundary always equals `maturity` exactly
/// regardless of whether a step lands on it. No `payment_freq` collapses
/// the contract to a single bullet-shaped period.
pub(crate) fn period_boundaries(start: NaiveDate, maturity: NaiveDate, payment_freq: Option<Frequency>) -> Vec<NaiveDate> {
    let mut dates = vec![start];
    match payment_freq {
        Some(freq) => {
            let mut d = start;
            let mut iterations = 0u32;
            loop {
                let next = add_frequency(d, freq);
                if next >= maturity {
                    dates.push(maturity);
                    break;
                }
                dates.push(next);
                d = next;
                iterations += 1;
                if iterations > 10_000 {
                    dates.push(maturity);
                    break;
                }
            }
        }
        None => dates.push(maturity),
    }
    dates.dedup();
    dates
}

/// Generate the signed cashflow rows for one contract. `scheduled_flows`
/// is that contract's own sorted flow list (already grouped upstream, per
/// spec.md §9); pass an empty slice for non-scheduled shapes.
pub fn generate_cashflows(
    contract: &Contract,
    curves: &ForwardCurveSet,
    analysis_date: NaiveDate,
    scheduled_flows: &[ScheduledFlow],
    behavioural_rates: BehaviouralRates,
) -> EngineResult<Vec<Cashflow>> {
    use SourceContractType::*;

    let raw_points: Vec<FlowPoint> = match contract.source_contract_type {
        FixedBullet | VariableBullet => shapes::bullet_flows(contract, curves, analysis_date)?,
        FixedLinear | VariableLinear => shapes::linear_flows(contract, curves, analysis_date)?,
        FixedAnnuity | VariableAnnuity => shapes::annuity_flows(contract, curves, analysis_date)?,
        FixedScheduled | VariableScheduled => shapes::scheduled_flows(contract, curves, analysis_date, scheduled_flows)?,
        FixedNonMaturity => behavioural::expand_fixed_nmd(contract, analysis_date)?,
        VariableNonMaturity | StaticPosition => {
            // `prepare_contracts` rewrites/excludes these before generation
            // ever runs; reaching here means a caller skipped that step.
            return Err(crate::error::EngineError::invalid_input(
                contract.contract_id.clone(),
                "contract should have been rewritten or excluded before cashflow generation".to_string(),
            ));
        }
    };

    let decay_rate = match contract.side {
        Side::Asset => behavioural_rates.cpr_annual,
        Side::Liability if contract.is_term_deposit => behavioural_rates.tdrr_annual,
        Side::Liability => 0.0,
    };

    let points = if decay_rate > 0.0 {
        behavioural::apply_prepayment_overlay(&raw_points, contract.notional, contract.start_date, decay_rate, contract.daycount_base)
    } else {
        raw_points
    };

    let sign = contract.side.sign();
    let rows = points
        .into_iter()
        .filter(|p| p.date > analysis_date)
        .map(|p| {
            let interest_amount = sign * p.interest;
            let principal_amount = sign * p.principal;
            Cashflow {
                contract_id: contract.contract_id.clone(),
                source_contract_type: contract.source_contract_type,
                rate_type: contract.rate_type,
                side: contract.side,
                index_name: contract.index_name.clone(),
                flow_date: p.date,
                interest_amount,
                principal_amount,
                total_amount: interest_amount + principal_amount,
            }
        })
        .collect();
    Ok(rows)
}

/// Sort a whole-portfolio cashflow table deterministically by
/// `(flow_date, source_contract_type, contract_id)`, per spec.md §3.
pub fn sort_cashflow_table(rows: &mut [Cashflow]) {
    rows.sort_by(|a, b| {
        a.flow_date
            .cmp(&b.flow_date)
            .then_with(|| a.source_contract_type.as_str().cmp(b.source_contract_type.as_str()))
            .then_with(|| a.contract_id.cmp(&b.contract_id))
    });
}

/// Parse a contract's `repricing_freq` token, used by several shapes that
/// need the parsed `Frequency` rather than the raw string.
pub(crate) fn parsed_repricing_freq(contract: &Contract) -> EngineResult<Option<Frequency>> {
    parse_frequency_token(contract.repricing_freq.as_deref(), false, Some(&contract.contract_id), "repricing_freq")
}

pub(crate) fn parsed_payment_freq(contract: &Contract) -> EngineResult<Option<Frequency>> {
    parse_frequency_token(contract.payment_freq.as_deref(), false, Some(&contract.contract_id), "payment_freq")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AnnuityPaymentMode, DaycountBase};
    use crate::daycount::FrequencyUnit;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_boundaries_always_ends_exactly_at_maturity() {
        let freq = Frequency { count: 1, unit: FrequencyUnit::Years };
        let boundaries = period_boundaries(d(2025, 1, 1), d(2028, 1, 1), Some(freq));
        assert_eq!(*boundaries.last().unwrap(), d(2028, 1, 1));
        assert_eq!(boundaries, vec![d(2025, 1, 1), d(2026, 1, 1), d(2027, 1, 1), d(2028, 1, 1)]);
    }

    #[test]
    fn no_payment_freq_collapses_to_single_period() {
        let boundaries = period_boundaries(d(2025, 1, 1), d(2028, 1, 1), None);
        assert_eq!(boundaries, vec![d(2025, 1, 1), d(2028, 1, 1)]);
    }

    fn s1_contract() -> Contract {
        Contract {
            contract_id: "A1".to_string(),
            side: Side::Asset,
            start_date: d(2025, 1, 1),
            maturity_date: Some(d(2028, 1, 1)),
            notional: 100.0,
            daycount_base: DaycountBase::Act360,
            source_contract_type: SourceContractType::FixedBullet,
            rate_type: RateType::Fixed,
            fixed_rate: Some(0.05),
            index_name: None,
            spread: None,
            repricing_freq: None,
            next_reprice_date: None,
            floor_rate: None,
            cap_rate: None,
            payment_freq: Some("1Y".to_string()),
            is_term_deposit: false,
            annuity_payment_mode: AnnuityPaymentMode::RepriceOnReset,
            nmd_params: None,
        }
    }

    fn flat_curves(rate: f64, analysis_date: NaiveDate) -> ForwardCurveSet {
        let mut curves = std::collections::BTreeMap::new();
        curves.insert(
            "EUR_RFR".to_string(),
            crate::curve::ForwardCurve::from_points(vec![crate::curve::CurvePoint { t_years: 0.1, rate }]),
        );
        ForwardCurveSet::new(analysis_date, DaycountBase::Act365, curves)
    }

    /// Scenario S1 from spec.md §8: a pure fixed bullet, 12 months of
    /// accrual from the analysis date, should yield interest equal to
    /// `notional * rate * yearfrac(analysis_date, analysis_date + 1Y, ACT/360)`.
    #[test]
    fn s1_fixed_bullet_interest_matches_expected_nii() {
        let contract = s1_contract();
        let analysis_date = d(2026, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let rows = generate_cashflows(&contract, &curves, analysis_date, &[], BehaviouralRates::default()).unwrap();

        let horizon_end = d(2027, 1, 1);
        let interest_in_horizon: f64 = rows.iter().filter(|r| r.flow_date <= horizon_end).map(|r| r.interest_amount).sum();
        let expected = 100.0 * 0.05 * crate::daycount::yearfrac(analysis_date, horizon_end, DaycountBase::Act360);
        assert!((interest_in_horizon - expected).abs() < 1e-6, "{interest_in_horizon} vs {expected}");
    }

    #[test]
    fn principal_sums_to_signed_notional() {
        let contract = s1_contract();
        let analysis_date = d(2026, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let rows = generate_cashflows(&contract, &curves, analysis_date, &[], BehaviouralRates::default()).unwrap();
        let total_principal: f64 = rows.iter().map(|r| r.principal_amount).sum();
        assert!((total_principal - 100.0).abs() < 1e-6);
    }

    #[test]
    fn all_flows_are_strictly_after_analysis_date() {
        let contract = s1_contract();
        let analysis_date = d(2026, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let rows = generate_cashflows(&contract, &curves, analysis_date, &[], BehaviouralRates::default()).unwrap();
        assert!(rows.iter().all(|r| r.flow_date > analysis_date));
    }

    fn bullet_or_linear_contract(
        notional: f64,
        rate: f64,
        maturity_years: i32,
        linear: bool,
        side: Side,
    ) -> Contract {
        let mut contract = s1_contract();
        contract.notional = notional;
        contract.fixed_rate = Some(rate);
        contract.maturity_date = Some(d(2026 + maturity_years, 1, 1));
        contract.side = side;
        contract.source_contract_type = if linear { SourceContractType::FixedLinear } else { SourceContractType::FixedBullet };
        contract
    }

    proptest::proptest! {
        /// Invariant 1: Σ principal_amount = sign(side) · notional (no behavioural decay applied).
        #[test]
        fn prop_principal_sums_to_signed_notional(
            notional in 1.0f64..1_000_000.0,
            rate in 0.0001f64..0.20,
            maturity_years in 1i32..15,
            linear in proptest::prelude::any::<bool>(),
            asset_side in proptest::prelude::any::<bool>(),
        ) {
            let analysis_date = d(2026, 1, 1);
            let side = if asset_side { Side::Asset } else { Side::Liability };
            let contract = bullet_or_linear_contract(notional, rate, maturity_years, linear, side);
            let curves = flat_curves(0.02, analysis_date);
            let rows = generate_cashflows(&contract, &curves, analysis_date, &[], BehaviouralRates::default()).unwrap();
            let total_principal: f64 = rows.iter().map(|r| r.principal_amount).sum();
            let expected = side.sign() * notional;
            proptest::prop_assert!((total_principal - expected).abs() < 1e-3, "{} vs {}", total_principal, expected);
        }

        /// Invariant 2: total_amount = interest_amount + principal_amount for every row.
        #[test]
        fn prop_total_equals_interest_plus_principal(
            notional in 1.0f64..1_000_000.0,
            rate in 0.0001f64..0.20,
            maturity_years in 1i32..15,
            linear in proptest::prelude::any::<bool>(),
            asset_side in proptest::prelude::any::<bool>(),
        ) {
            let analysis_date = d(2026, 1, 1);
            let side = if asset_side { Side::Asset } else { Side::Liability };
            let contract = bullet_or_linear_contract(notional, rate, maturity_years, linear, side);
            let curves = flat_curves(0.02, analysis_date);
            let rows = generate_cashflows(&contract, &curves, analysis_date, &[], BehaviouralRates::default()).unwrap();
            for row in &rows {
                proptest::prop_assert!((row.total_amount - (row.interest_amount + row.principal_amount)).abs() < 1e-9);
            }
        }
    }
}
