//! Reset scheduling and the current-coupon stub rule (§4.5), shared by
//! every floating-rate shape in `shapes.rs`.

use chrono::NaiveDate;

use crate::contracts::Contract;
use crate::curve::ForwardCurveSet;
use crate::daycount::{add_frequency, parse_frequency_token, Frequency};
use crate::error::{EngineError, EngineResult};

/// Defensive bound on reset-walking loops; a non-advancing step (which
/// should be structurally impossible once a frequency has parsed to a
/// positive count) trips this instead of looping forever.
const MAX_RESET_ITERATIONS: u32 = 10_000;

/// Walk `anchor_date` forward by `frequency` until strictly past
/// `accrual_start`, then emit each subsequent reset date strictly less
/// than `accrual_end`. Returns an empty list if either `anchor_date` or
/// `frequency` is absent — such a position is treated as fixed across the
/// cycle (§4.5).
pub fn reset_schedule(
    accrual_start: NaiveDate,
    accrual_end: NaiveDate,
    anchor_date: Option<NaiveDate>,
    frequency: Option<Frequency>,
) -> EngineResult<Vec<NaiveDate>> {
    let (anchor, freq) = match (anchor_date, frequency) {
        (Some(a), Some(f)) => (a, f),
        _ => return Ok(Vec::new()),
    };

    let mut d = anchor;
    let mut iterations = 0u32;
    while d <= accrual_start {
        let next = add_frequency(d, freq);
        if next <= d {
            return Err(EngineError::invalid_input(None, "reset schedule did not advance".to_string()));
        }
        d = next;
        iterations += 1;
        if iterations > MAX_RESET_ITERATIONS {
            return Err(EngineError::invalid_input(None, "reset schedule exceeded 10^4 iterations".to_string()));
        }
    }

    let mut resets = Vec::new();
    while d < accrual_end {
        resets.push(d);
        let next = add_frequency(d, freq);
        if next <= d {
            return Err(EngineError::invalid_input(None, "reset schedule did not advance".to_string()));
        }
        d = next;
        iterations += 1;
        if iterations > MAX_RESET_ITERATIONS {
            return Err(EngineError::invalid_input(None, "reset schedule exceeded 10^4 iterations".to_string()));
        }
    }
    Ok(resets)
}

/// One all-in-rate segment of an accrual window: `[seg_start, seg_end)` at
/// a single rate, already floor/capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSegment {
    pub seg_start: NaiveDate,
    pub seg_end: NaiveDate,
    pub rate: f64,
}

fn floor_cap(rate: f64, floor: Option<f64>, cap: Option<f64>) -> f64 {
    let mut r = rate;
    if let Some(floor) = floor {
        r = r.max(floor);
    }
    if let Some(cap) = cap {
        r = r.min(cap);
    }
    r
}

/// Split `[accrual_start, accrual_end)` into rate segments for `contract`.
/// Fixed-rate contracts are always one segment at `fixed_rate`. Floating
/// contracts are split at reset dates; the first segment uses the
/// current-coupon stub rule when applicable (§4.5): if `fixed_rate` is
/// provided and there is no reset exactly at `accrual_start`, the first
/// segment accrues at `fixed_rate` instead of the index rate. Floor/cap
/// applies to the all-in rate (index + spread), never to the index alone.
pub fn segment_rates_for_accrual(
    contract: &Contract,
    curves: &ForwardCurveSet,
    accrual_start: NaiveDate,
    accrual_end: NaiveDate,
) -> EngineResult<Vec<RateSegment>> {
    use crate::contracts::RateType;

    if contract.rate_type == RateType::Fixed {
        let rate = contract.fixed_rate.ok_or_else(|| {
            EngineError::invalid_input(contract.contract_id.clone(), "fixed contract is missing fixed_rate".to_string())
        })?;
        return Ok(vec![RateSegment { seg_start: accrual_start, seg_end: accrual_end, rate }]);
    }

    let index_name = contract.index_name.as_deref().ok_or_else(|| {
        EngineError::inconsistent_schedule(contract.contract_id.clone(), "floating contract has no index_name".to_string())
    })?;
    let spread = contract.spread.unwrap_or(0.0);
    let freq = parse_frequency_token(contract.repricing_freq.as_deref(), false, Some(&contract.contract_id), "repricing_freq")?;
    let resets = reset_schedule(accrual_start, accrual_end, contract.next_reprice_date, freq)?;

    let mut boundaries = vec![accrual_start];
    boundaries.extend(resets);
    boundaries.push(accrual_end);
    boundaries.dedup();

    let has_reset_at_start = contract.next_reprice_date == Some(accrual_start);

    let mut segments = Vec::with_capacity(boundaries.len().saturating_sub(1));
    for (i, pair) in boundaries.windows(2).enumerate() {
        let (seg_start, seg_end) = (pair[0], pair[1]);
        let rate = if i == 0 && contract.fixed_rate.is_some() && !has_reset_at_start {
            contract.fixed_rate.expect("checked Some above")
        } else {
            curves.rate_on_date(index_name, seg_start)? + spread
        };
        segments.push(RateSegment { seg_start, seg_end, rate: floor_cap(rate, contract.floor_rate, contract.cap_rate) });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AnnuityPaymentMode, DaycountBase, RateType, Side, SourceContractType};
    use crate::daycount::FrequencyUnit;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn reset_schedule_emits_dates_strictly_between_start_and_end() {
        let freq = Frequency { count: 3, unit: FrequencyUnit::Months };
        let resets = reset_schedule(d(2026, 1, 1), d(2027, 1, 1), Some(d(2025, 10, 1)), Some(freq)).unwrap();
        assert_eq!(resets, vec![d(2026, 4, 1), d(2026, 7, 1), d(2026, 10, 1)]);
    }

    #[test]
    fn missing_anchor_or_frequency_yields_no_resets() {
        assert_eq!(reset_schedule(d(2026, 1, 1), d(2027, 1, 1), None, None).unwrap(), Vec::new());
    }

    fn floating_contract() -> Contract {
        Contract {
            contract_id: "F1".to_string(),
            side: Side::Asset,
            start_date: d(2025, 1, 1),
            maturity_date: Some(d(2030, 1, 1)),
            notional: 100.0,
            daycount_base: DaycountBase::Act360,
            source_contract_type: SourceContractType::VariableBullet,
            rate_type: RateType::Float,
            fixed_rate: Some(0.03),
            index_name: Some("EUR_EURIBOR_3M".to_string()),
            spread: Some(0.005),
            repricing_freq: Some("3M".to_string()),
            next_reprice_date: Some(d(2026, 4, 1)),
            floor_rate: None,
            cap_rate: None,
            payment_freq: Some("3M".to_string()),
            is_term_deposit: false,
            annuity_payment_mode: AnnuityPaymentMode::RepriceOnReset,
            nmd_params: None,
        }
    }

    #[test]
    fn stub_rule_uses_fixed_rate_until_first_future_reset() {
        let mut curves_map = std::collections::BTreeMap::new();
        curves_map.insert(
            "EUR_EURIBOR_3M".to_string(),
            crate::curve::ForwardCurve::from_points(vec![crate::curve::CurvePoint { t_years: 0.1, rate: 0.02 }]),
        );
        let curves = ForwardCurveSet::new(d(2026, 1, 1), DaycountBase::Act365, curves_map);
        let contract = floating_contract();
        let segments = segment_rates_for_accrual(&contract, &curves, d(2026, 1, 1), d(2026, 7, 1)).unwrap();
        assert_eq!(segments.len(), 2);
        assert!((segments[0].rate - 0.03).abs() < 1e-12, "first segment should use the fixed stub rate");
        assert!((segments[1].rate - 0.025).abs() < 1e-9, "second segment should use index + spread");
    }
}
