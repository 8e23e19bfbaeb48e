//! The eight per-shape cashflow generators of §4.5: bullet, linear,
//! annuity (two payment modes) and scheduled, each fixed or floating. Every
//! function returns unsigned `(interest, principal)` magnitudes; sign and
//! the behavioural overlay are applied by the caller in `cashflow::mod`.

use chrono::NaiveDate;

use super::reset::segment_rates_for_accrual;
use super::{parsed_payment_freq, period_boundaries, FlowPoint};
use crate::contracts::{AnnuityPaymentMode, Contract, RateType, ScheduledFlow};
use crate::curve::ForwardCurveSet;
use crate::daycount::yearfrac;
use crate::error::EngineResult;

const BALANCE_EPSILON: f64 = 1e-10;

fn clamp_balance(balance: f64) -> f64 {
    if balance.abs() < BALANCE_EPSILON {
        0.0
    } else {
        balance.max(0.0)
    }
}

fn maturity_of(contract: &Contract) -> EngineResult<NaiveDate> {
    contract.maturity_date.ok_or_else(|| {
        crate::error::EngineError::inconsistent_schedule(contract.contract_id.clone(), "amortising shape requires a maturity_date".to_string())
    })
}

/// `fixed_bullet` / `variable_bullet`: interest accrues each coupon
/// sub-period (truncated at `analysis_date`); full notional redeems at
/// maturity.
pub fn bullet_flows(contract: &Contract, curves: &ForwardCurveSet, analysis_date: NaiveDate) -> EngineResult<Vec<FlowPoint>> {
    let maturity = maturity_of(contract)?;
    let payment_freq = parsed_payment_freq(contract)?;
    let boundaries = period_boundaries(contract.start_date, maturity, payment_freq);

    let mut points = Vec::new();
    for pair in boundaries.windows(2) {
        let (p0, p1) = (pair[0], pair[1]);
        if p1 <= analysis_date {
            continue;
        }
        let accrual_start = p0.max(analysis_date);
        let segments = segment_rates_for_accrual(contract, curves, accrual_start, p1)?;
        let interest: f64 = segments
            .iter()
            .map(|s| contract.notional * s.rate * yearfrac(s.seg_start, s.seg_end, contract.daycount_base))
            .sum();
        let principal = if p1 == maturity { contract.notional } else { 0.0 };
        points.push(FlowPoint { date: p1, interest, principal });
    }
    Ok(points)
}

/// `fixed_linear` / `variable_linear`: equal-principal amortisation. Per
/// spec.md §4.5, outstanding decays linearly from
/// `outstanding_at_effective_start` — the full, undiminished notional — at
/// `cycle_start = max(start_date, analysis_date)` to 0 at maturity: the
/// whole payment schedule is rebuilt from `cycle_start` rather than walked
/// and truncated from `start_date`, so a seasoned contract's pre-valuation
/// periods never consume part of its amortisation.
pub fn linear_flows(contract: &Contract, curves: &ForwardCurveSet, analysis_date: NaiveDate) -> EngineResult<Vec<FlowPoint>> {
    let maturity = maturity_of(contract)?;
    let cycle_start = contract.start_date.max(analysis_date);
    if cycle_start >= maturity {
        return Ok(Vec::new());
    }
    let payment_freq = parsed_payment_freq(contract)?;
    let boundaries = period_boundaries(cycle_start, maturity, payment_freq);
    let num_periods = boundaries.len() - 1;
    let principal_per_period = contract.notional / num_periods as f64;

    let mut points = Vec::new();
    let mut balance = contract.notional;
    for (i, pair) in boundaries.windows(2).enumerate() {
        let (p0, p1) = (pair[0], pair[1]);
        let is_last = i == num_periods - 1;
        let n_start = balance;
        let principal = if is_last { balance } else { principal_per_period };
        let n_end = clamp_balance(balance - principal);

        let segments = segment_rates_for_accrual(contract, curves, p0, p1)?;
        let seg_total_yf = yearfrac(p0, p1, contract.daycount_base).max(1e-12);
        let interest: f64 = segments
            .iter()
            .map(|s| {
                let seg_yf = yearfrac(s.seg_start, s.seg_end, contract.daycount_base);
                let local_start_balance = n_start - (yearfrac(p0, s.seg_start, contract.daycount_base) / seg_total_yf) * (n_start - n_end);
                let local_end_balance = n_start - (yearfrac(p0, s.seg_end, contract.daycount_base) / seg_total_yf) * (n_start - n_end);
                0.5 * (local_start_balance + local_end_balance) * s.rate * seg_yf
            })
            .sum();
        points.push(FlowPoint { date: p1, interest, principal });
        balance = n_end;
    }
    Ok(points)
}

/// `fixed_annuity` / `variable_annuity`: level-payment amortisation.
/// `RepriceOnReset` recomputes the level payment every period from the
/// then-current balance and the period's opening rate, applied flat to
/// the remaining schedule — for a fixed contract this is a no-op since
/// the rate never changes, reducing to the classic constant annuity.
/// `FixedPayment` computes the payment once, at the first period, and
/// lets principal absorb the difference as the floating rate moves. As
/// with `linear_flows`, the schedule is rebuilt from
/// `cycle_start = max(start_date, analysis_date)` with the full,
/// undiminished notional as the opening balance, per spec.md §4.5.
pub fn annuity_flows(contract: &Contract, curves: &ForwardCurveSet, analysis_date: NaiveDate) -> EngineResult<Vec<FlowPoint>> {
    let maturity = maturity_of(contract)?;
    let cycle_start = contract.start_date.max(analysis_date);
    if cycle_start >= maturity {
        return Ok(Vec::new());
    }
    let payment_freq = parsed_payment_freq(contract)?;
    let boundaries = period_boundaries(cycle_start, maturity, payment_freq);
    let num_periods = boundaries.len() - 1;

    let recompute_every_period = contract.rate_type == RateType::Fixed || contract.annuity_payment_mode == AnnuityPaymentMode::RepriceOnReset;

    let mut points = Vec::new();
    let mut balance = contract.notional;
    let mut fixed_payment: Option<f64> = None;

    for i in 0..num_periods {
        let p0 = boundaries[i];
        let p1 = boundaries[i + 1];
        let is_last = i == num_periods - 1;

        let segments = segment_rates_for_accrual(contract, curves, p0, p1)?;
        let period_rate = segments.first().map(|s| s.rate).unwrap_or(0.0);

        let payment = if recompute_every_period {
            level_payment(balance, period_rate, &boundaries[i..=num_periods], contract.daycount_base)
        } else {
            match fixed_payment {
                Some(p) => p,
                None => {
                    let p = level_payment(balance, period_rate, &boundaries[i..=num_periods], contract.daycount_base);
                    fixed_payment = Some(p);
                    p
                }
            }
        };

        let interest: f64 = segments.iter().map(|s| balance * s.rate * yearfrac(s.seg_start, s.seg_end, contract.daycount_base)).sum();
        let principal = if is_last { balance } else { (payment - interest).max(0.0).min(balance) };

        points.push(FlowPoint { date: p1, interest, principal });
        balance = clamp_balance(balance - principal);
    }
    Ok(points)
}

/// Level-payment amount for `balance` over the remaining `boundaries`
/// window at a flat `rate`, per §4.9's simple-interest-compounding
/// annuity factor `P = balance / Σ 1/Π(1+rate·yf_k)`.
fn level_payment(balance: f64, rate: f64, boundaries: &[NaiveDate], daycount: crate::daycount::DaycountBase) -> f64 {
    let mut cumulative_discount_factor = 1.0;
    let mut annuity_factor = 0.0;
    for pair in boundaries.windows(2) {
        let yf = yearfrac(pair[0], pair[1], daycount);
        cumulative_discount_factor *= 1.0 + rate * yf;
        annuity_factor += 1.0 / cumulative_discount_factor;
    }
    if annuity_factor.abs() < 1e-12 {
        balance
    } else {
        balance / annuity_factor
    }
}

/// `fixed_scheduled` / `variable_scheduled`: interest on current balance
/// over segments bounded by both resets and scheduled-flow dates;
/// principal is exactly the scheduled flows falling in the half-open
/// `(cycle_start, cycle_end]` window, with any residual balance absorbed
/// as a terminal principal at maturity. Per spec.md §4.5, the schedule is
/// rebuilt from `cycle_start = max(start_date, analysis_date)` with the
/// full, undiminished notional as the opening balance — scheduled flows
/// at or before `cycle_start` are historical (already paid) and are
/// excluded from both the boundary set and the window sums.
pub fn scheduled_flows(
    contract: &Contract,
    curves: &ForwardCurveSet,
    analysis_date: NaiveDate,
    flows: &[ScheduledFlow],
) -> EngineResult<Vec<FlowPoint>> {
    let maturity = maturity_of(contract)?;
    let cycle_start = contract.start_date.max(analysis_date);
    if cycle_start >= maturity {
        return Ok(Vec::new());
    }

    let mut boundaries: Vec<NaiveDate> = vec![cycle_start];
    boundaries.extend(flows.iter().map(|f| f.flow_date).filter(|d| *d > cycle_start));
    boundaries.push(maturity);
    boundaries.sort();
    boundaries.dedup();

    let mut points = Vec::new();
    let mut balance = contract.notional;
    let num_boundaries = boundaries.len();

    for (i, pair) in boundaries.windows(2).enumerate() {
        let (p0, p1) = (pair[0], pair[1]);
        let is_last = i == num_boundaries - 2;

        let segments = segment_rates_for_accrual(contract, curves, p0, p1)?;
        let interest: f64 = segments.iter().map(|s| balance * s.rate * yearfrac(s.seg_start, s.seg_end, contract.daycount_base)).sum();

        let scheduled_in_window: f64 = flows.iter().filter(|f| f.flow_date > p0 && f.flow_date <= p1).map(|f| f.principal_amount).sum();
        let mut principal = scheduled_in_window.min(balance);
        if is_last {
            // absorb any residual balance (unscheduled tail) at maturity
            principal = balance;
        }

        points.push(FlowPoint { date: p1, interest, principal });
        balance = clamp_balance(balance - principal);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{DaycountBase, Side, SourceContractType};
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn flat_curves(rate: f64, analysis_date: NaiveDate) -> ForwardCurveSet {
        let mut curves = BTreeMap::new();
        curves.insert("EUR_RFR".to_string(), crate::curve::ForwardCurve::from_points(vec![crate::curve::CurvePoint { t_years: 0.1, rate }]));
        ForwardCurveSet::new(analysis_date, DaycountBase::Act365, curves)
    }

    fn base(sct: SourceContractType, notional: f64, start: NaiveDate, maturity: NaiveDate) -> Contract {
        Contract {
            contract_id: "X1".to_string(),
            side: Side::Asset,
            start_date: start,
            maturity_date: Some(maturity),
            notional,
            daycount_base: DaycountBase::Act360,
            source_contract_type: sct,
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

    #[test]
    fn linear_principal_sums_to_notional() {
        let contract = base(SourceContractType::FixedLinear, 1000.0, d(2025, 1, 1), d(2030, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let points = linear_flows(&contract, &curves, analysis_date).unwrap();
        let total: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn annuity_payment_is_level_when_fixed_rate() {
        let contract = base(SourceContractType::FixedAnnuity, 1000.0, d(2025, 1, 1), d(2030, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let points = annuity_flows(&contract, &curves, analysis_date).unwrap();
        let payments: Vec<f64> = points.iter().map(|p| p.interest + p.principal).collect();
        let first = payments[0];
        for p in &payments[..payments.len() - 1] {
            assert!((p - first).abs() < 1e-6, "level payments should be equal: {payments:?}");
        }
        let total_principal: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total_principal - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn scheduled_flows_follow_explicit_schedule_and_absorb_residual() {
        let contract = base(SourceContractType::FixedScheduled, 1000.0, d(2025, 1, 1), d(2028, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let flows = vec![
            ScheduledFlow { flow_date: d(2026, 1, 1), principal_amount: 300.0 },
            ScheduledFlow { flow_date: d(2027, 1, 1), principal_amount: 300.0 },
        ];
        let points = scheduled_flows(&contract, &curves, analysis_date, &flows).unwrap();
        let total: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total - 1000.0).abs() < 1e-6);
        assert_eq!(points.last().unwrap().date, d(2028, 1, 1));
        assert!((points.last().unwrap().principal - 400.0).abs() < 1e-6);
    }

    #[test]
    fn bullet_redeems_full_notional_only_at_maturity() {
        let contract = base(SourceContractType::FixedBullet, 500.0, d(2025, 1, 1), d(2028, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let points = bullet_flows(&contract, &curves, analysis_date).unwrap();
        for p in &points[..points.len() - 1] {
            assert_eq!(p.principal, 0.0);
        }
        assert_eq!(points.last().unwrap().principal, 500.0);
    }

    /// A seasoned contract (`analysis_date` well after `start_date`) must
    /// still amortise its *full* notional from `cycle_start` onward — the
    /// pre-valuation periods are not walked away from the schedule.
    #[test]
    fn linear_amortises_full_notional_from_cycle_start_for_a_seasoned_contract() {
        let contract = base(SourceContractType::FixedLinear, 1000.0, d(2020, 1, 1), d(2030, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let points = linear_flows(&contract, &curves, analysis_date).unwrap();
        let total: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total - 1000.0).abs() < 1e-6, "seasoned linear contract should still amortise the full notional: {total}");
        assert_eq!(points.first().unwrap().principal, points.last().unwrap().principal);
    }

    #[test]
    fn annuity_amortises_full_notional_from_cycle_start_for_a_seasoned_contract() {
        let contract = base(SourceContractType::FixedAnnuity, 1000.0, d(2020, 1, 1), d(2030, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let points = annuity_flows(&contract, &curves, analysis_date).unwrap();
        let total_principal: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total_principal - 1000.0).abs() < 1e-6, "seasoned annuity contract should still amortise the full notional: {total_principal}");
        let payments: Vec<f64> = points.iter().map(|p| p.interest + p.principal).collect();
        let first = payments[0];
        for p in &payments[..payments.len() - 1] {
            assert!((p - first).abs() < 1e-6, "level payments should be equal: {payments:?}");
        }
    }

    #[test]
    fn scheduled_flows_absorb_full_residual_for_a_seasoned_contract() {
        let contract = base(SourceContractType::FixedScheduled, 1000.0, d(2020, 1, 1), d(2028, 1, 1));
        let analysis_date = d(2025, 1, 1);
        let curves = flat_curves(0.02, analysis_date);
        let flows = vec![
            ScheduledFlow { flow_date: d(2021, 1, 1), principal_amount: 300.0 }, // historical, before cycle_start
            ScheduledFlow { flow_date: d(2026, 1, 1), principal_amount: 300.0 },
            ScheduledFlow { flow_date: d(2027, 1, 1), principal_amount: 300.0 },
        ];
        let points = scheduled_flows(&contract, &curves, analysis_date, &flows).unwrap();
        let total: f64 = points.iter().map(|p| p.principal).sum();
        assert!((total - 1000.0).abs() < 1e-6, "seasoned scheduled contract should still amortise the full notional: {total}");
        assert_eq!(points.last().unwrap().date, d(2028, 1, 1));
        assert!((points.last().unwrap().principal - 400.0).abs() < 1e-6);
    }
}
