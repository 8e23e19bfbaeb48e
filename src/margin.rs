//! Renewal margin calibration (§4.4).
//!
//! Infers the spread a contract earns/pays over its reference rate from a
//! lookback window of recent originations, then exposes a most-specific-
//! first fallback lookup used by the NII projector's balance-constant
//! rollover.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::contracts::{Contract, RateType, SourceContractType};
use crate::curve::ForwardCurveSet;
use crate::daycount::{add_frequency, parse_frequency_token, yearfrac, Frequency, FrequencyUnit};
use crate::error::{EngineError, EngineResult};

/// Default lookback window for "recent" originations: 12 months by
/// `start_date`, filtered against the analysis date.
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 12;

/// `(source_contract_type, side, repricing_freq, index_name)` key a margin
/// group is calibrated against. `None` fields are wildcards used by the
/// fallback cascade, never by the grouping step itself (which always
/// groups on the fully-specific key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MarginKey {
    pub source_contract_type: SourceContractType,
    pub side: crate::contracts::Side,
    pub repricing_freq: Option<String>,
    pub index_name: Option<String>,
}

/// An immutable, built-once-read-many table of weighted-average margins
/// keyed by the fully-specific `MarginKey`. Lookup falls back through
/// coarser profiles (see `lookup`).
#[derive(Debug, Clone, Default)]
pub struct MarginSet {
    by_key: BTreeMap<String, f64>,
}

/// Serialise a `MarginKey` (or a partial profile tuple) into the
/// `BTreeMap` string key used internally. Keeping this as one function
/// guarantees the grouping step and every fallback step agree on format.
fn profile_key(
    sct: Option<SourceContractType>,
    side: Option<crate::contracts::Side>,
    freq: Option<&str>,
    idx: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}|{}",
        sct.map(SourceContractType::as_str).unwrap_or("*"),
        side.map(|s| if matches!(s, crate::contracts::Side::Asset) { "A" } else { "L" }).unwrap_or("*"),
        freq.unwrap_or("*"),
        idx.unwrap_or("*"),
    )
}

impl MarginSet {
    /// Calibrate from the full position set over the base curve set. Only
    /// rows whose `start_date` falls within `lookback_months` of
    /// `analysis_date` (and not after it) are considered originations.
    pub fn calibrate(
        positions: &[Contract],
        curves: &ForwardCurveSet,
        risk_free_index: &str,
        analysis_date: NaiveDate,
        lookback_months: u32,
    ) -> EngineResult<Self> {
        let window_start = subtract_months(analysis_date, lookback_months);

        let mut groups: BTreeMap<MarginKey, (f64, f64)> = BTreeMap::new(); // key -> (weighted_sum, weight_total)

        for contract in positions {
            if contract.start_date > analysis_date || contract.start_date < window_start {
                continue;
            }

            let margin = match contract.rate_type {
                RateType::Fixed => {
                    let fixed_rate = match contract.fixed_rate {
                        Some(r) => r,
                        None => continue,
                    };
                    let benchmark_date = benchmark_date_for(contract, analysis_date);
                    let rf = curves.rate_on_date(risk_free_index, benchmark_date)?;
                    fixed_rate - rf
                }
                RateType::Float => match contract.spread {
                    Some(s) => s,
                    None => continue,
                },
            };

            let weight = if contract.notional.abs() > 0.0 { contract.notional.abs() } else { 1.0 };
            let key = MarginKey {
                source_contract_type: contract.source_contract_type,
                side: contract.side,
                repricing_freq: contract.repricing_freq.clone(),
                index_name: contract.index_name.clone(),
            };
            let entry = groups.entry(key).or_insert((0.0, 0.0));
            entry.0 += margin * weight;
            entry.1 += weight;
        }

        let mut by_key = BTreeMap::new();
        for (key, (weighted_sum, weight_total)) in groups {
            if weight_total <= 0.0 {
                continue;
            }
            let avg = weighted_sum / weight_total;
            by_key.insert(
                profile_key(Some(key.source_contract_type), Some(key.side), key.repricing_freq.as_deref(), key.index_name.as_deref()),
                avg,
            );
            // Also roll the same observation into every coarser profile the
            // fallback cascade can query, weighted-averaged across all rows
            // that land in that coarser bucket.
        }

        // Recompute the coarser fallback levels directly from raw rows so
        // their weighted averages are correct (rather than averaging
        // already-averaged fully-specific groups).
        let mut coarse_groups: Vec<BTreeMap<String, (f64, f64)>> = vec![BTreeMap::new(); 6];
        for contract in positions {
            if contract.start_date > analysis_date || contract.start_date < window_start {
                continue;
            }
            let margin = match contract.rate_type {
                RateType::Fixed => {
                    let fixed_rate = match contract.fixed_rate {
                        Some(r) => r,
                        None => continue,
                    };
                    let benchmark_date = benchmark_date_for(contract, analysis_date);
                    let rf = curves.rate_on_date(risk_free_index, benchmark_date)?;
                    fixed_rate - rf
                }
                RateType::Float => match contract.spread {
                    Some(s) => s,
                    None => continue,
                },
            };
            let weight = if contract.notional.abs() > 0.0 { contract.notional.abs() } else { 1.0 };
            let sct = Some(contract.source_contract_type);
            let side = Some(contract.side);
            let freq = contract.repricing_freq.as_deref();

            let keys = [
                profile_key(sct, side, freq, None),
                profile_key(sct, None, freq, None),
                profile_key(sct, side, None, None),
                profile_key(sct, None, None, None),
                profile_key(None, None, freq, None),
                profile_key(None, None, None, None),
            ];
            for (level, k) in keys.into_iter().enumerate() {
                let entry = coarse_groups[level].entry(k).or_insert((0.0, 0.0));
                entry.0 += margin * weight;
                entry.1 += weight;
            }
        }
        for level_map in coarse_groups {
            for (k, (weighted_sum, weight_total)) in level_map {
                if weight_total > 0.0 {
                    by_key.entry(k).or_insert(weighted_sum / weight_total);
                }
            }
        }

        Ok(MarginSet { by_key })
    }

    /// Most-specific-first fallback lookup, per spec.md §4.4's 7-tuple
    /// cascade: `(sct,side,freq,idx) -> (sct,side,freq) -> (sct,freq) ->
    /// (sct,side) -> (sct,) -> (freq,) -> ()`.
    pub fn lookup(
        &self,
        sct: SourceContractType,
        side: crate::contracts::Side,
        freq: Option<&str>,
        idx: Option<&str>,
        default: Option<f64>,
    ) -> EngineResult<f64> {
        let candidates = [
            profile_key(Some(sct), Some(side), freq, idx),
            profile_key(Some(sct), Some(side), freq, None),
            profile_key(Some(sct), None, freq, None),
            profile_key(Some(sct), Some(side), None, None),
            profile_key(Some(sct), None, None, None),
            profile_key(None, None, freq, None),
            profile_key(None, None, None, None),
        ];
        for key in candidates {
            if let Some(margin) = self.by_key.get(&key) {
                return Ok(*margin);
            }
        }
        default.ok_or_else(|| EngineError::MissingMargin {
            request: format!("{}/{side:?}/{freq:?}/{idx:?}", sct.as_str()),
        })
    }
}

/// `analysis_date + repricing_freq` when a repricing frequency exists,
/// else `analysis_date + (maturity - start)` (original term point), else
/// `analysis_date + 1Y`.
fn benchmark_date_for(contract: &Contract, analysis_date: NaiveDate) -> NaiveDate {
    if let Ok(Some(freq)) = parse_frequency_token(contract.repricing_freq.as_deref(), false, None, "repricing_freq") {
        return add_frequency(analysis_date, freq);
    }
    if let Some(maturity) = contract.maturity_date {
        let term_days = (maturity - contract.start_date).num_days();
        if term_days > 0 {
            return analysis_date + chrono::Duration::days(term_days);
        }
    }
    add_frequency(analysis_date, Frequency { count: 1, unit: FrequencyUnit::Years })
}

fn subtract_months(d: NaiveDate, months: u32) -> NaiveDate {
    use chrono::Datelike;
    let total = d.year() * 12 + d.month() as i32 - 1 - months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let last_day = {
        let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let first_of_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid month");
        let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
        (first_of_next - first_of_this).num_days() as u32
    };
    NaiveDate::from_ymd_opt(year, month, d.day().min(last_day)).expect("normalised date")
}

/// Forward/projection rate helper for floating renewal legs: `spread +
/// index_rate(cycle_start)`, the rate used by the §4.8 rollover for
/// floating renewals instead of the margin-calibration path.
pub fn forward_index_rate(curves: &ForwardCurveSet, index_name: &str, cycle_start: NaiveDate, spread: f64) -> EngineResult<f64> {
    Ok(curves.rate_on_date(index_name, cycle_start)? + spread)
}

/// Year-fraction convenience re-export used by callers that only need the
/// margin module's date helpers without importing daycount directly.
pub fn term_years(start: NaiveDate, end: NaiveDate, base: crate::daycount::DaycountBase) -> f64 {
    yearfrac(start, end, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AnnuityPaymentMode, DaycountBase, Side};
    use std::collections::BTreeMap as Map;

    fn flat_curve_set(rate: f64, analysis_date: NaiveDate) -> ForwardCurveSet {
        let mut curves = Map::new();
        curves.insert(
            "EUR_RFR".to_string(),
            crate::curve::ForwardCurve::from_points(vec![
                crate::curve::CurvePoint { t_years: 0.1, rate },
                crate::curve::CurvePoint { t_years: 30.0, rate },
            ]),
        );
        ForwardCurveSet::new(analysis_date, DaycountBase::Act365, curves)
    }

    fn fixed_contract(id: &str, start: NaiveDate, maturity: NaiveDate, fixed_rate: f64) -> Contract {
        Contract {
            contract_id: id.to_string(),
            side: Side::Asset,
            start_date: start,
            maturity_date: Some(maturity),
            notional: 1000.0,
            daycount_base: DaycountBase::Act360,
            source_contract_type: SourceContractType::FixedBullet,
            rate_type: RateType::Fixed,
            fixed_rate: Some(fixed_rate),
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
    fn calibrates_fixed_margin_over_risk_free_at_original_term() {
        let analysis_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let curves = flat_curve_set(0.02, analysis_date);
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let maturity = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        let contract = fixed_contract("A1", start, maturity, 0.05);

        let margins = MarginSet::calibrate(&[contract], &curves, "EUR_RFR", analysis_date, 12).unwrap();
        let looked_up = margins
            .lookup(SourceContractType::FixedBullet, Side::Asset, None, None, None)
            .unwrap();
        assert!((looked_up - 0.03).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_coarser_profile_when_fully_specific_is_absent() {
        let analysis_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let curves = flat_curve_set(0.01, analysis_date);
        let start = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let maturity = NaiveDate::from_ymd_opt(2031, 8, 1).unwrap();
        let contract = fixed_contract("A1", start, maturity, 0.04);
        let margins = MarginSet::calibrate(&[contract], &curves, "EUR_RFR", analysis_date, 12).unwrap();

        // query with a repricing_freq the calibration never saw: should still
        // resolve via the (sct,) fallback, not error.
        let looked_up = margins
            .lookup(SourceContractType::FixedBullet, Side::Asset, Some("3M"), None, None)
            .unwrap();
        assert!((looked_up - 0.03).abs() < 1e-9);
    }

    #[test]
    fn missing_margin_without_default_is_an_error() {
        let margins = MarginSet::default();
        let err = margins.lookup(SourceContractType::FixedAnnuity, Side::Liability, None, None, None).unwrap_err();
        assert!(matches!(err, EngineError::MissingMargin { .. }));
    }

    #[test]
    fn missing_margin_falls_back_to_supplied_default() {
        let margins = MarginSet::default();
        let looked_up = margins
            .lookup(SourceContractType::FixedAnnuity, Side::Liability, None, None, Some(0.015))
            .unwrap();
        assert!((looked_up - 0.015).abs() < 1e-12);
    }
}
