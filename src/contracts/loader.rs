//! CSV ingestion for the three canonical input tables: positions,
//! scheduled principal flows, and the yield-curve long table.
//!
//! Follows the teacher's `policy::loader` shape — a `#[derive(Deserialize)]`
//! raw row plus a fallible `to_*` conversion — generalized from one schema
//! to three. Validation (§7 `InvalidInput`/`InconsistentSchedule`) happens
//! here, at the boundary; nothing downstream re-validates.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use csv::Reader;
use serde::Deserialize;

use super::{AnnuityPaymentMode, Contract, CurveLongRow, DaycountBase, NmdParams, RateType, ScheduledFlow, Side, SourceContractType};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Deserialize)]
struct RawContractRow {
    contract_id: String,
    side: String,
    start_date: NaiveDate,
    maturity_date: Option<NaiveDate>,
    notional: f64,
    daycount_base: String,
    source_contract_type: String,
    rate_type: String,
    fixed_rate: Option<f64>,
    index_name: Option<String>,
    spread: Option<f64>,
    repricing_freq: Option<String>,
    next_reprice_date: Option<NaiveDate>,
    floor_rate: Option<f64>,
    cap_rate: Option<f64>,
    payment_freq: Option<String>,
    #[serde(default)]
    is_term_deposit: bool,
    annuity_payment_mode: Option<String>,
    nmd_core_proportion: Option<f64>,
    nmd_pass_through_rate: Option<f64>,
    nmd_core_average_maturity: Option<f64>,
    /// Semicolon-joined `BUCKET=PCT` pairs, e.g. `"ON_1M=2.0;1M_3M=3.5"`.
    nmd_distribution: Option<String>,
}

impl RawContractRow {
    fn into_contract(self) -> EngineResult<Contract> {
        let contract_id = self.contract_id.trim().to_string();
        if contract_id.is_empty() {
            return Err(EngineError::invalid_input(None, "contract_id must not be blank".to_string()));
        }

        let side = Side::parse(&self.side, &contract_id)?;
        let daycount_base = DaycountBase::parse(&self.daycount_base, Some(&contract_id))?;
        let source_contract_type = SourceContractType::parse(&self.source_contract_type, &contract_id)?;
        let rate_type = RateType::parse(&self.rate_type, &contract_id)?;
        let annuity_payment_mode = AnnuityPaymentMode::parse(self.annuity_payment_mode.as_deref(), &contract_id)?;

        let nmd_params = match (
            self.nmd_core_proportion,
            self.nmd_pass_through_rate,
            self.nmd_core_average_maturity,
            self.nmd_distribution,
        ) {
            (Some(core_proportion), Some(pass_through_rate), Some(core_average_maturity), Some(raw_dist)) => {
                let mut distribution = BTreeMap::new();
                for pair in raw_dist.split(';').filter(|p| !p.trim().is_empty()) {
                    let (bucket, pct) = pair.split_once('=').ok_or_else(|| {
                        EngineError::invalid_input(contract_id.clone(), format!("malformed nmd_distribution entry: {pair:?}"))
                    })?;
                    let pct: f64 = pct.trim().parse().map_err(|_| {
                        EngineError::invalid_input(contract_id.clone(), format!("non-numeric NMD distribution percentage: {pct:?}"))
                    })?;
                    distribution.insert(bucket.trim().to_string(), pct);
                }
                let params = NmdParams { core_proportion, pass_through_rate, core_average_maturity, distribution };
                params.validate(&contract_id)?;
                Some(params)
            }
            (None, None, None, None) => None,
            _ => {
                return Err(EngineError::invalid_input(
                    contract_id.clone(),
                    "NMD behavioural parameters must be supplied all-or-nothing".to_string(),
                ))
            }
        };

        let contract = Contract {
            contract_id,
            side,
            start_date: self.start_date,
            maturity_date: self.maturity_date,
            notional: self.notional,
            daycount_base,
            source_contract_type,
            rate_type,
            fixed_rate: self.fixed_rate,
            index_name: self.index_name,
            spread: self.spread,
            repricing_freq: self.repricing_freq,
            next_reprice_date: self.next_reprice_date,
            floor_rate: self.floor_rate,
            cap_rate: self.cap_rate,
            payment_freq: self.payment_freq,
            is_term_deposit: self.is_term_deposit,
            annuity_payment_mode,
            nmd_params,
        };
        contract.validate()?;
        Ok(contract)
    }
}

/// Load and validate the positions table from a CSV reader.
pub fn load_positions<R: std::io::Read>(reader: R) -> EngineResult<Vec<Contract>> {
    let mut rdr = Reader::from_reader(reader);
    let mut out = Vec::new();
    for record in rdr.deserialize::<RawContractRow>() {
        let raw = record.map_err(|e| EngineError::invalid_input(None, format!("CSV parse error: {e}")))?;
        out.push(raw.into_contract()?);
    }
    Ok(out)
}

pub fn load_positions_csv(path: impl AsRef<Path>) -> EngineResult<Vec<Contract>> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| EngineError::invalid_input(None, format!("cannot open {}: {e}", path.as_ref().display())))?;
    load_positions(file)
}

#[derive(Debug, Deserialize)]
struct RawScheduledFlowRow {
    contract_id: String,
    flow_date: NaiveDate,
    principal_amount: f64,
}

/// Load the scheduled-flows table. Amounts are unsigned magnitudes (§3);
/// sign is applied later by the cashflow generator from the owning
/// contract's side.
pub fn load_scheduled_flows<R: std::io::Read>(reader: R) -> EngineResult<Vec<(String, ScheduledFlow)>> {
    let mut rdr = Reader::from_reader(reader);
    let mut out = Vec::new();
    for record in rdr.deserialize::<RawScheduledFlowRow>() {
        let raw = record.map_err(|e| EngineError::invalid_input(None, format!("CSV parse error: {e}")))?;
        if raw.principal_amount < 0.0 {
            return Err(EngineError::invalid_input(
                raw.contract_id.clone(),
                "scheduled_principal_flows.principal_amount must be non-negative".to_string(),
            ));
        }
        out.push((
            raw.contract_id,
            ScheduledFlow { flow_date: raw.flow_date, principal_amount: raw.principal_amount },
        ));
    }
    Ok(out)
}

pub fn load_scheduled_flows_csv(path: impl AsRef<Path>) -> EngineResult<Vec<(String, ScheduledFlow)>> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| EngineError::invalid_input(None, format!("cannot open {}: {e}", path.as_ref().display())))?;
    load_scheduled_flows(file)
}

#[derive(Debug, Deserialize)]
struct RawCurveRow {
    index_name: String,
    tenor_token: String,
    forward_rate: f64,
    tenor_date: NaiveDate,
    year_fraction: f64,
}

pub fn load_yield_curve_long<R: std::io::Read>(reader: R) -> EngineResult<Vec<CurveLongRow>> {
    let mut rdr = Reader::from_reader(reader);
    let mut out = Vec::new();
    for record in rdr.deserialize::<RawCurveRow>() {
        let raw = record.map_err(|e| EngineError::invalid_input(None, format!("CSV parse error: {e}")))?;
        out.push(CurveLongRow {
            index_name: raw.index_name,
            tenor_token: raw.tenor_token,
            forward_rate: raw.forward_rate,
            tenor_date: raw.tenor_date,
            year_fraction: raw.year_fraction,
        });
    }
    Ok(out)
}

pub fn load_yield_curve_long_csv(path: impl AsRef<Path>) -> EngineResult<Vec<CurveLongRow>> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| EngineError::invalid_input(None, format!("cannot open {}: {e}", path.as_ref().display())))?;
    load_yield_curve_long(file)
}

/// Build a `ForwardCurveSet` from the long table: group rows by
/// `index_name`, turn each group's `(year_fraction, forward_rate)` pairs
/// into a `ForwardCurve`. `tenor_token` is carried through for
/// observability but not consulted here — `year_fraction` is already the
/// canonical time axis.
pub fn curve_set_from_long_table(
    rows: &[CurveLongRow],
    analysis_date: NaiveDate,
    daycount_base: DaycountBase,
) -> crate::curve::ForwardCurveSet {
    use crate::curve::{CurvePoint, ForwardCurve};

    let mut by_index: BTreeMap<String, Vec<CurvePoint>> = BTreeMap::new();
    for row in rows {
        by_index.entry(row.index_name.clone()).or_default().push(CurvePoint {
            t_years: row.year_fraction,
            rate: row.forward_rate,
        });
    }
    let curves = by_index.into_iter().map(|(name, points)| (name, ForwardCurve::from_points(points))).collect();
    crate::curve::ForwardCurveSet::new(analysis_date, daycount_base, curves)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONS_CSV: &str = "contract_id,side,start_date,maturity_date,notional,daycount_base,source_contract_type,rate_type,fixed_rate,index_name,spread,repricing_freq,next_reprice_date,floor_rate,cap_rate,payment_freq,is_term_deposit,annuity_payment_mode,nmd_core_proportion,nmd_pass_through_rate,nmd_core_average_maturity,nmd_distribution\n\
A1,A,2025-01-01,2028-01-01,100,ACT/360,fixed_bullet,fixed,0.05,,,,,,,1Y,false,,,,,\n";

    #[test]
    fn loads_a_minimal_fixed_bullet_row() {
        let contracts = load_positions(POSITIONS_CSV.as_bytes()).unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].contract_id, "A1");
        assert_eq!(contracts[0].notional, 100.0);
        assert_eq!(contracts[0].fixed_rate, Some(0.05));
    }

    #[test]
    fn rejects_unrecognised_daycount() {
        let bad = POSITIONS_CSV.replace("ACT/360", "ACT/BOGUS");
        let err = load_positions(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn curve_set_from_long_table_groups_by_index() {
        let rows = vec![
            CurveLongRow {
                index_name: "EUR_RFR".to_string(),
                tenor_token: "1Y".to_string(),
                forward_rate: 0.02,
                tenor_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
                year_fraction: 1.0,
            },
            CurveLongRow {
                index_name: "EUR_RFR".to_string(),
                tenor_token: "5Y".to_string(),
                forward_rate: 0.025,
                tenor_date: NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(),
                year_fraction: 5.0,
            },
        ];
        let set = curve_set_from_long_table(&rows, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), DaycountBase::Act365);
        assert!((set.get("EUR_RFR").unwrap().rate(1.0) - 0.02).abs() < 1e-9);
    }
}
