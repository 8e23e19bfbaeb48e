//! The scenario orchestrator (§4.11): builds one shocked curve set per
//! regulatory scenario, fans the (scenarios + 1) base+shocked projections
//! out over a `rayon` thread pool, and reduces per-scenario EVE/NII
//! results into a `CalculationResult`. What-If is the same reduction run
//! twice — once over an additions leg, once over a removals leg — with
//! the two legs' results subtracted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::bucket::{TimeBucket, DEFAULT_OPEN_ENDED_POINT_YEARS, EVE_REGULATORY_BUCKETS};
use crate::cashflow::{generate_cashflows, sort_cashflow_table, BehaviouralRates, Cashflow};
use crate::contracts::{Contract, ScheduledFlow};
use crate::curve::ForwardCurveSet;
use crate::daycount::{add_frequency, Frequency, FrequencyUnit};
use crate::error::{EngineError, EngineResult};
use crate::eve::{evaluate_eve, EveBucketRow};
use crate::margin::MarginSet;
use crate::nii::{apply_nmd_beta_correction, generate_with_rollover, monthly_breakdown, nii_scalar, MonthlyNiiRow};
use crate::shocks::{shock_parameters_for_currency, shocked_curve_set, PostShockFloorParameters, ScenarioId};

/// One scenario's full result (§6): EVE scalar + bucketed breakdown, NII
/// scalar + monthly breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub eve_scalar: f64,
    pub nii_scalar: f64,
    pub eve_buckets: Vec<EveBucketRow>,
    pub nii_monthly: Vec<MonthlyNiiRow>,
}

/// The full output of one orchestrator run (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResult {
    pub base: ScenarioResult,
    pub scenarios: BTreeMap<String, ScenarioResult>,
    pub worst_scenario_id: Option<String>,
    pub worst_delta_eve: f64,
}

/// Everything the orchestrator needs for one `run` call. Positions,
/// scheduled flows, the base curve set and the calibrated margin set are
/// all built once and shared read-only across every scenario task (§4.11,
/// §5).
pub struct OrchestratorInputs {
    pub positions: Vec<Contract>,
    pub scheduled_flows: BTreeMap<String, Vec<ScheduledFlow>>,
    pub base_curve_set: ForwardCurveSet,
    pub margin_set: MarginSet,
    pub scenario_ids: Vec<ScenarioId>,
    pub analysis_date: NaiveDate,
    pub discount_index: String,
    pub risk_free_index: String,
    pub currency: String,
    pub horizon_months: u32,
    pub balance_constant: bool,
    pub behavioural_rates: BehaviouralRates,
    pub bucket_grid: &'static [TimeBucket],
}

fn scheduled_flows_for<'a>(map: &'a BTreeMap<String, Vec<ScheduledFlow>>, contract_id: &str) -> &'a [ScheduledFlow] {
    map.get(contract_id).map(Vec::as_slice).unwrap_or(&[])
}

/// Build the plain (non-rolled) cashflow table used by the EVE evaluator:
/// one pass over every contract against `curves`.
fn build_plain_cashflows(inputs: &OrchestratorInputs, curves: &ForwardCurveSet) -> EngineResult<Vec<Cashflow>> {
    let mut rows = Vec::new();
    for contract in &inputs.positions {
        let flows = generate_cashflows(
            contract,
            curves,
            inputs.analysis_date,
            scheduled_flows_for(&inputs.scheduled_flows, &contract.contract_id),
            inputs.behavioural_rates,
        )?;
        rows.extend(flows);
    }
    sort_cashflow_table(&mut rows);
    Ok(rows)
}

/// Build the cashflow table used by the NII projector: identical to the
/// plain table unless `balance_constant` is set, in which case every
/// contract is projected through `generate_with_rollover` instead (§4.8).
fn build_nii_cashflows(inputs: &OrchestratorInputs, curves: &ForwardCurveSet, horizon_end: NaiveDate) -> EngineResult<Vec<Cashflow>> {
    if !inputs.balance_constant {
        return build_plain_cashflows(inputs, curves);
    }
    let mut rows = Vec::new();
    for contract in &inputs.positions {
        if contract.maturity_date.is_none() {
            // NMDs never roll; project them exactly as for EVE.
            rows.extend(generate_cashflows(
                contract,
                curves,
                inputs.analysis_date,
                scheduled_flows_for(&inputs.scheduled_flows, &contract.contract_id),
                inputs.behavioural_rates,
            )?);
            continue;
        }
        rows.extend(generate_with_rollover(
            contract,
            curves,
            inputs.analysis_date,
            horizon_end,
            &inputs.margin_set,
            &inputs.risk_free_index,
            inputs.behavioural_rates,
        )?);
    }
    sort_cashflow_table(&mut rows);
    Ok(rows)
}

fn compute_scenario_result(scenario_label: &str, inputs: &OrchestratorInputs, curves: &ForwardCurveSet) -> EngineResult<ScenarioResult> {
    let horizon_end = add_frequency(inputs.analysis_date, Frequency { count: inputs.horizon_months, unit: FrequencyUnit::Months });

    let eve_cashflows = build_plain_cashflows(inputs, curves)?;
    let eve_result = evaluate_eve(&eve_cashflows, curves, &inputs.discount_index, inputs.bucket_grid, DEFAULT_OPEN_ENDED_POINT_YEARS)?;

    let nii_cashflows = build_nii_cashflows(inputs, curves, horizon_end)?;
    let mut nii_monthly = monthly_breakdown(&nii_cashflows, inputs.analysis_date, inputs.horizon_months);

    // NMD beta-repricing correction (§4.6): compare this scenario's shocked
    // risk-free rate at the analysis date against the base curve's own rate
    // at the same point to get this scenario's Delta r, then apply it to
    // every fixed-NMD position's monthly accrual. A no-op for the base
    // scenario itself, where the two curves are identical and delta_r is 0.
    let delta_r = curves.rate_on_date(&inputs.risk_free_index, inputs.analysis_date)?
        - inputs.base_curve_set.rate_on_date(&inputs.risk_free_index, inputs.analysis_date)?;
    if delta_r != 0.0 {
        for contract in &inputs.positions {
            apply_nmd_beta_correction(&mut nii_monthly, contract, delta_r, inputs.analysis_date, inputs.horizon_months);
        }
    }
    let nii_total = nii_scalar(&nii_monthly);

    Ok(ScenarioResult {
        scenario_id: scenario_label.to_string(),
        eve_scalar: eve_result.scalar,
        nii_scalar: nii_total,
        eve_buckets: eve_result.buckets,
        nii_monthly,
    })
}

/// Run the orchestrator: base scenario plus every shocked scenario,
/// fanned out over `rayon`, reduced into one `CalculationResult`. Any
/// worker error aborts the whole calculation — no partial result is
/// returned (§7, §5).
pub fn run(inputs: &OrchestratorInputs) -> EngineResult<CalculationResult> {
    let base = compute_scenario_result("base", inputs, &inputs.base_curve_set)?;

    let shock = if inputs.scenario_ids.is_empty() { None } else { Some(shock_parameters_for_currency(&inputs.currency)?) };

    let outcomes: Vec<Result<(String, ScenarioResult), (String, EngineError)>> = inputs
        .scenario_ids
        .par_iter()
        .map(|&scenario| {
            let label = scenario.as_str().to_string();
            let shock = shock.expect("non-empty scenario_ids guarantees shock was resolved");
            let curves = shocked_curve_set(&inputs.base_curve_set, scenario, &inputs.risk_free_index, shock, PostShockFloorParameters::default())
                .map_err(|e| (label.clone(), e))?;
            compute_scenario_result(&label, inputs, &curves).map(|r| (label.clone(), r)).map_err(|e| (label, e))
        })
        .collect();

    let mut scenarios = BTreeMap::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok((label, result)) => {
                scenarios.insert(label, result);
            }
            Err((label, err)) => failures.push((label, err)),
        }
    }
    if !failures.is_empty() {
        return Err(EngineError::worker_aggregated(failures));
    }

    let (worst_scenario_id, worst_delta_eve) = scenarios
        .iter()
        .map(|(id, result)| (id.clone(), result.eve_scalar - base.eve_scalar))
        .min_by(|a, b| a.1.partial_cmp(&b.1).expect("non-NaN EVE deltas"))
        .map(|(id, delta)| (Some(id), delta))
        .unwrap_or((None, 0.0));

    Ok(CalculationResult { base, scenarios, worst_scenario_id, worst_delta_eve })
}

/// `WhatIfResult` (§6): orchestrator-result(additions) minus
/// orchestrator-result(removals), bucket-aligned and scenario-aligned. An
/// empty modification list on either leg naturally yields zeros for that
/// leg's contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct WhatIfResult {
    pub base_eve_delta: f64,
    pub worst_eve_delta: f64,
    pub base_nii_delta: f64,
    pub worst_nii_delta: f64,
    pub scenario_eve_deltas: BTreeMap<String, f64>,
    pub scenario_nii_deltas: BTreeMap<String, f64>,
    pub eve_bucket_deltas: Vec<(String, &'static str, f64, f64, f64)>,
    pub nii_month_deltas: Vec<(String, u32, String, f64, f64)>,
}

fn bucket_side_pv(buckets: &[EveBucketRow], bucket_name: &str, side_group: crate::eve::SideGroup) -> f64 {
    buckets.iter().find(|b| b.bucket_name == bucket_name && b.side_group == side_group).map(|b| b.pv_total).unwrap_or(0.0)
}

fn scenario_result_set(calc: &CalculationResult) -> BTreeMap<&str, &ScenarioResult> {
    let mut map: BTreeMap<&str, &ScenarioResult> = BTreeMap::new();
    map.insert("base", &calc.base);
    for (id, result) in &calc.scenarios {
        map.insert(id.as_str(), result);
    }
    map
}

/// Run the orchestrator over the additions and removals legs and return
/// their signed difference.
pub fn what_if(additions: &OrchestratorInputs, removals: &OrchestratorInputs) -> EngineResult<WhatIfResult> {
    let add_calc = run(additions)?;
    let remove_calc = run(removals)?;

    let add_scenarios = scenario_result_set(&add_calc);
    let remove_scenarios = scenario_result_set(&remove_calc);

    let base_eve_delta = add_calc.base.eve_scalar - remove_calc.base.eve_scalar;
    let base_nii_delta = add_calc.base.nii_scalar - remove_calc.base.nii_scalar;

    let mut scenario_eve_deltas = BTreeMap::new();
    let mut scenario_nii_deltas = BTreeMap::new();
    let mut eve_bucket_deltas = Vec::new();
    let mut nii_month_deltas = Vec::new();

    let mut scenario_labels: Vec<&str> = add_scenarios.keys().chain(remove_scenarios.keys()).copied().collect();
    scenario_labels.sort_unstable();
    scenario_labels.dedup();

    for label in scenario_labels {
        let add = add_scenarios.get(label);
        let remove = remove_scenarios.get(label);
        let add_eve = add.map(|r| r.eve_scalar).unwrap_or(0.0);
        let remove_eve = remove.map(|r| r.eve_scalar).unwrap_or(0.0);
        let add_nii = add.map(|r| r.nii_scalar).unwrap_or(0.0);
        let remove_nii = remove.map(|r| r.nii_scalar).unwrap_or(0.0);
        scenario_eve_deltas.insert(label.to_string(), add_eve - remove_eve);
        scenario_nii_deltas.insert(label.to_string(), add_nii - remove_nii);

        for bucket in EVE_REGULATORY_BUCKETS.iter() {
            let add_asset = add.map(|r| bucket_side_pv(&r.eve_buckets, bucket.name, crate::eve::SideGroup::Asset)).unwrap_or(0.0);
            let remove_asset = remove.map(|r| bucket_side_pv(&r.eve_buckets, bucket.name, crate::eve::SideGroup::Asset)).unwrap_or(0.0);
            let add_liability = add.map(|r| bucket_side_pv(&r.eve_buckets, bucket.name, crate::eve::SideGroup::Liability)).unwrap_or(0.0);
            let remove_liability = remove.map(|r| bucket_side_pv(&r.eve_buckets, bucket.name, crate::eve::SideGroup::Liability)).unwrap_or(0.0);
            eve_bucket_deltas.push((label.to_string(), bucket.name, bucket.start_years, add_asset - remove_asset, add_liability - remove_liability));
        }

        let month_count = add.map(|r| r.nii_monthly.len()).unwrap_or_else(|| remove.map(|r| r.nii_monthly.len()).unwrap_or(0));
        for month_index in 0..month_count {
            let add_row = add.and_then(|r| r.nii_monthly.get(month_index));
            let remove_row = remove.and_then(|r| r.nii_monthly.get(month_index));
            let month_label = add_row.or(remove_row).map(|r| r.month_label.clone()).unwrap_or_default();
            let income_delta = add_row.map(|r| r.interest_income).unwrap_or(0.0) - remove_row.map(|r| r.interest_income).unwrap_or(0.0);
            let expense_delta = add_row.map(|r| r.interest_expense).unwrap_or(0.0) - remove_row.map(|r| r.interest_expense).unwrap_or(0.0);
            nii_month_deltas.push((label.to_string(), month_index as u32 + 1, month_label, income_delta, expense_delta));
        }
    }

    let worst_eve_delta = scenario_eve_deltas.values().copied().fold(f64::INFINITY, f64::min);
    let worst_nii_delta = scenario_nii_deltas.values().copied().fold(f64::INFINITY, f64::min);

    Ok(WhatIfResult {
        base_eve_delta,
        worst_eve_delta: if worst_eve_delta.is_finite() { worst_eve_delta } else { 0.0 },
        base_nii_delta,
        worst_nii_delta: if worst_nii_delta.is_finite() { worst_nii_delta } else { 0.0 },
        scenario_eve_deltas,
        scenario_nii_deltas,
        eve_bucket_deltas,
        nii_month_deltas,
    })
}
