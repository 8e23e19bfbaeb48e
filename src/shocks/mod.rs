//! Regulatory yield-curve shock engine (Delegated Regulation (EU) 2024/856,
//! Annex Part A and Art. 2/3(7)).
//!
//! Six official scenarios (`parallel-up/down`, `short-up/down`, `steepener`,
//! `flattener`) plus two internal-only scenarios (`long-up/down`) each
//! define a `t_years -> rate delta` curve derived from a currency's
//! `(parallel, short, long)` shock parameters. Shocking a `ForwardCurveSet`
//! shifts the risk-free index by that delta and applies the post-shock
//! floor; basis indices are shifted by the same delta but never floored, so
//! basis spreads are preserved.

use std::collections::BTreeMap;

use crate::curve::{CurvePoint, ForwardCurve, ForwardCurveSet};
use crate::error::{EngineError, EngineResult};

/// The closed set of regulatory scenario identifiers this engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScenarioId {
    ParallelUp,
    ParallelDown,
    ShortUp,
    ShortDown,
    Steepener,
    Flattener,
    /// Internal-only extension, not part of the official Annex Part A set.
    LongUp,
    /// Internal-only extension, not part of the official Annex Part A set.
    LongDown,
}

impl ScenarioId {
    pub const EVE_REGULATORY: [ScenarioId; 6] = [
        ScenarioId::ParallelUp,
        ScenarioId::ParallelDown,
        ScenarioId::ShortUp,
        ScenarioId::ShortDown,
        ScenarioId::Steepener,
        ScenarioId::Flattener,
    ];

    pub const NII_REGULATORY: [ScenarioId; 2] = [ScenarioId::ParallelUp, ScenarioId::ParallelDown];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioId::ParallelUp => "parallel-up",
            ScenarioId::ParallelDown => "parallel-down",
            ScenarioId::ShortUp => "short-up",
            ScenarioId::ShortDown => "short-down",
            ScenarioId::Steepener => "steepener",
            ScenarioId::Flattener => "flattener",
            ScenarioId::LongUp => "long-up",
            ScenarioId::LongDown => "long-down",
        }
    }

    pub fn parse(token: &str) -> EngineResult<Self> {
        match token.trim().to_lowercase().as_str() {
            "parallel-up" => Ok(ScenarioId::ParallelUp),
            "parallel-down" => Ok(ScenarioId::ParallelDown),
            "short-up" => Ok(ScenarioId::ShortUp),
            "short-down" => Ok(ScenarioId::ShortDown),
            "steepener" => Ok(ScenarioId::Steepener),
            "flattener" => Ok(ScenarioId::Flattener),
            "long-up" => Ok(ScenarioId::LongUp),
            "long-down" => Ok(ScenarioId::LongDown),
            other => Err(EngineError::UnsupportedScenario(other.to_string())),
        }
    }
}

/// A currency's shock parameters, already converted from bps to decimal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulatoryShockParameters {
    pub parallel: f64,
    pub short: f64,
    pub long: f64,
}

/// Post-shock floor coefficients from Art. 3(7): `floor(t) = min(max_floor,
/// immediate_floor + annual_step * t)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostShockFloorParameters {
    pub immediate_floor: f64,
    pub annual_step: f64,
    pub max_floor: f64,
}

impl Default for PostShockFloorParameters {
    fn default() -> Self {
        PostShockFloorParameters { immediate_floor: -0.015, annual_step: 0.0003, max_floor: 0.0 }
    }
}

struct CurrencyShockBps {
    currency: &'static str,
    parallel: i32,
    short: i32,
    long: i32,
}

/// Annex Part A of Delegated Regulation (EU) 2024/856, in basis points.
const ANNEX_PART_A_SHOCKS_BPS: [CurrencyShockBps; 27] = [
    CurrencyShockBps { currency: "ARS", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "AUD", parallel: 300, short: 450, long: 200 },
    CurrencyShockBps { currency: "BGN", parallel: 250, short: 350, long: 150 },
    CurrencyShockBps { currency: "BRL", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "CAD", parallel: 200, short: 300, long: 150 },
    CurrencyShockBps { currency: "CHF", parallel: 100, short: 150, long: 100 },
    CurrencyShockBps { currency: "CNY", parallel: 250, short: 300, long: 150 },
    CurrencyShockBps { currency: "CZK", parallel: 200, short: 250, long: 100 },
    CurrencyShockBps { currency: "DKK", parallel: 200, short: 250, long: 150 },
    CurrencyShockBps { currency: "EUR", parallel: 200, short: 250, long: 100 },
    CurrencyShockBps { currency: "GBP", parallel: 250, short: 300, long: 150 },
    CurrencyShockBps { currency: "HKD", parallel: 200, short: 250, long: 100 },
    CurrencyShockBps { currency: "HUF", parallel: 300, short: 450, long: 200 },
    CurrencyShockBps { currency: "IDR", parallel: 400, short: 500, long: 350 },
    CurrencyShockBps { currency: "INR", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "JPY", parallel: 100, short: 100, long: 100 },
    CurrencyShockBps { currency: "KRW", parallel: 300, short: 400, long: 200 },
    CurrencyShockBps { currency: "MXN", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "PLN", parallel: 250, short: 350, long: 150 },
    CurrencyShockBps { currency: "RON", parallel: 350, short: 500, long: 250 },
    CurrencyShockBps { currency: "RUB", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "SAR", parallel: 200, short: 300, long: 150 },
    CurrencyShockBps { currency: "SEK", parallel: 200, short: 300, long: 150 },
    CurrencyShockBps { currency: "SGD", parallel: 150, short: 200, long: 100 },
    CurrencyShockBps { currency: "TRY", parallel: 400, short: 500, long: 300 },
    CurrencyShockBps { currency: "USD", parallel: 200, short: 300, long: 150 },
    CurrencyShockBps { currency: "ZAR", parallel: 400, short: 500, long: 300 },
];

/// Look up and decimal-convert a currency's Annex Part A shock parameters.
pub fn shock_parameters_for_currency(currency: &str) -> EngineResult<RegulatoryShockParameters> {
    let code = currency.trim().to_uppercase();
    ANNEX_PART_A_SHOCKS_BPS
        .iter()
        .find(|row| row.currency == code)
        .map(|row| RegulatoryShockParameters {
            parallel: row.parallel as f64 / 10_000.0,
            short: row.short as f64 / 10_000.0,
            long: row.long as f64 / 10_000.0,
        })
        .ok_or_else(|| EngineError::MissingCurrencyShock(code))
}

/// `floor(t) = min(max_floor, immediate_floor + annual_step * t)`.
pub fn maturity_post_shock_floor(t_years: f64, floor_parameters: PostShockFloorParameters) -> f64 {
    let t = t_years.max(0.0);
    let floor_value = floor_parameters.immediate_floor + floor_parameters.annual_step * t;
    floor_value.min(floor_parameters.max_floor)
}

fn scenario_delta(t_years: f64, scenario: ScenarioId, shock: RegulatoryShockParameters) -> f64 {
    let t = t_years.max(0.0);
    let delta_short = shock.short * (-t / 4.0).exp();
    let delta_long = shock.long * (1.0 - (-t / 4.0).exp());

    match scenario {
        ScenarioId::ParallelUp => shock.parallel,
        ScenarioId::ParallelDown => -shock.parallel,
        ScenarioId::ShortUp => delta_short,
        ScenarioId::ShortDown => -delta_short,
        ScenarioId::LongUp => delta_long,
        ScenarioId::LongDown => -delta_long,
        ScenarioId::Steepener => (-0.65 * delta_short.abs()) + (0.9 * delta_long.abs()),
        ScenarioId::Flattener => (0.8 * delta_short.abs()) - (0.6 * delta_long.abs()),
    }
}

/// Apply the Art. 2 scenario delta to `base_rate` observed at `t_years`,
/// then (unless `apply_post_shock_floor` is false) apply the Art. 3(7)
/// post-shock floor with the observed-lower-rate carve-out: the effective
/// floor at this tenor is never above the currently observed base rate, so
/// a rate already below the nominal floor is never raised by flooring.
pub fn apply_regulatory_shock_rate(
    base_rate: f64,
    t_years: f64,
    scenario: ScenarioId,
    shock: RegulatoryShockParameters,
    apply_post_shock_floor: bool,
    floor_parameters: PostShockFloorParameters,
) -> f64 {
    let shocked = base_rate + scenario_delta(t_years, scenario, shock);
    if !apply_post_shock_floor {
        return shocked;
    }
    let floor_curve_value = maturity_post_shock_floor(t_years, floor_parameters);
    let effective_floor = floor_curve_value.min(base_rate);
    shocked.max(effective_floor)
}

/// Build the shocked `ForwardCurveSet` for `scenario`: `risk_free_index` is
/// shifted by the scenario delta (computed at each of its own sample
/// tenors) and floored; every other index is shifted by the same
/// tenor-wise delta but left unfloored, preserving its basis spread over
/// the risk-free curve.
pub fn shocked_curve_set(
    base_set: &ForwardCurveSet,
    scenario: ScenarioId,
    risk_free_index: &str,
    shock: RegulatoryShockParameters,
    floor_parameters: PostShockFloorParameters,
) -> EngineResult<ForwardCurveSet> {
    base_set.get(risk_free_index)?;

    let mut curves = BTreeMap::new();
    for index_name in base_set.available_indices() {
        let curve = base_set.get(index_name)?;
        let apply_floor = index_name == risk_free_index;
        let shifted_points: Vec<CurvePoint> = curve
            .points()
            .into_iter()
            .map(|p| CurvePoint {
                t_years: p.t_years,
                rate: apply_regulatory_shock_rate(p.rate, p.t_years, scenario, shock, apply_floor, floor_parameters),
            })
            .collect();
        curves.insert(index_name.to_string(), ForwardCurve::from_points(shifted_points));
    }

    Ok(ForwardCurveSet::new(base_set.analysis_date, base_set.daycount_base, curves))
}
