//! Canonical position, scheduled-flow and NMD-parameter types.
//!
//! Everything downstream of ingestion — the cashflow generator, behavioural
//! overlays, EVE/NII, What-If — works against these closed enums and typed
//! rows, never against raw CSV strings. Parsing happens once, at the
//! boundary (`loader`), matching the teacher's `policy::data` /
//! `policy::loader` split.

pub mod loader;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Asset or liability side of the balance sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "A")]
    Asset,
    #[serde(rename = "L")]
    Liability,
}

impl Side {
    pub fn parse(token: &str, contract_id: &str) -> EngineResult<Self> {
        match token.trim() {
            "A" => Ok(Side::Asset),
            "L" => Ok(Side::Liability),
            other => Err(EngineError::invalid_input(
                contract_id.to_string(),
                format!("side must be 'A' or 'L', got {other:?}"),
            )),
        }
    }

    /// `+1.0` for an asset, `-1.0` for a liability — the sign every
    /// principal/interest amount carries once it reaches a `Cashflow` row.
    pub fn sign(self) -> f64 {
        match self {
            Side::Asset => 1.0,
            Side::Liability => -1.0,
        }
    }
}

/// Fixed or floating rate regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateType {
    Fixed,
    Float,
}

impl RateType {
    pub fn parse(token: &str, contract_id: &str) -> EngineResult<Self> {
        match token.trim().to_lowercase().as_str() {
            "fixed" => Ok(RateType::Fixed),
            "float" | "floating" => Ok(RateType::Float),
            other => Err(EngineError::invalid_input(
                contract_id.to_string(),
                format!("rate_type must be 'fixed' or 'float', got {other:?}"),
            )),
        }
    }
}

/// Amortisation shape × rate-regime, plus the three non-amortising
/// categories. The closed set from spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceContractType {
    FixedBullet,
    FixedLinear,
    FixedAnnuity,
    FixedScheduled,
    VariableBullet,
    VariableLinear,
    VariableAnnuity,
    VariableScheduled,
    FixedNonMaturity,
    VariableNonMaturity,
    StaticPosition,
}

impl SourceContractType {
    pub fn parse(token: &str, contract_id: &str) -> EngineResult<Self> {
        use SourceContractType::*;
        match token.trim().to_lowercase().as_str() {
            "fixed_bullet" => Ok(FixedBullet),
            "fixed_linear" => Ok(FixedLinear),
            "fixed_annuity" => Ok(FixedAnnuity),
            "fixed_scheduled" => Ok(FixedScheduled),
            "variable_bullet" => Ok(VariableBullet),
            "variable_linear" => Ok(VariableLinear),
            "variable_annuity" => Ok(VariableAnnuity),
            "variable_scheduled" => Ok(VariableScheduled),
            "fixed_non_maturity" => Ok(FixedNonMaturity),
            "variable_non_maturity" => Ok(VariableNonMaturity),
            "static_position" => Ok(StaticPosition),
            other => Err(EngineError::invalid_input(
                contract_id.to_string(),
                format!("unrecognised source_contract_type: {other:?}"),
            )),
        }
    }

    pub fn is_scheduled(self) -> bool {
        matches!(self, SourceContractType::FixedScheduled | SourceContractType::VariableScheduled)
    }

    pub fn as_str(self) -> &'static str {
        use SourceContractType::*;
        match self {
            FixedBullet => "fixed_bullet",
            FixedLinear => "fixed_linear",
            FixedAnnuity => "fixed_annuity",
            FixedScheduled => "fixed_scheduled",
            VariableBullet => "variable_bullet",
            VariableLinear => "variable_linear",
            VariableAnnuity => "variable_annuity",
            VariableScheduled => "variable_scheduled",
            FixedNonMaturity => "fixed_non_maturity",
            VariableNonMaturity => "variable_non_maturity",
            StaticPosition => "static_position",
        }
    }
}

/// How a `variable_annuity` recomputes its level payment across resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AnnuityPaymentMode {
    /// Recompute the level payment at every reset over the remaining
    /// balance and remaining schedule. The legacy, and default, mode.
    #[default]
    RepriceOnReset,
    /// Compute the payment once at cycle start; each segment accrues at
    /// its own reset rate and principal absorbs the difference.
    FixedPayment,
}

impl AnnuityPaymentMode {
    pub fn parse(token: Option<&str>, contract_id: &str) -> EngineResult<Self> {
        match token.map(str::trim) {
            None | Some("") => Ok(AnnuityPaymentMode::RepriceOnReset),
            Some("reprice_on_reset") => Ok(AnnuityPaymentMode::RepriceOnReset),
            Some("fixed_payment") => Ok(AnnuityPaymentMode::FixedPayment),
            Some(other) => Err(EngineError::invalid_input(
                contract_id.to_string(),
                format!("unrecognised annuity_payment_mode: {other:?}"),
            )),
        }
    }
}

pub use crate::daycount::DaycountBase;

/// A single asset or liability position. Field presence mirrors spec.md §3
/// exactly: a struct with typed-optional fields rather than a dynamic row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    pub side: Side,
    pub start_date: NaiveDate,
    /// Absent only for NMD types (`fixed_non_maturity`/`variable_non_maturity`).
    pub maturity_date: Option<NaiveDate>,
    pub notional: f64,
    pub daycount_base: DaycountBase,
    pub source_contract_type: SourceContractType,
    pub rate_type: RateType,
    pub fixed_rate: Option<f64>,
    pub index_name: Option<String>,
    pub spread: Option<f64>,
    pub repricing_freq: Option<String>,
    pub next_reprice_date: Option<NaiveDate>,
    pub floor_rate: Option<f64>,
    pub cap_rate: Option<f64>,
    pub payment_freq: Option<String>,
    pub is_term_deposit: bool,
    pub annuity_payment_mode: AnnuityPaymentMode,
    pub nmd_params: Option<NmdParams>,
}

impl Contract {
    /// Validate the cross-field invariants of spec.md §3 that ingestion
    /// cannot check per-column: `maturity >= start`, floating rows name an
    /// index. Static positions and unparameterised NMDs are *not* rejected
    /// here — they are silently excluded later and counted, not errored.
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(maturity) = self.maturity_date {
            if maturity < self.start_date {
                return Err(EngineError::inconsistent_schedule(
                    self.contract_id.clone(),
                    format!("maturity_date {maturity} is before start_date {}", self.start_date),
                ));
            }
        } else if !matches!(
            self.source_contract_type,
            SourceContractType::FixedNonMaturity | SourceContractType::VariableNonMaturity
        ) {
            return Err(EngineError::inconsistent_schedule(
                self.contract_id.clone(),
                "maturity_date is required for non-NMD contract types".to_string(),
            ));
        }

        if self.rate_type == RateType::Float && self.index_name.as_deref().unwrap_or("").trim().is_empty() {
            return Err(EngineError::inconsistent_schedule(
                self.contract_id.clone(),
                "floating rows require an index_name".to_string(),
            ));
        }

        Ok(())
    }

    /// `true` for rows the orchestrator silently drops from both metrics.
    pub fn is_static(&self) -> bool {
        self.source_contract_type == SourceContractType::StaticPosition
    }

    /// `true` for a fixed NMD with no behavioural parameters: excluded per
    /// spec.md §3, counted via `ExclusionCounts::nmd_without_params`.
    pub fn is_unparameterised_nmd(&self) -> bool {
        self.source_contract_type == SourceContractType::FixedNonMaturity && self.nmd_params.is_none()
    }
}

/// `(contract_id, flow_date, principal_amount)`. `principal_amount` is an
/// unsigned magnitude — sign comes from the owning contract's `side`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFlow {
    pub flow_date: NaiveDate,
    pub principal_amount: f64,
}

/// Precompute once into `contract_id -> sorted[(date, amount)]`, shared
/// across every scenario of a calculation (design note in spec.md §9).
pub fn group_scheduled_flows(
    rows: impl IntoIterator<Item = (String, ScheduledFlow)>,
) -> BTreeMap<String, Vec<ScheduledFlow>> {
    let mut grouped: BTreeMap<String, Vec<ScheduledFlow>> = BTreeMap::new();
    for (contract_id, flow) in rows {
        grouped.entry(contract_id).or_default().push(flow);
    }
    for flows in grouped.values_mut() {
        flows.sort_by_key(|f| f.flow_date);
    }
    grouped
}

/// One row of the yield-curve long table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveLongRow {
    pub index_name: String,
    pub tenor_token: String,
    pub forward_rate: f64,
    pub tenor_date: NaiveDate,
    pub year_fraction: f64,
}

/// The 19-bucket EBA NMD distribution grid, in ascending order, per
/// spec.md §6 (`ON_1M, 1M_3M, ..., 20Y_PLUS`).
pub const EBA_NMD_BUCKETS: [&str; 19] = [
    "ON", "ON_1M", "1M_3M", "3M_6M", "6M_9M", "9M_1Y", "1Y_18M", "18M_2Y", "2Y_3Y", "3Y_4Y",
    "4Y_5Y", "5Y_6Y", "6Y_7Y", "7Y_8Y", "8Y_9Y", "9Y_10Y", "10Y_15Y", "15Y_20Y", "20Y_PLUS",
];

/// Midpoint, in years, of each EBA bucket — used to place the core-NMD
/// synthetic cashflow per spec.md §4.6. `20Y_PLUS` is the open-ended final
/// bucket; its representative point matches `core_average_maturity` when
/// supplied, else defaults to 25 years. Returns `InvalidInput` for a bucket
/// name outside the closed grid rather than panicking — a mis-keyed bucket
/// name is reachable from ordinary CSV input and must not crash the core.
pub fn eba_bucket_midpoint_years(bucket: &str, core_average_maturity: Option<f64>) -> EngineResult<f64> {
    let years = match bucket {
        "ON" => 1.0 / 365.0,
        "ON_1M" => 1.0 / 24.0,
        "1M_3M" => 2.0 / 12.0,
        "3M_6M" => 4.5 / 12.0,
        "6M_9M" => 7.5 / 12.0,
        "9M_1Y" => 10.5 / 12.0,
        "1Y_18M" => 1.25,
        "18M_2Y" => 1.75,
        "2Y_3Y" => 2.5,
        "3Y_4Y" => 3.5,
        "4Y_5Y" => 4.5,
        "5Y_6Y" => 5.5,
        "6Y_7Y" => 6.5,
        "7Y_8Y" => 7.5,
        "8Y_9Y" => 8.5,
        "9Y_10Y" => 9.5,
        "10Y_15Y" => 12.5,
        "15Y_20Y" => 17.5,
        "20Y_PLUS" => core_average_maturity.unwrap_or(25.0),
        other => {
            return Err(EngineError::invalid_input(None, format!("unknown EBA NMD bucket: {other}")));
        }
    };
    Ok(years)
}

/// `core_proportion`, `pass_through_rate` (β) and `core_average_maturity`
/// are percentages-as-0..100 in the wire format; `distribution` is a
/// bucket-name -> percentage map that must sum to `core_proportion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmdParams {
    pub core_proportion: f64,
    pub pass_through_rate: f64,
    pub core_average_maturity: f64,
    pub distribution: BTreeMap<String, f64>,
}

impl NmdParams {
    pub fn beta(&self) -> f64 {
        self.pass_through_rate / 100.0
    }

    /// Validate that the bucket distribution sums to `core_proportion`
    /// within a tolerance tight enough to catch a mis-keyed bucket but
    /// loose enough to tolerate rounding in hand-authored test fixtures.
    pub fn validate(&self, contract_id: &str) -> EngineResult<()> {
        let total: f64 = self.distribution.values().sum();
        if (total - self.core_proportion).abs() > 1e-6 {
            return Err(EngineError::invalid_input(
                contract_id.to_string(),
                format!(
                    "NMD distribution sums to {total} but core_proportion is {}",
                    self.core_proportion
                ),
            ));
        }
        Ok(())
    }
}

/// Side-channel counts for silently-excluded rows (spec.md §7): these are
/// not errors, but observability needs to know how many rows were dropped
/// and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    pub static_positions: usize,
    pub nmd_without_params: usize,
}

/// Split the raw position set into the contracts the engine actually
/// projects and the exclusion counts for the side channel. `variable_non_maturity`
/// rows are rewritten in place to a synthetic 30-year `variable_bullet`
/// per spec.md §3/§4.6 — the rewrite happens here so every downstream
/// consumer (cashflow generator, EVE, NII) only ever sees the rewritten
/// shape.
pub fn prepare_contracts(positions: Vec<Contract>) -> (Vec<Contract>, ExclusionCounts) {
    let mut counts = ExclusionCounts::default();
    let mut kept = Vec::with_capacity(positions.len());

    for mut contract in positions {
        if contract.is_static() {
            counts.static_positions += 1;
            continue;
        }
        if contract.is_unparameterised_nmd() {
            counts.nmd_without_params += 1;
            continue;
        }
        if contract.source_contract_type == SourceContractType::VariableNonMaturity {
            contract.source_contract_type = SourceContractType::VariableBullet;
            contract.maturity_date = Some(crate::daycount::add_frequency(
                contract.start_date,
                crate::daycount::Frequency { count: 30, unit: crate::daycount::FrequencyUnit::Years },
            ));
        }
        kept.push(contract);
    }

    (kept, counts)
}
