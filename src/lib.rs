//! IRRBB engine — EVE and NII projection over regulatory yield-curve
//! shocks (Delegated Regulation (EU) 2024/856).
//!
//! This library provides:
//! - Position and yield-curve ingestion from CSV
//! - The cashflow generator (fixed/variable bullet, linear, annuity,
//!   scheduled and non-maturity deposit shapes)
//! - Behavioural overlays (prepayment/early-redemption decay, NMD core/
//!   non-core decomposition, beta pass-through)
//! - EVE (present-value) and 12-month NII (accrual) metrics, base and
//!   under the full regulatory shock scenario set
//! - The What-If decomposer and find-limit solver for ad hoc loan
//!   simulation
//! - Multi-scenario orchestration over a `rayon` thread pool

pub mod behavioural;
pub mod bucket;
pub mod cashflow;
pub mod contracts;
pub mod curve;
pub mod daycount;
pub mod error;
pub mod eve;
pub mod findlimit;
pub mod margin;
pub mod nii;
pub mod orchestrator;
pub mod shocks;
pub mod whatif;

pub use contracts::{
    group_scheduled_flows, prepare_contracts, AnnuityPaymentMode, Contract, CurveLongRow,
    DaycountBase, ExclusionCounts, NmdParams, RateType, ScheduledFlow, Side, SourceContractType,
};
pub use curve::{CurvePoint, ForwardCurve, ForwardCurveSet};
pub use error::{EngineError, EngineResult};
pub use eve::{evaluate_eve, EveBucketRow, EveResult, SideGroup};
pub use findlimit::{default_bounds, mutate_spec, solve_bisection, solve_for_notional, FindLimitResult, SolveVariable};
pub use margin::MarginSet;
pub use nii::{generate_with_rollover, monthly_breakdown, nii_scalar, MonthlyNiiRow};
pub use orchestrator::{run, what_if, CalculationResult, OrchestratorInputs, ScenarioResult, WhatIfResult};
pub use shocks::{
    apply_regulatory_shock_rate, maturity_post_shock_floor, shock_parameters_for_currency,
    shocked_curve_set, PostShockFloorParameters, RegulatoryShockParameters, ScenarioId,
};
pub use whatif::{decompose, LoanAmortization, LoanRateType, LoanSpec};
