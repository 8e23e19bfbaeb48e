//! Developer-facing CLI (§2): loads a CSV portfolio and curve file, runs
//! the orchestrator across the full regulatory scenario catalog, and
//! prints a summary table. Not the HTTP façade — that surface is out of
//! scope for this crate.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use log::{info, warn};

use irrbb_engine::{
    group_scheduled_flows, prepare_contracts,
    contracts::loader::{curve_set_from_long_table, load_positions_csv, load_scheduled_flows_csv, load_yield_curve_long_csv},
    orchestrator::{run, OrchestratorInputs},
    cashflow::BehaviouralRates,
    DaycountBase, MarginSet, ScenarioId,
};

#[derive(Debug, Parser)]
#[command(name = "run_portfolio", about = "Run IRRBB EVE/NII across the regulatory scenario catalog")]
struct Cli {
    /// Positions CSV (see contracts::loader for the schema).
    #[arg(long)]
    positions: String,

    /// Scheduled principal flows CSV for fixed_scheduled/variable_scheduled rows.
    #[arg(long)]
    scheduled_flows: Option<String>,

    /// Yield-curve long table CSV.
    #[arg(long)]
    curves: String,

    /// Analysis date, ISO 8601 (YYYY-MM-DD).
    #[arg(long)]
    analysis_date: NaiveDate,

    /// Risk-free index name used for discounting and renewal pricing.
    #[arg(long, default_value = "EUR_RFR")]
    risk_free_index: String,

    /// Currency, for the Annex Part A shock table lookup.
    #[arg(long, default_value = "EUR")]
    currency: String,

    /// NII projection horizon, in months.
    #[arg(long, default_value_t = 12)]
    horizon_months: u32,

    /// Roll maturing contracts forward at the NII horizon at the
    /// prevailing rate, keeping the projected balance sheet constant.
    #[arg(long)]
    balance_constant: bool,

    /// Annual constant prepayment rate applied to asset balances.
    #[arg(long, default_value_t = 0.0)]
    cpr_annual: f64,

    /// Annual term-deposit redemption rate applied to `is_term_deposit` liabilities.
    #[arg(long, default_value_t = 0.0)]
    tdrr_annual: f64,

    /// Daycount basis for the curve's time axis.
    #[arg(long, default_value = "ACT/365")]
    curve_daycount: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run_cli(&cli)
}

fn run_cli(cli: &Cli) -> Result<()> {
    let raw_positions = load_positions_csv(&cli.positions)?;
    let (positions, exclusions) = prepare_contracts(raw_positions);
    info!(
        "loaded {} contracts ({} static positions and {} unparameterised NMDs excluded)",
        positions.len(),
        exclusions.static_positions,
        exclusions.nmd_without_params
    );

    let scheduled_flows = match &cli.scheduled_flows {
        Some(path) => group_scheduled_flows(load_scheduled_flows_csv(path)?),
        None => Default::default(),
    };

    let curve_daycount = DaycountBase::parse(&cli.curve_daycount, None)?;
    let curve_rows = load_yield_curve_long_csv(&cli.curves)?;
    let base_curve_set = curve_set_from_long_table(&curve_rows, cli.analysis_date, curve_daycount);
    base_curve_set.get(&cli.risk_free_index)?;

    let margin_set = MarginSet::calibrate(&positions, &base_curve_set, &cli.risk_free_index, cli.analysis_date, irrbb_engine::margin::DEFAULT_LOOKBACK_MONTHS)?;

    let scenario_ids: Vec<ScenarioId> = ScenarioId::EVE_REGULATORY.to_vec();

    let inputs = OrchestratorInputs {
        positions,
        scheduled_flows,
        base_curve_set,
        margin_set,
        scenario_ids,
        analysis_date: cli.analysis_date,
        discount_index: cli.risk_free_index.clone(),
        risk_free_index: cli.risk_free_index.clone(),
        currency: cli.currency.clone(),
        horizon_months: cli.horizon_months,
        balance_constant: cli.balance_constant,
        behavioural_rates: BehaviouralRates { cpr_annual: cli.cpr_annual, tdrr_annual: cli.tdrr_annual },
        bucket_grid: &irrbb_engine::bucket::EVE_REGULATORY_BUCKETS,
    };

    let result = run(&inputs)?;

    println!("IRRBB summary — analysis date {}", cli.analysis_date);
    println!("{:<16} {:>18} {:>18}", "scenario", "EVE", "delta EVE vs base");
    println!("{:<16} {:>18.2} {:>18.2}", "base", result.base.eve_scalar, 0.0);
    for (id, scenario_result) in &result.scenarios {
        println!("{:<16} {:>18.2} {:>18.2}", id, scenario_result.eve_scalar, scenario_result.eve_scalar - result.base.eve_scalar);
    }
    if let Some(worst) = &result.worst_scenario_id {
        println!("\nworst scenario: {worst} (delta EVE {:.2})", result.worst_delta_eve);
    } else {
        warn!("no scenarios were run; worst_scenario_id is unset");
    }
    println!("\nNII_12m (base): {:.2}", result.base.nii_scalar);

    Ok(())
}
