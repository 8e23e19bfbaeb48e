//! The What-If decomposer (§4.9): turns a user-facing `LoanSpec` into one
//! or more motor-native `Contract` rows whose *summed* cashflows replicate
//! the described loan's economics — grace periods, mixed fixed/variable
//! legs, and the synthetic offset rows that cancel an intermediate
//! principal emission the motor would otherwise double-count.

use chrono::NaiveDate;

use crate::contracts::{AnnuityPaymentMode, Contract, DaycountBase, RateType, Side, SourceContractType};
use crate::error::{EngineError, EngineResult};

/// The three amortisation shapes a `LoanSpec` can request. Scheduled
/// shapes have no user-facing equivalent — What-If loans are always
/// contractually regular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanAmortization {
    Bullet,
    Linear,
    Annuity,
}

/// The rate regime a `LoanSpec` describes. `Mixed` switches from fixed to
/// variable at `mixed_fixed_years`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanRateType {
    Fixed,
    Variable,
    Mixed,
}

/// A high-level, user-facing loan description (§4.9). One `LoanSpec` may
/// decompose into up to five `Contract` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanSpec {
    pub notional: f64,
    pub term_years: f64,
    pub side: Side,
    pub currency: String,
    pub rate_type: LoanRateType,
    pub fixed_rate: Option<f64>,
    pub variable_index: Option<String>,
    pub spread_bps: Option<f64>,
    pub mixed_fixed_years: Option<f64>,
    pub amortization: LoanAmortization,
    pub grace_years: f64,
    pub daycount: DaycountBase,
    pub payment_freq: Option<String>,
    pub repricing_freq: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub floor_rate: Option<f64>,
    pub cap_rate: Option<f64>,
}

impl LoanSpec {
    /// `mixed` requires `mixed_fixed_years`; any variable leg requires
    /// `variable_index`. Grace combined with a bullet amortisation is not
    /// an error — it is silently ignored (one row, per §4.9).
    fn validate(&self) -> EngineResult<()> {
        if self.rate_type == LoanRateType::Mixed && self.mixed_fixed_years.is_none() {
            return Err(EngineError::DecompositionError("mixed rate_type requires mixed_fixed_years".to_string()));
        }
        if matches!(self.rate_type, LoanRateType::Variable | LoanRateType::Mixed) && self.variable_index.is_none() {
            return Err(EngineError::DecompositionError("variable/mixed rate_type requires variable_index".to_string()));
        }
        Ok(())
    }

    fn start(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(|| NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid fallback date"))
    }
}

fn opposite(side: Side) -> Side {
    match side {
        Side::Asset => Side::Liability,
        Side::Liability => Side::Asset,
    }
}

/// `round(years * 365.25)` calendar days forward — the same date
/// arithmetic the margin/behavioural modules use for year-denominated
/// offsets (§4.9 binds this explicitly for grace/switch dates).
fn date_plus_years(start: NaiveDate, years: f64) -> NaiveDate {
    start + chrono::Duration::days((years * 365.25).round() as i64)
}

fn amortization_source_type(amortization: LoanAmortization, rate_type: RateType) -> SourceContractType {
    use LoanAmortization::*;
    use RateType::*;
    match (amortization, rate_type) {
        (Bullet, Fixed) => SourceContractType::FixedBullet,
        (Bullet, Float) => SourceContractType::VariableBullet,
        (Linear, Fixed) => SourceContractType::FixedLinear,
        (Linear, Float) => SourceContractType::VariableLinear,
        (Annuity, Fixed) => SourceContractType::FixedAnnuity,
        (Annuity, Float) => SourceContractType::VariableAnnuity,
    }
}

/// Remaining balance of a linear/annuity amortisation at time `t`, given
/// it started amortising at `amort_start` over `[amort_start, maturity]`
/// on `notional`. §4.9 gives this formula explicitly for `linear`; this
/// crate applies the same date-proportional formula to `annuity` legs too
/// (the spec text is silent there, and date-proportional balance is a
/// reasonable stand-in absent a rate-specific level-payment schedule at
/// decomposition time — see DESIGN.md).
fn balance_at(notional: f64, amort_start: NaiveDate, maturity: NaiveDate, t: NaiveDate) -> f64 {
    let total_days = (maturity - amort_start).num_days().max(1) as f64;
    let remaining_days = (maturity - t).num_days().max(0) as f64;
    notional * (remaining_days / total_days)
}

struct RowBuilder<'a> {
    spec: &'a LoanSpec,
    id_prefix: String,
}

impl<'a> RowBuilder<'a> {
    fn contract(
        &self,
        suffix: &str,
        side: Side,
        start: NaiveDate,
        maturity: NaiveDate,
        notional: f64,
        rate_type: RateType,
        fixed_rate: Option<f64>,
        index_name: Option<String>,
        spread: Option<f64>,
        amortization: LoanAmortization,
        repricing_freq: Option<String>,
        next_reprice_date: Option<NaiveDate>,
    ) -> Contract {
        Contract {
            contract_id: format!("{}_{}", self.id_prefix, suffix),
            side,
            start_date: start,
            maturity_date: Some(maturity),
            notional,
            daycount_base: self.spec.daycount,
            source_contract_type: amortization_source_type(amortization, rate_type),
            rate_type,
            fixed_rate,
            index_name,
            spread,
            repricing_freq,
            next_reprice_date,
            floor_rate: self.spec.floor_rate,
            cap_rate: self.spec.cap_rate,
            payment_freq: self.spec.payment_freq.clone(),
            is_term_deposit: false,
            annuity_payment_mode: AnnuityPaymentMode::RepriceOnReset,
            nmd_params: None,
        }
    }
}

/// Decompose a `LoanSpec` into the `Contract` rows whose combined
/// cashflows replicate the described loan (§4.9).
pub fn decompose(spec: &LoanSpec, id_prefix: &str) -> EngineResult<Vec<Contract>> {
    spec.validate()?;

    let builder = RowBuilder { spec, id_prefix: id_prefix.to_string() };
    let start = spec.start();
    let maturity = date_plus_years(start, spec.term_years);
    let spread = spec.spread_bps.map(|bps| bps / 10_000.0);
    let variable_index = spec.variable_index.clone();
    let repricing_freq = spec.repricing_freq.clone();

    // Pure fixed or pure variable.
    if matches!(spec.rate_type, LoanRateType::Fixed | LoanRateType::Variable) {
        let rate_type = if spec.rate_type == LoanRateType::Fixed { RateType::Fixed } else { RateType::Float };

        if spec.amortization == LoanAmortization::Bullet || spec.grace_years <= 0.0 {
            // Grace + bullet is silently ignored: one row over the full term.
            return Ok(vec![builder.contract(
                "fixed",
                spec.side,
                start,
                maturity,
                spec.notional,
                rate_type,
                spec.fixed_rate,
                variable_index.clone(),
                spread,
                spec.amortization,
                repricing_freq.clone(),
                if rate_type == RateType::Float { Some(start) } else { None },
            )]);
        }

        // Linear/annuity with grace > 0: grace leg + amort leg + offset.
        let grace_end = date_plus_years(start, spec.grace_years);
        let grace_leg = builder.contract(
            "grace",
            spec.side,
            start,
            grace_end,
            spec.notional,
            RateType::Fixed,
            spec.fixed_rate.or(Some(0.0)),
            None,
            None,
            LoanAmortization::Bullet,
            None,
            None,
        );
        let amort_leg = builder.contract(
            "amort",
            spec.side,
            grace_end,
            maturity,
            spec.notional,
            rate_type,
            spec.fixed_rate,
            variable_index.clone(),
            spread,
            spec.amortization,
            repricing_freq.clone(),
            if rate_type == RateType::Float { Some(grace_end) } else { None },
        );
        let offset = builder.contract(
            "offset",
            opposite(spec.side),
            grace_end,
            grace_end + chrono::Duration::days(1),
            spec.notional,
            RateType::Fixed,
            Some(0.0),
            None,
            None,
            LoanAmortization::Bullet,
            None,
            None,
        );
        return Ok(vec![grace_leg, amort_leg, offset]);
    }

    // Mixed.
    let mixed_fixed_years = spec.mixed_fixed_years.expect("validated above");
    let switch = date_plus_years(start, mixed_fixed_years);

    if spec.amortization == LoanAmortization::Bullet {
        let fixed_leg = builder.contract(
            "fixed",
            spec.side,
            start,
            switch,
            spec.notional,
            RateType::Fixed,
            spec.fixed_rate,
            None,
            None,
            LoanAmortization::Bullet,
            None,
            None,
        );
        let var_leg = builder.contract(
            "var",
            spec.side,
            switch,
            maturity,
            spec.notional,
            RateType::Float,
            None,
            variable_index.clone(),
            spread,
            LoanAmortization::Bullet,
            repricing_freq.clone(),
            Some(switch),
        );
        let cancel = builder.contract(
            "cancel",
            opposite(spec.side),
            switch,
            switch + chrono::Duration::days(1),
            spec.notional,
            RateType::Fixed,
            Some(0.0),
            None,
            None,
            LoanAmortization::Bullet,
            None,
            None,
        );
        return Ok(vec![fixed_leg, var_leg, cancel]);
    }

    // Mixed linear/annuity.
    let amort_start = if spec.grace_years > 0.0 { date_plus_years(start, spec.grace_years) } else { start };
    let balance_at_switch = balance_at(spec.notional, amort_start, maturity, switch);

    let fixed_full = builder.contract(
        "fixed",
        spec.side,
        amort_start,
        maturity,
        spec.notional,
        RateType::Fixed,
        spec.fixed_rate,
        None,
        None,
        spec.amortization,
        None,
        None,
    );
    let cancel_fixed_tail = builder.contract(
        "cancel",
        opposite(spec.side),
        switch,
        maturity,
        balance_at_switch,
        RateType::Fixed,
        spec.fixed_rate,
        None,
        None,
        spec.amortization,
        None,
        None,
    );
    let var_tail = builder.contract(
        "var",
        spec.side,
        switch,
        maturity,
        balance_at_switch,
        RateType::Float,
        None,
        variable_index.clone(),
        spread,
        spec.amortization,
        repricing_freq.clone(),
        Some(switch),
    );

    if spec.grace_years <= 0.0 {
        return Ok(vec![fixed_full, cancel_fixed_tail, var_tail]);
    }

    let grace_leg = builder.contract(
        "grace",
        spec.side,
        start,
        amort_start,
        spec.notional,
        RateType::Fixed,
        spec.fixed_rate.or(Some(0.0)),
        None,
        None,
        LoanAmortization::Bullet,
        None,
        None,
    );
    let grace_offset = builder.contract(
        "goffset",
        opposite(spec.side),
        amort_start,
        amort_start + chrono::Duration::days(1),
        spec.notional,
        RateType::Fixed,
        Some(0.0),
        None,
        None,
        LoanAmortization::Bullet,
        None,
        None,
    );
    Ok(vec![grace_leg, fixed_full, cancel_fixed_tail, var_tail, grace_offset])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> LoanSpec {
        LoanSpec {
            notional: 100_000.0,
            term_years: 5.0,
            side: Side::Asset,
            currency: "EUR".to_string(),
            rate_type: LoanRateType::Fixed,
            fixed_rate: Some(0.04),
            variable_index: None,
            spread_bps: None,
            mixed_fixed_years: None,
            amortization: LoanAmortization::Bullet,
            grace_years: 0.0,
            daycount: DaycountBase::Act360,
            payment_freq: Some("1Y".to_string()),
            repricing_freq: None,
            start_date: Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            floor_rate: None,
            cap_rate: None,
        }
    }

    #[test]
    fn pure_fixed_bullet_is_one_row() {
        let rows = decompose(&base_spec(), "wi").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_contract_type, SourceContractType::FixedBullet);
        assert_eq!(rows[0].notional, 100_000.0);
    }

    #[test]
    fn grace_with_bullet_is_silently_ignored() {
        let mut spec = base_spec();
        spec.grace_years = 2.0;
        let rows = decompose(&spec, "wi").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn fixed_linear_with_grace_produces_three_rows_with_cancelling_offset() {
        let mut spec = base_spec();
        spec.amortization = LoanAmortization::Linear;
        spec.grace_years = 1.0;
        let rows = decompose(&spec, "wi").unwrap();
        assert_eq!(rows.len(), 3);
        let offset = rows.iter().find(|r| r.contract_id.ends_with("_offset")).unwrap();
        assert_eq!(offset.side, opposite(spec.side));
        assert_eq!(offset.fixed_rate, Some(0.0));
    }

    #[test]
    fn mixed_bullet_produces_three_rows_and_requires_mixed_fixed_years() {
        let mut spec = base_spec();
        spec.rate_type = LoanRateType::Mixed;
        spec.variable_index = Some("EUR_EURIBOR_3M".to_string());
        spec.mixed_fixed_years = None;
        assert!(matches!(decompose(&spec, "wi").unwrap_err(), EngineError::DecompositionError(_)));

        spec.mixed_fixed_years = Some(2.0);
        let rows = decompose(&spec, "wi").unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn variable_without_index_is_decomposition_error() {
        let mut spec = base_spec();
        spec.rate_type = LoanRateType::Variable;
        spec.variable_index = None;
        assert!(matches!(decompose(&spec, "wi").unwrap_err(), EngineError::DecompositionError(_)));
    }

    #[test]
    fn mixed_annuity_with_grace_produces_five_rows() {
        let mut spec = base_spec();
        spec.rate_type = LoanRateType::Mixed;
        spec.amortization = LoanAmortization::Annuity;
        spec.variable_index = Some("EUR_EURIBOR_3M".to_string());
        spec.mixed_fixed_years = Some(2.0);
        spec.grace_years = 1.0;
        let rows = decompose(&spec, "wi").unwrap();
        assert_eq!(rows.len(), 5);
    }
}
