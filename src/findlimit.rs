//! Find-limit solver (§4.10): drives one product variable to a target
//! metric value — linear-scale for `notional` (closed-form, one
//! evaluation), bisection for `rate` / `maturity` / `spread`.

use crate::error::EngineResult;
use crate::whatif::LoanSpec;

/// The variable a find-limit call solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveVariable {
    Notional,
    Rate,
    Maturity,
    Spread,
}

/// Default `[lo, hi]` bounds for the bisection variables (§4.10). Not
/// used for `Notional`, which solves in closed form.
pub fn default_bounds(var: SolveVariable) -> (f64, f64) {
    match var {
        SolveVariable::Notional => (0.0, f64::INFINITY),
        SolveVariable::Rate => (0.0, 0.20),
        SolveVariable::Maturity => (0.25, 50.0),
        SolveVariable::Spread => (0.0, 1000.0),
    }
}

const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// The outcome of a find-limit call (§6). `converged = false` is a result
/// flag, not an error — callers are responsible for surfacing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FindLimitResult {
    pub found_value: f64,
    pub achieved_metric: f64,
    pub converged: bool,
    pub iterations: u32,
    pub tolerance: f64,
}

/// Linear-scale solve for `notional`: evaluate the metric once at
/// `notional_ref`, extrapolate linearly to the target, and report
/// converged after exactly one evaluation (§4.10). `compute_metric` takes
/// a notional and returns the resulting portfolio metric.
pub fn solve_for_notional(
    compute_metric: impl Fn(f64) -> EngineResult<f64>,
    notional_ref: f64,
    base_metric: f64,
    limit: f64,
) -> EngineResult<FindLimitResult> {
    const NON_CONVERGENCE_EPSILON: f64 = 1e-9;

    let f_ref = compute_metric(notional_ref)?;
    let delta_ref = f_ref - base_metric;

    if delta_ref.abs() < NON_CONVERGENCE_EPSILON {
        return Ok(FindLimitResult {
            found_value: notional_ref,
            achieved_metric: f_ref,
            converged: false,
            iterations: 1,
            tolerance: NON_CONVERGENCE_EPSILON,
        });
    }

    let notional_star = (notional_ref * (limit - base_metric) / delta_ref).max(0.0);
    let achieved_metric = compute_metric(notional_star)?;

    Ok(FindLimitResult {
        found_value: notional_star,
        achieved_metric,
        converged: true,
        iterations: 1,
        tolerance: NON_CONVERGENCE_EPSILON,
    })
}

/// Bisection solve for `rate` / `maturity` / `spread` over `[lo, hi]`
/// (§4.10). `compute_metric(value)` evaluates the portfolio metric with
/// the variable set to `value`. Stops when `|metric − limit| <
/// abs_tolerance` or `max_iterations` is exhausted, the latter reporting
/// `converged = false`. (The bracket-width variant of the stopping rule
/// is not applied here: `lo`/`hi` live in variable units — rate, years,
/// bps — while `abs_tolerance` is a metric-space quantity, so the two are
/// not comparable without a per-variable scale factor the caller would
/// have to supply anyway.)
pub fn solve_bisection(
    compute_metric: impl Fn(f64) -> EngineResult<f64>,
    lo: f64,
    hi: f64,
    limit: f64,
    max_iterations: Option<u32>,
    abs_tolerance: f64,
) -> EngineResult<FindLimitResult> {
    let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

    let mut a = lo;
    let mut b = hi;
    let fa = compute_metric(a)? - limit;
    let fb = compute_metric(b)? - limit;

    if fa.abs() < abs_tolerance {
        return Ok(FindLimitResult { found_value: a, achieved_metric: fa + limit, converged: true, iterations: 0, tolerance: abs_tolerance });
    }
    if fb.abs() < abs_tolerance {
        return Ok(FindLimitResult { found_value: b, achieved_metric: fb + limit, converged: true, iterations: 0, tolerance: abs_tolerance });
    }

    if fa.signum() == fb.signum() {
        // Not bracketed: report the closer endpoint, unconverged.
        let (found, achieved) = if fa.abs() <= fb.abs() { (a, fa + limit) } else { (b, fb + limit) };
        return Ok(FindLimitResult { found_value: found, achieved_metric: achieved, converged: false, iterations: 0, tolerance: abs_tolerance });
    }

    let mut fa = fa;
    let mut mid = a;
    let mut f_mid = fa;
    for iteration in 1..=max_iterations {
        mid = a + (b - a) / 2.0;
        f_mid = compute_metric(mid)? - limit;

        if f_mid.abs() < abs_tolerance {
            return Ok(FindLimitResult {
                found_value: mid,
                achieved_metric: f_mid + limit,
                converged: true,
                iterations: iteration,
                tolerance: abs_tolerance,
            });
        }

        if f_mid.signum() == fa.signum() {
            a = mid;
            fa = f_mid;
        } else {
            b = mid;
        }
    }

    Ok(FindLimitResult { found_value: mid, achieved_metric: f_mid + limit, converged: false, iterations: max_iterations, tolerance: abs_tolerance })
}

/// Return a new `LoanSpec` with one field set to `value`; the original is
/// unchanged (§8 invariant 9). Maturity values are clamped to ≥ 0.25 years.
pub fn mutate_spec(spec: &LoanSpec, var: SolveVariable, value: f64) -> LoanSpec {
    let mut next = spec.clone();
    match var {
        SolveVariable::Notional => next.notional = value,
        SolveVariable::Rate => next.fixed_rate = Some(value),
        SolveVariable::Maturity => next.term_years = value.max(0.25),
        SolveVariable::Spread => next.spread_bps = Some(value),
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6: a fixed-loan template giving EVE = 100 per 1,000 notional,
    /// base EVE 0, target 1,000,000 -> found_value ≈ 10,000,000 in one
    /// converged iteration.
    #[test]
    fn s6_linear_notional_solve() {
        let result = solve_for_notional(|n| Ok(n * 0.1), 1_000.0, 0.0, 1_000_000.0).unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert!((result.found_value - 10_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn notional_solve_reports_non_convergence_when_reference_is_insensitive() {
        let result = solve_for_notional(|_| Ok(5.0), 1_000.0, 5.0, 1_000_000.0).unwrap();
        assert!(!result.converged);
    }

    #[test]
    fn bisection_converges_on_a_monotone_linear_metric() {
        // metric(rate) = rate * 1_000_000; solve for rate hitting 50_000.
        let result = solve_bisection(|r| Ok(r * 1_000_000.0), 0.0, 0.20, 50_000.0, None, 1.0).unwrap();
        assert!(result.converged);
        assert!((result.found_value - 0.05).abs() < 1e-4);
    }

    #[test]
    fn bisection_reports_non_convergence_when_limit_is_not_bracketed() {
        let result = solve_bisection(|r| Ok(r * 1_000.0), 0.0, 0.20, 1_000_000.0, None, 1.0).unwrap();
        assert!(!result.converged);
        assert_eq!(result.found_value, 0.20);
    }

    #[test]
    fn mutate_spec_changes_only_the_targeted_field_and_leaves_original_untouched() {
        let spec = LoanSpec {
            notional: 100_000.0,
            term_years: 5.0,
            side: crate::contracts::Side::Asset,
            currency: "EUR".to_string(),
            rate_type: crate::whatif::LoanRateType::Fixed,
            fixed_rate: Some(0.04),
            variable_index: None,
            spread_bps: None,
            mixed_fixed_years: None,
            amortization: crate::whatif::LoanAmortization::Bullet,
            grace_years: 0.0,
            daycount: crate::contracts::DaycountBase::Act360,
            payment_freq: Some("1Y".to_string()),
            repricing_freq: None,
            start_date: None,
            floor_rate: None,
            cap_rate: None,
        };
        let mutated = mutate_spec(&spec, SolveVariable::Maturity, 0.1);
        assert_eq!(mutated.term_years, 0.25); // clamped
        assert_eq!(spec.term_years, 5.0); // original untouched
        assert_eq!(mutated.notional, spec.notional);
    }

    fn base_spec() -> LoanSpec {
        LoanSpec {
            notional: 100_000.0,
            term_years: 5.0,
            side: crate::contracts::Side::Asset,
            currency: "EUR".to_string(),
            rate_type: crate::whatif::LoanRateType::Fixed,
            fixed_rate: Some(0.04),
            variable_index: None,
            spread_bps: None,
            mixed_fixed_years: None,
            amortization: crate::whatif::LoanAmortization::Bullet,
            grace_years: 0.0,
            daycount: crate::contracts::DaycountBase::Act360,
            payment_freq: Some("1Y".to_string()),
            repricing_freq: None,
            start_date: None,
            floor_rate: None,
            cap_rate: None,
        }
    }

    proptest::proptest! {
        /// Invariant 9: `mutate_spec` changes exactly the targeted field and
        /// leaves every other field, and the original spec itself, untouched.
        #[test]
        fn prop_mutate_spec_is_pure(
            variable_idx in 0u8..4,
            value in -100.0f64..1100.0,
        ) {
            let spec = base_spec();
            let var = match variable_idx {
                0 => SolveVariable::Notional,
                1 => SolveVariable::Rate,
                2 => SolveVariable::Maturity,
                _ => SolveVariable::Spread,
            };
            let mutated = mutate_spec(&spec, var, value);

            proptest::prop_assert_eq!(&spec, &base_spec(), "original spec must be unchanged");

            let mut expected = spec.clone();
            match var {
                SolveVariable::Notional => expected.notional = value,
                SolveVariable::Rate => expected.fixed_rate = Some(value),
                SolveVariable::Maturity => expected.term_years = value.max(0.25),
                SolveVariable::Spread => expected.spread_bps = Some(value),
            }
            proptest::prop_assert_eq!(mutated, expected, "exactly one field should differ from the original");
        }
    }
}
