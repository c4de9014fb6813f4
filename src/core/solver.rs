use super::engine::inflate;
use super::policy::{MAX_DRAWDOWN_RATE, POST_PRESERVATION_YEARS};
use super::types::Provision;

/// Capital needed at retirement to fund `future_annual_income` while
/// preserving capital for `preservation_years`.
///
/// The result is the larger of two floors: the capital whose return (or
/// maximum drawdown, whichever is lower) pays the income outright, and the
/// present value of a fixed-term annuity paying the inflated income once
/// the preservation period ends. Returns `f64::INFINITY` when
/// `assumed_return <= 0`, since no finite capital is preserved at zero
/// growth.
pub fn solve_capital(
    future_annual_income: f64,
    assumed_return: f64,
    preservation_years: u32,
    inflation_rate: f64,
    annual_increase: f64,
) -> f64 {
    if assumed_return <= 0.0 {
        return f64::INFINITY;
    }

    let baseline = future_annual_income / assumed_return.min(MAX_DRAWDOWN_RATE);

    let income_after_preservation = inflate(
        future_annual_income,
        inflation_rate,
        annual_increase,
        preservation_years,
    );
    let annuity_factor = annuity_present_value_factor(assumed_return, POST_PRESERVATION_YEARS);
    let annuity_capital = income_after_preservation * annuity_factor
        / (1.0 + assumed_return).powi(preservation_years as i32);

    baseline.max(annuity_capital)
}

/// First-year withdrawal from `capital_required`, limited by the drawdown cap.
pub fn initial_withdrawal(future_annual_income: f64, capital_required: f64) -> f64 {
    future_annual_income.min(capital_required * MAX_DRAWDOWN_RATE)
}

fn annuity_present_value_factor(rate: f64, years: u32) -> f64 {
    (1.0 - (1.0 + rate).powi(-(years as i32))) / rate
}

fn annuity_future_value_factor(rate: f64, years: u32) -> f64 {
    if years == 0 {
        return 1.0;
    }
    if rate.abs() < 1e-9 {
        return years as f64;
    }
    ((1.0 + rate).powi(years as i32) - 1.0) / rate
}

/// Average provision return weighted by current value plus the nominal,
/// un-escalated contributions still to be made before retirement.
pub fn blended_return(provisions: &[Provision], years_to_retirement: u32) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for provision in provisions {
        let weight = provision.current_value
            + provision.monthly_contribution * 12.0 * years_to_retirement as f64;
        weighted += provision.annual_return * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}

/// Level monthly saving that grows to `shortfall` by retirement at
/// `blended_return`. A non-positive shortfall needs nothing.
pub fn solve_additional_savings(
    shortfall: f64,
    years_to_retirement: u32,
    blended_return: f64,
) -> f64 {
    if shortfall <= 0.0 {
        return 0.0;
    }
    let annual_savings =
        shortfall / annuity_future_value_factor(blended_return, years_to_retirement);
    annual_savings / 12.0
}
