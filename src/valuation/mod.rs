//! Cap-rate valuation engine.
//!
//! Pure functions only: a `ValuationInput` in, a fresh `ValuationResult` out.

pub mod grades;

use crate::models::{ValuationInput, ValuationResult};
use thiserror::Error;

/// Share of the vacancy-gap income assumed recoverable.
const POTENTIAL_RECOVERY_RATIO: f64 = 0.88;

#[derive(Debug, Error, PartialEq)]
pub enum ValuationError {
    #[error("매매기준 수익율은 0보다 커야 합니다 (cap rate {0}%)")]
    CapRateNotPositive(f64),

    #[error("invalid value for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{axis} grade must be between 1 and 5, got {value:?}")]
    InvalidGrade { axis: &'static str, value: String },
}

pub fn annual_rent_income(input: &ValuationInput, cap_rate: f64) -> f64 {
    let monthly =
        input.monthly_rent + input.ad_income + input.parking_income + input.other_income;
    // Deposit earns at the cap rate itself.
    monthly * 12.0 + input.deposit * cap_rate
}

pub fn annual_facility_income(input: &ValuationInput) -> f64 {
    input.facility_costs * (input.management_return_rate_pct / 100.0) * 12.0
}

pub fn noi(input: &ValuationInput) -> f64 {
    annual_rent_income(input, input.cap_rate_pct / 100.0) + annual_facility_income(input)
}

/// `NOI / cap_rate`; `None` for a zero or negative cap rate.
pub fn base_value(noi: f64, cap_rate: f64) -> Option<f64> {
    (cap_rate > 0.0 && cap_rate.is_finite()).then(|| noi / cap_rate)
}

/// Value unlocked by closing the gap to the regional vacancy rate. Never negative.
pub fn potential_value(noi: f64, current_vacancy_pct: f64, regional_vacancy_pct: f64, cap_rate: f64) -> f64 {
    if cap_rate <= 0.0 {
        return 0.0;
    }
    let raw = noi * POTENTIAL_RECOVERY_RATIO * ((current_vacancy_pct - regional_vacancy_pct) / 100.0)
        / cap_rate;
    raw.max(0.0)
}

pub fn evaluate(input: &ValuationInput) -> Result<ValuationResult, ValuationError> {
    let cap_rate = input.cap_rate_pct / 100.0;
    let noi = noi(input);
    let base_value =
        base_value(noi, cap_rate).ok_or(ValuationError::CapRateNotPositive(input.cap_rate_pct))?;

    let factors = grades::factors_for(&input.grades);
    let total_factor = factors.total();
    let market_value = base_value * (1.0 + total_factor);

    let potential_value = potential_value(
        noi,
        input.current_vacancy_pct,
        input.regional_vacancy_pct,
        cap_rate,
    );

    Ok(ValuationResult {
        noi,
        base_value,
        factors,
        total_factor,
        market_value,
        potential_value,
        combined_value: market_value + potential_value,
    })
}
