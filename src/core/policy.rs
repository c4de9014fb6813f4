//! Drawdown policy constants shared by the capital solver and the depletion
//! simulator.

/// Maximum annual withdrawal as a fraction of remaining capital.
pub const MAX_DRAWDOWN_RATE: f64 = 0.175;

/// Capital at or below this amount is paid out in full as a final withdrawal.
pub const SMALL_BALANCE_THRESHOLD: f64 = 125_000.0;

/// Years of income funded by the annuity that follows a preservation period.
pub const POST_PRESERVATION_YEARS: u32 = 20;

/// Upper bound on simulated drawdown years before capital is declared sustained.
pub const MAX_DEPLETION_YEARS: u32 = 150;

/// Preservation periods a plan may elect, in years.
pub const PRESERVATION_PERIODS: [u32; 4] = [10, 15, 20, 25];

/// Upper bound on every user-supplied rate, as a fraction.
pub const MAX_RATE: f64 = 0.20;
