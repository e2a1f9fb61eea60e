//! The fixed-point cost algebra.
//!
//! Costs are non-negative fixed-point integers. Arithmetic saturates at
//! [`MAX_COST`] so that sums of forbidden costs cannot wrap around; whether a
//! cost is *forbidden* is always judged against the current upper bound, not
//! against [`MAX_COST`].

use thiserror::Error;

pub type Cost = i64;

pub const MIN_COST: Cost = 0;

/// Saturation point of the cost algebra. Kept far below `i64::MAX` so that
/// adding two saturated costs stays representable.
pub const MAX_COST: Cost = i64::MAX / 1024;

/// Cost addition saturating at [`MAX_COST`].
pub fn saturating_add(a: Cost, b: Cost) -> Cost {
    (a + b).min(MAX_COST)
}

/// Cost scaling saturating at [`MAX_COST`]; used for input scaling only.
pub fn saturating_mul(a: Cost, factor: Cost) -> Cost {
    a.checked_mul(factor).map_or(MAX_COST, |c| c.min(MAX_COST))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cost {value} is not representable at precision {precision}; lower the precision (-p) or the cost multiplier (-C)")]
pub struct OverflowError {
    pub value: String,
    pub precision: u32,
}

/// Conversion between decimal user costs and internal fixed-point costs.
///
/// `precision` is the number of decimal digits kept; `multiplier` is the
/// global cost multiplier applied to every input cost (negated for
/// maximization problems).
#[derive(Debug, Clone, Copy)]
pub struct CostScale {
    pub precision: u32,
    pub multiplier: f64,
}

impl Default for CostScale {
    fn default() -> Self {
        CostScale {
            precision: 0,
            multiplier: 1.0,
        }
    }
}

impl CostScale {
    pub fn with_precision(precision: u32) -> Self {
        CostScale {
            precision,
            multiplier: 1.0,
        }
    }

    fn factor(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    /// Convert a decimal cost string to a fixed-point cost.
    pub fn decimal_to_cost(&self, token: &str) -> Result<Cost, OverflowError> {
        let overflow = || OverflowError {
            value: token.to_owned(),
            precision: self.precision,
        };

        let decimal: f64 = token.parse().map_err(|_| overflow())?;
        let scaled = decimal * self.multiplier * self.factor();
        if !scaled.is_finite() || scaled.abs() >= (MAX_COST / 2) as f64 {
            return Err(overflow());
        }
        Ok(scaled.round() as Cost)
    }

    /// Scale an integral input cost by the multiplier.
    pub fn integer_to_cost(&self, value: i64) -> Result<Cost, OverflowError> {
        let scaled = value as f64 * self.multiplier;
        if scaled.abs() >= (MAX_COST / 2) as f64 {
            return Err(OverflowError {
                value: value.to_string(),
                precision: self.precision,
            });
        }
        Ok(scaled.round() as Cost)
    }

    /// Render an internal cost in decimal user units.
    pub fn format_cost(&self, cost: Cost) -> String {
        format_cost(cost, self.precision)
    }

    /// Convert a probability to a cost via `-ln(p)`, normalised so that the
    /// probability `1 - 10^-precision` is still representable as a non-zero
    /// cost. A zero probability maps to [`MAX_COST`].
    pub fn probability_to_cost(&self, p: f64) -> Cost {
        probability_to_cost(p, self.precision)
    }
}

pub fn probability_to_cost(p: f64, precision: u32) -> Cost {
    if p <= 0.0 {
        return MAX_COST;
    }
    let norm_factor = -1.0 / (-(10f64.powi(-(precision as i32)))).ln_1p();
    let cost = (-p.ln() * norm_factor).round();
    if cost >= MAX_COST as f64 {
        MAX_COST
    } else {
        cost.max(0.0) as Cost
    }
}

pub fn format_cost(cost: Cost, precision: u32) -> String {
    if precision == 0 {
        return cost.to_string();
    }
    let factor = 10i64.pow(precision);
    let sign = if cost < 0 { "-" } else { "" };
    let abs = cost.abs();
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / factor,
        abs % factor,
        width = precision as usize
    )
}

/// Decimal conversion with the default multiplier of 1.
pub fn decimal_to_cost(token: &str, precision: u32) -> Result<Cost, OverflowError> {
    CostScale {
        precision,
        multiplier: 1.0,
    }
    .decimal_to_cost(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_saturates_at_the_ceiling() {
        assert_eq!(saturating_add(MAX_COST, MAX_COST), MAX_COST);
        assert_eq!(saturating_add(1, 2), 3);
        assert_eq!(saturating_add(MAX_COST - 1, 5), MAX_COST);
    }

    #[test]
    fn decimal_conversion_respects_precision() {
        assert_eq!(decimal_to_cost("2.5", 1).unwrap(), 25);
        assert_eq!(decimal_to_cost("2.5", 0).unwrap(), 3);
        assert_eq!(decimal_to_cost("0.0000001", 7).unwrap(), 1);
        assert_eq!(decimal_to_cost("-1.25", 2).unwrap(), -125);
    }

    #[test]
    fn unrepresentable_decimals_are_rejected() {
        assert!(decimal_to_cost("1e300", 7).is_err());
        assert!(decimal_to_cost("not-a-cost", 0).is_err());
    }

    #[test]
    fn formatting_round_trips_fixed_point() {
        assert_eq!(format_cost(25, 1), "2.5");
        assert_eq!(format_cost(205, 2), "2.05");
        assert_eq!(format_cost(-3, 0), "-3");
        assert_eq!(format_cost(3, 7), "0.0000003");
    }

    #[test]
    fn probabilities_map_to_nonnegative_costs() {
        assert_eq!(probability_to_cost(1.0, 7), 0);
        assert_eq!(probability_to_cost(0.0, 7), MAX_COST);
        let near_one = probability_to_cost(1.0 - 1e-7, 7);
        assert!(near_one >= 1, "1 - 10^-precision must stay representable");
        assert!(probability_to_cost(0.5, 7) > near_one);
    }

    #[test]
    fn multiplier_negation_flips_signs() {
        let scale = CostScale {
            precision: 0,
            multiplier: -1.0,
        };
        assert_eq!(scale.decimal_to_cost("4").unwrap(), -4);
    }
}
