use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

/// European option priced with Black-Scholes.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    pub spot: f64,
    pub strike: f64,
    /// In years.
    pub time_to_expiry: f64,
    pub risk_free_rate: f64,
    pub volatility: f64,
}

impl BlackScholes {
    pub fn price(&self, option_type: OptionType) -> f64 {
        if self.time_to_expiry <= 0.0 || self.volatility <= 0.0 {
            return intrinsic(option_type, self.spot, self.strike);
        }

        let sqrt_t = self.time_to_expiry.sqrt();
        let d1 = ((self.spot / self.strike).ln()
            + (self.risk_free_rate + self.volatility.powi(2) / 2.0) * self.time_to_expiry)
            / (self.volatility * sqrt_t);
        let d2 = d1 - self.volatility * sqrt_t;
        let discount = (-self.risk_free_rate * self.time_to_expiry).exp();

        match option_type {
            OptionType::Call => self.spot * norm_cdf(d1) - self.strike * discount * norm_cdf(d2),
            OptionType::Put => self.strike * discount * norm_cdf(-d2) - self.spot * norm_cdf(-d1),
        }
    }
}

pub fn intrinsic(option_type: OptionType, spot: f64, strike: f64) -> f64 {
    match option_type {
        OptionType::Call => (spot - strike).max(0.0),
        OptionType::Put => (strike - spot).max(0.0),
    }
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bs(strike: f64) -> BlackScholes {
        BlackScholes {
            spot: 100.0,
            strike,
            time_to_expiry: 0.25,
            risk_free_rate: 0.05,
            volatility: 0.2,
        }
    }

    #[test]
    fn matches_reference_value() {
        // Hull-style textbook case: S=100, K=100, T=0.25, r=5%, vol=20% => call ~4.615
        let call = bs(100.0).price(OptionType::Call);
        assert!((call - 4.615).abs() < 0.01, "call={call}");
    }

    #[test]
    fn put_call_parity_holds() {
        let b = bs(105.0);
        let lhs = b.price(OptionType::Call) - b.price(OptionType::Put);
        let rhs = b.spot - b.strike * (-b.risk_free_rate * b.time_to_expiry).exp();
        assert!((lhs - rhs).abs() < 1e-9);
    }

    #[test]
    fn expired_option_is_intrinsic() {
        let mut b = bs(90.0);
        b.time_to_expiry = 0.0;
        assert_eq!(b.price(OptionType::Call), 10.0);
        assert_eq!(b.price(OptionType::Put), 0.0);
    }
}
