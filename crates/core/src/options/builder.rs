use crate::domain::recommendation::StrategyKind;
use crate::options::pricing::{intrinsic, BlackScholes, OptionType};
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.0;
/// Floor on the volatility used for pricing, so a perfectly flat history still yields premiums.
const MIN_PRICING_VOL: f64 = 0.05;
/// Strikes are listed in whole dollars, so legs must be at least this far apart.
const MIN_STRIKE_STEP: f64 = 1.0;
/// Payoff chart covers spot +/- 15% in 30 steps.
const PAYOFF_SPAN: f64 = 0.15;
const PAYOFF_STEPS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSide {
    Buy,
    Sell,
}

impl LegSide {
    fn sign(&self) -> f64 {
        match self {
            LegSide::Buy => 1.0,
            LegSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub option_type: OptionType,
    pub side: LegSide,
    pub strike: f64,
    /// Estimated premium per share.
    pub premium: f64,
}

impl OptionLeg {
    fn payoff_at(&self, price: f64) -> f64 {
        self.side.sign() * (intrinsic(self.option_type, price, self.strike) - self.premium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoffPoint {
    pub price: f64,
    pub profit: f64,
}

/// Legs plus risk profile at expiry, all amounts per share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsSetup {
    pub strategy: StrategyKind,
    pub spot: f64,
    pub expiry_days: u32,
    pub volatility: f64,
    pub legs: Vec<OptionLeg>,
    /// Positive for a net debit, negative for a net credit.
    pub net_premium: f64,
    /// `None` when unbounded.
    pub max_profit: Option<f64>,
    /// `None` when unbounded. Reported as a positive amount.
    pub max_loss: Option<f64>,
    pub breakevens: Vec<f64>,
    /// Profit at expiry sampled around spot, for charting.
    #[serde(default)]
    pub payoff_curve: Vec<PayoffPoint>,
}

impl OptionsSetup {
    pub fn payoff_at(&self, price: f64) -> f64 {
        self.legs.iter().map(|l| l.payoff_at(price)).sum()
    }

    fn sample_payoff(&self, span: f64, steps: usize) -> Vec<PayoffPoint> {
        if steps == 0 {
            return Vec::new();
        }
        let lo = (self.spot * (1.0 - span)).max(0.0);
        let hi = self.spot * (1.0 + span);
        (0..=steps)
            .map(|i| {
                let price = lo + (hi - lo) * i as f64 / steps as f64;
                PayoffPoint {
                    price,
                    profit: self.payoff_at(price),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    pub horizon_days: u32,
    pub risk_free_rate: f64,
}

impl StrategyBuilder {
    pub fn new(horizon_days: u32, risk_free_rate: f64) -> Self {
        Self {
            horizon_days,
            risk_free_rate,
        }
    }

    /// Builds legs for `strategy` around `spot`. Returns `None` for `NoTrade` or a bad spot.
    pub fn build(&self, strategy: StrategyKind, spot: f64, annualized_vol: f64) -> Option<OptionsSetup> {
        if !(spot.is_finite() && spot > 0.0) {
            return None;
        }

        let t = self.horizon_days as f64 / DAYS_PER_YEAR;
        let vol = annualized_vol.max(MIN_PRICING_VOL);
        let move_ = (spot * vol * t.sqrt()).max(MIN_STRIKE_STEP);
        let atm = round_strike(spot);

        use LegSide::{Buy, Sell};
        use OptionType::{Call, Put};
        let specs: Vec<(OptionType, LegSide, f64)> = match strategy {
            StrategyKind::NoTrade => return None,
            StrategyKind::LongCall => vec![(Call, Buy, atm)],
            StrategyKind::LongPut => vec![(Put, Buy, atm)],
            StrategyKind::BullCallSpread => vec![(Call, Buy, atm), (Call, Sell, round_strike(spot + move_))],
            StrategyKind::BearPutSpread => vec![(Put, Buy, atm), (Put, Sell, round_strike(spot - move_))],
            StrategyKind::BullPutSpread => vec![
                (Put, Sell, round_strike(spot - 0.5 * move_)),
                (Put, Buy, round_strike(spot - 1.5 * move_)),
            ],
            StrategyKind::BearCallSpread => vec![
                (Call, Sell, round_strike(spot + 0.5 * move_)),
                (Call, Buy, round_strike(spot + 1.5 * move_)),
            ],
            StrategyKind::LongStraddle => vec![(Call, Buy, atm), (Put, Buy, atm)],
            StrategyKind::IronCondor => vec![
                (Put, Buy, round_strike(spot - 2.0 * move_)),
                (Put, Sell, round_strike(spot - move_)),
                (Call, Sell, round_strike(spot + move_)),
                (Call, Buy, round_strike(spot + 2.0 * move_)),
            ],
        };

        let legs: Vec<OptionLeg> = specs
            .into_iter()
            .map(|(option_type, side, strike)| OptionLeg {
                option_type,
                side,
                strike,
                premium: BlackScholes {
                    spot,
                    strike,
                    time_to_expiry: t,
                    risk_free_rate: self.risk_free_rate,
                    volatility: vol,
                }
                .price(option_type),
            })
            .collect();

        let net_premium = legs.iter().map(|l| l.side.sign() * l.premium).sum();
        let mut setup = OptionsSetup {
            strategy,
            spot,
            expiry_days: self.horizon_days,
            volatility: vol,
            legs,
            net_premium,
            max_profit: None,
            max_loss: None,
            breakevens: Vec::new(),
            payoff_curve: Vec::new(),
        };
        fill_risk_profile(&mut setup);
        setup.payoff_curve = setup.sample_payoff(PAYOFF_SPAN, PAYOFF_STEPS);
        Some(setup)
    }
}

fn round_strike(x: f64) -> f64 {
    x.round().max(MIN_STRIKE_STEP)
}

/// Payoff is piecewise linear with kinks at the strikes, so extremes sit at 0, a
/// strike, or infinity (decided by the slope above the highest strike).
fn fill_risk_profile(setup: &mut OptionsSetup) {
    let mut kinks: Vec<f64> = setup.legs.iter().map(|l| l.strike).collect();
    kinks.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    kinks.dedup();

    let upper_slope: f64 = setup
        .legs
        .iter()
        .filter(|l| l.option_type == OptionType::Call)
        .map(|l| l.side.sign())
        .sum();

    let mut kink_prices = vec![0.0];
    kink_prices.extend(kinks.iter().copied());
    let values: Vec<f64> = kink_prices.iter().map(|&p| setup.payoff_at(p)).collect();

    let best = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let worst = values.iter().copied().fold(f64::INFINITY, f64::min);

    setup.max_profit = if upper_slope > 0.0 { None } else { Some(best) };
    setup.max_loss = if upper_slope < 0.0 { None } else { Some((-worst).max(0.0)) };

    let last = kinks.last().copied().unwrap_or(setup.spot);
    kink_prices.push(last + setup.spot);

    let mut breakevens = Vec::new();
    for pair in kink_prices.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (pa, pb) = (setup.payoff_at(a), setup.payoff_at(b));
        if pa == 0.0 {
            breakevens.push(a);
        } else if pa * pb < 0.0 {
            breakevens.push(a + (b - a) * pa / (pa - pb));
        }
    }
    breakevens.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
    setup.breakevens = breakevens;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> StrategyBuilder {
        StrategyBuilder::new(28, 0.04)
    }

    #[test]
    fn no_trade_has_no_setup() {
        assert!(builder().build(StrategyKind::NoTrade, 210.0, 0.2).is_none());
        assert!(builder().build(StrategyKind::LongCall, 0.0, 0.2).is_none());
    }

    #[test]
    fn long_call_has_unbounded_profit() {
        let s = builder().build(StrategyKind::LongCall, 210.0, 0.2).unwrap();
        assert_eq!(s.max_profit, None);
        let premium = s.legs[0].premium;
        assert!((s.max_loss.unwrap() - premium).abs() < 1e-9);
        assert_eq!(s.breakevens.len(), 1);
        assert!((s.breakevens[0] - (210.0 + premium)).abs() < 1e-6);
    }

    #[test]
    fn bull_call_spread_is_bounded_both_ways() {
        let s = builder().build(StrategyKind::BullCallSpread, 210.0, 0.2).unwrap();
        assert!(s.net_premium > 0.0);
        let width = s.legs[1].strike - s.legs[0].strike;
        assert!(width >= 1.0);
        assert!((s.max_profit.unwrap() - (width - s.net_premium)).abs() < 1e-9);
        assert!((s.max_loss.unwrap() - s.net_premium).abs() < 1e-9);
        assert!((s.payoff_at(10_000.0) - s.max_profit.unwrap()).abs() < 1e-9);
        assert!((s.payoff_at(1.0) + s.max_loss.unwrap()).abs() < 1e-9);
    }

    #[test]
    fn iron_condor_collects_credit_with_two_breakevens() {
        let s = builder().build(StrategyKind::IronCondor, 210.0, 0.2).unwrap();
        assert!(s.net_premium < 0.0);
        assert!((s.max_profit.unwrap() + s.net_premium).abs() < 1e-9);
        assert!(s.max_loss.unwrap() > 0.0);
        assert_eq!(s.breakevens.len(), 2);
        assert!(s.breakevens[0] < 210.0 && 210.0 < s.breakevens[1]);
    }

    #[test]
    fn bear_call_spread_caps_loss() {
        let s = builder().build(StrategyKind::BearCallSpread, 210.0, 0.35).unwrap();
        assert!(s.max_loss.is_some());
        assert!(s.payoff_at(150.0) > 0.0);
    }

    #[test]
    fn flat_volatility_still_produces_distinct_strikes() {
        let s = builder().build(StrategyKind::IronCondor, 210.0, 0.0).unwrap();
        let mut strikes: Vec<f64> = s.legs.iter().map(|l| l.strike).collect();
        strikes.dedup();
        assert_eq!(strikes.len(), 4);
    }

    #[test]
    fn built_setup_carries_payoff_curve() {
        let s = builder().build(StrategyKind::LongStraddle, 200.0, 0.2).unwrap();
        let curve = &s.payoff_curve;
        assert_eq!(curve.len(), 31);
        assert!((curve[0].price - 170.0).abs() < 1e-9);
        assert!((curve[30].price - 230.0).abs() < 1e-9);
        // A straddle loses the most at the strike and gains toward both ends.
        let mid = curve[15];
        assert!((mid.price - 200.0).abs() < 1e-9);
        assert!((mid.profit + s.net_premium).abs() < 1e-9);
        assert!(curve[0].profit > mid.profit && curve[30].profit > mid.profit);
    }
}
