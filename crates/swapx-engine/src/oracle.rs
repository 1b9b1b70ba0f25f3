use std::collections::HashMap;

use alloy_primitives::U256;
use swapx_core::{amount::unit_scale, BrokerConfig, ChainId};

/// Source of native-coin/USD rates for the fixed-USD commission on unknown
/// tokens. Pluggable so a live feed can replace the configured constants;
/// the fixed-rate implementation doubles as the fallback.
pub trait NativeUsdOracle: Send + Sync {
    /// Rate in US cents per whole native coin, or `None` if unknown.
    fn native_usd_cents(&self, chain: &ChainId) -> Option<u64>;
}

/// Rates read once from configuration.
pub struct FixedRateOracle {
    rates: HashMap<ChainId, u64>,
}

impl FixedRateOracle {
    pub fn from_config(config: &BrokerConfig) -> Self {
        let rates = config
            .chains
            .iter()
            .map(|c| (c.chain_id.clone(), c.native_usd_rate_cents))
            .collect();
        Self { rates }
    }
}

impl NativeUsdOracle for FixedRateOracle {
    fn native_usd_cents(&self, chain: &ChainId) -> Option<u64> {
        self.rates.get(chain).copied().filter(|r| *r > 0)
    }
}

/// `usd_cents` worth of native coin at `rate_cents` per whole coin, in base
/// units. Integer arithmetic, rounding down.
pub fn usd_commission_in_native(usd_cents: u64, rate_cents: u64, native_decimals: u8) -> U256 {
    if rate_cents == 0 {
        return U256::ZERO;
    }
    U256::from(usd_cents) * unit_scale(native_decimals) / U256::from(rate_cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_dollars_of_eth_at_2500() {
        // $10 at $2,500/ETH = 0.004 ETH.
        let fee = usd_commission_in_native(1_000, 250_000, 18);
        assert_eq!(fee, U256::from(4_000_000_000_000_000u64));
    }

    #[test]
    fn zero_rate_yields_zero_commission() {
        assert_eq!(usd_commission_in_native(1_000, 0, 18), U256::ZERO);
    }

    #[test]
    fn rounding_is_downward() {
        // $10 at $3/coin with 0 decimals: 1000/300 = 3 coins, remainder dropped.
        assert_eq!(usd_commission_in_native(1_000, 300, 0), U256::from(3u64));
    }
}
