use serde::{Deserialize, Serialize};

/// Base units per whole coin.
pub const COIN: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

impl Network {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "main" | "mainnet" => Some(Network::Main),
            "testnet" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }

    /// Bech32 human-readable prefix of addresses on this network.
    pub fn address_hrp(self) -> &'static str {
        match self {
            Network::Main => "hs",
            Network::Testnet => "ts",
            Network::Regtest => "rs",
        }
    }
}

/// Consensus parameters the explorer needs: auction phase lengths, the
/// subsidy schedule, and the claim rollout cadence. Passed by value at
/// construction time; never read from global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    pub tree_interval: u32,
    pub bidding_period: u32,
    pub reveal_period: u32,
    pub rollout_interval: u32,
    pub auction_start: u32,
    pub halving_interval: u32,
    pub base_reward: u64,
    pub max_halvings: u32,
}

impl NetworkParams {
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            tree_interval: 36,
            bidding_period: 720,
            reveal_period: 1_440,
            rollout_interval: 1_008,
            auction_start: 0,
            halving_interval: 170_000,
            base_reward: 2_000 * COIN,
            max_halvings: 52,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            tree_interval: 18,
            bidding_period: 50,
            reveal_period: 100,
            rollout_interval: 144,
            auction_start: 0,
            halving_interval: 170_000,
            base_reward: 2_000 * COIN,
            max_halvings: 52,
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            tree_interval: 5,
            bidding_period: 10,
            reveal_period: 20,
            rollout_interval: 2,
            auction_start: 0,
            halving_interval: 2_500,
            base_reward: 2_000 * COIN,
            max_halvings: 52,
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Blocks between an OPEN and the start of bidding.
    pub fn open_period(&self) -> u32 {
        self.tree_interval + 1
    }

    /// Height at which an auction opened at `open` enters its reveal phase.
    pub fn reveal_height(&self, open: u32) -> u32 {
        open + self.open_period() + self.bidding_period
    }

    /// Height at which an auction opened at `open` closes.
    pub fn close_height(&self, open: u32) -> u32 {
        self.reveal_height(open) + self.reveal_period
    }

    /// Coinbase subsidy at the given height, in base units.
    pub fn get_reward(&self, height: u32) -> u64 {
        let halvings = height / self.halving_interval;
        if halvings >= self.max_halvings {
            return 0;
        }
        self.base_reward >> halvings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_halves_on_schedule() {
        let params = NetworkParams::main();
        assert_eq!(params.get_reward(0), 2_000 * COIN);
        assert_eq!(params.get_reward(169_999), 2_000 * COIN);
        assert_eq!(params.get_reward(170_000), 1_000 * COIN);
        assert_eq!(params.get_reward(340_000), 500 * COIN);
        // beyond the last halving the subsidy is zero
        assert_eq!(params.get_reward(170_000 * 53), 0);
    }

    #[test]
    fn auction_phase_boundaries() {
        let params = NetworkParams::main();
        assert_eq!(params.open_period(), 37);
        assert_eq!(params.reveal_height(100), 100 + 37 + 720);
        assert_eq!(params.close_height(100), 100 + 37 + 720 + 1_440);
    }
}
