// Numan Thabit 2025
//! Chain-level snapshot returned by `suix_getLatestSuiSystemState`.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub epoch: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub protocol_version: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub reference_gas_price: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub total_stake: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub epoch_start_timestamp_ms: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub epoch_duration_ms: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub stake_subsidy_start_epoch: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub stake_subsidy_balance: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub stake_subsidy_current_distribution_amount: u64,
    #[serde(default)]
    pub active_validators: Vec<ValidatorSummary>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSummary {
    pub sui_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub net_address: String,
    #[serde(default)]
    pub p2p_address: String,
    #[serde(default)]
    pub primary_address: String,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub voting_power: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub gas_price: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub commission_rate: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub next_epoch_stake: u64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub staking_pool_sui_balance: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GasPriceStats {
    pub min: u64,
    pub max: u64,
    pub average: u64,
    pub median: u64,
}

impl SystemState {
    pub fn epoch_end_ms(&self) -> u64 {
        self.epoch_start_timestamp_ms
            .saturating_add(self.epoch_duration_ms)
    }

    /// Elapsed share of the current epoch, 0..=100.
    pub fn epoch_progress(&self, now_ms: u64) -> u8 {
        if self.epoch_duration_ms == 0 {
            return 0;
        }
        let elapsed = now_ms.saturating_sub(self.epoch_start_timestamp_ms);
        ((elapsed as u128 * 100) / self.epoch_duration_ms as u128).min(100) as u8
    }

    pub fn validator_count(&self) -> usize {
        self.active_validators.len()
    }

    /// Statistics over the gas prices quoted by the active validator set.
    pub fn gas_price_stats(&self) -> Option<GasPriceStats> {
        let mut prices: Vec<u64> = self
            .active_validators
            .iter()
            .map(|validator| validator.gas_price)
            .collect();
        if prices.is_empty() {
            return None;
        }
        prices.sort_unstable();
        let len = prices.len();
        let sum: u128 = prices.iter().map(|price| *price as u128).sum();
        let median = if len % 2 == 0 {
            (prices[len / 2 - 1] + prices[len / 2]) / 2
        } else {
            prices[len / 2]
        };
        Some(GasPriceStats {
            min: prices[0],
            max: prices[len - 1],
            average: (sum / len as u128) as u64,
            median,
        })
    }
}
