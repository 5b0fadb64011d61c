use crate::{LedgerError, Result};
use agora_types::{Amount, BasisPoints, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

/// How slashed collateral is divided between the harmed party, the treasury
/// and the burn sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashSplit {
    pub beneficiary_bps: BasisPoints,
    pub treasury_bps: BasisPoints,
    pub burn_bps: BasisPoints,
}

impl Default for SlashSplit {
    fn default() -> Self {
        Self {
            beneficiary_bps: BasisPoints::new_const(5_000),
            treasury_bps: BasisPoints::new_const(2_500),
            burn_bps: BasisPoints::new_const(2_500),
        }
    }
}

/// Result of dividing one slashed amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashShares {
    pub beneficiary: Amount,
    pub treasury: Amount,
    pub burn: Amount,
}

impl SlashShares {
    pub fn total(&self) -> Amount {
        Amount::new(self.beneficiary.as_u64() + self.treasury.as_u64() + self.burn.as_u64())
    }
}

impl SlashSplit {
    pub fn new(
        beneficiary_bps: BasisPoints,
        treasury_bps: BasisPoints,
        burn_bps: BasisPoints,
    ) -> Result<Self> {
        let split = Self {
            beneficiary_bps,
            treasury_bps,
            burn_bps,
        };
        split.validate()?;
        Ok(split)
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.beneficiary_bps.value() as u64
            + self.treasury_bps.value() as u64
            + self.burn_bps.value() as u64;
        if sum != BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameters(format!(
                "slash split must sum to {} bps, got {}",
                BPS_DENOMINATOR, sum
            )));
        }
        Ok(())
    }

    /// Divide `amount`; rounding remainder always lands in the burn share.
    pub fn apply(&self, amount: Amount) -> SlashShares {
        let beneficiary = amount.mul_bps(self.beneficiary_bps);
        let treasury = amount.mul_bps(self.treasury_bps);
        // beneficiary + treasury <= amount because their bps sum to at most 10000
        let burn = amount.saturating_sub(beneficiary).saturating_sub(treasury);

        let shares = SlashShares {
            beneficiary,
            treasury,
            burn,
        };
        assert_eq!(
            shares.total(),
            amount,
            "slash shares must sum to the slashed amount"
        );
        shares
    }
}
