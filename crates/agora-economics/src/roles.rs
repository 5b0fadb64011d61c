use agora_types::{Amount, BasisPoints, Role};
use serde::{Deserialize, Serialize};

/// Per-role collateral parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleParams {
    /// Stake locked when a participant of this role takes on work
    pub min_stake: Amount,
    /// Share of the locked stake forfeited on an adverse outcome
    pub slash_bps: BasisPoints,
    /// Share of the locked stake forfeited for not participating
    pub non_reveal_penalty_bps: BasisPoints,
}

/// Lookup table keyed by [`Role`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTable {
    pub agent: RoleParams,
    pub validator: RoleParams,
}

impl RoleTable {
    pub fn get(&self, role: Role) -> &RoleParams {
        match role {
            Role::Agent => &self.agent,
            Role::Validator => &self.validator,
        }
    }

    pub fn set(&mut self, role: Role, params: RoleParams) {
        match role {
            Role::Agent => self.agent = params,
            Role::Validator => self.validator = params,
        }
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self {
            agent: RoleParams {
                min_stake: Amount::new(20),
                slash_bps: BasisPoints::FULL,
                non_reveal_penalty_bps: BasisPoints::ZERO,
            },
            validator: RoleParams {
                min_stake: Amount::new(10),
                slash_bps: BasisPoints::new_const(1_000),
                non_reveal_penalty_bps: BasisPoints::new_const(1_000),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_role() {
        let mut table = RoleTable::default();
        assert_eq!(table.get(Role::Agent).slash_bps, BasisPoints::FULL);

        let custom = RoleParams {
            min_stake: Amount::new(50),
            slash_bps: BasisPoints::new_const(2_000),
            non_reveal_penalty_bps: BasisPoints::new_const(100),
        };
        table.set(Role::Validator, custom);
        assert_eq!(table.get(Role::Validator), &custom);
        assert_eq!(table.get(Role::Agent).min_stake, Amount::new(20));
    }

    #[test]
    fn default_validator_penalty_survives_rounding() {
        let validator = RoleTable::default().validator;
        let penalty = validator.min_stake.mul_bps(validator.non_reveal_penalty_bps);
        assert!(!penalty.is_zero());
    }
}
