pub mod commitment;
pub mod engine;
pub mod error;
pub mod params;
pub mod round;
pub mod selection;

pub use commitment::{compute_commitment, Vote};
pub use engine::{RevealReceipt, RoundRequest, ValidationEngine};
pub use error::{ConsensusError, Result};
pub use params::{ConsensusParams, ParamsRegistry};
pub use round::{
    RevealedVote, RoundOutcome, RoundPhase, RoundSettlement, RoundStatus, TallyReport,
    ValidationRound, ValidatorSettlement, Verdict,
};
pub use selection::{select_committee, selection_score};
