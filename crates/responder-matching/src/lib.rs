//! Candidate selection for the responder matching engine.
//!
//! Two stages feed the orchestrator: the eligibility filter narrows the
//! volunteer pool to those who qualify for an emergency, and the ranker
//! imposes a deterministic total order on the survivors. A statistics
//! module answers the diagnostic queries the authority surface exposes.

pub mod eligibility;
pub mod ranking;
pub mod stats;

pub use eligibility::{eligible, Candidate};
pub use ranking::{match_score, rank};
pub use stats::{matching_statistics, suggest_expansion, ExpansionSuggestion, MatchingStatistics};
