//! Payload projections broadcast during a match.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::game::Track;

/// Host-safe round announcement: enough to render a multiple-choice prompt
/// and play the audio, never the answer's identity or position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoundStart {
    /// 1-indexed round number.
    pub round_number: u32,
    /// Playable audio URL for this round.
    pub audio: String,
    /// Title options in drawn order; exactly one belongs to the answer.
    pub options: Vec<String>,
}

/// Full reveal issued once a round has closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoundEnd {
    /// 1-indexed round number.
    pub round_number: u32,
    /// The track the round was about.
    pub answer_track: Track,
}
