//! Game and round state for a single quiz match.

use std::collections::HashSet;

use indexmap::IndexMap;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::game::{RoundEnd, RoundStart},
    error::ServiceError,
};

/// A playable track fetched from the external provider. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Track {
    /// Provider-side identifier, unique within a playlist.
    pub id: String,
    /// URL of the playable audio preview.
    pub audio: String,
    /// Display title. Distinct tracks may share a title.
    pub title: String,
    /// Ordered artist names.
    pub artists: Vec<String>,
}

/// Lifecycle of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Constructed but not yet announced to players.
    Pending,
    /// Start payload has been issued; players are guessing.
    Ongoing,
    /// End payload has been issued; the answer is public.
    Ended,
}

/// One multiple-choice prompt: an answer track plus distractor titles.
#[derive(Debug, Clone)]
pub struct GameRound {
    round_number: u32,
    answer_track: Track,
    options: Vec<String>,
    phase: RoundPhase,
}

impl GameRound {
    fn new(round_number: u32, answer_track: Track, options: Vec<String>) -> Self {
        Self {
            round_number,
            answer_track,
            options,
            phase: RoundPhase::Pending,
        }
    }

    /// 1-indexed position of this round within its game.
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Mark the round as announced and project the host-safe start payload.
    ///
    /// The payload carries the answer's audio so clients can play it, but
    /// never its id, title position, or artists.
    pub fn data_for_round_start(&mut self) -> Result<RoundStart, ServiceError> {
        match self.phase {
            RoundPhase::Pending | RoundPhase::Ongoing => {
                self.phase = RoundPhase::Ongoing;
                Ok(RoundStart {
                    round_number: self.round_number,
                    audio: self.answer_track.audio.clone(),
                    options: self.options.clone(),
                })
            }
            RoundPhase::Ended => Err(ServiceError::RoundNotOngoing(self.round_number)),
        }
    }

    /// Close the round and project the answer-revealing end payload.
    ///
    /// Safe only after clients stopped guessing, which is why the caller must
    /// echo the round number it believes is ending.
    pub fn data_for_round_end(&mut self, round_number: u32) -> Result<RoundEnd, ServiceError> {
        if round_number != self.round_number {
            return Err(ServiceError::RoundMismatch {
                expected: self.round_number,
                got: round_number,
            });
        }
        if self.phase != RoundPhase::Ongoing {
            return Err(ServiceError::RoundNotOngoing(self.round_number));
        }

        self.phase = RoundPhase::Ended;
        Ok(RoundEnd {
            round_number: self.round_number,
            answer_track: self.answer_track.clone(),
        })
    }
}

/// One full quiz match over a fixed track pool and a fixed round budget.
#[derive(Debug, Clone)]
pub struct Game {
    game_id: Uuid,
    total_rounds: u32,
    options_per_round: usize,
    game_tracks: Vec<Track>,
    played_tracks: HashSet<String>,
    rounds: IndexMap<u32, GameRound>,
    ongoing_round: GameRound,
}

impl Game {
    /// Build a game over `tracks` and immediately generate round 1.
    ///
    /// Fails with [`ServiceError::NoAnswerAvailable`] when the pool cannot
    /// supply a full option set; unreachable when the caller enforced the
    /// pool-size precondition, but generation re-checks every round anyway.
    pub fn new(
        tracks: Vec<Track>,
        total_rounds: u32,
        options_per_round: usize,
        rng: &mut impl Rng,
    ) -> Result<Self, ServiceError> {
        let played_tracks = HashSet::new();
        let first = generate_round(1, &tracks, &played_tracks, options_per_round, rng)?;

        Ok(Self {
            game_id: Uuid::new_v4(),
            total_rounds,
            options_per_round,
            game_tracks: tracks,
            played_tracks,
            rounds: IndexMap::new(),
            ongoing_round: first,
        })
    }

    /// Unique identifier of this match.
    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    /// Round budget fixed at creation. Sizes the pool precondition; the match
    /// actually ends when the pool runs out of unplayed tracks.
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// The round currently being played.
    pub fn ongoing_round(&self) -> &GameRound {
        &self.ongoing_round
    }

    /// Track ids already consumed as answers.
    pub fn played_tracks(&self) -> &HashSet<String> {
        &self.played_tracks
    }

    /// Completed rounds keyed by round number.
    pub fn rounds(&self) -> &IndexMap<u32, GameRound> {
        &self.rounds
    }

    /// Announce the ongoing round and return its start payload.
    pub fn data_for_round_start(&mut self) -> Result<RoundStart, ServiceError> {
        self.ongoing_round.data_for_round_start()
    }

    /// Close the ongoing round and return its reveal payload.
    pub fn data_for_round_end(&mut self, round_number: u32) -> Result<RoundEnd, ServiceError> {
        self.ongoing_round.data_for_round_end(round_number)
    }

    /// Archive the closed round and generate its successor.
    ///
    /// `expected` must be exactly one past the ongoing round, which rejects
    /// duplicated or re-ordered round-ended signals. The closed round enters
    /// the archive and its answer the played set before a successor is
    /// attempted, so a [`ServiceError::NoAnswerAvailable`] return means the
    /// pool is exhausted with the final round already on the books.
    pub fn next_round(
        &mut self,
        expected: u32,
        rng: &mut impl Rng,
    ) -> Result<RoundStart, ServiceError> {
        let current = self.ongoing_round.round_number;
        if expected != current + 1 {
            return Err(ServiceError::RoundSequence {
                expected: current + 1,
                got: expected,
            });
        }
        if self.ongoing_round.phase != RoundPhase::Ended {
            return Err(ServiceError::RoundNotOngoing(current));
        }

        // Close-out is unconditional: every completed round is archived, the
        // match's last one included.
        self.played_tracks
            .insert(self.ongoing_round.answer_track.id.clone());
        self.rounds.insert(current, self.ongoing_round.clone());

        let next = generate_round(
            expected,
            &self.game_tracks,
            &self.played_tracks,
            self.options_per_round,
            rng,
        )?;
        self.ongoing_round = next;

        self.data_for_round_start()
    }
}

/// Draw the next round from the unplayed remainder of the pool.
///
/// Shuffle-then-take gives a uniform draw without replacement; one of the
/// drawn tracks is then picked uniformly as the answer. Options keep the
/// drawn order and are NOT deduplicated by title: two distinct tracks sharing
/// a title both stay selectable.
fn generate_round(
    round_number: u32,
    tracks: &[Track],
    played: &HashSet<String>,
    options_per_round: usize,
    rng: &mut impl Rng,
) -> Result<GameRound, ServiceError> {
    let mut candidates: Vec<&Track> = tracks
        .iter()
        .filter(|track| !played.contains(&track.id))
        .collect();

    if candidates.len() < options_per_round {
        return Err(ServiceError::NoAnswerAvailable(options_per_round));
    }

    candidates.shuffle(rng);
    let drawn = &candidates[..options_per_round];
    let answer = drawn[rng.random_range(0..options_per_round)].clone();
    let options = drawn.iter().map(|track| track.title.clone()).collect();

    Ok(GameRound::new(round_number, answer, options))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn pool(size: usize) -> Vec<Track> {
        (0..size)
            .map(|index| Track {
                id: format!("track-{index}"),
                audio: format!("https://cdn.example/{index}.mp3"),
                title: format!("Title {index}"),
                artists: vec![format!("Artist {index}")],
            })
            .collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    /// Play the ongoing round to completion and return its reveal.
    fn play_round(game: &mut Game, number: u32) -> RoundEnd {
        game.data_for_round_start().unwrap();
        game.data_for_round_end(number).unwrap()
    }

    #[test]
    fn construction_generates_round_one() {
        let game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();
        assert_eq!(game.ongoing_round().round_number(), 1);
        assert_eq!(game.ongoing_round().phase(), RoundPhase::Pending);
        assert!(game.played_tracks().is_empty());
        assert!(game.rounds().is_empty());
    }

    #[test]
    fn construction_fails_on_tiny_pool() {
        let err = Game::new(pool(3), 5, 4, &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::NoAnswerAvailable(4)));
    }

    #[test]
    fn start_payload_offers_answer_without_revealing_it() {
        let mut game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();
        let start = game.data_for_round_start().unwrap();
        assert_eq!(start.round_number, 1);
        assert_eq!(start.options.len(), 4);

        let end = game.data_for_round_end(1).unwrap();
        assert!(start.options.contains(&end.answer_track.title));
        assert_eq!(start.audio, end.answer_track.audio);

        // Nothing in the start payload names the answer or its position.
        let rendered = serde_json::to_string(&start).unwrap();
        assert!(!rendered.contains(&end.answer_track.id));
        for artist in &end.answer_track.artists {
            assert!(!rendered.contains(artist.as_str()));
        }
    }

    #[test]
    fn seeded_rng_yields_reproducible_options() {
        let first = Game::new(pool(24), 5, 4, &mut rng())
            .unwrap()
            .data_for_round_start()
            .unwrap();
        let second = Game::new(pool(24), 5, 4, &mut rng())
            .unwrap()
            .data_for_round_start()
            .unwrap();
        assert_eq!(first.options, second.options);
        assert_eq!(first.audio, second.audio);
    }

    #[test]
    fn answers_never_repeat_across_the_match() {
        let mut game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();
        let mut answers = HashSet::new();

        for number in 1..=5u32 {
            let end = play_round(&mut game, number);
            assert!(answers.insert(end.answer_track.id.clone()));
            if number < 5 {
                game.next_round(number + 1, &mut rng()).unwrap();
            }
        }

        assert_eq!(game.played_tracks().len(), game.rounds().len());
    }

    #[test]
    fn round_numbers_are_gapless_and_guarded() {
        let mut game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();
        play_round(&mut game, 1);

        // Re-transmitted or skipped signals are rejected.
        assert!(matches!(
            game.next_round(1, &mut rng()),
            Err(ServiceError::RoundSequence {
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            game.next_round(3, &mut rng()),
            Err(ServiceError::RoundSequence {
                expected: 2,
                got: 3
            })
        ));

        let start = game.next_round(2, &mut rng()).unwrap();
        assert_eq!(start.round_number, 2);
        assert_eq!(
            game.rounds().keys().copied().collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    fn next_round_requires_a_closed_round() {
        let mut game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();
        game.data_for_round_start().unwrap();
        assert!(matches!(
            game.next_round(2, &mut rng()),
            Err(ServiceError::RoundNotOngoing(1))
        ));
    }

    #[test]
    fn round_end_checks_number_and_phase() {
        let mut game = Game::new(pool(24), 5, 4, &mut rng()).unwrap();

        // Ending before the start payload was issued is rejected.
        assert!(matches!(
            game.data_for_round_end(1),
            Err(ServiceError::RoundNotOngoing(1))
        ));

        game.data_for_round_start().unwrap();
        assert!(matches!(
            game.data_for_round_end(2),
            Err(ServiceError::RoundMismatch {
                expected: 1,
                got: 2
            })
        ));

        game.data_for_round_end(1).unwrap();
        assert!(matches!(
            game.data_for_round_end(1),
            Err(ServiceError::RoundNotOngoing(1))
        ));
    }

    #[test]
    fn exhaustion_archives_the_final_round() {
        // Five tracks cover round 1 and, with its answer excluded, exactly
        // one more draw; round 3 cannot be generated.
        let mut game = Game::new(pool(5), 5, 4, &mut rng()).unwrap();
        play_round(&mut game, 1);
        game.next_round(2, &mut rng()).unwrap();
        let final_answer = play_round(&mut game, 2).answer_track;

        let err = game.next_round(3, &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::NoAnswerAvailable(4)));

        // Both completed rounds are on the books, the last one included.
        assert_eq!(
            game.rounds().keys().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(game.played_tracks().len(), game.rounds().len());
        assert!(game.played_tracks().contains(&final_answer.id));
    }

    #[test]
    fn shared_titles_stay_in_the_option_set() {
        // Four tracks, all named the same; the draw keeps every occurrence.
        let tracks: Vec<Track> = (0..4)
            .map(|index| Track {
                id: format!("dup-{index}"),
                audio: format!("https://cdn.example/dup-{index}.mp3"),
                title: "One Hit Wonder".into(),
                artists: vec!["Covers Inc".into()],
            })
            .collect();

        let mut game = Game::new(tracks, 5, 4, &mut rng()).unwrap();
        let start = game.data_for_round_start().unwrap();
        assert_eq!(start.options.len(), 4);
        assert!(start.options.iter().all(|title| title == "One Hit Wonder"));
    }
}

