use crate::db::{BallotStore, StoreError};
use crate::models::{BallotType, Candidate, VoterIdentity, SCORE_MAX};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One proposed (candidate, value) pair from a voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub candidate_id: i64,
    pub value: i32,
}

impl Mark {
    pub fn new(candidate_id: i64, value: i32) -> Self {
        Self {
            candidate_id,
            value,
        }
    }
}

/// An accepted ballot. Rank and score ballots hold one mark per candidate, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Ballot {
    Single { candidate_id: i64 },
    Rank { marks: Vec<Mark> },
    Score { marks: Vec<Mark> },
}

impl Ballot {
    pub fn ballot_type(&self) -> BallotType {
        match self {
            Ballot::Single { .. } => BallotType::Single,
            Ballot::Rank { .. } => BallotType::Rank,
            Ballot::Score { .. } => BallotType::Score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Exactly one candidate must be chosen, got {0}.")]
    ChoiceCount(usize),
    #[error("Ranks above \"worst\" cannot be repeated (rank {0}).")]
    RepeatedRank(i32),
    #[error("At least one candidate must be ranked or rated better than worst.")]
    AllWorst,
    #[error("Value {value} for candidate {candidate_id} must be between 0 and {max}.")]
    OutOfRange {
        candidate_id: i64,
        value: i32,
        max: i32,
    },
    #[error("Candidate {0} is not part of this election.")]
    UnknownCandidate(i64),
    #[error("Candidate {0} was marked more than once.")]
    DuplicateCandidate(i64),
}

/// Checks one voter's marks against the election's ballot type and candidates.
pub fn validate(
    ballot_type: BallotType,
    candidates: &[Candidate],
    marks: &[Mark],
) -> Result<Ballot, ValidationError> {
    let known: HashSet<i64> = candidates.iter().map(|c| c.id).collect();
    let mut values: HashMap<i64, i32> = HashMap::new();
    for mark in marks {
        if !known.contains(&mark.candidate_id) {
            return Err(ValidationError::UnknownCandidate(mark.candidate_id));
        }
        if values.insert(mark.candidate_id, mark.value).is_some() {
            return Err(ValidationError::DuplicateCandidate(mark.candidate_id));
        }
    }

    let max = match ballot_type {
        BallotType::Single => 1,
        BallotType::Rank => candidates.len() as i32,
        BallotType::Score => SCORE_MAX,
    };
    for mark in marks {
        if mark.value < 0 || mark.value > max {
            return Err(ValidationError::OutOfRange {
                candidate_id: mark.candidate_id,
                value: mark.value,
                max,
            });
        }
    }

    if ballot_type == BallotType::Single {
        let chosen: Vec<i64> = marks
            .iter()
            .filter(|m| m.value != 0)
            .map(|m| m.candidate_id)
            .collect();
        return match chosen.as_slice() {
            [candidate_id] => Ok(Ballot::Single {
                candidate_id: *candidate_id,
            }),
            _ => Err(ValidationError::ChoiceCount(chosen.len())),
        };
    }

    // Candidates left out are worst / zero.
    let filled: Vec<Mark> = candidates
        .iter()
        .map(|c| Mark::new(c.id, values.get(&c.id).copied().unwrap_or(0)))
        .collect();

    if ballot_type == BallotType::Rank {
        let mut used_ranks = HashSet::new();
        for mark in filled.iter().filter(|m| m.value != 0) {
            if !used_ranks.insert(mark.value) {
                return Err(ValidationError::RepeatedRank(mark.value));
            }
        }
    }

    // Applies to score ballots too, see DESIGN.md.
    if filled.iter().all(|m| m.value == 0) {
        return Err(ValidationError::AllWorst);
    }

    Ok(match ballot_type {
        BallotType::Rank => Ballot::Rank { marks: filled },
        _ => Ballot::Score { marks: filled },
    })
}

/// Validates and stores one voter's ballot.
///
/// Registered voters who already have ballots in the election are turned away before anything
/// is written; the store repeats that check inside its write transaction.
pub async fn submit_ballot<S>(
    store: &S,
    identity: &VoterIdentity,
    election_id: i64,
    marks: &[Mark],
) -> Result<Ballot, StoreError>
where
    S: BallotStore + ?Sized,
{
    let election = store.get_election(election_id).await?;
    let candidates = store.get_candidates(election_id).await?;

    if store.has_voted(election_id, identity).await? {
        warn!("{} already voted in election {}", identity, election_id);
        return Err(StoreError::AlreadyVoted(identity.to_string()));
    }

    let ballot = validate(election.ballot_type(), &candidates, marks)?;
    info!(
        "Recording {} ballot: election_id={}, voter={}",
        ballot.ballot_type(),
        election_id,
        identity
    );
    store.write_ballots(identity, election_id, &ballot).await?;
    Ok(ballot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(n: i64) -> Vec<Candidate> {
        (1..=n)
            .map(|id| Candidate {
                id,
                election_id: 7,
                name: format!("c{}", id),
            })
            .collect()
    }

    fn marks(values: &[i32]) -> Vec<Mark> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Mark::new(i as i64 + 1, *v))
            .collect()
    }

    #[test]
    fn single_requires_exactly_one_choice() {
        let c = candidates(3);
        assert_eq!(
            validate(BallotType::Single, &c, &[Mark::new(2, 1)]),
            Ok(Ballot::Single { candidate_id: 2 })
        );
        assert_eq!(
            validate(BallotType::Single, &c, &[]),
            Err(ValidationError::ChoiceCount(0))
        );
        assert_eq!(
            validate(BallotType::Single, &c, &marks(&[1, 1, 0])),
            Err(ValidationError::ChoiceCount(2))
        );
    }

    #[test]
    fn rank_zero_may_repeat() {
        let c = candidates(4);
        let ballot = validate(BallotType::Rank, &c, &marks(&[1, 0, 2, 0])).unwrap();
        assert_eq!(
            ballot,
            Ballot::Rank {
                marks: marks(&[1, 0, 2, 0])
            }
        );
    }

    #[test]
    fn rank_nonzero_must_not_repeat() {
        let c = candidates(4);
        assert_eq!(
            validate(BallotType::Rank, &c, &marks(&[1, 2, 2, 0])),
            Err(ValidationError::RepeatedRank(2))
        );
    }

    #[test]
    fn all_worst_rejected_for_rank_and_score() {
        let c = candidates(3);
        assert_eq!(
            validate(BallotType::Rank, &c, &marks(&[0, 0, 0])),
            Err(ValidationError::AllWorst)
        );
        assert_eq!(
            validate(BallotType::Score, &c, &marks(&[0, 0, 0])),
            Err(ValidationError::AllWorst)
        );
        assert_eq!(
            validate(BallotType::Score, &c, &[]),
            Err(ValidationError::AllWorst)
        );
    }

    #[test]
    fn score_allows_duplicates() {
        let c = candidates(3);
        let ballot = validate(BallotType::Score, &c, &marks(&[5, 5, 0])).unwrap();
        assert_eq!(ballot.ballot_type(), BallotType::Score);
    }

    #[test]
    fn missing_candidates_default_to_zero() {
        let c = candidates(3);
        let ballot = validate(BallotType::Score, &c, &[Mark::new(3, 4)]).unwrap();
        assert_eq!(
            ballot,
            Ballot::Score {
                marks: marks(&[0, 0, 4])
            }
        );
    }

    #[test]
    fn ranges() {
        let c = candidates(3);
        assert_eq!(
            validate(BallotType::Score, &c, &marks(&[6, 0, 0])),
            Err(ValidationError::OutOfRange {
                candidate_id: 1,
                value: 6,
                max: SCORE_MAX
            })
        );
        assert!(validate(BallotType::Rank, &c, &marks(&[3, 1, 2])).is_ok());
        assert!(matches!(
            validate(BallotType::Rank, &c, &marks(&[4, 1, 2])),
            Err(ValidationError::OutOfRange { value: 4, .. })
        ));
        assert!(matches!(
            validate(BallotType::Rank, &c, &marks(&[-1, 1, 2])),
            Err(ValidationError::OutOfRange { value: -1, .. })
        ));
    }

    #[test]
    fn unknown_and_duplicate_candidates() {
        let c = candidates(2);
        assert_eq!(
            validate(BallotType::Score, &c, &[Mark::new(9, 1)]),
            Err(ValidationError::UnknownCandidate(9))
        );
        assert_eq!(
            validate(BallotType::Score, &c, &[Mark::new(1, 1), Mark::new(1, 2)]),
            Err(ValidationError::DuplicateCandidate(1))
        );
    }
}
