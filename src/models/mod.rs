use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::voting::MethodId;

// Application limits
pub const CANDIDATE_NUM_MAX: usize = 30;
pub const WINNER_NUM_MAX: usize = CANDIDATE_NUM_MAX - 1;
pub const SCORE_MAX: i32 = 5;
pub const DESCRIPTION_LEN_MAX: usize = 200;
pub const CANDIDATE_NAME_LEN_MAX: usize = 100;

/// Shape of the ballots an election accepts. Always derived from the voting method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotType {
    Single,
    Score,
    Rank,
}

impl BallotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallotType::Single => "single",
            BallotType::Score => "score",
            BallotType::Rank => "rank",
        }
    }

    pub fn parse(s: &str) -> Option<BallotType> {
        match s {
            "single" => Some(BallotType::Single),
            "score" => Some(BallotType::Score),
            "rank" => Some(BallotType::Rank),
            _ => None,
        }
    }
}

impl fmt::Display for BallotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Setup problems: bad election definitions and method requests that cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Number of winners must be less than the number of candidates ({num_winners} >= {num_candidates}).")]
    TooManyWinners { num_winners: usize, num_candidates: usize },
    #[error("Number of winners must be between 1 and {max}, got {num_winners}.")]
    WinnersOutOfRange { num_winners: usize, max: usize },
    #[error("Number of candidates must be between 2 and {max}, got {num_candidates}.")]
    CandidatesOutOfRange { num_candidates: usize, max: usize },
    #[error("Candidate name cannot be empty.")]
    EmptyCandidateName,
    #[error("Candidate name is too long: {0}")]
    CandidateNameTooLong(String),
    #[error("No duplicate candidate names allowed ({0}).")]
    DuplicateCandidateName(String),
    #[error("Poll question cannot be empty.")]
    EmptyDescription,
    #[error("Poll question is longer than {max} characters.")]
    DescriptionTooLong { max: usize },
    #[error("Unknown voting method: {0}")]
    UnknownMethod(String),
    #[error("Method {method} needs {expected} ballots but this election collects {actual} ballots.")]
    BallotTypeMismatch {
        method: String,
        expected: BallotType,
        actual: BallotType,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: i64,
    pub method: MethodId,
    pub num_winners: usize,
    pub num_candidates: usize,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

impl Election {
    pub fn ballot_type(&self) -> BallotType {
        self.method.ballot_type()
    }

    pub fn method_name(&self) -> &'static str {
        self.method.info().display_name
    }
}

impl fmt::Display for Election {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.id, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub election_id: i64,
    pub name: String,
}

/// An election definition that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewElection {
    pub description: String,
    pub method: MethodId,
    pub num_winners: usize,
    pub candidates: Vec<String>,
}

impl NewElection {
    pub fn new(
        description: String,
        method: MethodId,
        num_winners: usize,
        candidates: Vec<String>,
    ) -> Self {
        Self {
            description,
            method,
            num_winners,
            candidates,
        }
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Checks the setup invariants and returns the trimmed candidate names.
    pub fn validate(&self) -> Result<Vec<String>, ConfigurationError> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ConfigurationError::EmptyDescription);
        }
        if description.chars().count() > DESCRIPTION_LEN_MAX {
            return Err(ConfigurationError::DescriptionTooLong {
                max: DESCRIPTION_LEN_MAX,
            });
        }

        let num_candidates = self.num_candidates();
        if !(2..=CANDIDATE_NUM_MAX).contains(&num_candidates) {
            return Err(ConfigurationError::CandidatesOutOfRange {
                num_candidates,
                max: CANDIDATE_NUM_MAX,
            });
        }
        check_num_winners(self.num_winners, num_candidates)?;

        let mut used = HashSet::new();
        let mut names = Vec::with_capacity(num_candidates);
        for raw in &self.candidates {
            let name = raw.trim();
            if name.is_empty() {
                return Err(ConfigurationError::EmptyCandidateName);
            }
            if name.chars().count() > CANDIDATE_NAME_LEN_MAX {
                return Err(ConfigurationError::CandidateNameTooLong(name.to_string()));
            }
            if !used.insert(name.to_string()) {
                return Err(ConfigurationError::DuplicateCandidateName(name.to_string()));
            }
            names.push(name.to_string());
        }
        Ok(names)
    }
}

/// `1 <= num_winners < num_candidates`, and never above `WINNER_NUM_MAX`.
pub fn check_num_winners(num_winners: usize, num_candidates: usize) -> Result<(), ConfigurationError> {
    if num_winners == 0 || num_winners > WINNER_NUM_MAX {
        return Err(ConfigurationError::WinnersOutOfRange {
            num_winners,
            max: WINNER_NUM_MAX,
        });
    }
    if num_winners >= num_candidates {
        return Err(ConfigurationError::TooManyWinners {
            num_winners,
            num_candidates,
        });
    }
    Ok(())
}

/// Who is casting a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VoterIdentity {
    Registered(String),
    /// Stored under the configured anonymous identity. Every anonymous submission gets its own voter.
    Anonymous,
}

impl fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoterIdentity::Registered(name) => f.write_str(name),
            VoterIdentity::Anonymous => f.write_str("<anonymous>"),
        }
    }
}

/// One stored (voter, candidate, value) record, as read back from the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallotRow {
    pub voter_id: i64,
    pub candidate_id: i64,
    pub value: f64,
}

/// Summary line used by election listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub election: Election,
    pub voter_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_election(num_winners: usize, names: &[&str]) -> NewElection {
        NewElection::new(
            "Favorite book?".to_string(),
            MethodId::Irv,
            num_winners,
            names.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn winners_must_be_fewer_than_candidates() {
        let e = new_election(3, &["a", "b", "c"]);
        assert_eq!(
            e.validate(),
            Err(ConfigurationError::TooManyWinners {
                num_winners: 3,
                num_candidates: 3
            })
        );
        assert!(new_election(2, &["a", "b", "c"]).validate().is_ok());
    }

    #[test]
    fn zero_winners_rejected() {
        let e = new_election(0, &["a", "b"]);
        assert!(matches!(
            e.validate(),
            Err(ConfigurationError::WinnersOutOfRange { .. })
        ));
    }

    #[test]
    fn candidate_names_are_trimmed_and_unique() {
        let e = new_election(1, &[" Apples ", "Bananas"]);
        assert_eq!(e.validate().unwrap(), vec!["Apples", "Bananas"]);

        let dup = new_election(1, &["Apples", " Apples"]);
        assert_eq!(
            dup.validate(),
            Err(ConfigurationError::DuplicateCandidateName("Apples".to_string()))
        );

        let empty = new_election(1, &["Apples", "  "]);
        assert_eq!(empty.validate(), Err(ConfigurationError::EmptyCandidateName));
    }

    #[test]
    fn candidate_count_bounds() {
        let e = new_election(1, &["only"]);
        assert!(matches!(
            e.validate(),
            Err(ConfigurationError::CandidatesOutOfRange { .. })
        ));
        let names: Vec<String> = (0..=CANDIDATE_NUM_MAX).map(|i| format!("c{}", i)).collect();
        let too_many = NewElection::new("q".to_string(), MethodId::Score, 1, names);
        assert!(matches!(
            too_many.validate(),
            Err(ConfigurationError::CandidatesOutOfRange { .. })
        ));
    }

    #[test]
    fn ballot_type_follows_method() {
        let e = Election {
            id: 1,
            method: MethodId::Star,
            num_winners: 1,
            num_candidates: 3,
            description: "q".to_string(),
            published_at: Utc::now(),
        };
        assert_eq!(e.ballot_type(), BallotType::Score);
        assert_eq!(e.to_string(), "1. q");
    }
}
