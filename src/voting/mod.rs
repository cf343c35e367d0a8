pub mod pairwise;
pub mod plurality;
pub mod ranked;
pub mod star;

use crate::models::BallotType;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Voting methods known to the application. The serialized key is the one stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodId {
    Plurality,
    Irv,
    IrvStv,
    StvGregory,
    RankedPairs,
    SmithMinimax,
    Borda,
    TopTwo,
    Copeland,
    Black,
    Score,
    Star,
    SmithScore,
    MajJudge,
    Rrw,
    SeqMonroe,
}

/// Summary views a method's results can be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewKind {
    Tally,
    AverageScore,
    StarRunoff,
    Rounds,
    Margins,
    Runoff,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub id: MethodId,
    pub key: &'static str,
    pub display_name: &'static str,
    pub category: BallotType,
    pub views: &'static [ViewKind],
}

pub static METHODS: &[MethodInfo] = &[
    MethodInfo {
        id: MethodId::Plurality,
        key: "plurality",
        display_name: "First Past the Post",
        category: BallotType::Single,
        views: &[ViewKind::Tally],
    },
    MethodInfo {
        id: MethodId::Irv,
        key: "irv",
        display_name: "Instant Runoff",
        category: BallotType::Rank,
        views: &[ViewKind::Rounds],
    },
    MethodInfo {
        id: MethodId::IrvStv,
        key: "irv_stv",
        display_name: "Single Transferable Vote // Hare",
        category: BallotType::Rank,
        views: &[ViewKind::Rounds],
    },
    MethodInfo {
        id: MethodId::StvGregory,
        key: "stv_gregory",
        display_name: "Single Transferable Vote // Gregory",
        category: BallotType::Rank,
        views: &[],
    },
    MethodInfo {
        id: MethodId::RankedPairs,
        key: "ranked_pairs",
        display_name: "Ranked Pairs",
        category: BallotType::Rank,
        views: &[ViewKind::Margins],
    },
    MethodInfo {
        id: MethodId::SmithMinimax,
        key: "smith_minimax",
        display_name: "Smith//Minimax",
        category: BallotType::Rank,
        views: &[ViewKind::Margins],
    },
    MethodInfo {
        id: MethodId::Borda,
        key: "borda",
        display_name: "Borda",
        category: BallotType::Rank,
        views: &[ViewKind::Tally],
    },
    MethodInfo {
        id: MethodId::TopTwo,
        key: "top_two",
        display_name: "Top Two Automatic Runoff",
        category: BallotType::Rank,
        views: &[ViewKind::Tally, ViewKind::Runoff],
    },
    MethodInfo {
        id: MethodId::Copeland,
        key: "copeland",
        display_name: "Copeland",
        category: BallotType::Rank,
        views: &[],
    },
    MethodInfo {
        id: MethodId::Black,
        key: "black",
        display_name: "Black",
        category: BallotType::Rank,
        views: &[],
    },
    MethodInfo {
        id: MethodId::Score,
        key: "score",
        display_name: "Score",
        category: BallotType::Score,
        views: &[ViewKind::AverageScore],
    },
    MethodInfo {
        id: MethodId::Star,
        key: "star",
        display_name: "STAR (Score then Automatic Runoff)",
        category: BallotType::Score,
        views: &[ViewKind::AverageScore, ViewKind::StarRunoff],
    },
    MethodInfo {
        id: MethodId::SmithScore,
        key: "smith_score",
        display_name: "Smith//Score",
        category: BallotType::Score,
        views: &[ViewKind::Margins],
    },
    MethodInfo {
        id: MethodId::MajJudge,
        key: "maj_judge",
        display_name: "Majority Judgment",
        category: BallotType::Score,
        views: &[],
    },
    MethodInfo {
        id: MethodId::Rrw,
        key: "rrw",
        display_name: "Reweighted Range",
        category: BallotType::Score,
        views: &[],
    },
    MethodInfo {
        id: MethodId::SeqMonroe,
        key: "seq_monroe",
        display_name: "Sequential Monroe",
        category: BallotType::Score,
        views: &[],
    },
];

impl MethodId {
    pub fn info(&self) -> &'static MethodInfo {
        METHODS
            .iter()
            .find(|m| m.id == *self)
            .unwrap_or_else(|| unreachable!("method {:?} missing from METHODS", self))
    }

    pub fn key(&self) -> &'static str {
        self.info().key
    }

    pub fn ballot_type(&self) -> BallotType {
        self.info().category
    }

    /// Looks a method up by its key ("irv") or its display name ("Instant Runoff").
    pub fn parse(s: &str) -> Option<MethodId> {
        let s = s.trim();
        METHODS
            .iter()
            .find(|m| m.key.eq_ignore_ascii_case(s) || m.display_name.eq_ignore_ascii_case(s))
            .map(|m| m.id)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().display_name)
    }
}

/// Methods collecting the given kind of ballot, in table order.
pub fn methods_for(category: BallotType) -> impl Iterator<Item = &'static MethodInfo> {
    METHODS.iter().filter(move |m| m.category == category)
}

/// A named numeric output of an evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series {
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
    Indices(Vec<usize>),
}

impl Series {
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Series::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            Series::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_indices(&self) -> Option<&[usize]> {
        match self {
            Series::Indices(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Series::Vector(v) => write!(f, "{:?}", v),
            Series::Indices(i) => write!(f, "{:?}", i),
            Series::Matrix(m) => {
                for row in m {
                    writeln!(f, "{:?}", row)?;
                }
                Ok(())
            }
        }
    }
}

/// What an evaluator hands back: winning and tied column indices plus its named series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub winners: Vec<usize>,
    pub ties: Vec<usize>,
    pub output: BTreeMap<String, Series>,
}

impl Evaluation {
    pub(crate) fn new(winners: Vec<usize>, ties: Vec<usize>) -> Self {
        Self {
            winners,
            ties,
            output: BTreeMap::new(),
        }
    }

    pub(crate) fn with(mut self, key: &str, series: Series) -> Self {
        self.output.insert(key.to_string(), series);
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluatorError {
    #[error("{0} is not supported by this evaluator")]
    Unsupported(MethodId),
    #[error("{method} elects a single winner, {num_winners} requested")]
    SingleWinnerOnly { method: MethodId, num_winners: usize },
    #[error("ballot matrix is empty")]
    EmptyMatrix,
    #[error("ballot matrix row {row} has {actual} columns, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("evaluator output is malformed: {0}")]
    MalformedOutput(String),
}

/// Runs a voting method over a `voters x candidates` ballot matrix.
pub trait Evaluator {
    fn evaluate(
        &self,
        matrix: &[Vec<f64>],
        method: MethodId,
        num_winners: usize,
    ) -> Result<Evaluation, EvaluatorError>;
}

/// The evaluator shipped with the application.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceEvaluator;

impl Evaluator for ReferenceEvaluator {
    fn evaluate(
        &self,
        matrix: &[Vec<f64>],
        method: MethodId,
        num_winners: usize,
    ) -> Result<Evaluation, EvaluatorError> {
        let num_candidates = check_matrix(matrix)?;
        debug!(
            "Evaluating {} ballots over {} candidates with {:?}, {} winner(s)",
            matrix.len(),
            num_candidates,
            method,
            num_winners
        );

        let single_winner = |method: MethodId| {
            if num_winners == 1 {
                Ok(())
            } else {
                Err(EvaluatorError::SingleWinnerOnly {
                    method,
                    num_winners,
                })
            }
        };

        match method {
            MethodId::Plurality => Ok(plurality::calculate_results(matrix, num_winners)),
            MethodId::Irv | MethodId::IrvStv => Ok(ranked::instant_runoff(matrix, num_winners)),
            MethodId::Borda => Ok(ranked::borda(matrix, num_winners)),
            MethodId::TopTwo => {
                single_winner(method)?;
                Ok(ranked::top_two(matrix))
            }
            MethodId::Score => Ok(star::score(matrix, num_winners)),
            MethodId::Star => {
                single_winner(method)?;
                Ok(star::star(matrix))
            }
            MethodId::RankedPairs => {
                single_winner(method)?;
                Ok(pairwise::ranked_pairs(matrix))
            }
            MethodId::SmithMinimax => {
                single_winner(method)?;
                Ok(pairwise::smith_minimax(matrix))
            }
            MethodId::Copeland => Ok(pairwise::copeland(matrix, num_winners)),
            MethodId::Black => {
                single_winner(method)?;
                Ok(pairwise::black(matrix))
            }
            MethodId::SmithScore => {
                single_winner(method)?;
                Ok(pairwise::smith_score(matrix))
            }
            MethodId::StvGregory | MethodId::MajJudge | MethodId::Rrw | MethodId::SeqMonroe => {
                Err(EvaluatorError::Unsupported(method))
            }
        }
    }
}

fn check_matrix(matrix: &[Vec<f64>]) -> Result<usize, EvaluatorError> {
    let first = matrix.first().ok_or(EvaluatorError::EmptyMatrix)?;
    let expected = first.len();
    if expected == 0 {
        return Err(EvaluatorError::EmptyMatrix);
    }
    for (row, ballot) in matrix.iter().enumerate() {
        if ballot.len() != expected {
            return Err(EvaluatorError::RaggedMatrix {
                row,
                expected,
                actual: ballot.len(),
            });
        }
    }
    Ok(expected)
}

/// Column sums of the ballot matrix.
pub(crate) fn column_sums(matrix: &[Vec<f64>]) -> Vec<f64> {
    let width = matrix.first().map_or(0, |row| row.len());
    let mut sums = vec![0.0; width];
    for row in matrix {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += value;
        }
    }
    sums
}

/// Picks the `n` best candidates by tally.
///
/// Candidates sharing the tally at the cut-off are all returned as ties when they do not all fit,
/// in which case fewer than `n` winners come back. Both lists are ordered by decreasing tally.
pub(crate) fn top_n(tally: &[f64], n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..tally.len()).collect();
    order.sort_by(|&a, &b| {
        tally[b]
            .partial_cmp(&tally[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    if n == 0 || order.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let cutoff = tally[order[n.min(order.len()) - 1]];
    let mut winners: Vec<usize> = order.iter().copied().filter(|&i| tally[i] > cutoff).collect();
    let at_cutoff: Vec<usize> = order.iter().copied().filter(|&i| tally[i] == cutoff).collect();
    if winners.len() + at_cutoff.len() <= n {
        winners.extend(at_cutoff);
        (winners, Vec::new())
    } else {
        (winners, at_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_has_a_unique_key() {
        for (i, a) in METHODS.iter().enumerate() {
            for b in &METHODS[i + 1..] {
                assert_ne!(a.key, b.key);
                assert_ne!(a.id, b.id);
            }
            assert_eq!(a.id.info().key, a.key);
        }
    }

    #[test]
    fn parse_by_key_or_name() {
        assert_eq!(MethodId::parse("irv"), Some(MethodId::Irv));
        assert_eq!(MethodId::parse("Instant Runoff"), Some(MethodId::Irv));
        assert_eq!(MethodId::parse("smith//score"), Some(MethodId::SmithScore));
        assert_eq!(MethodId::parse("nope"), None);
    }

    #[test]
    fn serialized_key_matches_table() {
        for m in METHODS {
            let json = serde_json::to_string(&m.id).unwrap();
            assert_eq!(json, format!("\"{}\"", m.key));
        }
    }

    #[test]
    fn categories() {
        assert_eq!(MethodId::Plurality.ballot_type(), BallotType::Single);
        assert_eq!(MethodId::TopTwo.ballot_type(), BallotType::Rank);
        assert_eq!(MethodId::Star.ballot_type(), BallotType::Score);
        assert_eq!(methods_for(BallotType::Single).count(), 1);
    }

    #[test]
    fn top_n_reports_boundary_ties() {
        assert_eq!(top_n(&[40.0, 30.0, 20.0, 10.0], 1), (vec![0], vec![]));
        assert_eq!(top_n(&[10.0, 30.0, 30.0], 1), (vec![], vec![1, 2]));
        assert_eq!(top_n(&[10.0, 30.0, 30.0], 2), (vec![1, 2], vec![]));
        assert_eq!(top_n(&[50.0, 30.0, 30.0, 1.0], 2), (vec![0], vec![1, 2]));
    }

    #[test]
    fn ragged_matrix_rejected() {
        let m = vec![vec![1.0, 0.0], vec![1.0]];
        assert_eq!(
            ReferenceEvaluator.evaluate(&m, MethodId::Plurality, 1),
            Err(EvaluatorError::RaggedMatrix {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            ReferenceEvaluator.evaluate(&[], MethodId::Plurality, 1),
            Err(EvaluatorError::EmptyMatrix)
        );
    }

    #[test]
    fn unsupported_and_single_winner_methods() {
        let m = vec![vec![5.0, 1.0, 0.0]];
        assert_eq!(
            ReferenceEvaluator.evaluate(&m, MethodId::MajJudge, 1),
            Err(EvaluatorError::Unsupported(MethodId::MajJudge))
        );
        assert_eq!(
            ReferenceEvaluator.evaluate(&m, MethodId::Star, 2),
            Err(EvaluatorError::SingleWinnerOnly {
                method: MethodId::Star,
                num_winners: 2
            })
        );
    }
}
