use crate::voting::{Evaluation, EvaluatorError, MethodId, MethodInfo, Series, ViewKind};
use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One round of a runoff count, laid out as a waterfall: each candidate's bar continues from
/// where the previous round ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Round {
    pub votes: Vec<f64>,
    pub start: Vec<f64>,
    pub gain: Vec<f64>,
    /// Votes as a share of all voters, in percent.
    pub percent: Vec<f64>,
}

/// A summary of the evaluator output, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    Tally {
        title: &'static str,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Rounds {
        title: &'static str,
        labels: Vec<String>,
        rounds: Vec<Round>,
    },
    /// `margins[i][j]` is how many more voters preferred i over j than j over i. The diagonal is
    /// empty.
    Margins {
        title: &'static str,
        labels: Vec<String>,
        margins: Vec<Vec<Option<f64>>>,
    },
}

impl View {
    pub fn title(&self) -> &'static str {
        match self {
            View::Tally { title, .. } | View::Rounds { title, .. } | View::Margins { title, .. } => {
                *title
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub winners: Vec<String>,
    pub ties: Vec<String>,
    pub views: Vec<View>,
}

/// Everything a front end needs to show the results of one election.
#[derive(Debug, Clone, Serialize)]
pub struct ElectionResults {
    pub election_id: i64,
    pub description: String,
    pub method: MethodId,
    pub method_name: &'static str,
    pub num_winners: usize,
    pub voter_count: usize,
    pub candidates: Vec<String>,
    pub winners: Vec<String>,
    pub ties: Vec<String>,
    pub views: Vec<View>,
    pub output: BTreeMap<String, Series>,
}

impl ElectionResults {
    pub fn winner_text(&self) -> String {
        match self.winners.len() {
            0 => "No winners found.".to_string(),
            1 => format!("Winner is: {}", self.winners[0]),
            _ => format!("Winners are: {}", self.winners.join(", ")),
        }
    }

    pub fn ties_text(&self) -> Option<String> {
        if self.ties.is_empty() {
            None
        } else {
            Some(format!("Tied choices: {}", self.ties.join(", ")))
        }
    }

    /// Every evaluator series as `key = value`.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .map(|(key, series)| match series {
                Series::Matrix(_) => format!("{} =\n{}", key, series),
                _ => format!("{} = {}", key, series),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Maps evaluator indices back to candidate names and builds the method's views.
///
/// `names` are aligned with the ballot matrix columns.
pub fn interpret(
    method: &MethodInfo,
    evaluation: &Evaluation,
    names: &[String],
    voter_count: usize,
) -> Result<Interpretation, EvaluatorError> {
    for idx in evaluation.winners.iter().chain(&evaluation.ties) {
        if *idx >= names.len() {
            return Err(EvaluatorError::MalformedOutput(format!(
                "candidate index {} out of range for {} candidates",
                idx,
                names.len()
            )));
        }
    }

    let tied: HashSet<usize> = evaluation.ties.iter().copied().collect();
    let winners = evaluation
        .winners
        .iter()
        .filter(|idx| !tied.contains(*idx))
        .map(|&idx| names[idx].clone())
        .collect();
    let ties = evaluation
        .ties
        .iter()
        .map(|&idx| names[idx].clone())
        .collect();

    let mut views = Vec::new();
    for kind in method.views {
        match build_view(*kind, &evaluation.output, names, voter_count) {
            Some(view) => views.push(view),
            None => warn!(
                "{}: evaluator output has no usable data for the {:?} view",
                method.key, kind
            ),
        }
    }

    Ok(Interpretation {
        winners,
        ties,
        views,
    })
}

fn build_view(
    kind: ViewKind,
    output: &BTreeMap<String, Series>,
    names: &[String],
    voter_count: usize,
) -> Option<View> {
    match kind {
        ViewKind::Tally => {
            let tally = first_round_tally(output, names.len())?;
            Some(View::Tally {
                title: "Ballot Tally",
                labels: names.to_vec(),
                values: tally.to_vec(),
            })
        }
        ViewKind::AverageScore => {
            let tally = first_round_tally(output, names.len())?;
            let divisor = voter_count.max(1) as f64;
            Some(View::Tally {
                title: "Ballot Average Score",
                labels: names.to_vec(),
                values: tally.iter().map(|total| total / divisor).collect(),
            })
        }
        ViewKind::StarRunoff => {
            let finalists = finalists(output, names.len())?;
            let matrix = output.get("runoff_matrix")?.as_matrix()?;
            if matrix.len() != finalists.len() || matrix.iter().any(|r| r.len() != finalists.len()) {
                return None;
            }
            let values: Vec<f64> = matrix
                .iter()
                .enumerate()
                .map(|(k, row)| {
                    row.iter()
                        .enumerate()
                        .filter(|(l, _)| *l != k)
                        .map(|(_, v)| v)
                        .sum::<f64>()
                })
                .collect();
            Some(View::Tally {
                title: "STAR Runoff Tally",
                labels: finalists.iter().map(|&i| names[i].clone()).collect(),
                values,
            })
        }
        ViewKind::Runoff => {
            let finalists = finalists(output, names.len())?;
            let tally = output.get("runoff_tally")?.as_vector()?;
            if tally.len() != finalists.len() {
                return None;
            }
            Some(View::Tally {
                title: "Runoff Tally",
                labels: finalists.iter().map(|&i| names[i].clone()).collect(),
                values: tally.to_vec(),
            })
        }
        ViewKind::Rounds => {
            let history = output.get("round_history")?.as_matrix()?;
            if history.is_empty() || history.iter().any(|r| r.len() != names.len()) {
                return None;
            }
            Some(View::Rounds {
                title: "Accumulated Votes for Each Round",
                labels: names.to_vec(),
                rounds: waterfall(history, voter_count),
            })
        }
        ViewKind::Margins => {
            let votes = output.get("vote_matrix")?.as_matrix()?;
            if votes.len() != names.len() || votes.iter().any(|r| r.len() != names.len()) {
                return None;
            }
            Some(View::Margins {
                title: "Head-to-Head Vote Margins",
                labels: names.to_vec(),
                margins: margins(votes),
            })
        }
    }
}

// First-round counts when the method reports them separately, final counts otherwise.
fn first_round_tally(output: &BTreeMap<String, Series>, width: usize) -> Option<&[f64]> {
    let tally = output
        .get("first_tally")
        .or_else(|| output.get("tally"))?
        .as_vector()?;
    (tally.len() == width).then_some(tally)
}

fn finalists(output: &BTreeMap<String, Series>, width: usize) -> Option<&[usize]> {
    let finalists = output.get("runoff_candidates")?.as_indices()?;
    (finalists.len() >= 2 && finalists.iter().all(|&i| i < width)).then_some(finalists)
}

fn waterfall(history: &[Vec<f64>], voter_count: usize) -> Vec<Round> {
    let mut reached = vec![0.0; history[0].len()];
    history
        .iter()
        .map(|votes| {
            let start = reached.clone();
            let gain: Vec<f64> = votes
                .iter()
                .zip(&start)
                .map(|(v, s)| (v - s).max(0.0))
                .collect();
            for (r, g) in reached.iter_mut().zip(&gain) {
                *r += g;
            }
            let percent = votes
                .iter()
                .map(|v| {
                    if voter_count == 0 {
                        0.0
                    } else {
                        v * 100.0 / voter_count as f64
                    }
                })
                .collect();
            Round {
                votes: votes.clone(),
                start,
                gain,
                percent,
            }
        })
        .collect()
}

fn margins(votes: &[Vec<f64>]) -> Vec<Vec<Option<f64>>> {
    (0..votes.len())
        .map(|i| {
            (0..votes.len())
                .map(|j| {
                    if i == j {
                        None
                    } else {
                        Some(votes[i][j] - votes[j][i])
                    }
                })
                .collect()
        })
        .collect()
}
