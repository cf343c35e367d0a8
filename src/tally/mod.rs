pub mod dispatch;
pub mod matrix;
pub mod results;

use crate::ballot::ValidationError;
use crate::db::{BallotStore, StoreError};
use crate::models::{BallotRow, Candidate, ConfigurationError, Election};
use crate::voting::{Evaluator, EvaluatorError};
use dispatch::MethodRequest;
use log::info;
use matrix::DuplicatePolicy;
use results::ElectionResults;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("No voter ballots found for this election!")]
    EmptyData,
    #[error("Stored ballots are inconsistent: {0}")]
    DataIntegrity(String),
    #[error("Evaluation failed: {0}")]
    Evaluator(#[from] EvaluatorError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TallyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => TallyError::Validation(e),
            StoreError::Configuration(e) => TallyError::Configuration(e),
            StoreError::Integrity(msg) => TallyError::DataIntegrity(msg),
            other => TallyError::Store(other),
        }
    }
}

/// Turns the stored ballots of one election into its results.
pub fn tabulate<E>(
    election: &Election,
    candidates: &[Candidate],
    rows: &[BallotRow],
    evaluator: &E,
    request: &MethodRequest,
    policy: DuplicatePolicy,
) -> Result<ElectionResults, TallyError>
where
    E: Evaluator + ?Sized,
{
    if candidates.len() != election.num_candidates {
        return Err(TallyError::DataIntegrity(format!(
            "election {} expects {} candidates, found {}",
            election.id,
            election.num_candidates,
            candidates.len()
        )));
    }

    let candidate_ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
    let matrix = matrix::build(election.ballot_type(), &candidate_ids, rows, policy)?;
    let dispatch = dispatch::dispatch(election, matrix.ballot_type, request)?;
    if matrix.is_empty() {
        return Err(TallyError::EmptyData);
    }

    let names_by_id: HashMap<i64, &str> =
        candidates.iter().map(|c| (c.id, c.name.as_str())).collect();
    let names: Vec<String> = matrix
        .candidate_ids
        .iter()
        .map(|id| names_by_id[id].to_string())
        .collect();

    let evaluation = evaluator.evaluate(&matrix.data, dispatch.method.id, dispatch.num_winners)?;
    let interpretation =
        results::interpret(dispatch.method, &evaluation, &names, matrix.voter_count())?;

    info!(
        "Election {}: {} over {} voters, winners {:?}, ties {:?}",
        election.id,
        dispatch.method.key,
        matrix.voter_count(),
        interpretation.winners,
        interpretation.ties
    );

    Ok(ElectionResults {
        election_id: election.id,
        description: election.description.clone(),
        method: dispatch.method.id,
        method_name: dispatch.method.display_name,
        num_winners: dispatch.num_winners,
        voter_count: matrix.voter_count(),
        candidates: names,
        winners: interpretation.winners,
        ties: interpretation.ties,
        views: interpretation.views,
        output: evaluation.output,
    })
}

/// Reads an election and its ballots from the store and tabulates them.
pub async fn compute_results<S, E>(
    store: &S,
    evaluator: &E,
    election_id: i64,
    request: &MethodRequest,
    policy: DuplicatePolicy,
) -> Result<ElectionResults, TallyError>
where
    S: BallotStore + ?Sized,
    E: Evaluator + ?Sized,
{
    let election = store.get_election(election_id).await?;
    let candidates = store.get_candidates(election_id).await?;
    let rows = store.read_ballots(election_id).await?;
    tabulate(&election, &candidates, &rows, evaluator, request, policy)
}
