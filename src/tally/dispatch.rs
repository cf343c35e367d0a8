use crate::models::{check_num_winners, BallotType, ConfigurationError, Election};
use crate::voting::{MethodId, MethodInfo};
use log::debug;

/// Optional overrides for recomputing results with another method or seat count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodRequest {
    pub method: Option<MethodId>,
    pub num_winners: Option<usize>,
}

impl MethodRequest {
    pub fn new(method: Option<MethodId>, num_winners: Option<usize>) -> Self {
        Self {
            method,
            num_winners,
        }
    }
}

/// The method and winner count an evaluation will run with.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    pub method: &'static MethodInfo,
    pub num_winners: usize,
}

/// Resolves the request against the election's configuration.
///
/// The method's ballot category has to match the matrix it will be run on.
pub fn dispatch(
    election: &Election,
    matrix_type: BallotType,
    request: &MethodRequest,
) -> Result<Dispatch, ConfigurationError> {
    let method = request.method.unwrap_or(election.method).info();
    if method.category != matrix_type {
        return Err(ConfigurationError::BallotTypeMismatch {
            method: method.display_name.to_string(),
            expected: method.category,
            actual: matrix_type,
        });
    }

    let num_winners = request.num_winners.unwrap_or(election.num_winners);
    check_num_winners(num_winners, election.num_candidates)?;

    debug!(
        "Election {}: dispatching to {} with {} winner(s)",
        election.id, method.key, num_winners
    );
    Ok(Dispatch {
        method,
        num_winners,
    })
}
