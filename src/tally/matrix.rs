use crate::models::{BallotRow, BallotType};
use crate::tally::TallyError;
use log::{debug, warn};
use std::collections::HashMap;

/// What to do when two stored rows carry a value for the same voter and candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    LastWriteWins,
}

impl DuplicatePolicy {
    pub fn parse(s: &str) -> Option<DuplicatePolicy> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(DuplicatePolicy::Reject),
            "last-write-wins" | "last_write_wins" => Some(DuplicatePolicy::LastWriteWins),
            _ => None,
        }
    }
}

/// Dense `voters x candidates` ballot matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BallotMatrix {
    pub ballot_type: BallotType,
    pub data: Vec<Vec<f64>>,
    /// Voter id of each row, in order of first appearance.
    pub voter_ids: Vec<i64>,
    /// Candidate id of each column, in candidate order.
    pub candidate_ids: Vec<i64>,
}

impl BallotMatrix {
    pub fn voter_count(&self) -> usize {
        self.voter_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builds the ballot matrix of one election from its stored rows.
///
/// Cells no row writes to stay 0. Values are copied as stored, never summed.
pub fn build(
    ballot_type: BallotType,
    candidate_ids: &[i64],
    rows: &[BallotRow],
    policy: DuplicatePolicy,
) -> Result<BallotMatrix, TallyError> {
    let mut columns: HashMap<i64, usize> = HashMap::with_capacity(candidate_ids.len());
    let mut ordered_candidates = Vec::with_capacity(candidate_ids.len());
    for id in candidate_ids {
        if !columns.contains_key(id) {
            columns.insert(*id, ordered_candidates.len());
            ordered_candidates.push(*id);
        }
    }
    let width = ordered_candidates.len();

    let mut voter_rows: HashMap<i64, usize> = HashMap::new();
    let mut voter_ids = Vec::new();
    let mut data: Vec<Vec<f64>> = Vec::new();
    let mut written: Vec<Vec<bool>> = Vec::new();

    for row in rows {
        let col = *columns.get(&row.candidate_id).ok_or_else(|| {
            TallyError::DataIntegrity(format!(
                "voter {} has a ballot for candidate {} which is not part of the election",
                row.voter_id, row.candidate_id
            ))
        })?;
        let idx = *voter_rows.entry(row.voter_id).or_insert_with(|| {
            voter_ids.push(row.voter_id);
            data.push(vec![0.0; width]);
            written.push(vec![false; width]);
            data.len() - 1
        });

        if written[idx][col] {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(TallyError::DataIntegrity(format!(
                        "voter {} has more than one ballot row for candidate {}",
                        row.voter_id, row.candidate_id
                    )));
                }
                DuplicatePolicy::LastWriteWins => {
                    warn!(
                        "Duplicate ballot row for voter {} and candidate {}, keeping the last value",
                        row.voter_id, row.candidate_id
                    );
                }
            }
        }
        data[idx][col] = row.value;
        written[idx][col] = true;
    }

    debug!(
        "Built {} ballot matrix: {} voters x {} candidates",
        ballot_type,
        voter_ids.len(),
        width
    );
    Ok(BallotMatrix {
        ballot_type,
        data,
        voter_ids,
        candidate_ids: ordered_candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(voter_id: i64, candidate_id: i64, value: f64) -> BallotRow {
        BallotRow {
            voter_id,
            candidate_id,
            value,
        }
    }

    #[test]
    fn rows_follow_first_appearance_and_columns_follow_candidates() {
        let rows = vec![
            row(20, 3, 1.0),
            row(10, 1, 2.0),
            row(20, 1, 3.0),
            row(10, 3, 1.0),
        ];
        let m = build(BallotType::Rank, &[3, 2, 1], &rows, DuplicatePolicy::Reject).unwrap();
        assert_eq!(m.voter_ids, vec![20, 10]);
        assert_eq!(m.candidate_ids, vec![3, 2, 1]);
        assert_eq!(m.data, vec![vec![1.0, 0.0, 3.0], vec![1.0, 0.0, 2.0]]);
        assert_eq!(m.voter_count(), 2);
        assert_eq!(m.candidate_ids.len(), 3);
    }

    #[test]
    fn repeated_candidate_ids_give_one_column() {
        let m = build(
            BallotType::Single,
            &[1, 2, 1],
            &[row(5, 2, 1.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap();
        assert_eq!(m.candidate_ids, vec![1, 2]);
        assert_eq!(m.data, vec![vec![0.0, 1.0]]);
    }

    #[test]
    fn no_rows_gives_an_empty_matrix() {
        let m = build(BallotType::Score, &[1, 2], &[], DuplicatePolicy::Reject).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.voter_count(), 0);
        assert_eq!(m.candidate_ids.len(), 2);
    }

    #[test]
    fn duplicate_rows() {
        let rows = vec![row(1, 1, 2.0), row(1, 2, 1.0), row(1, 1, 4.0)];
        let err = build(BallotType::Score, &[1, 2], &rows, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(err, TallyError::DataIntegrity(_)));

        let m = build(BallotType::Score, &[1, 2], &rows, DuplicatePolicy::LastWriteWins).unwrap();
        assert_eq!(m.data, vec![vec![4.0, 1.0]]);
    }

    #[test]
    fn unknown_candidate_is_an_integrity_error() {
        let err = build(
            BallotType::Score,
            &[1, 2],
            &[row(1, 9, 1.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, TallyError::DataIntegrity(_)));
    }

    #[test]
    fn building_twice_gives_the_same_matrix() {
        let rows = vec![row(1, 1, 1.0), row(2, 2, 1.0), row(3, 1, 1.0)];
        let a = build(BallotType::Single, &[1, 2], &rows, DuplicatePolicy::Reject).unwrap();
        let b = build(BallotType::Single, &[1, 2], &rows, DuplicatePolicy::Reject).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.voter_count(), 3);
    }

    #[test]
    fn policy_names() {
        assert_eq!(DuplicatePolicy::parse("reject"), Some(DuplicatePolicy::Reject));
        assert_eq!(
            DuplicatePolicy::parse("Last-Write-Wins"),
            Some(DuplicatePolicy::LastWriteWins)
        );
        assert_eq!(DuplicatePolicy::parse("sum"), None);
    }
}
