use crate::voting::{top_n, Evaluation, Series};

/// First past the post over a single-choice ballot matrix.
///
/// Every voter's marked candidate gets their vote. A row carrying several marks splits the vote
/// evenly among them; an empty row counts for nobody.
pub fn calculate_results(matrix: &[Vec<f64>], num_winners: usize) -> Evaluation {
    let width = matrix.first().map_or(0, |row| row.len());
    let mut tally = vec![0.0; width];

    for ballot in matrix {
        let marked: Vec<usize> = ballot
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0.0)
            .map(|(idx, _)| idx)
            .collect();
        if marked.is_empty() {
            continue;
        }

        let vote_value = 1.0 / marked.len() as f64;
        for idx in marked {
            tally[idx] += vote_value;
        }
    }

    let (winners, ties) = top_n(&tally, num_winners);
    Evaluation::new(winners, ties).with("tally", Series::Vector(tally))
}
