use crate::voting::{column_sums, top_n, Evaluation, Series};
use std::cmp::Ordering;

/// Score voting: highest total score wins.
pub fn score(matrix: &[Vec<f64>], num_winners: usize) -> Evaluation {
    let tally = column_sums(matrix);
    let (winners, ties) = top_n(&tally, num_winners);
    Evaluation::new(winners, ties).with("tally", Series::Vector(tally))
}

/// STAR: the two highest scoring candidates go to an automatic runoff decided by how many voters
/// scored one above the other. A tied runoff goes to the higher total score.
///
/// Candidates level on total score are seeded in column order, so when several tie for a runoff
/// spot the earliest one takes it.
pub fn star(matrix: &[Vec<f64>]) -> Evaluation {
    // Step 1: Calculate total scores for each option
    let tally = column_sums(matrix);

    let mut sorted: Vec<usize> = (0..tally.len()).collect();
    sorted.sort_by(|&a, &b| {
        tally[b]
            .partial_cmp(&tally[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    // With fewer than two candidates there is no runoff
    if sorted.len() < 2 {
        return Evaluation::new(sorted, Vec::new()).with("tally", Series::Vector(tally));
    }

    // Step 2: Runoff between top two candidates
    let (finalist1, finalist2) = (sorted[0], sorted[1]);
    let mut prefer_finalist1 = 0.0;
    let mut prefer_finalist2 = 0.0;
    for ballot in matrix {
        let score1 = ballot[finalist1];
        let score2 = ballot[finalist2];
        if score1 > score2 {
            prefer_finalist1 += 1.0;
        } else if score2 > score1 {
            prefer_finalist2 += 1.0;
        }
        // If scores are equal, it's a tie for this voter
    }

    let by_runoff = prefer_finalist1.partial_cmp(&prefer_finalist2);
    let by_score = tally[finalist1].partial_cmp(&tally[finalist2]);
    let (winners, ties) = match (by_runoff, by_score) {
        (Some(Ordering::Greater), _) => (vec![finalist1], Vec::new()),
        (Some(Ordering::Less), _) => (vec![finalist2], Vec::new()),
        (_, Some(Ordering::Greater)) => (vec![finalist1], Vec::new()),
        (_, Some(Ordering::Less)) => (vec![finalist2], Vec::new()),
        _ => (Vec::new(), vec![finalist1, finalist2]),
    };

    let runoff_matrix = vec![
        vec![0.0, prefer_finalist1],
        vec![prefer_finalist2, 0.0],
    ];

    Evaluation::new(winners, ties)
        .with("tally", Series::Vector(tally))
        .with(
            "runoff_candidates",
            Series::Indices(vec![finalist1, finalist2]),
        )
        .with("runoff_matrix", Series::Matrix(runoff_matrix))
        .with(
            "runoff_tally",
            Series::Vector(vec![prefer_finalist1, prefer_finalist2]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_totals() {
        let m = vec![vec![5.0, 3.0, 0.0], vec![1.0, 4.0, 2.0]];
        let result = score(&m, 1);
        assert_eq!(result.output["tally"], Series::Vector(vec![6.0, 7.0, 2.0]));
        assert_eq!(result.winners, vec![1]);
    }

    #[test]
    fn star_runoff_can_overturn_scores() {
        // A has the higher total, but more voters prefer B.
        let mut m = vec![vec![5.0, 0.0, 0.0]; 2];
        m.extend(vec![vec![3.0, 4.0, 0.0]; 3]);
        let result = star(&m);
        assert_eq!(result.output["tally"], Series::Vector(vec![19.0, 12.0, 0.0]));
        assert_eq!(
            result.output["runoff_candidates"],
            Series::Indices(vec![0, 1])
        );
        assert_eq!(
            result.output["runoff_matrix"],
            Series::Matrix(vec![vec![0.0, 2.0], vec![3.0, 0.0]])
        );
        assert_eq!(result.winners, vec![1]);
    }

    #[test]
    fn star_runoff_tie_falls_back_to_score() {
        let m = vec![vec![5.0, 4.0, 0.0], vec![0.0, 1.0, 0.0]];
        let result = star(&m);
        // One voter each way in the runoff and equal totals.
        assert!(result.winners.is_empty());
        assert_eq!(result.ties, vec![0, 1]);

        let m = vec![vec![5.0, 3.0, 0.0], vec![0.0, 1.0, 0.0]];
        let result = star(&m);
        assert_eq!(result.winners, vec![0]);
    }

    #[test]
    fn star_second_place_tie_seeds_earliest_column() {
        // B and C both total 6 behind A.
        let m = vec![vec![5.0, 3.0, 3.0], vec![5.0, 3.0, 3.0]];
        let result = star(&m);
        assert_eq!(
            result.output["runoff_candidates"],
            Series::Indices(vec![0, 1])
        );
        assert_eq!(result.winners, vec![0]);
    }
}
