use crate::voting::{top_n, Evaluation, Series};
use log::debug;
use std::cmp::Ordering;

// Rank ballots: 1 is the best rank, 0 means unranked and is worse than any ranked candidate.

/// Sort key for a rank value, lower is better.
pub(crate) fn rank_key(value: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        f64::INFINITY
    }
}

/// Whether the ballot ranks candidate `a` strictly above candidate `b`.
pub(crate) fn prefers(ballot: &[f64], a: usize, b: usize) -> bool {
    rank_key(ballot[a]) < rank_key(ballot[b])
}

// Highest ranked candidate still in the race, if the ballot ranks any of them.
fn first_choice(ballot: &[f64], active: &[bool]) -> Option<usize> {
    ballot
        .iter()
        .enumerate()
        .filter(|(idx, value)| active[*idx] && **value > 0.0)
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .map(|(idx, _)| idx)
}

/// Instant runoff, eliminating from the bottom.
///
/// With one seat the count stops as soon as a candidate holds a majority of the continuing
/// ballots. With more seats it stops once only `num_winners` candidates remain. All candidates
/// sharing the lowest count are eliminated together unless that would leave too few candidates,
/// in which case they are reported as tied.
pub fn instant_runoff(matrix: &[Vec<f64>], num_winners: usize) -> Evaluation {
    let width = matrix.first().map_or(0, |row| row.len());
    let mut active = vec![true; width];
    let mut history: Vec<Vec<f64>> = Vec::new();
    let mut eliminated: Vec<usize> = Vec::new();
    let mut round = 1;

    let (winners, ties) = loop {
        // Count first preferences among the candidates still running
        let mut tally = vec![0.0; width];
        for ballot in matrix {
            if let Some(idx) = first_choice(ballot, &active) {
                tally[idx] += 1.0;
            }
        }
        let continuing: f64 = tally.iter().sum();
        debug!("Round {}: {:?} ({} continuing ballots)", round, tally, continuing);
        history.push(tally.clone());

        let mut remaining: Vec<usize> = (0..width).filter(|&i| active[i]).collect();
        remaining.sort_by(|&a, &b| {
            tally[b]
                .partial_cmp(&tally[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        // Majority winner
        if num_winners == 1 && continuing > 0.0 {
            if let Some(&leader) = remaining.first() {
                if tally[leader] * 2.0 > continuing {
                    break (vec![leader], Vec::new());
                }
            }
        }

        if remaining.len() <= num_winners {
            break (remaining, Vec::new());
        }

        let min_score = remaining
            .iter()
            .map(|&idx| tally[idx])
            .fold(f64::INFINITY, f64::min);
        let lowest: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&idx| tally[idx] == min_score)
            .collect();

        // Unbreakable tie at the bottom
        if remaining.len() - lowest.len() < num_winners {
            let survivors = remaining
                .iter()
                .copied()
                .filter(|&idx| tally[idx] > min_score)
                .collect();
            break (survivors, lowest);
        }

        debug!("Round {}: eliminating {:?}", round, lowest);
        for idx in lowest {
            active[idx] = false;
            eliminated.push(idx);
        }
        round += 1;
    };

    let final_tally = history.last().cloned().unwrap_or_default();
    Evaluation::new(winners, ties)
        .with("tally", Series::Vector(final_tally))
        .with("round_history", Series::Matrix(history))
        .with("eliminated", Series::Indices(eliminated))
}

/// Borda count: rank `r` out of `n` candidates earns `n - r` points, unranked earns nothing.
pub fn borda(matrix: &[Vec<f64>], num_winners: usize) -> Evaluation {
    let tally = borda_tally(matrix);
    let (winners, ties) = top_n(&tally, num_winners);
    Evaluation::new(winners, ties).with("tally", Series::Vector(tally))
}

pub(crate) fn borda_tally(matrix: &[Vec<f64>]) -> Vec<f64> {
    let width = matrix.first().map_or(0, |row| row.len());
    let mut tally = vec![0.0; width];
    for ballot in matrix {
        for (idx, rank) in ballot.iter().enumerate() {
            if *rank > 0.0 {
                tally[idx] += (width as f64 - rank).max(0.0);
            }
        }
    }
    tally
}

/// Top two automatic runoff: the two leaders on first preferences meet head to head.
///
/// Candidates level on first preferences are seeded in column order, so when several tie for a
/// runoff spot the earliest one takes it.
pub fn top_two(matrix: &[Vec<f64>]) -> Evaluation {
    let width = matrix.first().map_or(0, |row| row.len());
    let all = vec![true; width];
    let mut first_tally = vec![0.0; width];
    for ballot in matrix {
        if let Some(idx) = first_choice(ballot, &all) {
            first_tally[idx] += 1.0;
        }
    }

    let mut order: Vec<usize> = (0..width).collect();
    order.sort_by(|&a, &b| {
        first_tally[b]
            .partial_cmp(&first_tally[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    if width < 2 {
        return Evaluation::new(order, Vec::new()).with("first_tally", Series::Vector(first_tally));
    }

    let (finalist1, finalist2) = (order[0], order[1]);
    let mut prefer_finalist1 = 0.0;
    let mut prefer_finalist2 = 0.0;
    for ballot in matrix {
        if prefers(ballot, finalist1, finalist2) {
            prefer_finalist1 += 1.0;
        } else if prefers(ballot, finalist2, finalist1) {
            prefer_finalist2 += 1.0;
        }
        // Ranked equally (both unranked): no preference for this voter
    }

    let (winners, ties) = match prefer_finalist1.partial_cmp(&prefer_finalist2) {
        Some(Ordering::Greater) => (vec![finalist1], Vec::new()),
        Some(Ordering::Less) => (vec![finalist2], Vec::new()),
        _ => (Vec::new(), vec![finalist1, finalist2]),
    };

    Evaluation::new(winners, ties)
        .with("first_tally", Series::Vector(first_tally))
        .with(
            "runoff_candidates",
            Series::Indices(vec![finalist1, finalist2]),
        )
        .with(
            "runoff_tally",
            Series::Vector(vec![prefer_finalist1, prefer_finalist2]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat(ballot: &[f64], count: usize) -> Vec<Vec<f64>> {
        vec![ballot.to_vec(); count]
    }

    fn tennessee() -> Vec<Vec<f64>> {
        let mut m = repeat(&[1.0, 2.0, 3.0, 4.0], 42);
        m.extend(repeat(&[4.0, 1.0, 2.0, 3.0], 26));
        m.extend(repeat(&[4.0, 3.0, 1.0, 2.0], 15));
        m.extend(repeat(&[4.0, 3.0, 2.0, 1.0], 17));
        m
    }

    #[test]
    fn irv_tennessee_history() {
        let result = instant_runoff(&tennessee(), 1);
        assert_eq!(result.winners, vec![3]);
        assert!(result.ties.is_empty());
        assert_eq!(
            result.output["round_history"],
            Series::Matrix(vec![
                vec![42.0, 26.0, 15.0, 17.0],
                vec![42.0, 26.0, 0.0, 32.0],
                vec![42.0, 0.0, 0.0, 58.0],
            ])
        );
        assert_eq!(result.output["eliminated"], Series::Indices(vec![2, 1]));
    }

    #[test]
    fn irv_first_round_majority() {
        let mut m = repeat(&[1.0, 2.0, 0.0], 6);
        m.extend(repeat(&[0.0, 1.0, 2.0], 4));
        let result = instant_runoff(&m, 1);
        assert_eq!(result.winners, vec![0]);
        assert_eq!(result.output["round_history"].as_matrix().unwrap().len(), 1);
    }

    #[test]
    fn irv_exhausted_ballots_leave_the_count() {
        // The third candidate's voters rank nobody else.
        let mut m = repeat(&[1.0, 0.0, 0.0], 4);
        m.extend(repeat(&[0.0, 1.0, 0.0], 3));
        m.extend(repeat(&[0.0, 0.0, 1.0], 2));
        let result = instant_runoff(&m, 1);
        assert_eq!(result.winners, vec![0]);
        let history = result.output["round_history"].as_matrix().unwrap();
        assert_eq!(history[1], vec![4.0, 3.0, 0.0]);
    }

    #[test]
    fn irv_complete_tie() {
        let mut m = repeat(&[1.0, 2.0], 2);
        m.extend(repeat(&[2.0, 1.0], 2));
        let result = instant_runoff(&m, 1);
        assert!(result.winners.is_empty());
        assert_eq!(result.ties, vec![0, 1]);
    }

    #[test]
    fn irv_multiple_seats() {
        let result = instant_runoff(&tennessee(), 2);
        assert_eq!(result.winners, vec![3, 0]);
    }

    #[test]
    fn borda_points() {
        let m = vec![vec![1.0, 2.0, 0.0], vec![2.0, 1.0, 3.0]];
        // 3 candidates: rank 1 -> 2 points, rank 2 -> 1, rank 3 or unranked -> 0
        let result = borda(&m, 1);
        assert_eq!(result.output["tally"], Series::Vector(vec![3.0, 3.0, 0.0]));
        assert_eq!(result.ties, vec![0, 1]);
    }

    #[test]
    fn top_two_runoff() {
        let result = top_two(&tennessee());
        assert_eq!(
            result.output["runoff_candidates"],
            Series::Indices(vec![0, 1])
        );
        assert_eq!(
            result.output["runoff_tally"],
            Series::Vector(vec![42.0, 58.0])
        );
        assert_eq!(result.winners, vec![1]);
    }

    #[test]
    fn top_two_second_place_tie_seeds_earliest_column() {
        // B and C have one first preference each; B comes first and takes the runoff spot.
        let mut m = repeat(&[1.0, 3.0, 2.0], 2);
        m.extend(repeat(&[3.0, 1.0, 2.0], 1));
        m.extend(repeat(&[2.0, 3.0, 1.0], 1));
        let result = top_two(&m);
        assert_eq!(
            result.output["runoff_candidates"],
            Series::Indices(vec![0, 1])
        );
        assert_eq!(
            result.output["runoff_tally"],
            Series::Vector(vec![3.0, 1.0])
        );
        assert_eq!(result.winners, vec![0]);
    }
}
