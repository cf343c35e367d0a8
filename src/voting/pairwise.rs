use crate::voting::{column_sums, ranked, top_n, Evaluation, Series};
use std::cmp::Ordering;

// Head-to-head methods. All of them report the full pairwise `vote_matrix`, where
// `vote_matrix[i][j]` is the number of voters preferring candidate i over candidate j.

pub(crate) fn vote_matrix<F>(matrix: &[Vec<f64>], prefers: F) -> Vec<Vec<f64>>
where
    F: Fn(&[f64], usize, usize) -> bool,
{
    let width = matrix.first().map_or(0, |row| row.len());
    let mut votes = vec![vec![0.0; width]; width];
    for ballot in matrix {
        for i in 0..width {
            for j in 0..width {
                if i != j && prefers(ballot, i, j) {
                    votes[i][j] += 1.0;
                }
            }
        }
    }
    votes
}

fn score_prefers(ballot: &[f64], a: usize, b: usize) -> bool {
    ballot[a] > ballot[b]
}

/// Candidates that can reach every other candidate through "beats or ties" relations.
pub(crate) fn smith_set(votes: &[Vec<f64>]) -> Vec<usize> {
    let n = votes.len();
    let mut reach: Vec<Vec<bool>> = (0..n)
        .map(|i| (0..n).map(|j| i != j && votes[i][j] >= votes[j][i]).collect())
        .collect();
    for k in 0..n {
        for i in 0..n {
            if !reach[i][k] {
                continue;
            }
            for j in 0..n {
                if reach[k][j] {
                    reach[i][j] = true;
                }
            }
        }
    }
    (0..n)
        .filter(|&i| (0..n).all(|j| j == i || reach[i][j]))
        .collect()
}

fn reaches(locked: &[Vec<bool>], from: usize, to: usize) -> bool {
    let mut seen = vec![false; locked.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if seen[node] {
            continue;
        }
        seen[node] = true;
        for (next, edge) in locked[node].iter().enumerate() {
            if *edge && !seen[next] {
                stack.push(next);
            }
        }
    }
    false
}

// Winners when exactly one candidate is best, ties otherwise.
fn single_or_tied(best: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
    if best.len() == 1 {
        (best, Vec::new())
    } else {
        (Vec::new(), best)
    }
}

/// Tideman's ranked pairs: lock in majorities from the largest margin down, skipping any that
/// would create a cycle.
pub fn ranked_pairs(matrix: &[Vec<f64>]) -> Evaluation {
    let votes = vote_matrix(matrix, ranked::prefers);
    let n = votes.len();

    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let margin = votes[i][j] - votes[j][i];
            if margin > 0.0 {
                pairs.push((i, j, margin));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then(votes[b.0][b.1].partial_cmp(&votes[a.0][a.1]).unwrap_or(Ordering::Equal))
            .then((a.0, a.1).cmp(&(b.0, b.1)))
    });

    let mut locked = vec![vec![false; n]; n];
    for (winner, loser, _) in pairs {
        if !reaches(&locked, loser, winner) {
            locked[winner][loser] = true;
        }
    }

    let sources: Vec<usize> = (0..n)
        .filter(|&c| !(0..n).any(|other| locked[other][c]))
        .collect();
    let (winners, ties) = single_or_tied(sources);
    Evaluation::new(winners, ties).with("vote_matrix", Series::Matrix(votes))
}

/// Minimax restricted to the Smith set: the member whose worst defeat is smallest wins.
pub fn smith_minimax(matrix: &[Vec<f64>]) -> Evaluation {
    let votes = vote_matrix(matrix, ranked::prefers);
    let smith = smith_set(&votes);

    let worst_defeat = |i: usize| {
        (0..votes.len())
            .filter(|&j| j != i)
            .map(|j| votes[j][i] - votes[i][j])
            .fold(f64::NEG_INFINITY, f64::max)
    };
    let best = smith
        .iter()
        .map(|&i| worst_defeat(i))
        .fold(f64::INFINITY, f64::min);
    let leaders: Vec<usize> = smith
        .iter()
        .copied()
        .filter(|&i| worst_defeat(i) == best)
        .collect();

    let (winners, ties) = single_or_tied(leaders);
    Evaluation::new(winners, ties)
        .with("vote_matrix", Series::Matrix(votes))
        .with("smith_set", Series::Indices(smith))
}

/// Copeland: one point per head-to-head win, half a point per head-to-head tie.
pub fn copeland(matrix: &[Vec<f64>], num_winners: usize) -> Evaluation {
    let votes = vote_matrix(matrix, ranked::prefers);
    let n = votes.len();
    let tally: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| match votes[i][j].partial_cmp(&votes[j][i]) {
                    Some(Ordering::Greater) => 1.0,
                    Some(Ordering::Equal) => 0.5,
                    _ => 0.0,
                })
                .sum()
        })
        .collect();

    let (winners, ties) = top_n(&tally, num_winners);
    Evaluation::new(winners, ties)
        .with("tally", Series::Vector(tally))
        .with("vote_matrix", Series::Matrix(votes))
}

/// Black: the Condorcet winner if there is one, the Borda winner otherwise.
pub fn black(matrix: &[Vec<f64>]) -> Evaluation {
    let votes = vote_matrix(matrix, ranked::prefers);
    let n = votes.len();
    let condorcet = (0..n).find(|&i| (0..n).all(|j| j == i || votes[i][j] > votes[j][i]));

    let tally = ranked::borda_tally(matrix);
    let (winners, ties) = match condorcet {
        Some(winner) => (vec![winner], Vec::new()),
        None => top_n(&tally, 1),
    };
    Evaluation::new(winners, ties)
        .with("tally", Series::Vector(tally))
        .with("vote_matrix", Series::Matrix(votes))
}

/// Highest total score among the Smith set of a score ballot matrix.
pub fn smith_score(matrix: &[Vec<f64>]) -> Evaluation {
    let votes = vote_matrix(matrix, score_prefers);
    let smith = smith_set(&votes);
    let tally = column_sums(matrix);

    let best = smith
        .iter()
        .map(|&i| tally[i])
        .fold(f64::NEG_INFINITY, f64::max);
    let leaders: Vec<usize> = smith.iter().copied().filter(|&i| tally[i] == best).collect();

    let (winners, ties) = single_or_tied(leaders);
    Evaluation::new(winners, ties)
        .with("tally", Series::Vector(tally))
        .with("vote_matrix", Series::Matrix(votes))
        .with("smith_set", Series::Indices(smith))
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

    // Rock-paper-scissors cycle: 0 > 1 > 2 > 0, with 0 over 1 the strongest majority.
    fn cycle() -> Vec<Vec<f64>> {
        let mut m = repeat(&[1.0, 2.0, 3.0], 4);
        m.extend(repeat(&[3.0, 1.0, 2.0], 3));
        m.extend(repeat(&[2.0, 3.0, 1.0], 2));
        m
    }

    #[test]
    fn vote_matrix_counts_preferences() {
        let votes = vote_matrix(&tennessee(), ranked::prefers);
        assert_eq!(votes[1][0], 58.0);
        assert_eq!(votes[0][1], 42.0);
        assert_eq!(votes[1][2], 68.0);
        for i in 0..4 {
            assert_eq!(votes[i][i], 0.0);
            for j in 0..4 {
                if i != j {
                    assert_eq!(votes[i][j] + votes[j][i], 100.0);
                }
            }
        }
    }

    #[test]
    fn condorcet_winner_wins_everywhere() {
        let m = tennessee();
        // Nashville (1) beats every other city head to head.
        assert_eq!(ranked_pairs(&m).winners, vec![1]);
        assert_eq!(smith_minimax(&m).winners, vec![1]);
        assert_eq!(black(&m).winners, vec![1]);
        assert_eq!(copeland(&m, 1).winners, vec![1]);
        assert_eq!(smith_minimax(&m).output["smith_set"], Series::Indices(vec![1]));
    }

    #[test]
    fn cycle_resolution() {
        let m = cycle();
        let votes = vote_matrix(&m, ranked::prefers);
        // 0 over 1: 6-3, 1 over 2: 7-2, 2 over 0: 5-4
        assert_eq!(votes[0][1], 6.0);
        assert_eq!(votes[1][2], 7.0);
        assert_eq!(votes[2][0], 5.0);
        assert_eq!(smith_set(&votes), vec![0, 1, 2]);

        // Locks 1>2 (margin 5), then 0>1 (3); 2>0 would close the cycle.
        assert_eq!(ranked_pairs(&m).winners, vec![0]);
        // Worst defeats: 0 by 1, 1 by 3, 2 by 5.
        assert_eq!(smith_minimax(&m).winners, vec![0]);
        // Every candidate wins once.
        let result = copeland(&m, 1);
        assert!(result.winners.is_empty());
        assert_eq!(result.ties.len(), 3);
    }

    #[test]
    fn smith_score_prefers_higher_total_inside_smith_set() {
        let m = vec![
            vec![5.0, 4.0, 0.0],
            vec![5.0, 4.0, 0.0],
            vec![0.0, 5.0, 1.0],
        ];
        let result = smith_score(&m);
        // 0 beats 1 two to one, so only 0 is in the Smith set despite 1's higher total.
        assert_eq!(result.output["smith_set"], Series::Indices(vec![0]));
        assert_eq!(result.winners, vec![0]);
    }
}
