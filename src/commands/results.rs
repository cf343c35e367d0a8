use crate::config::Settings;
use crate::db::Database;
use crate::models::ConfigurationError;
use crate::tally::compute_results;
use crate::tally::dispatch::MethodRequest;
use crate::tally::results::{ElectionResults, View};
use crate::voting::{MethodId, ReferenceEvaluator};
use std::fmt;

pub async fn handle_results(
    database: &Database,
    settings: &Settings,
    election_id: i64,
    method: Option<&str>,
    winners: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let method = match method {
        Some(name) => Some(
            MethodId::parse(name).ok_or_else(|| ConfigurationError::UnknownMethod(name.to_string()))?,
        ),
        None => None,
    };
    let request = MethodRequest::new(method, winners);

    let results = compute_results(
        database,
        &ReferenceEvaluator,
        election_id,
        &request,
        settings.duplicate_policy,
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", results);
    }
    Ok(())
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Plain text rendering of the results.
impl fmt::Display for ElectionResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}. {}", self.election_id, self.description)?;
        writeln!(
            f,
            "{}, {} winner(s), {} voter(s)",
            self.method_name, self.num_winners, self.voter_count
        )?;
        writeln!(f, "{}", self.winner_text())?;
        if let Some(ties) = self.ties_text() {
            writeln!(f, " * {}", ties)?;
        }

        for view in &self.views {
            writeln!(f, "\n{}", view.title())?;
            match view {
                View::Tally { labels, values, .. } => {
                    let width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
                    for (label, value) in labels.iter().zip(values) {
                        writeln!(f, "  {:<width$}  {}", label, number(*value), width = width)?;
                    }
                }
                View::Rounds { labels, rounds, .. } => {
                    for (i, round) in rounds.iter().enumerate() {
                        let counts: Vec<String> = labels
                            .iter()
                            .zip(round.votes.iter().zip(&round.percent))
                            .filter(|(_, (votes, _))| **votes > 0.0)
                            .map(|(label, (votes, percent))| {
                                format!("{} {} ({:.1}%)", label, number(*votes), percent)
                            })
                            .collect();
                        writeln!(f, "  Round {}: {}", i + 1, counts.join(", "))?;
                    }
                }
                View::Margins {
                    labels, margins, ..
                } => {
                    let width = labels
                        .iter()
                        .map(|l| l.chars().count())
                        .max()
                        .unwrap_or(0)
                        .max(6);
                    write!(f, "  {:<width$}", "", width = width)?;
                    for label in labels {
                        write!(f, " {:>width$}", label, width = width)?;
                    }
                    writeln!(f)?;
                    for (label, row) in labels.iter().zip(margins) {
                        write!(f, "  {:<width$}", label, width = width)?;
                        for cell in row {
                            let text = cell.map_or_else(|| "-".to_string(), number);
                            write!(f, " {:>width$}", text, width = width)?;
                        }
                        writeln!(f)?;
                    }
                }
            }
        }

        if !self.output.is_empty() {
            writeln!(f, "\nOutput")?;
            writeln!(f, "{}", self.output_text())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::Series;
    use std::collections::BTreeMap;

    #[test]
    fn renders_margins_with_placeholder_diagonal() {
        let mut output = BTreeMap::new();
        output.insert(
            "vote_matrix".to_string(),
            Series::Matrix(vec![vec![0.0, 1.0], vec![2.0, 0.0]]),
        );
        let results = ElectionResults {
            election_id: 4,
            description: "Lunch?".to_string(),
            method: MethodId::RankedPairs,
            method_name: "Ranked Pairs",
            num_winners: 1,
            voter_count: 3,
            candidates: vec!["Tacos".to_string(), "Pizza".to_string()],
            winners: vec!["Pizza".to_string()],
            ties: Vec::new(),
            views: vec![View::Margins {
                title: "Head-to-Head Vote Margins",
                labels: vec!["Tacos".to_string(), "Pizza".to_string()],
                margins: vec![vec![None, Some(-1.0)], vec![Some(1.0), None]],
            }],
            output,
        };
        let text = results.to_string();
        assert!(text.starts_with("4. Lunch?\nRanked Pairs, 1 winner(s), 3 voter(s)\nWinner is: Pizza\n"));
        assert!(text.contains("Head-to-Head Vote Margins"));
        assert!(text.contains("  Tacos       -     -1"));
        assert!(text.contains("vote_matrix ="));
    }

    #[test]
    fn numbers() {
        assert_eq!(number(42.0), "42");
        assert_eq!(number(3.8), "3.80");
    }
}
