use crate::ballot::{submit_ballot, Mark};
use crate::db::{BallotStore, Database};
use crate::models::VoterIdentity;
use log::info;

/// A `--mark NAME[=VALUE]` argument. A bare name marks the candidate with 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkArg {
    pub name: String,
    pub value: Option<i32>,
}

pub fn parse_mark(s: &str) -> Result<MarkArg, String> {
    let (name, value) = match s.rsplit_once('=') {
        Some((name, value)) => {
            let value = value
                .trim()
                .parse::<i32>()
                .map_err(|_| format!("invalid value in \"{}\", expected NAME=NUMBER", s))?;
            (name, Some(value))
        }
        None => (s, None),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing candidate name in \"{}\"", s));
    }
    Ok(MarkArg {
        name: name.to_string(),
        value,
    })
}

pub async fn handle_vote(
    database: &Database,
    election_id: i64,
    user: Option<String>,
    marks: &[MarkArg],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let election = database.get_election(election_id).await?;
    let candidates = database.get_candidates(election.id).await?;

    let mut resolved = Vec::with_capacity(marks.len());
    for mark in marks {
        let candidate = candidates
            .iter()
            .find(|c| c.name == mark.name)
            .ok_or_else(|| format!("Unknown candidate: {}", mark.name))?;
        resolved.push(Mark::new(candidate.id, mark.value.unwrap_or(1)));
    }

    let identity = match user {
        Some(name) if !name.trim().is_empty() => VoterIdentity::Registered(name.trim().to_string()),
        _ => VoterIdentity::Anonymous,
    };

    submit_ballot(database, &identity, election_id, &resolved).await?;
    info!("Ballot recorded for {} in election {}", identity, election_id);
    println!("Your vote has been recorded.");
    Ok(())
}
