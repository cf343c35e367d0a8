use crate::ballot::{submit_ballot, Mark};
use crate::db::Database;
use crate::models::{BallotType, ConfigurationError, NewElection, VoterIdentity};
use crate::voting::{methods_for, MethodId, METHODS};
use log::info;

pub async fn handle_create(
    database: &Database,
    description: String,
    method: &str,
    winners: usize,
    candidates: Vec<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let method =
        MethodId::parse(method).ok_or_else(|| ConfigurationError::UnknownMethod(method.to_string()))?;
    let new = NewElection::new(description, method, winners, candidates);
    let (election, candidates) = database.create_election(&new).await?;

    println!("Created election {}", election);
    println!(
        "{} ({} ballots), {} winner(s)",
        election.method_name(),
        election.ballot_type(),
        election.num_winners
    );
    for candidate in candidates {
        println!("  - {}", candidate.name);
    }
    Ok(())
}

pub async fn handle_list(
    database: &Database,
    popular: bool,
    limit: u32,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let summaries = if popular {
        database.list_popular_elections(limit).await?
    } else {
        database.list_latest_elections(limit).await?
    };

    if summaries.is_empty() {
        println!("No elections yet.");
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{} [{}] {} voter(s), published {}",
            summary.election,
            summary.election.method.key(),
            summary.voter_count,
            summary.election.published_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub fn handle_methods(category: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let methods: Vec<_> = match category {
        Some(name) => {
            let category =
                BallotType::parse(name).ok_or_else(|| format!("Unknown ballot type: {}", name))?;
            methods_for(category).collect()
        }
        None => METHODS.iter().collect(),
    };

    for method in methods {
        println!(
            "{:<14} {:<8} {}",
            method.key, method.category, method.display_name
        );
    }
    Ok(())
}

pub async fn handle_delete(
    database: &Database,
    election_id: i64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    database.delete_election(election_id).await?;
    println!("Election {} deleted.", election_id);
    Ok(())
}

const SEED_DESCRIPTION: &str = "test irv: Favorite Book?";
const SEED_BOOKS: [&str; 4] = [
    "Game of Thrones",
    "Hunger Games",
    "Crime and Punishment",
    "To Kill a Mockingbird",
];
// Voter blocs as (ranks in book order, number of voters).
const SEED_BLOCS: [([i32; 4], usize); 4] = [
    ([1, 2, 3, 4], 42),
    ([4, 1, 2, 3], 26),
    ([4, 3, 1, 2], 15),
    ([4, 3, 2, 1], 17),
];

pub async fn handle_seed(database: &Database) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let new = NewElection::new(
        SEED_DESCRIPTION.to_string(),
        MethodId::Irv,
        1,
        SEED_BOOKS.iter().map(|b| b.to_string()).collect(),
    );
    let (election, books) = database.create_election(&new).await?;

    let mut bot = 0;
    for (ranks, count) in SEED_BLOCS {
        let marks: Vec<Mark> = books
            .iter()
            .zip(ranks)
            .map(|(book, rank)| Mark::new(book.id, rank))
            .collect();
        for _ in 0..count {
            let identity = VoterIdentity::Registered(format!("Bot-{:03}", bot));
            submit_ballot(database, &identity, election.id, &marks).await?;
            bot += 1;
        }
    }

    info!("Seeded election {} with {} bot ballots", election.id, bot);
    println!("Created election {} with {} ballots", election, bot);
    Ok(())
}
