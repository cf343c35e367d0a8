mod ballot;
mod elections;
mod results;

use crate::config::Settings;
use crate::db::Database;
use clap::{Parser, Subcommand};

/// Create elections, collect ballots and compute results.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish a new election
    Create {
        /// The question voters are answering
        #[clap(short, long, value_parser)]
        description: String,

        /// Voting method key, see `methods`
        #[clap(short, long, value_parser)]
        method: String,

        /// Number of winners
        #[clap(short, long, value_parser, default_value_t = 1)]
        winners: usize,

        /// Candidate name, repeat once per candidate
        #[clap(short, long = "candidate", value_parser, required = true)]
        candidates: Vec<String>,
    },
    /// List the latest (or most popular) elections
    List {
        #[clap(long, takes_value = false)]
        popular: bool,

        #[clap(short, long, value_parser, default_value_t = 10)]
        limit: u32,
    },
    /// Cast a ballot
    Vote {
        #[clap(value_parser)]
        election: i64,

        /// Registered voter name; anonymous when omitted
        #[clap(short, long, value_parser)]
        user: Option<String>,

        /// NAME or NAME=VALUE, repeat once per marked candidate
        #[clap(long = "mark", value_parser = ballot::parse_mark, required = true)]
        marks: Vec<ballot::MarkArg>,
    },
    /// Compute and show the results of an election
    Results {
        #[clap(value_parser)]
        election: i64,

        /// Recompute with another method of the same ballot type
        #[clap(short, long, value_parser)]
        method: Option<String>,

        /// Recompute with another number of winners
        #[clap(short, long, value_parser)]
        winners: Option<usize>,

        /// Print the results as JSON
        #[clap(long, takes_value = false)]
        json: bool,
    },
    /// List the available voting methods
    Methods {
        /// single, rank or score
        #[clap(short, long, value_parser)]
        category: Option<String>,
    },
    /// Delete an election with all its ballots
    Delete {
        #[clap(value_parser)]
        election: i64,
    },
    /// Create a demo election filled with bot ballots
    Seed,
}

pub async fn run(
    database: &Database,
    settings: &Settings,
    command: Command,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        Command::Create {
            description,
            method,
            winners,
            candidates,
        } => elections::handle_create(database, description, &method, winners, candidates).await?,
        Command::List { popular, limit } => elections::handle_list(database, popular, limit).await?,
        Command::Vote {
            election,
            user,
            marks,
        } => ballot::handle_vote(database, election, user, &marks).await?,
        Command::Results {
            election,
            method,
            winners,
            json,
        } => {
            results::handle_results(database, settings, election, method.as_deref(), winners, json)
                .await?
        }
        Command::Methods { category } => elections::handle_methods(category.as_deref())?,
        Command::Delete { election } => elections::handle_delete(database, election).await?,
        Command::Seed => elections::handle_seed(database).await?,
    }

    Ok(())
}
