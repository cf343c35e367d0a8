use crate::ballot::{Ballot, ValidationError};
use crate::config::Settings;
use crate::models::{
    BallotRow, BallotType, Candidate, ConfigurationError, Election, ElectionSummary, NewElection,
    VoterIdentity,
};
use crate::voting::MethodId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row, Sqlite,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Election {0} not found")]
    ElectionNotFound(i64),
    #[error("{0} already voted in this election")]
    AlreadyVoted(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Stored data is inconsistent: {0}")]
    Integrity(String),
}

/// Persistence operations the ballot and tally pipelines rely on.
#[async_trait]
pub trait BallotStore: Send + Sync {
    async fn get_election(&self, election_id: i64) -> Result<Election, StoreError>;

    /// Candidates in their stored order. This order defines the ballot matrix columns.
    async fn get_candidates(&self, election_id: i64) -> Result<Vec<Candidate>, StoreError>;

    /// Whether a registered identity already has ballots in the election. Always false for
    /// anonymous voters.
    async fn has_voted(&self, election_id: i64, identity: &VoterIdentity)
        -> Result<bool, StoreError>;

    /// Stores a validated ballot atomically and returns the voter id it was recorded under.
    ///
    /// Creates the voter row on first use. A registered identity that already has ballots gets
    /// `AlreadyVoted`, also when it loses a race against a concurrent submission.
    async fn write_ballots(
        &self,
        identity: &VoterIdentity,
        election_id: i64,
        ballot: &Ballot,
    ) -> Result<i64, StoreError>;

    /// Every stored (voter, candidate, value) record of the election, in insertion order.
    async fn read_ballots(&self, election_id: i64) -> Result<Vec<BallotRow>, StoreError>;
}

pub struct Database {
    pool: SqlitePool,
    anonymous_identity: String,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS elections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        method TEXT NOT NULL,
        num_winners INTEGER NOT NULL,
        num_candidates INTEGER NOT NULL,
        description TEXT NOT NULL,
        published_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS candidates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        election_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        position INTEGER NOT NULL,
        UNIQUE (election_id, name),
        FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS voters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        election_id INTEGER NOT NULL,
        identity TEXT NOT NULL,
        anonymous BOOLEAN NOT NULL DEFAULT FALSE,
        FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS voters_registered_identity
        ON voters (election_id, identity) WHERE anonymous = FALSE;
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mark_ballots (
        voter_id INTEGER NOT NULL,
        candidate_id INTEGER NOT NULL,
        election_id INTEGER NOT NULL,
        mark BOOLEAN NOT NULL,
        PRIMARY KEY (voter_id, candidate_id),
        FOREIGN KEY (voter_id) REFERENCES voters(id) ON DELETE CASCADE,
        FOREIGN KEY (candidate_id) REFERENCES candidates(id) ON DELETE CASCADE,
        FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rank_ballots (
        voter_id INTEGER NOT NULL,
        candidate_id INTEGER NOT NULL,
        election_id INTEGER NOT NULL,
        vote INTEGER NOT NULL,
        PRIMARY KEY (voter_id, candidate_id),
        FOREIGN KEY (voter_id) REFERENCES voters(id) ON DELETE CASCADE,
        FOREIGN KEY (candidate_id) REFERENCES candidates(id) ON DELETE CASCADE,
        FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
    );
    "#,
];

impl Database {
    pub async fn new(settings: &Settings) -> Result<Self, StoreError> {
        let db_url = &settings.database_url;

        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self {
            pool,
            anonymous_identity: settings.anonymous_identity.clone(),
        })
    }

    /// A private in-memory database.
    #[cfg(test)]
    pub async fn in_memory(anonymous_identity: &str) -> Result<Self, StoreError> {
        // Every connection to sqlite::memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self {
            pool,
            anonymous_identity: anonymous_identity.to_string(),
        })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    /// Validates and stores a new election with its candidates, in the given order.
    pub async fn create_election(
        &self,
        new: &NewElection,
    ) -> Result<(Election, Vec<Candidate>), StoreError> {
        let names = new.validate()?;
        let published_at = Utc::now();
        let description = new.description.trim().to_string();

        let mut tx = self.pool.begin().await?;
        let election_id = sqlx::query(
            r#"
            INSERT INTO elections (method, num_winners, num_candidates, description, published_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.method.key())
        .bind(new.num_winners as i64)
        .bind(names.len() as i64)
        .bind(&description)
        .bind(published_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut candidates = Vec::with_capacity(names.len());
        for (position, name) in names.into_iter().enumerate() {
            let id = sqlx::query(
                r#"
                INSERT INTO candidates (election_id, name, position)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(election_id)
            .bind(&name)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            candidates.push(Candidate {
                id,
                election_id,
                name,
            });
        }
        tx.commit().await?;

        info!(
            "Created election {} ({}) with {} candidates",
            election_id,
            new.method.key(),
            candidates.len()
        );
        let election = Election {
            id: election_id,
            method: new.method,
            num_winners: new.num_winners,
            num_candidates: candidates.len(),
            description,
            published_at,
        };
        Ok((election, candidates))
    }

    /// Most recently published elections first.
    pub async fn list_latest_elections(
        &self,
        limit: u32,
    ) -> Result<Vec<ElectionSummary>, StoreError> {
        self.list_elections("e.published_at DESC, e.id DESC", limit)
            .await
    }

    /// Elections with the most voters first.
    pub async fn list_popular_elections(
        &self,
        limit: u32,
    ) -> Result<Vec<ElectionSummary>, StoreError> {
        self.list_elections("voter_count DESC, e.id DESC", limit)
            .await
    }

    async fn list_elections(
        &self,
        order_by: &'static str,
        limit: u32,
    ) -> Result<Vec<ElectionSummary>, StoreError> {
        let query = format!(
            r#"
            SELECT e.id, e.method, e.num_winners, e.num_candidates, e.description, e.published_at,
                (SELECT COUNT(DISTINCT m.voter_id) FROM mark_ballots m WHERE m.election_id = e.id)
                + (SELECT COUNT(DISTINCT r.voter_id) FROM rank_ballots r WHERE r.election_id = e.id)
                AS voter_count
            FROM elections e
            ORDER BY {}
            LIMIT ?
            "#,
            order_by
        );
        let rows = sqlx::query(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ElectionSummary {
                    election: election_from_row(row)?,
                    voter_count: row.get::<i64, _>("voter_count") as usize,
                })
            })
            .collect()
    }

    /// Removes an election together with its candidates, voters and ballots.
    pub async fn delete_election(&self, election_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM elections WHERE id = ?")
            .bind(election_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ElectionNotFound(election_id));
        }
        info!("Deleted election {}", election_id);
        Ok(())
    }
}

fn election_from_row(row: &SqliteRow) -> Result<Election, StoreError> {
    let id = row.get::<i64, _>("id");
    let method_key = row.get::<String, _>("method");
    let method = MethodId::parse(&method_key).ok_or_else(|| {
        StoreError::Integrity(format!(
            "election {} uses unknown voting method {}",
            id, method_key
        ))
    })?;
    let published_at_str = row.get::<String, _>("published_at");
    let published_at = DateTime::parse_from_rfc3339(&published_at_str)
        .map_err(|e| StoreError::Integrity(format!("failed to parse published_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Election {
        id,
        method,
        num_winners: row.get::<i64, _>("num_winners") as usize,
        num_candidates: row.get::<i64, _>("num_candidates") as usize,
        description: row.get::<String, _>("description"),
        published_at,
    })
}

fn conflict_as_already_voted(err: sqlx::Error, identity: &VoterIdentity) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::AlreadyVoted(identity.to_string());
        }
    }
    StoreError::Sqlx(err)
}

async fn voted_in(
    conn: &mut SqliteConnection,
    election_id: i64,
    identity: &VoterIdentity,
) -> Result<bool, StoreError> {
    let name = match identity {
        VoterIdentity::Registered(name) => name,
        VoterIdentity::Anonymous => return Ok(false),
    };
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM voters v
            WHERE v.election_id = ? AND v.identity = ? AND v.anonymous = FALSE
              AND (EXISTS (SELECT 1 FROM mark_ballots m WHERE m.voter_id = v.id)
                   OR EXISTS (SELECT 1 FROM rank_ballots r WHERE r.voter_id = v.id))
        ) AS voted
        "#,
    )
    .bind(election_id)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<i64, _>("voted") != 0)
}

async fn voter_in(
    conn: &mut SqliteConnection,
    election_id: i64,
    identity: &VoterIdentity,
    anonymous_identity: &str,
) -> Result<i64, StoreError> {
    match identity {
        VoterIdentity::Anonymous => {
            let id = sqlx::query(
                "INSERT INTO voters (election_id, identity, anonymous) VALUES (?, ?, TRUE)",
            )
            .bind(election_id)
            .bind(anonymous_identity)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
            Ok(id)
        }
        VoterIdentity::Registered(name) => {
            sqlx::query(
                r#"
                INSERT INTO voters (election_id, identity, anonymous)
                VALUES (?, ?, FALSE)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(election_id)
            .bind(name)
            .execute(&mut *conn)
            .await?;

            let row = sqlx::query(
                "SELECT id FROM voters WHERE election_id = ? AND identity = ? AND anonymous = FALSE",
            )
            .bind(election_id)
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
            Ok(row.get::<i64, _>("id"))
        }
    }
}

async fn insert_ballot(
    conn: &mut SqliteConnection,
    identity: &VoterIdentity,
    election_id: i64,
    ballot: &Ballot,
    anonymous_identity: &str,
) -> Result<i64, StoreError> {
    if voted_in(&mut *conn, election_id, identity).await? {
        return Err(StoreError::AlreadyVoted(identity.to_string()));
    }
    let voter_id = voter_in(&mut *conn, election_id, identity, anonymous_identity).await?;

    match ballot {
        Ballot::Single { candidate_id } => {
            sqlx::query(
                r#"
                INSERT INTO mark_ballots (voter_id, candidate_id, election_id, mark)
                VALUES (?, ?, ?, TRUE)
                "#,
            )
            .bind(voter_id)
            .bind(*candidate_id)
            .bind(election_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| conflict_as_already_voted(e, identity))?;
        }
        Ballot::Rank { marks } | Ballot::Score { marks } => {
            for mark in marks {
                sqlx::query(
                    r#"
                    INSERT INTO rank_ballots (voter_id, candidate_id, election_id, vote)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(voter_id)
                .bind(mark.candidate_id)
                .bind(election_id)
                .bind(mark.value)
                .execute(&mut *conn)
                .await
                .map_err(|e| conflict_as_already_voted(e, identity))?;
            }
        }
    }
    Ok(voter_id)
}

#[async_trait]
impl BallotStore for Database {
    async fn get_election(&self, election_id: i64) -> Result<Election, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, method, num_winners, num_candidates, description, published_at
            FROM elections
            WHERE id = ?
            "#,
        )
        .bind(election_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ElectionNotFound(election_id))?;

        election_from_row(&row)
    }

    async fn get_candidates(&self, election_id: i64) -> Result<Vec<Candidate>, StoreError> {
        let candidates = sqlx::query(
            r#"
            SELECT id, election_id, name
            FROM candidates
            WHERE election_id = ?
            ORDER BY position, id
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Candidate {
            id: row.get::<i64, _>("id"),
            election_id: row.get::<i64, _>("election_id"),
            name: row.get::<String, _>("name"),
        })
        .collect();
        Ok(candidates)
    }

    async fn has_voted(
        &self,
        election_id: i64,
        identity: &VoterIdentity,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        voted_in(&mut conn, election_id, identity).await
    }

    async fn write_ballots(
        &self,
        identity: &VoterIdentity,
        election_id: i64,
        ballot: &Ballot,
    ) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;

        // Take the write lock before the has-voted check; concurrent writers wait in busy_timeout
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        let written = match insert_ballot(
            &mut conn,
            identity,
            election_id,
            ballot,
            &self.anonymous_identity,
        )
        .await
        {
            Ok(voter_id) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| voter_id)
                .map_err(StoreError::from),
            Err(e) => Err(e),
        };

        match written {
            Ok(voter_id) => {
                debug!(
                    "Stored {} ballot for voter {} in election {}",
                    ballot.ballot_type(),
                    voter_id,
                    election_id
                );
                Ok(voter_id)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!("Failed to roll back ballot write: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn read_ballots(&self, election_id: i64) -> Result<Vec<BallotRow>, StoreError> {
        let election = self.get_election(election_id).await?;

        let rows = match election.ballot_type() {
            BallotType::Single => sqlx::query(
                r#"
                SELECT voter_id, candidate_id, mark
                FROM mark_ballots
                WHERE election_id = ?
                ORDER BY rowid
                "#,
            )
            .bind(election_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| BallotRow {
                voter_id: row.get::<i64, _>("voter_id"),
                candidate_id: row.get::<i64, _>("candidate_id"),
                value: if row.get::<bool, _>("mark") { 1.0 } else { 0.0 },
            })
            .collect::<Vec<_>>(),
            BallotType::Rank | BallotType::Score => sqlx::query(
                r#"
                SELECT voter_id, candidate_id, vote
                FROM rank_ballots
                WHERE election_id = ?
                ORDER BY rowid
                "#,
            )
            .bind(election_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| BallotRow {
                voter_id: row.get::<i64, _>("voter_id"),
                candidate_id: row.get::<i64, _>("candidate_id"),
                value: row.get::<i64, _>("vote") as f64,
            })
            .collect::<Vec<_>>(),
        };

        if rows.is_empty() {
            warn!("Election {} has no stored ballots", election_id);
        }
        Ok(rows)
    }
}
