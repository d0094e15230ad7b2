use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::games::{self, GameSource, HistoricalGame};
use crate::league::League;

/// SQLite archive of finished games. Rows are append-only and keyed by `game_id`.
pub struct GameArchive {
    conn: Connection,
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub offered: usize,
    pub inserted: usize,
    pub skipped_unfinished: usize,
    pub duplicates: usize,
}

impl GameArchive {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn insert_games(&mut self, rows: &[HistoricalGame]) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            offered: rows.len(),
            ..IngestSummary::default()
        };
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().context("begin ingest transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT OR IGNORE INTO games (
                        game_id, league, home_team_id, away_team_id, home_score, away_score,
                        home_won, game_date, status, home_team_name, away_team_name, ingested_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                )
                .context("prepare game insert")?;
            for g in rows {
                if !g.is_final() {
                    summary.skipped_unfinished += 1;
                    continue;
                }
                let changed = stmt
                    .execute(params![
                        g.game_id,
                        g.league.as_str(),
                        g.home_team_id,
                        g.away_team_id,
                        g.home_score,
                        g.away_score,
                        g.home_won,
                        g.game_date,
                        g.status,
                        g.home_team_name,
                        g.away_team_name,
                        now,
                    ])
                    .with_context(|| format!("insert game {}", g.game_id))?;
                if changed == 0 {
                    summary.duplicates += 1;
                } else {
                    summary.inserted += 1;
                }
            }
        }
        tx.commit().context("commit ingest transaction")?;
        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped_unfinished,
            "archived historical games"
        );
        Ok(summary)
    }

    pub fn games_for_league(&self, league: League) -> Result<Vec<HistoricalGame>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT game_id, home_team_id, away_team_id, home_score, away_score, home_won,
                       game_date, status, home_team_name, away_team_name
                FROM games
                WHERE league = ?1
                ORDER BY game_date ASC, rowid ASC
                "#,
            )
            .context("prepare league query")?;
        let rows = stmt
            .query_map(params![league.as_str()], |row| {
                Ok(HistoricalGame {
                    game_id: row.get(0)?,
                    league,
                    home_team_id: row.get(1)?,
                    away_team_id: row.get(2)?,
                    home_score: row.get(3)?,
                    away_score: row.get(4)?,
                    home_won: row.get(5)?,
                    game_date: row.get(6)?,
                    status: row.get(7)?,
                    home_team_name: row.get(8)?,
                    away_team_name: row.get(9)?,
                })
            })
            .context("query league games")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode game row")?);
        }
        // Stored dates are not guaranteed to share a format, so order by parsed time.
        games::sort_by_date(&mut out);
        debug!(league = %league, games = out.len(), "loaded archived games");
        Ok(out)
    }

    pub fn count(&self, league: League) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM games WHERE league = ?1",
                params![league.as_str()],
                |row| row.get(0),
            )
            .context("count games")?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl GameSource for GameArchive {
    fn completed_games(&self, league: League) -> Result<Vec<HistoricalGame>> {
        self.games_for_league(league)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            league TEXT NOT NULL,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_score INTEGER NOT NULL,
            away_score INTEGER NOT NULL,
            home_won INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            status TEXT NOT NULL,
            home_team_name TEXT NULL,
            away_team_name TEXT NULL,
            ingested_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_league ON games(league);
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
