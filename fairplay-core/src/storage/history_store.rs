use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Address, MatchId};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One settled round as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub match_id: MatchId,
    pub player: Address,
    pub wager: u64,
    pub my_move: String,
    pub opponent_move: Option<String>,
    pub outcome: String,
    pub net: i64,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTotals {
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
    pub net: i64,
}

pub struct HistoryStore<'a> {
    storage: &'a Storage,
}

impl<'a> HistoryStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Inserts a round; re-recording the same match for the same player replaces it.
    pub async fn record_round(&self, round: &RoundRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO rounds
                (match_id, player, wager, my_move, opponent_move, outcome, net, settled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                round.match_id.0 as i64,
                round.player.to_string(),
                round.wager as i64,
                round.my_move,
                round.opponent_move,
                round.outcome,
                round.net,
                round.settled_at.timestamp(),
            ],
        )?;

        tracing::debug!(
            "Recorded round for match {}: {} ({:+})",
            round.match_id,
            round.outcome,
            round.net
        );
        Ok(())
    }

    /// Most recent rounds first.
    pub async fn list_rounds(&self, limit: usize) -> Result<Vec<RoundRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT match_id, player, wager, my_move, opponent_move, outcome, net, settled_at
             FROM rounds
             ORDER BY settled_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let match_id: i64 = row.get(0)?;
            let player: String = row.get(1)?;
            let wager: i64 = row.get(2)?;
            let settled_at: i64 = row.get(7)?;

            let player = player.parse::<Address>().map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    1,
                    "player".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;

            Ok(RoundRecord {
                match_id: MatchId(match_id as u64),
                player,
                wager: wager as u64,
                my_move: row.get(3)?,
                opponent_move: row.get(4)?,
                outcome: row.get(5)?,
                net: row.get(6)?,
                settled_at: DateTime::from_timestamp(settled_at, 0).unwrap_or_else(Utc::now),
            })
        })?;

        let mut rounds = Vec::new();
        for round in rows {
            rounds.push(round?);
        }

        Ok(rounds)
    }

    pub async fn totals(&self) -> Result<HistoryTotals> {
        let conn = self.storage.get_connection().await;

        let totals = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN outcome = 'win' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'draw' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'lose' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(net), 0)
             FROM rounds",
            [],
            |row| {
                Ok(HistoryTotals {
                    wins: row.get::<_, i64>(0)? as u64,
                    draws: row.get::<_, i64>(1)? as u64,
                    losses: row.get::<_, i64>(2)? as u64,
                    net: row.get(3)?,
                })
            },
        )?;

        Ok(totals)
    }
}
