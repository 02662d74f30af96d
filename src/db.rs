use chrono::Utc;
use eyre::Result;
use rusqlite::types::Type;
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use crate::models::{AggregationResult, DateRange, SimilarityPair, WalletIdentity};
use crate::protocol::Verdict;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS decisions (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  pair_index  INTEGER NOT NULL,
  address_a   TEXT NOT NULL,
  name_a      TEXT NOT NULL,
  address_b   TEXT NOT NULL,
  name_b      TEXT NOT NULL,
  score       REAL NOT NULL,
  verdict     TEXT NOT NULL CHECK (verdict IN ('CONFIRM','REJECT')),
  decided_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reports (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  generated_at  TEXT NOT NULL,
  range_start   TEXT,
  range_end     TEXT
);

CREATE TABLE IF NOT EXISTS report_rows (
  report_id     INTEGER NOT NULL REFERENCES reports(id),
  rank          INTEGER NOT NULL,
  group_key     TEXT NOT NULL,
  display_name  TEXT NOT NULL,
  total         TEXT NOT NULL, -- Decimal stored as string
  wallets_json  TEXT NOT NULL,
  PRIMARY KEY (report_id, rank)
);
"#;

/// A persisted report with its ranked rows.
#[derive(Debug, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub generated_at: String,
    pub range: DateRange,
    pub rows: Vec<AggregationResult>,
}

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Append one verdict to the decision log
pub fn record_decision(
    conn: &Connection,
    pair_index: usize,
    pair: &SimilarityPair,
    verdict: Verdict,
) -> rusqlite::Result<()> {
    let verdict = match verdict {
        Verdict::Confirm => "CONFIRM",
        Verdict::Reject => "REJECT",
    };
    conn.execute(
        r#"
        INSERT INTO decisions (
            pair_index, address_a, name_a, address_b, name_b, score, verdict, decided_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            pair_index as i64,
            pair.first.address,
            pair.first.display_name,
            pair.second.address,
            pair.second.display_name,
            pair.score,
            verdict,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn decision_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM decisions", [], |r| r.get(0))
}

/// Store a finalized report; returns its id
pub fn save_report(
    conn: &mut Connection,
    range: &DateRange,
    rows: &[AggregationResult],
) -> rusqlite::Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO reports (generated_at, range_start, range_end) VALUES (?1, ?2, ?3)",
        params![
            Utc::now().to_rfc3339(),
            range.start.map(|d| d.to_rfc3339()),
            range.end.map(|d| d.to_rfc3339())
        ],
    )?;
    let report_id = tx.last_insert_rowid();

    for (rank, row) in rows.iter().enumerate() {
        let wallets_json = serde_json::to_string(&row.wallets)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        tx.execute(
            r#"
            INSERT INTO report_rows (report_id, rank, group_key, display_name, total, wallets_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                report_id,
                rank as i64,
                row.key,
                row.display_name,
                row.total_amount.to_string(),
                wallets_json
            ],
        )?;
    }

    tx.commit()?;
    Ok(report_id)
}

/// Read one report back in rank order
pub fn load_report(conn: &Connection, id: i64) -> rusqlite::Result<Option<StoredReport>> {
    let header = conn
        .query_row(
            "SELECT generated_at, range_start, range_end FROM reports WHERE id = ?1",
            [id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((generated_at, range_start, range_end)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT group_key, display_name, total, wallets_json
         FROM report_rows WHERE report_id = ?1 ORDER BY rank ASC",
    )?;
    let rows = stmt
        .query_map([id], |r| {
            let key: String = r.get(0)?;
            let display_name: String = r.get(1)?;
            let total: String = r.get(2)?;
            let wallets_json: String = r.get(3)?;

            let wallets: Vec<WalletIdentity> = serde_json::from_str(&wallets_json)
                .map_err(|e| FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
            let total_amount = Decimal::from_str(&total)
                .map_err(|e| FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

            Ok(AggregationResult {
                key,
                wallets,
                total_amount,
                display_name,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let parse = |s: Option<String>| {
        s.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc))
    };

    Ok(Some(StoredReport {
        id,
        generated_at,
        range: DateRange {
            start: parse(range_start),
            end: parse(range_end),
        },
        rows,
    }))
}
