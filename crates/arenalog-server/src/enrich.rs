//! Best-effort card-name resolution.
//!
//! Resolution order: the catalog table, then the client's local raw card
//! database, then Scryfall. Anything newly resolved is written back to the
//! catalog so later requests stay local. Every stage is allowed to fail;
//! the API serves unnamed card ids rather than erroring.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::OpenFlags;
use serde::Deserialize;
use tracing::warn;

use arenalog_store::{cards, Database, StoreError};

const SCRYFALL_SEARCH_URL: &str = "https://api.scryfall.com/cards/search";
const SCRYFALL_BATCH_MAX: usize = 40;
const RAW_CARD_DB_ENV: &str = "MTGA_RAW_CARD_DB";
const USER_AGENT: &str = "arenalog/0.1 (local tracker)";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);

pub struct CardNameResolver {
    db: Database,
    http: reqwest::Client,
}

impl CardNameResolver {
    pub fn new(db: Database) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self { db, http })
    }

    /// Resolve display names for `card_ids`. Missing ids are absent from
    /// the result.
    pub async fn resolve(&self, card_ids: Vec<i64>) -> HashMap<i64, String> {
        let mut wanted: Vec<i64> = Vec::with_capacity(card_ids.len());
        for id in card_ids {
            if id > 0 && !wanted.contains(&id) {
                wanted.push(id);
            }
        }
        if wanted.is_empty() {
            return HashMap::new();
        }

        let mut resolved = match self.db.with_conn(|conn| cards::lookup_names(conn, &wanted)) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "card catalog lookup failed");
                HashMap::new()
            }
        };
        let mut newly_resolved: HashMap<i64, String> = HashMap::new();

        let unresolved = missing_ids(&wanted, &resolved);
        if !unresolved.is_empty() {
            match lookup_local_card_db(unresolved.clone()).await {
                Ok(local) => {
                    for (card_id, name) in local {
                        resolved.insert(card_id, name.clone());
                        newly_resolved.insert(card_id, name);
                    }
                }
                Err(err) => warn!(error = %err, "local card database lookup failed"),
            }
        }

        let unresolved = missing_ids(&wanted, &resolved);
        if !unresolved.is_empty() {
            match self.fetch_from_scryfall(&unresolved).await {
                Ok(fetched) => {
                    for (card_id, name) in fetched {
                        resolved.insert(card_id, name.clone());
                        newly_resolved.insert(card_id, name);
                    }
                }
                Err(err) => warn!(error = %err, "scryfall card name lookup failed"),
            }
        }

        if !newly_resolved.is_empty() {
            if let Err(err) = self
                .db
                .with_conn(|conn| cards::upsert_names(conn, &newly_resolved))
            {
                warn!(error = %err, "card catalog write-back failed");
            }
        }

        resolved
    }

    async fn fetch_from_scryfall(
        &self,
        card_ids: &[i64],
    ) -> Result<HashMap<i64, String>, reqwest::Error> {
        let mut out = HashMap::with_capacity(card_ids.len());
        let mut first_err = None;

        for batch in card_ids.chunks(SCRYFALL_BATCH_MAX) {
            match self.fetch_batch(batch).await {
                Ok(names) => out.extend(names),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        match first_err {
            Some(err) if out.is_empty() => Err(err),
            _ => Ok(out),
        }
    }

    async fn fetch_batch(&self, card_ids: &[i64]) -> Result<HashMap<i64, String>, reqwest::Error> {
        #[derive(Debug, Default, Deserialize)]
        struct Page {
            #[serde(default)]
            data: Vec<PageCard>,
            #[serde(default)]
            has_more: bool,
            #[serde(default)]
            next_page: String,
        }
        #[derive(Debug, Default, Deserialize)]
        struct PageCard {
            #[serde(default)]
            arena_id: i64,
            #[serde(default)]
            name: String,
        }

        let mut names = HashMap::new();
        if card_ids.is_empty() {
            return Ok(names);
        }

        let query = card_ids
            .iter()
            .map(|id| format!("arenaid:{id}"))
            .collect::<Vec<_>>()
            .join(" or ");

        let mut response = self
            .http
            .get(SCRYFALL_SEARCH_URL)
            .query(&[("q", query.as_str()), ("unique", "cards")])
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        loop {
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(names);
            }
            let page: Page = response.error_for_status()?.json().await?;
            for card in page.data {
                if card.arena_id > 0 && !card.name.trim().is_empty() {
                    names.insert(card.arena_id, card.name);
                }
            }
            if !page.has_more || page.next_page.trim().is_empty() {
                return Ok(names);
            }
            response = self
                .http
                .get(page.next_page.trim())
                .header(reqwest::header::ACCEPT, "application/json")
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .send()
                .await?;
        }
    }
}

/// Apply resolved names to rows that still lack one.
pub fn apply_names<T>(
    rows: &mut [T],
    names: &HashMap<i64, String>,
    card_id: impl Fn(&T) -> i64,
    name_slot: impl Fn(&mut T) -> &mut Option<String>,
) {
    for row in rows {
        let id = card_id(row);
        let slot = name_slot(row);
        if slot.is_none() {
            if let Some(name) = names.get(&id) {
                *slot = Some(name.clone());
            }
        }
    }
}

fn missing_ids(wanted: &[i64], resolved: &HashMap<i64, String>) -> Vec<i64> {
    wanted
        .iter()
        .copied()
        .filter(|id| !resolved.contains_key(id))
        .collect()
}

/// Query the client's own card database, when one can be found.
async fn lookup_local_card_db(card_ids: Vec<i64>) -> Result<HashMap<i64, String>, StoreError> {
    let Some(path) = discover_raw_card_db_path() else {
        return Ok(HashMap::new());
    };

    let result = tokio::task::spawn_blocking(move || query_raw_card_db(&path, &card_ids)).await;
    match result {
        Ok(names) => names,
        Err(join_err) => Err(StoreError::Io(std::io::Error::other(join_err))),
    }
}

fn query_raw_card_db(
    path: &std::path::Path,
    card_ids: &[i64],
) -> Result<HashMap<i64, String>, StoreError> {
    let conn = rusqlite::Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let placeholders = vec!["?"; card_ids.len()].join(",");
    let sql = format!(
        "SELECT
             c.GrpId,
             COALESCE(
                 NULLIF(TRIM(l1.Loc), ''),
                 NULLIF(TRIM(l2.Loc), ''),
                 NULLIF(TRIM(l3.Loc), '')
             ) AS name
         FROM Cards c
         LEFT JOIN Localizations_enUS l1 ON l1.LocId = c.TitleId
         LEFT JOIN Localizations_enUS l2 ON l2.LocId = c.AltTitleId
         LEFT JOIN Localizations_enUS l3 ON l3.LocId = c.InterchangeableTitleId
         WHERE c.GrpId IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> =
        card_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let mut rows = stmt.query(params.as_slice())?;

    let mut out = HashMap::with_capacity(card_ids.len());
    while let Some(row) = rows.next()? {
        let card_id: i64 = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        let Some(name) = name else { continue };
        let name = name.trim();
        if card_id > 0 && !name.is_empty() {
            out.insert(card_id, name.to_string());
        }
    }
    Ok(out)
}

/// Locate the newest raw card database: explicit env override first, then
/// the client's platform download directories.
fn discover_raw_card_db_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(RAW_CARD_DB_ENV) {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            let path = PathBuf::from(explicit);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;
    for dir in raw_card_db_dirs() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("Raw_CardDatabase") || !name.ends_with(".mtga") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };
            let newer = newest
                .as_ref()
                .map(|(_, best)| modified > *best)
                .unwrap_or(true);
            if newer {
                newest = Some((entry.path(), modified));
            }
        }
    }

    newest.map(|(path, _)| path)
}

fn raw_card_db_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(
            PathBuf::from(&home)
                .join("Library")
                .join("Application Support")
                .join("com.wizards.mtga")
                .join("Downloads")
                .join("Raw"),
        );
        dirs.push(
            PathBuf::from(&home)
                .join("AppData")
                .join("LocalLow")
                .join("Wizards Of The Coast")
                .join("MTGA")
                .join("Downloads")
                .join("Raw"),
        );
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        dirs.push(
            PathBuf::from(&profile)
                .join("AppData")
                .join("LocalLow")
                .join("Wizards Of The Coast")
                .join("MTGA")
                .join("Downloads")
                .join("Raw"),
        );
    }
    dirs
}
