//! Chess.com public archive importer.
//!
//! Archives are discovered via `{base}/player/{user}/games/archives`, months
//! outside the requested range are skipped, and each remaining month's
//! `games` array is filtered by the per-game `end_time` and the optional
//! rated/time-class/rules filters. HTTP failures are accumulated per URL and
//! reported alongside the PGNs that did come through.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use log::{info, warn};
use serde::Deserialize;

use crate::error::Error;

pub const CHESSCOM_API_BASE: &str = "https://api.chess.com/pub/player";
const USER_AGENT: &str = "chess-coach/0.1 (offline game analysis)";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

#[derive(Debug, Clone, Default)]
pub struct ArchiveFilters {
    pub rated_only: bool,
    pub time_class: Option<String>,
    pub rules: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArchiveIndex {
    #[serde(default)]
    archives: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MonthlyGames {
    #[serde(default)]
    games: Vec<ArchivedGame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchivedGame {
    pub pgn: Option<String>,
    pub end_time: Option<i64>,
    #[serde(default)]
    pub rated: bool,
    pub time_class: Option<String>,
    pub rules: Option<String>,
}

pub struct ChesscomImporter {
    client: reqwest::Client,
    base_url: String,
}

impl ChesscomImporter {
    pub fn new() -> Result<Self, Error> {
        Self::with_base_url(CHESSCOM_API_BASE.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Fetch the PGNs of a user's games within an inclusive UTC date range.
    ///
    /// Returns the PGN strings and the accumulated per-URL error messages;
    /// network failures never abort the remaining months.
    pub async fn fetch_pgns(
        &self,
        username: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        filters: &ArchiveFilters,
    ) -> (Vec<String>, Vec<String>) {
        let mut pgns = Vec::new();
        let mut errors = Vec::new();

        let username = username.trim().to_lowercase();
        if username.is_empty() {
            errors.push("username is required".to_string());
            return (pgns, errors);
        }

        let archives_url = format!("{}/{}/games/archives", self.base_url, username);
        let archive_urls = match self.get_json::<ArchiveIndex>(&archives_url).await {
            Ok(index) => index.archives,
            Err(e) => {
                errors.push(format!("{}: {}", archives_url, e));
                return (pgns, errors);
            }
        };
        if archive_urls.is_empty() {
            errors.push(format!("no archive months available for {}", username));
            return (pgns, errors);
        }

        let start_month = start.map(|d| (d.year(), d.month()));
        let end_month = end.map(|d| (d.year(), d.month()));

        for archive_url in archive_urls {
            let Some(month) = archive_year_month(&archive_url) else {
                continue;
            };
            if !month_in_range(month, start_month, end_month) {
                continue;
            }

            let games = match self.get_json::<MonthlyGames>(&archive_url).await {
                Ok(month) => month.games,
                Err(e) => {
                    warn!("Failed to fetch {}: {}", archive_url, e);
                    errors.push(format!("{}: {}", archive_url, e));
                    continue;
                }
            };

            for game in games {
                if game_matches(&game, filters, start, end) {
                    if let Some(pgn) = game.pgn {
                        pgns.push(pgn);
                    }
                }
            }
        }

        info!(
            "Fetched {} games from chess.com for {} ({} errors)",
            pgns.len(),
            username,
            errors.len()
        );
        (pgns, errors)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

/// Extract `(year, month)` from a monthly archive URL.
fn archive_year_month(url: &str) -> Option<(i32, u32)> {
    let mut parts = url.trim_matches('/').rsplit('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

fn month_in_range(
    month: (i32, u32),
    start: Option<(i32, u32)>,
    end: Option<(i32, u32)>,
) -> bool {
    if let Some(start) = start {
        if month < start {
            return false;
        }
    }
    if let Some(end) = end {
        if month > end {
            return false;
        }
    }
    true
}

/// Apply the rated/time-class/rules filters and the end-time range check.
fn game_matches(
    game: &ArchivedGame,
    filters: &ArchiveFilters,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> bool {
    if game.pgn.is_none() {
        return false;
    }
    if filters.rated_only && !game.rated {
        return false;
    }
    if let Some(time_class) = &filters.time_class {
        if game.time_class.as_deref() != Some(time_class.as_str()) {
            return false;
        }
    }
    if let Some(rules) = &filters.rules {
        if game.rules.as_deref() != Some(rules.as_str()) {
            return false;
        }
    }

    // Games without a parseable end time stay in, like any other game whose
    // position in the range cannot be judged.
    let Some(end_time) = game.end_time else {
        return true;
    };
    let Some(ended) = Utc.timestamp_opt(end_time, 0).single() else {
        return true;
    };
    if let Some(start) = start {
        if ended < start {
            return false;
        }
    }
    if let Some(end) = end {
        if ended > end {
            return false;
        }
    }
    true
}
