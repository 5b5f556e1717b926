//! ECO opening detection.
//!
//! A static catalog of SAN-move-prefix -> (code, name, variation) entries,
//! loaded once from an embedded TSV. Detection is longest-prefix matching of
//! a game's SAN mainline against the catalog; no match leaves the opening
//! fields empty.

use std::collections::HashMap;

use lazy_static::lazy_static;
use log::info;
use serde::Deserialize;
use shakmaty::san::{San, SanPlus};
use shakmaty::{Chess, Position};

/// Openings beyond this many plies are not in the catalog.
const MAX_OPENING_PLIES: usize = 24;

const ECO_DATA: &[u8] = include_bytes!("../data/eco.tsv");

#[derive(Debug, Clone)]
pub struct EcoEntry {
    pub code: String,
    pub name: String,
    pub variation: Option<String>,
}

#[derive(Deserialize)]
struct EcoRecord {
    eco: String,
    name: String,
    pgn: String,
}

lazy_static! {
    static ref OPENINGS: HashMap<String, EcoEntry> = {
        let mut table = HashMap::new();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(ECO_DATA);
        let mut loaded = 0;
        for result in reader.deserialize() {
            let record: EcoRecord = match result {
                Ok(record) => record,
                Err(e) => {
                    info!("Failed to deserialize opening record: {}", e);
                    continue;
                }
            };

            // Replay the PGN column to get a normalized SAN key; move-number
            // tokens simply fail to parse as SAN and are skipped.
            let mut pos = Chess::default();
            let mut sans = Vec::new();
            for token in record.pgn.split_whitespace() {
                if let Ok(san) = token.parse::<San>() {
                    match san.to_move(&pos) {
                        Ok(mv) => {
                            let normalized = SanPlus::from_move_and_play_unchecked(&mut pos, &mv);
                            sans.push(normalized.to_string());
                        }
                        Err(_) => {
                            info!("Skipping invalid move in opening {}: {}", record.name, token);
                        }
                    }
                }
            }
            if sans.is_empty() {
                continue;
            }

            let (name, variation) = split_name(&record.name);
            table.insert(
                sans.join(" "),
                EcoEntry {
                    code: record.eco,
                    name,
                    variation,
                },
            );
            loaded += 1;
        }
        info!("Loaded {} openings", loaded);
        table
    };
}

/// Split a catalog name of the form "Opening: Variation".
fn split_name(full: &str) -> (String, Option<String>) {
    match full.split_once(':') {
        Some((name, variation)) => (
            name.trim().to_string(),
            Some(variation.trim().to_string()).filter(|v| !v.is_empty()),
        ),
        None => (full.trim().to_string(), None),
    }
}

/// Find the opening matching the longest prefix of a game's SAN mainline.
pub fn detect_opening(san_moves: &[String]) -> Option<&'static EcoEntry> {
    let max = san_moves.len().min(MAX_OPENING_PLIES);
    for len in (1..=max).rev() {
        let key = san_moves[..len].join(" ");
        if let Some(entry) = OPENINGS.get(&key) {
            return Some(entry);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sans(moves: &[&str]) -> Vec<String> {
        moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn longest_prefix_wins() {
        // A full Najdorf move order should match B90, not the shorter
        // Sicilian prefixes.
        let game = sans(&[
            "e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4", "Nf6", "Nc3", "a6", "Be2", "e5",
        ]);
        let entry = detect_opening(&game).unwrap();
        assert_eq!(entry.code, "B90");
        assert_eq!(entry.name, "Sicilian Defense");
        assert_eq!(entry.variation.as_deref(), Some("Najdorf Variation"));
    }

    #[test]
    fn shorter_prefixes_still_match() {
        let entry = detect_opening(&sans(&["e4", "c5", "g3"])).unwrap();
        assert_eq!(entry.code, "B20");
        assert_eq!(entry.variation, None);
    }

    #[test]
    fn ruy_lopez_variations_are_distinguished() {
        let berlin = detect_opening(&sans(&["e4", "e5", "Nf3", "Nc6", "Bb5", "Nf6"])).unwrap();
        assert_eq!(berlin.code, "C65");

        let exchange =
            detect_opening(&sans(&["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Bxc6"])).unwrap();
        assert_eq!(exchange.code, "C68");
        assert_eq!(exchange.variation.as_deref(), Some("Exchange Variation"));
    }

    #[test]
    fn no_match_for_irregular_moves() {
        assert!(detect_opening(&sans(&["a3"])).is_none());
        assert!(detect_opening(&[]).is_none());
    }

    #[test]
    fn queens_pawn_lines() {
        let qgd = detect_opening(&sans(&["d4", "d5", "c4", "e6", "Nc3"])).unwrap();
        assert_eq!(qgd.code, "D30");
        assert_eq!(qgd.name, "Queen's Gambit Declined");
    }
}
