//! UCI engine subprocess management and protocol parsing.
//!
//! `EngineProcess` owns a spawned UCI engine, performs the initialization
//! handshake, and exposes line-based communication. Engine output is parsed
//! with `vampirc_uci`; scores are normalized to White's perspective here so
//! the rest of the crate never sees side-to-move frames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, error, info, warn};
use shakmaty::Color;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use vampirc_uci::UciInfoAttribute;

use crate::error::Error;

use super::types::{ENGINE_INIT_TIMEOUT, ENGINE_READY_TIMEOUT, MATE_SCORE_CP};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// A running UCI engine process after a successful handshake.
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    stdout_lines: Lines<BufReader<ChildStdout>>,
    name: String,
    sent_options: HashMap<String, String>,
}

impl EngineProcess {
    /// Spawn the engine at `path` and run the `uci`/`isready` handshake.
    pub async fn spawn(path: &Path) -> Result<Self, Error> {
        let mut command = Command::new(path);
        command.current_dir(path.parent().unwrap_or_else(|| Path::new(".")));
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn()?;
        info!("Starting engine process: {:?}", path);
        let mut stdin = child.stdin.take().ok_or(Error::NoStdin)?;
        let stdout = child.stdout.take().ok_or(Error::NoStdout)?;
        let mut stdout_lines = BufReader::new(stdout).lines();

        // Drain stderr to avoid deadlocks when the pipe buffer fills up.
        let stderr = child.stderr.take();
        tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    error!("[engine-stderr] {}", line);
                }
            }
        });

        stdin.write_all(b"uci\n").await?;

        let mut name = String::new();
        let uciok = tokio::time::timeout(ENGINE_INIT_TIMEOUT, async {
            while let Some(line) = stdout_lines.next_line().await? {
                if let Some(id) = line.strip_prefix("id name ") {
                    name = id.trim().to_string();
                }
                if line == "uciok" {
                    return Ok::<_, Error>(true);
                }
            }
            Ok(false)
        })
        .await;

        match uciok {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                return Err(Error::EngineInitFailed(
                    "engine closed before sending uciok".to_string(),
                ))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::EngineTimeout(
                    "engine did not respond to the uci command".to_string(),
                ))
            }
        }

        stdin.write_all(b"isready\n").await?;

        let readyok = tokio::time::timeout(ENGINE_READY_TIMEOUT, async {
            while let Some(line) = stdout_lines.next_line().await? {
                if line == "readyok" {
                    return Ok::<_, Error>(true);
                }
            }
            Ok(false)
        })
        .await;

        match readyok {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                return Err(Error::EngineInitFailed(
                    "engine closed before sending readyok".to_string(),
                ))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::EngineTimeout(
                    "engine did not respond to the isready command".to_string(),
                ))
            }
        }

        if name.is_empty() {
            name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown engine".to_string());
        }
        info!("Engine ready: {}", name);

        Ok(Self {
            child,
            stdin,
            stdout_lines,
            name,
            sent_options: HashMap::new(),
        })
    }

    /// The engine's self-reported identity (`id name`).
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn write_line(&mut self, line: &str) -> Result<(), Error> {
        debug!("[engine-stdin] {}", line.trim_end());
        self.stdin.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Set a UCI option, skipping the write when the value is unchanged.
    pub async fn set_option<T: std::fmt::Display>(
        &mut self,
        name: &str,
        value: T,
    ) -> Result<(), Error> {
        let value = value.to_string();
        if self.sent_options.get(name) == Some(&value) {
            return Ok(());
        }
        let msg = format!("setoption name {} value {}\n", name, value);
        self.write_line(&msg).await?;
        self.sent_options.insert(name.to_string(), value);
        Ok(())
    }

    pub async fn set_position(&mut self, fen: &str) -> Result<(), Error> {
        let msg = format!("position fen {}\n", fen);
        self.write_line(&msg).await
    }

    pub async fn go_depth(&mut self, depth: u32) -> Result<(), Error> {
        let msg = format!("go depth {}\n", depth);
        self.write_line(&msg).await
    }

    pub async fn go_movetime(&mut self, seconds: f64) -> Result<(), Error> {
        let millis = (seconds * 1000.0).max(1.0) as u64;
        let msg = format!("go movetime {}\n", millis);
        self.write_line(&msg).await
    }

    /// Read the next stdout line. `Ok(None)` means the engine closed stdout.
    pub async fn read_line(&mut self) -> Result<Option<String>, Error> {
        Ok(self.stdout_lines.next_line().await?)
    }

    /// Graceful `quit` with a force-kill fallback.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.stdin.write_all(b"quit\n").await {
            warn!("Failed to send quit command to engine: {}", e);
        }
        let wait = tokio::time::timeout(std::time::Duration::from_secs(2), self.child.wait()).await;
        match wait {
            Ok(Ok(status)) => {
                info!("Engine process exited with status: {:?}", status);
            }
            _ => {
                warn!("Engine did not exit gracefully, force-killing");
                let _ = self.child.kill().await;
                let _ = self.child.wait().await;
            }
        }
    }
}

/// One parsed principal variation from an `info` line.
#[derive(Debug, Clone, Default)]
pub(crate) struct PvLine {
    pub multipv: u16,
    pub depth: u32,
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
    pub moves: Vec<String>,
}

/// Parse the attributes of a UCI `info` message into a PV line.
///
/// `turn` is the side to move in the searched position; engine scores are
/// reported in that frame and flipped to White's perspective here. A mate
/// distance of zero (side to move is checkmated) becomes a `MATE_SCORE_CP`
/// centipawn score since its sign cannot carry the winner.
///
/// Returns `None` for info lines without a PV (currmove updates and such).
pub(crate) fn parse_info_attrs(attrs: Vec<UciInfoAttribute>, turn: Color) -> Option<PvLine> {
    let mut line = PvLine {
        multipv: 1,
        ..Default::default()
    };
    let mut has_pv = false;

    for attr in attrs {
        match attr {
            UciInfoAttribute::Pv(moves) => {
                has_pv = true;
                line.moves = moves.iter().map(|m| m.to_string()).collect();
            }
            UciInfoAttribute::MultiPv(multipv) => {
                line.multipv = multipv;
            }
            UciInfoAttribute::Depth(depth) => {
                line.depth = u32::from(depth);
            }
            UciInfoAttribute::Score { cp, mate, .. } => {
                let flip = turn == Color::Black;
                if let Some(mate) = mate {
                    if mate == 0 {
                        line.score_cp = Some(if flip { MATE_SCORE_CP } else { -MATE_SCORE_CP });
                    } else {
                        let mate = i32::from(mate);
                        line.score_mate = Some(if flip { -mate } else { mate });
                    }
                } else if let Some(cp) = cp {
                    line.score_cp = Some(if flip { -cp } else { cp });
                }
            }
            _ => {}
        }
    }

    if has_pv {
        Some(line)
    } else {
        None
    }
}

/// Locate a UCI engine binary.
///
/// Order: the configured path, executables named `stockfish` on PATH, a fixed
/// list of OS-conventional install locations, and finally the user's download
/// directory. Failing all of these is fatal for an analysis run.
pub fn locate_engine(configured: Option<&Path>) -> Result<PathBuf, Error> {
    let mut searched = Vec::new();

    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        searched.push(path.to_path_buf());
    }

    let names: &[&str] = if cfg!(target_os = "windows") {
        &["stockfish.exe", "stockfish_x64.exe"]
    } else {
        &["stockfish"]
    };

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for name in names {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }
    searched.push(PathBuf::from("$PATH"));

    let mut fixed: Vec<PathBuf> = Vec::new();
    if cfg!(target_os = "windows") {
        fixed.push(PathBuf::from(r"C:\Program Files\Stockfish\stockfish.exe"));
        fixed.push(PathBuf::from(
            r"C:\Program Files (x86)\Stockfish\stockfish.exe",
        ));
    } else {
        fixed.push(PathBuf::from("/usr/bin/stockfish"));
        fixed.push(PathBuf::from("/usr/local/bin/stockfish"));
        fixed.push(PathBuf::from("/opt/homebrew/bin/stockfish"));
    }
    if let Some(home) = dirs::home_dir() {
        fixed.push(home.join("stockfish").join("stockfish"));
    }

    for candidate in fixed {
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    if let Some(downloads) = dirs::download_dir() {
        if let Ok(entries) = std::fs::read_dir(&downloads) {
            for entry in entries.flatten() {
                let file_name = entry.file_name().to_string_lossy().to_lowercase();
                if file_name.starts_with("stockfish") && entry.path().is_file() {
                    return Ok(entry.path());
                }
            }
        }
        searched.push(downloads.join("stockfish*"));
    }

    Err(Error::EngineNotFound { searched })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vampirc_uci::{parse_one, UciMessage};

    fn info_line(line: &str, turn: Color) -> Option<PvLine> {
        match parse_one(line) {
            UciMessage::Info(attrs) => parse_info_attrs(attrs, turn),
            other => panic!("expected info message, got {:?}", other),
        }
    }

    #[test]
    fn parses_cp_score_and_pv() {
        let line = info_line(
            "info depth 20 seldepth 28 multipv 1 score cp 34 nodes 1000 pv e2e4 e7e5 g1f3",
            Color::White,
        )
        .unwrap();
        assert_eq!(line.multipv, 1);
        assert_eq!(line.depth, 20);
        assert_eq!(line.score_cp, Some(34));
        assert_eq!(line.moves, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn flips_score_when_black_to_move() {
        let line = info_line(
            "info depth 18 multipv 1 score cp 55 pv e7e5",
            Color::Black,
        )
        .unwrap();
        assert_eq!(line.score_cp, Some(-55));
    }

    #[test]
    fn mate_score_keeps_white_reference() {
        let line = info_line("info depth 12 score mate 3 pv d1h5", Color::White).unwrap();
        assert_eq!(line.score_mate, Some(3));
        assert_eq!(line.score_cp, None);

        let line = info_line("info depth 12 score mate 2 pv d8h4", Color::Black).unwrap();
        assert_eq!(line.score_mate, Some(-2));
    }

    #[test]
    fn info_without_pv_is_ignored() {
        assert!(info_line(
            "info depth 10 currmove e2e4 currmovenumber 1",
            Color::White
        )
        .is_none());
    }
}
