//! Command-line driver for the analysis and practice pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use log::error;

use chess_coach::analysis::{analyze_game_into_db, spawn_batch, BatchEvent};
use chess_coach::db::models::{GameSource, PracticeCategory, PracticeResult};
use chess_coach::db::ops;
use chess_coach::engine::{EngineConfig, EngineSession};
use chess_coach::import::{import_pgn_file, import_pgn_text, ArchiveFilters, ChesscomImporter};
use chess_coach::practice::{record_attempt, select_practice_items};
use chess_coach::{Error, Services};

#[derive(Parser)]
#[command(name = "chess-coach", about = "Analyze chess games and train on your mistakes")]
struct Cli {
    /// Data directory (database, settings). Defaults to ./data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import games from a PGN file
    Import {
        path: PathBuf,
        /// Import duplicates instead of skipping them
        #[arg(long)]
        no_dedupe: bool,
    },
    /// Fetch games from the chess.com archive API
    Fetch {
        username: String,
        /// Inclusive start date, YYYY-MM-DD (UTC)
        #[arg(long)]
        from: Option<String>,
        /// Inclusive end date, YYYY-MM-DD (UTC)
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        rated_only: bool,
        /// bullet, blitz, rapid or daily
        #[arg(long)]
        time_class: Option<String>,
        /// chess, chess960, ...
        #[arg(long)]
        rules: Option<String>,
    },
    /// Analyze a stored game
    Analyze {
        game_id: i64,
        #[arg(long)]
        depth: Option<u32>,
        /// Seconds per move; takes precedence over depth
        #[arg(long)]
        movetime: Option<f64>,
    },
    /// Analyze every game without an analysis
    AnalyzeAll,
    /// List games and their analysis state
    Games,
    /// Show analysis and analytics for a game
    Stats { game_id: i64 },
    /// Select practice items for a session
    Practice {
        #[arg(long)]
        limit: Option<usize>,
        /// Only items that are due now
        #[arg(long)]
        due_only: bool,
        /// Categories to include (blunder, mistake, inaccuracy, critical)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },
    /// Record a practice attempt (pass_first_try, pass or fail)
    Attempt { item_id: i64, result: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let data_dir = cli.data_dir.unwrap_or_else(|| PathBuf::from("data"));
    let mut services = Services::init(&data_dir)?;

    match cli.command {
        Command::Import { path, no_dedupe } => {
            let dedupe = services.settings.general.auto_dedupe && !no_dedupe;
            let outcome =
                import_pgn_file(services.db.conn(), &path, GameSource::PgnImport, dedupe)?;
            println!("imported {} games", outcome.imported.len());
            for err in &outcome.errors {
                println!("  {}", err);
            }
        }

        Command::Fetch {
            username,
            from,
            to,
            rated_only,
            time_class,
            rules,
        } => {
            let filters = ArchiveFilters {
                rated_only,
                time_class,
                rules,
            };
            let start = from.as_deref().map(parse_day_start).transpose()?;
            let end = to.as_deref().map(parse_day_end).transpose()?;
            let importer = ChesscomImporter::new()?;
            let (pgns, errors) = importer.fetch_pgns(&username, start, end, &filters).await;
            let dedupe = services.settings.general.auto_dedupe;

            let mut imported = 0;
            for pgn in &pgns {
                let outcome =
                    import_pgn_text(services.db.conn(), pgn, GameSource::Chesscom, dedupe)?;
                imported += outcome.imported.len();
            }
            println!("fetched {} games, imported {}", pgns.len(), imported);
            for err in &errors {
                println!("  {}", err);
            }
        }

        Command::Analyze {
            game_id,
            depth,
            movetime,
        } => {
            let mut settings = services.settings.clone();
            if let Some(depth) = depth {
                settings.engine.depth = depth;
            }
            if let Some(movetime) = movetime {
                settings.engine.time_per_move = Some(movetime);
            }
            let mut session = EngineSession::new(EngineConfig::from_settings(&settings))?;
            let report =
                analyze_game_into_db(&mut services.db, &mut session, &settings, game_id).await?;
            session.shutdown().await;

            println!(
                "game {}: accuracy W {:.2} / B {:.2}, est. Elo W {} / B {}",
                game_id,
                report.accuracy_white,
                report.accuracy_black,
                report.perf_elo_white,
                report.perf_elo_black
            );
            if let Some(name) = &report.opening_name {
                let eco = report.eco_code.as_deref().unwrap_or("");
                match &report.opening_variation {
                    Some(variation) => println!("opening: {} {} ({})", eco, name, variation),
                    None => println!("opening: {} {}", eco, name),
                }
            }
        }

        Command::AnalyzeAll => {
            let ids = ops::unanalyzed_game_ids(services.db.conn())?;
            if ids.is_empty() {
                println!("nothing to analyze");
                return Ok(());
            }
            let db_path = services.db.path().to_path_buf();
            let mut handle = spawn_batch(db_path, services.settings.clone(), ids);
            while let Some(event) = handle.events.recv().await {
                match event {
                    BatchEvent::Progress {
                        done,
                        total,
                        current,
                    } => println!("[{}/{}] analyzing game {}", done + 1, total, current),
                    BatchEvent::Finished { analyzed, errors } => {
                        println!("analyzed {} games, {} errors", analyzed, errors.len());
                        for err in &errors {
                            println!("  {}", err);
                        }
                        break;
                    }
                }
            }
            let _ = handle.task.await;
        }

        Command::Games => {
            for game in ops::list_games(services.db.conn())? {
                let analyzed = ops::analysis_for_game(services.db.conn(), game.id)?.is_some();
                println!(
                    "{:>5}  {} vs {}  {}  {}  {}",
                    game.id,
                    game.white,
                    game.black,
                    game.date,
                    game.result,
                    if analyzed { "analyzed" } else { "-" }
                );
            }
        }

        Command::Stats { game_id } => {
            let game = ops::get_game(services.db.conn(), game_id)?;
            println!("{} vs {} ({})", game.white, game.black, game.result);
            if let Some(name) = &game.opening_name {
                println!(
                    "opening: {} {}",
                    game.eco_code.as_deref().unwrap_or(""),
                    name
                );
            }
            match ops::analysis_for_game(services.db.conn(), game_id)? {
                Some(analysis) => {
                    println!(
                        "engine {} depth {} | accuracy W {:.2} / B {:.2} | Elo W {} / B {}",
                        analysis.engine_version,
                        analysis.depth,
                        analysis.accuracy_white,
                        analysis.accuracy_black,
                        analysis.perf_elo_white,
                        analysis.perf_elo_black
                    );
                }
                None => println!("not analyzed yet"),
            }
            if let Some(a) = ops::analytics_for_game(services.db.conn(), game_id)? {
                println!(
                    "ACPL overall {} | opening {} / middlegame {} / endgame {}",
                    fmt_opt(a.acpl_overall),
                    fmt_opt(a.acpl_opening),
                    fmt_opt(a.acpl_middlegame),
                    fmt_opt(a.acpl_endgame)
                );
                println!(
                    "CPL buckets: 0-20 {}, 20-50 {}, 50-100 {}, 100-200 {}, 200+ {} (total {})",
                    a.cpl_0_20, a.cpl_20_50, a.cpl_50_100, a.cpl_100_200, a.cpl_200_plus,
                    a.cpl_total
                );
                println!(
                    "critical: faced {}, solved {}, failed {}",
                    a.critical_faced, a.critical_solved, a.critical_failed
                );
            }
        }

        Command::Practice {
            limit,
            due_only,
            categories,
        } => {
            let categories = if categories.is_empty() {
                vec![
                    PracticeCategory::Blunder,
                    PracticeCategory::Mistake,
                    PracticeCategory::Critical,
                ]
            } else {
                categories
                    .iter()
                    .map(|c| {
                        PracticeCategory::from_str(c)
                            .ok_or_else(|| Error::Settings(format!("unknown category: {}", c)))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            let limit = limit.unwrap_or(services.settings.practice.session_length);
            let items =
                select_practice_items(services.db.conn(), &categories, limit, due_only)?;
            if items.is_empty() {
                println!("no practice items available");
            }
            for item in items {
                println!(
                    "#{:<4} [{}] game {} ply {}  {} to move  target: {}",
                    item.id,
                    item.category.as_str(),
                    item.source_game_id,
                    item.source_ply_index,
                    chess_coach::db::models::color_as_str(item.side_to_move),
                    item.target_line_san.join(" ")
                );
            }
        }

        Command::Attempt { item_id, result } => {
            let result = PracticeResult::from_str(&result)
                .ok_or_else(|| Error::Settings(format!("unknown result: {}", result)))?;
            record_attempt(services.db.conn(), item_id, result)?;
            println!("recorded");
        }
    }

    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "-".to_string(),
    }
}

fn parse_day_start(day: &str) -> Result<DateTime<Utc>, Error> {
    parse_day(day, 0, 0, 0)
}

fn parse_day_end(day: &str) -> Result<DateTime<Utc>, Error> {
    parse_day(day, 23, 59, 59)
}

fn parse_day(day: &str, h: u32, m: u32, s: u32) -> Result<DateTime<Utc>, Error> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| Error::Settings(format!("invalid date {}: {}", day, e)))?;
    let naive = date
        .and_hms_opt(h, m, s)
        .ok_or_else(|| Error::Settings(format!("invalid time for {}", day)))?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}
