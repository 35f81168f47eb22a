use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall::{
    archive::{ArchiveError, ArchiveOptions, ArchiveSession, ArchiveWorkflow},
    attendance,
    config::Settings,
    export::{ExportCenter, ExportMode},
    fetch::fetch_all_rows,
    history::{ArchiveLog, HistoryListener},
    month::MonthTable,
    normalize::AttendanceStatus,
    stats::MemberStats,
    store::{BackingStore, RestStore},
};
use serde_json::Value;
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Archive and export monthly attendance tables")]
struct Cli {
    /// YAML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print member statistics for one monthly table, e.g. `december_2025`
    Summary { table: MonthTable },

    /// Save a table to CSV, then delete it from the store
    Archive {
        table: MonthTable,
        /// Delete without asking
        #[arg(long)]
        yes: bool,
        /// Skip saving the CSV before deleting
        #[arg(long)]
        no_download: bool,
        /// Directory for the CSV (defaults to `output_dir`)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Merge several monthly tables into one CSV
    Export {
        #[arg(long, value_delimiter = ',', required = true)]
        tables: Vec<MonthTable>,
        /// Output columns in order; defaults to every column found
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long, default_value = "standard")]
        mode: ExportMode,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Set one member's attendance for a date
    Mark {
        table: MonthTable,
        /// Member id
        member: String,
        date: NaiveDate,
        /// present, absent or unmarked
        status: String,
    },

    /// List previously archived tables
    History,
}

fn init_logging() {
    let env = match env::var("LOG_LEVEL") {
        Ok(level) => EnvFilter::new(level),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,rollcall=info")),
    };
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(store = %settings.store.url, "startup");

    match cli.command {
        Command::Summary { table } => summary(&settings, table).await,
        Command::Archive {
            table,
            yes,
            no_download,
            out,
        } => {
            let out = out.unwrap_or_else(|| settings.output_dir.clone());
            archive(&settings, table, yes, no_download, &out).await
        }
        Command::Export {
            tables,
            columns,
            mode,
            out,
        } => {
            let out = out.unwrap_or_else(|| settings.output_dir.clone());
            export(&settings, tables, columns, mode, &out).await
        }
        Command::Mark {
            table,
            member,
            date,
            status,
        } => mark(&settings, table, &member, date, &status).await,
        Command::History => history(&settings),
    }
}

fn open_store(settings: &Settings) -> Result<Arc<dyn BackingStore>> {
    Ok(Arc::new(RestStore::new(&settings.store)?))
}

async fn summary(settings: &Settings, table: MonthTable) -> Result<()> {
    let store = open_store(settings)?;
    let rows = fetch_all_rows(store.as_ref(), &table.table_name(), settings.page_size).await?;
    let title = format!("{} {}", table.month_name(), table.year());
    for line in MemberStats::from_rows(&rows).summary_lines(&title) {
        println!("{}", line);
    }
    Ok(())
}

fn print_session(session: &ArchiveSession) {
    let title = format!(
        "{} {} ({} rows)",
        session.table().month_name(),
        session.table().year(),
        session.rows().len()
    );
    for line in session.stats().summary_lines(&title) {
        println!("{}", line);
    }
}

async fn ask(question: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(question.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading answer from stdin")?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn archive(
    settings: &Settings,
    table: MonthTable,
    yes: bool,
    no_download: bool,
    out: &Path,
) -> Result<()> {
    let store = open_store(settings)?;
    let listener = Arc::new(HistoryListener::new(ArchiveLog::new(&settings.history_dir)?));
    let mut wf = ArchiveWorkflow::open(store, table, ArchiveOptions::from(settings), listener).await?;
    print_session(wf.session());

    if !no_download {
        let path = wf.download(out)?;
        println!("Saved {}", path.display());
    }

    wf.request_delete()?;
    let question = format!("Delete table {} from the store? [y/N] ", table);
    if !yes && !ask(&question).await? {
        wf.cancel_delete()?;
        wf.close();
        println!("Kept {}", table);
        return Ok(());
    }

    loop {
        match wf.confirm_delete().await {
            Ok(outcome) => {
                if outcome.already_deleted {
                    println!("{} was already deleted", outcome.table);
                } else {
                    println!("Archived {} ({} rows)", outcome.table, outcome.rows);
                }
                return Ok(());
            }
            Err(err @ ArchiveError::Delete { .. }) => {
                error!(error = %err, "delete failed");
                if yes || !ask("Delete failed. Retry? [y/N] ").await? {
                    return Err(err.into());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn export(
    settings: &Settings,
    tables: Vec<MonthTable>,
    columns: Vec<String>,
    mode: ExportMode,
    out: &Path,
) -> Result<()> {
    let mut center = ExportCenter::new(open_store(settings)?, settings);
    for table in tables {
        if !center.select(table) {
            info!(%table, "already selected");
        }
    }
    center.set_columns(columns);

    let doc = center.export(mode).await?;
    if doc.malformed_cells > 0 {
        println!("{} cells could not be written and were left empty", doc.malformed_cells);
    }
    let path = doc.save(out)?;
    println!("Saved {} ({} rows)", path.display(), doc.rows);
    Ok(())
}

fn parse_status(raw: &str) -> Result<Option<AttendanceStatus>> {
    if raw.trim().eq_ignore_ascii_case("unmarked") {
        return Ok(None);
    }
    match AttendanceStatus::from_value(&Value::String(raw.to_string())) {
        Some(status) => Ok(Some(status)),
        None => bail!("unknown status `{}` (expected present, absent or unmarked)", raw),
    }
}

async fn mark(
    settings: &Settings,
    table: MonthTable,
    member: &str,
    date: NaiveDate,
    status: &str,
) -> Result<()> {
    let status = parse_status(status)?;
    // numeric ids go over the wire as numbers
    let member = serde_json::from_str::<Value>(member)
        .ok()
        .filter(Value::is_number)
        .unwrap_or_else(|| Value::String(member.to_string()));

    let store = open_store(settings)?;
    let column = attendance::mark(store.as_ref(), &table, member, date, status).await?;
    println!("Updated {} in {}", column, table);
    Ok(())
}

fn history(settings: &Settings) -> Result<()> {
    let log = ArchiveLog::new(&settings.history_dir)?;
    let entries = log.load()?;
    if entries.is_empty() {
        println!("No archived tables");
    }
    for e in entries {
        println!(
            "{}  {}  {} rows  {}",
            e.archived_at.format("%Y-%m-%d %H:%M"),
            e.table,
            e.rows,
            e.csv_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not downloaded".to_string())
        );
    }
    Ok(())
}
