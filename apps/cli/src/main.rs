use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sift_core::{DerivedId, Event, FsSourceLoader, NoticeLevel, SourceId, SourceWatcher};
use sift_search::{Query, QueryKind};
use sift_session::{Origin, Session, SessionConfig, SnapshotStore};
use sift_settings::PreferencesStore;
use tracing_subscriber::EnvFilter;

const STATE_DIR: &str = ".sift";
const LOG_ENV: &str = "SIFT_LOG";
const WATCH_POLL: Duration = Duration::from_millis(250);
const WATCH_SETTLE: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(
    name = "sift",
    about = "Narrow text files through chains of text/regex filters",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// 工作階段快照路徑。 / Session snapshot path (defaults to `<workspace>/.sift/session.json`).
    #[arg(long, global = true, value_name = "FILE")]
    state: Option<PathBuf>,

    /// 偏好設定檔路徑。 / Preferences file (defaults to `<workspace>/.sift/preferences.json`).
    #[arg(long, global = true, value_name = "FILE")]
    prefs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 對來源或衍生文件再套用一個篩選。 / Apply one more filter to a source file or derived document.
    Run(RunArgs),
    /// 顯示衍生文件內容。 / Print the content of a derived document.
    Show(ShowArgs),
    /// 顯示文件樹。 / Print the derived-document tree.
    Tree,
    /// 關閉文件及其所有子文件。 / Close a derived document together with its subtree.
    Close(CloseArgs),
    /// 切換或列出醒目提示。 / Toggle a persistent highlight, or list them.
    Highlight(HighlightArgs),
    /// 釋放未開啟文件的內容。 / Drop cached content of documents that are not open.
    Cleanup(CleanupArgs),
    /// 監看來源並重新產生受影響的文件。 / Watch sources and regenerate the documents they feed.
    Watch(WatchArgs),
}

#[derive(Args)]
struct RunArgs {
    /// 來源檔案路徑或 `sift:///` 識別。 / Source file path or `sift:///` identity to filter.
    origin: String,

    /// 篩選樣式。 / Filter pattern.
    pattern: String,

    /// 以正規表示式解讀樣式。 / Interpret the pattern as a regular expression.
    #[arg(long)]
    regex: bool,

    /// 正規表示式旗標，例如 `m` 或 `x`。 / Regex flags such as `m` or `x`.
    #[arg(long, value_name = "FLAGS", requires = "regex")]
    flags: Option<String>,

    /// 保留不符合的行。 / Keep the lines that do NOT match.
    #[arg(long)]
    invert: bool,

    /// 區分大小寫。 / Case sensitive matching.
    #[arg(long)]
    case_sensitive: bool,

    /// 同時輸出結果內容。 / Also print the resulting content.
    #[arg(long)]
    print: bool,
}

#[derive(Args)]
struct ShowArgs {
    /// 衍生文件識別。 / Derived document identity.
    identity: String,
}

#[derive(Args)]
struct CloseArgs {
    /// 衍生文件識別。 / Derived document identity.
    identity: String,
}

#[derive(Args)]
struct HighlightArgs {
    /// 要切換的樣式；省略時列出現有項目。 / Pattern to toggle; lists highlights when omitted.
    pattern: Option<String>,

    /// 以正規表示式解讀樣式。 / Interpret the pattern as a regular expression.
    #[arg(long)]
    regex: bool,

    /// 區分大小寫。 / Case sensitive matching.
    #[arg(long)]
    case_sensitive: bool,
}

#[derive(Args)]
struct CleanupArgs {
    /// 仍在開啟中的文件，其內容會保留。 / Identities still open; their content is kept.
    #[arg(long = "open", value_name = "IDENTITY")]
    open: Vec<String>,
}

#[derive(Args)]
struct WatchArgs {
    /// 處理指定批數的變更後結束。 / Exit after this many batches of source changes.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<()> {
    let Cli {
        workspace,
        state,
        prefs,
        command,
    } = Cli::parse();
    let workspace_root = resolve_workspace(workspace)?;
    let state_path = match state {
        Some(path) => resolve_input_path(&path)?,
        None => workspace_root.join(STATE_DIR).join("session.json"),
    };
    let prefs_path = match prefs {
        Some(path) => resolve_input_path(&path)?,
        None => workspace_root.join(STATE_DIR).join("preferences.json"),
    };

    let mut session = open_session(&state_path, &prefs_path)?;
    let outcome = match command {
        Commands::Run(args) => execute_run(&mut session, args),
        Commands::Show(args) => execute_show(&mut session, args),
        Commands::Tree => execute_tree(&session),
        Commands::Close(args) => execute_close(&mut session, args),
        Commands::Highlight(args) => execute_highlight(&mut session, args),
        Commands::Cleanup(args) => execute_cleanup(&mut session, args),
        Commands::Watch(args) => execute_watch(&mut session, args),
    };
    report_notices(&mut session);
    outcome?;

    session
        .flush()
        .with_context(|| format!("failed to save session to {}", state_path.display()))?;
    Ok(())
}

fn open_session(state_path: &Path, prefs_path: &Path) -> Result<Session<FsSourceLoader>> {
    let preferences = PreferencesStore::load(prefs_path)
        .with_context(|| format!("failed to load preferences from {}", prefs_path.display()))?;
    let config = SessionConfig::from_preferences(preferences.preferences());
    let mut session =
        Session::new(FsSourceLoader, config).with_snapshot_store(SnapshotStore::new(state_path));
    session
        .load()
        .with_context(|| format!("failed to load session from {}", state_path.display()))?;
    // Restoring queues a refresh event the one-shot CLI has no use for.
    session.drain_events();
    Ok(session)
}

fn execute_run(session: &mut Session<FsSourceLoader>, args: RunArgs) -> Result<()> {
    let origin = if DerivedId::is_derived(&args.origin) {
        Origin::Document(DerivedId::from_raw(args.origin))
    } else {
        let path = resolve_input_path(Path::new(&args.origin))?;
        if !path.is_file() {
            bail!("source file '{}' does not exist", path.display());
        }
        Origin::Source(SourceId::from_path(path))
    };

    let mut query = if args.regex {
        Query::regex(args.pattern)
    } else {
        Query::text(args.pattern)
    };
    if let Some(flags) = args.flags {
        query = query.with_flags(flags);
    }
    let query = query
        .inverted(args.invert)
        .case_sensitive(args.case_sensitive);

    let id = session.run_chain(&origin, query)?;
    println!("{id}");
    if args.print {
        if let Some(text) = session.read_now(&id) {
            print!("{text}");
        }
    }
    Ok(())
}

fn execute_show(session: &mut Session<FsSourceLoader>, args: ShowArgs) -> Result<()> {
    let id = DerivedId::from_raw(args.identity);
    let text = session
        .read_now(&id)
        .ok_or_else(|| anyhow!("no derived document named {id}"))?;
    print!("{text}");
    Ok(())
}

fn execute_tree(session: &Session<FsSourceLoader>) -> Result<()> {
    if session.roots().is_empty() {
        println!("No derived documents.");
        return Ok(());
    }
    print!("{}", session.forest().render());
    Ok(())
}

fn execute_close(session: &mut Session<FsSourceLoader>, args: CloseArgs) -> Result<()> {
    let id = DerivedId::from_raw(args.identity);
    let node = session
        .forest()
        .node_for(&id)
        .map(|node| node.id)
        .ok_or_else(|| anyhow!("no derived document named {id}"))?;
    let removed = session.close_node(node)?;
    println!("Closed {} document(s)", removed.len());
    Ok(())
}

fn execute_highlight(session: &mut Session<FsSourceLoader>, args: HighlightArgs) -> Result<()> {
    let Some(pattern) = args.pattern else {
        if session.highlights().is_empty() {
            println!("No highlights.");
        }
        for entry in session.highlights().entries() {
            println!(
                "{}\t{}\t{}{}",
                entry.color,
                entry.kind.name(),
                entry.pattern,
                if entry.case_sensitive {
                    " (case-sensitive)"
                } else {
                    ""
                }
            );
        }
        return Ok(());
    };

    let kind = if args.regex {
        QueryKind::Regex
    } else {
        QueryKind::Text
    };
    match session.toggle_highlight(&pattern, kind, args.case_sensitive) {
        Some(entry) => println!("Added highlight \"{}\" ({})", entry.pattern, entry.color),
        None => println!("Removed highlight \"{pattern}\""),
    }
    Ok(())
}

fn execute_cleanup(session: &mut Session<FsSourceLoader>, args: CleanupArgs) -> Result<()> {
    let open: HashSet<DerivedId> = args.open.into_iter().map(DerivedId::from_raw).collect();
    let report = session.cleanup(&open);
    println!(
        "Removed {} orphaned and {} cached document(s)",
        report.orphans, report.evicted
    );
    Ok(())
}

fn execute_watch(session: &mut Session<FsSourceLoader>, args: WatchArgs) -> Result<()> {
    let sources = session.watched_sources();
    if sources.is_empty() {
        println!("No sources to watch.");
        return Ok(());
    }
    let mut watcher = SourceWatcher::new().context("failed to start file watcher")?;
    for source in &sources {
        watcher
            .watch(source)
            .with_context(|| format!("failed to watch {source}"))?;
    }
    eprintln!("Watching {} source(s)", sources.len());

    let mut seen = 0;
    while args.limit.map_or(true, |limit| seen < limit) {
        if let Some(first) = watcher.recv_timeout(WATCH_POLL)? {
            // One save usually arrives as several events; wait for the burst to settle.
            let mut burst = vec![first];
            while let Some(next) = watcher.recv_timeout(WATCH_SETTLE)? {
                burst.push(next);
            }
            seen += 1;
            let mut changed = BTreeSet::new();
            for event in &burst {
                changed.extend(session.apply_source_event(event));
            }
            for id in changed {
                session.read_now(&id);
                println!("{id}");
            }
            report_notices(session);
        }
        session.tick(Instant::now())?;
    }
    Ok(())
}

fn report_notices(session: &mut Session<FsSourceLoader>) {
    for event in session.drain_events() {
        if let Event::Notice(notice) = event {
            let level = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            eprintln!("{level}: {}", notice.message);
        }
    }
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
