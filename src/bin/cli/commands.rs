//! Command implementations for the CLI tool.

use std::path::{Path, PathBuf};

use backpipe::{BackupConfig, BackupRecord, Decisions, Error, Pipeline, RecordStore};
use log::debug;

use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;
use crate::password::get_or_prompt_key;
use crate::progress::CliProgress;
use crate::{OutputFormat, OverwriteMode};

/// Configuration for the backup command.
pub struct BackupArgs<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    pub extra_sources: &'a [PathBuf],
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub pack: Option<String>,
    pub compress: Option<String>,
    pub level: u32,
    pub encrypt: Option<String>,
    pub key: Option<String>,
    pub description: Option<String>,
    pub overwrite: OverwriteMode,
    pub no_record: bool,
    pub records: &'a Path,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Which record the recover command restores.
pub enum RecordSelector {
    Index(usize),
    Latest {
        name: String,
        time: Option<String>,
    },
}

/// Configuration for the recover command.
pub struct RecoverArgs<'a> {
    pub records: &'a Path,
    pub selector: RecordSelector,
    pub destination: &'a Path,
    pub key: Option<String>,
    pub overwrite: OverwriteMode,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Answers pipeline questions from flags, falling back to prompts.
pub struct CliDecisions {
    overwrite: OverwriteMode,
    key: Option<String>,
}

impl CliDecisions {
    pub fn new(overwrite: OverwriteMode, key: Option<String>) -> Self {
        Self { overwrite, key }
    }
}

impl Decisions for CliDecisions {
    fn confirm_overwrite(&mut self, existing: &Path) -> bool {
        match self.overwrite {
            OverwriteMode::Always => true,
            OverwriteMode::Never => false,
            OverwriteMode::Prompt => prompt_overwrite(existing),
        }
    }

    fn key_for(&mut self, artifact: &Path) -> Option<String> {
        let prompt = format!("Key for {}: ", artifact.display());
        get_or_prompt_key(self.key.clone(), &prompt, false)
    }
}

/// Prompts the user about replacing an existing file or directory.
fn prompt_overwrite(path: &Path) -> bool {
    use dialoguer::{Confirm, theme::ColorfulTheme};

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{} exists. Overwrite?", path.display()))
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn fail(e: &Error) -> ExitCode {
    eprintln!("Error: {}", e);
    error_to_exit_code(e)
}

fn open_records(path: &Path) -> Result<RecordStore, ExitCode> {
    RecordStore::open(path).map_err(|e| {
        eprintln!("Error opening records {}: {}", path.display(), e);
        error_to_exit_code(&e)
    })
}

/// Builds the library configuration from command line arguments.
fn build_config(args: &BackupArgs<'_>) -> backpipe::Result<BackupConfig> {
    let mut config = BackupConfig::new(args.source, args.destination)
        .recursive(args.recursive)
        .follow_symlinks(args.follow_symlinks)
        .compression_level(args.level)?;
    for extra in args.extra_sources {
        config = config.extra_source(extra);
    }
    for pattern in args.include {
        config = config.include(pattern)?;
    }
    for pattern in args.exclude {
        config = config.exclude(pattern)?;
    }
    if let Some(name) = &args.pack {
        config = config.pack(name.as_str());
    }
    if let Some(name) = &args.compress {
        config = config.compress(name.as_str());
    }
    if let Some(description) = &args.description {
        config = config.description(description.as_str());
    }
    Ok(config)
}

/// Backup command implementation
pub fn backup(args: &BackupArgs<'_>) -> ExitCode {
    let formatter = create_formatter(args.format);

    let mut config = match build_config(args) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    if let Some(name) = &args.encrypt {
        let Some(key) = get_or_prompt_key(args.key.clone(), "Enter key: ", true) else {
            eprintln!("Error: encryption requires a key");
            return ExitCode::BadArgs;
        };
        config = config.encrypt(name.as_str(), key);
    }
    debug!("backup configuration: {}", config);

    let pipeline = Pipeline::new();
    let mut decisions = CliDecisions::new(args.overwrite, None);
    let mut progress = CliProgress::new(args.quiet || args.format == OutputFormat::Json);

    let report = match pipeline.backup_with_progress(&config, &mut decisions, &mut progress) {
        Ok(report) => report,
        Err(e) => {
            progress.fail();
            return fail(&e);
        }
    };

    debug!("{} stages completed", progress.completed());

    if !args.no_record {
        let saved = open_records(args.records).and_then(|mut store| {
            store
                .add(report.record.clone())
                .and_then(|()| store.save())
                .map_err(|e| {
                    eprintln!("Error saving record: {}", e);
                    error_to_exit_code(&e)
                })
        });
        if let Err(code) = saved {
            // The artifact exists; only the bookkeeping failed.
            print!("{}", formatter.format_backup(&report));
            return code;
        }
    }

    if !args.quiet || args.format == OutputFormat::Json {
        print!("{}", formatter.format_backup(&report));
    }
    ExitCode::Success
}

fn select_record<'s>(store: &'s RecordStore, selector: &RecordSelector) -> backpipe::Result<(usize, &'s BackupRecord)> {
    match selector {
        RecordSelector::Index(index) => Ok((*index, store.get(*index)?)),
        RecordSelector::Latest { name, time } => {
            let found = store
                .find_by_name(name)
                .into_iter()
                .filter(|r| time.as_deref().is_none_or(|t| r.backup_time == t))
                .max_by(|a, b| a.backup_time.cmp(&b.backup_time));
            let record = found.ok_or_else(|| Error::RecordNotFound(format!("no backup named '{}'", name)))?;
            let index = store.find(&record.file_name, &record.backup_time).unwrap_or_default();
            Ok((index, record))
        }
    }
}

/// Recover command implementation
pub fn recover(args: &RecoverArgs<'_>) -> ExitCode {
    let formatter = create_formatter(args.format);

    let store = match open_records(args.records) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let (index, record) = match select_record(&store, &args.selector) {
        Ok(found) => found,
        Err(e) => return fail(&e),
    };
    debug!("recovering record #{} ({})", index, record.backup_file_name);

    if let Err(e) = std::fs::create_dir_all(args.destination) {
        eprintln!("Error creating output directory: {}", e);
        return ExitCode::IoError;
    }

    let pipeline = Pipeline::new();
    let mut decisions = CliDecisions::new(args.overwrite, args.key.clone());
    let mut progress = CliProgress::new(args.quiet || args.format == OutputFormat::Json);

    let report = match pipeline.recover_with_progress(record, args.destination, &mut decisions, &mut progress) {
        Ok(report) => report,
        Err(e) => {
            progress.fail();
            return fail(&e);
        }
    };

    if !args.quiet || args.format == OutputFormat::Json {
        print!("{}", formatter.format_recovery(&report));
    }
    match &report.unpacked {
        Some(summary) if summary.skipped > 0 => ExitCode::Warning,
        _ => ExitCode::Success,
    }
}

/// Records list command implementation
pub fn records_list(records: &Path, format: OutputFormat) -> ExitCode {
    let store = match open_records(records) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let listed: Vec<_> = store.list().iter().enumerate().collect();
    print!("{}", create_formatter(format).format_records(&listed));
    ExitCode::Success
}

/// Records find command implementation
pub fn records_find(
    records: &Path,
    name: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    format: OutputFormat,
) -> ExitCode {
    let store = match open_records(records) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let mut hits: Vec<&BackupRecord> = match (from, to) {
        (None, None) => store.list().iter().collect(),
        (from, to) => store.find_by_time_range(from.unwrap_or(""), to.unwrap_or("~")),
    };
    if let Some(name) = name {
        let named = store.find_by_name(name);
        hits.retain(|r| named.contains(r));
    }

    let indexed: Vec<_> = hits
        .into_iter()
        .filter_map(|r| store.find(&r.file_name, &r.backup_time).map(|i| (i, r)))
        .collect();
    print!("{}", create_formatter(format).format_records(&indexed));
    ExitCode::Success
}

/// Records show command implementation
pub fn records_show(records: &Path, index: usize, format: OutputFormat) -> ExitCode {
    let store = match open_records(records) {
        Ok(store) => store,
        Err(code) => return code,
    };
    match store.get(index) {
        Ok(record) => {
            print!("{}", create_formatter(format).format_record(index, record));
            ExitCode::Success
        }
        Err(e) => fail(&e),
    }
}

/// Records delete command implementation
pub fn records_delete(records: &Path, index: usize, purge: bool, yes: bool) -> ExitCode {
    let mut store = match open_records(records) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let artifact = match store.get(index) {
        Ok(record) => record.artifact_path(),
        Err(e) => return fail(&e),
    };

    if purge && !yes && !confirm_purge(&artifact) {
        return ExitCode::UserInterrupt;
    }

    let removed = match store.delete(index).and_then(|r| store.save().map(|()| r)) {
        Ok(removed) => removed,
        Err(e) => return fail(&e),
    };
    println!(
        "Deleted record #{} ({} at {})",
        index, removed.file_name, removed.backup_time
    );

    if purge {
        let result = if artifact.is_dir() {
            std::fs::remove_dir_all(&artifact)
        } else {
            std::fs::remove_file(&artifact)
        };
        match result {
            Ok(()) => println!("Removed {}", artifact.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("Warning: {} was already gone", artifact.display());
            }
            Err(e) => {
                eprintln!("Error removing {}: {}", artifact.display(), e);
                return ExitCode::IoError;
            }
        }
    }
    ExitCode::Success
}

fn confirm_purge(artifact: &Path) -> bool {
    use dialoguer::{Confirm, theme::ColorfulTheme};

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Also delete {}?", artifact.display()))
        .default(false)
        .interact()
        .unwrap_or(false)
}

/// Inspect command implementation
pub fn inspect(path: &Path, format: OutputFormat) -> ExitCode {
    match Pipeline::new().inspect(path) {
        Ok(info) => {
            print!("{}", create_formatter(format).format_inspect(&info));
            ExitCode::Success
        }
        Err(e) => fail(&e),
    }
}

/// Algorithms command implementation
pub fn algorithms(format: OutputFormat) -> ExitCode {
    let pipeline = Pipeline::new();
    print!("{}", create_formatter(format).format_algorithms(pipeline.registry()));
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, time: &str) -> BackupRecord {
        BackupRecord {
            file_name: name.into(),
            source_full_path: PathBuf::from("/src").join(name),
            destination_directory: PathBuf::from("/dst"),
            backup_file_name: "backup_1.Basic".into(),
            backup_time: time.into(),
            is_encrypted: false,
            is_packed: true,
            is_compressed: false,
            description: String::new(),
        }
    }

    #[test]
    fn test_select_latest_by_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        store.add(record("docs", "2024-01-01 00:00:00")).unwrap();
        store.add(record("docs", "2024-03-01 00:00:00")).unwrap();
        store.add(record("music", "2024-04-01 00:00:00")).unwrap();

        let selector = RecordSelector::Latest {
            name: "docs".into(),
            time: None,
        };
        let (index, found) = select_record(&store, &selector).unwrap();
        assert_eq!(index, 1);
        assert_eq!(found.backup_time, "2024-03-01 00:00:00");

        let selector = RecordSelector::Latest {
            name: "docs".into(),
            time: Some("2024-01-01 00:00:00".into()),
        };
        assert_eq!(select_record(&store, &selector).unwrap().0, 0);

        let selector = RecordSelector::Latest {
            name: "photos".into(),
            time: None,
        };
        assert!(matches!(select_record(&store, &selector), Err(Error::RecordNotFound(_))));
    }

    #[test]
    fn test_decisions_without_prompt() {
        let mut always = CliDecisions::new(OverwriteMode::Always, Some("k".into()));
        assert!(always.confirm_overwrite(Path::new("x")));
        assert_eq!(always.key_for(Path::new("a.enc")).as_deref(), Some("k"));
        let mut never = CliDecisions::new(OverwriteMode::Never, None);
        assert!(!never.confirm_overwrite(Path::new("x")));
    }
}
