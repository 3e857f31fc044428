//! CLI tool for backpipe backup and recovery.

mod commands;
mod exit_codes;
mod output;
mod password;
mod progress;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use commands::RecordSelector;
use exit_codes::ExitCode;

/// File backup and recovery through a pack, compress and encrypt pipeline
#[derive(Parser)]
#[command(name = "backpipe")]
#[command(author, version, about = "File backup and recovery tool", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Backup record file
    #[arg(
        long,
        env = "BACKPIPE_RECORDS",
        default_value = "backup_records.json",
        global = true
    )]
    records: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a file or directory (alias: b)
    #[command(alias = "b")]
    Backup {
        /// File or directory to back up
        source: PathBuf,

        /// Directory to write the backup to
        destination: PathBuf,

        /// Further sources (accepted, currently ignored with a warning)
        #[arg(long = "also")]
        extra_sources: Vec<PathBuf>,

        /// Only back up files whose relative path matches (regex)
        #[arg(short = 'i', long)]
        include: Vec<String>,

        /// Skip entries whose relative path matches (regex)
        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// Do not descend into subdirectories
        #[arg(long)]
        no_recursive: bool,

        /// Follow symbolic links instead of storing them
        #[arg(long, short = 'L')]
        follow_symlinks: bool,

        /// Pack into a single container (default packer: Basic)
        #[arg(short = 'p', long, num_args = 0..=1, default_missing_value = "Basic")]
        pack: Option<String>,

        /// Compress the container (implies --pack)
        #[arg(short = 'c', long, num_args = 0..=1, default_missing_value = "Huffman")]
        compress: Option<String>,

        /// Compression level (1-9)
        #[arg(short = 'l', long, default_value = "1")]
        level: u32,

        /// Encrypt the container (implies --pack)
        #[arg(short = 'E', long, num_args = 0..=1, default_missing_value = "SimXOR")]
        encrypt: Option<String>,

        #[command(flatten)]
        key: KeyArgs,

        /// Description stored in the backup record
        #[arg(short = 'd', long)]
        description: Option<String>,

        /// What to do when the mirror target already exists
        #[arg(long, value_enum, default_value = "prompt")]
        overwrite: OverwriteMode,

        /// Do not append a backup record
        #[arg(long)]
        no_record: bool,
    },

    /// Restore a recorded backup (alias: r)
    #[command(alias = "r")]
    #[command(group(ArgGroup::new("which").required(true).args(["index", "name"])))]
    Recover {
        /// Directory to restore into
        destination: PathBuf,

        /// Record index (see `records list`)
        #[arg(long)]
        index: Option<usize>,

        /// Most recent backup of this source name
        #[arg(long)]
        name: Option<String>,

        /// Exact backup time, with --name
        #[arg(long, requires = "name")]
        time: Option<String>,

        #[command(flatten)]
        key: KeyArgs,

        /// What to do when a restored copy already exists
        #[arg(long, value_enum, default_value = "prompt")]
        overwrite: OverwriteMode,
    },

    /// Query and edit the backup record file
    Records {
        #[command(subcommand)]
        action: RecordsCommand,
    },

    /// Show what an artifact is and parse its header (alias: i)
    #[command(alias = "i")]
    Inspect {
        /// Artifact to inspect
        artifact: PathBuf,
    },

    /// List registered algorithms
    Algorithms,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// List all records
    #[command(alias = "ls")]
    List,

    /// Find records by source name and time range
    Find {
        /// Source file name (exact match)
        #[arg(long)]
        name: Option<String>,

        /// Earliest backup time, inclusive ("YYYY-MM-DD HH:MM:SS")
        #[arg(long)]
        from: Option<String>,

        /// Latest backup time, inclusive
        #[arg(long)]
        to: Option<String>,
    },

    /// Show one record
    Show {
        /// Record index
        index: usize,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete {
        /// Record index
        index: usize,

        /// Also remove the backup artifact
        #[arg(long)]
        purge: bool,

        /// Do not ask before purging
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Args)]
struct KeyArgs {
    /// Encryption key (will prompt if needed and not provided)
    #[arg(short = 'k', long, env = "BACKPIPE_KEY", hide_env_values = true)]
    key: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OverwriteMode {
    Always,
    Never,
    Prompt,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted");
        std::process::exit(exit_codes::USER_INTERRUPT);
    })
    .ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Backup {
            source,
            destination,
            extra_sources,
            include,
            exclude,
            no_recursive,
            follow_symlinks,
            pack,
            compress,
            level,
            encrypt,
            key,
            description,
            overwrite,
            no_record,
        } => commands::backup(&commands::BackupArgs {
            source: &source,
            destination: &destination,
            extra_sources: &extra_sources,
            include: &include,
            exclude: &exclude,
            recursive: !no_recursive,
            follow_symlinks,
            pack,
            compress,
            level,
            encrypt,
            key: key.key,
            description,
            overwrite,
            no_record,
            records: &cli.records,
            format: cli.format,
            quiet: cli.quiet,
        }),

        Commands::Recover {
            destination,
            index,
            name,
            time,
            key,
            overwrite,
        } => {
            let selector = match (index, name) {
                (Some(index), _) => RecordSelector::Index(index),
                (None, Some(name)) => RecordSelector::Latest { name, time },
                (None, None) => {
                    eprintln!("Error: pass --index or --name");
                    std::process::exit(exit_codes::BAD_ARGS);
                }
            };
            commands::recover(&commands::RecoverArgs {
                records: &cli.records,
                selector,
                destination: &destination,
                key: key.key,
                overwrite,
                format: cli.format,
                quiet: cli.quiet,
            })
        }

        Commands::Records { action } => match action {
            RecordsCommand::List => commands::records_list(&cli.records, cli.format),
            RecordsCommand::Find { name, from, to } => commands::records_find(
                &cli.records,
                name.as_deref(),
                from.as_deref(),
                to.as_deref(),
                cli.format,
            ),
            RecordsCommand::Show { index } => commands::records_show(&cli.records, index, cli.format),
            RecordsCommand::Delete { index, purge, yes } => {
                commands::records_delete(&cli.records, index, purge, yes)
            }
        },

        Commands::Inspect { artifact } => commands::inspect(&artifact, cli.format),

        Commands::Algorithms => commands::algorithms(cli.format),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_compress_flag_uses_huffman() {
        let cli = Cli::try_parse_from(["backpipe", "backup", "src", "dst", "--compress"]).unwrap();
        match cli.command {
            Commands::Backup { compress, pack, .. } => {
                assert_eq!(compress.as_deref(), Some("Huffman"));
                assert!(pack.is_none());
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn test_recover_requires_a_selector() {
        assert!(Cli::try_parse_from(["backpipe", "recover", "out"]).is_err());
        assert!(Cli::try_parse_from(["backpipe", "recover", "out", "--index", "0"]).is_ok());
    }
}
