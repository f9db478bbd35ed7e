//! cchaos CLI - Password-based file and directory encryption
//!
//! Command-line interface for encrypting and decrypting files and directory
//! trees using Argon2id key derivation and AES-256-GCM.

use clap::{Args, Parser, Subcommand};
use std::error::Error as StdError;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cchaos::hooks::{KeywordHook, PostDecryptHook};
use cchaos::kdf::{DEFAULT_PARALLELISM, DEFAULT_TIME_COST, KdfParams};
use cchaos::password::{PasswordSource, PipedPassword, TerminalPassword};
use cchaos::tree::{self, TreeOptions, TreeReport};
use cchaos::{CchaosError, file_ops};

/// Exit status for an authentication failure (wrong password or damaged data)
const EXIT_AUTH_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "cchaos")]
#[command(version)]
#[command(about = "Password-based file and directory encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Increase log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file, or a directory tree with --dir
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file (or directory) whose contents is to be encrypted
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,

        /// Path to write the container (or the encrypted tree) to
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Argon2 time cost (iterations)
        #[arg(long, env = "CCHAOS_TIME_COST", default_value_t = u32::from(DEFAULT_TIME_COST))]
        time_cost: u32,

        /// Argon2 memory cost in KiB; must be a whole number of MiB, at most 255 MiB
        #[arg(long, env = "CCHAOS_MEMORY_KIB", default_value_t = 64 * 1024)]
        memory_kib: u32,

        /// Argon2 parallelism (lanes)
        #[arg(long, env = "CCHAOS_PARALLELISM", default_value_t = u32::from(DEFAULT_PARALLELISM))]
        parallelism: u32,

        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Decrypt a file, or a directory tree with --dir
    #[command(alias = "d")]
    Decrypt {
        /// Path to the container (or directory of containers) to decrypt
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,

        /// Path to write the plaintext (or the decrypted tree) to
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Report when decrypted text contains WORD at least COUNT times
        #[arg(long, value_name = "WORD=COUNT", value_parser = parse_keyword)]
        watch_keyword: Vec<(String, usize)>,

        #[command(flatten)]
        tree: TreeArgs,
    },
}

#[derive(Args)]
struct TreeArgs {
    /// Treat input and output as directories and process every file recursively
    #[arg(long)]
    dir: bool,

    /// Number of files processed at once (default: derived from --memory-budget-mib)
    #[arg(long, env = "CCHAOS_JOBS")]
    jobs: Option<NonZeroUsize>,

    /// Memory available to concurrent key derivations, in MiB
    #[arg(long, env = "CCHAOS_MEMORY_BUDGET_MIB", default_value_t = 1024)]
    memory_budget_mib: u64,

    /// Leave dot-files and dot-directories alone
    #[arg(long)]
    skip_hidden: bool,
}

impl TreeArgs {
    /// `memory_mib` is the Argon2 memory each in-flight file may need.
    fn options(&self, memory_mib: u8) -> TreeOptions {
        let budget = self.memory_budget_mib;
        TreeOptions {
            jobs: self
                .jobs
                .unwrap_or_else(|| tree::jobs_for_memory_budget(budget, memory_mib)),
            include_hidden: !self.skip_hidden,
            hook: None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Encrypt {
            input,
            output,
            time_cost,
            memory_kib,
            parallelism,
            tree,
        } => KdfParams::new(time_cost, memory_kib, parallelism).and_then(|kdf| {
            let mut source = password_source(cli.password_stdin, true);
            if tree.dir {
                let options = tree.options(kdf.memory_mib());
                tree::encrypt_tree(&mut *source, &input, &output, &kdf, &options)
                    .map(|report| report_tree(&report))
            } else {
                file_ops::encrypt_file(&input, &output, &mut *source, &kdf).map(|()| true)
            }
        }),
        Commands::Decrypt {
            input,
            output,
            watch_keyword,
            tree,
        } => {
            let mut source = password_source(cli.password_stdin, false);
            let hooks = keyword_hooks(watch_keyword);
            if tree.dir {
                // Embedded parameters are unknown up front; plan for the largest.
                let options = TreeOptions {
                    hook: Some(Arc::new(hooks) as Arc<dyn PostDecryptHook>),
                    ..tree.options(u8::MAX)
                };
                tree::decrypt_tree(&mut *source, &input, &output, &options)
                    .map(|report| report_tree(&report))
            } else {
                file_ops::decrypt_file_with_hook(&input, &output, &mut *source, &hooks)
                    .map(|()| true)
            }
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            let code = if e.is_authentication_failure() {
                EXIT_AUTH_FAILED
            } else {
                1
            };
            process::exit(code);
        }
    }
}

/// Print per-file failures. Returns whether every file went through.
fn report_tree(report: &TreeReport) -> bool {
    info!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        "done"
    );
    if report.is_success() {
        return true;
    }
    eprintln!("{} file(s) failed:", report.failures.len());
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.path.display(), error_chain(&failure.error));
    }
    false
}

fn keyword_hooks(watch: Vec<(String, usize)>) -> Vec<Box<dyn PostDecryptHook>> {
    watch
        .into_iter()
        .map(|(word, threshold)| {
            let label = word.clone();
            Box::new(KeywordHook::new(word, threshold, move |path: &Path, count| {
                eprintln!("{}: '{}' appears {} times", path.display(), label, count);
            })) as Box<dyn PostDecryptHook>
        })
        .collect()
}

fn parse_keyword(s: &str) -> Result<(String, usize), String> {
    let (word, count) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected WORD=COUNT, got '{}'", s))?;
    if word.is_empty() {
        return Err("keyword must not be empty".to_string());
    }
    let count = count
        .parse::<usize>()
        .map_err(|e| format!("invalid count '{}': {}", count, e))?;
    Ok((word.to_string(), count))
}

fn error_chain(e: &CchaosError) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cchaos={}", level)));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    // Only fails if a global subscriber is already installed.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Encryption prompts twice on a terminal; piped input is read as is.
fn password_source(use_stdin: bool, confirm: bool) -> Box<dyn PasswordSource> {
    if use_stdin {
        Box::new(PipedPassword::new(std::io::stdin()))
    } else if confirm {
        Box::new(TerminalPassword::confirmed())
    } else {
        Box::new(TerminalPassword::once())
    }
}
