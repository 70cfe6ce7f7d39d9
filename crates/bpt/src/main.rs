//! bpt - a package manager and build driver for C and C++.

mod commands;
mod ui;

use std::path::PathBuf;

use bpt_diagnostics::{BptError, Cancellation};
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bpt")]
#[command(version, about = "A package manager and build driver for C and C++", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalOptions {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Path to the project's bpt.yaml
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Number of parallel jobs
    #[arg(short, long, global = true)]
    jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a project and its dependencies
    Build {
        /// Also build and run test executables
        #[arg(long)]
        tests: bool,
    },

    /// Compile a single free-standing source file
    CompileFile {
        /// Source file to compile
        source: PathBuf,
        /// Output object file
        #[arg(short, long)]
        output: PathBuf,
        /// Extra include directories
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },

    /// Build only the resolved dependencies, not the root project
    BuildDeps,

    /// Resolve and fetch dependencies into the local cache
    Install,

    /// Scaffold a new project
    New {
        /// Project name
        name: String,
        /// Directory to create it in (defaults to the project name)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Manage catalog remotes
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Inspect and manage the package catalog
    Pkg {
        #[command(subcommand)]
        action: PkgAction,
    },

    /// Create and regenerate source distributions
    Sdist {
        #[command(subcommand)]
        action: SdistAction,
    },

    /// Print a shell completion script to stdout
    #[command(hide = true)]
    Completions { shell: clap_complete::Shell },

    /// Print a man page to stdout
    #[command(hide = true)]
    Manpage,
}

#[derive(Subcommand)]
enum RepoAction {
    /// List configured remotes
    Ls,
    /// Initialize a new catalog database
    Init,
    /// Add or update a remote
    Add { name: String, url: String },
    /// Import sdists from a local directory tree
    Import { dir: PathBuf },
    /// Remove a remote and everything it contributed
    Remove { name: String },
}

#[derive(Subcommand)]
enum PkgAction {
    /// Initialize a catalog database at a specific path
    InitDb { path: PathBuf },
    /// Search the catalog by name
    Search { name: String },
    /// Fetch a package's raw source tree
    Get {
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// Package the current project directory into an sdist
    Create {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        dest: PathBuf,
    },
}

#[derive(Subcommand)]
enum SdistAction {
    /// Pack the current project into a `.tar.gz` sdist archive
    Create {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Regenerate an sdist's `pkg.json` from its project's current manifest
    Regen {
        sdist_dir: PathBuf,
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn init_logging(global: &GlobalOptions) {
    if global.quiet {
        return;
    }
    let log_level = match global.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_ansi(!global.no_color)
        .init();
}

/// Installs a SIGINT/SIGTERM (Ctrl-C) handler that sets `cancellation`,
/// mirroring §5's process-level cancellation flag. Skipped for `new`, whose
/// interactive prompts own the terminal and should not be pre-empted.
fn install_signal_handler(cancellation: Cancellation) {
    let _ = ctrlc::set_handler(move || cancellation.cancel());
}

#[tokio::main]
async fn main() {
    bpt_diagnostics::setup();
    let cli = Cli::parse();
    init_logging(&cli.global);

    let cancellation = Cancellation::new();
    if !matches!(cli.command, Commands::New { .. }) {
        install_signal_handler(cancellation.clone());
    }

    let result = run(cli, cancellation).await;
    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            let code = err.exit_code().code();
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(code)
        }
    }
}

async fn run(cli: Cli, cancellation: Cancellation) -> Result<(), BptError> {
    let manifest = cli.global.manifest.as_deref();
    let jobs = cli.global.jobs;

    match cli.command {
        Commands::Build { tests } => commands::build(manifest, jobs, tests, cancellation).await,
        Commands::CompileFile { source, output, include } => {
            commands::compile_file(&source, &output, &include, cancellation)
        }
        Commands::BuildDeps => commands::build_deps(manifest, jobs, cancellation).await,
        Commands::Install => commands::install(manifest, cancellation).await,
        Commands::New { name, dir } => commands::new_project(&name, dir.as_deref()),
        Commands::Repo { action } => match action {
            RepoAction::Ls => commands::repo_ls(),
            RepoAction::Init => commands::repo_init(),
            RepoAction::Add { name, url } => commands::repo_add(&name, &url),
            RepoAction::Import { dir } => commands::repo_import(&dir),
            RepoAction::Remove { name } => commands::repo_remove(&name),
        },
        Commands::Pkg { action } => match action {
            PkgAction::InitDb { path } => commands::pkg_init_db(&path),
            PkgAction::Search { name } => commands::pkg_search(&name),
            PkgAction::Get { name, version, dest } => {
                commands::pkg_get(&name, version.as_deref(), &dest).await
            }
            PkgAction::Create { project, dest } => commands::pkg_create(&project, &dest),
        },
        Commands::Sdist { action } => match action {
            SdistAction::Create { project, out } => commands::sdist_create(&project, &out),
            SdistAction::Regen { sdist_dir, project } => commands::sdist_regen(&sdist_dir, &project),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Commands::Manpage => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout()).map_err(|e| BptError::io("<stdout>", e))?;
            Ok(())
        }
    }
}
