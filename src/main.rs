use anyhow::Result;
use clap::Parser;
use flowpack::commands::{self, InstallFlags, config::Config, config::ConfigOverrides};
use flowpack::query::SortOrder;
use flowpack::runtime::RealRuntime;
use log::warn;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// flowpack - dependency-aware package manager
///
/// Installs packages and their dependencies from local package feeds.
///
/// Examples:
///   flowpack --feed ./feed install Charts        # Install the newest Charts
///   flowpack --feed ./feed install Charts@1.2.0  # Install a specific version
///   flowpack uninstall Charts --remove-dependencies
#[derive(Parser, Debug)]
#[command(author, version = env!("FLOWPACK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (default: ~/.flowpack/packages)
    #[arg(
        long = "root",
        short = 'r',
        env = "FLOWPACK_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Package feed directory, may be repeated
    #[arg(
        long = "feed",
        env = "FLOWPACK_FEEDS",
        value_name = "PATH",
        value_delimiter = ',',
        global = true
    )]
    pub feeds: Vec<PathBuf>,

    /// Target framework used to pick dependency groups
    #[arg(long = "framework", value_name = "NAME", global = true)]
    pub framework: Option<String>,

    /// Package id the host already provides, may be repeated
    #[arg(long = "provided", value_name = "ID", global = true)]
    pub provided: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package and its dependencies
    Install(InstallArgs),

    /// Uninstall a package
    Uninstall(UninstallArgs),

    /// List installed packages
    List,

    /// Search the package feeds
    Search(SearchArgs),

    /// List installed packages with newer versions available
    Updates(UpdatesArgs),

    /// Install the newest version of an installed package
    Update(UpdateArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package to install, optionally with a version
    #[arg(value_name = "ID[@VERSION]")]
    pub package: String,

    /// Install only the package itself
    #[arg(long)]
    pub ignore_dependencies: bool,

    /// Pick the lowest version satisfying each dependency
    #[arg(long)]
    pub lowest: bool,

    /// Accept package licenses without asking
    #[arg(long, short = 'y')]
    pub accept_licenses: bool,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Package to uninstall; without a version every installed version goes
    #[arg(value_name = "ID[@VERSION]")]
    pub package: String,

    /// Also remove dependencies nothing else needs
    #[arg(long)]
    pub remove_dependencies: bool,

    /// Remove the package even if installed packages depend on it
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Text matched against package id, title and description
    pub term: String,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Results per page
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,

    /// Result order
    #[arg(long, value_enum, default_value_t = SortArg::Id)]
    pub sort: SortArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum SortArg {
    Id,
    Downloads,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Id => SortOrder::Id,
            SortArg::Downloads => SortOrder::Downloads,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct UpdatesArgs {
    /// Include prerelease versions
    #[arg(long)]
    pub prerelease: bool,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Installed package id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Accept package licenses without asking
    #[arg(long, short = 'y')]
    pub accept_licenses: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current package");
            on_signal.cancel();
        }
    });

    let config = Config::load(
        &runtime,
        ConfigOverrides {
            install_root: cli.install_root,
            feeds: cli.feeds,
            framework: cli.framework,
            provided: cli.provided,
        },
    )?;

    match cli.command {
        Commands::Install(args) => {
            let flags = InstallFlags {
                ignore_dependencies: args.ignore_dependencies,
                lowest: args.lowest,
                accept_licenses: args.accept_licenses,
            };
            commands::install(runtime, &args.package, flags, config, cancel).await?
        }
        Commands::Uninstall(args) => {
            commands::uninstall(
                runtime,
                &args.package,
                args.remove_dependencies,
                args.force,
                config,
                cancel,
            )
            .await?
        }
        Commands::List => commands::list(runtime, config)?,
        Commands::Search(args) => {
            commands::search(
                runtime,
                &args.term,
                args.page,
                args.page_size,
                args.sort.into(),
                config,
                cancel,
            )
            .await?
        }
        Commands::Updates(args) => {
            commands::updates(runtime, args.prerelease, config, cancel).await?
        }
        Commands::Update(args) => {
            commands::update(runtime, &args.id, args.accept_licenses, config, cancel).await?
        }
    }
    Ok(())
}
