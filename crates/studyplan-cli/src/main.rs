use clap::{Parser, Subcommand};
use studyplan_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studyplan", version, about = "Weekly study planner")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user instead of the configured active user
    #[arg(long, global = true)]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User profile
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Study preferences
    Prefs {
        #[command(subcommand)]
        action: commands::prefs::PrefsAction,
    },
    /// Subject management
    Subject {
        #[command(subcommand)]
        action: commands::subject::SubjectAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Weekly busy times and classes
    Constraint {
        #[command(subcommand)]
        action: commands::constraint::ConstraintAction,
    },
    /// Schedule generation
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Individual study sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Missed-session and makeup maintenance
    Jobs {
        #[command(subcommand)]
        action: commands::jobs::JobsAction,
    },
    /// Study statistics
    Stats,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn dispatch(ctx: &commands::Context, command: Commands) -> commands::CmdResult {
    match command {
        Commands::User { action } => commands::user::run(ctx, action),
        Commands::Prefs { action } => commands::prefs::run(ctx, action),
        Commands::Subject { action } => commands::subject::run(ctx, action),
        Commands::Task { action } => commands::task::run(ctx, action),
        Commands::Constraint { action } => commands::constraint::run(ctx, action),
        Commands::Schedule { action } => commands::schedule::run(ctx, action),
        Commands::Session { action } => commands::session::run(ctx, action),
        Commands::Jobs { action } => commands::jobs::run(ctx, action),
        Commands::Stats => commands::stats::run(ctx),
        // Handled before the database is opened
        Commands::Config { .. } => Ok(()),
    }
}

fn run(cli: Cli) -> commands::CmdResult {
    let config = Config::load_or_default();
    init_tracing(&config);

    match cli.command {
        Commands::Config { action } => commands::config::run(action, config),
        command => {
            let ctx = commands::Context::open(config, cli.user, cli.json)?;
            dispatch(&ctx, command)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
