use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use guardpost::auth::issue_token;
use guardpost::config::ServerConfig;
use guardpost::server::validation::validate_email;
use guardpost::server::{AppState, create_router};
use guardpost::store::migrations::{MIGRATIONS, latest_version};
use guardpost::store::{SqliteStore, Store};
use guardpost::types::{Membership, Role, Tenant, User};

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "guardpost")]
#[command(about = "Multi-tenant security operations back office", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataDirArg {
    /// Data directory for the database and admin token
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Apply or revert schema migrations
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        #[command(flatten)]
        data_dir: DataDirArg,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        #[command(flatten)]
        data_dir: DataDirArg,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply pending migrations
    Up {
        #[command(flatten)]
        data_dir: DataDirArg,

        /// Stop after this version
        #[arg(long)]
        target: Option<i64>,
    },

    /// Revert the most recent migrations
    Down {
        #[command(flatten)]
        data_dir: DataDirArg,

        /// Number of migrations to revert
        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// List applied and pending migrations
    Status {
        #[command(flatten)]
        data_dir: DataDirArg,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

fn apply_data_dir(config: &mut ServerConfig, arg: DataDirArg) {
    if let Some(data_dir) = arg.data_dir {
        config.data_dir = data_dir;
    }
}

fn open_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    fs::create_dir_all(&config.data_dir)?;
    Ok(SqliteStore::new(config.db_path())?)
}

fn run_init(config: &ServerConfig, non_interactive: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.initialize()?;

    let token_file = config.admin_token_path();

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let (raw_token, _) = issue_token(&store, None, true, None)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_first_tenant_prompt(&store)?;
    }

    Ok(())
}

fn create_first_tenant_prompt(store: &SqliteStore) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Would you like to create a first tenant and its admin?")
        .with_default(false)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let tenant_name = inquire::Text::new("Tenant name:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Tenant name cannot be empty".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let email = inquire::Text::new("Admin email:")
        .with_validator(|input: &str| match validate_email(input) {
            Ok(_) => Ok(inquire::validator::Validation::Valid),
            Err(message) => Ok(inquire::validator::Validation::Invalid(message.into())),
        })
        .prompt()?;
    let email = validate_email(&email).map_err(anyhow::Error::msg)?;

    let now = Utc::now();
    let tenant = Tenant {
        id: Uuid::new_v4().to_string(),
        name: tenant_name.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        full_name: None,
        created_at: now,
        updated_at: now,
    };

    store.create_tenant(&tenant)?;
    store.create_user(&user)?;
    store.upsert_membership(&Membership {
        tenant_id: tenant.id.clone(),
        user_id: user.id.clone(),
        roles: vec![Role::Admin],
        created_at: now,
        updated_at: now,
    })?;

    let (raw_token, _) = issue_token(store, Some(user.id.as_str()), false, None)?;

    println!();
    println!("========================================");
    println!("Created tenant '{}' ({})", tenant.name, tenant.id);
    println!("Admin user {} with token:", user.email);
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

fn run_migrate(config: &mut ServerConfig, command: MigrateCommands) -> anyhow::Result<()> {
    match command {
        MigrateCommands::Up { data_dir, target } => {
            apply_data_dir(config, data_dir);
            let applied = open_store(config)?.migrate_up(target)?;
            if applied.is_empty() {
                println!("Already up to date (version {})", latest_version());
            }
            for version in applied {
                println!("Applied {version}");
            }
        }
        MigrateCommands::Down { data_dir, steps } => {
            apply_data_dir(config, data_dir);
            let reverted = open_store(config)?.migrate_down(steps)?;
            if reverted.is_empty() {
                println!("Nothing to revert");
            }
            for version in reverted {
                println!("Reverted {version}");
            }
        }
        MigrateCommands::Status { data_dir } => {
            apply_data_dir(config, data_dir);
            let applied = open_store(config)?.applied_migrations()?;
            for migration in MIGRATIONS {
                match applied.iter().find(|a| a.version == migration.version) {
                    Some(a) => println!(
                        "{:>4}  applied  {}  {}",
                        migration.version,
                        a.applied_at.format("%Y-%m-%d %H:%M:%S"),
                        migration.description
                    ),
                    None => println!(
                        "{:>4}  pending  {:19}  {}",
                        migration.version, "", migration.description
                    ),
                }
            }
        }
    }
    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let token_file = config.admin_token_path();
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'guardpost admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'guardpost admin init' first to create the database and admin token."
        );
    }

    info!("Admin token available at {}", token_file.display());

    let state = Arc::new(AppState::new(Arc::new(store)));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                apply_data_dir(&mut config, data_dir);
                run_init(&config, non_interactive)?;
            }
        },
        Commands::Migrate { command } => run_migrate(&mut config, command)?,
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            apply_data_dir(&mut config, data_dir);
            run_serve(config).await?;
        }
    }

    Ok(())
}
