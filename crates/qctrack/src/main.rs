//! `qctrack` - CLI for the equipment QC tracker
//!
//! This binary runs the web application and provides the maintenance
//! commands: schema setup, user management, report export and status.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing::{info, warn};

use qctrack::activity::ActivityAction;
use qctrack::cli::{Cli, Command, ConfigCommand, CreateAdminCommand, ExportCommand, UserCommand};
use qctrack::report::{
    render_history_html, render_history_pdf, render_search_html, render_search_pdf, HistoryReport,
    ReportFormat, SearchReport,
};
use qctrack::search::SearchFilter;
use qctrack::user::{
    hash_password, validate_username, Role, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME,
};
use qctrack::web::{self, AppState};
use qctrack::{init_logging, Config, Storage};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let mut config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Serve(serve) => {
            if let Some(host) = serve.host {
                config.server.host = host;
            }
            if let Some(port) = serve.port {
                config.server.port = port;
            }
            handle_serve(config)
        }
        Command::InitDb => handle_init_db(&config),
        Command::CreateAdmin(cmd) => handle_create_admin(&config, &cmd),
        Command::User(cmd) => handle_user(&config, cmd),
        Command::Export(cmd) => handle_export(&config, &cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::open(config.database_path())?.with_busy_timeout(config.busy_timeout())?;
    Ok(storage)
}

fn handle_serve(config: Config) -> Result<()> {
    let storage = open_storage(&config)?;

    if config.server.bootstrap_admin && storage.count_admins()? == 0 {
        let hash = hash_password(DEFAULT_ADMIN_PASSWORD, config.auth.bcrypt_cost)?;
        storage.create_user(DEFAULT_ADMIN_USERNAME, &hash, Role::Admin)?;
        storage.log_activity(None, ActivityAction::UserCreated, DEFAULT_ADMIN_USERNAME)?;
        warn!(
            "Created default administrator {:?} with the default password; change it now",
            DEFAULT_ADMIN_USERNAME
        );
    }

    if let Some(retention) = config.activity_retention() {
        storage.prune_activity_older_than(TimeDelta::from_std(retention)?)?;
    }
    storage.prune_expired_sessions(Utc::now())?;

    let addr = config.bind_addr()?;
    let state = AppState::new(storage, config)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        web::serve(listener, state, shutdown_signal()).await?;
        Ok::<(), anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

fn handle_init_db(config: &Config) -> Result<()> {
    let storage = open_storage(config)?;
    let version = storage.schema_version()?;
    storage.log_activity(
        None,
        ActivityAction::DatabaseInitialized,
        &format!("schema version {version}"),
    )?;
    println!(
        "Database ready at {} (schema version {})",
        storage.path().display(),
        version
    );
    Ok(())
}

fn handle_create_admin(config: &Config, cmd: &CreateAdminCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let username = validate_username(&cmd.username)?;

    if let Some(existing) = storage.get_user_by_username(&username)? {
        println!("User {} already exists (role: {}).", existing.username, existing.role);
        return Ok(());
    }

    let hash = hash_password(&cmd.password, config.auth.bcrypt_cost)?;
    let user = storage.create_user(&username, &hash, Role::Admin)?;
    storage.log_activity(None, ActivityAction::UserCreated, &format!("{} (admin)", user.username))?;
    println!("Administrator {} created.", user.username);
    Ok(())
}

fn handle_user(config: &Config, cmd: UserCommand) -> Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        UserCommand::List => {
            let users = storage.list_users()?;
            if users.is_empty() {
                println!("No users.");
            }
            for user in users {
                println!(
                    "{:>4}  {:<24} {:<6} {}",
                    user.id,
                    user.username,
                    user.role,
                    user.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        UserCommand::Add {
            username,
            password,
            admin,
        } => {
            let username = validate_username(&username)?;
            let role = if admin { Role::Admin } else { Role::User };
            let hash = hash_password(&password, config.auth.bcrypt_cost)?;
            let user = storage.create_user(&username, &hash, role)?;
            storage.log_activity(
                None,
                ActivityAction::UserCreated,
                &format!("{} ({})", user.username, user.role),
            )?;
            println!("User {} created ({}).", user.username, user.role);
        }
        UserCommand::Delete { username } => {
            let Some(user) = storage.get_user_by_username(&username)? else {
                bail!("user {username:?} not found");
            };
            if user.is_admin() {
                bail!("{} is an administrator and cannot be deleted", user.username);
            }
            storage.delete_user(user.id)?;
            storage.log_activity(None, ActivityAction::UserDeleted, &user.username)?;
            println!("User {} deleted.", user.username);
        }
        UserCommand::ResetPassword { username, password } => {
            let Some(user) = storage.get_user_by_username(&username)? else {
                bail!("user {username:?} not found");
            };
            let hash = hash_password(&password, config.auth.bcrypt_cost)?;
            storage.set_password_hash(user.id, &hash)?;
            storage.log_activity(None, ActivityAction::PasswordReset, &user.username)?;
            println!("Password for {} updated; existing sessions ended.", user.username);
        }
    }
    Ok(())
}

fn handle_export(config: &Config, cmd: &ExportCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let output = cmd.output();
    let format = ReportFormat::from_path(output)?;
    let offset = config.utc_offset();

    let (bytes, count) = match cmd {
        ExportCommand::Search { .. } => {
            let params = cmd.search_params().unwrap_or_default();
            let filter = SearchFilter::from_params(&params);
            let rows = storage.search_equipment_at(&filter, offset)?;
            let report = SearchReport::new(&filter, rows, offset);
            let bytes = match format {
                ReportFormat::Pdf => render_search_pdf(&report)?,
                ReportFormat::Html => {
                    let tera = qctrack::templates::build(offset)?;
                    render_search_html(&tera, &report)?.into_bytes()
                }
            };
            (bytes, report.record_count())
        }
        ExportCommand::History { serial, .. } => {
            let Some(equipment) = storage.get_equipment_by_serial(serial)? else {
                bail!("no equipment with serial {serial:?}");
            };
            let tests = storage.tests_for(equipment.id)?;
            let report = HistoryReport::new(equipment, &tests, offset);
            let bytes = match format {
                ReportFormat::Pdf => render_history_pdf(&report)?,
                ReportFormat::Html => {
                    let tera = qctrack::templates::build(offset)?;
                    render_history_html(&tera, &report)?.into_bytes()
                }
            };
            (bytes, report.record_count())
        }
    };

    std::fs::write(output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    storage.log_activity(
        None,
        ActivityAction::ReportExported,
        &format!("{} ({count} records)", output.display()),
    )?;
    println!("Wrote {} ({} records).", output.display(), count);
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let version = storage.schema_version()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "schema_version": version,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("qctrack status");
        println!("--------------");
        println!("Database:      {}", storage.path().display());
        println!("Schema:        v{version}");
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!("Users:         {}", stats.users);
        println!("Equipment:     {}", stats.equipment);
        println!("Awaiting test: {}", stats.awaiting_test);
        println!("Tests:         {}", stats.tests);
        match stats.latest_test {
            Some(at) => println!(
                "Latest test:   {}",
                at.with_timezone(&config.utc_offset()).format("%d/%m/%Y %H:%M")
            ),
            None => println!("Latest test:   never"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Busy timeout (ms):  {}", config.storage.busy_timeout_ms);
                println!(
                    "  Activity retention: {} days",
                    config.storage.activity_retention_days
                );
                println!();
                println!("[Server]");
                println!("  Host:               {}", config.server.host);
                println!("  Port:               {}", config.server.port);
                println!("  UTC offset (hours): {}", config.server.utc_offset_hours);
                println!("  Bootstrap admin:    {}", config.server.bootstrap_admin);
                println!();
                println!("[Auth]");
                println!("  Session TTL (h):    {}", config.auth.session_ttl_hours);
                println!("  bcrypt cost:        {}", config.auth.bcrypt_cost);
                println!("  Secure cookie:      {}", config.auth.secure_cookie);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
