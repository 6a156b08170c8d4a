//! `pgperms` — command-line entry point for the access-control reconciler.
//!
//! Connects to a cluster, then either dumps its current state as YAML
//! (`--dump`), computes and prints the reconciliation plan (the default,
//! dry-run mode), or computes and executes it (`--apply`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pgperms_access::{ClusterAccess, PgClusterAccess, Recorder, SyncSink};
use sqlx::postgres::PgConnectOptions;
use tracing::info;

/// pgperms — declarative PostgreSQL cluster-wide access control.
#[derive(Parser, Debug)]
#[command(
    name = "pgperms",
    version,
    about = "Reconcile a PostgreSQL cluster's roles, databases, schemas, and privileges against a desired-state document",
    long_about = None,
    after_help = "Environment variables:\n  \
         PGHOST      Server host (default: localhost)\n  \
         PGPORT      Server port (default: 5432)\n  \
         PGUSER      Connection user (default: current OS user)\n  \
         PGPASSWORD  Connection password\n  \
         PGDATABASE  Database to connect to first (default: postgres)\n\n\
         Examples:\n  \
         pgperms --dump > cluster.yaml\n  \
         pgperms --config=cluster.yaml\n  \
         pgperms --config=cluster.yaml --apply"
)]
struct Cli {
    /// Path to the desired-state YAML document. Required unless `--dump`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect, gather the cluster's current state, and print it as YAML.
    #[arg(long, conflicts_with = "apply")]
    dump: bool,

    /// Execute the computed plan instead of only printing it.
    #[arg(long, conflicts_with = "dump")]
    apply: bool,

    /// Server host.
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    host: String,

    /// Server port.
    #[arg(long, short = 'P', env = "PGPORT", default_value_t = 5432)]
    port: u16,

    /// Connection user.
    #[arg(long, short = 'U', env = "PGUSER")]
    username: Option<String>,

    /// Prompt for a password on the controlling terminal instead of reading
    /// `PGPASSWORD`.
    #[arg(long = "password", short = 'W')]
    password_prompt: bool,

    /// Database to connect to first.
    #[arg(long, short = 'd', env = "PGDATABASE", default_value = "postgres")]
    database: String,

    /// `tracing` log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn connect_options(cli: &Cli) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::new()
        .host(&cli.host)
        .port(cli.port)
        .database(&cli.database);

    if let Some(username) = &cli.username {
        options = options.username(username);
    }

    let password = if cli.password_prompt {
        Some(rpassword::prompt_password("Password: ").context("failed to read password from terminal")?)
    } else {
        std::env::var("PGPASSWORD").ok()
    };
    if let Some(password) = password {
        options = options.password(&password);
    }

    Ok(options)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.dump {
        let options = connect_options(&cli)?;
        let access = PgClusterAccess::connect(options)
            .await
            .context("failed to connect to the cluster")?;
        let yaml = pgperms_core::dump(&access).await.context("failed to gather cluster state")?;
        print!("{yaml}");
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = cli.config.clone().context("--config is required unless --dump is given")?;
    let desired_yaml = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;

    let options = connect_options(&cli)?;
    let access = PgClusterAccess::connect(options)
        .await
        .context("failed to connect to the cluster")?;

    let mut sink = Recorder::new();
    pgperms_core::sync(&access, &desired_yaml, &mut sink)
        .await
        .context("failed to compute the reconciliation plan")?;
    let plan = sink.get();

    if cli.apply {
        // gather() (inside sync(), above) opened a cached connection to every
        // database being compared, including ones about to be tombstoned.
        // Postgres refuses to DROP DATABASE while another session holds a
        // connection to it, so those caches must be evicted before any
        // statement runs.
        let desired: pgperms_core::Config =
            serde_yaml::from_str(&desired_yaml).context("failed to parse desired-state document")?;
        for database in &desired.tombstoned_databases {
            access.close_database(database).await;
        }

        for statement in &plan {
            info!(database = %statement.database, query = %statement.query, "applying");
            access
                .execute(&statement.database, &statement.query)
                .await
                .with_context(|| format!("failed to apply statement: {}", statement.query))?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    for statement in &plan {
        println!("{statement}");
    }
    if plan.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(9))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_level.clone()))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pgperms: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dump_and_apply_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["pgperms", "--dump", "--apply"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn dump_does_not_require_config() {
        let cli = Cli::try_parse_from(["pgperms", "--dump"]).unwrap();
        assert!(cli.dump);
        assert!(cli.config.is_none());
    }

    #[test]
    fn default_port_matches_postgres_convention() {
        let cli = Cli::try_parse_from(["pgperms", "--config=x.yaml"]).unwrap();
        assert_eq!(cli.port, 5432);
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.database, "postgres");
    }
}
