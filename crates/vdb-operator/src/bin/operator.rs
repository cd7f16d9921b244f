/*
 * VerticaDB Operator - Controller Service
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! VerticaDB operator - Kubernetes controller for `VerticaDB` CRDs
//!
//! Watches `VerticaDB` resources and drives each one toward a running
//! database until SIGTERM or Ctrl+C.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kube::CustomResourceExt;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vdb_operator::config::DEFAULT_CONFIG_PATH;
use vdb_operator::crds::VerticaDB;
use vdb_operator::{run_controller, OperatorConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Kubernetes operator for Eon mode Vertica databases.
#[derive(Parser, Debug)]
#[command(name = "vdb-operator")]
#[command(version)]
struct Cli {
    /// Path of the operator configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Print the VerticaDB CRD as YAML and exit
    #[arg(long)]
    print_crd: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_crd {
        print!("{}", serde_yaml::to_string(&VerticaDB::crd())?);
        return Ok(());
    }

    init_tracing(cli.log_format);
    info!(
        "Starting VerticaDB operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = OperatorConfig::load_or_default(&cli.config)
        .with_context(|| format!("invalid operator configuration at {}", cli.config))?;
    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    match cli.namespace.as_deref() {
        Some(ns) => info!(namespace = ns, "Watching a single namespace"),
        None => info!("Watching all namespaces"),
    }

    tokio::select! {
        result = run_controller(client, cli.namespace, config) => {
            if let Err(e) = result {
                error!(error = %e, "Controller exited with an error");
                return Err(e.into());
            }
        }
        () = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("VerticaDB operator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
