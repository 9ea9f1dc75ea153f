//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use plaint_core::{db::Database, ComplaintAnalyzer};
use plaint_server::{ServerConfig, API_KEYS_ENV, TRUSTED_NETWORKS_ENV, TRUSTED_PROXIES_ENV};

pub async fn cmd_serve(
    db: Database,
    analyzer: ComplaintAnalyzer,
    host: &str,
    port: u16,
    no_auth: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting Plaint web server...");
    println!("   Database: {}", db.path());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Profile: {}", analyzer.profile().name);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    let config = ServerConfig::from_env(!no_auth);

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        if config.api_keys.is_empty() {
            println!(
                "   ⚠️  No API keys configured ({}); only trusted networks can connect",
                API_KEYS_ENV
            );
        } else {
            println!(
                "   🔑 API keys: {} configured ({})",
                config.api_keys.len(),
                API_KEYS_ENV
            );
        }
        if !config.trusted_networks.is_empty() {
            println!(
                "   🏠 Trusted networks: {} ({})",
                join_networks(&config.trusted_networks),
                TRUSTED_NETWORKS_ENV
            );
        }
        if !config.trusted_proxies.is_empty() {
            println!(
                "   🔀 Trusted proxies: {} ({})",
                join_networks(&config.trusted_proxies),
                TRUSTED_PROXIES_ENV
            );
        }
    }
    if !db.is_encrypted() {
        println!("   ⚠️  Encryption DISABLED");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let static_dir_str = static_dir
        .map(|p| p.to_str().context("static_dir path must be valid UTF-8"))
        .transpose()?;
    plaint_server::serve(db, analyzer, host, port, static_dir_str, config).await?;

    Ok(())
}

fn join_networks<T: std::fmt::Display>(networks: &[T]) -> String {
    networks
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
