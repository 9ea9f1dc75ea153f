//! Plaint CLI - Customer complaint intake service
//!
//! Usage:
//!   plaint init                     Initialize database
//!   plaint analyze "冰箱不制冷"      Classify a complaint and write a reply
//!   plaint import --file data.json  Import complaints (JSON or CSV)
//!   plaint serve --port 8000        Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let profile = || commands::load_profile(cli.profile.as_deref(), cli.profile_path.as_deref());

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt, &profile()?),
        Commands::Serve {
            port,
            ref host,
            no_auth,
            ref static_dir,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let analyzer = commands::build_analyzer(profile()?, Some(&db))?;
            commands::cmd_serve(
                db,
                analyzer,
                host,
                port,
                no_auth,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Analyze {
            ref text,
            save,
            ref user,
        } => {
            let db = if save {
                Some(commands::open_db(&cli.db, cli.no_encrypt)?)
            } else {
                None
            };
            let analyzer = commands::build_analyzer(profile()?, db.as_ref())?;
            commands::cmd_analyze(&analyzer, db.as_ref(), text, user.as_deref()).await
        }
        Commands::Complaints { ref action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => {
                    let analyzer = commands::build_analyzer(profile()?, Some(&db))?;
                    commands::cmd_complaints_list(&db, &analyzer, None, 0, 20).await
                }
                Some(ComplaintsAction::List { query, skip, limit }) => {
                    let analyzer = commands::build_analyzer(profile()?, Some(&db))?;
                    commands::cmd_complaints_list(&db, &analyzer, query.as_deref(), *skip, *limit)
                        .await
                }
                Some(ComplaintsAction::Show { id }) => commands::cmd_complaints_show(&db, *id),
                Some(ComplaintsAction::Delete { id }) => commands::cmd_complaints_delete(&db, *id),
                Some(ComplaintsAction::Reply { id, text }) => {
                    commands::cmd_complaints_reply(&db, *id, text)
                }
            }
        }
        Commands::Stats => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_stats(&db)
        }
        Commands::Simulate { count, seed } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_simulate(&db, &profile()?, count, seed)
        }
        Commands::Import { ref file } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let analyzer = commands::build_analyzer(profile()?, Some(&db))?;
            commands::cmd_import(&db, &analyzer, file).await
        }
        Commands::Prompts { ref action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(prompt_id),
        },
    }
}
