use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lecture_archiver::archive::IaArchiveClient;
use lecture_archiver::cli::{Cli, Commands};
use lecture_archiver::config::Config;
use lecture_archiver::history::HistoryStore;
use lecture_archiver::pipeline::{FolderPipeline, ProcessOptions};
use lecture_archiver::{output, sync, utils};

// Uploads are strictly one at a time, so a single-threaded runtime is enough
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "lecture_archiver=debug"
    } else {
        "lecture_archiver=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Process {
            folder,
            all,
            tag_only,
            upload_only,
            dry_run,
            skip_thumbnail,
        } => {
            let options = ProcessOptions {
                tag_only,
                upload_only,
                dry_run,
                skip_thumbnail,
            };

            // Check for the cover renderer (non-fatal, the cover is best-effort)
            if config.upload.generate_cover && !skip_thumbnail && !tag_only && !dry_run {
                let missing_deps = utils::check_dependencies().await;
                if !missing_deps.is_empty() {
                    eprintln!("⚠️  Dependency check warnings:");
                    for dep in missing_deps {
                        eprintln!("   • {}", dep);
                    }
                    eprintln!("   (Continuing without a cover image if rendering fails)");
                }
            }

            let pipeline = FolderPipeline::new(config, cli.quiet)?;

            if all {
                let (succeeded, total) = pipeline.process_all(&options).await?;
                return Ok(if succeeded == total {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                });
            }

            // clap guarantees a folder when --all is absent
            let Some(folder) = folder else {
                return Ok(ExitCode::FAILURE);
            };

            match pipeline.process_folder(&folder, &options).await {
                Ok(outcome) if outcome.is_success() => Ok(ExitCode::SUCCESS),
                Ok(_) => Ok(ExitCode::FAILURE),
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::History => {
            let history = HistoryStore::new(config.history_path()).load()?;
            print!("{}", output::format_history(&history));
            if history.is_empty() {
                println!();
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync {
            status,
            fetch_all,
            creator,
            export,
        } => {
            let store = HistoryStore::new(config.history_path());

            if status {
                sync::show_status(&store)?;
                return Ok(ExitCode::SUCCESS);
            }

            let archive = IaArchiveClient::from_config(&config)?;
            if fetch_all {
                let creator = creator.unwrap_or_else(|| config.defaults.artist.clone());
                sync::fetch_all_by_creator(&archive, &store, &creator, &config.archive_items_path())
                    .await?;
            } else if export {
                sync::export_full_data(&archive, &store, &config.archive_items_path()).await?;
            } else {
                sync::sync_history(&archive, &store).await?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!(
                    "Configuration file: {}",
                    Config::config_path(cli.config.as_deref())?.display()
                );
                println!("Edit it directly, or run `lecture-archiver config --show` to inspect it.");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
