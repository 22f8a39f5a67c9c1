use std::{process::ExitCode, sync::Arc};

use futures::{stream::FuturesOrdered, StreamExt};
use ytd_rs::{
    config::{self, Config},
    notify::ConsoleNotifier,
    tasks::DownloadStatus,
    util,
    worker::Worker,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env().and_then(|c| c.with_args(std::env::args().skip(1))) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if config.inputs.is_empty() {
        eprintln!("{}", config::USAGE);
        return ExitCode::FAILURE;
    }

    let worker =
        Worker::new(&config, Arc::new(ConsoleNotifier::new())).expect("Could not create HTTP clients");

    // Fetch all metadata concurrently, keeping input order
    let w = &worker;
    let fetches = config
        .inputs
        .iter()
        .map(|input| async move { (input, w.fetch(input).await) })
        .collect::<FuturesOrdered<_>>();
    let results = fetches.collect::<Vec<_>>().await;

    let mut failed = false;
    for (input, result) in results {
        match result {
            Ok(metadata) => {
                println!(
                    "{} by {} ({}): {} video, {} audio streams",
                    metadata.title,
                    metadata.uploader.as_deref().unwrap_or("unknown uploader"),
                    metadata
                        .duration
                        .map(util::format_duration)
                        .unwrap_or("?".into()),
                    metadata.video_streams.len(),
                    metadata.audio_streams.len(),
                );
                worker.enqueue(metadata, config.format);
            }
            Err(e) => {
                eprintln!("Could not fetch {}: {}", input, e);
                failed = true;
            }
        }
    }

    let tasks = worker.registry().wait_all_terminal().await;
    failed |= tasks.iter().any(|t| t.status == DownloadStatus::Failed);

    println!(
        "Done: {} of {} downloads saved to {}",
        tasks
            .iter()
            .filter(|t| t.status == DownloadStatus::Completed)
            .count(),
        tasks.len(),
        config.output_dir.display()
    );

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
