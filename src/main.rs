use clap::Parser;
use playlist_archiver::engine::EngineOptions;
use playlist_archiver::error::Result;
use playlist_archiver::logging::{init_tracing, FileLogSink, LogSink};
use playlist_archiver::{
    resolve_input, AppError, Args, Board, Config, Downloader, Engine, InputPlan, ReclaimerConfig,
    Runner, SlotPool, StaleSlotReclaimer, YtDlpEngine,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main entry point for the application.
///
/// # Steps
/// 1. Parses and validates the command line
/// 2. Resolves the input into (output directory, URLs) pairs
/// 3. Runs the archiver until done, or until interrupted in daemon mode
///
/// Configuration errors exit with status 1 before anything is written.
#[tokio::main]
async fn main() {
    let args = Args::parse();

    let prepared = Config::from_args(&args).and_then(|config| {
        resolve_input(&args.file, args.input_datatype, config.output.as_deref())
            .map(|plan| (config, plan))
    });
    let (config, plan) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match run_application(config, plan).await {
        Ok(()) | Err(AppError::Interrupted) => {}
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Sets up logging, the engine and the display, then hands over to the
/// [`Runner`].
///
/// # Errors
/// Returns error if:
/// - A directory cannot be created
/// - Logging initialization fails
/// - The yt-dlp binaries cannot be installed
/// - An archive file cannot be written
async fn run_application(config: Config, plan: InputPlan) -> Result<()> {
    for dir in plan
        .output_dirs()
        .chain([
            config.archive_dir.as_path(),
            config.log_dir.as_path(),
            config.libraries_dir.as_path(),
        ])
    {
        tokio::fs::create_dir_all(dir).await?;
    }

    let run_stamp = chrono::Utc::now().timestamp();
    let _guard = init_tracing(&config.log_dir, run_stamp, config.daemon, config.verbose)?;
    info!("Starting process.");
    if config.daemon {
        info!("Running in daemon mode.");
    }

    let engine = YtDlpEngine::initialize(
        &config.libraries_dir,
        &config.archive_dir,
        EngineOptions {
            max_size_mb: config.max_size_mb,
        },
    )
    .await?;
    if config.rm_cache {
        if let Err(e) = engine.remove_cache().await {
            warn!("Could not remove the yt-dlp cache: {}", e);
        }
    }
    let engine: Arc<dyn Engine> = Arc::new(engine);

    let error_log: Arc<dyn LogSink> = Arc::new(FileLogSink::open(
        "video_errors",
        config.log_dir.join(format!("{}-errors.log", run_stamp)),
    )?);

    let slot_count = config.slot_count();
    let board = Arc::new(if config.daemon {
        Board::hidden(slot_count)
    } else {
        Board::interactive(slot_count)
    });
    let slots = Arc::new(SlotPool::new(slot_count));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let reclaimer = (!config.daemon).then(|| {
        StaleSlotReclaimer::new(slots.clone(), board.clone(), ReclaimerConfig::default())
            .spawn(shutdown.child_token())
    });

    let downloader = Downloader::new(engine.clone(), slots, board.clone(), config.threads);
    let mut runner = Runner::new(
        Arc::new(config),
        engine,
        downloader,
        board.clone(),
        error_log,
        shutdown.clone(),
    );

    let result = runner.run(&plan).await;

    if let Some(reclaimer) = reclaimer {
        reclaimer.shutdown().await;
    }
    board.finish();

    match &result {
        Ok(stats) => info!("Downloaded {} videos.", stats.downloaded),
        Err(AppError::Interrupted) => info!("Interrupted, stopping."),
        Err(_) => {}
    }
    result.map(|_| ())
}

/// Cancels `shutdown` on Ctrl-C, or on SIGTERM where available.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    shutdown.cancel();
}
