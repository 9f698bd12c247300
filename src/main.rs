use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lunar_seg::{
    batch::DirectorySegmenter,
    config::{Command, Config, SegmentConfig, ServeConfig},
    server, Model, Segmenter,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    ensure!(
        config.model_path.exists(),
        "Model path does not exist: {}",
        config.model_path.display()
    );

    let model = Model::new(&config.model_path, config.device_id).with_context(|| {
        format!(
            "Failed to load model from {}",
            config.model_path.display()
        )
    })?;
    let segmenter = Segmenter::new(model).context("Model does not match the color table")?;

    match config.command {
        Command::Serve(serve_config) => serve(segmenter, &serve_config),
        Command::Segment(segment_config) => segment(&segmenter, &segment_config),
    }
}

fn serve(segmenter: Segmenter<Model>, config: &ServeConfig) -> Result<()> {
    let address = config
        .bind_address()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;
    let app = server::create_router(Arc::new(segmenter), config.max_upload_bytes());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(async move {
            let listener = tokio::net::TcpListener::bind(address)
                .await
                .with_context(|| format!("Failed to bind {address}"))?;
            info!("Lunar segmentation server listening on http://{address} (UI at /ui)");
            axum::serve(listener, app)
                .with_graceful_shutdown(server::shutdown_signal())
                .await
                .context("Server terminated unexpectedly")
        })
}

fn segment(segmenter: &Segmenter<Model>, config: &SegmentConfig) -> Result<()> {
    ensure!(
        config.input_dir.is_dir(),
        "Input directory does not exist: {}",
        config.input_dir.display()
    );
    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    let summary = DirectorySegmenter::new(segmenter, &config.input_dir, &config.output_dir)
        .run()
        .with_context(|| format!("Failed to segment {}", config.input_dir.display()))?;
    info!(
        "Segmented {} image(s) into {}, skipped {}",
        summary.segmented,
        config.output_dir.display(),
        summary.skipped
    );
    Ok(())
}
