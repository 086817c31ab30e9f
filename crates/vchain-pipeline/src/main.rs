//! `vchain` command-line driver.

use anyhow::{bail, Context};
use bytes::Bytes;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vchain_media::{MediaEngine, MediaEngineConfig};
use vchain_models::{JobId, SegmentRequest, SegmentSeconds, VideoSize};
use vchain_pipeline::{
    FileHistory, HistoryStore, Pipeline, PipelineConfig, PipelineError, ProgressCallback, ProgressEvent,
    RunRequest,
};
use vchain_provider::{
    provider_config_from_env, GeneratedImage, ImageRequest, ProviderClient, ProviderClientConfig, ProviderError,
};

#[derive(Debug, Parser)]
#[command(name = "vchain", version, about = "Generate continuous multi-segment videos")]
struct Cli {
    /// Provider credential
    #[arg(long, env = "VCHAIN_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// History file (defaults to VCHAIN_HISTORY_PATH)
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a base prompt into continuity-aware segment prompts
    Plan {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "4")]
        seconds: SegmentSeconds,
        #[arg(long, default_value_t = 2)]
        count: usize,
    },

    /// Generate segments in order and join them into one clip
    Generate {
        /// Segment prompt; repeat for multiple segments
        #[arg(long, required = true)]
        prompt: Vec<String>,
        #[arg(long, default_value = "4")]
        seconds: SegmentSeconds,
        #[arg(long)]
        size: Option<VideoSize>,
        #[arg(long)]
        model: Option<String>,
        /// Plan the single prompt into --count segments first
        #[arg(long)]
        plan: bool,
        #[arg(long, default_value_t = 2)]
        count: usize,
        /// Opening image for the first segment
        #[arg(long)]
        first_frame: Option<PathBuf>,
        /// Closing image for the last segment (self-hosted only)
        #[arg(long)]
        last_frame: Option<PathBuf>,
        #[arg(long, short, default_value = "output.mp4")]
        output: PathBuf,
    },

    /// Remix a video from history
    Remix {
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, short, default_value = "remix.mp4")]
        output: PathBuf,
    },

    /// Inspect or edit generation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Generate still images, e.g. to seed a first frame
    Image {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        size: Option<VideoSize>,
        #[arg(long, default_value_t = 1)]
        count: u8,
        /// Directory the images are written to
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    /// List records, newest first
    List,
    /// Delete one record
    Delete { job_id: String },
    /// Delete every expired record
    Prune,
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        if is_transient(&e) {
            warn!("The failure looks transient; running the same command again may succeed");
        }
        std::process::exit(1);
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vchain=info,warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(path) = cli.history {
        config.history_path = path;
    }
    let history: Arc<dyn HistoryStore> = Arc::new(FileHistory::new(&config.history_path));

    match cli.command {
        Command::History { action } => history_command(history.as_ref(), action).await,
        Command::Plan { prompt, seconds, count } => {
            let client = provider_client(cli.api_key.as_deref())?;
            let planner = vchain_pipeline::SegmentPlanner::new(client);
            let plan = planner.plan(&prompt, seconds, count).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Command::Image {
            prompt,
            size,
            count,
            output,
        } => {
            let client = provider_client(cli.api_key.as_deref())?;
            let request = ImageRequest {
                prompt,
                size: size.unwrap_or(config.default_size),
                count,
                model: None,
            };
            let images = client.generate_images(&request).await?;
            tokio::fs::create_dir_all(&output).await?;
            for (i, image) in images.into_iter().enumerate() {
                match image {
                    GeneratedImage::Bytes(bytes) => {
                        let path = output.join(format!("image-{}.png", i + 1));
                        tokio::fs::write(&path, &bytes).await?;
                        println!("{}", path.display());
                    }
                    GeneratedImage::Url(url) => println!("{}", url),
                }
            }
            Ok(())
        }
        Command::Generate {
            prompt,
            seconds,
            size,
            model,
            plan,
            count,
            first_frame,
            last_frame,
            output,
        } => {
            let client = provider_client(cli.api_key.as_deref())?;
            let (pipeline, _cancel) = build_pipeline(client, history, config)?;
            let size = size.unwrap_or(pipeline.config().default_size);
            let model = model.unwrap_or_else(|| pipeline.config().default_model.clone());

            let segments: Vec<SegmentRequest> = if plan {
                let [base] = prompt.as_slice() else {
                    bail!("--plan takes exactly one --prompt");
                };
                pipeline
                    .plan(base, seconds, count)
                    .await?
                    .iter()
                    .map(|planned| {
                        info!(title = %planned.title, "Planned segment");
                        planned.to_request(size, model.clone())
                    })
                    .collect()
            } else {
                prompt
                    .iter()
                    .map(|p| SegmentRequest::new(p.clone(), seconds, size, model.clone()))
                    .collect()
            };

            let mut request = RunRequest::new(segments);
            if let Some(path) = first_frame {
                request = request.with_first_frame(read_image(&path).await?);
            }
            if let Some(path) = last_frame {
                request = request.with_last_frame(read_image(&path).await?);
            }

            let result = pipeline.run(request, console_progress()).await?;
            tokio::fs::write(&output, &result.media)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            for record in &result.records {
                println!("{}\t{}", record.job_id, record.local_id);
            }
            println!("{}", output.display());
            Ok(())
        }
        Command::Remix {
            job_id,
            prompt,
            output,
        } => {
            let job_id = JobId::from(job_id);
            let parent = history
                .get(&job_id, Utc::now())
                .await?
                .with_context(|| format!("no history record for {}", job_id))?;

            let client = provider_client(cli.api_key.as_deref())?;
            let (pipeline, _cancel) = build_pipeline(client, history, config)?;
            let result = pipeline.remix(&parent, &prompt, console_progress()).await?;
            tokio::fs::write(&output, &result.media)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{}\tremix {} of {}",
                result.record.job_id, result.parent_remix_count, job_id
            );
            println!("{}", output.display());
            Ok(())
        }
    }
}

fn provider_client(api_key: Option<&str>) -> anyhow::Result<Arc<ProviderClient>> {
    let api_key = api_key.context("missing credential: pass --api-key or set VCHAIN_API_KEY")?;
    let provider = provider_config_from_env()?;
    info!(provider = %provider.kind(), "Using provider");
    let client = ProviderClient::new(ProviderClientConfig::from_env(), provider, api_key)?;
    Ok(Arc::new(client))
}

/// Build the pipeline with Ctrl-C wired to its cancel signal.
fn build_pipeline(
    client: Arc<ProviderClient>,
    history: Arc<dyn HistoryStore>,
    config: PipelineConfig,
) -> anyhow::Result<(Pipeline, tokio::task::JoinHandle<()>)> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let media_config: MediaEngineConfig = config.media_config();
    let media = MediaEngine::new(media_config)?.with_cancel(cancel_rx.clone());

    let cancel = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling run");
            cancel_tx.send(true).ok();
        }
    });

    let pipeline = Pipeline::new(client, Arc::new(media), history, config).with_cancel(cancel_rx);
    Ok((pipeline, cancel))
}

fn console_progress() -> ProgressCallback {
    Arc::new(|event| match event {
        ProgressEvent::Overall(p) => info!(progress = p, "Overall progress"),
        ProgressEvent::State(state) => info!(?state, "Run state"),
        ProgressEvent::Segment(segment) => tracing::debug!(
            index = segment.index,
            status = segment.status.as_str(),
            progress = segment.progress,
            "Segment update"
        ),
        ProgressEvent::Notice(message) => warn!("{}", message),
    })
}

async fn read_image(path: &Path) -> anyhow::Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Bytes::from(data))
}

async fn history_command(history: &dyn HistoryStore, action: HistoryAction) -> anyhow::Result<()> {
    let now = Utc::now();
    match action {
        HistoryAction::List => {
            for record in history.list(now).await? {
                let left = record.time_remaining(now);
                let status = if record.is_expired {
                    "expired".to_string()
                } else {
                    format!("{}h{:02}m left", left.num_hours(), left.num_minutes() % 60)
                };
                println!(
                    "{}\t{}\t{}\tremixes={}\t{}",
                    record.job_id,
                    record.created_at.to_rfc3339(),
                    status,
                    record.remix_count,
                    record.prompt
                );
            }
        }
        HistoryAction::Delete { job_id } => {
            let job_id = JobId::from(job_id);
            if history.delete(&job_id).await? {
                println!("deleted {}", job_id);
            } else {
                bail!("no history record for {}", job_id);
            }
        }
        HistoryAction::Prune => {
            let removed = history.purge_expired(now).await?;
            println!("removed {} expired record(s)", removed);
        }
    }
    Ok(())
}

/// Whether a failed command is worth re-running unchanged.
fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<PipelineError>()
            .map(PipelineError::is_retryable)
            .or_else(|| cause.downcast_ref::<ProviderError>().map(ProviderError::is_retryable))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_poll_timeout_is_transient_through_context() {
        let err = anyhow::Error::new(PipelineError::PollTimeout {
            job_id: JobId::from("job-1"),
            attempts: 3,
        })
        .context("Run failed");
        assert!(is_transient(&err));
    }

    #[test]
    fn test_busy_provider_is_transient() {
        let err = anyhow::Error::new(ProviderError::api(503, "busy"));
        assert!(is_transient(&err));
    }

    #[test]
    fn test_validation_and_plain_errors_are_not_transient() {
        assert!(!is_transient(&anyhow::Error::new(PipelineError::validation("bad prompt"))));
        assert!(!is_transient(&anyhow!("missing file")));
    }
}
