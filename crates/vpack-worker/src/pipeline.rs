//! The packaging pipeline: materialize, encode, package, publish, record.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use vpack_media::{
    detect_video_codec, encode_rendition, extract_audio, extract_thumbnail, media_duration,
    run_packager, EncodeProgress, PackagerCommand, StreamKind, VideoCodec,
};
use vpack_models::{JobId, JobPhase, Ladder, ManifestMode};
use vpack_queue::{PackageVideoJob, ProgressChannel};
use vpack_storage::{content_type_for, upload_dir, ObjectStore, StorageError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::fanout::{plan_items, run_items, FanOutReport, WorkItem};
use crate::lock::{LockManager, OwnershipLock};
use crate::logging::JobLogger;
use crate::metadata::{AssetRecord, MetadataClient};
use crate::workspace::JobWorkspace;

/// How a job ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The full pipeline ran and the output was published
    Completed,
    /// Nothing was done: output already exists or another worker owns the job
    Skipped,
}

/// Everything the pipeline needs, created once per worker process.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub storage: ObjectStore,
    pub progress: ProgressChannel,
    /// Process-wide cap on simultaneous heavy media processes
    pub encode_permits: Arc<Semaphore>,
    /// Fixed per-process encoder decision
    pub video_codec: VideoCodec,
    pub locks: LockManager,
    pub metadata: MetadataClient,
}

impl PipelineContext {
    /// Build the context, probing encoder capability once.
    pub async fn new(config: WorkerConfig, consumer_name: &str) -> WorkerResult<Self> {
        let storage = ObjectStore::from_env().await?;

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let progress = ProgressChannel::new(&redis_url)?;

        let video_codec = detect_video_codec(config.profile.prefer_hwaccel).await?;
        let encode_permits = Arc::new(Semaphore::new(config.profile.encode_concurrency.max(1)));

        let locks = LockManager::new(&config.lock_dir, consumer_name, config.lock_ttl);
        let metadata = MetadataClient::from_env();

        Ok(Self {
            config,
            storage,
            progress,
            encode_permits,
            video_codec,
            locks,
            metadata,
        })
    }
}

/// Run one packaging job end to end.
///
/// The workspace and the ownership lease are torn down on every exit path,
/// success and failure alike.
pub async fn run_job(
    ctx: &Arc<PipelineContext>,
    job: &PackageVideoJob,
) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::new(&job.job_id, "package_video");
    let output_prefix = job.output_prefix();

    let storage = ctx.storage.clone();
    let skip = already_published(ctx.config.manifest_mode, &output_prefix, |key| async move {
        storage.exists(&key).await
    })
    .await;
    if skip {
        logger.log_completion("output already published, skipping");
        return Ok(JobOutcome::Skipped);
    }

    let Some(lock) = ctx.locks.try_acquire(&job.job_id).await? else {
        info!(job_id = %job.job_id, "job owned by another worker, skipping");
        return Ok(JobOutcome::Skipped);
    };
    publish_phase(ctx, &job.job_id, JobPhase::LockAcquired).await;

    let workspace = match JobWorkspace::create(&ctx.config.work_dir, &job.job_id).await {
        Ok(ws) => ws,
        Err(e) => {
            release_lock(lock, &job.job_id).await;
            return Err(e);
        }
    };

    logger.log_start(&format!("packaging {}", job.source_key));
    let result = drive(ctx, job, &workspace, &output_prefix).await;

    workspace.cleanup().await;
    release_lock(lock, &job.job_id).await;

    match &result {
        Ok(()) => {
            publish_phase(ctx, &job.job_id, JobPhase::Completed).await;
            ctx.progress.done(&job.job_id, &output_prefix).await.ok();
            logger.log_completion(&format!("published under {}", output_prefix));
        }
        Err(e) => {
            publish_phase(ctx, &job.job_id, JobPhase::Failed).await;
            ctx.progress.error(&job.job_id, e.to_string()).await.ok();
            logger.log_failure(&e.to_string());
        }
    }

    result.map(|()| JobOutcome::Completed)
}

/// The pipeline body. Workspace and lease teardown is the caller's job.
async fn drive(
    ctx: &Arc<PipelineContext>,
    job: &PackageVideoJob,
    workspace: &JobWorkspace,
    output_prefix: &str,
) -> WorkerResult<()> {
    if !ctx.config.ladder.has_enabled() {
        return Err(WorkerError::config_error("no enabled rungs in the ladder"));
    }

    // Materialize the source
    let source = workspace.source_path(&job.original_filename);
    ctx.storage
        .download_file(&job.source_key, &source)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(key) => {
                WorkerError::input_unavailable(format!("source object missing: {}", key))
            }
            other => WorkerError::input_unavailable(other.to_string()),
        })?;
    publish_phase(ctx, &job.job_id, JobPhase::InputMaterialized).await;

    // Duration is only needed for progress estimates; a probe failure is
    // not fatal.
    let duration = match media_duration(&source).await {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(job_id = %job.job_id, "duration probe failed: {}", e);
            None
        }
    };

    // Fan out the encodes and extractions
    publish_phase(ctx, &job.job_id, JobPhase::Encoding).await;
    let items = plan_items(&ctx.config.ladder, job.extract_audio);
    let report = fan_out(ctx, job, workspace, &source, duration, items)
        .await
        .into_result()?;

    // Package
    if ctx.config.manifest_mode != ManifestMode::None {
        package(ctx, workspace, &report).await?;
    }
    publish_phase(ctx, &job.job_id, JobPhase::Packaged).await;

    // Publish
    publish_outputs(ctx, job, workspace, output_prefix).await?;
    publish_phase(ctx, &job.job_id, JobPhase::Published).await;

    // Record the derived asset
    let asset_key = match ctx.config.manifest_mode.formats().first() {
        Some(format) => format!("{}/{}", output_prefix, format.manifest_filename()),
        None => output_prefix.to_string(),
    };
    ctx.metadata
        .record_derived_asset(&AssetRecord {
            original_filename: job.original_filename.clone(),
            owner_id: job.owner_id.clone(),
            asset_key,
            thumbnail_key: format!("{}/thumbnail.jpg", output_prefix),
        })
        .await?;

    Ok(())
}

/// Spawn one bounded task per work item.
async fn fan_out(
    ctx: &Arc<PipelineContext>,
    job: &PackageVideoJob,
    workspace: &JobWorkspace,
    source: &PathBuf,
    duration: Option<f64>,
    items: Vec<WorkItem>,
) -> FanOutReport {
    let ctx_run = Arc::clone(ctx);
    let input = source.clone();
    let renditions_dir = workspace.renditions_dir();
    let thumbnail_path = workspace.thumbnail_path();
    let audio_path = workspace.audio_path();
    let job_id = job.job_id.clone();

    let run = move |item: WorkItem| {
        let ctx = Arc::clone(&ctx_run);
        let input = input.clone();
        let renditions_dir = renditions_dir.clone();
        let thumbnail_path = thumbnail_path.clone();
        let audio_path = audio_path.clone();
        let job_id = job_id.clone();
        async move {
            match item {
                WorkItem::Rung(rung) => {
                    let on_progress = rendition_progress(
                        ctx.progress.clone(),
                        job_id,
                        rung.name.clone(),
                        duration,
                    );
                    encode_rendition(
                        &input,
                        &renditions_dir,
                        &rung,
                        &ctx.config.profile,
                        ctx.video_codec,
                        on_progress,
                    )
                    .await
                }
                WorkItem::Thumbnail => extract_thumbnail(&input, &thumbnail_path).await,
                WorkItem::Audio => {
                    extract_audio(
                        &input,
                        &audio_path,
                        &ctx.config.profile.audio_codec,
                        &ctx.config.profile.audio_bitrate,
                    )
                    .await
                }
            }
        }
    };

    run_items(items, Arc::clone(&ctx.encode_permits), run).await
}

/// Plan one segmenter invocation per requested manifest format, each
/// referencing every encoded rung.
fn plan_packaging(
    ladder: &Ladder,
    mode: ManifestMode,
    segment_ms: u32,
    packaged_dir: &Path,
    report: &FanOutReport,
) -> Vec<PackagerCommand> {
    let rung_artifacts: Vec<&PathBuf> = ladder
        .enabled()
        .filter_map(|rung| report.artifact(&rung.name))
        .collect();

    mode.formats()
        .into_iter()
        .map(|format| {
            let manifest_path = packaged_dir.join(format.manifest_filename());
            let mut cmd = PackagerCommand::for_format(segment_ms, &manifest_path, format);
            for artifact in &rung_artifacts {
                cmd = cmd
                    .input(artifact, StreamKind::Video)
                    .input(artifact, StreamKind::Audio);
            }
            cmd
        })
        .collect()
}

async fn package(
    ctx: &Arc<PipelineContext>,
    workspace: &JobWorkspace,
    report: &FanOutReport,
) -> WorkerResult<()> {
    let commands = plan_packaging(
        &ctx.config.ladder,
        ctx.config.manifest_mode,
        ctx.config.segment_ms,
        &workspace.packaged_dir(),
        report,
    );
    for cmd in commands {
        debug!("running segmentation");
        run_packager(&cmd)
            .await
            .map_err(|e| WorkerError::packaging_failed(e.to_string()))?;
    }

    Ok(())
}

/// Upload the job's outputs under the published prefix.
async fn publish_outputs(
    ctx: &Arc<PipelineContext>,
    job: &PackageVideoJob,
    workspace: &JobWorkspace,
    output_prefix: &str,
) -> WorkerResult<()> {
    let publish_failed = |e: StorageError| WorkerError::publish_failed(e.to_string());

    if ctx.config.manifest_mode != ManifestMode::None {
        upload_dir(&ctx.storage, &workspace.packaged_dir(), output_prefix)
            .await
            .map_err(publish_failed)?;
    }

    // Muxed renditions are published when no manifest was produced, or when
    // explicitly kept alongside the packaged output.
    if ctx.config.manifest_mode == ManifestMode::None || ctx.config.keep_renditions {
        let prefix = format!("{}/renditions", output_prefix);
        upload_dir(&ctx.storage, &workspace.renditions_dir(), &prefix)
            .await
            .map_err(publish_failed)?;
    }

    let thumbnail = workspace.thumbnail_path();
    ctx.storage
        .upload_file(
            &thumbnail,
            &format!("{}/thumbnail.jpg", output_prefix),
            content_type_for(&thumbnail),
        )
        .await
        .map_err(publish_failed)?;

    if job.extract_audio {
        let audio = workspace.audio_path();
        ctx.storage
            .upload_file(
                &audio,
                &format!("{}/audio.m4a", output_prefix),
                content_type_for(&audio),
            )
            .await
            .map_err(publish_failed)?;
    }

    Ok(())
}

/// Check whether the primary manifest is already published.
///
/// This is an optimization only; probe errors fall through to the locked
/// path. With no manifest format requested there is nothing to probe and the
/// ownership lease alone deduplicates.
async fn already_published<F, Fut>(mode: ManifestMode, output_prefix: &str, exists: F) -> bool
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<bool, StorageError>>,
{
    let Some(format) = mode.formats().first().copied() else {
        return false;
    };
    let key = format!("{}/{}", output_prefix, format.manifest_filename());
    match exists(key.clone()).await {
        Ok(found) => found,
        Err(e) => {
            warn!("skip check for {} failed: {}", key, e);
            false
        }
    }
}

/// Progress callback for one rendition encode.
///
/// Publishes only when the integer percentage changes, and only when the
/// source duration is known.
fn rendition_progress(
    progress: ProgressChannel,
    job_id: JobId,
    rung: String,
    duration: Option<f64>,
) -> impl Fn(EncodeProgress) + Send + 'static {
    let last = Arc::new(AtomicU8::new(u8::MAX));
    move |update| {
        let Some(duration) = duration else {
            return;
        };
        let Some(pct) = update.percent(duration) else {
            return;
        };
        if last.swap(pct, Ordering::Relaxed) == pct {
            return;
        }

        let progress = progress.clone();
        let job_id = job_id.clone();
        let rung = rung.clone();
        tokio::spawn(async move {
            progress.rendition(&job_id, &rung, pct).await.ok();
        });
    }
}

async fn publish_phase(ctx: &Arc<PipelineContext>, job_id: &JobId, phase: JobPhase) {
    debug!(job_id = %job_id, phase = %phase, "phase transition");
    ctx.progress.phase(job_id, phase).await.ok();
}

async fn release_lock(lock: OwnershipLock, job_id: &JobId) {
    if let Err(e) = lock.release().await {
        warn!(job_id = %job_id, "failed to release job lease: {}", e);
    }
}
