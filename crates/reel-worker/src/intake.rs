//! Request intake: the records an upload API writes before the pipeline runs.
//!
//! A request is created `pending`, collects uploads, and is finalized to
//! `requested`, which is what the spawning and conversion stages poll for.

use reel_models::{
    AspectRatio, AspectRatioConversionJob, ConversionStatus, FormatSpec, FormatStatus, RequestId,
    RequestStatus, Upload, VideoRequest, VideoRequestFormat,
};
use reel_store::{Filter, Patch, Repository};
use serde::Deserialize;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// One requested output format as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFormat {
    pub aspect_ratio: String,
    /// Target length in seconds
    pub length: u32,
}

/// A request submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVideoRequest {
    pub lang: String,
    pub topic: String,
    pub style: String,
    #[serde(default)]
    pub brand_link: Option<String>,
    pub formats: Vec<NewFormat>,
}

/// Persist a request with its formats and one conversion job per distinct ratio.
pub async fn create_request(repo: &Repository, new: NewVideoRequest) -> WorkerResult<RequestId> {
    if new.formats.is_empty() {
        return Err(WorkerError::invalid_input("a request needs at least one format"));
    }

    let mut request = VideoRequest::new(new.lang, new.topic, new.style);
    if let Some(link) = new.brand_link.filter(|l| !l.trim().is_empty()) {
        request = request.with_brand_link(link);
    }
    for format in &new.formats {
        if format.length == 0 {
            return Err(WorkerError::invalid_input(format!(
                "format {} has zero length",
                format.aspect_ratio
            )));
        }
        let ratio: AspectRatio = format.aspect_ratio.parse()?;
        request = request.with_format(FormatSpec::new(ratio, format.length));
    }

    repo.insert(&request).await?;
    for format in &request.formats {
        repo.insert(&VideoRequestFormat::new(request.id.clone(), *format)).await?;
    }
    let ratios = request.distinct_aspect_ratios();
    for ratio in &ratios {
        repo.insert(&AspectRatioConversionJob::new(request.id.clone(), *ratio)).await?;
    }

    info!(
        request_id = %request.id,
        formats = request.formats.len(),
        conversion_jobs = ratios.len(),
        "Created video request"
    );
    Ok(request.id)
}

/// Record an uploaded file against a request.
pub async fn register_upload(
    repo: &Repository,
    request_id: &RequestId,
    filename: &str,
    content_type: &str,
    file_path: &str,
) -> WorkerResult<Upload> {
    if repo.get::<VideoRequest>(request_id.as_str()).await?.is_none() {
        return Err(WorkerError::not_found(format!("video request {}", request_id)));
    }

    let upload = Upload::new(request_id.clone(), filename, content_type, file_path)?;
    repo.insert(&upload).await?;
    info!(request_id = %request_id, upload_id = %upload.id, kind = %upload.kind(), "Registered upload");
    Ok(upload)
}

/// Flip a pending request and its formats and conversion jobs to `requested`.
pub async fn finalize_request(repo: &Repository, request_id: &RequestId) -> WorkerResult<()> {
    let request: VideoRequest = repo
        .get(request_id.as_str())
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("video request {}", request_id)))?;
    if request.status != RequestStatus::Pending {
        return Err(WorkerError::precondition(format!(
            "request {} is {}, not pending",
            request_id,
            request.status.as_str()
        )));
    }

    let of_request = Filter::eq("request_id", request_id.as_str());

    let formats: Vec<VideoRequestFormat> = repo
        .find(
            &of_request
                .clone()
                .and(Filter::eq("status", FormatStatus::Pending.as_str())),
            None,
        )
        .await?;
    let to_requested = Patch::new().set("status", FormatStatus::Requested.as_str());
    for format in &formats {
        let _: VideoRequestFormat = repo.update(format.id.as_str(), &to_requested).await?;
    }

    let jobs: Vec<AspectRatioConversionJob> = repo
        .find(
            &of_request.and(Filter::eq("status", ConversionStatus::Pending.as_str())),
            None,
        )
        .await?;
    let to_requested = Patch::new().set("status", ConversionStatus::Requested.as_str());
    for job in &jobs {
        let _: AspectRatioConversionJob = repo.update(job.id.as_str(), &to_requested).await?;
    }

    // The request goes last so spawning never sees it before its children.
    let _: VideoRequest = repo
        .update(
            request_id.as_str(),
            &Patch::new().set("status", RequestStatus::Requested.as_str()),
        )
        .await?;

    info!(
        request_id = %request_id,
        formats = formats.len(),
        conversion_jobs = jobs.len(),
        "Finalized video request"
    );
    Ok(())
}
