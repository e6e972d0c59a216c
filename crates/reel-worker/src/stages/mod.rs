//! Stage implementations and the store queries they share.

pub mod assemble;
pub mod convert;
pub mod describe;
pub mod expand;
pub mod extract;
pub mod narrate;
pub mod script;
pub mod spawn;

pub use assemble::AssembleStage;
pub use convert::ConvertStage;
pub use describe::DescribeStage;
pub use extract::ExtractStage;
pub use narrate::NarrateStage;
pub use script::ScriptStage;
pub use spawn::{SpawnFormatStage, SpawnRequestStage};

use std::collections::HashSet;
use std::sync::Arc;

use reel_models::{
    AspectRatio, AspectRatioConversionJob, Asset, AssetStatus, ConversionStatus, RequestId, Upload,
    UploadStatus,
};
use reel_store::{Filter, Repository};

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::stage::Stage;

/// Every stage in pipeline order, with the spawning variant picked by config.
pub fn pipeline(ctx: &WorkerContext) -> Vec<Arc<dyn Stage>> {
    let spawn: Arc<dyn Stage> = if ctx.config.spawn_per_format {
        Arc::new(SpawnFormatStage::new(ctx.clone()))
    } else {
        Arc::new(SpawnRequestStage::new(ctx.clone()))
    };

    vec![
        Arc::new(DescribeStage::new(ctx.clone())),
        Arc::new(ConvertStage::new(ctx.clone())),
        spawn,
        Arc::new(ScriptStage::new(ctx.clone())),
        Arc::new(ExtractStage::new(ctx.clone())),
        Arc::new(NarrateStage::new(ctx.clone())),
        Arc::new(AssembleStage::new(ctx.clone())),
    ]
}

/// Converted assets of one request at one aspect ratio.
pub async fn converted_assets(
    repo: &Repository,
    request_id: &RequestId,
    ratio: AspectRatio,
) -> WorkerResult<Vec<Asset>> {
    let filter = Filter::eq("request_id", request_id.as_str())
        .and(Filter::eq("aspect_ratio", ratio.as_str()))
        .and(Filter::eq("status", AssetStatus::Converted.as_str()));
    Ok(repo.find(&filter, None).await?)
}

/// Claim gate excluding requests that still have undescribed uploads.
/// `request_field` names the field holding the request id on the claimed
/// record: `request_id` on children, `id` on the request itself.
pub async fn described_requests_gate(repo: &Repository, request_field: &str) -> WorkerResult<Filter> {
    let pending = repo
        .distinct::<Upload>(
            &Filter::not_in("status", [UploadStatus::DescriptionComplete.as_str()]),
            "request_id",
        )
        .await?;
    Ok(Filter::NotIn(request_field.to_string(), pending))
}

/// A (request id, aspect ratio) pair.
pub type RatioKey = (String, AspectRatio);

/// Pairs with at least one converted asset.
pub async fn converted_asset_keys(repo: &Repository) -> WorkerResult<HashSet<RatioKey>> {
    let assets: Vec<Asset> = repo
        .find(&Filter::eq("status", AssetStatus::Converted.as_str()), None)
        .await?;
    Ok(assets
        .into_iter()
        .map(|a| (a.request_id.to_string(), a.aspect_ratio))
        .collect())
}

/// Pairs whose conversion job finished.
pub async fn converted_job_keys(repo: &Repository) -> WorkerResult<HashSet<RatioKey>> {
    let jobs: Vec<AspectRatioConversionJob> = repo
        .find(&Filter::eq("status", ConversionStatus::Converted.as_str()), None)
        .await?;
    Ok(jobs
        .into_iter()
        .map(|j| (j.request_id.to_string(), j.aspect_ratio))
        .collect())
}

/// `In("id", ids)`, or `None` when nothing qualifies this poll.
pub fn id_gate(ids: Vec<String>) -> Option<Filter> {
    if ids.is_empty() {
        None
    } else {
        Some(Filter::is_in("id", ids))
    }
}
