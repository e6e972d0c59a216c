//! End-to-end pipeline runs against the in-memory store with fake media and
//! AI services that write placeholder files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reel_ai::{ExtractedScene, ExtractedScenes, TitleAndScript};
use reel_media::{BodyClip, MediaInfo, SceneAudio, TitleCard};
use reel_models::{
    AspectRatio, AspectRatioConversionJob, Asset, Collection, ConversionStatus, FormatSpec,
    MediaKind, RequestId, Scene, SceneList, SceneStatus, SceneType, Upload, UploadStatus, VideoJob,
    VideoJobStatus, VideoRequest,
};
use reel_store::{Filter, MemoryStore, Patch, Repository};
use reel_worker::stages::{
    AssembleStage, ConvertStage, DescribeStage, ExtractStage, NarrateStage, ScriptStage,
    SpawnFormatStage, SpawnRequestStage,
};
use reel_worker::{
    create_request, finalize_request, register_upload, AiService, MediaService, NewFormat,
    NewVideoRequest, Stage, StageRunner, WorkerConfig, WorkerContext, WorkerResult,
};
use tempfile::TempDir;

const SPOKEN: &str = "Hi, I'm Dana and we bake everything here at dawn.";

async fn touch(path: &Path) -> WorkerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"placeholder").await?;
    Ok(())
}

#[derive(Default)]
struct FakeMedia {
    rendered: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaService for FakeMedia {
    async fn probe(&self, path: &Path) -> WorkerResult<MediaInfo> {
        let is_video = path.extension().map(|e| e == "mp4").unwrap_or(false);
        Ok(if is_video {
            MediaInfo {
                width: 1920,
                height: 1080,
                duration: Some(8.0),
                fps: Some(30.0),
                has_audio: true,
            }
        } else {
            MediaInfo {
                width: 800,
                height: 800,
                duration: None,
                fps: None,
                has_audio: false,
            }
        })
    }

    async fn duration(&self, _path: &Path) -> WorkerResult<f64> {
        Ok(2.5)
    }

    async fn convert(&self, _input: &Path, output: &Path, _kind: MediaKind, _ratio: AspectRatio) -> WorkerResult<()> {
        touch(output).await
    }

    async fn extract_frames(&self, _input: &Path, out_dir: &Path, _interval_secs: f64) -> WorkerResult<Vec<PathBuf>> {
        let frame = out_dir.join("frame_0001.jpg");
        touch(&frame).await?;
        Ok(vec![frame])
    }

    async fn render_body(&self, clip: &BodyClip, output: &Path) -> WorkerResult<()> {
        let audio = match clip.audio {
            SceneAudio::Narration(_) => "narration",
            SceneAudio::Embedded => "embedded",
            SceneAudio::Silence => "silence",
        };
        self.rendered
            .lock()
            .unwrap()
            .push(format!("body:{}:{}", audio, clip.visuals.len()));
        touch(output).await
    }

    async fn render_title_card(&self, card: &TitleCard, output: &Path) -> WorkerResult<()> {
        self.rendered.lock().unwrap().push(format!("card:{}", card.narration));
        touch(output).await
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path, _fade_secs: f64) -> WorkerResult<()> {
        assert!(inputs.iter().all(|p| p.exists()), "every clip is rendered before the cut");
        touch(output).await
    }
}

struct FakeAi;

#[async_trait]
impl AiService for FakeAi {
    async fn transcribe(&self, _path: &Path, _content_type: &str) -> WorkerResult<String> {
        Ok(SPOKEN.to_string())
    }

    async fn describe_image(&self, _path: &Path, context: &str) -> WorkerResult<String> {
        Ok(format!("A bright storefront ({})", context))
    }

    async fn describe_frames(&self, frames: &[PathBuf]) -> WorkerResult<String> {
        Ok(format!("{} frames of a baker at work", frames.len()))
    }

    async fn is_logo(&self, _path: &Path) -> WorkerResult<bool> {
        Ok(false)
    }

    async fn is_profile_pic(&self, _path: &Path) -> WorkerResult<bool> {
        Ok(false)
    }

    async fn transcript_has_speech(&self, transcript: &str) -> WorkerResult<bool> {
        Ok(!transcript.is_empty())
    }

    async fn summarize_description(&self, description: &str, _transcript: &str, _duration: f64) -> WorkerResult<String> {
        Ok(description.to_string())
    }

    async fn tidy_transcript(&self, _description: &str, transcript: &str, _duration: f64) -> WorkerResult<String> {
        Ok(transcript.trim().to_string())
    }

    async fn generate_title_and_script(&self, video: &VideoJob, assets: &[Asset]) -> WorkerResult<TitleAndScript> {
        Ok(TitleAndScript {
            title: "Harbour Bakery".to_string(),
            script: format!("{} told through {} clips.", video.topic, assets.len()),
        })
    }

    async fn extract_scenes(&self, title: &str, _script: &str, assets: &[Asset]) -> WorkerResult<ExtractedScenes> {
        let pick = |video: bool| {
            assets
                .iter()
                .filter(|a| a.metadata.is_video() == video)
                .map(|a| a.filename.clone())
                .collect::<Vec<_>>()
        };
        Ok(ExtractedScenes {
            title: title.to_string(),
            scenes: vec![
                ExtractedScene {
                    narration: "Fresh bread every morning.".to_string(),
                    asset_filenames: pick(false),
                },
                ExtractedScene {
                    narration: "Meet the baker.".to_string(),
                    asset_filenames: pick(true),
                },
            ],
        })
    }

    async fn synthesize_speech(&self, _text: &str, output: &Path) -> WorkerResult<()> {
        touch(output).await
    }
}

struct Harness {
    repo: Repository,
    ctx: WorkerContext,
    media: Arc<FakeMedia>,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let media = Arc::new(FakeMedia::default());
        let config = WorkerConfig {
            media_root: dir.path().join("media"),
            idle_backoff: Duration::from_millis(10),
            ..WorkerConfig::default()
        };
        let ctx = WorkerContext::new(repo.clone(), media.clone(), Arc::new(FakeAi), config);
        Self {
            repo,
            ctx,
            media,
            _dir: dir,
        }
    }

    fn runner(&self, stage: Arc<dyn Stage>) -> StageRunner {
        StageRunner::new(stage, self.repo.clone(), self.ctx.config.clone())
    }

    /// Run batches until a poll settles nothing. Returns records settled.
    async fn drain(&self, stage: Arc<dyn Stage>) -> usize {
        let runner = self.runner(stage);
        let mut total = 0;
        for _ in 0..20 {
            match runner.run_once().await.unwrap() {
                0 => break,
                n => total += n,
            }
        }
        total
    }

    async fn submit(&self, uploads: &[(&str, &str)]) -> RequestId {
        let id = create_request(
            &self.repo,
            NewVideoRequest {
                lang: "en".into(),
                topic: "A harbour bakery".into(),
                style: "warm".into(),
                brand_link: Some("harbourbakery.example".into()),
                formats: vec![NewFormat {
                    aspect_ratio: "9x16".into(),
                    length: 30,
                }],
            },
        )
        .await
        .unwrap();

        for (filename, mime) in uploads {
            let path = self.ctx.config.media_root.join("uploads").join(filename);
            touch(&path).await.unwrap();
            register_upload(&self.repo, &id, filename, mime, &path.to_string_lossy())
                .await
                .unwrap();
        }
        finalize_request(&self.repo, &id).await.unwrap();
        id
    }

    async fn videos_of(&self, request_id: &RequestId) -> Vec<VideoJob> {
        self.repo
            .find(&Filter::eq("request_id", request_id.as_str()), None)
            .await
            .unwrap()
    }

    async fn scenes(&self, video_id: &str) -> Vec<Scene> {
        self.repo
            .find(&Filter::eq("video_id", video_id), None)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_round_trip_to_processing_complete() {
    let h = Harness::new();
    let request_id = h.submit(&[("storefront.png", "image/png"), ("baker.mp4", "video/mp4")]).await;
    let ctx = h.ctx.clone();

    assert_eq!(h.drain(Arc::new(DescribeStage::new(ctx.clone()))).await, 2);
    let uploads: Vec<Upload> = h
        .repo
        .find(&Filter::eq("request_id", request_id.as_str()), None)
        .await
        .unwrap();
    assert!(uploads.iter().all(|u| u.status == UploadStatus::DescriptionComplete));
    let video_upload = uploads.iter().find(|u| u.metadata.is_video()).unwrap();
    assert_eq!(video_upload.transcript, SPOKEN);

    assert_eq!(h.drain(Arc::new(ConvertStage::new(ctx.clone()))).await, 1);
    assert_eq!(h.drain(Arc::new(SpawnRequestStage::new(ctx.clone()))).await, 1);
    assert_eq!(h.drain(Arc::new(ScriptStage::new(ctx.clone()))).await, 1);

    let videos: Vec<VideoJob> = h
        .repo
        .find(&Filter::eq("request_id", request_id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(videos.len(), 1);
    let video_id = videos[0].id.to_string();
    assert_eq!(videos[0].title.as_deref(), Some("Harbour Bakery"));

    assert_eq!(h.drain(Arc::new(ExtractStage::new(ctx.clone()))).await, 1);
    let extracted = h.scenes(&video_id).await;
    assert_eq!(extracted.len(), 4);

    assert_eq!(h.drain(Arc::new(NarrateStage::new(ctx.clone()))).await, 4);
    assert!(h
        .scenes(&video_id)
        .await
        .iter()
        .all(|s| s.status == SceneStatus::NarrationComplete && s.narration_audio_filename.is_some()));

    assert_eq!(h.drain(Arc::new(AssembleStage::new(ctx.clone()))).await, 1);

    let video: VideoJob = h.repo.require(&video_id).await.unwrap();
    assert_eq!(video.status, VideoJobStatus::ProcessingComplete);
    let final_cut = video.final_cut_path.expect("final cut recorded");
    assert!(!final_cut.is_empty());
    assert!(Path::new(&final_cut).exists());

    let scenes = h.scenes(&video_id).await;
    assert_eq!(scenes.len(), 5);
    let list = SceneList::from_scenes(scenes).unwrap();
    let ordered = list.ordered();
    let speech = ordered
        .iter()
        .find(|s| s.scene_type == SceneType::HasSpeech)
        .expect("speech scene split out");
    assert_eq!(speech.narration, SPOKEN);
    assert_eq!(speech.duration, Some(8.0));
    let source = list.get(speech.prev_scene_id.as_ref().unwrap()).unwrap();
    assert_eq!(source.scene_type, SceneType::Title);
    assert_eq!(source.narration, "Meet the baker.");
    assert!(ordered.iter().all(|s| s.generated_scene_video.is_some()));

    let rendered = h.media.rendered.lock().unwrap().clone();
    assert!(rendered.contains(&"body:embedded:1".to_string()));
    assert!(rendered.contains(&"body:narration:1".to_string()));
    assert_eq!(rendered.iter().filter(|r| r.starts_with("card:")).count(), 3);
}

#[tokio::test]
async fn test_extraction_links_title_body_and_outro() {
    let h = Harness::new();
    h.submit(&[("storefront.png", "image/png"), ("baker.mp4", "video/mp4")]).await;
    let ctx = h.ctx.clone();
    h.drain(Arc::new(DescribeStage::new(ctx.clone()))).await;
    h.drain(Arc::new(ConvertStage::new(ctx.clone()))).await;
    h.drain(Arc::new(SpawnRequestStage::new(ctx.clone()))).await;
    h.drain(Arc::new(ScriptStage::new(ctx.clone()))).await;
    h.drain(Arc::new(ExtractStage::new(ctx.clone()))).await;

    let videos: Vec<VideoJob> = h.repo.find(&Filter::all(), None).await.unwrap();
    let scenes = h.scenes(videos[0].id.as_str()).await;

    // Two generated scenes plus title and outro.
    assert_eq!(scenes.len(), 2 + 2);
    assert_eq!(scenes.iter().filter(|s| s.prev_scene_id.is_none()).count(), 1);
    assert_eq!(scenes.iter().filter(|s| s.next_scene_id.is_none()).count(), 1);

    let list = SceneList::from_scenes(scenes).unwrap();
    let ordered = list.ordered();
    assert_eq!(ordered.len(), 4);
    let unique: HashSet<_> = ordered.iter().map(|s| s.id.clone()).collect();
    assert_eq!(unique.len(), 4);
    assert_eq!(ordered[0].scene_type, SceneType::Title);
    assert_eq!(ordered[3].scene_type, SceneType::Outro);

    let video: VideoJob = h.repo.require(videos[0].id.as_str()).await.unwrap();
    assert_eq!(video.status, VideoJobStatus::SceneExtractionComplete);
    assert_eq!(video.scene_extraction_attempts, 1);
}

#[tokio::test]
async fn test_conversion_waits_for_every_upload() {
    let h = Harness::new();
    let request_id = h.submit(&[("storefront.png", "image/png"), ("menu.png", "image/png")]).await;

    let uploads: Vec<Upload> = h
        .repo
        .find(&Filter::eq("request_id", request_id.as_str()), None)
        .await
        .unwrap();
    let _: Upload = h
        .repo
        .update(
            uploads[0].id.as_str(),
            &Patch::new().set("status", UploadStatus::DescriptionComplete.as_str()),
        )
        .await
        .unwrap();

    let convert = h.runner(Arc::new(ConvertStage::new(h.ctx.clone())));
    assert_eq!(convert.run_once().await.unwrap(), 0);

    let jobs: Vec<AspectRatioConversionJob> = h
        .repo
        .find(&Filter::eq("request_id", request_id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(jobs[0].status, ConversionStatus::Requested);
    assert_eq!(jobs[0].conversion_attempts, 0);

    let _: Upload = h
        .repo
        .update(
            uploads[1].id.as_str(),
            &Patch::new().set("status", UploadStatus::DescriptionComplete.as_str()),
        )
        .await
        .unwrap();
    assert_eq!(convert.run_once().await.unwrap(), 1);

    let job: AspectRatioConversionJob = h.repo.require(jobs[0].id.as_str()).await.unwrap();
    assert_eq!(job.status, ConversionStatus::Converted);
    let assets: Vec<Asset> = h
        .repo
        .find(&Filter::eq("request_id", request_id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(assets.len(), 2);
}

#[tokio::test]
async fn test_concurrent_claims_never_share_a_record() {
    let h = Harness::new();
    for i in 0..5 {
        let path = format!("media/clip{}.mp4", i);
        let request_id = h.submit(&[]).await;
        register_upload(&h.repo, &request_id, &format!("clip{}.mp4", i), "video/mp4", &path)
            .await
            .unwrap();
    }

    let filter = Filter::eq("status", UploadStatus::Uploaded.as_str());
    let patch = Patch::new().set("status", UploadStatus::DescriptionStarted.as_str());
    let store = h.repo.store().clone();

    let claims = join_all((0..12).map(|_| {
        let store = store.clone();
        let (filter, patch) = (filter.clone(), patch.clone());
        tokio::spawn(async move { store.claim_next(Collection::Uploads, &filter, &patch).await })
    }))
    .await;

    let ids: Vec<String> = claims
        .into_iter()
        .filter_map(|joined| joined.unwrap().unwrap())
        .map(|doc| doc["id"].as_str().unwrap().to_string())
        .collect();
    let unique: HashSet<&String> = ids.iter().collect();

    assert_eq!(ids.len(), 5);
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn test_request_spawning_waits_for_descriptions() {
    let h = Harness::new();
    let request_id = h.submit(&[("storefront.png", "image/png"), ("baker.mp4", "video/mp4")]).await;
    let spawn = h.runner(Arc::new(SpawnRequestStage::new(h.ctx.clone())));

    assert_eq!(spawn.run_once().await.unwrap(), 0);
    assert!(h.videos_of(&request_id).await.is_empty());
    let request: VideoRequest = h.repo.require(request_id.as_str()).await.unwrap();
    assert_eq!(request.spawning_attempts, 0);

    assert_eq!(h.drain(Arc::new(DescribeStage::new(h.ctx.clone()))).await, 2);
    assert_eq!(spawn.run_once().await.unwrap(), 1);
    assert_eq!(h.videos_of(&request_id).await.len(), 1);
}

#[tokio::test]
async fn test_unready_jobs_do_not_block_scripting() {
    let h = Harness::new();

    // Older jobs whose request never produced any assets.
    let orphan = VideoRequest::new("en", "A closed shop", "plain");
    let mut stuck = Vec::new();
    for i in 0..3 {
        let job = VideoJob::spawn(&orphan, FormatSpec::new(AspectRatio::Portrait, 30), &i.to_string());
        h.repo.insert(&job).await.unwrap();
        stuck.push(job.id.to_string());
    }

    let request_id = h.submit(&[("storefront.png", "image/png")]).await;
    let ctx = h.ctx.clone();
    h.drain(Arc::new(DescribeStage::new(ctx.clone()))).await;
    h.drain(Arc::new(ConvertStage::new(ctx.clone()))).await;
    h.drain(Arc::new(SpawnRequestStage::new(ctx.clone()))).await;

    let script = h.runner(Arc::new(ScriptStage::new(ctx.clone())));
    assert_eq!(script.run_once().await.unwrap(), 1);

    let ready = h.videos_of(&request_id).await;
    assert_eq!(ready[0].status, VideoJobStatus::ScriptGenerationComplete);
    for id in &stuck {
        let job: VideoJob = h.repo.require(id).await.unwrap();
        assert_eq!(job.status, VideoJobStatus::Requested);
        assert_eq!(job.script_generation_attempts, 0);
    }
    assert_eq!(script.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_conversions_do_not_block_format_spawning() {
    let h = Harness::new();

    for i in 0..3 {
        let filename = format!("old{}.png", i);
        let stalled = h.submit(&[(filename.as_str(), "image/png")]).await;
        let jobs: Vec<AspectRatioConversionJob> = h
            .repo
            .find(&Filter::eq("request_id", stalled.as_str()), None)
            .await
            .unwrap();
        let _: AspectRatioConversionJob = h
            .repo
            .update(
                jobs[0].id.as_str(),
                &Patch::new().set("status", ConversionStatus::ConversionFailed.as_str()),
            )
            .await
            .unwrap();
    }

    let request_id = h.submit(&[("storefront.png", "image/png")]).await;
    let ctx = h.ctx.clone();
    h.drain(Arc::new(DescribeStage::new(ctx.clone()))).await;
    assert_eq!(h.drain(Arc::new(ConvertStage::new(ctx.clone()))).await, 1);

    let spawn = h.runner(Arc::new(SpawnFormatStage::new(ctx.clone())));
    assert_eq!(spawn.run_once().await.unwrap(), 1);

    let videos: Vec<VideoJob> = h.repo.find(&Filter::all(), None).await.unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].request_id, request_id);
    assert!(videos[0].format_id.is_some());
}
