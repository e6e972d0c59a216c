//! Shared handles passed down to every stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_models::{AspectRatio, RequestId, SceneId, VideoJobId};
use reel_store::Repository;

use crate::config::WorkerConfig;
use crate::services::{AiService, MediaService};

/// Layout of generated files under the media root.
#[derive(Debug, Clone)]
pub struct MediaPaths {
    root: PathBuf,
}

impl MediaPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{request}/assets/{ratio}/{filename}`
    pub fn asset(&self, request_id: &RequestId, ratio: AspectRatio, filename: &str) -> PathBuf {
        self.root
            .join(request_id.as_str())
            .join("assets")
            .join(ratio.as_str())
            .join(filename)
    }

    fn ratio_dir(&self, request_id: &RequestId, ratio: AspectRatio) -> PathBuf {
        self.root.join(request_id.as_str()).join(ratio.as_str())
    }

    pub fn narration(&self, request_id: &RequestId, ratio: AspectRatio, scene_id: &SceneId) -> PathBuf {
        self.ratio_dir(request_id, ratio)
            .join("scene_narrations")
            .join(format!("scene_{}.mp3", scene_id))
    }

    pub fn scene_video(&self, request_id: &RequestId, ratio: AspectRatio, scene_id: &SceneId) -> PathBuf {
        self.ratio_dir(request_id, ratio)
            .join("scene_videos")
            .join(format!("scene_{}.mp4", scene_id))
    }

    pub fn final_cut(&self, request_id: &RequestId, ratio: AspectRatio, video_id: &VideoJobId) -> PathBuf {
        self.ratio_dir(request_id, ratio)
            .join("final")
            .join(format!("{}.mp4", video_id))
    }
}

/// Store handle, collaborators and configuration for one worker process.
#[derive(Clone)]
pub struct WorkerContext {
    pub repo: Repository,
    pub media: Arc<dyn MediaService>,
    pub ai: Arc<dyn AiService>,
    pub config: WorkerConfig,
    pub paths: MediaPaths,
}

impl WorkerContext {
    pub fn new(
        repo: Repository,
        media: Arc<dyn MediaService>,
        ai: Arc<dyn AiService>,
        config: WorkerConfig,
    ) -> Self {
        let paths = MediaPaths::new(config.media_root.clone());
        Self {
            repo,
            media,
            ai,
            config,
            paths,
        }
    }
}

/// Stored paths are plain strings.
pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = MediaPaths::new("media");
        let rid = RequestId::from_string("r1");
        let sid = SceneId::from_string("s1");
        let vid = VideoJobId::from_string("r1-0");

        assert_eq!(
            paths.asset(&rid, AspectRatio::Portrait, "beach-video-9x16.mp4"),
            PathBuf::from("media/r1/assets/9x16/beach-video-9x16.mp4")
        );
        assert_eq!(
            paths.narration(&rid, AspectRatio::Square, &sid),
            PathBuf::from("media/r1/1x1/scene_narrations/scene_s1.mp3")
        );
        assert_eq!(
            paths.scene_video(&rid, AspectRatio::Landscape, &sid),
            PathBuf::from("media/r1/16x9/scene_videos/scene_s1.mp4")
        );
        assert_eq!(
            paths.final_cut(&rid, AspectRatio::Portrait, &vid),
            PathBuf::from("media/r1/9x16/final/r1-0.mp4")
        );
    }
}
