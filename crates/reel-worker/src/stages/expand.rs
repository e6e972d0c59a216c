//! Scene expansion: split speaking video assets into their own scenes.
//!
//! A body scene that references a video asset with a usable transcript is
//! demoted to a title card and followed by one `has_speech` scene per such
//! asset, carrying the asset's own speech. Demotion clears the trigger, so
//! expanding an already expanded list is a no-op.

use std::collections::HashMap;

use reel_models::{Asset, ModelResult, Scene, SceneId, SceneList, SceneType};
use reel_store::{Patch, Repository};

use crate::error::WorkerResult;

/// Ids touched by one expansion, split by how they must be persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// New `has_speech` nodes, in list order
    pub inserted: Vec<SceneId>,
    /// Existing nodes whose type, assets or links changed
    pub updated: Vec<SceneId>,
}

impl Expansion {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty()
    }

    fn touch(&mut self, id: SceneId) {
        if !self.inserted.contains(&id) && !self.updated.contains(&id) {
            self.updated.push(id);
        }
    }
}

/// Splice `has_speech` nodes into `list` in memory.
pub fn expand_scenes(list: &mut SceneList, assets: &[Asset]) -> ModelResult<Expansion> {
    let by_filename: HashMap<&str, &Asset> = assets.iter().map(|a| (a.filename.as_str(), a)).collect();

    let candidates: Vec<SceneId> = list
        .ordered()
        .into_iter()
        .filter(|s| s.scene_type == SceneType::Body && !s.asset_filenames.is_empty())
        .map(|s| s.id.clone())
        .collect();

    let mut expansion = Expansion::default();
    for id in candidates {
        let source = match list.get(&id) {
            Some(scene) => scene.clone(),
            None => continue,
        };

        let speaking: Vec<&Asset> = source
            .asset_filenames
            .iter()
            .filter_map(|name| by_filename.get(name.as_str()).copied())
            .filter(|asset| asset.has_usable_transcript())
            .collect();
        if speaking.is_empty() {
            continue;
        }

        if let Some(scene) = list.get_mut(&id) {
            scene.scene_type = SceneType::Title;
            scene.asset_filenames.clear();
        }
        expansion.touch(id.clone());

        // Each split goes after the previous one so the speech keeps the
        // order the assets were referenced in.
        let mut anchor = id;
        for asset in speaking {
            let node = Scene::speech_split(
                &source,
                asset.filename.as_str(),
                asset.transcript.trim(),
                asset.metadata.duration(),
            );
            let node_id = node.id.clone();
            let changed = list.splice_after(&anchor, node)?;

            expansion.inserted.push(node_id.clone());
            for changed_id in changed.into_iter().filter(|c| *c != node_id) {
                expansion.touch(changed_id);
            }
            anchor = node_id;
        }
    }

    Ok(expansion)
}

/// Write an expansion back: new nodes first, then relinked existing nodes.
pub async fn persist_expansion(repo: &Repository, list: &SceneList, expansion: &Expansion) -> WorkerResult<()> {
    for id in &expansion.inserted {
        if let Some(scene) = list.get(id) {
            repo.insert(scene).await?;
        }
    }

    for id in &expansion.updated {
        if let Some(scene) = list.get(id) {
            let patch = Patch::new()
                .set("scene_type", scene.scene_type.as_str())
                .set_json("asset_filenames", &scene.asset_filenames)
                .set_json("prev_scene_id", &scene.prev_scene_id)
                .set_json("next_scene_id", &scene.next_scene_id);
            let _: Scene = repo.update(id.as_str(), &patch).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{
        AspectRatio, FormatSpec, MediaMetadata, RequestId, SceneStatus, Upload, VideoJob,
        VideoMetadata, VideoRequest,
    };

    fn video() -> VideoJob {
        let request = VideoRequest::new("en", "bakery", "warm");
        VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 30), "0")
    }

    fn asset(filename: &str, transcript: &str, duration: f64) -> Asset {
        let mut upload = Upload::new(
            RequestId::from_string("req-1"),
            filename,
            "video/mp4",
            format!("media/req-1/{}", filename),
        )
        .unwrap();
        upload.transcript = transcript.to_string();
        Asset::from_upload(
            &upload,
            AspectRatio::Portrait,
            format!("media/req-1/assets/9x16/{}", filename),
            MediaMetadata::Video(VideoMetadata {
                duration: Some(duration),
                ..Default::default()
            }),
            chrono::Utc::now(),
        )
    }

    fn image_asset(filename: &str) -> Asset {
        let upload = Upload::new(
            RequestId::from_string("req-1"),
            filename,
            "image/png",
            format!("media/req-1/{}", filename),
        )
        .unwrap();
        Asset::from_upload(
            &upload,
            AspectRatio::Portrait,
            format!("media/req-1/assets/9x16/{}", filename),
            MediaMetadata::for_kind(upload.kind()),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_split_inserts_after_body_scene() {
        let video = video();
        let speaking = asset("owner.mp4", "We bake every morning.", 6.5);

        let title = Scene::new(&video, SceneType::Title, "Bakery", vec![]);
        let body = Scene::new(&video, SceneType::Body, "Meet the owner", vec![speaking.filename.clone()]);
        let outro = Scene::new(&video, SceneType::Outro, "Bye", vec![]);
        let (body_id, outro_id) = (body.id.clone(), outro.id.clone());

        let mut list = SceneList::link(vec![title, body, outro]);
        let expansion = expand_scenes(&mut list, &[speaking]).unwrap();
        list.validate().unwrap();

        assert_eq!(expansion.inserted.len(), 1);
        let split_id = expansion.inserted[0].clone();

        let source = list.get(&body_id).unwrap();
        assert_eq!(source.scene_type, SceneType::Title);
        assert!(source.asset_filenames.is_empty());
        assert_eq!(source.next_scene_id.as_ref(), Some(&split_id));

        let split = list.get(&split_id).unwrap();
        assert_eq!(split.scene_type, SceneType::HasSpeech);
        assert_eq!(split.prev_scene_id.as_ref(), Some(&body_id));
        assert_eq!(split.next_scene_id.as_ref(), Some(&outro_id));
        assert_eq!(split.narration, "We bake every morning.");
        assert_eq!(split.duration, Some(6.5));
        assert_eq!(split.status, SceneStatus::NarrationComplete);

        assert_eq!(list.get(&outro_id).unwrap().prev_scene_id.as_ref(), Some(&split_id));
        assert!(expansion.updated.contains(&body_id));
        assert!(expansion.updated.contains(&outro_id));
    }

    #[test]
    fn test_multiple_speaking_assets_keep_reference_order() {
        let video = video();
        let first = asset("first.mp4", "One.", 2.0);
        let second = asset("second.mp4", "Two.", 3.0);

        let body = Scene::new(
            &video,
            SceneType::Body,
            "Two voices",
            vec![first.filename.clone(), second.filename.clone()],
        );
        let body_id = body.id.clone();
        let mut list = SceneList::link(vec![body]);

        let expansion = expand_scenes(&mut list, &[second, first]).unwrap();
        list.validate().unwrap();

        let ordered: Vec<&str> = list.ordered().iter().map(|s| s.narration.as_str()).collect();
        assert_eq!(ordered, vec!["Two voices", "One.", "Two."]);
        assert_eq!(list.head().unwrap().id, body_id);
        assert_eq!(expansion.inserted.len(), 2);
    }

    #[test]
    fn test_no_transcript_leaves_list_alone() {
        let video = video();
        let silent = asset("broll.mp4", "   ", 4.0);
        let photo = image_asset("shop.png");

        let body = Scene::new(
            &video,
            SceneType::Body,
            "Inside the shop",
            vec![silent.filename.clone(), photo.filename.clone()],
        );
        let mut list = SceneList::link(vec![body]);

        let expansion = expand_scenes(&mut list, &[silent, photo]).unwrap();
        assert!(expansion.is_empty());
        assert_eq!(list.len(), 1);
        assert_eq!(list.head().unwrap().scene_type, SceneType::Body);
    }

    #[test]
    fn test_expanding_twice_is_a_no_op() {
        let video = video();
        let speaking = asset("owner.mp4", "Hello there.", 3.0);
        let body = Scene::new(&video, SceneType::Body, "Meet", vec![speaking.filename.clone()]);
        let mut list = SceneList::link(vec![body]);

        let assets = vec![speaking];
        expand_scenes(&mut list, &assets).unwrap();
        let again = expand_scenes(&mut list, &assets).unwrap();

        assert!(again.is_empty());
        assert_eq!(list.len(), 2);
    }
}
