//! A video's scenes as an id-keyed arena with prev/next links.
//!
//! Invariant for a non-empty list: exactly one head (no `prev_scene_id`),
//! exactly one tail (no `next_scene_id`), symmetric links, no cycles, and a
//! head-to-tail walk visits every node once.

use std::collections::{HashMap, HashSet};

use crate::error::{ModelError, ModelResult};
use crate::ids::SceneId;
use crate::scene::Scene;

#[derive(Debug, Clone, Default)]
pub struct SceneList {
    nodes: HashMap<SceneId, Scene>,
    head: Option<SceneId>,
}

impl SceneList {
    /// Wire freshly generated scenes into one chain in the given order,
    /// overwriting any existing links.
    pub fn link(mut scenes: Vec<Scene>) -> Self {
        let ids: Vec<SceneId> = scenes.iter().map(|s| s.id.clone()).collect();
        for (i, scene) in scenes.iter_mut().enumerate() {
            scene.prev_scene_id = if i > 0 { Some(ids[i - 1].clone()) } else { None };
            scene.next_scene_id = ids.get(i + 1).cloned();
        }

        let head = ids.first().cloned();
        let nodes = scenes.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { nodes, head }
    }

    /// Load persisted scenes, checking the list invariant.
    pub fn from_scenes(scenes: Vec<Scene>) -> ModelResult<Self> {
        let mut nodes = HashMap::with_capacity(scenes.len());
        for scene in scenes {
            let id = scene.id.clone();
            if nodes.insert(id.clone(), scene).is_some() {
                return Err(ModelError::broken_list(format!("duplicate scene id {}", id)));
            }
        }

        let heads: Vec<&SceneId> = nodes
            .values()
            .filter(|s| s.prev_scene_id.is_none())
            .map(|s| &s.id)
            .collect();

        let head = match (nodes.is_empty(), heads.len()) {
            (true, _) => None,
            (false, 1) => Some(heads[0].clone()),
            (false, n) => {
                return Err(ModelError::broken_list(format!(
                    "expected exactly one head, found {}",
                    n
                )))
            }
        };

        let list = Self { nodes, head };
        list.validate()?;
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &SceneId) -> Option<&Scene> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &SceneId) -> Option<&mut Scene> {
        self.nodes.get_mut(id)
    }

    pub fn head(&self) -> Option<&Scene> {
        self.head.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn tail(&self) -> Option<&Scene> {
        self.nodes.values().find(|s| s.next_scene_id.is_none())
    }

    /// Scenes in list order, head to tail.
    pub fn ordered(&self) -> Vec<&Scene> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head.as_ref();
        while let Some(id) = cursor {
            match self.nodes.get(id) {
                Some(scene) => {
                    out.push(scene);
                    cursor = scene.next_scene_id.as_ref();
                }
                None => break,
            }
            if out.len() > self.nodes.len() {
                break;
            }
        }
        out
    }

    /// Ids in list order.
    pub fn ids(&self) -> Vec<SceneId> {
        self.ordered().into_iter().map(|s| s.id.clone()).collect()
    }

    /// Consume the list, yielding scenes head to tail.
    pub fn into_ordered(mut self) -> Vec<Scene> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id))
            .collect()
    }

    /// Insert `node` immediately after `anchor`.
    ///
    /// The anchor's old successor becomes the node's successor. Returns the
    /// ids whose links changed, in the order they should be persisted.
    pub fn splice_after(&mut self, anchor: &SceneId, mut node: Scene) -> ModelResult<Vec<SceneId>> {
        if self.nodes.contains_key(&node.id) {
            return Err(ModelError::broken_list(format!(
                "scene {} is already in the list",
                node.id
            )));
        }

        let old_next = {
            let anchor_scene = self
                .nodes
                .get_mut(anchor)
                .ok_or_else(|| ModelError::SceneNotFound(anchor.to_string()))?;
            let old_next = anchor_scene.next_scene_id.take();
            anchor_scene.next_scene_id = Some(node.id.clone());
            old_next
        };

        node.prev_scene_id = Some(anchor.clone());
        node.next_scene_id = old_next.clone();
        let node_id = node.id.clone();

        let mut changed = vec![node_id.clone(), anchor.clone()];
        if let Some(next_id) = &old_next {
            if let Some(next) = self.nodes.get_mut(next_id) {
                next.prev_scene_id = Some(node_id.clone());
                changed.push(next_id.clone());
            }
        }

        self.nodes.insert(node_id, node);
        Ok(changed)
    }

    /// Check the single-head/single-tail chain invariant.
    pub fn validate(&self) -> ModelResult<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }

        let video_ids: HashSet<_> = self.nodes.values().map(|s| &s.video_id).collect();
        if video_ids.len() != 1 {
            return Err(ModelError::broken_list("scenes belong to more than one video"));
        }

        let heads = self.nodes.values().filter(|s| s.prev_scene_id.is_none()).count();
        let tails = self.nodes.values().filter(|s| s.next_scene_id.is_none()).count();
        if heads != 1 || tails != 1 {
            return Err(ModelError::broken_list(format!(
                "expected one head and one tail, found {} heads and {} tails",
                heads, tails
            )));
        }

        for scene in self.nodes.values() {
            if let Some(next_id) = &scene.next_scene_id {
                let next = self.nodes.get(next_id).ok_or_else(|| {
                    ModelError::broken_list(format!("{} points at missing next {}", scene.id, next_id))
                })?;
                if next.prev_scene_id.as_ref() != Some(&scene.id) {
                    return Err(ModelError::broken_list(format!(
                        "asymmetric link between {} and {}",
                        scene.id, next_id
                    )));
                }
            }
            if let Some(prev_id) = &scene.prev_scene_id {
                if !self.nodes.contains_key(prev_id) {
                    return Err(ModelError::broken_list(format!(
                        "{} points at missing prev {}",
                        scene.id, prev_id
                    )));
                }
            }
        }

        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut cursor = self.head.clone();
        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                return Err(ModelError::broken_list(format!("cycle at scene {}", id)));
            }
            cursor = self.nodes.get(&id).and_then(|s| s.next_scene_id.clone());
        }

        if visited.len() != self.nodes.len() {
            return Err(ModelError::broken_list(format!(
                "walk visited {} of {} scenes",
                visited.len(),
                self.nodes.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect_ratio::AspectRatio;
    use crate::request::{FormatSpec, VideoRequest};
    use crate::scene::SceneType;
    use crate::video::VideoJob;

    fn video() -> VideoJob {
        let request = VideoRequest::new("en", "topic", "promo");
        VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 30), "0")
    }

    fn scenes(video: &VideoJob, n: usize) -> Vec<Scene> {
        (0..n)
            .map(|i| Scene::new(video, SceneType::Body, format!("scene {}", i), vec![]))
            .collect()
    }

    #[test]
    fn test_link_builds_single_chain() {
        let video = video();
        let input = scenes(&video, 4);
        let expected: Vec<SceneId> = input.iter().map(|s| s.id.clone()).collect();

        let list = SceneList::link(input);
        list.validate().unwrap();

        assert_eq!(list.ids(), expected);
        assert!(list.head().unwrap().prev_scene_id.is_none());
        assert!(list.tail().unwrap().next_scene_id.is_none());
    }

    #[test]
    fn test_from_scenes_round_trips_through_persistence_order() {
        let video = video();
        let list = SceneList::link(scenes(&video, 3));
        let expected = list.ids();

        let mut persisted: Vec<Scene> = list.into_ordered();
        persisted.reverse();

        let reloaded = SceneList::from_scenes(persisted).unwrap();
        assert_eq!(reloaded.ids(), expected);
    }

    #[test]
    fn test_splice_after_middle() {
        let video = video();
        let list_scenes = scenes(&video, 3);
        let s = list_scenes[1].id.clone();
        let x = list_scenes[2].id.clone();
        let mut list = SceneList::link(list_scenes);

        let h = Scene::speech_split(list.get(&s).unwrap(), "clip.mp4", "hello there", Some(4.0));
        let h_id = h.id.clone();
        let changed = list.splice_after(&s, h).unwrap();

        assert_eq!(changed, vec![h_id.clone(), s.clone(), x.clone()]);
        assert_eq!(list.get(&s).unwrap().next_scene_id.as_ref(), Some(&h_id));
        assert_eq!(list.get(&h_id).unwrap().prev_scene_id.as_ref(), Some(&s));
        assert_eq!(list.get(&h_id).unwrap().next_scene_id.as_ref(), Some(&x));
        assert_eq!(list.get(&x).unwrap().prev_scene_id.as_ref(), Some(&h_id));
        list.validate().unwrap();
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_splice_after_tail_moves_tail() {
        let video = video();
        let list_scenes = scenes(&video, 2);
        let tail = list_scenes[1].id.clone();
        let mut list = SceneList::link(list_scenes);

        let h = Scene::speech_split(list.get(&tail).unwrap(), "clip.mp4", "hi", None);
        let h_id = h.id.clone();
        list.splice_after(&tail, h).unwrap();

        assert_eq!(list.tail().unwrap().id, h_id);
        list.validate().unwrap();
    }

    #[test]
    fn test_detects_two_heads() {
        let video = video();
        let mut broken = SceneList::link(scenes(&video, 3)).into_ordered();
        broken[2].prev_scene_id = None;
        assert!(matches!(
            SceneList::from_scenes(broken),
            Err(ModelError::BrokenSceneList(_))
        ));
    }

    #[test]
    fn test_detects_cycle() {
        let video = video();
        let mut broken = SceneList::link(scenes(&video, 3)).into_ordered();
        // 0 -> 1 -> 2 -> 1 with a single head and a fake tail elsewhere
        let one = broken[1].id.clone();
        broken[2].next_scene_id = Some(one);
        assert!(SceneList::from_scenes(broken).is_err());
    }

    #[test]
    fn test_splice_unknown_anchor() {
        let video = video();
        let mut list = SceneList::link(scenes(&video, 1));
        let orphan = Scene::new(&video, SceneType::HasSpeech, "x", vec![]);
        assert!(matches!(
            list.splice_after(&SceneId::from_string("missing"), orphan),
            Err(ModelError::SceneNotFound(_))
        ));
    }
}
