//! Firestore backend integration tests.

use std::sync::Arc;

use reel_models::{AspectRatio, FormatSpec, Scene, SceneType, VideoJob, VideoRequest};
use reel_store::{Filter, FirestoreStore, Patch, Repository, Store};

async fn repository() -> Repository {
    dotenvy::dotenv().ok();
    let store = FirestoreStore::from_env()
        .await
        .expect("Failed to create Firestore store");
    Repository::new(Arc::new(store))
}

#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_insert_get_update() {
    let repo = repository().await;
    let request = VideoRequest::new("en", "Integration topic", "plain");
    let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 15), "it");

    repo.insert(&job).await.expect("insert");
    let dup = repo.insert(&job).await.unwrap_err();
    assert!(dup.is_already_exists());

    let updated: VideoJob = repo
        .update(
            job.id.as_str(),
            &Patch::new()
                .set("status", "script_generation_started")
                .inc("script_generation_attempts", 1),
        )
        .await
        .expect("update");
    assert_eq!(updated.script_generation_attempts, 1);

    repo.delete_where::<VideoJob>(&Filter::eq("id", job.id.as_str()))
        .await
        .expect("cleanup");
}

#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_concurrent_claims_are_exclusive() {
    let repo = repository().await;
    let request = VideoRequest::new("en", "Claim race", "plain");
    let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 15), "race");
    let scene = Scene::new(&job, SceneType::Body, "race", vec![]);
    repo.insert(&scene).await.expect("insert scene");

    let filter = Filter::eq("video_id", job.id.as_str()).and(Filter::eq("status", "generated"));
    let patch = Patch::new().set("status", "narration_started");

    let claims = futures::future::join_all((0..4).map(|_| {
        let store = Arc::clone(repo.store());
        let filter = filter.clone();
        let patch = patch.clone();
        async move {
            store
                .claim_next(reel_models::Collection::Scenes, &filter, &patch)
                .await
                .expect("claim")
        }
    }))
    .await;

    assert_eq!(claims.iter().filter(|c| c.is_some()).count(), 1);

    repo.delete_where::<Scene>(&Filter::eq("video_id", job.id.as_str()))
        .await
        .expect("cleanup");
}
