//! Tests for the async boundary around `PoseIndex`.

use std::sync::Arc;

use posemirror::{
    AsyncPoseIndex, Config, MemoryStorage, PoseIndex, PoseMatcher, PoseRecord, PoseVector,
};

fn memory_index() -> Arc<PoseIndex> {
    let config = Config::with_joint_count(2);
    let storage = MemoryStorage::new(&config);
    Arc::new(PoseIndex::with_storage(Box::new(storage), config).unwrap())
}

fn records() -> Vec<PoseRecord> {
    (0..20)
        .map(|i| {
            let x = i as f32 / 20.0;
            PoseRecord::new(format!("img-{}.jpg", i), vec![x, x, x, x], vec![1.0, 1.0])
        })
        .collect()
}

#[tokio::test]
async fn test_query_before_build() {
    let matcher = AsyncPoseIndex::new(memory_index());
    let pose = PoseVector::new(vec![0.0; 4], vec![1.0; 2]);
    let err = matcher.query(pose, 1).await.unwrap_err();
    assert!(err.is_not_built());
}

#[tokio::test]
async fn test_full_lifecycle() {
    let matcher = AsyncPoseIndex::new(memory_index());

    assert_eq!(matcher.submit_gallery(records()).await.unwrap(), 20);
    assert_eq!(matcher.gallery().await.unwrap().len(), 20);

    let built = matcher.build_index().await.unwrap();
    assert_eq!(built.record_count, 20);
    matcher.save_index().await.unwrap();

    let pose = PoseVector::new(vec![0.5; 4], vec![1.0; 2]);
    let results = matcher.query(pose.clone(), 3).await.unwrap();
    assert_eq!(results[0].identifier, "img-10.jpg");
    assert_eq!(results.len(), 3);

    let loaded = matcher.load_index().await.unwrap();
    assert!(loaded.generation > built.generation);
    assert_eq!(matcher.query(pose, 3).await.unwrap(), results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_queries() {
    let index = memory_index();
    index.submit_gallery(records()).unwrap();
    index.build_index().unwrap();

    let matcher: Arc<dyn PoseMatcher> = Arc::new(AsyncPoseIndex::new(index));
    let mut handles = Vec::new();
    for i in 0..16 {
        let matcher = Arc::clone(&matcher);
        handles.push(tokio::spawn(async move {
            let x = (i % 20) as f32 / 20.0;
            let pose = PoseVector::new(vec![x; 4], vec![1.0; 2]);
            let results = matcher.query(pose, 1).await.unwrap();
            assert_eq!(results[0].identifier, format!("img-{}.jpg", i % 20));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}
