//! Snapshot source + file index store, driven through the registry.

use std::sync::Arc;

use content_migration::{
    FileIndexStore, IndexStore, JobRegistry, JobState, MigrationClients, MigrationConfig, MigrationParams, NodeKind,
    SnapshotRepository, TreeSnapshot,
};

const TREE: &str = r#"{
    "categories": [
        { "key": 5, "name": "News", "children": [6], "contents": [10, 11] },
        { "key": 6, "name": "Archive", "children": [5], "contents": [11] }
    ],
    "contents": [
        { "key": 10, "name": "Launch", "current_version": 100, "versions": [100, 101],
          "binaries": [{ "key": 1000, "name": "logo.png" }] },
        { "key": 11, "name": "Recap", "current_version": 110, "versions": [110] }
    ],
    "versions": [
        { "key": 100, "content_key": 10 },
        { "key": 101, "content_key": 10 },
        { "key": 110, "content_key": 11 }
    ]
}"#;

fn registry(root: &std::path::Path) -> (JobRegistry, Arc<FileIndexStore>) {
    let repository = Arc::new(SnapshotRepository::new(TreeSnapshot::from_json(TREE).unwrap()));
    let store = Arc::new(FileIndexStore::new(root));
    let clients = MigrationClients::new(repository.clone(), repository, store.clone());
    (JobRegistry::new(Arc::new(clients), MigrationConfig::default()), store)
}

#[tokio::test]
async fn migrates_cyclic_tree_to_disk_and_resumes_from_a_new_process() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, store) = registry(dir.path());

    let job = registry
        .create_or_get(MigrationParams::category(5, true, true, true), false)
        .await
        .unwrap();
    let job_id = job.job_id();
    job.run();
    assert_eq!(job.wait().await.unwrap(), JobState::Finished);

    // 5 and 6 reference each other; shared content 11 counts once
    let summary = job.summary().status;
    assert_eq!(summary.total_count.categories, 2);
    assert_eq!(summary.total_count.contents, 2);
    assert_eq!(summary.total_count.versions, 1);
    assert_eq!(summary.total_count.binaries, 1);
    assert_eq!(summary.remaining_count.total(), 0);

    for (kind, key) in [
        (NodeKind::Category, 5),
        (NodeKind::Category, 6),
        (NodeKind::Content, 10),
        (NodeKind::Content, 11),
        (NodeKind::Version, 101),
        (NodeKind::Binary, 1000),
    ] {
        assert!(store.document_path(kind, key).exists(), "{kind} {key} not on disk");
    }
    assert!(!store.document_path(NodeKind::Version, 100).exists());

    assert_eq!(registry.cleanup().await, vec![job_id]);
    assert!(registry.status(job_id).await.is_none());

    // A fresh registry over the same directory finds the record
    let (restarted, _) = self::registry(dir.path());
    let resumed = restarted.create_or_get_by_job_id(job_id).await.unwrap();
    let persisted = store.load_job_status(job_id).await.unwrap().unwrap();
    assert_eq!(resumed.status().snapshot().migrated, persisted.migrated);
    assert_eq!(resumed.summary().status.log.len(), persisted.log.len());
}
