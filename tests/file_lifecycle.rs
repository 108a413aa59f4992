//! File Lifecycle Tests
//!
//! Integration tests for saving, removing and archiving stored files.

use std::fs::File;
use std::path::Path;

use tempfile::TempDir;

use stowage::config::StaticDirConfig;
use stowage::file::remove_request_uploads;
use stowage::{
    zip_directory, Database, FileRemover, FileRepository, FileSaver, IncomingFile,
    RequestUploads, SaveRequest, SaveStatus, SkipReason, StaticDirectories, StowageError,
    UploadDescriptor, UploadRule,
};

struct TestContext {
    temp_dir: TempDir,
    db: Database,
    saver: FileSaver,
    remover: FileRemover,
}

async fn create_test_context() -> TestContext {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    let dirs = StaticDirectories::new(
        temp_dir.path().join("static"),
        vec![StaticDirConfig::new("public"), StaticDirConfig::new("private")],
    );
    let saver = FileSaver::new(db.clone(), dirs);
    let remover = FileRemover::new(db.clone());
    TestContext {
        temp_dir,
        db,
        saver,
        remover,
    }
}

#[tokio::test]
async fn test_save_then_collide_then_overwrite() {
    let ctx = create_test_context().await;

    let request = SaveRequest::new(vec![UploadDescriptor::new("hello").with_name("a.txt")])
        .with_dir("t");
    let first = ctx.saver.save(request.clone()).await.unwrap();
    assert_eq!(first[0].status, SaveStatus::Saved);
    let path = first[0].path.clone();
    assert!(path.ends_with("static/public/t/a.txt"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

    let mut again = request.clone();
    again.files = vec![UploadDescriptor::new("changed").with_name("a.txt")];
    let second = ctx.saver.save(again.clone()).await.unwrap();
    assert_eq!(second[0].status, SaveStatus::Skipped(SkipReason::PathTaken));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

    let third = ctx.saver.save(again.overwrite(true)).await.unwrap();
    assert_eq!(third[0].status, SaveStatus::Saved);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "changed");

    let repo = FileRepository::new(ctx.db.pool());
    let path_str = path.to_string_lossy();
    assert_eq!(repo.count_by_path(&path_str).await.unwrap(), 1);
    let record = repo.get_active_by_path(&path_str).await.unwrap().unwrap();
    assert_eq!(record.size, 7);
}

#[tokio::test]
async fn test_unknown_static_dir_fails_whole_call() {
    let ctx = create_test_context().await;

    let request = SaveRequest::new(vec![
        UploadDescriptor::new("ok"),
        UploadDescriptor::new("nope").with_static_dir("secret"),
    ]);
    let err = ctx.saver.save(request).await.unwrap_err();

    assert!(matches!(err, StowageError::UnknownStaticDir { ref key, .. } if key == "secret"));
    assert!(!ctx.temp_dir.path().join("static/public").exists());
}

#[tokio::test]
async fn test_remove_never_saved_path() {
    let ctx = create_test_context().await;

    let removed = ctx
        .remover
        .remove("/nonexistent/never/saved.txt")
        .await
        .unwrap();

    assert!(removed.is_none());
}

#[tokio::test]
async fn test_remove_then_save_same_path_again() {
    let ctx = create_test_context().await;

    let request = SaveRequest::new(vec![UploadDescriptor::new("v1").with_name("doc.txt")])
        .with_static_dir("private");
    let saved = ctx.saver.save(request).await.unwrap();
    let path = saved[0].path.clone();
    let first_id = saved[0].record.as_ref().unwrap().file_id;

    let removed = ctx.remover.remove(first_id).await.unwrap().unwrap();
    assert!(removed.deleted);
    assert!(!path.exists());

    // A second removal finds no active record.
    assert!(ctx.remover.remove(first_id).await.unwrap().is_none());

    let request = SaveRequest::new(vec![UploadDescriptor::new("v2").with_name("doc.txt")])
        .with_static_dir("private");
    let saved = ctx.saver.save(request).await.unwrap();
    assert_eq!(saved[0].status, SaveStatus::Saved);
    let second = saved[0].record.as_ref().unwrap();
    assert_ne!(second.file_id, first_id);
    assert!(!second.deleted);

    let repo = FileRepository::new(ctx.db.pool());
    assert_eq!(repo.count_by_path(&path.to_string_lossy()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_batch_removal_of_request_uploads() {
    let ctx = create_test_context().await;
    let uploads_root = ctx.temp_dir.path().join("uploads");
    let rule = UploadRule::builder("docs")
        .max_files(3)
        .build(&uploads_root)
        .unwrap();
    let mut uploads = RequestUploads::new();

    let stored = rule
        .accept(
            vec![
                IncomingFile::new("text/plain", b"one".to_vec()),
                IncomingFile::new("text/plain", b"two".to_vec()),
            ],
            &mut uploads,
        )
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);

    // Only the first upload has a record; the second is removed from the
    // batch without failing it.
    let saved = ctx
        .saver
        .save(
            SaveRequest::new(vec![
                UploadDescriptor::without_data().with_path(stored[0].path.clone())
            ])
            .with_mimetype("text/plain"),
        )
        .await
        .unwrap();
    assert_eq!(saved[0].status, SaveStatus::Skipped(SkipReason::NoData));

    remove_request_uploads(&ctx.remover, &uploads).await;

    assert!(!stored[0].path.exists());
    assert!(stored[1].path.exists());
    let repo = FileRepository::new(ctx.db.pool());
    assert!(repo.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_saved_directory() {
    let ctx = create_test_context().await;

    let request = SaveRequest::new(vec![
        UploadDescriptor::new("alpha").with_name("a.txt"),
        UploadDescriptor::new("beta")
            .with_dir("export/nested")
            .with_name("b.txt"),
    ])
    .with_dir("export");
    let saved = ctx.saver.save(request).await.unwrap();
    assert!(saved.iter().all(|f| f.saved()));

    let source = ctx.temp_dir.path().join("static/public/export");
    let target = ctx.temp_dir.path().join("export.zip");
    let summary = zip_directory(&source, &target, Some("export")).await.unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.skipped, 0);

    let archive = zip::ZipArchive::new(File::open(&target).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"export/a.txt"));
    assert!(names.contains(&"export/nested/b.txt"));
}

#[tokio::test]
async fn test_archive_missing_source_leaves_no_file() {
    let ctx = create_test_context().await;
    let target = ctx.temp_dir.path().join("missing.zip");

    let err = zip_directory(ctx.temp_dir.path().join("nope"), &target, None)
        .await
        .unwrap_err();

    assert!(matches!(err, StowageError::Archive(_)));
    assert!(!Path::new(&target).exists());
}
