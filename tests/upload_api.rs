//! Upload API Tests
//!
//! Integration tests for multipart intake through upload rules.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;

use stowage::config::UploadsConfig;
use stowage::web::{accept_multipart, ApiError, UploadResponse};
use stowage::{
    presets, Database, FileRemover, FileRepository, StorageParams, StoreRegistrar, UploadRule,
};

#[derive(Clone)]
struct AppState {
    db: Database,
    avatar: Arc<UploadRule>,
    gallery: Arc<UploadRule>,
}

async fn upload_avatar(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<UploadResponse>>, ApiError> {
    let mut registrar = StoreRegistrar::new(&state.db);
    let files = accept_multipart(&state.avatar, multipart, &mut registrar).await?;
    Ok(Json(files))
}

async fn upload_gallery(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<UploadResponse>>, ApiError> {
    let mut registrar = StoreRegistrar::new(&state.db);
    let files = accept_multipart(&state.gallery, multipart, &mut registrar).await?;
    Ok(Json(files))
}

/// Create a test server with an in-memory database and uploads under `root`.
async fn create_test_server(root: &Path) -> (TestServer, Database) {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");

    let limits = UploadsConfig {
        root: root.to_string_lossy().into_owned(),
        max_file_size: 16,
        max_files: 2,
    };

    let avatar = UploadRule::builder("avatar")
        .required(true)
        .mimetypes(vec!["image/png".to_string()])
        .max_file_size(limits.max_file_size)
        .storage(StorageParams::new().with_directory("avatars"))
        .build(&limits.root)
        .expect("Failed to build avatar rule");

    let gallery = presets::jpg_png("photos")
        .limits(&limits)
        .storage(StorageParams::new().with_directory("gallery").with_randoms(4))
        .build(&limits.root)
        .expect("Failed to build gallery rule");

    let state = AppState {
        db: db.clone(),
        avatar: Arc::new(avatar),
        gallery: Arc::new(gallery),
    };

    let router = Router::new()
        .route("/avatar", post(upload_avatar))
        .route("/gallery", post(upload_gallery))
        .with_state(state);

    let server = TestServer::new(router).expect("Failed to create test server");
    (server, db)
}

fn png_part(bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name("picture.png")
        .mime_type("image/png")
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_required_field_missing_is_invalid_field() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new().add_text("note", "no file here");
    let response = server.post("/avatar").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["status"], "invalid_field");
    assert!(body["error"]["details"]["avatar"].is_array());
}

#[tokio::test]
async fn test_upload_png_avatar() {
    let temp_dir = TempDir::new().unwrap();
    let (server, db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new().add_part("avatar", png_part(b"\x89PNG data"));
    let response = server.post("/avatar").multipart(form).await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["field"], "avatar");
    assert_eq!(body[0]["original_name"], "picture.png");
    assert_eq!(body[0]["mimetype"], "image/png");
    assert_eq!(body[0]["size"], 9);

    let name = body[0]["name"].as_str().unwrap();
    assert!(name.starts_with("avatar_"));
    assert!(name.ends_with(".png"));

    let path = body[0]["path"].as_str().unwrap();
    assert!(Path::new(path).starts_with(temp_dir.path().join("avatars")));
    assert_eq!(std::fs::read(path).unwrap(), b"\x89PNG data");

    let record = FileRepository::new(db.pool())
        .get_active_by_path(path)
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.size, 9);
}

#[tokio::test]
async fn test_wrong_mimetype_rejected_before_write() {
    let temp_dir = TempDir::new().unwrap();
    let (server, db) = create_test_server(temp_dir.path()).await;

    let part = Part::bytes(b"GIF89a".to_vec())
        .file_name("anim.gif")
        .mime_type("image/gif");
    let form = MultipartForm::new().add_part("avatar", part);
    let response = server.post("/avatar").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["status"], "invalid_field");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("image/gif"));

    assert_eq!(files_in(&temp_dir.path().join("avatars")), 0);
    let records = FileRepository::new(db.pool()).list_active().await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_oversized_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new().add_part("avatar", png_part(&[0u8; 64]));
    let response = server.post("/avatar").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("too large"));
    assert_eq!(files_in(&temp_dir.path().join("avatars")), 0);
}

#[tokio::test]
async fn test_too_many_files_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new()
        .add_part("avatar", png_part(b"one"))
        .add_part("avatar", png_part(b"two"));
    let response = server.post("/avatar").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("too many files"));
    assert_eq!(files_in(&temp_dir.path().join("avatars")), 0);
}

#[tokio::test]
async fn test_gallery_accepts_jpeg_and_png() {
    let temp_dir = TempDir::new().unwrap();
    let (server, db) = create_test_server(temp_dir.path()).await;

    let jpeg = Part::bytes(b"\xff\xd8jpeg".to_vec())
        .file_name("a.jpg")
        .mime_type("image/jpeg");
    let form = MultipartForm::new()
        .add_part("photos", jpeg)
        .add_part("photos", png_part(b"png"))
        .add_text("caption", "ignored");
    let response = server.post("/gallery").multipart(form).await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body.len(), 2);
    assert_eq!(files_in(&temp_dir.path().join("gallery")), 2);

    let records = FileRepository::new(db.pool()).list_active().await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_optional_field_without_files() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new().add_text("caption", "nothing attached");
    let response = server.post("/gallery").multipart(form).await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_uploaded_files_can_be_removed() {
    let temp_dir = TempDir::new().unwrap();
    let (server, db) = create_test_server(temp_dir.path()).await;

    let form = MultipartForm::new().add_part("avatar", png_part(b"bye"));
    let response = server.post("/avatar").multipart(form).await;
    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    let path = body[0]["path"].as_str().unwrap().to_string();

    let remover = FileRemover::new(db.clone());
    let removed = remover.remove(path.as_str()).await.unwrap().unwrap();

    assert!(removed.deleted);
    assert!(!Path::new(&path).exists());
}
