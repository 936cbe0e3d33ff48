//! Upload, list and delete.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::io;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use vidcrypt_catalog::NewVideo;
use vidcrypt_core::types::{unix_now, VideoRecord, VideoStatus, VideoSummary};
use vidcrypt_crypto::{encode_file, EncodeSummary, KeyMaterial};
use vidcrypt_events::VideoEvent;

use super::{ApiError, AppState};

#[derive(Serialize)]
pub struct UploadResponse {
    message: &'static str,
    video: VideoSummary,
}

#[derive(Serialize)]
pub struct VideoList {
    videos: Vec<VideoSummary>,
}

#[derive(Serialize)]
pub struct Message {
    message: &'static str,
}

pub async fn list_videos(State(state): State<AppState>) -> Json<VideoList> {
    let catalog = state.catalog.read().await;
    Json(VideoList {
        videos: catalog.list().into_iter().map(|r| r.summary()).collect(),
    })
}

pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            Some(field) if field.name() == Some("video") => break field,
            Some(_) => continue,
            None => return Err(ApiError::BadRequest("No video file provided".into())),
        }
    };

    let submitted = field.file_name().unwrap_or_default().to_string();
    if submitted.is_empty() {
        return Err(ApiError::BadRequest("No selected file".into()));
    }
    let allowed = &state.config.upload.allowed_extensions;
    let Some(ext) = extension(&submitted).filter(|ext| allowed.iter().any(|a| a == ext)) else {
        return Err(ApiError::BadRequest("File type not allowed".into()));
    };
    let original_filename = secure_filename(&submitted, &ext);
    let content_type = content_type_for(&ext).to_string();

    let upload_dir = state.config.storage.upload_dir.clone();
    tokio::fs::create_dir_all(&upload_dir).await?;

    // Spool the plaintext next to the blobs; removed when `spool` drops
    let spool = tempfile::Builder::new()
        .prefix("temp_")
        .suffix(&format!("_{original_filename}"))
        .tempfile_in(&upload_dir)?;
    let mut out = tokio::fs::File::from_std(spool.reopen()?);
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    drop(out);

    let keys = KeyMaterial::generate();
    let stored = keys.encode();

    let (record, filename) = {
        let mut catalog = state.catalog.write().await;
        // The id keeps blob names unique even for same-named uploads in one second
        let filename = blob_filename(unix_now(), catalog.next_id(), &original_filename);
        let record = catalog.insert(NewVideo {
            filename: filename.clone(),
            original_filename: original_filename.clone(),
            encryption_key: stored.key,
            iv: stored.iv,
            content_type,
            file_size: 0,
            blob_len: 0,
            status: VideoStatus::Processing,
        });
        catalog.flush()?;
        (record, filename)
    };
    let id = record.id;
    state
        .events
        .publish(&VideoEvent::new(id, VideoStatus::Processing, "encrypting upload"))
        .await;

    let input = spool.path().to_path_buf();
    let output = upload_dir.join(&filename);
    let encoded = tokio::task::spawn_blocking(move || encode_file(&input, &output, &keys))
        .await
        .map_err(|e| io::Error::other(format!("encode task: {e}")))
        .and_then(|r| r.map_err(io::Error::other));
    drop(spool);

    let summary = match encoded {
        Ok(summary) => summary,
        Err(e) => {
            warn!(video_id = id, file = %filename, "encryption failed: {e}");
            mark_failed(&state, id).await;
            state
                .events
                .publish(&VideoEvent::new(id, VideoStatus::Error, e.to_string()))
                .await;
            state.metrics.upload_finished("error");
            return Err(ApiError::Internal(e.to_string()));
        }
    };

    let record = match commit_ready(&state, record, &summary, &upload_dir).await {
        Ok(record) => record,
        Err(e) => {
            state.metrics.upload_finished("error");
            return Err(e);
        }
    };

    info!(
        video_id = id,
        file = %filename,
        bytes = summary.plaintext_len,
        blob_len = summary.blob_len,
        "video uploaded"
    );
    state
        .events
        .publish(&VideoEvent::new(id, VideoStatus::Ready, "ready for streaming"))
        .await;
    state.metrics.upload_finished("ok");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Video uploaded successfully",
            video: record.summary(),
        }),
    ))
}

/// Best effort: the upload is already failing, so problems here are only logged.
async fn mark_failed(state: &AppState, id: u64) {
    let mut catalog = state.catalog.write().await;
    if let Err(e) = catalog.set_status(id, VideoStatus::Error) {
        warn!(video_id = id, "marking upload failed: {e}");
    }
    if let Err(e) = catalog.flush() {
        warn!(video_id = id, "catalog flush failed: {e:#}");
    }
}

/// Mark an encoded upload ready and persist it.
///
/// If the record was deleted while encoding, the finished blob has no owner
/// and is removed before the error is returned.
async fn commit_ready(
    state: &AppState,
    mut record: VideoRecord,
    summary: &EncodeSummary,
    upload_dir: &std::path::Path,
) -> Result<VideoRecord, ApiError> {
    let id = record.id;
    record.file_size = summary.plaintext_len;
    record.blob_len = summary.blob_len;
    record.status = VideoStatus::Ready;

    let mut catalog = state.catalog.write().await;
    let committed = catalog
        .update(record.clone())
        .map_err(ApiError::from)
        .and_then(|()| catalog.flush().map_err(ApiError::from));
    if let Err(e) = committed {
        warn!(video_id = id, file = %record.filename, "upload not committed: {e}");
        if catalog.get(id).is_none() {
            remove_orphan(&upload_dir.join(&record.filename)).await;
        }
        return Err(e);
    }
    Ok(record)
}

async fn remove_orphan(blob: &std::path::Path) {
    match tokio::fs::remove_file(blob).await {
        Ok(()) => debug!(path = %blob.display(), "removed orphaned blob"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %blob.display(), "removing orphaned blob failed: {e}"),
    }
}

pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Message>, ApiError> {
    let record = state
        .catalog
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound("Video not found".into()))?;

    let path = state.config.storage.upload_dir.join(&record.filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    {
        let mut catalog = state.catalog.write().await;
        catalog.remove(id);
        catalog.flush()?;
    }
    info!(video_id = id, file = %record.filename, "video deleted");

    Ok(Json(Message {
        message: "Video deleted successfully",
    }))
}

fn blob_filename(uploaded_at: u64, id: u64, original_filename: &str) -> String {
    format!("encrypted_{uploaded_at}_{id}_{original_filename}")
}

/// Lowercased extension after the last dot, if any.
fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Keeps the last path segment, maps whitespace to `_`, drops everything
/// outside `[A-Za-z0-9._-]` and strips leading dots and underscores. An
/// empty result becomes `video.<ext>`.
fn secure_filename(filename: &str, ext: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() || !cleaned.contains('.') {
        format!("video.{ext}")
    } else {
        cleaned.to_string()
    }
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::super::router;
    use super::super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use futures::StreamExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "vidcrypt-test-boundary";

    fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/api/videos/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension("clip.MP4").as_deref(), Some("mp4"));
        assert_eq!(extension("a.b.mkv").as_deref(), Some("mkv"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("my clip.mp4", "mp4"), "my_clip.mp4");
        assert_eq!(secure_filename("../../etc/passwd.mp4", "mp4"), "passwd.mp4");
        assert_eq!(secure_filename("C:\\videos\\cat.mov", "mov"), "cat.mov");
        assert_eq!(secure_filename(".hidden.mkv", "mkv"), "hidden.mkv");
        assert_eq!(secure_filename("vidéo.mp4", "mp4"), "vido.mp4");
        assert_eq!(secure_filename("☃.mp4", "mp4"), "video.mp4");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("mp4"), "video/mp4");
        assert_eq!(content_type_for("mov"), "video/quicktime");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn upload_then_stream_back() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let plaintext = make_data(5000);

        let res = router(state.clone())
            .oneshot(multipart_request("video", "holiday clip.mp4", &plaintext))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = body_json(res).await;
        assert_eq!(json["message"], "Video uploaded successfully");
        assert_eq!(json["video"]["original_filename"], "holiday_clip.mp4");
        assert_eq!(json["video"]["content_type"], "video/mp4");
        assert_eq!(json["video"]["file_size"], 5000);
        assert_eq!(json["video"]["status"], "ready");
        assert!(json["video"].get("encryption_key").is_none());

        let id = json["video"]["id"].as_u64().unwrap();
        let record = state.catalog.read().await.get(id).cloned().unwrap();
        assert_eq!(record.blob_len, 5008);
        assert!(record.filename.starts_with("encrypted_"));
        assert!(record.filename.ends_with(&format!("_{id}_holiday_clip.mp4")));

        // Only the catalog and the blob remain in the upload dir
        let mut names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["catalog.json".to_string(), record.filename.clone()]);

        let res = router(state.clone())
            .oneshot(
                Request::get(format!("/api/videos/stream/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_bytes(res).await;
        assert_eq!(&body[..5000], plaintext.as_slice());
        assert_eq!(state.metrics.uploads_finished("ok"), 1);
    }

    async fn upload(state: &AppState, name: &str, data: &[u8]) -> u64 {
        let res = router(state.clone())
            .oneshot(multipart_request("video", name, data))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        body_json(res).await["video"]["id"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn same_name_uploads_keep_separate_blobs() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let first = make_data(3000);
        let second: Vec<u8> = first.iter().map(|b| b ^ 0x5a).collect();

        let a = upload(&state, "clip.mp4", &first).await;
        let b = upload(&state, "clip.mp4", &second).await;

        let (blob_a, blob_b) = {
            let catalog = state.catalog.read().await;
            (
                catalog.get(a).unwrap().filename.clone(),
                catalog.get(b).unwrap().filename.clone(),
            )
        };
        assert_ne!(blob_a, blob_b);
        assert!(blob_a.contains(&format!("_{a}_clip.mp4")));

        for (id, plaintext) in [(a, &first), (b, &second)] {
            let res = router(state.clone())
                .oneshot(
                    Request::get(format!("/api/videos/stream/{id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let body = body_bytes(res).await;
            assert_eq!(&body[..3000], plaintext.as_slice(), "video {id}");
        }

        // Deleting one leaves the other streamable
        let res = router(state.clone())
            .oneshot(
                Request::delete(format!("/api/videos/{a}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(tmp.path().join(&blob_b).exists());
    }

    #[tokio::test]
    async fn blob_of_video_deleted_during_encode_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let video = seed_video(&state, "a.mp4", &make_data(64), VideoStatus::Processing).await;
        let blob = tmp.path().join(&video.filename);
        assert!(blob.exists());

        state.catalog.write().await.remove(video.id);

        let summary = EncodeSummary {
            plaintext_len: 64,
            blob_len: 64,
        };
        let err = commit_ready(&state, video, &summary, tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(!blob.exists());
    }

    #[tokio::test]
    async fn commit_marks_video_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let video = seed_video(&state, "a.mp4", &make_data(64), VideoStatus::Processing).await;
        let blob = tmp.path().join(&video.filename);

        let summary = EncodeSummary {
            plaintext_len: 64,
            blob_len: 64,
        };
        let record = commit_ready(&state, video, &summary, tmp.path())
            .await
            .unwrap();
        assert_eq!(record.status, VideoStatus::Ready);
        assert!(state.catalog.read().await.get(record.id).unwrap().is_ready());
        assert!(blob.exists());
    }

    #[tokio::test]
    async fn mark_failed_tolerates_deleted_record() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let kept = seed_video(&state, "a.mp4", &make_data(16), VideoStatus::Processing).await;

        mark_failed(&state, kept.id).await;
        mark_failed(&state, kept.id + 100).await;

        let catalog = state.catalog.read().await;
        assert_eq!(catalog.get(kept.id).unwrap().status, VideoStatus::Error);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn upload_publishes_progress_events() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        // A fresh catalog hands out id 1 first
        let mut events = state.events.subscribe(1).await.unwrap();

        let res = router(state.clone())
            .oneshot(multipart_request("video", "a.mkv", &make_data(32)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let first = events.next().await.unwrap();
        assert_eq!(first.status, VideoStatus::Processing);
        let second = events.next().await.unwrap();
        assert_eq!(second.status, VideoStatus::Ready);
    }

    #[tokio::test]
    async fn upload_rejections() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());

        let cases = [
            (
                multipart_request("file", "a.mp4", b"data"),
                "No video file provided",
            ),
            (multipart_request("video", "", b"data"), "No selected file"),
            (
                multipart_request("video", "notes.txt", b"data"),
                "File type not allowed",
            ),
            (
                multipart_request("video", "noext", b"data"),
                "File type not allowed",
            ),
        ];
        for (req, expected) in cases {
            let res = router(state.clone()).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(res).await["error"], expected);
        }
        assert!(state.catalog.read().await.is_empty());
    }

    #[tokio::test]
    async fn list_hides_key_material() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        seed_video(&state, "a.mp4", &make_data(16), VideoStatus::Ready).await;
        seed_video(&state, "b.mp4", &make_data(16), VideoStatus::Error).await;

        let res = router(state)
            .oneshot(Request::get("/api/videos").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        let videos = json["videos"].as_array().unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[1]["status"], "error");
        for video in videos {
            assert!(video.get("encryption_key").is_none());
            assert!(video.get("iv").is_none());
        }
    }

    #[tokio::test]
    async fn delete_removes_blob_and_record() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let video = seed_video(&state, "a.mp4", &make_data(16), VideoStatus::Ready).await;
        let blob = tmp.path().join(&video.filename);
        assert!(blob.exists());

        let delete = || {
            Request::delete(format!("/api/videos/{}", video.id))
                .body(Body::empty())
                .unwrap()
        };

        let res = router(state.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await["message"],
            "Video deleted successfully"
        );
        assert!(!blob.exists());
        assert!(state.catalog.read().await.get(video.id).is_none());

        let res = router(state).oneshot(delete()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let video = seed_video(&state, "a.mp4", &make_data(16), VideoStatus::Ready).await;
        std::fs::remove_file(tmp.path().join(&video.filename)).unwrap();

        let res = router(state)
            .oneshot(
                Request::delete(format!("/api/videos/{}", video.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
