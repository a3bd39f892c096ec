use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::web;
use chrono::Duration;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::auth::jwt::JwtService;
use crate::auth::session::SessionService;
use crate::auth::user_store::{InMemoryUserStore, UserStore};
use crate::inference::classifier::{ImageClassifier, InferenceError};
use crate::routes::AppState;
use crate::storage::upload_store::UploadStore;

/// Returns fixed scores and counts how often it was asked.
pub struct FakeClassifier {
    labels: Vec<String>,
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            labels: vec!["NORMAL".to_string(), "PNEUMONIA".to_string()],
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageClassifier for FakeClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_size(&self) -> u32 {
        224
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        Ok(self.scores.clone())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub classifier: Arc<FakeClassifier>,
    pub upload_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_limit(30 * 1024 * 1024)
    }

    pub fn with_limit(max_upload_bytes: usize) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(FakeClassifier::new(vec![0.0266, 0.9734]));
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let shared_classifier: Arc<dyn ImageClassifier> = classifier.clone();

        let state = AppState {
            users: web::Data::from(users),
            sessions: web::Data::new(SessionService::new(
                JwtService::new("test-secret"),
                Duration::hours(1),
            )),
            classifier: web::Data::from(shared_classifier),
            uploads: web::Data::new(UploadStore::new(
                upload_dir.path().to_path_buf(),
                max_upload_bytes,
            )),
        };

        Self {
            state,
            classifier,
            upload_dir,
        }
    }

    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

pub const BOUNDARY: &str = "----xray-test-boundary";

/// Single-part multipart body; returns the content type header and body.
pub fn multipart_file(field: &str, file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn response_cookie<B>(resp: &ServiceResponse<B>, name: &str) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.into_owned())
}
