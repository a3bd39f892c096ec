use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::http::header::CONTENT_LENGTH;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use shared::{ErrorResponse, PredictionResponse};

use crate::auth::middleware::AuthenticatedUser;
use crate::inference::classifier::{ImageClassifier, InferenceError, classify};
use crate::inference::preprocess::{PreprocessError, preprocess};
use crate::storage::upload_store::{ALLOWED_EXTENSION_LIST, UploadError, UploadStore};
use crate::views::flash::FlashMessage;
use crate::views::pages::{self, redirect};

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("request has no `file` part")]
    MissingFile,
    #[error("no file was selected")]
    NoFileSelected,
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("blocking task failed: {0}")]
    Blocking(String),
}

impl PredictError {
    /// Client-safe text. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PredictError::MissingFile | PredictError::NoFileSelected => {
                "No file was selected.".to_string()
            }
            PredictError::EmptyFile => "The uploaded file is empty.".to_string(),
            PredictError::Upload(UploadError::MissingExtension(_))
            | PredictError::Upload(UploadError::InvalidExtension(_)) => format!(
                "Invalid file format. Allowed types: {}.",
                ALLOWED_EXTENSION_LIST.join(", ")
            ),
            PredictError::Upload(UploadError::FileTooLarge { limit }) => format!(
                "File is too large. The limit is {} MiB.",
                limit / (1024 * 1024)
            ),
            PredictError::Multipart(_) => "The upload could not be read.".to_string(),
            PredictError::Preprocess(_) => "The file could not be read as an image.".to_string(),
            PredictError::Upload(UploadError::Io(_))
            | PredictError::Inference(_)
            | PredictError::Blocking(_) => "Prediction failed. Please try again later.".to_string(),
        }
    }

    fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile
            | PredictError::NoFileSelected
            | PredictError::EmptyFile
            | PredictError::Multipart(_)
            | PredictError::Upload(UploadError::MissingExtension(_))
            | PredictError::Upload(UploadError::InvalidExtension(_)) => StatusCode::BAD_REQUEST,
            PredictError::Upload(UploadError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Preprocess(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Upload(UploadError::Io(_))
            | PredictError::Inference(_)
            | PredictError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.user_message(),
        })
    }
}

#[derive(Debug)]
pub struct UploadedImage {
    pub file_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Pulls the `file` part out of a multipart body. The extension is checked
/// from the part headers before any of its bytes are read.
pub async fn read_upload(
    req: &HttpRequest,
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<UploadedImage, PredictError> {
    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > max_bytes) {
        return Err(UploadError::FileTooLarge { limit: max_bytes }.into());
    }

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| PredictError::Multipart(e.to_string()))?
    {
        if field.name() != Some("file") {
            while field
                .try_next()
                .await
                .map_err(|e| PredictError::Multipart(e.to_string()))?
                .is_some()
            {}
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        if file_name.is_empty() {
            return Err(PredictError::NoFileSelected);
        }
        let extension = UploadStore::validate_file_name(&file_name)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| PredictError::Multipart(e.to_string()))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(UploadError::FileTooLarge { limit: max_bytes }.into());
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(PredictError::EmptyFile);
        }

        return Ok(UploadedImage {
            file_name,
            extension,
            bytes,
        });
    }

    Err(PredictError::MissingFile)
}

/// Persist, preprocess and classify one validated upload.
pub fn run_prediction(
    upload: &UploadedImage,
    store: &UploadStore,
    classifier: &dyn ImageClassifier,
) -> Result<PredictionResponse, PredictError> {
    let stored = store.save(&upload.bytes, &upload.extension)?;
    let tensor = preprocess(&upload.bytes, classifier.input_size())?;
    let prediction = classify(classifier, &tensor)?;

    Ok(PredictionResponse {
        label: prediction.label,
        class_index: prediction.class_index,
        confidence: prediction.confidence,
        confidence_percent: shared::round_percent(prediction.confidence),
        probabilities: prediction.probabilities,
        image_url: stored.public_url(),
        file_name: upload.file_name.clone(),
    })
}

async fn handle_upload(
    req: &HttpRequest,
    user: &AuthenticatedUser,
    payload: Multipart,
    store: web::Data<UploadStore>,
    classifier: web::Data<dyn ImageClassifier>,
) -> Result<PredictionResponse, PredictError> {
    let upload = read_upload(req, payload, store.max_bytes()).await?;
    let file_name = upload.file_name.clone();

    let response = web::block(move || run_prediction(&upload, &store, classifier.get_ref()))
        .await
        .map_err(|e| PredictError::Blocking(e.to_string()))??;

    info!(
        "Prediction for {} on {:?}: {} ({:.2}%) stored at {}",
        user.0, file_name, response.label, response.confidence_percent, response.image_url
    );
    Ok(response)
}

fn log_failure(user: &AuthenticatedUser, e: &PredictError) {
    if e.is_client_error() {
        warn!("Upload from {} rejected: {}", user.0, e);
    } else {
        error!("Prediction for {} failed: {:?}", user.0, e);
    }
}

pub async fn upload_form(
    req: HttpRequest,
    user: AuthenticatedUser,
    store: web::Data<UploadStore>,
) -> HttpResponse {
    let body = pages::upload_form(&ALLOWED_EXTENSION_LIST, store.max_bytes());
    pages::render(&req, "Upload", Some(&user.0), &body)
}

pub async fn predict(
    req: HttpRequest,
    user: AuthenticatedUser,
    payload: Multipart,
    store: web::Data<UploadStore>,
    classifier: web::Data<dyn ImageClassifier>,
) -> HttpResponse {
    match handle_upload(&req, &user, payload, store, classifier).await {
        Ok(response) => pages::render(&req, "Result", Some(&user.0), &pages::result(&response)),
        Err(e) => {
            log_failure(&user, &e);
            redirect("/index", Some(FlashMessage::error(e.user_message())))
        }
    }
}

pub async fn predict_api(
    req: HttpRequest,
    user: AuthenticatedUser,
    payload: Multipart,
    store: web::Data<UploadStore>,
    classifier: web::Data<dyn ImageClassifier>,
) -> Result<HttpResponse, PredictError> {
    match handle_upload(&req, &user, payload, store, classifier).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            log_failure(&user, &e);
            Err(e)
        }
    }
}
