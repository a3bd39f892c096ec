use actix_files::NamedFile;
use actix_web::{HttpRequest, HttpResponse, Result, error, web};
use lazy_static::lazy_static;
use shared::ClassDistribution;

use crate::auth::middleware::{AuthenticatedUser, RequireSession};
use crate::auth::routes::{current_user, login, login_page, logout, signup, signup_page};
use crate::auth::session::SessionService;
use crate::auth::user_store::UserStore;
use crate::inference::classifier::ImageClassifier;
use crate::predict::{predict, predict_api, upload_form};
use crate::storage::upload_store::{ALLOWED_EXTENSIONS, UploadStore};
use crate::views::pages;

lazy_static! {
    /// Class counts of the training set the bundled model was fitted on.
    static ref TRAINING_DISTRIBUTION: ClassDistribution = ClassDistribution {
        labels: vec!["NORMAL".to_string(), "PNEUMONIA".to_string()],
        values: vec![1341, 3875],
    };
}

#[derive(Clone)]
pub struct AppState {
    pub users: web::Data<dyn UserStore>,
    pub sessions: web::Data<SessionService>,
    pub classifier: web::Data<dyn ImageClassifier>,
    pub uploads: web::Data<UploadStore>,
}

pub fn configure_app(cfg: &mut web::ServiceConfig, state: &AppState) {
    let require_session = RequireSession::new(state.sessions.get_ref().clone());

    cfg.app_data(state.users.clone())
        .app_data(state.sessions.clone())
        .app_data(state.classifier.clone())
        .app_data(state.uploads.clone())
        .service(web::resource("/").route(web::get().to(home)))
        .service(
            web::resource("/signup")
                .route(web::get().to(signup_page))
                .route(web::post().to(signup)),
        )
        .service(
            web::resource("/login")
                .route(web::get().to(login_page))
                .route(web::post().to(login)),
        )
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/performance").route(web::get().to(performance)))
        .service(web::resource("/api/performance").route(web::get().to(performance_api)))
        .service(
            web::resource("/index")
                .wrap(require_session.clone())
                .route(web::get().to(upload_form)),
        )
        .service(
            web::resource("/predict")
                .wrap(require_session.clone())
                .route(web::get().to(upload_form))
                .route(web::post().to(predict)),
        )
        .service(
            web::resource("/api/predict")
                .wrap(require_session.clone())
                .route(web::post().to(predict_api)),
        )
        .service(
            web::resource("/static/uploads/{name}")
                .wrap(require_session)
                .route(web::get().to(serve_upload)),
        );
}

async fn home(req: HttpRequest, sessions: web::Data<SessionService>) -> HttpResponse {
    let user = current_user(&req, &sessions).await;
    pages::render(&req, "Home", user.as_deref(), &pages::home())
}

async fn performance(req: HttpRequest, sessions: web::Data<SessionService>) -> HttpResponse {
    let user = current_user(&req, &sessions).await;
    pages::render(
        &req,
        "Performance",
        user.as_deref(),
        &pages::performance(&TRAINING_DISTRIBUTION),
    )
}

async fn performance_api() -> HttpResponse {
    HttpResponse::Ok().json(&*TRAINING_DISTRIBUTION)
}

/// Only names the upload store could have produced are served.
fn is_stored_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((hash, ext)) => {
            hash.len() == 64
                && hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                && ALLOWED_EXTENSIONS.contains(ext)
        }
        None => false,
    }
}

async fn serve_upload(
    _user: AuthenticatedUser,
    path: web::Path<String>,
    store: web::Data<UploadStore>,
) -> Result<NamedFile> {
    let name = path.into_inner();
    if !is_stored_name(&name) {
        return Err(error::ErrorNotFound("Not found"));
    }
    Ok(NamedFile::open_async(store.root().join(&name)).await?)
}
