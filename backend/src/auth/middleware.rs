use super::session::{SESSION_COOKIE, SessionError, SessionService};
use crate::views::flash::FlashMessage;
use crate::views::pages::redirect;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{Ready, err, ok};
use shared::ErrorResponse;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// Lets a request through only when its `session` cookie names a live
/// session. Page requests are redirected to the login form; `/api` requests
/// get a JSON 401.
#[derive(Clone)]
pub struct RequireSession {
    sessions: SessionService,
}

impl RequireSession {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireSession
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = RequireSessionService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireSessionService {
            service: Rc::new(service),
            sessions: self.sessions.clone(),
        })
    }
}

pub struct RequireSessionService<S> {
    service: Rc<S>,
    sessions: SessionService,
}

#[derive(Debug)]
enum AuthFailure {
    NoCookie,
    Rejected(SessionError),
}

impl AuthFailure {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthFailure::NoCookie => format!("No session cookie for path: {}", path),
            AuthFailure::Rejected(e) => format!("Session rejected for path {}: {}", path, e),
        }
    }

    fn client_response(&self, path: &str) -> HttpResponse {
        if path.starts_with("/api/") {
            HttpResponse::Unauthorized().json(ErrorResponse {
                error: "Authentication required".to_string(),
            })
        } else {
            redirect("/login", Some(FlashMessage::error("You need to log in first")))
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequireSessionService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let sessions = self.sessions.clone();

        Box::pin(async move {
            let path = req.path().to_string();
            let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

            let outcome = match token {
                None => Err(AuthFailure::NoCookie),
                Some(token) => sessions.resolve(&token).await.map_err(AuthFailure::Rejected),
            };

            match outcome {
                Ok(session) => {
                    log::debug!("Session for {} accepted on {}", session.username, path);
                    req.extensions_mut().insert(AuthenticatedUser(session.username));
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(failure) => {
                    log::warn!("{}", failure.log_message(&path));
                    let (http_req, _payload) = req.into_parts();
                    let response = failure.client_response(&path).map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Username of the session that passed [`RequireSession`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ok(user.clone()),
            None => {
                log::error!(
                    "AuthenticatedUser requested on {} without RequireSession in front of it",
                    req.path()
                );
                err(actix_web::error::ErrorUnauthorized("Authentication required"))
            }
        }
    }
}
