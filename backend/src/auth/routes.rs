use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{error, info, warn};

use crate::views::flash::FlashMessage;
use crate::views::pages::{self, redirect};

use super::models::CredentialsForm;
use super::session::{SESSION_COOKIE, SessionService};
use super::user_store::{AuthError, UserStore};

/// Username of the request's session, for pages that render either way.
pub async fn current_user(req: &HttpRequest, sessions: &SessionService) -> Option<String> {
    let token = req.cookie(SESSION_COOKIE)?;
    sessions.resolve(token.value()).await.ok().map(|s| s.username)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

fn session_removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

pub async fn signup_page(req: HttpRequest, sessions: web::Data<SessionService>) -> HttpResponse {
    let user = current_user(&req, &sessions).await;
    pages::render(&req, "Sign up", user.as_deref(), &pages::signup())
}

pub async fn signup(
    form: web::Form<CredentialsForm>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse> {
    let CredentialsForm { username, password } = form.into_inner();

    let store = users.clone();
    let name = username.clone();
    let outcome = web::block(move || store.create_user(&name, &password)).await?;

    match outcome {
        Ok(()) => {
            info!("User signed up: {}", username);
            Ok(redirect("/login", Some(FlashMessage::success("Signup successful!"))))
        }
        Err(AuthError::DuplicateUser(_)) => {
            warn!("Signup rejected, username already taken: {}", username);
            Ok(redirect("/signup", Some(FlashMessage::error("Username already exists."))))
        }
        Err(AuthError::MissingCredentials) => Ok(redirect(
            "/signup",
            Some(FlashMessage::error("Username and password are required.")),
        )),
        Err(e) => {
            error!("Signup failed for {}: {}", username, e);
            Ok(redirect(
                "/signup",
                Some(FlashMessage::error("Signup failed. Please try again.")),
            ))
        }
    }
}

pub async fn login_page(req: HttpRequest, sessions: web::Data<SessionService>) -> HttpResponse {
    let user = current_user(&req, &sessions).await;
    pages::render(&req, "Log in", user.as_deref(), &pages::login())
}

pub async fn login(
    form: web::Form<CredentialsForm>,
    users: web::Data<dyn UserStore>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse> {
    let CredentialsForm { username, password } = form.into_inner();

    let store = users.clone();
    let name = username.clone();
    let verified = web::block(move || store.verify_credentials(&name, &password)).await?;

    if let Err(e) = verified {
        warn!("Login failed for {}: {}", username, e);
        return Ok(redirect(
            "/login",
            Some(FlashMessage::error("Invalid username or password.")),
        ));
    }

    match sessions.start(&username).await {
        Ok(token) => {
            info!("User logged in: {}", username);
            let mut response = redirect("/index", Some(FlashMessage::success("Login successful!")));
            response.add_cookie(&session_cookie(token))?;
            Ok(response)
        }
        Err(e) => {
            error!("Failed to start session for {}: {}", username, e);
            Ok(redirect(
                "/login",
                Some(FlashMessage::error("Login failed. Please try again.")),
            ))
        }
    }
}

pub async fn logout(req: HttpRequest, sessions: web::Data<SessionService>) -> Result<HttpResponse> {
    if let Some(token) = req.cookie(SESSION_COOKIE) {
        if sessions.end(token.value()).await.is_none() {
            info!("Logout with a stale session cookie");
        }
    }

    let mut response = redirect("/login", Some(FlashMessage::info("You have been logged out.")));
    response.add_cookie(&session_removal_cookie())?;
    Ok(response)
}
