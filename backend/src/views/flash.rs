use actix_web::HttpRequest;
use actix_web::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use shared::FlashLevel;

pub const FLASH_COOKIE: &str = "flash";

/// One-shot notice carried to the next rendered page in a cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            text: text.into(),
        }
    }

    pub fn to_cookie(&self) -> Cookie<'static> {
        let json = serde_json::to_string(self).unwrap_or_default();
        Cookie::build(FLASH_COOKIE, urlencoding::encode(&json).into_owned())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }

    /// Accepts the value either still percent-encoded or already decoded by
    /// the cookie parser.
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        if let Ok(flash) = serde_json::from_str(value) {
            return Some(flash);
        }
        let json = urlencoding::decode(value).ok()?;
        serde_json::from_str(&json).ok()
    }
}

/// Reads the pending flash message, if any. The caller clears it with
/// [`removal_cookie`] once it has been rendered.
pub fn peek(req: &HttpRequest) -> Option<FlashMessage> {
    let cookie = req.cookie(FLASH_COOKIE)?;
    let flash = FlashMessage::from_cookie_value(cookie.value());
    if flash.is_none() {
        log::debug!("Discarding unreadable flash cookie");
    }
    flash
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}
