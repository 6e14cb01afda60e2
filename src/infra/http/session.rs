//! Session cookie handling and the viewer extractors.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{Uri, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::application::auth::IssuedSession;
use crate::application::error::HttpError;
use crate::domain::entities::UserRecord;

use super::HttpState;

pub const LOGIN_PATH: &str = "/auth/login/";

/// Name and flags of the cookie carrying the session token.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: Arc<str>,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<Arc<str>>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn issue(&self, jar: CookieJar, session: &IssuedSession) -> CookieJar {
        let cookie = Cookie::build((self.name.to_string(), session.token.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .expires(session.expires_at);
        jar.add(cookie)
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(self.name.to_string()).path("/"))
    }
}

/// The signed-in user, if any. Resolved once per request.
#[derive(Debug, Clone)]
pub struct CurrentViewer(pub Option<UserRecord>);

impl CurrentViewer {
    pub fn user(&self) -> Option<&UserRecord> {
        self.0.as_ref()
    }
}

impl FromRequestParts<HttpState> for CurrentViewer {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<CurrentViewer>() {
            return Ok(resolved.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let user = match state.session.token(&jar) {
            Some(token) => state.auth.authenticate(&token).await?,
            None => None,
        };

        let viewer = CurrentViewer(user);
        parts.extensions.insert(viewer.clone());
        Ok(viewer)
    }
}

/// A signed-in user; anonymous requests are redirected to the login page.
#[derive(Debug, Clone)]
pub struct RequireUser(pub UserRecord);

impl FromRequestParts<HttpState> for RequireUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentViewer(user) = CurrentViewer::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        match user {
            Some(user) => Ok(RequireUser(user)),
            None => Err(login_redirect(&parts.uri)),
        }
    }
}

pub fn login_redirect(uri: &Uri) -> Response {
    let next = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    Redirect::to(&format!("{LOGIN_PATH}?next={encoded}")).into_response()
}

/// Only local absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim).filter(|value| {
        value.starts_with('/')
            && !value.starts_with("//")
            && !value.contains('\\')
            && !value.chars().any(|ch| ch.is_ascii_control())
    })
}
