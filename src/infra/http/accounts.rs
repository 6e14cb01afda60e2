//! Sign-up, login and logout pages.

use axum::{
    Form, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::info;

use crate::{
    application::{auth::AuthError, error::HttpError},
    domain::error::DomainError,
    presentation::views::{
        LayoutContext, LoggedOutTemplate, LoginContext, LoginTemplate, SignupContext,
        SignupTemplate, render_template_response,
    },
};

use super::{
    HttpState,
    forms::{LoginForm, SignupFieldErrors, SignupForm},
    session::{CurrentViewer, safe_next},
};

const SOURCE: &str = "infra::http::accounts";
const INVALID_LOGIN_MESSAGE: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN_MESSAGE: &str = "A user with that username already exists.";

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/auth/signup/", get(signup_form).post(signup))
        .route("/auth/login/", get(login_form).post(login))
        .route("/auth/logout/", get(logged_out_page).post(logout))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NextQuery {
    next: Option<String>,
}

async fn signup_form(viewer: CurrentViewer) -> Response {
    render_signup(&viewer, SignupContext::default())
}

async fn signup(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, HttpError> {
    let command = match form.command() {
        Ok(command) => command,
        Err(errors) => return Ok(render_signup(&viewer, signup_context(&form, errors))),
    };

    let user = match state.auth.sign_up(command).await {
        Ok(user) => user,
        Err(AuthError::UsernameTaken(_)) => {
            let errors = SignupFieldErrors {
                username: Some(USERNAME_TAKEN_MESSAGE.to_string()),
                ..Default::default()
            };
            return Ok(render_signup(&viewer, signup_context(&form, errors)));
        }
        Err(AuthError::Validation(DomainError::Validation { field, message })) => {
            let mut errors = SignupFieldErrors::default();
            match field {
                "username" => errors.username = Some(message),
                _ => errors.password1 = Some(message),
            }
            return Ok(render_signup(&viewer, signup_context(&form, errors)));
        }
        Err(err) => return Err(err.into()),
    };

    let session = state.auth.start_session(&user).await?;
    let jar = state.session.issue(jar, &session);
    Ok((jar, Redirect::to("/")).into_response())
}

fn signup_context(form: &SignupForm, errors: SignupFieldErrors) -> SignupContext {
    SignupContext {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        username: form.username.clone(),
        errors,
    }
}

fn render_signup(viewer: &CurrentViewer, content: SignupContext) -> Response {
    let view = LayoutContext::new(viewer.user(), "Sign up", content);
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

async fn login_form(viewer: CurrentViewer, Query(query): Query<NextQuery>) -> Response {
    render_login(
        &viewer,
        LoginContext {
            next: safe_next(query.next.as_deref())
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        },
    )
}

async fn login(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, HttpError> {
    let next = safe_next(form.next.as_deref()).unwrap_or("/").to_string();

    match state.auth.login(&form.username, &form.password).await {
        Ok(session) => {
            let jar = state.session.issue(jar, &session);
            Ok((jar, Redirect::to(&next)).into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            info!(
                target = SOURCE,
                username = %form.username,
                "Rejected login attempt"
            );
            Ok(render_login(
                &viewer,
                LoginContext {
                    username: form.username,
                    next: safe_next(form.next.as_deref())
                        .unwrap_or_default()
                        .to_string(),
                    error: Some(INVALID_LOGIN_MESSAGE.to_string()),
                },
            ))
        }
        Err(err) => Err(err.into()),
    }
}

fn render_login(viewer: &CurrentViewer, content: LoginContext) -> Response {
    let view = LayoutContext::new(viewer.user(), "Log in", content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

/// Sessions end only on POST; a plain GET just shows the page.
async fn logged_out_page() -> Response {
    render_logged_out()
}

async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Result<Response, HttpError> {
    if let Some(token) = state.session.token(&jar) {
        state.auth.logout(&token).await?;
    }
    let jar = state.session.clear(jar);
    Ok((jar, render_logged_out()).into_response())
}

fn render_logged_out() -> Response {
    let view = LayoutContext::new(None, "Logged out", ());
    render_template_response(LoggedOutTemplate { view }, StatusCode::OK)
}
