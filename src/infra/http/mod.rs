mod accounts;
pub mod forms;
mod middleware;
mod public;
mod session;
mod state;

pub use public::build_router;
pub use session::{CurrentViewer, RequireUser, SessionCookie};
pub use state::{HttpState, Repositories};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::{error::ErrorReport, repos::RepoError};

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
