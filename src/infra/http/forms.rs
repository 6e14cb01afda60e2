//! Request body parsing for the HTML forms.

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use crate::application::auth::SignUpCommand;
use crate::application::posts::{ImageChange, PostFieldErrors, PostSubmission};

const SOURCE: &str = "infra::http::forms";

pub const UNKNOWN_GROUP_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
const IMAGE_CONFLICT_MESSAGE: &str =
    "Please either submit a file or check the clear checkbox, not both.";

#[derive(Debug, Error)]
pub enum PostFormError {
    #[error("request body exceeds the upload limit")]
    PayloadTooLarge,
    #[error("form data could not be read: {0}")]
    Invalid(String),
}

impl PostFormError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Bytes,
}

/// Fields of the create and edit post forms as submitted.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    pub group: String,
    pub image: Option<UploadedImage>,
    pub clear_image: bool,
}

impl PostForm {
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, PostFormError> {
        let mut form = PostForm::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) => return Err(classify(err.status(), err.to_string())),
            };

            match field.name() {
                Some("text") => {
                    form.text = field
                        .text()
                        .await
                        .map_err(|err| classify(err.status(), err.to_string()))?;
                }
                Some("group") => {
                    form.group = field
                        .text()
                        .await
                        .map_err(|err| classify(err.status(), err.to_string()))?
                        .trim()
                        .to_string();
                }
                Some("image-clear") => {
                    let value = field
                        .text()
                        .await
                        .map_err(|err| classify(err.status(), err.to_string()))?;
                    form.clear_image =
                        matches!(value.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1");
                }
                Some("image") => {
                    let filename = field
                        .file_name()
                        .map(|value| value.trim().to_string())
                        .unwrap_or_default();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|err| classify(err.status(), err.to_string()))?;
                    // Browsers send an empty part when no file was picked.
                    if !(filename.is_empty() && data.is_empty()) {
                        form.image = Some(UploadedImage { filename, data });
                    }
                }
                _ => continue,
            }
        }

        Ok(form)
    }

    /// Convert the raw fields into a submission, reporting the errors that
    /// can be decided without storage.
    pub fn submission(&self) -> Result<PostSubmission, PostFieldErrors> {
        let mut errors = PostFieldErrors::default();

        let group_id = if self.group.is_empty() {
            None
        } else {
            match self.group.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.group = Some(UNKNOWN_GROUP_MESSAGE.to_string());
                    None
                }
            }
        };

        let image = match (&self.image, self.clear_image) {
            (Some(_), true) => {
                errors.image = Some(IMAGE_CONFLICT_MESSAGE.to_string());
                ImageChange::Keep
            }
            (Some(upload), false) => ImageChange::Replace {
                filename: upload.filename.clone(),
                data: upload.data.clone(),
            },
            (None, true) => ImageChange::Clear,
            (None, false) => ImageChange::Keep,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(PostSubmission {
            text: self.text.clone(),
            group_id,
            image,
        })
    }

    pub fn selected_group(&self) -> Option<i64> {
        self.group.parse().ok()
    }
}

fn classify(status: StatusCode, detail: String) -> PostFormError {
    error!(
        target = SOURCE,
        status = status.as_u16(),
        error = %detail,
        "failed to read multipart payload"
    );
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => PostFormError::PayloadTooLarge,
        _ => PostFormError::Invalid(detail),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SignupFieldErrors {
    pub username: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

impl SignupFieldErrors {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password1.is_none() && self.password2.is_none()
    }
}

impl SignupForm {
    pub fn command(&self) -> Result<SignUpCommand, SignupFieldErrors> {
        let mut errors = SignupFieldErrors::default();
        if self.password1.is_empty() {
            errors.password1 = Some("This field is required.".to_string());
        }
        if self.password2.is_empty() {
            errors.password2 = Some("This field is required.".to_string());
        } else if self.password1 != self.password2 {
            errors.password2 = Some("The two password fields didn’t match.".to_string());
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SignUpCommand {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            password: self.password1.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(group: &str) -> PostForm {
        PostForm {
            text: "hello".into(),
            group: group.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_group_means_no_group() {
        let submission = form("").submission().expect("valid");
        assert_eq!(submission.group_id, None);
        assert!(matches!(submission.image, ImageChange::Keep));
    }

    #[test]
    fn non_numeric_group_is_a_field_error() {
        let errors = form("cats").submission().expect_err("invalid group");
        assert_eq!(errors.group.as_deref(), Some(UNKNOWN_GROUP_MESSAGE));
    }

    #[test]
    fn upload_and_clear_conflict() {
        let mut form = form("2");
        form.clear_image = true;
        form.image = Some(UploadedImage {
            filename: "a.gif".into(),
            data: Bytes::from_static(b"GIF89a"),
        });
        let errors = form.submission().expect_err("conflict");
        assert!(errors.image.is_some());

        form.image = None;
        let submission = form.submission().expect("clear only");
        assert!(matches!(submission.image, ImageChange::Clear));
        assert_eq!(submission.group_id, Some(2));
    }

    #[test]
    fn signup_passwords_must_match() {
        let form = SignupForm {
            username: "leo".into(),
            password1: "war-and-peace".into(),
            password2: "war-and-pieces".into(),
            ..Default::default()
        };
        let errors = form.command().expect_err("mismatch");
        assert!(errors.password2.is_some());
        assert!(errors.password1.is_none());
    }
}
