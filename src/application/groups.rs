use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug, is_valid_slug};

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("slug `{0}` is already in use")]
    SlugTaken(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

/// Operator-side management of reference groups.
#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    pub async fn create(&self, cmd: CreateGroupCommand) -> Result<GroupRecord, GroupError> {
        let title = cmd.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title", "This field is required.").into());
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::validation(
                "title",
                format!("Ensure this value has at most {MAX_TITLE_LEN} characters."),
            )
            .into());
        }

        let slug = match cmd.slug.map(|value| value.trim().to_string()) {
            Some(slug) if !slug.is_empty() => {
                if !is_valid_slug(&slug) {
                    return Err(DomainError::validation(
                        "slug",
                        "Enter a valid slug consisting of lowercase letters, numbers, underscores or hyphens.",
                    )
                    .into());
                }
                if self.groups.find_group_by_slug(&slug).await?.is_some() {
                    return Err(GroupError::SlugTaken(slug));
                }
                slug
            }
            _ => {
                let groups = self.groups.clone();
                generate_unique_slug(&title, |candidate| {
                    let groups = groups.clone();
                    let candidate = candidate.to_string();
                    async move {
                        groups
                            .find_group_by_slug(&candidate)
                            .await
                            .map(|found| found.is_none())
                    }
                })
                .await
                .map_err(|err| match err {
                    SlugAsyncError::Slug(err) => GroupError::Slug(err),
                    SlugAsyncError::Predicate(err) => GroupError::Repo(err),
                })?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug: slug.clone(),
                description: cmd.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::SlugTaken(slug),
                other => GroupError::Repo(other),
            })?;

        info!(
            target = "yatube::application::groups",
            group_id = group.id,
            slug = %group.slug,
            "Group created"
        );
        Ok(group)
    }
}
