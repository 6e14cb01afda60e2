use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::pagination::PageRequest,
    application::repos::{
        CreatePostParams, PostScope, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
    },
    domain::entities::{AuthorSummary, GroupSummary, PostRecord, display_name},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Columns every post query projects; expects `p` joined with `u` and `g`.
const POST_COLUMNS: &str = "p.id, p.text, p.pub_date, p.image, \
     u.id AS author_id, u.username AS author_username, \
     u.first_name AS author_first_name, u.last_name AS author_last_name, \
     g.id AS group_id, g.slug AS group_slug, g.title AS group_title";

const POST_JOINS: &str = " JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    image: Option<String>,
    author_id: i64,
    author_username: String,
    author_first_name: String,
    author_last_name: String,
    group_id: Option<i64>,
    group_slug: Option<String>,
    group_title: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_slug, row.group_title) {
            (Some(id), Some(slug), Some(title)) => Some(GroupSummary { id, slug, title }),
            _ => None,
        };
        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author: AuthorSummary {
                id: row.author_id,
                display_name: display_name(
                    &row.author_username,
                    &row.author_first_name,
                    &row.author_last_name,
                ),
                username: row.author_username,
            },
            group,
            image: row.image,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        scope: PostScope,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p");
        qb.push(POST_JOINS);
        qb.push(" WHERE TRUE");
        Self::apply_scope_conditions(&mut qb, scope);
        qb.push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p WHERE TRUE");
        Self::apply_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p");
        qb.push(POST_JOINS);
        qb.push(" WHERE p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "WITH p AS (INSERT INTO posts (text, author_id, group_id, image) VALUES (",
        );
        qb.push_bind(params.text);
        qb.push(", ");
        qb.push_bind(params.author_id);
        qb.push(", ");
        qb.push_bind(params.group_id);
        qb.push(", ");
        qb.push_bind(params.image);
        qb.push(") RETURNING *) SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM p");
        qb.push(POST_JOINS);

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("WITH p AS (UPDATE posts SET text = ");
        qb.push_bind(params.text);
        qb.push(", group_id = ");
        qb.push_bind(params.group_id);
        qb.push(", image = ");
        qb.push_bind(params.image);
        qb.push(" WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" RETURNING *) SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM p");
        qb.push(POST_JOINS);

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }
}
