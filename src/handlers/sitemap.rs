//! Sitemap edit-session CRUD (§6): create a session, stage add/modify/remove
//! operations against it, preview the generated document, validate it, then
//! deploy through the Deployment Pipeline (C10) — reusing its clone/commit/
//! push path exactly as issue-fix deploys do.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;

use crate::AppState;
use crate::models::{
    Domain, EditSession, EditSessionOperation, EditSessionResponse, SitemapEditRequest,
    SitemapEntry, SitemapOperation,
};
use crate::services::{generate_sitemap_xml, validate_sitemap_entries};
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    post,
    path = "/domains/{id}/sitemap/sessions",
    responses((status = 200, description = "Edit session created", body = EditSessionResponse)),
    tag = "Sitemap"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
) -> ApiResult<Json<EditSessionResponse>> {
    let session: EditSession =
        sqlx::query_as("INSERT INTO edit_sessions (domain_id, status) VALUES (?, 'draft') RETURNING *")
            .bind(domain_id)
            .fetch_one(&state.db)
            .await?;
    Ok(Json(EditSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/sitemap/sessions/{id}/operations",
    request_body = SitemapEditRequest,
    responses((status = 200, description = "Operation staged", body = EditSessionResponse)),
    tag = "Sitemap"
)]
pub async fn add_operation(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(req): Json<SitemapEditRequest>,
) -> ApiResult<Json<EditSessionResponse>> {
    load_session(&state, session_id).await?;

    sqlx::query(
        r#"
        INSERT INTO edit_session_operations (session_id, operation, location_url, lastmod, changefreq, priority)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(req.operation.as_str())
    .bind(&req.location_url)
    .bind(&req.lastmod)
    .bind(&req.changefreq)
    .bind(req.priority)
    .execute(&state.db)
    .await?;

    let counts = count_operations(&state, session_id).await?;
    let session: EditSession = sqlx::query_as(
        "UPDATE edit_sessions SET added_count = ?, removed_count = ?, modified_count = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(counts.0)
    .bind(counts.1)
    .bind(counts.2)
    .bind(session_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(EditSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/sitemap/sessions/{id}/preview",
    responses((status = 200, description = "Rendered preview document", body = EditSessionResponse)),
    tag = "Sitemap"
)]
pub async fn preview_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<EditSessionResponse>> {
    let existing = load_session(&state, session_id).await?;
    let entries = merged_entries(&state, existing.domain_id, session_id).await?;
    let xml = generate_sitemap_xml(&entries)?;

    let session: EditSession = sqlx::query_as(
        "UPDATE edit_sessions SET status = 'preview', preview_document = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(&xml)
    .bind(session_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(EditSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/sitemap/sessions/{id}/validate",
    responses(
        (status = 200, description = "Session's staged document is valid", body = EditSessionResponse),
        (status = 400, description = "Validation failed"),
    ),
    tag = "Sitemap"
)]
pub async fn validate_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<EditSessionResponse>> {
    let existing = load_session(&state, session_id).await?;
    let entries = merged_entries(&state, existing.domain_id, session_id).await?;

    if let Err(e) = validate_sitemap_entries(&entries) {
        sqlx::query("UPDATE edit_sessions SET status = 'failed', error = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(e.to_string())
            .bind(session_id)
            .execute(&state.db)
            .await?;
        return Err(e.into());
    }

    let session: EditSession = sqlx::query_as(
        "UPDATE edit_sessions SET status = 'validating', error = NULL, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(session_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(EditSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/sitemap/sessions/{id}/deploy",
    responses(
        (status = 200, description = "Sitemap deployed", body = EditSessionResponse),
        (status = 412, description = "Domain has no git configuration"),
    ),
    tag = "Sitemap"
)]
pub async fn deploy_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<EditSessionResponse>> {
    let existing = load_session(&state, session_id).await?;
    let Some(xml) = existing.preview_document.clone() else {
        return Err(ApiError::Conflict(format!("session {session_id} has no preview document yet")));
    };

    let domain: Domain = sqlx::query_as("SELECT * FROM domains WHERE id = ?")
        .bind(existing.domain_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::DomainNotFound(existing.domain_id.to_string()))?;

    sqlx::query("UPDATE edit_sessions SET status = 'deploying', updated_at = datetime('now') WHERE id = ?")
        .bind(session_id)
        .execute(&state.db)
        .await?;

    let outcome = match state.deployment.deploy_sitemap(&domain, &xml, "seo-core: sitemap update").await {
        Ok(outcome) => outcome,
        Err(e) => {
            sqlx::query("UPDATE edit_sessions SET status = 'failed', error = ? WHERE id = ?")
                .bind(e.to_string())
                .bind(session_id)
                .execute(&state.db)
                .await?;
            return Err(e.into());
        },
    };

    if outcome.deployed {
        commit_entries(&state, existing.domain_id, session_id).await?;
    }

    let session: EditSession = sqlx::query_as(
        "UPDATE edit_sessions SET status = 'deployed', deployment_commit_hash = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(&outcome.commit_hash)
    .bind(session_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(EditSessionResponse::from(&session)))
}

async fn load_session(state: &AppState, id: i64) -> ApiResult<EditSession> {
    sqlx::query_as("SELECT * FROM edit_sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("edit session {id}")))
}

async fn count_operations(state: &AppState, session_id: i64) -> ApiResult<(i64, i64, i64)> {
    let rows: Vec<EditSessionOperation> =
        sqlx::query_as("SELECT * FROM edit_session_operations WHERE session_id = ?")
            .bind(session_id)
            .fetch_all(&state.db)
            .await?;
    let added = rows.iter().filter(|o| o.operation == "add").count() as i64;
    let removed = rows.iter().filter(|o| o.operation == "remove").count() as i64;
    let modified = rows.iter().filter(|o| o.operation == "modify").count() as i64;
    Ok((added, removed, modified))
}

/// Applies a session's staged operations onto the domain's currently active
/// entries, in-memory, without touching the DB — used by both preview and
/// validate so neither commits until deploy succeeds.
async fn merged_entries(state: &AppState, domain_id: i64, session_id: i64) -> ApiResult<Vec<SitemapEntry>> {
    let mut entries: Vec<SitemapEntry> =
        sqlx::query_as("SELECT * FROM sitemap_entries WHERE domain_id = ? AND status = 'active'")
            .bind(domain_id)
            .fetch_all(&state.db)
            .await?;

    let operations: Vec<EditSessionOperation> =
        sqlx::query_as("SELECT * FROM edit_session_operations WHERE session_id = ? ORDER BY id ASC")
            .bind(session_id)
            .fetch_all(&state.db)
            .await?;

    for op in operations {
        match SitemapOperation::from_str(&op.operation) {
            SitemapOperation::Remove => entries.retain(|e| e.location_url != op.location_url),
            SitemapOperation::Modify => {
                if let Some(existing) = entries.iter_mut().find(|e| e.location_url == op.location_url) {
                    existing.lastmod = op.lastmod.as_deref().and_then(parse_lastmod);
                    existing.changefreq = op.changefreq.clone();
                    existing.priority = op.priority;
                }
            },
            SitemapOperation::Add => {
                entries.retain(|e| e.location_url != op.location_url);
                entries.push(SitemapEntry {
                    id: 0,
                    domain_id,
                    location_hash: location_hash(&op.location_url),
                    location_url: op.location_url,
                    lastmod: op.lastmod.as_deref().and_then(parse_lastmod),
                    changefreq: op.changefreq,
                    priority: op.priority,
                    status: "pending-add".to_string(),
                    validation_errors: None,
                    http_status: None,
                    page_id: None,
                    ai_suggested: false,
                    created_at: Utc::now(),
                });
            },
        }
    }

    Ok(entries)
}

/// Persists the session's merged entry set as the domain's new active
/// sitemap, replacing whatever was active before (§6: the DB is the source
/// of truth, the generated document is a derived view of it).
async fn commit_entries(state: &AppState, domain_id: i64, session_id: i64) -> ApiResult<()> {
    let entries = merged_entries(state, domain_id, session_id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM sitemap_entries WHERE domain_id = ?").bind(domain_id).execute(&mut *tx).await?;
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO sitemap_entries
                (domain_id, location_url, location_hash, lastmod, changefreq, priority, status, page_id, ai_suggested)
            VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(domain_id)
        .bind(&entry.location_url)
        .bind(&entry.location_hash)
        .bind(entry.lastmod)
        .bind(&entry.changefreq)
        .bind(entry.priority)
        .bind(entry.page_id)
        .bind(entry.ai_suggested)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn parse_lastmod(s: &str) -> Option<chrono::DateTime<Utc>> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Deterministic, non-cryptographic URL hash for the `sitemap_entries`
/// uniqueness constraint (FNV-1a 64-bit, same scheme as the AI Analysis
/// Engine's context-hash cache keys).
fn location_hash(url: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in url.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:x}")
}
