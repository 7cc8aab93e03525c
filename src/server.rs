//! HTTP server.
//!
//! A thin JSON layer over the service modules. The caller's identity comes
//! from the `x-account-id` header; authenticating that header is the job
//! of whatever sits in front of this server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/rag/documents` | Upload a document (multipart `file`, admin) |
//! | `GET`  | `/rag/documents` | List documents (admin) |
//! | `GET` / `DELETE` | `/rag/documents/{id}` | Fetch / delete a document (admin) |
//! | `POST` / `GET` | `/chat/sessions` | Create / list sessions |
//! | `GET` / `PATCH` / `DELETE` | `/chat/sessions/{id}` | Fetch / rename / delete a session |
//! | `GET` / `POST` | `/chat/sessions/{id}/messages` | History / send a message |
//! | `POST` | `/chat/sessions/{id}/tools/{inv}/resume-match` | Run resume match |
//! | `POST` | `/chat/sessions/{id}/tools/{inv}/resume-match/files` | Run resume match on uploads |
//! | `POST` | `/chat/sessions/{id}/tools/{inv}/doc-gen` | Run document generation |
//! | `POST` | `/chat/sessions/{id}/tools/{inv}/cancel` | Close a widget |
//!
//! With `server.expose_tools_http = true` the standalone widget endpoints
//! are mounted as well: `POST /tools/rag-query` (admin),
//! `/tools/document-generate`, `/tools/talent-recruitment` and
//! `/tools/generate-jd`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: session 42" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `not_found` | 404 |
//! | `exact_duplicate`, `semantic_duplicate`, `invocation_consumed`, `kind_mismatch` | 409 |
//! | `unparseable_input`, `invalid_request` | 400 |
//! | `forbidden` | 403 |
//! | `upstream_failure` | 502 |
//! | `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use curie_core::error::Error;
use curie_core::models::{ChatSession, Document, MessageView, ToolInvocation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::accounts::require_admin;
use crate::config::Config;
use crate::context::ServiceContext;
use crate::conversation::{self, DocGenRequest, Exchange, ResumeMatchRequest, RunOutcome};
use crate::ingest;
use crate::rag::answer_query;
use crate::widgets::{doc_gen, resume_match};

pub const ACCOUNT_HEADER: &str = "x-account-id";
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const OCTET_STREAM: &str = "application/octet-stream";

type AppState = Arc<ServiceContext>;

/// Starts the HTTP server on `[server].bind`.
///
/// Connects to the database (creating the schema if needed) and runs
/// until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = Arc::new(ServiceContext::from_config(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, storage = %ctx.blobs.resolve_root().display(), "server listening");
    println!("Curie server listening on http://{}", bind_addr);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// Build the application router around a ready context.
pub fn router(ctx: Arc<ServiceContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route(
            "/rag/documents",
            post(handle_upload_document).get(handle_list_documents),
        )
        .route(
            "/rag/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route(
            "/chat/sessions",
            post(handle_create_session).get(handle_list_sessions),
        )
        .route(
            "/chat/sessions/{id}",
            get(handle_get_session)
                .patch(handle_rename_session)
                .delete(handle_delete_session),
        )
        .route(
            "/chat/sessions/{id}/messages",
            get(handle_list_messages).post(handle_post_message),
        )
        .route(
            "/chat/sessions/{id}/tools/{inv}/resume-match",
            post(handle_run_resume_match),
        )
        .route(
            "/chat/sessions/{id}/tools/{inv}/resume-match/files",
            post(handle_run_resume_match_files),
        )
        .route(
            "/chat/sessions/{id}/tools/{inv}/doc-gen",
            post(handle_run_doc_gen),
        )
        .route(
            "/chat/sessions/{id}/tools/{inv}/cancel",
            post(handle_cancel_invocation),
        );

    if ctx.config.server.expose_tools_http {
        app = app
            .route("/tools/rag-query", post(handle_tool_rag_query))
            .route("/tools/document-generate", post(handle_tool_document_generate))
            .route("/tools/talent-recruitment", post(handle_tool_talent_recruitment))
            .route("/tools/generate-jd", post(handle_tool_generate_jd));
    }

    app.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"not_found"`, `"kind_mismatch"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::UnparseableInput(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::Upstream(_) => StatusCode::BAD_GATEWAY,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(code = err.code(), error = %format!("{err:#}"), "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    Error::InvalidRequest(message.into()).into()
}

// ============ Caller identity ============

/// The account making the request, from the `x-account-id` header.
struct Caller(String);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or_else(|| bad_request(format!("missing {} header", ACCOUNT_HEADER)))
    }
}

#[derive(Serialize)]
struct ListResponse<T> {
    items: Vec<T>,
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

/// A multipart file part.
struct FilePart {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Collect every part of a multipart body: files named `file_field` and
/// text fields by name.
async fn read_multipart(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<(Vec<FilePart>, Map<String, Value>), AppError> {
    let mut files = Vec::new();
    let mut fields = Map::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().unwrap_or(OCTET_STREAM).to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read part '{}': {}", name, e)))?;
        match filename {
            Some(filename) if name == file_field => files.push(FilePart {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            }),
            _ => {
                fields.insert(name, Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            }
        }
    }
    Ok((files, fields))
}

async fn handle_upload_document(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), AppError> {
    require_admin(&ctx, &account).await?;
    let (files, _) = read_multipart(multipart, "file").await?;
    let file = files
        .into_iter()
        .next()
        .ok_or_else(|| bad_request("multipart field 'file' is required"))?;
    let doc = ingest::ingest(&ctx, &account, &file.filename, &file.content_type, &file.bytes).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn handle_list_documents(
    State(ctx): State<AppState>,
    Caller(account): Caller,
) -> Result<Json<ListResponse<Document>>, AppError> {
    require_admin(&ctx, &account).await?;
    let items = ingest::list_documents(&ctx).await?;
    Ok(Json(ListResponse { items }))
}

async fn handle_get_document(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    require_admin(&ctx, &account).await?;
    Ok(Json(ingest::get_document(&ctx, &id).await?))
}

async fn handle_delete_document(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&ctx, &account).await?;
    ingest::delete_document(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Sessions ============

#[derive(Deserialize)]
struct TitleRequest {
    title: Option<String>,
}

async fn handle_create_session(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    body: Option<Json<TitleRequest>>,
) -> Result<(StatusCode, Json<ChatSession>), AppError> {
    let title = body.and_then(|Json(b)| b.title);
    let session = conversation::create_session(&ctx, &account, title.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn handle_list_sessions(
    State(ctx): State<AppState>,
    Caller(account): Caller,
) -> Result<Json<ListResponse<ChatSession>>, AppError> {
    let items = conversation::list_sessions(&ctx, &account).await?;
    Ok(Json(ListResponse { items }))
}

async fn handle_get_session(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, AppError> {
    Ok(Json(conversation::get_session(&ctx, &account, &id).await?))
}

async fn handle_rename_session(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
    Json(body): Json<TitleRequest>,
) -> Result<Json<ChatSession>, AppError> {
    let session = conversation::rename_session(&ctx, &account, &id, body.title.as_deref()).await?;
    Ok(Json(session))
}

async fn handle_delete_session(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    conversation::delete_session(&ctx, &account, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Messages ============

#[derive(Deserialize)]
struct MessageRequest {
    content: String,
}

async fn handle_list_messages(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
) -> Result<Json<ListResponse<MessageView>>, AppError> {
    let items = conversation::list_messages(&ctx, &account, &id).await?;
    Ok(Json(ListResponse { items }))
}

async fn handle_post_message(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<Exchange>, AppError> {
    let exchange = conversation::post_user_message(&ctx, &account, &id, &body.content).await?;
    Ok(Json(exchange))
}

// ============ Widgets ============

async fn handle_run_resume_match(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path((id, inv)): Path<(String, String)>,
    Json(body): Json<ResumeMatchRequest>,
) -> Result<Json<RunOutcome>, AppError> {
    let outcome = conversation::run_resume_match(&ctx, &account, &id, &inv, body).await?;
    Ok(Json(outcome))
}

/// Multipart: repeated `files` parts plus an optional `job_description`.
async fn handle_run_resume_match_files(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path((id, inv)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Json<RunOutcome>, AppError> {
    let (files, fields) = read_multipart(multipart, "files").await?;
    let job_description = fields.get("job_description").and_then(Value::as_str);
    let uploads = files
        .into_iter()
        .map(|f| resume_match::UploadedFile {
            filename: f.filename,
            content_type: f.content_type,
            bytes: f.bytes,
        })
        .collect();
    let outcome =
        conversation::run_resume_match_from_files(&ctx, &account, &id, &inv, job_description, uploads)
            .await?;
    Ok(Json(outcome))
}

async fn handle_run_doc_gen(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path((id, inv)): Path<(String, String)>,
    Json(body): Json<DocGenRequest>,
) -> Result<Json<RunOutcome>, AppError> {
    let outcome = conversation::run_doc_gen(&ctx, &account, &id, &inv, body).await?;
    Ok(Json(outcome))
}

async fn handle_cancel_invocation(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Path((id, inv)): Path<(String, String)>,
) -> Result<Json<ToolInvocation>, AppError> {
    let invocation = conversation::cancel_invocation(&ctx, &account, &id, &inv).await?;
    Ok(Json(invocation))
}

// ============ /tools ============

#[derive(Deserialize)]
struct RagQueryRequest {
    query: String,
    #[serde(default = "default_rag_limit")]
    limit: usize,
}

fn default_rag_limit() -> usize {
    5
}

async fn handle_tool_rag_query(
    State(ctx): State<AppState>,
    Caller(account): Caller,
    Json(body): Json<RagQueryRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&ctx, &account).await?;
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let answer = answer_query(&ctx, &body.query, body.limit.max(1)).await?;
    let sources: Vec<Value> = answer
        .sources
        .iter()
        .map(|s| json!({"document_id": s.document_id, "chunk_id": s.chunk_id, "text": s.snippet}))
        .collect();
    Ok(Json(json!({ "answer": answer.answer, "sources": sources })))
}

async fn handle_tool_document_generate(Json(body): Json<DocGenRequest>) -> Json<Value> {
    let variables = body.variables.unwrap_or_default();
    Json(json!({ "content": doc_gen::render(&body.template, &variables) }))
}

#[derive(Deserialize)]
struct TalentRequest {
    resume_text: String,
    job_description: String,
}

async fn handle_tool_talent_recruitment(
    State(ctx): State<AppState>,
    Json(body): Json<TalentRequest>,
) -> Result<Json<Value>, AppError> {
    let (score, explanation) =
        resume_match::score_resume(ctx.llm.as_ref(), &body.job_description, &body.resume_text)
            .await
            .map_err(Error::Internal)?;
    Ok(Json(json!({ "score": score, "explanation": explanation })))
}

#[derive(Deserialize)]
struct GenerateJdRequest {
    role_title: String,
    department: Option<String>,
    notes: Option<String>,
}

async fn handle_tool_generate_jd(
    State(ctx): State<AppState>,
    Json(body): Json<GenerateJdRequest>,
) -> Result<Json<Value>, AppError> {
    if body.role_title.trim().is_empty() {
        return Err(bad_request("role_title must not be empty"));
    }
    let content = resume_match::generate_job_description(
        ctx.llm.as_ref(),
        &body.role_title,
        body.department.as_deref(),
        body.notes.as_deref(),
    )
    .await
    .map_err(|e| Error::Upstream(format!("job description generation failed: {e:#}")))?;
    Ok(Json(json!({ "content": content })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use curie_core::error::Conflict;
    use curie_core::models::{ToolKind, ToolStatus};

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&Error::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Conflict::InvocationConsumed {
                invocation_id: "i".into(),
                status: ToolStatus::Completed,
            }
            .into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Conflict::KindMismatch {
                invocation_id: "i".into(),
                expected: ToolKind::ResumeMatch,
                actual: ToolKind::DocGen,
            }
            .into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::UnparseableInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&Error::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&Error::Internal(anyhow::anyhow!("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
