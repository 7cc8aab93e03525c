//! The conversation engine.
//!
//! Every user message is routed one of three ways:
//!
//! 1. **Greeting**: a canned reply, no model call.
//! 2. **Widget intent** (`resume_match`, `doc_gen`): an announcement message
//!    plus a `pending` [`ToolInvocation`] anchored to it. The widget runs
//!    later through an explicit run call.
//! 3. **RAG**: an answer grounded in the ingested documents, followed by a
//!    `Sources:` block.
//!
//! Invocations move `pending → completed | cancelled` exactly once. A
//! session has at most one pending invocation: every new user message
//! cancels the pending ones in the same store transaction that records it
//! (and, for a widget intent, the announcement and the new invocation).
//! Transitions are compare-and-set in the store, so a run that loses a race
//! reports [`Conflict::InvocationConsumed`].
//!
//! Sessions owned by someone else are reported as not found.

use std::collections::HashMap;
use std::sync::OnceLock;

use curie_core::error::{Conflict, Error, Result};
use curie_core::llm::{extract_json_object, ChatModel, CompletionOptions, PromptMessage};
use curie_core::models::{
    sanitize_title, ChatMessage, ChatSession, MessageView, RagAnswer, Role, ToolInvocation,
    ToolKind, ToolStatus, DEFAULT_SESSION_TITLE,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{now_ts, ServiceContext};
use crate::rag::answer_query;
use crate::storage::BlobStorage;
use crate::summary::summarize_if_needed;
use crate::widgets::resume_match::{self, MatchResult, ResumeInput, UploadedFile};
use crate::widgets::{announcement, doc_gen};

pub const GREETING_REPLY: &str = "Hello! How can I help you today?";
pub const WIDGET_CLOSED_REPLY: &str = "Okay, I’ve closed that widget. How can I help you today?";
pub const NO_ANSWER_REPLY: &str =
    "I couldn't find that in your documents, but I can still help. What would you like to do next?";

const INTENT_SYSTEM_PROMPT: &str = "You are an intent classifier for a chat application.\n\
You MUST respond with JSON of the form {\"intent\": \"resume_match\" | \"doc_gen\" | \"rag\"}.\n\
- Use \"resume_match\" if the user wants to compare/match/rank resumes/CVs against a job description, including candidate screening, ranking, shortlisting, etc.\n\
- Use \"doc_gen\" if the user wants to generate/fill a document from a template or says anything like \"document generation\", \"fill this template\", \"create a letter/report\" from a template.\n\
- Otherwise use \"rag\" for general Q&A or questions about documents/knowledge.\n\
Return ONLY JSON, no extra text.";

/// Where a user message is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Rag,
    Widget(ToolKind),
}

/// The stored user message and the assistant reply it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user_message: MessageView,
    pub assistant_message: MessageView,
}

/// Outcome of running a widget.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub invocation: ToolInvocation,
    pub assistant_message: Option<MessageView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeMatchRequest {
    pub job_description: String,
    #[serde(default)]
    pub resumes: Vec<ResumeInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocGenRequest {
    pub template: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

// ============ Sessions ============

pub async fn create_session(
    ctx: &ServiceContext,
    account_id: &str,
    title: Option<&str>,
) -> Result<ChatSession> {
    let title = title
        .and_then(|t| sanitize_title(t, ctx.config.conversation.title_max_chars))
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
    let session = ChatSession {
        id: Uuid::new_v4().to_string(),
        owner_id: account_id.to_string(),
        title,
        running_summary: None,
        created_at: now_ts(),
    };
    ctx.chats.create_session(&session).await?;
    info!(session_id = %session.id, account_id, "session created");
    Ok(session)
}

/// Sessions of `account_id`, newest first.
pub async fn list_sessions(ctx: &ServiceContext, account_id: &str) -> Result<Vec<ChatSession>> {
    Ok(ctx.chats.list_sessions(account_id).await?)
}

pub async fn get_session(ctx: &ServiceContext, account_id: &str, session_id: &str) -> Result<ChatSession> {
    match ctx.chats.get_session(session_id).await? {
        Some(session) if session.is_owned_by(account_id) => Ok(session),
        _ => Err(Error::not_found(format!("session {}", session_id))),
    }
}

/// Rename a session. A missing or blank title leaves it unchanged.
pub async fn rename_session(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    title: Option<&str>,
) -> Result<ChatSession> {
    let mut session = get_session(ctx, account_id, session_id).await?;
    let Some(title) = title.and_then(|t| sanitize_title(t, ctx.config.conversation.title_max_chars))
    else {
        return Ok(session);
    };
    ctx.chats.rename_session(session_id, &title).await?;
    session.title = title;
    Ok(session)
}

pub async fn delete_session(ctx: &ServiceContext, account_id: &str, session_id: &str) -> Result<()> {
    get_session(ctx, account_id, session_id).await?;
    ctx.chats.delete_session(session_id).await?;
    info!(session_id, "session deleted");
    Ok(())
}

/// Full history, oldest first, each message with the invocation it opened.
pub async fn list_messages(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
) -> Result<Vec<MessageView>> {
    get_session(ctx, account_id, session_id).await?;
    let mut by_trigger: HashMap<String, ToolInvocation> = ctx
        .chats
        .list_invocations(session_id)
        .await?
        .into_iter()
        .map(|inv| (inv.trigger_message_id.clone(), inv))
        .collect();
    let messages = ctx.chats.list_messages(session_id).await?;
    Ok(messages
        .into_iter()
        .map(|message| {
            let invocation = by_trigger.remove(&message.id);
            MessageView { message, invocation }
        })
        .collect())
}

// ============ Messages ============

/// Matches a bare greeting such as "hi", "Hello." or "good  morning".
pub fn is_greeting(text: &str) -> bool {
    static GREETING: OnceLock<Regex> = OnceLock::new();
    let re = GREETING.get_or_init(|| {
        Regex::new(r"^(?:hi|hello|hey|yo|good\s+(?:morning|afternoon|evening))\.?$")
            .expect("greeting pattern is valid")
    });
    re.is_match(&text.trim().to_lowercase())
}

/// Classify a message with one JSON-mode call. Anything unexpected is
/// treated as a RAG question.
pub async fn classify_intent(llm: &dyn ChatModel, content: &str) -> Intent {
    let messages = [
        PromptMessage::system(INTENT_SYSTEM_PROMPT),
        PromptMessage::user(format!("User message:\n{}", content)),
    ];
    let reply = match llm.complete(&messages, CompletionOptions::json()).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "intent classification failed; defaulting to rag");
            return Intent::Rag;
        }
    };
    let intent = extract_json_object(&reply)
        .and_then(|v| v.get("intent").and_then(Value::as_str).map(str::to_lowercase));
    match intent.as_deref() {
        Some("resume_match") => Intent::Widget(ToolKind::ResumeMatch),
        Some("doc_gen") => Intent::Widget(ToolKind::DocGen),
        Some("rag") => Intent::Rag,
        other => {
            warn!(intent = ?other, "unexpected classifier reply; defaulting to rag");
            Intent::Rag
        }
    }
}

/// Handle one user message and produce the assistant reply.
pub async fn post_user_message(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    content: &str,
) -> Result<Exchange> {
    get_session(ctx, account_id, session_id).await?;
    if content.trim().is_empty() {
        return Err(Error::InvalidRequest("message content is empty".to_string()));
    }

    let user_message = new_message(session_id, Role::User, content);

    if is_greeting(content) {
        let reply = new_message(session_id, Role::Assistant, GREETING_REPLY);
        record_turn(ctx, session_id, &[user_message.clone(), reply.clone()], None).await?;
        summarize_if_needed(ctx, session_id).await;
        return Ok(Exchange {
            user_message: user_message.into(),
            assistant_message: reply.into(),
        });
    }

    match classify_intent(ctx.llm.as_ref(), content).await {
        Intent::Widget(kind) => open_widget(ctx, session_id, user_message, kind).await,
        Intent::Rag => {
            record_turn(ctx, session_id, std::slice::from_ref(&user_message), None).await?;
            let answer = answer_query(ctx, content, ctx.config.retrieval.top_k).await?;
            let text = format_rag_reply(&answer, ctx.config.retrieval.preview_chars);
            let reply = append_message(ctx, session_id, Role::Assistant, &text).await?;
            summarize_if_needed(ctx, session_id).await;
            Ok(Exchange {
                user_message: user_message.into(),
                assistant_message: reply.into(),
            })
        }
    }
}

async fn open_widget(
    ctx: &ServiceContext,
    session_id: &str,
    user_message: ChatMessage,
    kind: ToolKind,
) -> Result<Exchange> {
    let reply = new_message(session_id, Role::Assistant, announcement(kind));
    let invocation = ToolInvocation {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        trigger_message_id: reply.id.clone(),
        kind,
        status: ToolStatus::Pending,
        input_payload: json!({ "source_user_message_id": user_message.id }),
        result_payload: None,
        created_at: now_ts(),
    };
    record_turn(
        ctx,
        session_id,
        &[user_message.clone(), reply.clone()],
        Some(&invocation),
    )
    .await?;
    info!(session_id, invocation_id = %invocation.id, kind = %kind, "widget opened");
    Ok(Exchange {
        user_message: user_message.into(),
        assistant_message: MessageView {
            message: reply,
            invocation: Some(invocation),
        },
    })
}

/// Answer text followed by a `Sources:` block with short previews.
pub fn format_rag_reply(answer: &RagAnswer, preview_chars: usize) -> String {
    let mut lines = Vec::with_capacity(answer.sources.len() + 3);
    if answer.answer.trim().is_empty() {
        lines.push(NO_ANSWER_REPLY.to_string());
    } else {
        lines.push(answer.answer.clone());
    }
    if !answer.sources.is_empty() {
        lines.push(String::new());
        lines.push("Sources:".to_string());
        for source in &answer.sources {
            let preview: String = source.snippet.chars().take(preview_chars).collect();
            lines.push(format!(
                "- doc {}, chunk {}: {}…",
                source.document_id, source.chunk_id, preview
            ));
        }
    }
    lines.join("\n")
}

fn new_message(session_id: &str, role: Role, content: &str) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        role,
        content: content.to_string(),
        created_at: now_ts(),
    }
}

async fn append_message(
    ctx: &ServiceContext,
    session_id: &str,
    role: Role,
    content: &str,
) -> Result<ChatMessage> {
    let message = new_message(session_id, role, content);
    ctx.chats.append_message(&message).await?;
    Ok(message)
}

/// Store a turn together with the cancellation of earlier pending widgets.
async fn record_turn(
    ctx: &ServiceContext,
    session_id: &str,
    messages: &[ChatMessage],
    invocation: Option<&ToolInvocation>,
) -> Result<()> {
    let cancelled = ctx.chats.record_turn(session_id, messages, invocation).await?;
    if cancelled > 0 {
        debug!(session_id, cancelled, "cancelled pending widgets");
    }
    Ok(())
}

// ============ Widgets ============

/// Load an invocation for a run, checking ownership, kind and status in
/// that order.
async fn pending_invocation(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
    expected: ToolKind,
) -> Result<ToolInvocation> {
    let invocation = session_invocation(ctx, account_id, session_id, invocation_id).await?;
    if invocation.kind != expected {
        return Err(Conflict::KindMismatch {
            invocation_id: invocation.id,
            expected,
            actual: invocation.kind,
        }
        .into());
    }
    if !invocation.is_pending() {
        return Err(Conflict::InvocationConsumed {
            invocation_id: invocation.id,
            status: invocation.status,
        }
        .into());
    }
    Ok(invocation)
}

async fn session_invocation(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
) -> Result<ToolInvocation> {
    get_session(ctx, account_id, session_id).await?;
    match ctx.chats.get_invocation(invocation_id).await? {
        Some(inv) if inv.session_id == session_id => Ok(inv),
        _ => Err(Error::not_found(format!("tool invocation {}", invocation_id))),
    }
}

/// Mark `invocation` completed with its payloads, post `summary_text`
/// and refresh the running summary.
async fn complete_run(
    ctx: &ServiceContext,
    invocation: ToolInvocation,
    input_payload: Value,
    result_payload: Value,
    summary_text: &str,
) -> Result<RunOutcome> {
    let won = ctx
        .chats
        .transition_invocation(
            &invocation.id,
            ToolStatus::Completed,
            Some(&input_payload),
            Some(&result_payload),
        )
        .await?;
    if !won {
        let status = ctx
            .chats
            .get_invocation(&invocation.id)
            .await?
            .map(|inv| inv.status)
            .unwrap_or(ToolStatus::Cancelled);
        warn!(invocation_id = %invocation.id, %status, "widget run lost a race");
        return Err(Conflict::InvocationConsumed {
            invocation_id: invocation.id,
            status,
        }
        .into());
    }

    let completed = ToolInvocation {
        status: ToolStatus::Completed,
        input_payload,
        result_payload: Some(result_payload),
        ..invocation
    };
    let message = append_message(ctx, &completed.session_id, Role::Assistant, summary_text).await?;
    info!(invocation_id = %completed.id, kind = %completed.kind, "widget completed");
    summarize_if_needed(ctx, &completed.session_id).await;
    Ok(RunOutcome {
        invocation: completed,
        assistant_message: Some(message.into()),
    })
}

fn resume_match_summary(result: &MatchResult) -> String {
    let mut lines = vec!["Here is a summary of the resume match results:".to_string()];
    for (idx, row) in result.rows.iter().enumerate() {
        lines.push(format!("{}. {} — match: {}%", idx + 1, row.name, row.score));
    }
    lines.join("\n")
}

fn resume_match_result(job_description: &str, result: &MatchResult) -> Value {
    json!({
        "job_description": job_description,
        "rows": result.rows,
        "csv_text": result.csv_text,
    })
}

pub async fn run_resume_match(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
    request: ResumeMatchRequest,
) -> Result<RunOutcome> {
    let invocation =
        pending_invocation(ctx, account_id, session_id, invocation_id, ToolKind::ResumeMatch).await?;

    let result = resume_match::match_resumes(ctx.llm.as_ref(), &request.job_description, &request.resumes).await?;
    let input = json!({
        "job_description": request.job_description,
        "resumes": request.resumes,
    });
    let output = resume_match_result(&request.job_description, &result);
    complete_run(ctx, invocation, input, output, &resume_match_summary(&result)).await
}

/// Resume match over uploaded files. Files are stored under the
/// invocation's trigger message before extraction.
pub async fn run_resume_match_from_files(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
    job_description: Option<&str>,
    files: Vec<UploadedFile>,
) -> Result<RunOutcome> {
    let invocation =
        pending_invocation(ctx, account_id, session_id, invocation_id, ToolKind::ResumeMatch).await?;

    let files: Vec<UploadedFile> = files.into_iter().filter(|f| !f.filename.is_empty()).collect();
    for file in &files {
        let path =
            BlobStorage::chat_upload_path(session_id, &invocation.trigger_message_id, &file.filename);
        ctx.blobs.save(&path, &file.bytes).await?;
    }

    let (result, final_jd) = resume_match::match_resumes_from_files(
        ctx.llm.as_ref(),
        &ctx.extractors,
        job_description,
        &files,
        &[],
    )
    .await?;

    let uploaded: Vec<Value> = files.iter().map(|f| json!({ "filename": f.filename })).collect();
    let input = json!({
        "job_description": job_description.unwrap_or_default(),
        "uploaded_files": uploaded,
    });
    let output = resume_match_result(&final_jd, &result);
    complete_run(ctx, invocation, input, output, &resume_match_summary(&result)).await
}

pub async fn run_doc_gen(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
    request: DocGenRequest,
) -> Result<RunOutcome> {
    let invocation =
        pending_invocation(ctx, account_id, session_id, invocation_id, ToolKind::DocGen).await?;

    let variables = request.variables.unwrap_or_default();
    let content = doc_gen::render(&request.template, &variables);
    let input = json!({
        "template": request.template,
        "variables": variables,
    });
    let output = json!({ "content": content });
    let text = format!("Here is the generated document:\n\n{}", content);
    complete_run(ctx, invocation, input, output, &text).await
}

/// Close a widget. Cancelling one that is already terminal changes nothing.
pub async fn cancel_invocation(
    ctx: &ServiceContext,
    account_id: &str,
    session_id: &str,
    invocation_id: &str,
) -> Result<ToolInvocation> {
    let invocation = session_invocation(ctx, account_id, session_id, invocation_id).await?;
    if invocation.status.is_terminal() {
        return Ok(invocation);
    }
    let won = ctx
        .chats
        .transition_invocation(invocation_id, ToolStatus::Cancelled, None, None)
        .await?;
    if !won {
        return ctx
            .chats
            .get_invocation(invocation_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("tool invocation {}", invocation_id)));
    }
    append_message(ctx, session_id, Role::Assistant, WIDGET_CLOSED_REPLY).await?;
    info!(session_id, invocation_id, "widget cancelled");
    Ok(ToolInvocation {
        status: ToolStatus::Cancelled,
        ..invocation
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use curie_core::models::Source;

    #[test]
    fn greetings() {
        for text in ["hi", "Hello", "  hey. ", "YO", "good morning", "Good   Evening."] {
            assert!(is_greeting(text), "{text}");
        }
        for text in ["hi there", "hello!", "good night", "hello.."] {
            assert!(!is_greeting(text), "{text}");
        }
    }

    #[test]
    fn rag_reply_lists_sources_with_previews() {
        let answer = RagAnswer {
            answer: "Payday is the 25th.".into(),
            sources: vec![Source {
                document_id: "d1".into(),
                chunk_id: "c1".into(),
                snippet: "x".repeat(300),
            }],
        };
        let text = format_rag_reply(&answer, 200);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Payday is the 25th.");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Sources:");
        assert_eq!(lines[3], format!("- doc d1, chunk c1: {}…", "x".repeat(200)));
    }

    #[test]
    fn empty_rag_answer_gets_fallback_text() {
        let answer = RagAnswer {
            answer: "  ".into(),
            sources: vec![],
        };
        assert_eq!(format_rag_reply(&answer, 200), NO_ANSWER_REPLY);
    }

    #[test]
    fn resume_summary_lines() {
        let result = MatchResult {
            rows: vec![resume_match::MatchRow {
                name: "ada".into(),
                score: 88,
                strengths: vec![],
                weaknesses: vec![],
                reason: String::new(),
            }],
            csv_text: String::new(),
        };
        assert_eq!(
            resume_match_summary(&result),
            "Here is a summary of the resume match results:\n1. ada — match: 88%"
        );
    }
}
