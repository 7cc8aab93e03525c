//! Resume screening against a job description.
//!
//! Each resume is scored by one JSON-mode completion. A failed call or an
//! unusable reply becomes a zero-score "Service unavailable" row, so one
//! bad candidate never aborts the batch. Rows are also rendered as CSV.

use std::sync::Arc;

use anyhow::Result;
use curie_core::llm::{extract_json_object, ChatModel, CompletionOptions, PromptMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::extract::{extract_text, ExtractorChain};

pub const DEFAULT_CANDIDATE_NAME: &str = "candidate";
pub const MISSING_JOB_DESCRIPTION: &str = "Job description not provided.";
pub const UNAVAILABLE_REASON: &str = "Service unavailable";

const CSV_HEADER: [&str; 5] = ["candidate_name", "match", "strengths", "weaknesses", "reason"];
const LIST_SEPARATOR: &str = " | ";
const JD_SYSTEM_PROMPT: &str =
    "You write professional job descriptions. Use clear sections and bullet points.";

/// One candidate as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub name: String,
    #[serde(rename = "match")]
    pub score: i64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub reason: String,
}

impl MatchRow {
    fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            score: 0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            reason: UNAVAILABLE_REASON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub rows: Vec<MatchRow>,
    pub csv_text: String,
}

/// A file handed to the widget with its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Score every resume against `job_description`.
pub async fn match_resumes(
    llm: &dyn ChatModel,
    job_description: &str,
    resumes: &[ResumeInput],
) -> Result<MatchResult> {
    let mut rows = Vec::with_capacity(resumes.len());
    for resume in resumes {
        let name = if resume.name.is_empty() {
            DEFAULT_CANDIDATE_NAME
        } else {
            resume.name.as_str()
        };
        let messages = [PromptMessage::user(screening_prompt(job_description, &resume.text))];
        let row = match llm.complete(&messages, CompletionOptions::json()).await {
            Ok(reply) => parse_row(name, &reply).unwrap_or_else(|| {
                warn!(candidate = name, "unusable screening reply");
                MatchRow::unavailable(name)
            }),
            Err(e) => {
                warn!(candidate = name, error = %e, "screening call failed");
                MatchRow::unavailable(name)
            }
        };
        rows.push(row);
    }
    let csv_text = rows_to_csv(&rows)?;
    Ok(MatchResult { rows, csv_text })
}

/// Score a single resume, returning `(score, explanation)`.
pub async fn score_resume(
    llm: &dyn ChatModel,
    job_description: &str,
    resume_text: &str,
) -> Result<(i64, String)> {
    let resume = ResumeInput {
        name: DEFAULT_CANDIDATE_NAME.to_string(),
        text: resume_text.to_string(),
    };
    let result = match_resumes(llm, job_description, std::slice::from_ref(&resume)).await?;
    Ok(result
        .rows
        .into_iter()
        .next()
        .map(|row| (row.score, row.reason))
        .unwrap_or((0, UNAVAILABLE_REASON.to_string())))
}

fn screening_prompt(job_description: &str, resume_text: &str) -> String {
    format!(
        "You are a resume screening assistant.\n\
         Compare the following resume to the job description.\n\
         Return JSON with keys: match (0-100), reason, strengths (list), weaknesses (list).\n\
         Job Description:\n{}\n\
         Resume:\n{}\n",
        job_description, resume_text
    )
}

fn parse_row(name: &str, reply: &str) -> Option<MatchRow> {
    let data = extract_json_object(reply)?;
    let score = match data.get("match") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n.as_f64()? as i64,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()? as i64,
        Some(_) => return None,
    };
    Some(MatchRow {
        name: name.to_string(),
        score: score.clamp(0, 100),
        strengths: string_list(data.get("strengths")),
        weaknesses: string_list(data.get("weaknesses")),
        reason: data
            .get("reason")
            .map(crate::widgets::doc_gen::value_text)
            .unwrap_or_default(),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(crate::widgets::doc_gen::value_text).collect())
        .unwrap_or_default()
}

pub fn rows_to_csv(rows: &[MatchRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            row.name.clone(),
            row.score.to_string(),
            row.strengths.join(LIST_SEPARATOR),
            row.weaknesses.join(LIST_SEPARATOR),
            row.reason.clone(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("csv flush failed: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Filenames mentioning a job description are treated as one.
pub fn is_job_description_file(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ["job", "jd", "description"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Fill model-suggested resumes that have no text from `extracted`, in
/// order. Falls back to `extracted` when nothing was suggested.
pub fn merge_resumes(suggested: &[ResumeInput], extracted: Vec<ResumeInput>) -> Vec<ResumeInput> {
    let mut merged: Vec<ResumeInput> = Vec::with_capacity(suggested.len());
    let mut pending = extracted.iter();
    for resume in suggested {
        let mut name = if resume.name.is_empty() {
            format!("{}_{}", DEFAULT_CANDIDATE_NAME, merged.len() + 1)
        } else {
            resume.name.clone()
        };
        let mut text = resume.text.clone();
        if text.is_empty() {
            if let Some(file) = pending.next() {
                text = file.text.clone();
                if resume.name.is_empty() {
                    name = file.name.clone();
                }
            }
        }
        merged.push(ResumeInput { name, text });
    }
    if merged.is_empty() {
        return extracted;
    }
    merged
}

/// Screen uploaded files. Returns the result and the job description that
/// was used (empty when none was given or found).
///
/// An explicit `job_description` wins over JD-like files; only the first
/// JD-like file is read.
pub async fn match_resumes_from_files(
    llm: &dyn ChatModel,
    extractors: &Arc<ExtractorChain>,
    job_description: Option<&str>,
    files: &[UploadedFile],
    suggested: &[ResumeInput],
) -> Result<(MatchResult, String)> {
    let (jd_files, resume_files): (Vec<&UploadedFile>, Vec<&UploadedFile>) =
        files.iter().partition(|f| is_job_description_file(&f.filename));

    let mut final_jd = job_description.unwrap_or_default().trim().to_string();
    if final_jd.is_empty() {
        if let Some(file) = jd_files.first() {
            final_jd =
                extract_text(extractors, &file.filename, &file.content_type, file.bytes.clone())
                    .await;
        }
    }

    let mut extracted = Vec::with_capacity(resume_files.len());
    for f in &resume_files {
        extracted.push(ResumeInput {
            name: f.filename.clone(),
            text: extract_text(extractors, &f.filename, &f.content_type, f.bytes.clone()).await,
        });
    }
    debug!(
        jd_files = jd_files.len(),
        resumes = extracted.len(),
        "split uploaded files"
    );

    let resumes = merge_resumes(suggested, extracted);
    let jd = if final_jd.is_empty() {
        MISSING_JOB_DESCRIPTION
    } else {
        final_jd.as_str()
    };
    let result = match_resumes(llm, jd, &resumes).await?;
    Ok((result, final_jd))
}

/// Draft a job description from a role title and optional context.
pub async fn generate_job_description(
    llm: &dyn ChatModel,
    role_title: &str,
    department: Option<&str>,
    notes: Option<&str>,
) -> Result<String> {
    let mut parts = vec![format!("Role title: {}", role_title)];
    if let Some(department) = department.filter(|d| !d.is_empty()) {
        parts.push(format!("Department / domain: {}", department));
    }
    if let Some(notes) = notes.filter(|n| !n.is_empty()) {
        parts.push(format!("Extra notes / constraints: {}", notes));
    }
    let messages = [
        PromptMessage::system(JD_SYSTEM_PROMPT),
        PromptMessage::user(parts.join("\n")),
    ];
    llm.complete(&messages, CompletionOptions::default()).await
}
