//! HTTP surface tests against a router bound to an ephemeral port.

mod common;

use std::sync::Arc;

use common::{no_embedder, sqlite_context, ScriptedModel};
use curie::{accounts, server};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

const ADMIN: &str = "root-admin";
const USER: &str = "plain-user";

struct TestServer {
    base: String,
    client: reqwest::Client,
    _tmp: TempDir,
}

impl TestServer {
    async fn start(extra_config: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let ctx = sqlite_context(&tmp, extra_config, no_embedder(), ScriptedModel::new()).await;
        accounts::set_role(&ctx, ADMIN, "admin").await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server::router(Arc::new(ctx));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            _tmp: tmp,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn post(&self, account: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(server::ACCOUNT_HEADER, account)
    }

    fn get(&self, account: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(server::ACCOUNT_HEADER, account)
    }

    async fn new_session(&self, account: &str) -> String {
        let resp = self
            .post(account, "/chat/sessions")
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }
}

fn text_file(field: &str, filename: &str, text: &str) -> Form {
    Form::new().part(
        field.to_string(),
        Part::bytes(text.as_bytes().to_vec())
            .file_name(filename.to_string())
            .mime_str("text/plain")
            .unwrap(),
    )
}

#[tokio::test]
async fn test_health() {
    let srv = TestServer::start("").await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_account_header_is_bad_request() {
    let srv = TestServer::start("").await;
    let resp = srv
        .client
        .get(srv.url("/chat/sessions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("x-account-id"));
}

#[tokio::test]
async fn test_document_upload_requires_admin() {
    let srv = TestServer::start("").await;

    let resp = srv
        .post(USER, "/rag/documents")
        .multipart(text_file("file", "policy.txt", "Leave policy: 25 days"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "forbidden");

    let resp = srv
        .post(ADMIN, "/rag/documents")
        .multipart(text_file("file", "policy.txt", "Leave policy: 25 days"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let doc: Value = resp.json().await.unwrap();
    assert_eq!(doc["filename"], "policy.txt");
    assert_eq!(doc["uploader_id"], ADMIN);
    let id = doc["id"].as_str().unwrap().to_string();

    let resp = srv
        .post(ADMIN, "/rag/documents")
        .multipart(text_file("file", "again.txt", "leave  policy: 25 DAYS"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "exact_duplicate");

    let list: Value = srv
        .get(ADMIN, "/rag/documents")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["items"].as_array().unwrap().len(), 1);

    let resp = srv
        .client
        .delete(srv.url(&format!("/rag/documents/{}", id)))
        .header(server::ACCOUNT_HEADER, ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = srv
        .get(ADMIN, &format!("/rag/documents/{}", id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_widget_flow_over_http() {
    let srv = TestServer::start("").await;
    let sid = srv.new_session(USER).await;

    let resp = srv
        .post(USER, &format!("/chat/sessions/{}/messages", sid))
        .json(&json!({"content": "fill a template for me"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let exchange: Value = resp.json().await.unwrap();
    assert_eq!(exchange["user_message"]["role"], "user");
    let invocation = &exchange["assistant_message"]["invocation"];
    assert_eq!(invocation["kind"], "doc_gen");
    assert_eq!(invocation["status"], "pending");
    let inv = invocation["id"].as_str().unwrap().to_string();

    let resp = srv
        .post(USER, &format!("/chat/sessions/{}/tools/{}/resume-match", sid, inv))
        .json(&json!({"job_description": "x", "resumes": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "kind_mismatch");

    let run_path = format!("/chat/sessions/{}/tools/{}/doc-gen", sid, inv);
    let resp = srv
        .post(USER, &run_path)
        .json(&json!({"template": "Hi {who}", "variables": {"who": "team"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["invocation"]["status"], "completed");
    assert_eq!(outcome["invocation"]["result_payload"]["content"], "Hi team");

    let resp = srv
        .post(USER, &run_path)
        .json(&json!({"template": "again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invocation_consumed");

    let history: Value = srv
        .get(USER, &format!("/chat/sessions/{}/messages", sid))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = history["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1]["invocation"]["status"], "completed");
    assert!(items[2]["invocation"].is_null());

    // Someone else's session looks absent.
    let resp = srv
        .get(ADMIN, &format!("/chat/sessions/{}", sid))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resume_match_files_over_http() {
    let srv = TestServer::start("").await;
    let sid = srv.new_session(USER).await;
    let exchange: Value = srv
        .post(USER, &format!("/chat/sessions/{}/messages", sid))
        .json(&json!({"content": "rank these resumes"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let inv = exchange["assistant_message"]["invocation"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let form = text_file("files", "ada.txt", "Ada: Rust, Postgres")
        .text("job_description", "Platform engineer");
    let resp = srv
        .post(USER, &format!("/chat/sessions/{}/tools/{}/resume-match/files", sid, inv))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = resp.json().await.unwrap();
    let result = &outcome["invocation"]["result_payload"];
    assert_eq!(result["job_description"], "Platform engineer");
    assert_eq!(result["rows"][0]["name"], "ada.txt");
    assert_eq!(result["rows"][0]["match"], 75);
}

#[tokio::test]
async fn test_session_rename_and_delete() {
    let srv = TestServer::start("").await;

    let resp = srv
        .post(USER, "/chat/sessions")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session: Value = resp.json().await.unwrap();
    assert_eq!(session["title"], "New chat");
    let sid = session["id"].as_str().unwrap().to_string();

    let renamed: Value = srv
        .client
        .patch(srv.url(&format!("/chat/sessions/{}", sid)))
        .header(server::ACCOUNT_HEADER, USER)
        .json(&json!({"title": "Offer letters"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["title"], "Offer letters");

    let resp = srv
        .client
        .delete(srv.url(&format!("/chat/sessions/{}", sid)))
        .header(server::ACCOUNT_HEADER, USER)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let list: Value = srv
        .get(USER, "/chat/sessions")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tools_routes_hidden_by_default() {
    let srv = TestServer::start("").await;
    let resp = srv
        .post(USER, "/tools/document-generate")
        .json(&json!({"template": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tools_routes_when_exposed() {
    let srv = TestServer::start("[server]\nbind = \"127.0.0.1:0\"\nexpose_tools_http = true").await;

    let body: Value = srv
        .post(USER, "/tools/document-generate")
        .json(&json!({"template": "{a} and {{b}}", "variables": {"a": 1}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["content"], "1 and {b}");

    let body: Value = srv
        .post(USER, "/tools/talent-recruitment")
        .json(&json!({"resume_text": "Rust", "job_description": "Rust dev"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["score"], 75);
    assert_eq!(body["explanation"], "solid");

    let resp = srv
        .post(USER, "/tools/rag-query")
        .json(&json!({"query": "payroll"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: Value = srv
        .post(ADMIN, "/tools/rag-query")
        .json(&json!({"query": "payroll"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["answer"], "No relevant documents found.");
    assert!(body["sources"].as_array().unwrap().is_empty());
}
