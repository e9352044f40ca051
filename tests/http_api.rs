//! HTTP API tests.
//!
//! Each test builds a console over a fresh SQLite mirror loaded from the
//! fixture export, serves it on a free port, and talks to it with
//! `reqwest`. Search, completion and stage procedures are replaced by
//! small axum services where a test needs them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use docdash::config::Config;
use docdash::console::Console;
use docdash::import::{import_rows, ExportFile};
use docdash::server;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const FIXTURE: &str = include_str!("fixtures/export.json");

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let db_path = tmp.path().join("docdash.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"
{}
"#,
        db_path.display(),
        extra
    );
    let cfg: Config = toml::from_str(&config_content).unwrap();
    docdash::config::validate(&cfg).unwrap();
    cfg
}

async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn wait_for_server(base: &str) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", base);
    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Open a console on `cfg`, load the fixture, and serve it.
async fn start_docdash(cfg: &Config) -> String {
    let console = Console::open(cfg).await.unwrap();
    let export: ExportFile = serde_json::from_str(FIXTURE).unwrap();
    import_rows(console.mirror(), export).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(server::serve(Arc::new(console), listener));
    wait_for_server(&base).await;
    base
}

/// OpenAI-compatible completion stub recording every prompt it receives.
async fn start_completion_stub(
    reply: &'static str,
    status: StatusCode,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));

    async fn handle(
        State((prompts, reply, status)): State<(Arc<Mutex<Vec<String>>>, &'static str, StatusCode)>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let prompt = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
        prompts.lock().unwrap().push(prompt);
        (
            status,
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            })),
        )
    }

    let app = Router::new()
        .route("/v1/chat/completions", post(handle))
        .with_state((prompts.clone(), reply, status));
    (spawn_app(app).await, prompts)
}

fn completion_section(endpoint: &str) -> String {
    format!(
        r#"
[completion]
provider = "openai"
endpoint = "{}/v1"
api_key_env = "DOCDASH_TEST_UNSET_KEY"
timeout_secs = 5
"#,
        endpoint
    )
}

// ─── Health / status ────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_version() {
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, "")).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_is_cached_until_refresh() {
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, "")).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["complete"], true);
    assert_eq!(first["cached"], false);
    assert_eq!(first["snapshot"]["documents"]["total"], 4);
    assert_eq!(first["snapshot"]["extracted_documents"], 2);

    let second: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["cached"], true);

    let refreshed: Value = client
        .post(format!("{}/status/refresh", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["cached"], false);
}

#[tokio::test]
async fn test_classes_and_documents() {
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, "")).await;

    let body: Value = reqwest::get(format!("{}/classes", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let labels: Vec<&str> = body["classes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["contract", "invoice"]);

    let body: Value = reqwest::get(format!("{}/documents/recent?limit=2", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let docs = body["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["document_id"], "doc-scan");

    let body: Value = reqwest::get(format!("{}/documents/doc-invoice?chunks=1", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["document_class"], "invoice");
    assert_eq!(body["attributes"].as_array().unwrap().len(), 4);
    assert_eq!(body["chunks"].as_array().unwrap().len(), 1);

    let resp = reqwest::get(format!("{}/documents/missing", base)).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

// ─── Review ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_review_flow() {
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, "")).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/documents/doc-invoice/review", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["threshold"], 0.5);
    let names: Vec<&str> = body["attributes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["due_date", "invoice_total", "po_number"]);
    assert_eq!(body["attributes"][0]["band"], "critical");

    let resp = client
        .post(format!(
            "{}/documents/doc-invoice/attributes/invoice_total/approve",
            base
        ))
        .json(&json!({"value": "12,062.00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/documents/doc-invoice/review/deny-all", base))
        .json(&json!({"threshold": 0.5}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["updated"], 1, "only due_date is still below 0.5");

    let body: Value = client
        .get(format!("{}/documents/doc-invoice/review?all=true", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attrs = body["attributes"].as_array().unwrap();
    let due = attrs.iter().find(|a| a["name"] == "due_date").unwrap();
    assert_eq!(due["value"], Value::Null);
    assert_eq!(due["confidence"], 0.0);
    let total = attrs.iter().find(|a| a["name"] == "invoice_total").unwrap();
    assert_eq!(total["value"], "12,062.00");
    assert_eq!(total["confidence"], 1.0);
}

#[tokio::test]
async fn test_review_errors_map_to_status() {
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, "")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/documents/doc-invoice/review?threshold=1.5", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation");
    assert_eq!(body["error"]["message"], "confidence threshold must be in [0, 1], got 1.5");

    for url in [
        format!("{}/documents/doc-invoice/review?threshold=abc", base),
        format!("{}/documents/recent?limit=-3", base),
    ] {
        let resp = client.get(url).send().await.unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "validation");
        assert!(body["error"]["message"].as_str().is_some());
    }

    let resp = client
        .post(format!("{}/documents/ghost/attributes/x/deny", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/documents/doc-invoice/attributes/tax_id/deny", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/documents/ghost/review/approve-all", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ─── Answering ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_with_local_search_and_completion() {
    let (completion, prompts) =
        start_completion_stub("The invoice total is 12,062 USD.", StatusCode::OK).await;
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, &completion_section(&completion))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"question": "What is the Acme invoice total?", "class": "invoice"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer_text"], "The invoice total is 12,062 USD.");
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s["document_class"] == "invoice"));

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("What is the Acme invoice total?"));
    assert!(prompts[0].contains("Document: invoice_0419.pdf (Class: invoice)"));
    assert!(!prompts[0].contains("Initech"), "class filter keeps contracts out");
}

#[tokio::test]
async fn test_ask_without_hits_never_calls_completion() {
    let (completion, prompts) = start_completion_stub("unused", StatusCode::OK).await;
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, &completion_section(&completion))).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"question": "zebra quantum"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["answer_text"]
        .as_str()
        .unwrap()
        .contains("couldn't find any relevant documents"));
    assert!(body["sources"].as_array().unwrap().is_empty());
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_ask_validation_and_completion_failure() {
    let (completion, _) = start_completion_stub("boom", StatusCode::INTERNAL_SERVER_ERROR).await;
    let tmp = TempDir::new().unwrap();
    let base = start_docdash(&test_config(&tmp, &completion_section(&completion))).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "invoice", "limit": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "invoice payment terms"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "transient");
}

#[tokio::test]
async fn test_ask_through_remote_search_service() {
    async fn query(
        Path(service): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if service != "document_search_service" {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "no such service"})));
        }
        assert_eq!(body["filter"]["@eq"]["document_class"], "contract");
        assert_eq!(body["limit"], 2);
        (
            StatusCode::OK,
            Json(json!({"results": [
                {"document_id": "remote-2", "file_name": "b.pdf", "document_class": "contract",
                 "chunk_index": 4, "chunk_text": "second"},
                {"document_id": "remote-1", "file_name": "a.pdf", "document_class": "contract",
                 "chunk_index": 0, "chunk_text": "first"}
            ]})),
        )
    }
    let search = spawn_app(Router::new().route("/services/{service}/query", post(query))).await;
    let (completion, _) = start_completion_stub("Remote answer.", StatusCode::OK).await;

    let tmp = TempDir::new().unwrap();
    let extra = format!(
        "{}\n[search]\nprovider = \"http\"\nendpoint = \"{}\"\n",
        completion_section(&completion),
        search
    );
    let base = start_docdash(&test_config(&tmp, &extra)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"question": "who are the parties?", "class": "contract", "limit": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["answer_text"], "Remote answer.");
    // Relevance order from the service is kept.
    assert_eq!(body["sources"][0]["document_id"], "remote-2");
    assert_eq!(body["sources"][1]["document_id"], "remote-1");

    // Point at a service name the stub does not know.
    let tmp2 = TempDir::new().unwrap();
    let extra = format!(
        "{}\n[search]\nprovider = \"http\"\nendpoint = \"{}\"\nservice = \"missing\"\n",
        completion_section(&completion),
        search
    );
    let base = start_docdash(&test_config(&tmp2, &extra)).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"question": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_remote_search_results_capped_at_limit() {
    async fn query(Json(_): Json<Value>) -> Json<Value> {
        let results: Vec<Value> = (0..6)
            .map(|i| {
                json!({"document_id": format!("remote-{}", i), "file_name": format!("{}.pdf", i),
                       "document_class": "invoice", "chunk_index": 0, "chunk_text": "total"})
            })
            .collect();
        Json(json!({ "results": results }))
    }
    let search = spawn_app(Router::new().route("/services/{service}/query", post(query))).await;
    let (completion, prompts) = start_completion_stub("Capped.", StatusCode::OK).await;

    let tmp = TempDir::new().unwrap();
    let extra = format!(
        "{}\n[search]\nprovider = \"http\"\nendpoint = \"{}\"\n",
        completion_section(&completion),
        search
    );
    let base = start_docdash(&test_config(&tmp, &extra)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"question": "total?", "limit": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<_> = body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["document_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["remote-0", "remote-1"]);
    assert!(!prompts.lock().unwrap()[0].contains("2.pdf"));
}

// ─── Pipeline ───────────────────────────────────────────────────────

async fn start_procedure_stub(failing: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));

    async fn handle(
        State((calls, failing)): State<(Arc<Mutex<Vec<String>>>, &'static str)>,
        Path(procedure): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        calls.lock().unwrap().push(procedure.clone());
        if procedure == failing {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "warehouse suspended"})),
            );
        }
        (StatusCode::OK, Json(json!({"result": format!("{} done", procedure)})))
    }

    let app = Router::new()
        .route("/procedures/{procedure}", post(handle))
        .with_state((calls.clone(), failing));
    (spawn_app(app).await, calls)
}

#[tokio::test]
async fn test_pipeline_full_run_stops_at_failed_stage() {
    let (procedures, calls) = start_procedure_stub("classify_parsed_documents").await;
    let tmp = TempDir::new().unwrap();
    let extra = format!("\n[pipeline]\nrunner = \"http\"\nendpoint = \"{}\"\n", procedures);
    let base = start_docdash(&test_config(&tmp, &extra)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/pipeline/full", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let reports = body["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["stage"], "parse");
    assert_eq!(reports[0]["outcome"], "succeeded");
    assert_eq!(reports[0]["message"], "parse_new_documents done");
    assert_eq!(reports[1]["stage"], "classify");
    assert_eq!(reports[1]["outcome"], "failed");
    assert!(reports[1]["error"].as_str().unwrap().contains("warehouse suspended"));

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["parse_new_documents", "classify_parsed_documents"]
    );
}

#[tokio::test]
async fn test_pipeline_single_stage() {
    let (procedures, _) = start_procedure_stub("classify_parsed_documents").await;
    let tmp = TempDir::new().unwrap();
    let extra = format!("\n[pipeline]\nrunner = \"http\"\nendpoint = \"{}\"\n", procedures);
    let base = start_docdash(&test_config(&tmp, &extra)).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/pipeline/chunk", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["stage"], "chunk");
    assert_eq!(body["message"], "chunk_classified_documents done");

    let resp = client
        .post(format!("{}/pipeline/classify", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let resp = client
        .post(format!("{}/pipeline/embed", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
