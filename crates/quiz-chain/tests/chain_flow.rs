//! End-to-end chain runs against mock challenge and submission servers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_chain::{
    ChainConfig, ChainController, ChainOutcome, ChainState, ChallengeTask, HttpClient,
    HttpRenderer, ReasoningService,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers with the first reply whose marker occurs in the prompt.
struct ScriptedReasoner {
    replies: Vec<(&'static str, String)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    fn new(replies: Vec<(&'static str, serde_json::Value)>) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .into_iter()
                .map(|(marker, reply)| (marker, format!("```json\n{reply}\n```")))
                .collect(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete(&self, _contract: &str, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .iter()
            .find(|(marker, _)| prompt.contains(marker))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for prompt"))
    }
}

fn controller(reasoner: Arc<ScriptedReasoner>, config: ChainConfig) -> ChainController {
    let renderer = Arc::new(HttpRenderer::new(HttpClient::default()));
    ChainController::new(config, renderer, reasoner)
}

fn task(server: &MockServer, page: &str) -> ChallengeTask {
    ChallengeTask::new(format!("{}{page}", server.uri()), "me@example.com", "s3cret")
}

async fn mount_page(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Quiz 1 needs a CSV sum and points to quiz 2; quiz 2 is a literal answer.
async fn mount_two_step_chain(server: &MockServer) {
    mount_page(
        server,
        "/quiz/1",
        r#"<html><body><p>Quiz 1. Sum amounts above 42669 in <a href="data.csv">the file</a>.</p>
        <p>POST your answer to /submit</p></body></html>"#,
    )
    .await;
    mount_page(server, "/quiz/data.csv", "name,amount\na,20\nb,60000\nc,100000").await;
    mount_page(
        server,
        "/quiz/2",
        "<html><body><p>Quiz 2. The secret code is alpha-7. POST it to /submit</p></body></html>",
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(json!({
            "url": format!("{}/quiz/1", server.uri()),
            "answer": 160000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "correct": true,
            "url": "/quiz/2"
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn two_step_replies() -> Vec<(&'static str, serde_json::Value)> {
    vec![
        (
            "Quiz 1.",
            json!({
                "submission_url": "/submit",
                "script": "rows = csv.DictReader('name,amount\\na,20\\nb,60000\\nc,100000')\nanswer = sum(int(r['amount']) for r in rows if int(r['amount']) > 42669)"
            }),
        ),
        (
            "Quiz 2.",
            json!({"submission_url": "/submit", "script": "answer = 'alpha-7'"}),
        ),
    ]
}

#[tokio::test]
async fn test_chain_follows_until_reply_has_no_url() {
    let server = MockServer::start().await;
    mount_two_step_chain(&server).await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(json!({
            "email": "me@example.com",
            "secret": "s3cret",
            "url": format!("{}/quiz/2", server.uri()),
            "answer": "alpha-7"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"correct": true})))
        .expect(1)
        .mount(&server)
        .await;

    let reasoner = ScriptedReasoner::new(two_step_replies());
    let report = controller(reasoner.clone(), ChainConfig::default())
        .run(task(&server, "/quiz/1"))
        .await;

    assert_eq!(report.outcome, ChainOutcome::Complete);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].answer, json!(160000));
    assert_eq!(report.steps[0].submission_url, format!("{}/submit", server.uri()));
    assert_eq!(
        report.steps[0].next_url.as_deref(),
        Some(format!("{}/quiz/2", server.uri()).as_str())
    );
    assert_eq!(report.steps[1].answer, json!("alpha-7"));
    assert_eq!(report.steps[1].next_url, None);

    let prompts = reasoner.prompts();
    assert!(prompts[0].contains("b,60000"), "corpus missing from prompt");
}

#[tokio::test]
async fn test_hop_limit_stops_chain() {
    let server = MockServer::start().await;
    mount_two_step_chain(&server).await;

    let config = ChainConfig {
        max_hops: 1,
        ..ChainConfig::default()
    };
    let report = controller(ScriptedReasoner::new(two_step_replies()), config)
        .run(task(&server, "/quiz/1"))
        .await;

    assert_eq!(report.steps.len(), 1);
    assert!(matches!(
        report.outcome,
        ChainOutcome::Failed {
            stage: ChainState::Following,
            ..
        }
    ));
}

#[tokio::test]
async fn test_revisited_url_is_a_cycle() {
    let server = MockServer::start().await;
    mount_page(&server, "/loop", "<p>Loop quiz. POST to /submit</p>").await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "/loop"})))
        .expect(1)
        .mount(&server)
        .await;

    let reasoner = ScriptedReasoner::new(vec![(
        "Loop quiz",
        json!({"submission_url": "/submit", "script": "answer = 1"}),
    )]);
    let report = controller(reasoner, ChainConfig::default())
        .run(task(&server, "/loop"))
        .await;

    assert_eq!(report.steps.len(), 1);
    match report.outcome {
        ChainOutcome::Failed { stage, error } => {
            assert_eq!(stage, ChainState::Following);
            assert!(error.contains("revisited"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_error_status_fails_chain() {
    let server = MockServer::start().await;
    mount_page(&server, "/quiz", "<p>Status quiz. POST to /submit</p>").await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let reasoner = ScriptedReasoner::new(vec![(
        "Status quiz",
        json!({"submission_url": "/submit", "script": "answer = 2 + 2"}),
    )]);
    let report = controller(reasoner, ChainConfig::default())
        .run(task(&server, "/quiz"))
        .await;

    assert!(report.steps.is_empty());
    match report.outcome {
        ChainOutcome::Failed { stage, error } => {
            assert_eq!(stage, ChainState::Submitting);
            assert!(error.contains("HTTP 500"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_submission_reply_fails_chain() {
    let server = MockServer::start().await;
    mount_page(&server, "/quiz", "<p>Html quiz. POST to /submit</p>").await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let reasoner = ScriptedReasoner::new(vec![(
        "Html quiz",
        json!({"submission_url": "/submit", "script": "answer = 'x'"}),
    )]);
    let report = controller(reasoner, ChainConfig::default())
        .run(task(&server, "/quiz"))
        .await;

    match report.outcome {
        ChainOutcome::Failed { stage, error } => {
            assert_eq!(stage, ChainState::Submitting);
            assert!(error.contains("non-JSON"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_script_fault_is_not_submitted() {
    let server = MockServer::start().await;
    mount_page(&server, "/quiz", "<p>Fault quiz. POST to /submit</p>").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let reasoner = ScriptedReasoner::new(vec![(
        "Fault quiz",
        json!({"submission_url": "/submit", "script": "import os\nanswer = os.getcwd()"}),
    )]);
    let report = controller(reasoner, ChainConfig::default())
        .run(task(&server, "/quiz"))
        .await;

    match report.outcome {
        ChainOutcome::Failed { stage, error } => {
            assert_eq!(stage, ChainState::Executing);
            assert!(error.contains("import"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_reply_fails_in_reasoning() {
    let server = MockServer::start().await;
    mount_page(&server, "/quiz", "<p>Vague quiz.</p>").await;

    let reasoner = ScriptedReasoner::new(vec![("Vague quiz", json!({"script": "answer = 1"}))]);
    let report = controller(reasoner, ChainConfig::default())
        .run(task(&server, "/quiz"))
        .await;

    assert!(matches!(
        report.outcome,
        ChainOutcome::Failed {
            stage: ChainState::Reasoning,
            ..
        }
    ));
}
