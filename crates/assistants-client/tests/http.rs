//! End-to-end tests against a mock HTTP server using the reqwest transport.

use std::time::Duration;

use assistants_client::{
    AssistantsClient, CreateRunRequest, Error, ListOptions, ListOrder, PageToken, RequestOptions,
    RunStatus, ThreadMessage, ToolOutput, WaitOutcome,
    paging::MessagesScope,
};
use futures::StreamExt;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> AssistantsClient {
    AssistantsClient::builder()
        .base_url(format!("{}/v1", server.uri()))
        .auth_token("secret")
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
}

fn message(id: &str) -> Value {
    json!({"id": id, "thread_id": "thread_1", "role": "user", "created_at": 1})
}

fn run(status: &str) -> Value {
    json!({
        "id": "run_1",
        "thread_id": "thread_1",
        "assistant_id": "asst_1",
        "status": status,
        "created_at": 1,
    })
}

fn sse(events: &[(&str, Value)]) -> ResponseTemplate {
    let body: String = events
        .iter()
        .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
        .collect();
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

#[tokio::test]
async fn pagination_across_pages() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .and(header("authorization", "Bearer secret"))
        .and(query_param("limit", "2"))
        .and(query_param("order", "asc"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [message("msg_1"), message("msg_2")],
            "has_more": true,
            "first_id": "msg_1",
            "last_id": "msg_2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .and(query_param("after", "msg_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [message("msg_3")],
            "has_more": false,
            "first_id": "msg_3",
            "last_id": "msg_3",
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let messages = client.threads().messages(
        "thread_1",
        ListOptions::default()
            .with_page_size(2)
            .with_order(ListOrder::Ascending),
    );

    let ids: Vec<String> = messages
        .all_values(RequestOptions::new())
        .map(|message| message.map(|m: ThreadMessage| m.id))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;
    assert_eq!(ids, vec!["msg_1", "msg_2", "msg_3"]);

    // Resume from the second page's token as another process would.
    let stored = messages
        .first_page_token()
        .clone()
        .with_after("msg_2")
        .encode()?;
    let token = PageToken::<MessagesScope>::decode(&stored)?;
    let resumed = client.threads().messages_from_token(token);
    let page = resumed
        .get_page(resumed.first_page_token(), &RequestOptions::new())
        .await?;
    assert_eq!(page.values().len(), 1);
    assert!(page.next_page_token().is_none());
    Ok(())
}

#[tokio::test]
async fn failed_page_aborts_iteration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/assistants"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "asst_1", "created_at": 1}],
            "has_more": true,
            "last_id": "asst_1",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/assistants"))
        .and(query_param("after", "asst_1"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "try later", "type": "server_error", "code": "overloaded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let items: Vec<_> = client
        .assistants()
        .list(ListOptions::default())
        .all_values(RequestOptions::new())
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().id, "asst_1");
    match &items[1] {
        Err(Error::Api { status, code, .. }) => {
            assert_eq!(*status, 503);
            assert_eq!(code, "overloaded");
        }
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn missing_run_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "No run found", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let mut operation = client(&server)
        .threads()
        .run_operation("thread_1", "run_missing");
    let err = operation
        .poll_until_done(&RequestOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(operation.status(), None);
}

#[tokio::test]
async fn polling_run_with_tool_outputs() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs"))
        .and(body_partial_json(json!({"assistant_id": "asst_1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("queued")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("requires_action")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_partial_json(json!({"tool_outputs": [{"tool_call_id": "call_1", "output": "42"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("queued")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("completed")))
        .mount(&server)
        .await;

    let options = RequestOptions::new();
    let mut operation = client(&server)
        .threads()
        .create_run("thread_1", CreateRunRequest::new("asst_1"), &options)
        .await?;

    assert_eq!(operation.poll_until_done(&options).await?, WaitOutcome::ActionRequired);
    operation
        .submit_required_outputs(vec![ToolOutput::new("call_1", "42")], &options)
        .await?;
    assert_eq!(operation.poll_until_done(&options).await?, WaitOutcome::Completed);
    assert_eq!(operation.status(), Some(RunStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn streaming_run_over_sse() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(&[
            ("thread.run.created", run("queued")),
            ("thread.run.in_progress", run("in_progress")),
            ("thread.message.delta", json!({"delta": {"content": "thinking"}})),
            ("thread.run.requires_action", run("requires_action")),
        ]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(&[
            ("thread.run.queued", run("queued")),
            ("thread.run.completed", run("completed")),
            ("done", json!("[DONE]")),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let options = RequestOptions::new();
    let mut operation = client(&server)
        .threads()
        .create_run_streaming("thread_1", CreateRunRequest::new("asst_1"), &options)
        .await?;

    assert_eq!(operation.wait_for_completion(&options).await?, WaitOutcome::ActionRequired);
    assert!(!operation.has_open_stream());
    operation
        .submit_required_outputs(vec![ToolOutput::new("call_1", "42")], &options)
        .await?;
    assert_eq!(operation.wait_for_completion(&options).await?, WaitOutcome::Completed);
    assert!(operation.is_completed());
    assert_eq!(operation.run_id(), Some("run_1"));
    Ok(())
}

#[tokio::test]
async fn streaming_run_ending_early() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs"))
        .respond_with(sse(&[
            ("thread.run.created", run("queued")),
            ("thread.run.in_progress", run("in_progress")),
        ]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("completed")))
        .mount(&server)
        .await;

    let options = RequestOptions::new();
    let mut operation = client(&server)
        .threads()
        .create_run_streaming("thread_1", CreateRunRequest::new("asst_1"), &options)
        .await
        .unwrap();

    let err = operation.wait_for_completion(&options).await.unwrap_err();
    assert!(matches!(err, Error::IncompleteStream { .. }));
    assert!(!operation.is_completed());

    // Fall back to asking the server.
    let status = operation.wait_for_status_change(&options).await.unwrap();
    assert_eq!(status, Some(RunStatus::Completed));
}
