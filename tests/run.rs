//! Prompt-and-wait runs against a fake agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use libpi::managed::{classify_managed, classify_run_error, BrokenCause, CompletionClass};
use libpi::protocol::TerminalStatus;
use libpi::{Context, Error, SubscriptionPolicy};
use serde_json::json;
use tokio::sync::Notify;

use common::{agent_end, connect, fail_response, ok_response, Scenario, WAIT};

#[tokio::test]
async fn run_returns_final_text_and_usage() {
    let (client, agent) = connect();
    let server = agent.serve(|request| match request["type"].as_str() {
        Some("prompt") => Scenario::accepted(request)
            .agent_start()
            .event(json!({"type": "message_update", "assistantMessageEvent": {"type": "text_delta", "delta": "4"}}))
            .agent_end("2 + 2 = 4")
            .build(),
        _ => vec![ok_response(request, None)],
    });

    let result = client.run(&Context::new(), "What is 2+2?").await.unwrap();
    assert_eq!(result.text, "2 + 2 = 4");
    let usage = result.usage.unwrap();
    assert_eq!(usage.input, 12);
    assert_eq!(usage.output, 4);

    client.close().await.unwrap();
    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["message"], "What is 2+2?");
}

#[tokio::test]
async fn run_detailed_captures_recovery_signals() {
    let (client, agent) = connect();
    let _server = agent.serve(|request| {
        Scenario::accepted(request)
            .agent_start()
            .retry(1)
            .retry(2)
            .compaction("overflow")
            .agent_end("recovered answer")
            .build()
    });

    let result = client
        .run_detailed(&Context::new(), "long task")
        .await
        .unwrap();
    assert_eq!(result.outcome.status, TerminalStatus::Completed);
    assert_eq!(result.outcome.text, "recovered answer");
    assert_eq!(result.auto_retry_start.as_ref().unwrap().attempt, 2);
    assert!(result.auto_retry_end.as_ref().unwrap().success);
    assert_eq!(result.auto_compaction_start.as_ref().unwrap().reason, "overflow");
    assert_eq!(
        result
            .auto_compaction_end
            .as_ref()
            .unwrap()
            .result
            .as_ref()
            .unwrap()
            .tokens_before,
        190000
    );

    let summary = classify_managed(&result);
    assert_eq!(summary.class, CompletionClass::OkAfterRecovery);
    assert!(summary.facts.recovered);
}

#[tokio::test]
async fn rejected_prompt_fails_run() {
    let (client, agent) = connect();
    let _server = agent.serve(|request| vec![fail_response(request, "agent is busy")]);

    let err = client.run(&Context::new(), "hello").await.unwrap_err();
    assert!(matches!(err, Error::Rpc { ref message, .. } if message == "agent is busy"));
    assert_eq!(classify_run_error(&err), None);
}

#[tokio::test]
async fn asynchronous_prompt_failure_fails_run() {
    let (client, agent) = connect();
    let _server = agent.serve(|request| {
        Scenario::accepted(request)
            .agent_start()
            .event(fail_response(request, "model overloaded"))
            .build()
    });

    let err = tokio::time::timeout(WAIT, client.run(&Context::new(), "hello"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Rpc { ref command, ref message, .. } if command == "prompt" && message == "model overloaded"
    ));
}

#[tokio::test]
async fn second_run_is_rejected_while_first_is_active() {
    let (client, agent) = connect();
    let client = Arc::new(client);
    let started = Arc::new(Notify::new());
    let _server = {
        let started = Arc::clone(&started);
        agent.serve(move |request| {
            started.notify_one();
            Scenario::accepted(request).agent_start().build()
        })
    };

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run(&Context::new(), "first").await })
    };
    tokio::time::timeout(WAIT, started.notified()).await.unwrap();

    assert!(matches!(
        client.run(&Context::new(), "second").await,
        Err(Error::RunInProgress)
    ));

    client.close().await.unwrap();
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ClientClosed));
    assert_eq!(classify_run_error(&err), Some(BrokenCause::ClientRuntime));
}

#[tokio::test]
async fn abort_ends_run_as_aborted() {
    let (client, agent) = connect();
    let client = Arc::new(client);
    let started = Arc::new(Notify::new());
    let _server = {
        let started = Arc::clone(&started);
        agent.serve(move |request| match request["type"].as_str() {
            Some("prompt") => {
                started.notify_one();
                Scenario::accepted(request).agent_start().build()
            }
            _ => vec![
                ok_response(request, None),
                agent_end("aborted by helper", "aborted", "Request was aborted"),
            ],
        })
    };

    let run = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run_detailed(&Context::new(), "long job").await })
    };
    tokio::time::timeout(WAIT, started.notified()).await.unwrap();
    client.abort(&Context::new()).await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.outcome.status, TerminalStatus::Aborted);
    assert_eq!(result.outcome.text, "aborted by helper");
    assert_eq!(classify_managed(&result).class, CompletionClass::Aborted);
}

#[tokio::test]
async fn cancelled_run_sends_abort_before_returning() {
    let (client, agent) = connect();
    let client = Arc::new(client);
    let mut events = client.subscribe(SubscriptionPolicy::block(16)).unwrap();
    let server = agent.serve(|request| match request["type"].as_str() {
        Some("prompt") => Scenario::accepted(request).agent_start().build(),
        Some("get_state") => vec![ok_response(
            request,
            Some(json!({"sessionId": "s", "model": {"contextWindow": 1000}})),
        )],
        _ => vec![ok_response(request, None)],
    });

    let ctx = Context::new();
    let run = {
        let client = Arc::clone(&client);
        let ctx = ctx.clone();
        tokio::spawn(async move { client.run(&ctx, "never finishes").await })
    };
    // agent_start follows the prompt response, so the prompt was accepted.
    loop {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if event.is("agent_start") {
            break;
        }
    }
    events.cancel();
    ctx.cancel();

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(classify_run_error(&err), None);

    // The run slot is free again and the client still works.
    client.get_state(&Context::new()).await.unwrap();
    client.close().await.unwrap();

    let seen = server.await.unwrap();
    let kinds: Vec<_> = seen.iter().map(|r| r["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["prompt", "abort", "get_state"]);
}

#[tokio::test]
async fn run_deadline_is_reported_as_timeout() {
    let (client, agent) = connect();
    let _server = agent.serve(|request| match request["type"].as_str() {
        Some("prompt") => Scenario::accepted(request).agent_start().build(),
        _ => vec![ok_response(request, None)],
    });

    let ctx = Context::with_timeout(Duration::from_millis(100));
    let err = client.run(&ctx, "slow").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn process_death_during_run() {
    let (client, mut agent) = connect();
    let client = Arc::new(client);

    let run = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run(&Context::new(), "hello").await })
    };
    let request = agent.recv().await;
    agent.ok(&request, None).await;
    agent.send(json!({"type": "agent_start"})).await;
    drop(agent);

    let err = tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap_err();
    assert!(err.is_process_died());
    assert_eq!(classify_run_error(&err), Some(BrokenCause::ProcessDied));
}

#[tokio::test]
async fn agent_end_without_assistant_is_protocol_violation() {
    let (client, agent) = connect();
    let _server = agent.serve(|request| {
        Scenario::accepted(request)
            .event(json!({"type": "agent_end", "messages": [{"role": "user", "content": "hi"}]}))
            .build()
    });

    let err = client.run(&Context::new(), "hello").await.unwrap_err();
    assert!(err.is_protocol_violation());
    assert_eq!(classify_run_error(&err), Some(BrokenCause::Protocol));
}
