//! Integration tests for deferred tool execution.
//!
//! Countdowns run on real time here, so delays are kept at one second.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_tool_host::mcp::{Property, PropertyValue, Tool, ToolRegistry};
use mcp_tool_host::timer::{
    register_timer_tools, Notifier, TimerNotice, TimerService, TimerSettings,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

struct Harness {
    registry: Arc<ToolRegistry>,
    timers: TimerService,
    calls: Arc<AtomicUsize>,
    last_text: Arc<Mutex<Option<String>>>,
    notices: mpsc::UnboundedReceiver<TimerNotice>,
}

fn harness() -> Harness {
    let registry = Arc::new(ToolRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let last_text = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&calls);
    let recorder = Arc::clone(&last_text);
    registry.register(
        Tool::builder("echo")
            .description("Echo and record")
            .property(Property::string("text"))
            .handler(move |args| {
                let counter = Arc::clone(&counter);
                let recorder = Arc::clone(&recorder);
                async move {
                    let text = args.get_str("text").unwrap_or_default().to_string();
                    counter.fetch_add(1, Ordering::SeqCst);
                    *recorder.lock().unwrap() = Some(text.clone());
                    Ok(PropertyValue::String(text))
                }
            })
            .build()
            .unwrap(),
    );

    let (tx, notices) = mpsc::unbounded_channel();
    let notifier: Notifier = Arc::new(move |notice| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(notice);
        })
    });

    let timers = TimerService::with_notifier(&registry, TimerSettings::default(), notifier);
    register_timer_tools(&registry, &timers).unwrap();

    Harness {
        registry,
        timers,
        calls,
        last_text,
        notices,
    }
}

async fn call_json(registry: &ToolRegistry, name: &str, arguments: Value) -> Value {
    let result = registry.call(name, &arguments).await.unwrap();
    assert!(!result.is_error, "{result:?}");
    serde_json::from_str(result.first_text().unwrap()).unwrap()
}

// =============================================================================
// Firing
// =============================================================================

#[tokio::test]
async fn test_countdown_fires_once_and_leaves_active_set() {
    let mut h = harness();

    let started = call_json(
        &h.registry,
        "start_countdown",
        json!({
            "command": r#"{"name":"echo","arguments":{"text":"done"}}"#,
            "delay": 1,
            "description": "say done"
        }),
    )
    .await;
    assert_eq!(started["success"], true);
    assert_eq!(started["timer_id"], 1);
    assert_eq!(started["delay"], 1);

    let listed = call_json(&h.registry, "get_active_timers", json!({})).await;
    assert_eq!(listed["total_active_timers"], 1);
    assert_eq!(listed["timers"][0]["description"], "say done");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let notice = tokio::time::timeout(Duration::from_secs(2), h.notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.timer_id, 1);
    assert_eq!(notice.tool, "echo");
    assert!(notice.success);
    assert_eq!(notice.detail, "done");

    let listed = call_json(&h.registry, "get_active_timers", json!({})).await;
    assert_eq!(listed["total_active_timers"], 0);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.last_text.lock().unwrap().as_deref(), Some("done"));
}

#[tokio::test]
async fn test_failed_command_is_reported_not_raised() {
    let mut h = harness();

    h.timers
        .start_countdown(r#"{"name":"no_such_tool","arguments":{}}"#, Some(1), "")
        .unwrap();

    let notice = tokio::time::timeout(Duration::from_secs(3), h.notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!notice.success);
    assert!(notice.detail.contains("no_such_tool"), "{}", notice.detail);
    assert!(h.timers.is_empty());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_firing_prevents_dispatch() {
    let mut h = harness();

    let started = call_json(
        &h.registry,
        "start_countdown",
        json!({
            "command": r#"{"name":"echo","arguments":{"text":"never"}}"#,
            "delay": 1
        }),
    )
    .await;
    let id = started["timer_id"].as_u64().unwrap();

    let cancelled = call_json(&h.registry, "cancel_countdown", json!({ "timer_id": id })).await;
    assert_eq!(cancelled["success"], true);
    assert_eq!(cancelled["timer_id"], id);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    assert!(h.notices.try_recv().is_err());

    let again = call_json(&h.registry, "cancel_countdown", json!({ "timer_id": id })).await;
    assert_eq!(again["success"], false);
    assert_eq!(
        again["message"],
        format!("Timer {id} not found or already finished")
    );
}

#[tokio::test]
async fn test_cleanup_all_drops_everything() {
    let h = harness();
    for _ in 0..3 {
        h.timers
            .start_countdown(r#"{"name":"echo","arguments":{"text":"x"}}"#, Some(60), "")
            .unwrap();
    }
    assert_eq!(h.timers.len(), 3);
    assert_eq!(h.timers.cleanup_all(), 3);
    assert!(h.timers.is_empty());
}

// =============================================================================
// Input handling
// =============================================================================

#[tokio::test]
async fn test_out_of_range_delay_uses_default() {
    let h = harness();

    for delay in [0, -5, 999_999] {
        let started = call_json(
            &h.registry,
            "start_countdown",
            json!({
                "command": r#"{"name":"echo","arguments":{"text":"x"}}"#,
                "delay": delay
            }),
        )
        .await;
        assert_eq!(started["success"], true);
        assert_eq!(started["delay"], 5, "delay {delay}");
    }

    let omitted = call_json(
        &h.registry,
        "start_countdown",
        json!({ "command": r#"{"name":"echo","arguments":{}}"# }),
    )
    .await;
    assert_eq!(omitted["delay"], 5);

    h.timers.cleanup_all();
}

#[tokio::test]
async fn test_malformed_command_schedules_nothing() {
    let h = harness();

    for command in ["not json", r#"{"arguments":{}}"#, r#"{"name":"echo","arguments":3}"#] {
        let started = call_json(
            &h.registry,
            "start_countdown",
            json!({ "command": command, "delay": 1 }),
        )
        .await;
        assert_eq!(started["success"], false, "command {command}");
        assert!(started["message"].as_str().unwrap().starts_with("Invalid command"));
    }

    assert!(h.timers.is_empty());
}

#[tokio::test]
async fn test_missing_command_is_an_error_result() {
    let h = harness();
    let result = h
        .registry
        .call("start_countdown", &json!({ "delay": 1 }))
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(result.first_text(), Some("Missing valid argument: command"));
}
