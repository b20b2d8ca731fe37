//! The countdown scheduler behind [`TimerService`].
//!
//! Every countdown is an entry in the active set plus a spawned task that
//! sleeps for the delay. When the sleep ends, the task re-takes the active-set
//! lock and marks the entry as firing, unless a cancel already removed it.
//! A firing entry is no longer listed by [`TimerService::list_active`]. It is
//! removed once the command returns, and the [`Notifier`] then receives the
//! outcome.
//!
//! Cancelling a pending entry trips its token and the task exits without
//! calling anything. Cancelling a firing entry only forgets it and reports
//! [`CancelOutcome::AlreadyRunning`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::TimerError;
use crate::config::TimerConfig;
use crate::mcp::registry::{BoxFuture, ToolRegistry};

/// Receives the outcome of every fired countdown.
pub type Notifier = Arc<dyn Fn(TimerNotice) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of a fired countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerNotice {
    /// The countdown that fired.
    pub timer_id: u64,
    /// The tool it called.
    pub tool: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Tool output, or what went wrong.
    pub detail: String,
}

/// A notifier that only logs.
#[must_use]
pub fn log_notifier() -> Notifier {
    Arc::new(|notice: TimerNotice| {
        Box::pin(async move {
            if notice.success {
                tracing::info!(
                    timer_id = notice.timer_id,
                    tool = %notice.tool,
                    detail = %notice.detail,
                    "Timer command succeeded"
                );
            } else {
                tracing::error!(
                    timer_id = notice.timer_id,
                    tool = %notice.tool,
                    detail = %notice.detail,
                    "Timer command failed"
                );
            }
        })
    })
}

/// A parsed tool-call descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Target tool name.
    pub name: String,
    /// Raw arguments object.
    pub arguments: Value,
}

impl ToolCommand {
    /// Parses `{"name": "...", "arguments": {...}}`. Missing or `null`
    /// arguments become an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidCommand`] for malformed JSON, a missing
    /// or empty name, or non-object arguments.
    pub fn parse(text: &str) -> Result<Self, TimerError> {
        let invalid = |reason: String| TimerError::InvalidCommand { reason };

        let value: Value =
            serde_json::from_str(text).map_err(|e| invalid(format!("not valid JSON ({e})")))?;
        let Value::Object(mut obj) = value else {
            return Err(invalid("expected a JSON object".to_string()));
        };

        let name = match obj.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(invalid("missing tool name".to_string())),
        };

        let arguments = match obj.remove("arguments") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(args @ Value::Object(_)) => args,
            Some(_) => return Err(invalid("arguments must be an object".to_string())),
        };

        Ok(Self { name, arguments })
    }
}

/// Delay limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Delay used when the requested one is missing or out of range.
    pub default_delay_secs: u64,
    /// Longest accepted delay.
    pub max_delay_secs: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            default_delay_secs: 5,
            max_delay_secs: 3600,
        }
    }
}

impl From<&TimerConfig> for TimerSettings {
    fn from(config: &TimerConfig) -> Self {
        Self {
            default_delay_secs: config.default_delay_secs,
            max_delay_secs: config.max_delay_secs,
        }
    }
}

/// Returned by [`TimerService::start_countdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimer {
    /// New countdown ID.
    pub id: u64,
    /// Delay actually applied.
    pub delay_secs: u64,
    /// When the countdown was created.
    pub created_at: DateTime<Local>,
    /// When the command is due to run.
    pub fire_at: DateTime<Local>,
}

/// Point-in-time view of a pending countdown.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    /// Countdown ID.
    pub id: u64,
    /// The command as submitted.
    pub command: String,
    /// Caller-supplied description.
    pub description: String,
    /// Total delay.
    pub delay_secs: u64,
    /// Whole seconds left, rounded up.
    pub remaining_secs: u64,
    /// When the countdown was created.
    pub created_at: DateTime<Local>,
    /// When the command is due to run.
    pub fire_at: DateTime<Local>,
    /// `elapsed / delay`, within `[0, 1]`.
    pub progress: f64,
}

/// Result of a successful [`TimerService::cancel_countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The command will never run.
    Cancelled,
    /// The command was already running; it completes regardless.
    AlreadyRunning,
}

struct TimerTask {
    command_text: String,
    description: String,
    delay: Duration,
    created_at: DateTime<Local>,
    fire_at: DateTime<Local>,
    started: Instant,
    cancel: CancellationToken,
    firing: bool,
}

struct ActiveTimers {
    next_id: u64,
    tasks: BTreeMap<u64, TimerTask>,
}

struct Shared {
    active: Mutex<ActiveTimers>,
    registry: Weak<ToolRegistry>,
    notifier: Notifier,
    settings: TimerSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ActiveTimers> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the task as executing unless it was cancelled first.
    fn begin_firing(&self, id: u64) -> bool {
        let mut active = self.lock();
        match active.tasks.get_mut(&id) {
            Some(task) if !task.cancel.is_cancelled() => {
                task.firing = true;
                true
            }
            _ => false,
        }
    }

    fn finish(&self, id: u64) {
        self.lock().tasks.remove(&id);
    }
}

/// The deferred execution scheduler.
///
/// Cloning yields another handle to the same set of countdowns.
#[derive(Clone)]
pub struct TimerService {
    shared: Arc<Shared>,
}

impl TimerService {
    /// Creates a service that runs commands through `registry` and logs
    /// their outcome.
    #[must_use]
    pub fn new(registry: &Arc<ToolRegistry>, settings: TimerSettings) -> Self {
        Self::with_notifier(registry, settings, log_notifier())
    }

    /// Creates a service that reports outcomes to `notifier`.
    ///
    /// The registry is held weakly: it usually owns this service through the
    /// timer tools.
    #[must_use]
    pub fn with_notifier(
        registry: &Arc<ToolRegistry>,
        settings: TimerSettings,
        notifier: Notifier,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(ActiveTimers {
                    next_id: 1,
                    tasks: BTreeMap::new(),
                }),
                registry: Arc::downgrade(registry),
                notifier,
                settings,
            }),
        }
    }

    /// Returns the delay limits.
    #[must_use]
    pub fn settings(&self) -> TimerSettings {
        self.shared.settings
    }

    /// Returns `requested` if it lies in `1..=max_delay_secs`, otherwise the
    /// default delay.
    #[must_use]
    pub fn resolve_delay(&self, requested: Option<i64>) -> u64 {
        let settings = self.shared.settings;
        match requested {
            None => settings.default_delay_secs,
            Some(delay) => match u64::try_from(delay) {
                Ok(secs) if (1..=settings.max_delay_secs).contains(&secs) => secs,
                _ => {
                    tracing::warn!(
                        requested = delay,
                        max = settings.max_delay_secs,
                        default = settings.default_delay_secs,
                        "Invalid timer delay, using default"
                    );
                    settings.default_delay_secs
                }
            },
        }
    }

    /// Schedules `command` to run after `delay` seconds.
    ///
    /// Returns immediately; the command runs on a spawned task. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidCommand`] without scheduling anything if
    /// `command` is not a well-formed tool-call descriptor.
    pub fn start_countdown(
        &self,
        command: &str,
        delay: Option<i64>,
        description: &str,
    ) -> Result<ScheduledTimer, TimerError> {
        let parsed = ToolCommand::parse(command)?;
        let delay_secs = self.resolve_delay(delay);
        let delay = Duration::from_secs(delay_secs);

        let created_at = Local::now();
        let fire_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(created_at);
        let cancel = CancellationToken::new();

        let id = {
            let mut active = self.shared.lock();
            let id = active.next_id;
            active.next_id += 1;
            active.tasks.insert(
                id,
                TimerTask {
                    command_text: command.to_string(),
                    description: description.to_string(),
                    delay,
                    created_at,
                    fire_at,
                    started: Instant::now(),
                    cancel: cancel.clone(),
                    firing: false,
                },
            );
            id
        };

        tracing::info!(
            timer_id = id,
            tool = %parsed.name,
            delay_secs,
            description,
            "Countdown started"
        );

        tokio::spawn(run_countdown(
            Arc::clone(&self.shared),
            id,
            delay,
            cancel,
            parsed,
        ));

        Ok(ScheduledTimer {
            id,
            delay_secs,
            created_at,
            fire_at,
        })
    }

    /// Cancels a pending countdown.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotFound`] if no active countdown has this ID.
    pub fn cancel_countdown(&self, id: u64) -> Result<CancelOutcome, TimerError> {
        let task = self
            .shared
            .lock()
            .tasks
            .remove(&id)
            .ok_or(TimerError::NotFound { id })?;

        if task.firing {
            tracing::info!(timer_id = id, "Countdown already executing, removed bookkeeping");
            Ok(CancelOutcome::AlreadyRunning)
        } else {
            task.cancel.cancel();
            tracing::info!(timer_id = id, "Countdown cancelled");
            Ok(CancelOutcome::Cancelled)
        }
    }

    /// Lists countdowns that have not yet reached their fire time.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn list_active(&self) -> Vec<TimerSnapshot> {
        let now = Instant::now();
        let active = self.shared.lock();

        active
            .tasks
            .iter()
            .filter(|(_, task)| !task.firing)
            .filter_map(|(&id, task)| {
                let elapsed = now.saturating_duration_since(task.started);
                let remaining = task.delay.saturating_sub(elapsed);
                if remaining.is_zero() {
                    return None;
                }

                let progress = if task.delay.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / task.delay.as_secs_f64()).clamp(0.0, 1.0)
                };

                Some(TimerSnapshot {
                    id,
                    command: task.command_text.clone(),
                    description: task.description.clone(),
                    delay_secs: task.delay.as_secs(),
                    remaining_secs: remaining.as_secs_f64().ceil() as u64,
                    created_at: task.created_at,
                    fire_at: task.fire_at,
                    progress,
                })
            })
            .collect()
    }

    /// Number of countdowns still tracked, including ones executing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Whether no countdowns are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock().tasks.is_empty()
    }

    /// Cancels every countdown and clears the active set. For shutdown only.
    ///
    /// Returns how many countdowns were dropped.
    pub fn cleanup_all(&self) -> usize {
        let tasks = std::mem::take(&mut self.shared.lock().tasks);
        for task in tasks.values() {
            task.cancel.cancel();
        }
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "Cancelled all countdowns");
        }
        tasks.len()
    }
}

async fn run_countdown(
    shared: Arc<Shared>,
    id: u64,
    delay: Duration,
    cancel: CancellationToken,
    command: ToolCommand,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(timer_id = id, "Countdown interrupted");
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }

    // Past this point cancellation no longer prevents the call.
    if !shared.begin_firing(id) {
        tracing::debug!(timer_id = id, "Countdown cancelled at fire time");
        return;
    }

    let notice = execute(&shared, id, command).await;
    shared.finish(id);
    (shared.notifier)(notice).await;
}

async fn execute(shared: &Shared, id: u64, command: ToolCommand) -> TimerNotice {
    let ToolCommand { name, arguments } = command;
    let tool = name.clone();
    let notice = |success: bool, detail: String| TimerNotice {
        timer_id: id,
        tool: tool.clone(),
        success,
        detail,
    };

    let Some(registry) = shared.registry.upgrade() else {
        return notice(false, "tool registry is no longer available".to_string());
    };

    tracing::info!(timer_id = id, tool = %name, "Countdown fired");

    // A panicking tool must not take the countdown down with it.
    let call = tokio::spawn(async move { registry.call(&name, &arguments).await });

    match call.await {
        Ok(Ok(result)) => notice(
            !result.is_error,
            result.first_text().unwrap_or_default().to_string(),
        ),
        Ok(Err(e)) => notice(false, e.to_string()),
        Err(e) if e.is_panic() => notice(false, "tool panicked during execution".to_string()),
        Err(e) => notice(false, format!("tool task failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::mcp::registry::{Tool, ToolResult};
    use crate::mcp::schema::{Property, PropertyValue};
    use crate::mcp::ToolError;

    struct Fixture {
        registry: Arc<ToolRegistry>,
        service: TimerService,
        calls: Arc<AtomicUsize>,
        slow_finished: Arc<AtomicUsize>,
        notices: mpsc::UnboundedReceiver<TimerNotice>,
    }

    fn explode() -> ToolResult {
        panic!("boom")
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ToolRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        registry.register(
            Tool::builder("echo")
                .property(Property::string("text"))
                .handler(move |args| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(PropertyValue::from(args.get_str("text").unwrap_or_default())) }
                })
                .build()
                .unwrap(),
        );
        registry.register(
            Tool::builder("fail")
                .handler(|_| async { Err(ToolError::failed("motor stalled")) })
                .build()
                .unwrap(),
        );
        let slow_finished = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&slow_finished);
        registry.register(
            Tool::builder("slow")
                .handler(move |_| {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_millis(800)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(PropertyValue::from("slow done"))
                    }
                })
                .build()
                .unwrap(),
        );
        registry.register(
            Tool::builder("explode")
                .handler(|_| async { explode() })
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
        let service = TimerService::with_notifier(&registry, TimerSettings::default(), notifier);

        Fixture {
            registry,
            service,
            calls,
            slow_finished,
            notices,
        }
    }

    #[test]
    fn parse_command() {
        let cmd = ToolCommand::parse(r#"{"name":"echo","arguments":{"text":"x"}}"#).unwrap();
        assert_eq!(cmd.name, "echo");
        assert_eq!(cmd.arguments, json!({"text": "x"}));

        let cmd = ToolCommand::parse(r#"{"name":"echo"}"#).unwrap();
        assert_eq!(cmd.arguments, json!({}));

        for bad in [
            "not json",
            "[1]",
            r#"{"arguments":{}}"#,
            r#"{"name":""}"#,
            r#"{"name":"echo","arguments":3}"#,
        ] {
            assert!(
                matches!(ToolCommand::parse(bad), Err(TimerError::InvalidCommand { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn resolve_delay_substitutes_default() {
        let f = fixture();
        assert_eq!(f.service.resolve_delay(Some(30)), 30);
        assert_eq!(f.service.resolve_delay(Some(3600)), 3600);
        assert_eq!(f.service.resolve_delay(Some(0)), 5);
        assert_eq!(f.service.resolve_delay(Some(-5)), 5);
        assert_eq!(f.service.resolve_delay(Some(3601)), 5);
        assert_eq!(f.service.resolve_delay(None), 5);
    }

    #[tokio::test]
    async fn invalid_command_schedules_nothing() {
        let f = fixture();
        let err = f.service.start_countdown("{nope", Some(1), "").unwrap_err();
        assert!(matches!(err, TimerError::InvalidCommand { .. }));
        assert!(f.service.is_empty());
        assert!(f.service.list_active().is_empty());
    }

    #[tokio::test]
    async fn ids_increase_and_are_never_reused() {
        let f = fixture();
        let cmd = r#"{"name":"echo","arguments":{"text":"a"}}"#;
        let a = f.service.start_countdown(cmd, Some(60), "").unwrap();
        let b = f.service.start_countdown(cmd, Some(60), "").unwrap();
        f.service.cancel_countdown(b.id).unwrap();
        let c = f.service.start_countdown(cmd, Some(60), "").unwrap();
        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(f.service.cleanup_all(), 2);
    }

    #[tokio::test]
    async fn fires_once_and_reports() {
        let mut f = fixture();
        let timer = f
            .service
            .start_countdown(r#"{"name":"echo","arguments":{"text":"done"}}"#, Some(1), "say done")
            .unwrap();
        assert_eq!(timer.delay_secs, 1);
        assert_eq!(f.service.list_active().len(), 1);

        let notice = f.notices.recv().await.unwrap();
        assert_eq!(notice.timer_id, timer.id);
        assert!(notice.success);
        assert_eq!(notice.detail, "done");
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert!(f.service.is_empty());
        assert!(f.service.list_active().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_fire_prevents_call() {
        let f = fixture();
        let timer = f
            .service
            .start_countdown(r#"{"name":"echo","arguments":{"text":"never"}}"#, Some(1), "")
            .unwrap();
        assert_eq!(
            f.service.cancel_countdown(timer.id).unwrap(),
            CancelOutcome::Cancelled
        );

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.service.cancel_countdown(timer.id).unwrap_err(),
            TimerError::NotFound { id: timer.id }
        );
    }

    #[tokio::test]
    async fn cancel_while_executing_only_drops_bookkeeping() {
        let mut f = fixture();
        let timer = f
            .service
            .start_countdown(r#"{"name":"slow"}"#, Some(1), "")
            .unwrap();

        // Fired at 1s, the tool is still sleeping at 1.3s.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(f.slow_finished.load(Ordering::SeqCst), 0);
        assert!(f.service.list_active().is_empty());

        assert_eq!(
            f.service.cancel_countdown(timer.id).unwrap(),
            CancelOutcome::AlreadyRunning
        );
        assert_eq!(f.service.len(), 0);

        let notice = f.notices.recv().await.unwrap();
        assert_eq!(notice.timer_id, timer.id);
        assert!(notice.success);
        assert_eq!(notice.detail, "slow done");
        assert_eq!(f.slow_finished.load(Ordering::SeqCst), 1);
        assert!(f.service.is_empty());

        assert_eq!(
            f.service.cancel_countdown(timer.id).unwrap_err(),
            TimerError::NotFound { id: timer.id }
        );
    }

    #[tokio::test]
    async fn failures_are_reported_not_propagated() {
        let mut f = fixture();
        f.service
            .start_countdown(r#"{"name":"fail"}"#, Some(1), "")
            .unwrap();
        f.service
            .start_countdown(r#"{"name":"ghost"}"#, Some(1), "")
            .unwrap();
        f.service
            .start_countdown(r#"{"name":"echo","arguments":{}}"#, Some(1), "")
            .unwrap();
        f.service
            .start_countdown(r#"{"name":"explode"}"#, Some(1), "")
            .unwrap();

        let mut details = Vec::new();
        for _ in 0..4 {
            let notice = f.notices.recv().await.unwrap();
            assert!(!notice.success);
            details.push(notice.detail);
        }
        details.sort();
        assert_eq!(
            details,
            vec![
                "Missing valid argument: text".to_string(),
                "Unknown tool: ghost".to_string(),
                "motor stalled".to_string(),
                "tool panicked during execution".to_string(),
            ]
        );
        assert!(f.service.is_empty());
    }

    #[tokio::test]
    async fn dropped_registry_is_reported() {
        let mut f = fixture();
        f.service
            .start_countdown(r#"{"name":"echo","arguments":{"text":"x"}}"#, Some(1), "")
            .unwrap();
        drop(f.registry);

        let notice = f.notices.recv().await.unwrap();
        assert!(!notice.success);
        assert!(notice.detail.contains("no longer available"));
    }

    #[tokio::test]
    async fn snapshot_reports_progress() {
        let f = fixture();
        f.service
            .start_countdown(r#"{"name":"echo","arguments":{"text":"x"}}"#, Some(100), "later")
            .unwrap();

        let snapshot = &f.service.list_active()[0];
        assert_eq!(snapshot.delay_secs, 100);
        assert_eq!(snapshot.description, "later");
        assert!(snapshot.remaining_secs <= 100 && snapshot.remaining_secs >= 99);
        assert!((0.0..=1.0).contains(&snapshot.progress));
        assert!(snapshot.fire_at > snapshot.created_at);

        assert_eq!(f.service.cleanup_all(), 1);
        assert!(f.service.list_active().is_empty());
    }
}
