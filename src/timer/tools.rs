//! The timer service exposed as ordinary tools.
//!
//! Each tool answers with a JSON document carrying a `success` flag, so a
//! rejected countdown is an ordinary (non-error) tool result.

use chrono::{DateTime, Local};
use serde_json::{json, Value};

use super::{CancelOutcome, TimerService};
use crate::mcp::error::{RegistryError, ToolError};
use crate::mcp::registry::{Tool, ToolRegistry, ToolResult};
use crate::mcp::schema::{Arguments, Property, PropertyValue};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_time(time: &DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn respond(value: &Value) -> ToolResult {
    serde_json::to_string(value)
        .map(PropertyValue::String)
        .map_err(|e| ToolError::failed(format!("failed to serialise timer response: {e}")))
}

/// Builds the `start_countdown`, `cancel_countdown` and `get_active_timers`
/// tools.
///
/// # Errors
///
/// Returns an error only if a tool definition is inconsistent.
pub fn timer_tools(service: &TimerService) -> Result<Vec<Tool>, RegistryError> {
    let settings = service.settings();
    let default_delay = i64::try_from(settings.default_delay_secs).unwrap_or(i64::MAX);

    let start = {
        let service = service.clone();
        Tool::builder("start_countdown")
            .description(format!(
                "Schedule a tool call to run after a delay. `command` is a JSON string of the \
                 form {{\"name\": \"<tool>\", \"arguments\": {{...}}}}. `delay` is in seconds \
                 (1-{max}); out-of-range values fall back to {default}. Returns the timer ID, \
                 which can be passed to cancel_countdown.",
                max = settings.max_delay_secs,
                default = settings.default_delay_secs,
            ))
            .property(Property::string("command"))
            .property(Property::integer("delay").with_default(default_delay))
            .property(Property::string("description").with_default(""))
            .handler(move |args| {
                let service = service.clone();
                async move { start_countdown(&service, &args) }
            })
            .build()?
    };

    let cancel = {
        let service = service.clone();
        Tool::builder("cancel_countdown")
            .description("Cancel a countdown started with start_countdown, by timer ID.")
            .property(Property::integer("timer_id"))
            .handler(move |args| {
                let service = service.clone();
                async move { cancel_countdown(&service, &args) }
            })
            .build()?
    };

    let list = {
        let service = service.clone();
        Tool::builder("get_active_timers")
            .description(
                "List countdowns that have not fired yet, with remaining seconds and progress.",
            )
            .handler(move |_| {
                let service = service.clone();
                async move { get_active_timers(&service) }
            })
            .build()?
    };

    Ok(vec![start, cancel, list])
}

/// Registers the timer tools in `registry`.
///
/// # Errors
///
/// Returns an error only if a tool definition is inconsistent.
pub fn register_timer_tools(
    registry: &ToolRegistry,
    service: &TimerService,
) -> Result<(), RegistryError> {
    for tool in timer_tools(service)? {
        registry.register(tool);
    }
    Ok(())
}

fn start_countdown(service: &TimerService, args: &Arguments) -> ToolResult {
    let command = args.get_str("command").unwrap_or_default();
    let description = args.get_str("description").unwrap_or_default();
    let delay = args.get_integer("delay");

    let response = match service.start_countdown(command, delay, description) {
        Ok(timer) => json!({
            "success": true,
            "timer_id": timer.id,
            "delay": timer.delay_secs,
            "command": command,
            "description": description,
            "start_time": format_time(&timer.created_at),
            "estimated_execution_time": format_time(&timer.fire_at),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Countdown rejected");
            json!({
                "success": false,
                "message": e.to_string(),
            })
        }
    };

    respond(&response)
}

fn cancel_countdown(service: &TimerService, args: &Arguments) -> ToolResult {
    let requested = args.get_integer("timer_id").unwrap_or(-1);

    let outcome = u64::try_from(requested)
        .map_err(|_| format!("Timer {requested} not found or already finished"))
        .and_then(|id| {
            service
                .cancel_countdown(id)
                .map(|outcome| (id, outcome))
                .map_err(|e| e.to_string())
        });

    let response = match outcome {
        Ok((id, outcome)) => {
            let message = match outcome {
                CancelOutcome::Cancelled => format!("Timer {id} cancelled"),
                CancelOutcome::AlreadyRunning => {
                    format!("Timer {id} was already executing; it will run to completion")
                }
            };
            json!({
                "success": true,
                "message": message,
                "timer_id": id,
                "cancelled_at": format_time(&Local::now()),
            })
        }
        Err(message) => json!({
            "success": false,
            "message": message,
        }),
    };

    respond(&response)
}

fn get_active_timers(service: &TimerService) -> ToolResult {
    let timers: Vec<Value> = service
        .list_active()
        .into_iter()
        .map(|t| {
            json!({
                "timer_id": t.id,
                "command": t.command,
                "description": t.description,
                "delay": t.delay_secs,
                "remaining_seconds": t.remaining_secs,
                "start_time": format_time(&t.created_at),
                "estimated_execution_time": format_time(&t.fire_at),
                "progress": t.progress,
            })
        })
        .collect();

    respond(&json!({
        "success": true,
        "total_active_timers": timers.len(),
        "timers": timers,
        "current_time": format_time(&Local::now()),
    }))
}
