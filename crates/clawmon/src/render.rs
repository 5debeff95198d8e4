//! Plain-text formatting for command output. One line per fact, no terminal control codes.

use chrono::Local;
use clawmon_core::{GatewayStatus, HealthReport, Instance, LogEvent};
use clawmon_gateway::{GatewayError, Notification};

pub fn instance_line(
    index: usize,
    instance: &Instance,
    current: bool,
    cli_ok: Option<bool>,
) -> String {
    let marker = if current { "*" } else { " " };
    let mode = if instance.is_remote() { "ssh" } else { "local" };
    let mut line = format!(
        "{marker} {index}  {:<16} {:<5} {}",
        instance.name,
        mode,
        instance.display_target()
    );
    line.push_str(&format!("  cli={}", instance.binary()));
    if cli_ok == Some(false) {
        line.push_str(" (not found)");
    }
    if !instance.tags.is_empty() {
        line.push_str(&format!("  [{}]", instance.tags.join(", ")));
    }
    line
}

pub fn status_summary(status: &GatewayStatus) -> Vec<String> {
    let mut lines = Vec::new();
    match &status.gateway {
        Some(gateway) => {
            let reach = if gateway.reachable { "reachable" } else { "unreachable" };
            let mut line = format!("gateway   {reach}");
            if !gateway.url.is_empty() {
                line.push_str(&format!("  {}", gateway.url));
            }
            if let Some(latency) = gateway.connect_latency_ms {
                line.push_str(&format!("  {latency}ms"));
            }
            if let Some(version) = status.gateway_version() {
                line.push_str(&format!("  v{version}"));
            }
            lines.push(line);
            if let Some(error) = status.gateway_error() {
                lines.push(format!("  error   {error}"));
            }
        }
        None => lines.push("gateway   no data".to_string()),
    }
    for (label, service) in [
        ("service", status.gateway_service.as_ref()),
        ("node", status.node_service.as_ref()),
    ] {
        if let Some(service) = service {
            let line = format!("{label:<9} {} {}", service.loaded_text, service.runtime_short);
            lines.push(line.trim_end().to_string());
        }
    }
    lines.push(format!(
        "sessions  {}  agents {}",
        status.session_count(),
        status.agent_count()
    ));
    if let Some(channel) = &status.link_channel {
        let linked = if channel.linked { "linked" } else { "not linked" };
        lines.push(format!("channel   {} {linked}", channel.label));
    }
    if let Some(memory) = &status.memory {
        lines.push(format!(
            "memory    {} files, {} chunks{}",
            memory.files,
            memory.chunks,
            if memory.dirty { " (dirty)" } else { "" }
        ));
    }
    if let Some(audit) = &status.security_audit {
        lines.push(format!(
            "security  {} critical, {} warn, {} info",
            audit.summary.critical, audit.summary.warn, audit.summary.info
        ));
    }
    if let Some(os) = &status.os {
        if !os.label.is_empty() {
            lines.push(format!("os        {}", os.label));
        }
    }
    if let Some(update) = &status.update {
        let latest = &update.registry.latest_version;
        if !latest.is_empty() {
            lines.push(format!("update    latest {latest}"));
        }
    }
    lines
}

pub fn health_summary(report: &HealthReport) -> Vec<String> {
    let mut lines = vec![format!("overall   {}", report.overall)];
    if let Some(gateway) = &report.gateway {
        let reach = if gateway.reachable { "reachable" } else { "unreachable" };
        lines.push(format!("gateway   {reach}"));
    }
    for channel in &report.channels {
        let mut line = format!("channel   {:<12} {}", channel.label, channel.status);
        if let Some(error) = &channel.error {
            line.push_str(&format!("  ({error})"));
        }
        lines.push(line);
    }
    for service in &report.services {
        lines.push(format!("service   {:<12} {}", service.name, service.status));
    }
    for finding in report.failing_checks() {
        lines.push(format!(
            "check     {:<12} {} {}",
            finding.check, finding.status, finding.message
        ));
    }
    lines
}

pub fn log_line(event: &LogEvent) -> String {
    format!(
        "{} {:<5} [{}] {}",
        event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        event.level.as_str().to_uppercase(),
        event.source,
        event.message
    )
}

/// Error text plus the raw response when the failure was a decode error.
pub fn error_lines(err: &GatewayError) -> Vec<String> {
    let mut lines = vec![format!("error     {err}")];
    if let Some(raw) = err.raw_output() {
        lines.push("raw output:".to_string());
        lines.extend(raw.lines().map(|line| format!("  {line}")));
    }
    lines
}

pub fn notification_lines(instance: &str, notification: &Notification) -> Vec<String> {
    match notification {
        Notification::StatusFetched { result, .. } => {
            let body = match result {
                Ok(status) => status_summary(status),
                Err(err) => error_lines(err),
            };
            prefixed(instance, "status", body)
        }
        Notification::HealthFetched { result, .. } => {
            let body = match result {
                Ok(report) => health_summary(report),
                Err(err) => error_lines(err),
            };
            prefixed(instance, "health", body)
        }
        Notification::LogArrived { event, .. } => vec![format!("[{instance}] {}", log_line(event))],
        Notification::ConnectionChanged { state, .. } => {
            vec![format!("[{instance}] connection {state}")]
        }
        Notification::FollowEnded { .. } => vec![format!("[{instance}] log stream closed")],
    }
}

fn prefixed(instance: &str, topic: &str, body: Vec<String>) -> Vec<String> {
    body.into_iter()
        .map(|line| format!("[{instance}] {topic}: {line}"))
        .collect()
}
