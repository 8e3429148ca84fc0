//! Alert node settings, rendering and collaborators.
//!
//! An alert node sends a templated message to a list of recipients, at most
//! once per cooldown period for a given workflow version, node and trigger
//! source. Delivery and cooldown bookkeeping are collaborators so that the
//! engine can run against real mail and cache infrastructure or in memory.

use crate::context::ExecutionContext;
use crate::run::Run;
use async_trait::async_trait;
use sensorflow_core::{WorkflowVersionId, path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Config keys that mark an alert node as configured for delivery.
///
/// Nodes with none of these are editor placeholders and are skipped.
pub const RUNTIME_KEYS: [&str; 5] = ["channel", "recipients", "subject", "body", "cooldown"];

/// The only supported delivery channel.
pub const EMAIL_CHANNEL: &str = "email";

/// Unit of an alert cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownUnit {
    Minute,
    Hour,
    Day,
}

impl CooldownUnit {
    /// Parses a unit name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    fn seconds(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
        }
    }
}

/// How long an alert stays silent after it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    pub value: u32,
    pub unit: CooldownUnit,
}

impl Cooldown {
    /// A cooldown of `value` minutes.
    #[must_use]
    pub fn minutes(value: u32) -> Self {
        Self {
            value,
            unit: CooldownUnit::Minute,
        }
    }

    /// Parses `{value, unit}` with a positive integer value.
    #[must_use]
    pub fn parse(value: Option<&JsonValue>) -> Option<Self> {
        let cooldown = value?.as_object()?;
        let amount = path::positive_int(cooldown.get("value"))
            .and_then(|v| u32::try_from(v).ok())?;
        let unit = cooldown
            .get("unit")
            .and_then(JsonValue::as_str)
            .and_then(CooldownUnit::parse)?;
        Some(Self {
            value: amount,
            unit,
        })
    }

    /// Returns the cooldown as a duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.value) * self.unit.seconds())
    }

    /// Returns the cooldown as `{value, unit}`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::minutes(30)
    }
}

/// Returns true if the config has any of [`RUNTIME_KEYS`].
#[must_use]
pub fn has_runtime_fields(config: &Map<String, JsonValue>) -> bool {
    RUNTIME_KEYS.iter().any(|key| config.contains_key(*key))
}

/// A recipient that is not an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecipient(pub String);

impl fmt::Display for InvalidRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid alert recipient [{}].", self.0)
    }
}

impl std::error::Error for InvalidRecipient {}

/// Normalizes a recipient list: trimmed, lowercased, deduplicated in order.
///
/// Non-string and blank entries are ignored; a non-list yields no recipients.
///
/// # Errors
///
/// Returns the first entry that is not a valid email address.
pub fn resolve_recipients(recipients: Option<&JsonValue>) -> Result<Vec<String>, InvalidRecipient> {
    let Some(JsonValue::Array(entries)) = recipients else {
        return Ok(Vec::new());
    };

    let mut resolved: Vec<String> = Vec::new();
    for entry in entries.iter().filter_map(JsonValue::as_str) {
        let email = entry.trim().to_lowercase();
        if email.is_empty() {
            continue;
        }
        if !is_valid_email(&email) {
            return Err(InvalidRecipient(entry.to_string()));
        }
        if !resolved.contains(&email) {
            resolved.push(email);
        }
    }
    Ok(resolved)
}

/// Syntactic email check: a dot-atom local part and a dotted host name.
#[must_use]
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && domain.len() <= 253
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    local_ok && domain_ok
}

/// Checks an alert config at publish time.
///
/// Configs that are empty or carry none of [`RUNTIME_KEYS`] are accepted as
/// placeholders.
///
/// # Errors
///
/// Returns the reason the config cannot be delivered.
pub fn validate_config(config: Option<&Map<String, JsonValue>>) -> Result<(), String> {
    let Some(config) = config.filter(|config| !config.is_empty()) else {
        return Ok(());
    };
    if !has_runtime_fields(config) {
        return Ok(());
    }

    if config.get("channel").and_then(JsonValue::as_str) != Some(EMAIL_CHANNEL) {
        return Err("channel must be email".to_string());
    }

    let recipients = match config.get("recipients") {
        Some(JsonValue::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err("requires at least one recipient".to_string()),
    };
    let mut has_valid_recipient = false;
    for recipient in recipients.iter().filter_map(JsonValue::as_str) {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            continue;
        }
        if !is_valid_email(recipient) {
            return Err("recipients must be valid email addresses".to_string());
        }
        has_valid_recipient = true;
    }
    if !has_valid_recipient {
        return Err("requires at least one recipient".to_string());
    }

    let non_blank = |key: &str| {
        config
            .get(key)
            .and_then(JsonValue::as_str)
            .is_some_and(|text| !text.trim().is_empty())
    };
    if !non_blank("subject") {
        return Err("subject is required".to_string());
    }
    if !non_blank("body") {
        return Err("body is required".to_string());
    }

    match config.get("cooldown") {
        Some(cooldown) if cooldown.is_object() => {
            if Cooldown::parse(Some(cooldown)).is_none() {
                return Err("cooldown must include positive value and valid unit".to_string());
            }
        }
        _ => return Err("cooldown configuration is required".to_string()),
    }

    Ok(())
}

/// Builds the document alert templates are rendered against.
#[must_use]
pub fn template_context(
    run: &Run,
    context: &ExecutionContext,
    node_id: &str,
    cooldown: &Cooldown,
) -> JsonValue {
    let lookup = |value: &JsonValue, key: &str| path::lookup(value, key).cloned().unwrap_or(JsonValue::Null);

    json!({
        "run": {
            "id": run.id,
            "organization_id": run.organization_id,
            "workflow_id": run.workflow_id,
            "workflow_version_id": run.workflow_version_id,
            "trigger_type": run.trigger_type,
        },
        "trigger": context.trigger,
        "payload": context.payload,
        "query": context.query,
        "queries": context.queries,
        "alert": {
            "node_id": node_id,
            "cooldown": cooldown.to_json(),
        },
        "run_id": run.id,
        "workflow_id": run.workflow_id,
        "workflow_version_id": run.workflow_version_id,
        "trigger_value": lookup(&context.trigger, "value"),
        "query_value": lookup(&context.query, "value"),
        "window_start": lookup(&context.query, "window.start"),
        "window_end": lookup(&context.query, "window.end"),
    })
}

fn is_placeholder_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Parses `{{ path }}` at the start of `text`, returning the path and the
/// length of the placeholder.
fn parse_placeholder(text: &str) -> Option<(&str, usize)> {
    let inner = text.strip_prefix("{{")?;
    let trimmed = inner.trim_start();
    let path_len = trimmed
        .find(|c: char| !is_placeholder_char(c))
        .unwrap_or(trimmed.len());
    if path_len == 0 {
        return None;
    }
    let (path, rest) = trimmed.split_at(path_len);
    let after = rest.trim_start().strip_prefix("}}")?;
    Some((path, text.len() - after.len()))
}

fn render_value(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(true)) => "1".to_string(),
        Some(JsonValue::Bool(false)) => String::new(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(value @ (JsonValue::Array(_) | JsonValue::Object(_))) => value.to_string(),
        Some(JsonValue::Null) | None => String::new(),
    }
}

/// Replaces every `{{ path }}` in `template` with the value at `path`.
///
/// Scalars render as text, collections as JSON, missing values as nothing.
#[must_use]
pub fn interpolate(template: &str, context: &JsonValue) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match parse_placeholder(candidate) {
            Some((path, consumed)) => {
                rendered.push_str(&render_value(path::lookup(context, path)));
                rest = &candidate[consumed..];
            }
            None => {
                rendered.push_str("{{");
                rest = &candidate[2..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Lowercases `text` into `_`-separated words of letters and digits.
#[must_use]
pub fn slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.replace('@', "_at_").to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c);
        } else if c == '_' || c == '-' || c.is_whitespace() {
            pending_separator = true;
        }
    }
    slug
}

/// Returns the cache key guarding repeat alerts for one trigger source.
#[must_use]
pub fn cooldown_key(workflow_version_id: WorkflowVersionId, node_id: &str, trigger: &JsonValue) -> String {
    let part = |key: &str| match trigger.get(key) {
        Some(JsonValue::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(JsonValue::String(s)) => s.clone(),
        _ => "none".to_string(),
    };

    format!(
        "automation:alert-cooldown:{}:{}:{}:{}",
        workflow_version_id.get(),
        slug(node_id),
        part("device_id"),
        part("schema_version_topic_id"),
    )
}

/// Errors from alert delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    UnsupportedChannel { channel: String },
    Delivery { reason: String },
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedChannel { channel } => write!(f, "Unsupported alert channel [{channel}]."),
            Self::Delivery { reason } => write!(f, "alert delivery failed: {reason}"),
        }
    }
}

impl std::error::Error for AlertError {}

/// A rendered alert ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub channel: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivers rendered alerts.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Sends `message`; `context` is the template document, for channels
    /// that render richer content. Returns a channel-specific receipt.
    async fn dispatch(&self, message: &AlertMessage, context: &JsonValue) -> Result<JsonValue, AlertError>;
}

/// Tracks which alerts are cooling down.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Claims `key` for `ttl`. Returns false if it is already claimed.
    async fn acquire(&self, key: &str, ttl: Duration) -> bool;

    /// Releases a claim early.
    async fn release(&self, key: &str);
}

/// Cooldown store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCooldownStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryCooldownStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CooldownStore for InMemoryCooldownStore {
    async fn acquire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), now + ttl);
        true
    }

    async fn release(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

/// Dispatcher that records email alerts instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingAlertDispatcher {
    failure: Option<String>,
    sent: Mutex<Vec<AlertMessage>>,
}

impl RecordingAlertDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher whose every delivery fails with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Returns every alert recorded so far.
    pub async fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingAlertDispatcher {
    async fn dispatch(&self, message: &AlertMessage, _context: &JsonValue) -> Result<JsonValue, AlertError> {
        if message.channel != EMAIL_CHANNEL {
            return Err(AlertError::UnsupportedChannel {
                channel: message.channel.clone(),
            });
        }
        if let Some(reason) = &self.failure {
            return Err(AlertError::Delivery {
                reason: reason.clone(),
            });
        }

        tracing::debug!(
            recipient_count = message.recipients.len(),
            subject = %message.subject,
            "Recorded alert"
        );
        self.sent.lock().await.push(message.clone());

        Ok(json!({
            "channel": message.channel,
            "recipient_count": message.recipients.len(),
            "recipients": message.recipients,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().expect("object")
    }

    fn complete_config() -> Map<String, JsonValue> {
        config(json!({
            "channel": "email",
            "recipients": ["ops@example.com"],
            "subject": "High voltage",
            "body": "Value {{ trigger_value }}",
            "cooldown": {"value": 15, "unit": "minute"}
        }))
    }

    #[test]
    fn cooldown_parses_positive_values_with_known_units() {
        assert_eq!(
            Cooldown::parse(Some(&json!({"value": "2", "unit": "hour"}))),
            Some(Cooldown {
                value: 2,
                unit: CooldownUnit::Hour
            })
        );
        assert_eq!(Cooldown::parse(Some(&json!({"value": 0, "unit": "hour"}))), None);
        assert_eq!(Cooldown::parse(Some(&json!({"value": 3, "unit": "week"}))), None);
        assert_eq!(Cooldown::default().duration(), Duration::from_secs(1800));
        assert_eq!(Cooldown::default().to_json(), json!({"value": 30, "unit": "minute"}));
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("ops@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co"));
        assert!(!is_valid_email("ops@localhost"));
        assert!(!is_valid_email("ops.example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email(".ops@example.com"));
        assert!(!is_valid_email("ops@-example.com"));
    }

    #[test]
    fn recipients_are_normalized_and_deduplicated() {
        let recipients = resolve_recipients(Some(&json!([
            " Ops@Example.com ",
            "ops@example.com",
            "",
            42,
            "lead@example.com"
        ])))
        .expect("valid");
        assert_eq!(recipients, vec!["ops@example.com", "lead@example.com"]);
    }

    #[test]
    fn invalid_recipient_is_an_error() {
        let err = resolve_recipients(Some(&json!(["ops@example.com", "nope"]))).unwrap_err();
        assert_eq!(err, InvalidRecipient("nope".to_string()));
        assert!(resolve_recipients(Some(&json!("ops@example.com"))).expect("ok").is_empty());
    }

    #[test]
    fn validation_accepts_placeholders() {
        assert!(validate_config(None).is_ok());
        assert!(validate_config(Some(&Map::new())).is_ok());
        assert!(validate_config(Some(&config(json!({"label": "todo"})))).is_ok());
        assert!(validate_config(Some(&complete_config())).is_ok());
    }

    #[test]
    fn validation_reports_first_problem() {
        let mut cfg = complete_config();
        cfg.insert("channel".to_string(), json!("sms"));
        assert_eq!(validate_config(Some(&cfg)), Err("channel must be email".to_string()));

        let mut cfg = complete_config();
        cfg.insert("recipients".to_string(), json!(["", "  "]));
        assert_eq!(
            validate_config(Some(&cfg)),
            Err("requires at least one recipient".to_string())
        );

        let mut cfg = complete_config();
        cfg.insert("recipients".to_string(), json!(["bad address"]));
        assert_eq!(
            validate_config(Some(&cfg)),
            Err("recipients must be valid email addresses".to_string())
        );

        let mut cfg = complete_config();
        cfg.insert("body".to_string(), json!("   "));
        assert_eq!(validate_config(Some(&cfg)), Err("body is required".to_string()));

        let mut cfg = complete_config();
        cfg.remove("cooldown");
        assert_eq!(
            validate_config(Some(&cfg)),
            Err("cooldown configuration is required".to_string())
        );

        let mut cfg = complete_config();
        cfg.insert("cooldown".to_string(), json!({"value": -1, "unit": "day"}));
        assert_eq!(
            validate_config(Some(&cfg)),
            Err("cooldown must include positive value and valid unit".to_string())
        );
    }

    #[test]
    fn interpolation_renders_paths() {
        let context = json!({
            "trigger_value": 50.5,
            "trigger": {"parameter_key": "V1", "on": true},
            "query": {"window": {"start": "2026-01-01T00:00:00Z"}},
            "list": [1, 2]
        });
        assert_eq!(
            interpolate("{{trigger.parameter_key}} is {{ trigger_value }} since {{query.window.start}}", &context),
            "V1 is 50.5 since 2026-01-01T00:00:00Z"
        );
        assert_eq!(interpolate("{{ list }} {{trigger.on}}", &context), "[1,2] 1");
        assert_eq!(interpolate("[{{ missing }}]", &context), "[]");
        assert_eq!(interpolate("{{ not closed", &context), "{{ not closed");
        assert_eq!(interpolate("{{ bad key }}", &context), "{{ bad key }}");
    }

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("Alert-Node 1"), "alert_node_1");
        assert_eq!(slug("__alert--x__"), "alert_x");
        assert_eq!(slug("a/b:c"), "abc");
    }

    #[test]
    fn cooldown_key_names_source() {
        let key = cooldown_key(
            WorkflowVersionId::new(7).expect("positive"),
            "alert-1",
            &json!({"device_id": 1, "schema_version_topic_id": 5}),
        );
        assert_eq!(key, "automation:alert-cooldown:7:alert_1:1:5");

        let key = cooldown_key(WorkflowVersionId::new(7).expect("positive"), "a", &json!({}));
        assert_eq!(key, "automation:alert-cooldown:7:a:none:none");
    }

    #[tokio::test]
    async fn cooldown_store_blocks_until_released() {
        let store = InMemoryCooldownStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.acquire("k", ttl).await);
        assert!(!store.acquire("k", ttl).await);
        store.release("k").await;
        assert!(store.acquire("k", ttl).await);
    }

    #[tokio::test]
    async fn expired_cooldown_can_be_reacquired() {
        let store = InMemoryCooldownStore::new();
        assert!(store.acquire("k", Duration::ZERO).await);
        assert!(store.acquire("k", Duration::ZERO).await);
    }

    #[tokio::test]
    async fn acquiring_drops_expired_keys() {
        let store = InMemoryCooldownStore::new();
        assert!(store.acquire("a", Duration::ZERO).await);
        assert!(store.acquire("b", Duration::ZERO).await);
        assert!(store.acquire("c", Duration::from_secs(60)).await);

        let keys: Vec<String> = store.entries.lock().await.keys().cloned().collect();
        assert_eq!(keys, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn recording_dispatcher_rejects_other_channels() {
        let dispatcher = RecordingAlertDispatcher::new();
        let message = AlertMessage {
            channel: "sms".to_string(),
            recipients: vec!["ops@example.com".to_string()],
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        let err = dispatcher.dispatch(&message, &json!({})).await.unwrap_err();
        assert!(matches!(err, AlertError::UnsupportedChannel { .. }));
        assert!(dispatcher.sent().await.is_empty());
    }
}
