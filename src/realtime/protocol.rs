//! Phoenix channel messages spoken by Supabase Realtime (JSON serializer,
//! `vsn=1.0.0`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed realtime frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid Supabase URL {0:?}")]
    InvalidUrl(String),
}

/// Envelope for every frame in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Row change type reported by postgres_changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A row change delivered by the realtime feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn insert(table: &str, record: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            record,
            commit_timestamp: None,
        }
    }

    /// Primary key of the changed row, for logging
    pub fn record_id(&self) -> String {
        match self.record.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    commit_timestamp: Option<String>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Change(ChangeEvent),
    /// `phx_reply` to a join or heartbeat
    Reply {
        topic: String,
        msg_ref: Option<String>,
        ok: bool,
        response: Value,
    },
    /// Server-side channel failure (`phx_error`) or close (`phx_close`)
    ChannelDown { topic: String, reason: String },
    /// `system` messages, presence and anything else the relay ignores
    Other { topic: String, event: String },
}

pub fn decode(frame: &str) -> Result<Inbound, ProtocolError> {
    let message: PhoenixMessage = serde_json::from_str(frame)?;

    let inbound = match message.event.as_str() {
        "postgres_changes" => {
            let payload: ChangePayload = serde_json::from_value(message.payload)?;
            Inbound::Change(ChangeEvent {
                table: payload.data.table,
                kind: payload.data.kind,
                record: payload.data.record,
                commit_timestamp: payload.data.commit_timestamp,
            })
        }
        "phx_reply" => {
            let ok = message.payload.get("status").and_then(Value::as_str) == Some("ok");
            let response = message
                .payload
                .get("response")
                .cloned()
                .unwrap_or(Value::Null);
            Inbound::Reply {
                topic: message.topic,
                msg_ref: message.msg_ref,
                ok,
                response,
            }
        }
        "phx_error" | "phx_close" => Inbound::ChannelDown {
            reason: message.event,
            topic: message.topic,
        },
        _ => Inbound::Other {
            topic: message.topic,
            event: message.event,
        },
    };

    Ok(inbound)
}

/// Channel topic used for one watched table
pub fn topic_for(table: &str) -> String {
    format!("realtime:relay-{}", table)
}

/// `phx_join` subscribing to INSERTs on `public.<table>`
pub fn join(table: &str, access_token: &str, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic_for(table),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": [
                    {"event": "INSERT", "schema": "public", "table": table}
                ],
                "private": false
            },
            "access_token": access_token
        }),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: Some(msg_ref.to_string()),
    }
}

pub fn heartbeat(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

pub fn encode(message: &PhoenixMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Websocket endpoint for a project URL:
/// `https://x.supabase.co` → `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn websocket_url(project_url: &str, api_key: &str) -> Result<String, ProtocolError> {
    let mut url = reqwest::Url::parse(project_url.trim_end_matches('/'))
        .map_err(|_| ProtocolError::InvalidUrl(project_url.to_string()))?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return Err(ProtocolError::InvalidUrl(project_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ProtocolError::InvalidUrl(project_url.to_string()))?;

    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}/realtime/v1/websocket", base_path));
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://abc.supabase.co/", "key").unwrap(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert_eq!(
            websocket_url("http://localhost:54321", "k").unwrap(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
        assert!(websocket_url("ftp://example.com", "k").is_err());
        assert!(websocket_url("not a url", "k").is_err());
    }

    #[test]
    fn test_join_message() {
        let message = join("applications", "service-key", "3");
        let encoded: Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();

        assert_eq!(encoded["topic"], "realtime:relay-applications");
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "3");
        assert_eq!(encoded["join_ref"], "3");
        assert_eq!(encoded["payload"]["access_token"], "service-key");
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0],
            json!({"event": "INSERT", "schema": "public", "table": "applications"})
        );
    }

    #[test]
    fn test_heartbeat_message() {
        let encoded: Value = serde_json::from_str(&encode(&heartbeat("7")).unwrap()).unwrap();
        assert_eq!(encoded["topic"], "phoenix");
        assert_eq!(encoded["event"], "heartbeat");
        assert_eq!(encoded["ref"], "7");
        assert!(encoded.get("join_ref").is_none());
    }

    #[test]
    fn test_decode_postgres_change() {
        let frame = r#"{
            "topic": "realtime:relay-jobs",
            "event": "postgres_changes",
            "payload": {
                "ids": [12345],
                "data": {
                    "schema": "public",
                    "table": "jobs",
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "type": "INSERT",
                    "record": {"id": "job-1", "title": "Rust Dev"},
                    "columns": [{"name": "id", "type": "uuid"}],
                    "errors": null
                }
            },
            "ref": null
        }"#;

        match decode(frame).unwrap() {
            Inbound::Change(event) => {
                assert_eq!(event.table, "jobs");
                assert_eq!(event.kind, ChangeKind::Insert);
                assert_eq!(event.record_id(), "job-1");
                assert_eq!(event.record["title"], "Rust Dev");
                assert_eq!(event.commit_timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
            }
            other => panic!("Expected change, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_replies_and_errors() {
        let ok = decode(
            r#"{"topic":"realtime:relay-jobs","event":"phx_reply","payload":{"status":"ok","response":{"postgres_changes":[]}},"ref":"1"}"#,
        )
        .unwrap();
        assert!(matches!(ok, Inbound::Reply { ok: true, .. }));

        let failed = decode(
            r#"{"topic":"realtime:relay-jobs","event":"phx_reply","payload":{"status":"error","response":{"reason":"invalid token"}},"ref":"1"}"#,
        )
        .unwrap();
        match failed {
            Inbound::Reply { ok, response, .. } => {
                assert!(!ok);
                assert_eq!(response["reason"], "invalid token");
            }
            other => panic!("Expected reply, got {:?}", other),
        }

        let down = decode(r#"{"topic":"realtime:relay-jobs","event":"phx_error","payload":{},"ref":null}"#)
            .unwrap();
        assert_eq!(
            down,
            Inbound::ChannelDown {
                topic: "realtime:relay-jobs".to_string(),
                reason: "phx_error".to_string()
            }
        );

        let system = decode(r#"{"topic":"realtime:relay-jobs","event":"system","payload":{"status":"ok"}}"#)
            .unwrap();
        assert!(matches!(system, Inbound::Other { .. }));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(decode(r#"{"topic":"t","event":"postgres_changes","payload":{}}"#).is_err());
    }

    #[test]
    fn test_record_id_formats() {
        assert_eq!(ChangeEvent::insert("jobs", json!({"id": 42})).record_id(), "42");
        assert_eq!(ChangeEvent::insert("jobs", json!({})).record_id(), "-");
    }
}
