//! Supabase Realtime subscriber.
//!
//! Holds one websocket with a channel per watched table, keeps it alive with
//! Phoenix heartbeats and forwards every `postgres_changes` event into an
//! mpsc channel. A dropped socket is reopened after a capped exponential
//! delay; events published while disconnected are not replayed.

pub mod protocol;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub use protocol::{ChangeEvent, ChangeKind, Inbound, PhoenixMessage};

use crate::config::SupabaseConfig;

/// Upper bound for the reconnect delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub project_url: String,
    pub api_key: String,
    pub tables: Vec<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
}

impl RealtimeConfig {
    /// `None` when the project URL or service key is missing
    pub fn from_supabase_config(config: &SupabaseConfig, tables: &[&str]) -> Option<Self> {
        let project_url = config.url.clone().filter(|u| !u.is_empty())?;
        let api_key = config.service_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            project_url,
            api_key,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval.max(1)),
            reconnect_delay: Duration::from_secs(config.reconnect_delay.max(1)),
        })
    }
}

/// What the socket loop does after a frame
#[derive(Debug, PartialEq, Eq)]
enum FrameAction {
    Continue,
    /// A channel is gone; rejoin everything through a fresh connection
    Reconnect(String),
    /// Receiver dropped
    Shutdown,
}

/// Why a connection ended
enum Disconnect {
    /// Receiver dropped; the relay is shutting down
    Shutdown,
    /// Socket closed or failed; reconnect
    Lost(String),
}

pub struct RealtimeClient {
    config: RealtimeConfig,
    next_ref: u64,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            next_ref: 0,
        }
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    /// Run until the event receiver is dropped
    pub async fn run(mut self, tx: mpsc::Sender<ChangeEvent>) {
        info!(
            tables = ?self.config.tables,
            heartbeat_secs = self.config.heartbeat_interval.as_secs(),
            "Realtime listener started"
        );

        let mut attempt: u32 = 0;
        loop {
            match self.connect_and_listen(&tx, &mut attempt).await {
                Ok(Disconnect::Shutdown) => break,
                Ok(Disconnect::Lost(reason)) => {
                    warn!(reason = %reason, "Realtime connection lost");
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Realtime connection failed");
                }
            }

            if tx.is_closed() {
                break;
            }

            let delay = backoff_delay(self.config.reconnect_delay, attempt);
            attempt = attempt.saturating_add(1);
            info!(delay_secs = delay.as_secs(), attempt, "Reconnecting to realtime");
            sleep(delay).await;
        }

        info!("Realtime listener stopped");
    }

    async fn connect_and_listen(
        &mut self,
        tx: &mpsc::Sender<ChangeEvent>,
        attempt: &mut u32,
    ) -> Result<Disconnect> {
        let url = protocol::websocket_url(&self.config.project_url, &self.config.api_key)?;

        let (socket, _) = connect_async(url.as_str())
            .await
            .context("Failed to open realtime websocket")?;
        let (mut sink, mut stream) = socket.split();

        for table in self.config.tables.clone() {
            let msg_ref = self.make_ref();
            let join = protocol::join(&table, &self.config.api_key, &msg_ref);
            sink.send(Message::Text(protocol::encode(&join)?))
                .await
                .with_context(|| format!("Failed to join channel for {}", table))?;
            debug!(table = %table, msg_ref = %msg_ref, "Joining realtime channel");
        }

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let msg_ref = self.make_ref();
                    let beat = protocol::encode(&protocol::heartbeat(&msg_ref))?;
                    if let Err(e) = sink.send(Message::Text(beat)).await {
                        return Ok(Disconnect::Lost(format!("heartbeat failed: {}", e)));
                    }
                }
                _ = tx.closed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(Disconnect::Shutdown);
                }
                frame = stream.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Ok(Disconnect::Lost(e.to_string())),
                        None => return Ok(Disconnect::Lost("stream ended".to_string())),
                    };

                    match message {
                        Message::Text(text) => match self.handle_frame(&text, tx, attempt).await {
                            FrameAction::Continue => {}
                            FrameAction::Reconnect(reason) => {
                                let _ = sink.send(Message::Close(None)).await;
                                return Ok(Disconnect::Lost(reason));
                            }
                            FrameAction::Shutdown => return Ok(Disconnect::Shutdown),
                        },
                        Message::Ping(payload) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Message::Close(frame) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "closed by server".to_string());
                            return Ok(Disconnect::Lost(reason));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// A rejected join or a downed table channel ends the connection so the
    /// outer loop rejoins every table after the backoff delay.
    async fn handle_frame(
        &self,
        text: &str,
        tx: &mpsc::Sender<ChangeEvent>,
        attempt: &mut u32,
    ) -> FrameAction {
        match protocol::decode(text) {
            Ok(Inbound::Change(event)) => {
                debug!(
                    table = %event.table,
                    kind = %event.kind,
                    id = %event.record_id(),
                    "Realtime change received"
                );
                if tx.send(event).await.is_err() {
                    return FrameAction::Shutdown;
                }
            }
            Ok(Inbound::Reply { topic, msg_ref, ok: true, .. }) => {
                if topic != "phoenix" {
                    info!(topic = %topic, msg_ref = ?msg_ref, "Subscribed to realtime channel");
                    *attempt = 0;
                }
            }
            Ok(Inbound::Reply { topic, msg_ref, response, .. }) => {
                error!(
                    topic = %topic,
                    msg_ref = ?msg_ref,
                    response = %response,
                    "Realtime channel rejected request"
                );
                if topic != "phoenix" {
                    return FrameAction::Reconnect(format!("join rejected for {}", topic));
                }
            }
            Ok(Inbound::ChannelDown { topic, reason }) => {
                warn!(topic = %topic, reason = %reason, "Realtime channel went down");
                return FrameAction::Reconnect(format!("{} on {}", reason, topic));
            }
            Ok(Inbound::Other { topic, event }) => {
                debug!(topic = %topic, event = %event, "Ignoring realtime message");
            }
            Err(e) => {
                warn!(error = %e, "Failed to decode realtime frame");
            }
        }
        FrameAction::Continue
    }
}

/// `base * 2^attempt`, capped at [`MAX_RECONNECT_DELAY`]
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(MAX_RECONNECT_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RealtimeClient {
        RealtimeClient::new(RealtimeConfig {
            project_url: "https://abc.supabase.co".to_string(),
            api_key: "key".to_string(),
            tables: vec!["jobs".to_string()],
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
        })
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(5);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(40));
        assert_eq!(backoff_delay(base, 4), MAX_RECONNECT_DELAY);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_config_requires_credentials() {
        let mut supabase = SupabaseConfig::default();
        assert!(RealtimeConfig::from_supabase_config(&supabase, &["jobs"]).is_none());

        supabase.url = Some("https://abc.supabase.co".to_string());
        supabase.service_key = Some("key".to_string());
        let config = RealtimeConfig::from_supabase_config(&supabase, &["jobs", "profiles"]).unwrap();
        assert_eq!(config.tables, vec!["jobs", "profiles"]);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_refs_increment() {
        let mut client = client();
        assert_eq!(client.make_ref(), "1");
        assert_eq!(client.make_ref(), "2");
    }

    #[tokio::test]
    async fn test_handle_frame_forwards_changes() {
        let client = client();
        let (tx, mut rx) = mpsc::channel(4);
        let mut attempt = 3;

        let frame = json!({
            "topic": "realtime:relay-jobs",
            "event": "postgres_changes",
            "payload": {"data": {"table": "jobs", "type": "INSERT", "record": {"id": "job-1"}}},
            "ref": null
        })
        .to_string();
        assert_eq!(
            client.handle_frame(&frame, &tx, &mut attempt).await,
            FrameAction::Continue
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, "jobs");
        assert_eq!(event.kind, ChangeKind::Insert);

        // A successful join resets the reconnect counter
        let reply = r#"{"topic":"realtime:relay-jobs","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(
            client.handle_frame(reply, &tx, &mut attempt).await,
            FrameAction::Continue
        );
        assert_eq!(attempt, 0);

        // Garbage is logged and skipped
        assert_eq!(
            client.handle_frame("{{{", &tx, &mut attempt).await,
            FrameAction::Continue
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_frame_reports_closed_receiver() {
        let client = client();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut attempt = 0;

        let frame = r#"{"topic":"realtime:relay-jobs","event":"postgres_changes","payload":{"data":{"table":"jobs","type":"INSERT","record":{}}}}"#;
        assert_eq!(
            client.handle_frame(frame, &tx, &mut attempt).await,
            FrameAction::Shutdown
        );
    }

    #[tokio::test]
    async fn test_handle_frame_reconnects_when_channel_goes_down() {
        let client = client();
        let (tx, _rx) = mpsc::channel(1);
        let mut attempt = 2;

        let error = r#"{"topic":"realtime:relay-jobs","event":"phx_error","payload":{},"ref":null}"#;
        assert_eq!(
            client.handle_frame(error, &tx, &mut attempt).await,
            FrameAction::Reconnect("phx_error on realtime:relay-jobs".to_string())
        );

        let close = r#"{"topic":"realtime:relay-profiles","event":"phx_close","payload":{},"ref":null}"#;
        assert!(matches!(
            client.handle_frame(close, &tx, &mut attempt).await,
            FrameAction::Reconnect(_)
        ));

        // The backoff keeps growing until a join succeeds
        assert_eq!(attempt, 2);
    }

    #[tokio::test]
    async fn test_handle_frame_reconnects_on_rejected_join() {
        let client = client();
        let (tx, _rx) = mpsc::channel(1);
        let mut attempt = 0;

        let rejected = r#"{"topic":"realtime:relay-applications","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#;
        assert_eq!(
            client.handle_frame(rejected, &tx, &mut attempt).await,
            FrameAction::Reconnect("join rejected for realtime:relay-applications".to_string())
        );

        // A failed heartbeat reply is not a channel failure
        let heartbeat = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"error","response":{}},"ref":"2"}"#;
        assert_eq!(
            client.handle_frame(heartbeat, &tx, &mut attempt).await,
            FrameAction::Continue
        );
    }
}
