//! Stack chat transport over HTTP: a sidecar process holds the chat login and websocket,
//! this side posts outbound messages and edits to it.
//!
//! Inbound Stack events arrive the other way, as POSTs to the gateway's `/stack/events`.

use crate::channels::inbound::{MessageId, Network};
use crate::channels::transport::{RoomTransport, TransportError};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    #[serde(default)]
    ok: bool,
}

/// Sidecar client for one Stack chat host.
pub struct SidecarTransport {
    base_url: String,
    client: reqwest::Client,
}

impl SidecarTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn room_url(&self, room_id: &str) -> Result<String, TransportError> {
        if room_id.is_empty() || !room_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(TransportError::InvalidRoom(room_id.to_string()));
        }
        Ok(format!("{}/rooms/{}", self.base_url, room_id))
    }

    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<reqwest::Response, String> {
        let res = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl RoomTransport for SidecarTransport {
    fn network(&self) -> Network {
        Network::StackExchange
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError> {
        let url = format!("{}/messages", self.room_url(room_id)?);
        let send_err = |reason: String| TransportError::Send {
            room: room_id.to_string(),
            reason,
        };
        let res = self
            .post_json(&url, serde_json::json!({ "text": text }))
            .await
            .map_err(send_err)?;
        let data: SendResponse = res.json().await.map_err(|e| send_err(e.to_string()))?;
        Ok(data.message_id)
    }

    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        let url = format!("{}/messages/{}/edit", self.room_url(room_id)?, message_id);
        let edit_err = |reason: String| TransportError::Edit {
            room: room_id.to_string(),
            message_id,
            reason,
        };
        let res = self
            .post_json(&url, serde_json::json!({ "text": text }))
            .await
            .map_err(edit_err)?;
        let data: EditResponse = res.json().await.map_err(|e| edit_err(e.to_string()))?;
        Ok(data.ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_url_trims_trailing_slash() {
        let t = SidecarTransport::new("http://127.0.0.1:9000/");
        assert_eq!(t.room_url("42").unwrap(), "http://127.0.0.1:9000/rooms/42");
    }

    #[test]
    fn room_url_rejects_non_numeric_room() {
        let t = SidecarTransport::new("http://127.0.0.1:9000");
        assert!(matches!(
            t.room_url("../admin"),
            Err(TransportError::InvalidRoom(_))
        ));
        assert!(t.room_url("").is_err());
    }
}
