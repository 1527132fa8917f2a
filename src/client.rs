// src/client.rs
// Requester side of the fiber protocol.

use base64::Engine;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::backend::{InferenceOutput, InferenceTask};
use crate::constants::{
    HEADER_KEY_UUID, HEADER_NODE_ID, HEADER_PEER_ID, ROUTE_CHALLENGE, ROUTE_KEY_EXCHANGE,
    ROUTE_PUBLIC_KEY,
};
use crate::error::{DecryptionError, EncryptionError};
use crate::network::message::{
    HandshakeRequired, KeyExchangeRequest, KeyExchangeResponse, PublicKeyResponse,
};
use crate::security::{seal_for, Direction, SessionKey};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("responder returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("key exchange refused: {0}")]
    Rejected(String),
    #[error("no session; call handshake first")]
    NoSession,
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error("reply could not be decrypted: {0}")]
    Decryption(#[from] DecryptionError),
    #[error("reply is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inference failed on responder: {0}")]
    Inference(String),
    #[error("responder still requires a handshake after retry")]
    HandshakeLoop,
}

struct ClientSession {
    key: SessionKey,
    key_id: String,
}

/// Raw challenge response, before decryption.
#[derive(Debug)]
pub struct RawReply {
    pub status: StatusCode,
    pub key_id: Option<String>,
    pub node_id: Option<String>,
    pub body: Vec<u8>,
}

pub struct FiberClient {
    http: reqwest::Client,
    base_url: String,
    peer_id: String,
    session: Mutex<Option<ClientSession>>,
}

impl FiberClient {
    pub fn new(base_url: impl Into<String>, peer_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(330))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            peer_id: peer_id.into(),
            session: Mutex::new(None),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    pub async fn public_key(&self) -> Result<PublicKeyResponse, ClientError> {
        let resp = self.http.get(self.url(ROUTE_PUBLIC_KEY)).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Two-step handshake: fetch the public key, then submit a fresh session key.
    pub async fn handshake(&self) -> Result<KeyExchangeResponse, ClientError> {
        let pk = self.public_key().await?;
        self.handshake_with(&pk.public_key).await
    }

    /// Submit a fresh session key sealed to `public_key`.
    pub async fn handshake_with(
        &self,
        public_key: &str,
    ) -> Result<KeyExchangeResponse, ClientError> {
        let key = SessionKey::generate();
        let key_id = uuid::Uuid::new_v4().to_string();
        let sealed = seal_for(public_key, key.as_bytes())?;
        let req = KeyExchangeRequest {
            encrypted_symmetric_key: base64::engine::general_purpose::STANDARD.encode(sealed),
            symmetric_key_uuid: key_id.clone(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
            nonce: uuid::Uuid::new_v4().to_string(),
            signature: None,
            peer_id: Some(self.peer_id.clone()),
        };
        let resp = self
            .http
            .post(self.url(ROUTE_KEY_EXCHANGE))
            .header(HEADER_PEER_ID, &self.peer_id)
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        let raw = resp.bytes().await?;
        let body: KeyExchangeResponse = match serde_json::from_slice(&raw) {
            Ok(b) => b,
            Err(_) => {
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&raw).into_owned(),
                })
            }
        };
        if !status.is_success() || !body.success {
            return Err(ClientError::Rejected(body.message));
        }
        *self.session.lock() = Some(ClientSession { key, key_id });
        Ok(body)
    }

    /// Encrypt `task` under the current session and send it. A 401 re-handshake
    /// signal triggers one handshake against the embedded key and one retry.
    pub async fn challenge(&self, task: &InferenceTask) -> Result<InferenceOutput, ClientError> {
        let plaintext = serde_json::to_vec(task)?;
        let reply = self.send_encrypted(&plaintext).await?;
        let reply = if reply.status == StatusCode::UNAUTHORIZED {
            let signal: HandshakeRequired = serde_json::from_slice(&reply.body)?;
            self.handshake_with(&signal.public_key).await?;
            let retry = self.send_encrypted(&plaintext).await?;
            if retry.status == StatusCode::UNAUTHORIZED {
                return Err(ClientError::HandshakeLoop);
            }
            retry
        } else {
            reply
        };
        self.decode_reply(reply)
    }

    async fn send_encrypted(&self, plaintext: &[u8]) -> Result<RawReply, ClientError> {
        let sealed = {
            let guard = self.session.lock();
            match guard.as_ref() {
                Some(s) => Some((
                    s.key.seal(Direction::Request, &s.key_id, plaintext)?,
                    s.key_id.clone(),
                )),
                None => None,
            }
        };
        match sealed {
            Some((body, key_id)) => self.send_raw(body, Some(&key_id)).await,
            // No session yet: an empty body draws the re-handshake signal.
            None => self.send_raw(Vec::new(), None).await,
        }
    }

    /// Post bytes to the challenge endpoint as-is.
    pub async fn send_raw(
        &self,
        body: Vec<u8>,
        key_id: Option<&str>,
    ) -> Result<RawReply, ClientError> {
        let mut req = self
            .http
            .post(self.url(ROUTE_CHALLENGE))
            .header(HEADER_PEER_ID, &self.peer_id)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        if let Some(k) = key_id {
            req = req.header(HEADER_KEY_UUID, k);
        }
        let resp = req.send().await?;
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = resp.status();
        let key_id = header(HEADER_KEY_UUID);
        let node_id = header(HEADER_NODE_ID);
        let body = resp.bytes().await?.to_vec();
        Ok(RawReply {
            status,
            key_id,
            node_id,
            body,
        })
    }

    /// Seal a request body with the current session key (for driving `send_raw`).
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, String), ClientError> {
        let guard = self.session.lock();
        let s = guard.as_ref().ok_or(ClientError::NoSession)?;
        Ok((
            s.key.seal(Direction::Request, &s.key_id, plaintext)?,
            s.key_id.clone(),
        ))
    }

    /// Open a reply sealed by the responder under the current session.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, ClientError> {
        let guard = self.session.lock();
        let s = guard.as_ref().ok_or(ClientError::NoSession)?;
        Ok(s.key.open(Direction::Reply, &s.key_id, sealed)?)
    }

    fn decode_reply(&self, reply: RawReply) -> Result<InferenceOutput, ClientError> {
        match reply.status {
            StatusCode::OK => Ok(serde_json::from_slice(&self.open(&reply.body)?)?),
            StatusCode::BAD_GATEWAY => {
                let body: serde_json::Value = serde_json::from_slice(&self.open(&reply.body)?)?;
                Err(ClientError::Inference(
                    body.get("error")
                        .and_then(|e| e.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                ))
            }
            status => Err(ClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&reply.body).into_owned(),
            }),
        }
    }
}

async fn status_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ClientError::Status { status, body }
}
