use crate::redact::RedactionEngine;
use crate::serialize::{cef::serialize_cef, json::serialize_json, leef::serialize_leef};
use cellward_protocol::AuditEvent;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Wire format the exporter serializes a batch into (spec §4.2, §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFormat {
    Json,
    Cef,
    Leef,
}

impl AuditFormat {
    fn content_type(self) -> &'static str {
        match self {
            AuditFormat::Json => "application/json",
            AuditFormat::Cef => "text/plain",
            AuditFormat::Leef => "text/plain",
        }
    }

    fn encode(self, engine: &RedactionEngine, events: &[AuditEvent]) -> String {
        match self {
            AuditFormat::Json => serialize_json(engine, events),
            AuditFormat::Cef => serialize_cef(engine, events),
            AuditFormat::Leef => serialize_leef(engine, events, None),
        }
    }
}

/// How the exporter authenticates to the SIEM endpoint (spec §6.5).
#[derive(Debug, Clone)]
pub enum SiemAuth {
    Bearer(String),
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub endpoint: String,
    pub format: AuditFormat,
    pub auth: Option<SiemAuth>,
    pub extra_headers: Vec<(String, String)>,
    pub idempotency_header: Option<String>,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub jitter: bool,
    pub request_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            format: AuditFormat::Json,
            auth: None,
            extra_headers: Vec::new(),
            idempotency_header: None,
            max_attempts: 5,
            base_backoff: Duration::from_millis(200),
            jitter: true,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExportError {
    #[error("SIEM export failed with status {status}")]
    Status { status: u16, retriable: bool },
    #[error("SIEM export transport error: {message}")]
    Transport { message: String, retriable: bool },
    #[error("SIEM export exhausted {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl ExportError {
    pub fn retriable(&self) -> bool {
        match self {
            ExportError::Status { retriable, .. } => *retriable,
            ExportError::Transport { retriable, .. } => *retriable,
            ExportError::Exhausted { .. } => false,
        }
    }
}

fn status_is_retriable(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

fn idempotency_key(ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ids.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

fn backoff_delay(config: &ExporterConfig, attempt: u32) -> Duration {
    let exp = config.base_backoff.as_millis() as u64 * 2u64.saturating_pow(attempt.saturating_sub(1));
    let millis = if config.jitter {
        let factor = rand::thread_rng().gen_range(0.5..=1.5);
        (exp as f64 * factor) as u64
    } else {
        exp
    };
    Duration::from_millis(millis)
}

/// HTTP exporter for the durable audit pipeline (spec §4.5, §6.5).
pub struct HttpExporter {
    client: reqwest::Client,
    config: ExporterConfig,
    redaction: RedactionEngine,
}

impl HttpExporter {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .expect("reqwest client builds with static config"),
            config,
            redaction: RedactionEngine::new(),
        }
    }

    /// Send one batch, retrying per spec §4.5 up to `max_attempts`.
    /// Redacts a second time, defensively, immediately before
    /// serialization.
    pub async fn send_batch(&self, ids: &[String], events: &[AuditEvent]) -> Result<(), ExportError> {
        let body = self.config.format.encode(&self.redaction, events);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_once(&body, ids).await {
                Ok(()) => return Ok(()),
                Err(err) if err.retriable() && attempt < self.config.max_attempts => {
                    tokio::time::sleep(backoff_delay(&self.config, attempt)).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_once(&self, body: &str, ids: &[String]) -> Result<(), ExportError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", self.config.format.content_type())
            .body(body.to_string());

        request = match &self.config.auth {
            Some(SiemAuth::Bearer(token)) => request.bearer_auth(token),
            Some(SiemAuth::Basic { username, password }) => request.basic_auth(username, Some(password)),
            Some(SiemAuth::Header { name, value }) => request.header(name, value),
            None => request,
        };
        for (name, value) in &self.config.extra_headers {
            request = request.header(name, value);
        }
        if let Some(header_name) = &self.config.idempotency_header {
            request = request.header(header_name, idempotency_key(ids));
        }

        let response = request.send().await.map_err(|e| ExportError::Transport {
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect() || e.is_request(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ExportError::Status {
            status: status.as_u16(),
            retriable: status_is_retriable(status.as_u16()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_and_hex() {
        let key = idempotency_key(&["a".to_string(), "b".to_string()]);
        assert_eq!(key.len(), 64);
        assert_eq!(key, idempotency_key(&["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn retriable_statuses_match_spec_list() {
        assert!(status_is_retriable(500));
        assert!(status_is_retriable(503));
        assert!(status_is_retriable(408));
        assert!(status_is_retriable(429));
        assert!(!status_is_retriable(400));
        assert!(!status_is_retriable(404));
    }
}
