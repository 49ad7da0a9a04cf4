// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway over a PostgREST-style REST collection.
//!
//! Messages are rows of one table. Appends `POST` a row and ask for the
//! inserted representation back; listing filters on the consultation and
//! orders by server creation time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use consult_core::{
    ClientId, ConsultationId, Message, Receipt, RemoteId, RemoteMessage, SenderRole,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::gateway::{Gateway, GatewayError, GatewayFuture, GatewayResult};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

/// Longest server error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Row sent on append.
#[derive(Debug, Serialize)]
struct NewRow<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    consultation_id: &'a str,
    sender_id: &'a str,
    sender_type: &'a str,
    message: &'a str,
    created_at: String,
}

/// Row as returned by the gateway.
#[derive(Debug, Deserialize)]
struct Row {
    id: serde_json::Value,
    created_at: String,
    #[serde(default)]
    consultation_id: Option<serde_json::Value>,
    #[serde(default)]
    sender_id: Option<serde_json::Value>,
    #[serde(default)]
    sender_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

/// Renders an id column that may be numeric or textual.
fn id_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a server timestamp. Columns without a zone are taken as UTC.
fn parse_server_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

impl Row {
    fn receipt(&self) -> GatewayResult<Receipt> {
        let remote_created_at = parse_server_time(&self.created_at).ok_or_else(|| {
            GatewayError::Network(format!("invalid created_at '{}'", self.created_at))
        })?;
        let remote_id = id_text(&self.id);
        if remote_id.is_empty() {
            return Err(GatewayError::Network("inserted row has no id".to_string()));
        }
        Ok(Receipt {
            remote_id: RemoteId::new(remote_id),
            remote_created_at,
        })
    }

    fn into_remote(self, roles: &RoleNames) -> std::result::Result<RemoteMessage, String> {
        let receipt = self.receipt().map_err(|e| e.to_string())?;
        let consultation = self
            .consultation_id
            .as_ref()
            .map(id_text)
            .ok_or("missing consultation_id")?;
        let sender_role = roles.parse(self.sender_type.as_deref().ok_or("missing sender_type")?)?;
        Ok(RemoteMessage {
            remote_id: receipt.remote_id,
            remote_created_at: receipt.remote_created_at,
            consultation_id: ConsultationId::new(consultation).map_err(|e| e.to_string())?,
            sender_id: self.sender_id.as_ref().map(id_text).unwrap_or_default(),
            sender_role,
            body: self.message.unwrap_or_default(),
            client_id: self.client_id.as_deref().and_then(|id| id.parse::<ClientId>().ok()),
        })
    }
}

/// The table's spelling of each sender role.
#[derive(Debug, Clone)]
struct RoleNames {
    reporter: String,
    specialist: String,
}

impl RoleNames {
    fn wire(&self, role: SenderRole) -> &str {
        match role {
            SenderRole::Reporter => &self.reporter,
            SenderRole::Specialist => &self.specialist,
        }
    }

    /// Accepts the table's spelling first, then the built-in names.
    fn parse(&self, value: &str) -> std::result::Result<SenderRole, String> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(&self.reporter) {
            return Ok(SenderRole::Reporter);
        }
        if value.eq_ignore_ascii_case(&self.specialist) {
            return Ok(SenderRole::Specialist);
        }
        value
            .parse::<SenderRole>()
            .map_err(|e: consult_core::Error| e.to_string())
    }
}

/// HTTP gateway for a Supabase/PostgREST messages table.
pub struct HttpGateway {
    client: reqwest::Client,
    collection_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
    /// Cleared for good once the table turns out to lack the column.
    send_client_id: AtomicBool,
    roles: RoleNames,
}

impl HttpGateway {
    /// Builds a gateway from configuration and an optional user token.
    ///
    /// Without a token, requests authenticate with the API key alone.
    pub fn new(config: &GatewayConfig, access_token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| Error::Config(format!("invalid api key header value: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpGateway {
            client,
            collection_url: format!("{}/{}", config.url.trim_end_matches('/'), config.table),
            api_key: config.api_key.clone(),
            access_token: RwLock::new(access_token.filter(|t| !t.is_empty())),
            send_client_id: AtomicBool::new(config.send_client_id),
            roles: RoleNames {
                reporter: config.reporter_type.trim().to_string(),
                specialist: config.specialist_type.trim().to_string(),
            },
        })
    }

    /// Replaces the user token after re-authentication.
    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = token.filter(|t| !t.is_empty());
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        format!("Bearer {token}")
    }

    fn list_url(
        &self,
        consultation_id: &ConsultationId,
        cursor: Option<DateTime<Utc>>,
    ) -> GatewayResult<Url> {
        let mut params = vec![
            ("consultation_id", format!("eq.{}", consultation_id)),
            ("order", "created_at.asc,id.asc".to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push((
                "created_at",
                format!("gte.{}", cursor.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
            ));
        }
        Url::parse_with_params(&self.collection_url, &params)
            .map_err(|e| GatewayError::Network(format!("invalid gateway url: {e}")))
    }

    async fn append_row(&self, message: &Message) -> GatewayResult<Receipt> {
        let with_client_id = self.send_client_id.load(Ordering::Acquire);
        match self.post_row(message, with_client_id).await {
            Err(GatewayError::Server {
                status: 400,
                message: ref detail,
            }) if with_client_id && detail.contains("client_id") => {
                warn!(%detail, "gateway table has no client_id column, no longer sending it");
                self.send_client_id.store(false, Ordering::Release);
                self.post_row(message, false).await
            }
            other => other,
        }
    }

    async fn post_row(&self, message: &Message, with_client_id: bool) -> GatewayResult<Receipt> {
        let row = NewRow {
            client_id: with_client_id.then(|| message.client_id.to_string()),
            consultation_id: message.consultation_id.as_str(),
            sender_id: &message.sender_id,
            sender_type: self.roles.wire(message.sender_role),
            message: &message.body,
            created_at: message.created_at.to_rfc3339(),
        };

        let response = self
            .client
            .post(&self.collection_url)
            .header(AUTHORIZATION, self.bearer())
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("HTTP request failed: {e}")))?;

        let rows: Vec<Row> = decode(check_status(response).await?).await?;
        let receipt = rows
            .first()
            .ok_or_else(|| GatewayError::Network("insert returned no rows".to_string()))?
            .receipt()?;
        debug!(client_id = %message.client_id, remote_id = %receipt.remote_id, "append confirmed");
        Ok(receipt)
    }

    async fn list_rows(
        &self,
        consultation_id: &ConsultationId,
        cursor: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<RemoteMessage>> {
        let url = self.list_url(consultation_id, cursor)?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("HTTP request failed: {e}")))?;

        let rows: Vec<Row> = decode(check_status(response).await?).await?;
        let total = rows.len();
        let mut messages = Vec::with_capacity(total);
        for row in rows {
            match row.into_remote(&self.roles) {
                Ok(message) => messages.push(message),
                Err(reason) => warn!(consultation = %consultation_id, %reason, "skipping malformed row"),
            }
        }
        debug!(consultation = %consultation_id, rows = total, kept = messages.len(), "listed messages");
        Ok(messages)
    }
}

/// Maps an error status to the gateway taxonomy.
async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(GatewayError::Auth(format!("{status}: {body}")))
        }
        _ => Err(GatewayError::Server {
            status: status.as_u16(),
            message: body,
        }),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::Network(format!("failed to read response body: {e}")))?;
    serde_json::from_str(&body)
        .map_err(|e| GatewayError::Network(format!("failed to parse response: {e}")))
}

impl Gateway for HttpGateway {
    fn append<'a>(&'a self, message: &'a Message) -> GatewayFuture<'a, Receipt> {
        Box::pin(self.append_row(message))
    }

    fn list_since<'a>(
        &'a self,
        consultation_id: &'a ConsultationId,
        cursor: Option<DateTime<Utc>>,
    ) -> GatewayFuture<'a, Vec<RemoteMessage>> {
        Box::pin(self.list_rows(consultation_id, cursor))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
