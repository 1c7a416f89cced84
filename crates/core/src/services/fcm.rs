//! Firebase Cloud Messaging (HTTP v1) push sender.
//!
//! Authenticates with a service-account JWT exchanged for an OAuth2 access
//! token, which is cached until shortly before it expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use mozo_common::{AppError, AppResult, FcmConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use super::push_notification::{PushPayload, PushPriority, PushSendError, PushSender};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the provider-reported expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct ServiceAccountClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// FCM HTTP v1 client.
pub struct FcmClient {
    http: reqwest::Client,
    config: FcmConfig,
    key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    /// Create a client from service-account credentials.
    pub fn new(config: FcmConfig, timeout: std::time::Duration) -> AppResult<Self> {
        // Keys pasted into env vars usually carry literal "\n"
        let pem = config.private_key.replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid FCM private key: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            key,
            token: Mutex::new(None),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.config.project_id
        )
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, PushSendError> {
        let iat = now.timestamp();
        let claims = ServiceAccountClaims {
            iss: &self.config.client_email,
            scope: FCM_SCOPE,
            aud: &self.config.token_uri,
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| PushSendError::Transport(format!("Failed to sign assertion: {e}")))
    }

    async fn access_token(&self) -> Result<String, PushSendError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.refresh_at > now) {
            return Ok(token.value.clone());
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PushSendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushSendError::Transport(format!(
                "token exchange failed with {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PushSendError::Transport(e.to_string()))?;

        let lifetime = (token.expires_in - TOKEN_REFRESH_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: now + Duration::seconds(lifetime),
        });

        tracing::debug!(expires_in = token.expires_in, "Refreshed FCM access token");
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

/// Build the HTTP v1 message body for one device.
#[must_use]
pub fn build_message(token: &str, payload: &PushPayload, priority: PushPriority) -> Value {
    let data: Map<String, Value> = payload
        .data_map()
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v)))
        .collect();

    let (android_priority, apns_priority) = match priority {
        PushPriority::High => ("HIGH", "10"),
        PushPriority::Normal => ("NORMAL", "5"),
    };

    json!({
        "message": {
            "token": token,
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": data,
            "android": { "priority": android_priority },
            "apns": { "headers": { "apns-priority": apns_priority } },
        }
    })
}

/// Classify an FCM error response.
///
/// `UNREGISTERED` and `INVALID_ARGUMENT` (malformed token) mean the token
/// will never work again; everything else may be retried.
#[must_use]
pub fn classify_error(status: u16, body: &str) -> PushSendError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];

    let error_code = error["details"]
        .as_array()
        .and_then(|details| {
            details
                .iter()
                .find_map(|d| d["errorCode"].as_str().map(ToString::to_string))
        })
        .or_else(|| error["status"].as_str().map(ToString::to_string));

    match (status, error_code.as_deref()) {
        (404, _) | (_, Some("UNREGISTERED" | "INVALID_ARGUMENT")) => PushSendError::InvalidToken,
        _ => PushSendError::Transport(format!(
            "FCM returned {status}: {}",
            error["message"].as_str().unwrap_or("unknown error")
        )),
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(
        &self,
        token: &str,
        payload: &PushPayload,
        priority: PushPriority,
    ) -> Result<(), PushSendError> {
        let access_token = self.access_token().await?;

        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&build_message(token, payload, priority))
            .send()
            .await
            .map_err(|e| PushSendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::push_notification::{PushData, PushNotificationType};
    use mozo_db::entities::waiter_call::CallStatus;

    fn payload() -> PushPayload {
        PushPayload {
            notification_type: PushNotificationType::NewCall,
            title: "Table 5".to_string(),
            body: "Call from table 5".to_string(),
            data: PushData {
                call_id: "c1".to_string(),
                table_id: "t5".to_string(),
                status: CallStatus::Pending,
            },
        }
    }

    #[test]
    fn test_build_message() {
        let message = build_message("device-token", &payload(), PushPriority::High);

        assert_eq!(message["message"]["token"], "device-token");
        assert_eq!(message["message"]["notification"]["title"], "Table 5");
        assert_eq!(message["message"]["data"]["type"], "new_call");
        assert_eq!(message["message"]["data"]["status"], "pending");
        assert_eq!(message["message"]["android"]["priority"], "HIGH");
        assert_eq!(message["message"]["apns"]["headers"]["apns-priority"], "10");
    }

    #[test]
    fn test_classify_unregistered() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND","details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert!(matches!(classify_error(404, body), PushSendError::InvalidToken));
    }

    #[test]
    fn test_classify_invalid_argument() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify_error(400, body), PushSendError::InvalidToken));
    }

    #[test]
    fn test_classify_transient() {
        let body = r#"{"error":{"code":503,"message":"The service is currently unavailable.","status":"UNAVAILABLE"}}"#;
        match classify_error(503, body) {
            PushSendError::Transport(message) => assert!(message.contains("503")),
            PushSendError::InvalidToken => panic!("unavailable must not drop the token"),
        }
        assert!(matches!(classify_error(500, "not json"), PushSendError::Transport(_)));
    }

    #[test]
    fn test_rejects_malformed_key() {
        let config = FcmConfig {
            project_id: "mozo-test".to_string(),
            client_email: "push@mozo-test.iam.gserviceaccount.com".to_string(),
            private_key: "not a key".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        };

        let result = FcmClient::new(config, std::time::Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
