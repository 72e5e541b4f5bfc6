//! Transactional email delivery through a Resend-compatible API.

use serde::{Deserialize, Serialize};
use tierline_core::error::TierlineError;

use crate::error::ProviderError;

const PROVIDER: &str = "email";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl EmailRequest {
    /// All three fields must be present and non-blank.
    pub fn validate(self) -> Result<Email, TierlineError> {
        fn field(v: Option<String>, name: &str) -> Result<String, TierlineError> {
            v.filter(|s| !s.trim().is_empty()).ok_or_else(|| {
                TierlineError::InvalidRequest(format!("missing required field '{name}'"))
            })
        }
        Ok(Email {
            to: field(self.to, "to")?,
            subject: field(self.subject, "subject")?,
            html: field(self.html, "html")?,
        })
    }
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SentEmail {
    id: String,
}

/// Send `email`, returning the provider's message id.
pub async fn send(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    from: &str,
    email: &Email,
) -> Result<String, ProviderError> {
    let api_key = api_key
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::NotConfigured(PROVIDER))?;
    let url = format!("{}/emails", base_url.trim_end_matches('/'));

    let resp = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&OutgoingEmail {
            from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
        })
        .send()
        .await
        .map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: status.as_u16(),
            body,
        });
    }
    let sent: SentEmail = resp
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;
    tracing::info!(message_id = %sent.id, "email sent");
    Ok(sent.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(to: Option<&str>, subject: Option<&str>, html: Option<&str>) -> EmailRequest {
        EmailRequest {
            to: to.map(Into::into),
            subject: subject.map(Into::into),
            html: html.map(Into::into),
        }
    }

    #[test]
    fn every_field_is_required() {
        assert!(req(Some("a@b.c"), Some("Hi"), Some("<p>x</p>")).validate().is_ok());
        for r in [
            req(None, Some("Hi"), Some("<p>x</p>")),
            req(Some("a@b.c"), None, Some("<p>x</p>")),
            req(Some("a@b.c"), Some("Hi"), None),
            req(Some("a@b.c"), Some("  "), Some("<p>x</p>")),
        ] {
            assert!(matches!(r.validate(), Err(TierlineError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn delivers_through_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": ["a@example.com"],
                "subject": "Welcome"
            })))
            .with_status(200)
            .with_body(r#"{"id":"msg_1"}"#)
            .create_async()
            .await;

        let email = req(Some("a@example.com"), Some("Welcome"), Some("<p>hi</p>"))
            .validate()
            .unwrap();
        let client = reqwest::Client::new();
        let id = send(&client, &server.url(), Some("re_test"), "Coach <c@x.io>", &email)
            .await
            .unwrap();
        assert_eq!(id, "msg_1");
        mock.assert_async().await;
    }
}
