use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::env::MailjetCredentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outbound mail. A send is attempted once; `false` means it did not go out.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> bool;
}

/// Used when no provider credentials are configured.
#[derive(Debug, Default)]
pub struct DisabledMailer;

#[rocket::async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: &OutgoingEmail) -> bool {
        warn!(
            subject = %email.subject,
            recipients = email.to.len(),
            "Email delivery is not configured, dropping message"
        );
        false
    }
}

#[derive(Serialize)]
struct MailjetAddress<'a> {
    #[serde(rename = "Email")]
    email: &'a str,
}

#[derive(Serialize)]
struct MailjetMessage<'a> {
    #[serde(rename = "From")]
    from: MailjetAddress<'a>,
    #[serde(rename = "To")]
    to: Vec<MailjetAddress<'a>>,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "TextPart")]
    text: &'a str,
    #[serde(rename = "HTMLPart")]
    html: &'a str,
}

#[derive(Serialize)]
struct MailjetSend<'a> {
    #[serde(rename = "Messages")]
    messages: Vec<MailjetMessage<'a>>,
}

/// Mailjet v3.1 `send` API, authenticated with the key pair.
#[derive(Debug, Clone)]
pub struct MailjetMailer {
    client: reqwest::Client,
    credentials: MailjetCredentials,
}

impl MailjetMailer {
    pub fn new(credentials: MailjetCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    fn send_url(&self) -> String {
        format!("{}/send", self.credentials.api_url.trim_end_matches('/'))
    }
}

#[rocket::async_trait]
impl Mailer for MailjetMailer {
    #[instrument(skip_all, fields(subject = %email.subject, recipients = email.to.len()))]
    async fn send(&self, email: &OutgoingEmail) -> bool {
        let body = MailjetSend {
            messages: vec![MailjetMessage {
                from: MailjetAddress { email: &email.from },
                to: email.to.iter().map(|to| MailjetAddress { email: to }).collect(),
                subject: &email.subject,
                text: &email.text,
                html: &email.html,
            }],
        };

        let response = self
            .client
            .post(self.send_url())
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.secret_key))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Email sent");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                error!(%status, detail = %detail, "Mail provider rejected the message");
                false
            }
            Err(e) => {
                error!(error = %e, "Mail provider request failed");
                false
            }
        }
    }
}
