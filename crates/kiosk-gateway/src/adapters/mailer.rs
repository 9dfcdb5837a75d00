//! Voucher delivery.
//!
//! | Notifier | Used when |
//! |----------|-----------|
//! | `SmtpMailer` | `EMAIL_USER` and `EMAIL_PASS` are set (STARTTLS) |
//! | `HttpMailer` | an HTTP mail relay URL is set |
//! | `LogMailer` | explicitly requested for development |
//! | `UnconfiguredMailer` | none of the above; every send fails |

use crate::domain::config::MailerConfig;
use crate::domain::GatewayError;
use crate::ports::outbound::{NotifierError, VoucherNotifier};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use tracing::{info, warn};

/// SMTP-backed [`VoucherNotifier`]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    subject: String,
}

impl SmtpMailer {
    /// Build a STARTTLS transport from the mailer settings. No connection is
    /// made until the first voucher is sent.
    pub fn new(config: &MailerConfig) -> Result<Self, GatewayError> {
        let (username, password) = config.smtp_credentials().ok_or_else(|| {
            GatewayError::Config("SMTP needs both EMAIL_USER and EMAIL_PASS".into())
        })?;
        let sender: Mailbox = config.sender.parse().map_err(|e| {
            GatewayError::Config(format!("invalid sender address {:?}: {}", config.sender, e))
        })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| GatewayError::Client(format!("smtp transport: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(config.request_timeout))
            .build();

        Ok(Self {
            transport,
            sender,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl VoucherNotifier for SmtpMailer {
    async fn send_voucher(&self, recipient: &str, code: &str) -> Result<(), NotifierError> {
        validate_recipient(recipient)?;
        let to: Mailbox = recipient
            .trim()
            .parse()
            .map_err(|_| NotifierError::InvalidRecipient(recipient.to_string()))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(render_voucher_html(code))
            .map_err(|e| NotifierError::Message(e.to_string()))?;

        self.transport.send(message).await?;
        info!(recipient = %recipient, "Voucher email sent");
        Ok(())
    }
}

/// Message body accepted by the relay
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}

/// Relay-backed [`VoucherNotifier`]
pub struct HttpMailer {
    http_client: reqwest::Client,
    relay_url: String,
    config: MailerConfig,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>, config: MailerConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Client(format!("mail relay client: {}", e)))?;

        Ok(Self {
            http_client,
            relay_url: relay_url.into(),
            config,
        })
    }
}

#[async_trait]
impl VoucherNotifier for HttpMailer {
    async fn send_voucher(&self, recipient: &str, code: &str) -> Result<(), NotifierError> {
        validate_recipient(recipient)?;

        let message = RelayMessage {
            from: &self.config.sender,
            to: recipient,
            subject: &self.config.subject,
            html: render_voucher_html(code),
        };

        let mut request = self.http_client.post(&self.relay_url).json(&message);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifierError::Rejected {
                status: response.status().as_u16(),
            });
        }

        info!(recipient = %recipient, "Voucher email sent");
        Ok(())
    }
}

/// [`VoucherNotifier`] that only logs. Development and tests only.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl VoucherNotifier for LogMailer {
    async fn send_voucher(&self, recipient: &str, code: &str) -> Result<(), NotifierError> {
        validate_recipient(recipient)?;
        info!(recipient = %recipient, code = %code, "Log-only mailer, voucher not sent");
        Ok(())
    }
}

/// [`VoucherNotifier`] for a kiosk with no mail transport; every send fails
#[derive(Debug, Default)]
pub struct UnconfiguredMailer;

#[async_trait]
impl VoucherNotifier for UnconfiguredMailer {
    async fn send_voucher(&self, recipient: &str, _code: &str) -> Result<(), NotifierError> {
        warn!(recipient = %recipient, "Voucher requested but no mail transport is configured");
        Err(NotifierError::NotConfigured)
    }
}

fn validate_recipient(recipient: &str) -> Result<(), NotifierError> {
    let trimmed = recipient.trim();
    let well_formed = !trimmed.contains(char::is_whitespace)
        && matches!(
            trimmed.split_once('@'),
            Some((local, domain)) if !local.is_empty() && !domain.is_empty()
        );
    if well_formed {
        Ok(())
    } else {
        Err(NotifierError::InvalidRecipient(recipient.to_string()))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// HTML body of the voucher email
pub fn render_voucher_html(code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 8px;">
  <div style="text-align: center; margin-bottom: 20px;">
    <h1 style="color: #2e7d32; margin-bottom: 10px;">Thank You for Recycling!</h1>
    <p style="color: #666; font-size: 16px;">Your recycling efforts help make our planet greener.</p>
  </div>
  <div style="background-color: #f5f5f5; padding: 20px; border-radius: 6px; margin: 20px 0;">
    <h2 style="color: #1b5e20; margin-top: 0;">Your Voucher Code</h2>
    <div style="background-color: white; padding: 15px; border-radius: 4px; text-align: center; font-size: 24px; font-weight: bold; color: #2e7d32; letter-spacing: 2px;">
      {code}
    </div>
  </div>
  <div style="color: #666; font-size: 14px; margin-top: 20px;">
    <p>Please keep this code safe. You can use it to redeem your rewards.</p>
    <p style="margin-top: 10px;">Thank you for your contribution to a sustainable future!</p>
  </div>
  <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #e0e0e0; text-align: center; color: #999; font-size: 12px;">
    <p>This is an automated message, please do not reply to this email.</p>
  </div>
</div>"#,
        code = escape_html(code)
    )
}
