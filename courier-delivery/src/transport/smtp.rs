//! SMTP delivery over `lettre`
//!
//! Settings are read from the environment:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_SERVER` | No | Relay hostname (default: `smtp.gmail.com`) |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
//! | `EMAIL_ADDRESS` | Yes | Sender address, also used as the login |
//! | `EMAIL_PASSWORD` | Unless `SMTP_TLS=none` | Login password |
//! | `SMTP_TIMEOUT_SECS` | No | Limit on one whole delivery (default: 60) |

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use courier_common::internal;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::{MailTransport, OutboundMessage, TransportError};

const DEFAULT_SERVER: &str = "smtp.gmail.com";
const DEFAULT_PORT: u16 = 587;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS
    #[default]
    StartTls,
    /// TLS from the first byte
    Tls,
    /// No encryption and no login. Only for local relays and testing.
    None,
}

impl FromStr for SmtpSecurity {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" => Ok(Self::Tls),
            "none" => Ok(Self::None),
            other => Err(TransportError::Configuration(format!(
                "SMTP_TLS must be one of starttls, tls or none, got {other:?}"
            ))),
        }
    }
}

/// Connection settings for [`SmtpTransport`]
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub sender: String,
    pub password: Option<String>,
    /// Upper bound on a single delivery, connection included
    pub timeout: Duration,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("sender", &self.sender)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SmtpConfig {
    /// Read the settings from the process environment
    ///
    /// # Errors
    /// If a required variable is missing or a value cannot be parsed
    pub fn from_env() -> Result<Self, TransportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`, which maps a variable name to its value
    ///
    /// # Errors
    /// If a required variable is missing or a value cannot be parsed
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TransportError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server = non_empty("SMTP_SERVER").unwrap_or_else(|| DEFAULT_SERVER.to_string());

        let port = non_empty("SMTP_PORT")
            .map(|port| {
                port.trim().parse::<u16>().map_err(|err| {
                    TransportError::Configuration(format!("SMTP_PORT {port:?} is invalid: {err}"))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let security = non_empty("SMTP_TLS")
            .map(|tls| tls.parse::<SmtpSecurity>())
            .transpose()?
            .unwrap_or_default();

        let sender = non_empty("EMAIL_ADDRESS").ok_or_else(|| {
            TransportError::Configuration("EMAIL_ADDRESS is not set".to_string())
        })?;

        let password = non_empty("EMAIL_PASSWORD");
        if password.is_none() && security != SmtpSecurity::None {
            return Err(TransportError::Configuration(
                "EMAIL_PASSWORD is not set".to_string(),
            ));
        }

        let timeout = non_empty("SMTP_TIMEOUT_SECS")
            .map(|secs| {
                secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|err| {
                    TransportError::Configuration(format!(
                        "SMTP_TIMEOUT_SECS {secs:?} is invalid: {err}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            server,
            port,
            security,
            sender,
            password,
            timeout,
        })
    }
}

/// Delivers through an authenticated SMTP relay
///
/// Each message is plain text with the configured sender as `From`.
pub struct SmtpTransport {
    sender: Mailbox,
    relay: String,
    timeout: Duration,
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("sender", &self.sender.to_string())
            .field("relay", &self.relay)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Build a transport from `config`
    ///
    /// No connection is made until the first delivery.
    ///
    /// # Errors
    /// If the sender is not a valid mailbox or the relay cannot be set up
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let sender = config.sender.parse::<Mailbox>()?;

        let builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?,
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
            }
        };

        let builder = builder.port(config.port).timeout(Some(config.timeout));
        let builder = match &config.password {
            Some(password) => {
                builder.credentials(Credentials::new(config.sender.clone(), password.clone()))
            }
            None => builder,
        };

        let relay = format!("{}:{}", config.server, config.port);
        internal!(
            level = DEBUG,
            "SMTP transport configured for {relay} ({:?})",
            config.security
        );

        Ok(Self {
            sender,
            relay,
            timeout: config.timeout,
            inner: builder.build(),
        })
    }

    /// Build a transport from the process environment
    ///
    /// # Errors
    /// See [`SmtpConfig::from_env`] and [`SmtpTransport::new`]
    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(&SmtpConfig::from_env()?)
    }

    fn build_message(&self, message: &OutboundMessage) -> Result<Message, TransportError> {
        let recipient = message.recipient.parse::<Mailbox>()?;

        Ok(Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?)
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(recipient = %message.recipient))]
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let email = self.build_message(message)?;

        // lettre's own timeout does not cover a relay that goes quiet mid-session
        let response = tokio::time::timeout(self.timeout, self.inner.send(email))
            .await
            .map_err(|_| {
                TransportError::Unavailable(format!(
                    "{} did not finish within {:?}",
                    self.relay, self.timeout
                ))
            })??;

        internal!(
            level = DEBUG,
            "Relay accepted message for {}: {:?}",
            message.recipient,
            response.code()
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_to_gmail_starttls() {
        let config = SmtpConfig::from_lookup(lookup(&[
            ("EMAIL_ADDRESS", "sender@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap();

        assert_eq!(config.server, "smtp.gmail.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.security, SmtpSecurity::StartTls);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let config = SmtpConfig::from_lookup(lookup(&[
            ("SMTP_SERVER", "mail.example.com"),
            ("SMTP_PORT", "465"),
            ("SMTP_TLS", "TLS"),
            ("SMTP_TIMEOUT_SECS", "30"),
            ("EMAIL_ADDRESS", "sender@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap();

        assert_eq!(config.server, "mail.example.com");
        assert_eq!(config.port, 465);
        assert_eq!(config.security, SmtpSecurity::Tls);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn sender_is_required() {
        let err = SmtpConfig::from_lookup(lookup(&[("EMAIL_PASSWORD", "hunter2")])).unwrap_err();
        assert!(err.to_string().contains("EMAIL_ADDRESS"));
    }

    #[test]
    fn password_is_required_with_tls() {
        let err =
            SmtpConfig::from_lookup(lookup(&[("EMAIL_ADDRESS", "sender@example.com")])).unwrap_err();
        assert!(err.to_string().contains("EMAIL_PASSWORD"));
    }

    #[test]
    fn plain_relay_needs_no_password() {
        let config = SmtpConfig::from_lookup(lookup(&[
            ("SMTP_TLS", "none"),
            ("EMAIL_ADDRESS", "sender@example.com"),
        ]))
        .unwrap();

        assert_eq!(config.password, None);
    }

    #[test]
    fn rejects_bad_port() {
        let err = SmtpConfig::from_lookup(lookup(&[
            ("SMTP_PORT", "smtp"),
            ("EMAIL_ADDRESS", "sender@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap_err();

        assert!(matches!(err, TransportError::Configuration(_)));
    }

    #[test]
    fn debug_hides_password() {
        let config = SmtpConfig::from_lookup(lookup(&[
            ("EMAIL_ADDRESS", "sender@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap();

        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn builds_plain_text_message() {
        let transport = SmtpTransport::new(&SmtpConfig {
            server: "localhost".to_string(),
            port: 2525,
            security: SmtpSecurity::None,
            sender: "sender@example.com".to_string(),
            password: None,
            timeout: DEFAULT_TIMEOUT,
        })
        .unwrap();

        let message = transport
            .build_message(&OutboundMessage {
                recipient: "to@example.com".to_string(),
                subject: "Hello".to_string(),
                body: "Plain body".to_string(),
            })
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: sender@example.com"));
        assert!(raw.contains("To: to@example.com"));
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("Plain body"));
    }

    #[test]
    fn rejects_unparseable_recipient() {
        let transport = SmtpTransport::new(&SmtpConfig {
            server: "localhost".to_string(),
            port: 2525,
            security: SmtpSecurity::None,
            sender: "sender@example.com".to_string(),
            password: None,
            timeout: DEFAULT_TIMEOUT,
        })
        .unwrap();

        let err = transport
            .build_message(&OutboundMessage {
                recipient: "not an address".to_string(),
                subject: String::new(),
                body: String::new(),
            })
            .unwrap_err();

        assert!(matches!(err, TransportError::Address(_)));
    }

    #[tokio::test]
    async fn silent_relay_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept the connection, then never send a greeting
        let relay = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let transport = SmtpTransport::new(&SmtpConfig {
            server: "127.0.0.1".to_string(),
            port,
            security: SmtpSecurity::None,
            sender: "sender@example.com".to_string(),
            password: None,
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.deliver(&OutboundMessage {
                recipient: "to@example.com".to_string(),
                subject: "Hello".to_string(),
                body: "Body".to_string(),
            }),
        )
        .await
        .expect("delivery to a silent relay never returned");

        assert!(matches!(result, Err(TransportError::Unavailable(_))));
        relay.abort();
    }
}
