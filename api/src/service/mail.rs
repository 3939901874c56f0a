use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use lettre::{
    message::MultiPart, transport::smtp::authentication::Credentials, Message, SmtpTransport,
    Transport,
};
use once_cell::sync::Lazy;
use rand::{seq::SliceRandom, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};

use common::error::{self, AddCode};

lazy_static::lazy_static! {
    static ref EMAIL_ADDRESS: String = std::env::var("EMAIL_ADDRESS").unwrap_or_default();
    static ref EMAIL_PASSWORD: String = std::env::var("EMAIL_PASSWORD").unwrap_or_default();
    pub static ref ADMIN_EMAIL: String = std::env::var("ADMIN_EMAIL").unwrap_or_default();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub email: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outbound mail transport. The smtp implementation talks to the relay,
/// the test implementation records letters in memory.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns the provider message id when the relay reports one.
    async fn send(&self, letter: &Letter) -> error::Result<Option<String>>;
}

pub type MailerObject = Arc<dyn Mailer>;

pub struct SmtpMailer;

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, letter: &Letter) -> error::Result<Option<String>> {
        if EMAIL_ADDRESS.is_empty() || EMAIL_PASSWORD.is_empty() {
            return Err(anyhow::anyhow!("Mail credentials are not configured").code(503));
        }

        let to = letter
            .email
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid recipient address: {}", letter.email).code(400))?;
        let from = EMAIL_ADDRESS
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid sender address").code(500))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(letter.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                letter.text.clone(),
                letter.html.clone(),
            ))?;

        let mailer = SmtpTransport::relay("smtp.gmail.com")
            .map_err(|err| anyhow::anyhow!("Bad smtp relay: {}", err).code(500))?
            .credentials(Credentials::new(
                EMAIL_ADDRESS.to_string(),
                EMAIL_PASSWORD.to_string(),
            ))
            .build();

        let response = match mailer.send(&email) {
            Ok(response) => response,
            Err(err) => return Err(anyhow::anyhow!("Error sending email: {}", err).code(502)),
        };
        let first_line = response.message().next().map(str::to_string);
        Ok(first_line)
    }
}

/// Records every letter instead of delivering it. Addresses placed in
/// `fail_for` make `send` return a transport error.
#[derive(Default)]
pub struct TestMailer {
    pub sent: Mutex<Vec<Letter>>,
    pub fail_for: Mutex<HashSet<String>>,
}

impl TestMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_address(&self, email: &str) {
        self.fail_for.lock().unwrap().insert(email.to_lowercase());
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn letters(&self) -> Vec<Letter> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for TestMailer {
    async fn send(&self, letter: &Letter) -> error::Result<Option<String>> {
        if self.fail_for.lock().unwrap().contains(&letter.email) {
            return Err(anyhow::anyhow!("Transport refused {}", letter.email).code(502));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(letter.clone());
        Ok(Some(format!("test-message-{}", sent.len())))
    }
}

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Plain-text fallback for a html body.
pub fn strip_tags(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    BLANK.replace_all(&text, " ").trim().to_string()
}

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%&*+-=?";

/// Random password with at least one character from each class.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let pick = |set: &[u8], rng: &mut rand::rngs::ThreadRng| set[rng.gen_range(0..set.len())];

    let mut chars: Vec<u8> = vec![
        pick(UPPER, &mut rng),
        pick(LOWER, &mut rng),
        pick(DIGITS, &mut rng),
        pick(SYMBOLS, &mut rng),
    ];
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();
    while chars.len() < length {
        chars.push(pick(&all, &mut rng));
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_covers_all_classes() {
        let password = generate_password(12);
        assert_eq!(password.len(), 12);
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_passwords_differ() {
        assert_ne!(generate_password(12), generate_password(12));
    }

    #[test]
    fn strip_tags_flattens_markup() {
        let html = "<h1>Hallo</h1>\n<p>Welt &amp; Co</p>";
        assert_eq!(strip_tags(html), "Hallo Welt &amp; Co");
    }

    #[actix_web::test]
    async fn test_mailer_records_and_fails_on_request() {
        let mailer = TestMailer::new();
        let letter = Letter {
            email: "a@b.de".to_string(),
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        };
        assert!(mailer.send(&letter).await.unwrap().is_some());

        mailer.fail_address("a@b.de");
        assert_eq!(mailer.send(&letter).await.unwrap_err().code(), 502);
        assert_eq!(mailer.sent_count(), 1);
    }
}
