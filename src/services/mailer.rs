use async_smtp::authentication::Credentials;
use async_smtp::{Envelope, SendableEmail, SmtpClient, SmtpTransport};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::BufStream;
use tokio::net::TcpStream;

use crate::configuration::EmailSettings;

pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct Mailer {
    smtp_server: String,
    smtp_port: u16,
    sender: String,
    password: String,
}

impl Mailer {
    pub fn new(settings: &EmailSettings) -> Self {
        Mailer {
            smtp_server: settings.smtp_server.clone(),
            smtp_port: settings.smtp_port,
            sender: settings.sender.clone(),
            password: settings.password.clone(),
        }
    }

    /// Assembles the multipart message and submits it over SMTP.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        attachments: &[Attachment],
    ) -> anyhow::Result<()> {
        let message = build_mime_message(&self.sender, to, subject, html_body, attachments);

        let envelope = Envelope::new(Some(self.sender.parse()?), vec![to.parse()?])?;
        let email = SendableEmail::new(envelope, message);

        let stream = TcpStream::connect((self.smtp_server.as_str(), self.smtp_port)).await?;
        let stream = BufStream::new(stream);

        let client = SmtpClient::new();
        let mut transport = SmtpTransport::new(client, stream).await?;

        if !self.password.is_empty() {
            transport
                .try_login(
                    &Credentials::new(self.sender.clone(), self.password.clone()),
                    async_smtp::authentication::DEFAULT_ENCRYPTED_MECHANISMS,
                )
                .await?;
        }

        transport.send(email).await?;
        transport.quit().await?;

        log::info!("E-mail sent to {}", to);
        Ok(())
    }
}

fn encode_subject(subject: &str) -> String {
    match subject.is_ascii() {
        true => subject.to_string(),
        false => format!("=?UTF-8?B?{}?=", STANDARD.encode(subject.as_bytes())),
    }
}

fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(76)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect::<Vec<&str>>()
        .join("\r\n")
}

fn build_mime_message(
    from: &str,
    to: &str,
    subject: &str,
    html_body: &str,
    attachments: &[Attachment],
) -> String {
    let boundary = format!("----relance-{}", uuid::Uuid::new_v4());
    let date = chrono::Local::now().to_rfc2822();

    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", from));
    message.push_str(&format!("To: {}\r\n", to));
    message.push_str(&format!("Reply-To: {}\r\n", from));
    message.push_str(&format!("Subject: {}\r\n", encode_subject(subject)));
    message.push_str(&format!("Date: {}\r\n", date));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        boundary
    ));

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n");
    message.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
    message.push_str(html_body);
    message.push_str("\r\n");

    for attachment in attachments {
        message.push_str(&format!("--{}\r\n", boundary));
        message.push_str(&format!(
            "Content-Type: application/pdf; name=\"{}\"\r\n",
            attachment.filename
        ));
        message.push_str("Content-Transfer-Encoding: base64\r\n");
        message.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
            attachment.filename
        ));
        message.push_str(&wrap_base64(&STANDARD.encode(&attachment.bytes)));
        message.push_str("\r\n");
    }

    message.push_str(&format!("--{}--\r\n", boundary));

    message
}
