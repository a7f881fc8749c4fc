// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// SMTP delivery of reports over STARTTLS with authentication.
use std::{fmt, time::Duration};

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use masterror::AppError;
use tracing::{error, info, warn};

use crate::{
    config::EmailSettings,
    dispatch::{ChannelKind, DispatchOutcome, Notifier},
    render::{RenderedReport, Report},
};

/// Fully specified SMTP target.
struct SmtpTarget<'a,>
{
    sender:    &'a str,
    recipient: &'a str,
    server:    &'a str,
    port:      u16,
    user:      &'a str,
    password:  &'a str,
}

/// Email channel. Every setting is required; a missing one skips delivery.
#[derive(Clone,)]
pub struct EmailChannel
{
    settings: EmailSettings,
    timeout:  Duration,
}

impl fmt::Debug for EmailChannel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.debug_struct("EmailChannel",)
            .field("sender", &self.settings.sender,)
            .field("recipient", &self.settings.recipient,)
            .field("smtp_server", &self.settings.smtp_server,)
            .field("smtp_port", &self.settings.smtp_port,)
            .field("timeout", &self.timeout,)
            .finish_non_exhaustive()
    }
}

fn present(value: Option<&String,>,) -> Option<&str,>
{
    value.map(|value| value.trim(),).filter(|value| !value.is_empty(),)
}

impl EmailChannel
{
    pub fn new(settings: EmailSettings, timeout: Duration,) -> Self
    {
        Self {
            settings,
            timeout,
        }
    }

    /// Resolves the SMTP target, naming the first missing field otherwise.
    fn target(&self,) -> Result<SmtpTarget<'_,>, &'static str,>
    {
        let settings = &self.settings;
        let sender = present(settings.sender.as_ref(),).ok_or("sender",)?;
        let recipient = present(settings.recipient.as_ref(),).ok_or("recipient",)?;
        let server = present(settings.smtp_server.as_ref(),).ok_or("smtp_server",)?;
        let port = settings.smtp_port.filter(|port| *port != 0,).ok_or("smtp_port",)?;
        let user = present(settings.smtp_user.as_ref(),).ok_or("smtp_user",)?;
        let password = present(settings.smtp_password.as_ref(),).ok_or("smtp_password",)?;

        Ok(SmtpTarget {
            sender,
            recipient,
            server,
            port,
            user,
            password,
        },)
    }

    async fn deliver(
        &self,
        target: &SmtpTarget<'_,>,
        report: &Report,
        rendered: &RenderedReport,
    ) -> Result<(), AppError,>
    {
        let message = build_message(target, report, rendered,)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor,>::starttls_relay(target.server,)
            .map_err(|e| AppError::service(format!("failed to create SMTP transport: {e}"),),)?
            .port(target.port,)
            .credentials(Credentials::new(target.user.to_owned(), target.password.to_owned(),),)
            .timeout(Some(self.timeout,),)
            .build();

        transport
            .send(message,)
            .await
            .map_err(|e| AppError::service(format!("failed to send email via SMTP: {e}"),),)?;
        Ok((),)
    }
}

/// Builds a multipart message carrying the plain-text and HTML renditions.
fn build_message(
    target: &SmtpTarget<'_,>,
    report: &Report,
    rendered: &RenderedReport,
) -> Result<Message, AppError,>
{
    let from: Mailbox = target
        .sender
        .parse()
        .map_err(|e| AppError::validation(format!("invalid sender address: {e}"),),)?;
    let to: Mailbox = target
        .recipient
        .parse()
        .map_err(|e| AppError::validation(format!("invalid recipient address: {e}"),),)?;

    Message::builder()
        .from(from,)
        .to(to,)
        .subject(report.email_subject(),)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN,)
                        .body(rendered.plain_text.clone(),),
                )
                .singlepart(
                    SinglePart::builder().header(ContentType::TEXT_HTML,).body(rendered.html(),),
                ),
        )
        .map_err(|e| AppError::internal(format!("failed to build email: {e}"),),)
}

impl Notifier for EmailChannel
{
    fn name(&self,) -> &'static str
    {
        ChannelKind::Email.as_str()
    }

    async fn send(&self, report: &Report, rendered: &RenderedReport,) -> DispatchOutcome
    {
        let target = match self.target() {
            Ok(target,) => target,
            Err(field,) => {
                warn!("Email configuration is missing '{}', skipping email notification", field);
                return DispatchOutcome::skipped(format!("missing {field}"),);
            }
        };

        match self.deliver(&target, report, rendered,).await {
            Ok((),) => {
                info!("Email notification sent to {}", target.recipient);
                DispatchOutcome::Delivered
            }
            Err(e,) => {
                error!("Email notification to {} failed: {}", target.recipient, e);
                DispatchOutcome::failed(e.to_string(),)
            }
        }
    }
}
