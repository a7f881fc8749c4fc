// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Report delivery through the configured notification channel.
///
/// Exactly one primary channel is active per configuration. Email and webhook
/// deliveries are always followed by the console channel, which doubles as
/// confirmation and fallback. Channel failures are logged and reported as a
/// [`DispatchOutcome`]; they never abort a run.
use std::{
    fmt,
    future::Future,
    io::Write as _,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::{debug, error, warn};

use crate::{
    config::NotificationSettings,
    email::EmailChannel,
    render::{RenderedReport, Report},
    webhook::WebhookChannel,
};

const BANNER_RULE: &str =
    "================================================================================";
const BANNER_TITLE: &str = "Repository Sentinel console notification";

/// Primary channel named by `notification.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
pub enum ChannelKind
{
    Console,
    Email,
    Webhook,
}

impl ChannelKind
{
    /// Resolves the configured channel name. Unknown names fall back to the
    /// console with a warning.
    pub fn resolve(value: &str,) -> Self
    {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" => Self::Console,
            "email" => Self::Email,
            "webhook" => Self::Webhook,
            other => {
                warn!("Unsupported notification type '{}', falling back to console", other);
                Self::Console
            }
        }
    }

    pub const fn as_str(self,) -> &'static str
    {
        match self {
            Self::Console => "console",
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub enum DispatchOutcome
{
    Delivered,
    /// The channel is not usable with the current settings.
    Skipped
    {
        reason: String,
    },
    /// The channel was usable but delivery failed.
    Failed
    {
        reason: String,
    },
}

impl DispatchOutcome
{
    pub fn skipped(reason: impl Into<String,>,) -> Self
    {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String,>,) -> Self
    {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub const fn is_delivered(&self,) -> bool
    {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DispatchOutcome
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        match self {
            Self::Delivered => f.write_str("delivered",),
            Self::Skipped {
                reason,
            } => write!(f, "skipped ({reason})"),
            Self::Failed {
                reason,
            } => write!(f, "failed ({reason})"),
        }
    }
}

/// A notification channel.
pub trait Notifier
{
    /// Channel name used in logs and delivery records.
    fn name(&self,) -> &'static str;

    /// Delivers one report. Failures are reported, never propagated.
    fn send(
        &self,
        report: &Report,
        rendered: &RenderedReport,
    ) -> impl Future<Output = DispatchOutcome,> + Send;
}

#[derive(Debug, Clone,)]
enum ConsoleSink
{
    Stdout,
    Buffer(Arc<Mutex<String,>,>,),
}

/// Writes a banner and the plain-text report.
#[derive(Debug, Clone,)]
pub struct ConsoleChannel
{
    sink: ConsoleSink,
}

impl ConsoleChannel
{
    pub fn stdout() -> Self
    {
        Self {
            sink: ConsoleSink::Stdout,
        }
    }

    /// Console that appends to `buffer` instead of stdout.
    pub fn buffered(buffer: Arc<Mutex<String,>,>,) -> Self
    {
        Self {
            sink: ConsoleSink::Buffer(buffer,),
        }
    }

    fn output(rendered: &RenderedReport,) -> String
    {
        format!("\n{BANNER_RULE}\n{BANNER_TITLE}\n{BANNER_RULE}\n{}\n", rendered.plain_text)
    }
}

impl Notifier for ConsoleChannel
{
    fn name(&self,) -> &'static str
    {
        ChannelKind::Console.as_str()
    }

    async fn send(&self, _report: &Report, rendered: &RenderedReport,) -> DispatchOutcome
    {
        let output = Self::output(rendered,);
        match &self.sink {
            ConsoleSink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                match stdout.write_all(output.as_bytes(),).and_then(|()| stdout.flush(),) {
                    Ok((),) => DispatchOutcome::Delivered,
                    Err(e,) => {
                        error!("Console notification failed: {}", e);
                        DispatchOutcome::failed(e.to_string(),)
                    }
                }
            }
            ConsoleSink::Buffer(buffer,) => {
                buffer.lock().unwrap_or_else(PoisonError::into_inner,).push_str(&output,);
                DispatchOutcome::Delivered
            }
        }
    }
}

/// Closed set of primary channels.
#[derive(Debug, Clone,)]
pub enum Channel
{
    Console(ConsoleChannel,),
    Email(EmailChannel,),
    Webhook(WebhookChannel,),
}

impl Channel
{
    /// Builds the channel selected by `settings`.
    pub fn from_settings(settings: &NotificationSettings, console: &ConsoleChannel,) -> Self
    {
        match ChannelKind::resolve(&settings.channel,) {
            ChannelKind::Console => Self::Console(console.clone(),),
            ChannelKind::Email => {
                Self::Email(EmailChannel::new(settings.email.clone(), settings.timeout(),),)
            }
            ChannelKind::Webhook => {
                Self::Webhook(WebhookChannel::new(&settings.webhook, settings.timeout(),),)
            }
        }
    }

    pub const fn kind(&self,) -> ChannelKind
    {
        match self {
            Self::Console(_,) => ChannelKind::Console,
            Self::Email(_,) => ChannelKind::Email,
            Self::Webhook(_,) => ChannelKind::Webhook,
        }
    }
}

impl Notifier for Channel
{
    fn name(&self,) -> &'static str
    {
        self.kind().as_str()
    }

    async fn send(&self, report: &Report, rendered: &RenderedReport,) -> DispatchOutcome
    {
        match self {
            Self::Console(channel,) => channel.send(report, rendered,).await,
            Self::Email(channel,) => channel.send(report, rendered,).await,
            Self::Webhook(channel,) => channel.send(report, rendered,).await,
        }
    }
}

/// Outcome of one channel within a dispatch.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct ChannelDelivery
{
    pub channel: &'static str,
    pub outcome: DispatchOutcome,
}

/// Sends reports through the primary channel plus the console fallback.
#[derive(Debug, Clone,)]
pub struct Dispatcher
{
    primary: Channel,
    console: ConsoleChannel,
}

impl Dispatcher
{
    pub fn new(primary: Channel, console: ConsoleChannel,) -> Self
    {
        Self {
            primary,
            console,
        }
    }

    /// Dispatcher writing console output to stdout.
    pub fn from_settings(settings: &NotificationSettings,) -> Self
    {
        let console = ConsoleChannel::stdout();
        Self::new(Channel::from_settings(settings, &console,), console,)
    }

    pub const fn primary_kind(&self,) -> ChannelKind
    {
        self.primary.kind()
    }

    /// Delivers `report` and returns one record per channel attempted.
    pub async fn dispatch(
        &self,
        report: &Report,
        rendered: &RenderedReport,
    ) -> Vec<ChannelDelivery,>
    {
        let mut deliveries = Vec::with_capacity(2,);

        let outcome = self.primary.send(report, rendered,).await;
        debug!("{} channel: {}", self.primary.name(), outcome);
        deliveries.push(ChannelDelivery {
            channel: self.primary.name(),
            outcome,
        },);

        if self.primary.kind() != ChannelKind::Console {
            let outcome = self.console.send(report, rendered,).await;
            deliveries.push(ChannelDelivery {
                channel: self.console.name(),
                outcome,
            },);
        }

        deliveries
    }
}
