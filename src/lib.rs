//! Periodic activity digests for subscribed GitHub repositories.
//!
//! The library polls each subscribed repository for commits, pull requests,
//! issues and releases within the last check period, normalizes the raw
//! payloads into display-ready records, drops repositories without activity,
//! renders a report and delivers it through the configured notification
//! channel. A cron-driven [`Scheduler`] repeats the [`Pipeline`] once per
//! period. Configuration is an explicit [`SentinelConfig`] value handed to
//! every component.

mod config;
mod digest;
mod dispatch;
mod email;
mod error;
mod event;
mod normalizer;
mod pipeline;
mod render;
mod scheduler;
mod source;
mod subscription;
mod webhook;

pub use config::{
    CheckFrequency, DEFAULT_API_BASE_URL, DEFAULT_WEB_BASE_URL, EmailSettings, FetchSettings,
    GITHUB_TOKEN_ENV, NotificationSettings, ScheduleSettings, SentinelConfig, WebhookSettings,
    load_config, parse_config, save_config,
};
pub use digest::{RepositoryDigest, retain_active};
pub use dispatch::{
    Channel, ChannelDelivery, ChannelKind, ConsoleChannel, DispatchOutcome, Dispatcher, Notifier,
};
pub use email::EmailChannel;
pub use error::{Error, io_error};
pub use event::{
    CommitEvent, EventKind, IssueEvent, ItemState, NormalizedEvent, PullRequestEvent,
    ReleaseEvent,
};
pub use normalizer::{normalize_all, normalize_event, normalize_repository, truncate_body};
pub use pipeline::{Pipeline, RunOutcome, RunSummary};
pub use render::{
    GLYPHS, NO_UPDATES_NOTICE, RenderedReport, Report, ReportRenderer, to_html, to_plain_text,
};
pub use scheduler::{
    PipelineJob, Scheduler, SchedulerState, Shutdown, ShutdownTrigger, Trigger, shutdown_channel,
};
pub use source::{
    CheckWindow, EventQuery, EventSource, GithubSource, RawRepositoryEvents, SourceClient,
};
pub use subscription::{Subscription, SubscriptionStore, describe_kinds};
pub use webhook::{WebhookChannel, WebhookPayload};
