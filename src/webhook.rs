// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// JSON webhook delivery of reports.
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    config::{CheckFrequency, WebhookSettings},
    digest::RepositoryDigest,
    dispatch::{ChannelKind, DispatchOutcome, Notifier},
    render::{RenderedReport, Report},
};

const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Document posted to the webhook endpoint.
#[derive(Debug, Serialize,)]
pub struct WebhookPayload<'a,>
{
    pub report_time: String,
    pub frequency:   CheckFrequency,
    pub updates:     &'a [RepositoryDigest],
}

impl<'a,> WebhookPayload<'a,>
{
    pub fn from_report(report: &'a Report,) -> Self
    {
        Self {
            report_time: report.generated_at.format(REPORT_TIME_FORMAT,).to_string(),
            frequency:   report.frequency,
            updates:     &report.digests,
        }
    }
}

/// Posts one JSON document per dispatch.
#[derive(Debug, Clone,)]
pub struct WebhookChannel
{
    url:     Option<String,>,
    client:  reqwest::Client,
    timeout: Duration,
}

impl WebhookChannel
{
    pub fn new(settings: &WebhookSettings, timeout: Duration,) -> Self
    {
        Self {
            url: settings
                .url
                .as_deref()
                .map(str::trim,)
                .filter(|url| !url.is_empty(),)
                .map(str::to_owned,),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Notifier for WebhookChannel
{
    fn name(&self,) -> &'static str
    {
        ChannelKind::Webhook.as_str()
    }

    async fn send(&self, report: &Report, _rendered: &RenderedReport,) -> DispatchOutcome
    {
        let Some(url,) = self.url.as_deref() else {
            warn!("Webhook URL is not configured, skipping webhook notification");
            return DispatchOutcome::skipped("missing url",);
        };

        let response = self
            .client
            .post(url,)
            .timeout(self.timeout,)
            .json(&WebhookPayload::from_report(report,),)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status,);

        match response {
            Ok(response,) => {
                info!("Webhook notification sent to {} (status {})", url, response.status());
                DispatchOutcome::Delivered
            }
            Err(e,) => {
                error!("Webhook notification to {} failed: {}", url, e);
                DispatchOutcome::failed(e.to_string(),)
            }
        }
    }
}
