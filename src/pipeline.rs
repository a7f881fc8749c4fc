// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// One end-to-end update run: fetch, normalize, filter, render, dispatch.
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::{
    config::{CheckFrequency, SentinelConfig},
    digest::retain_active,
    dispatch::{ChannelDelivery, Dispatcher},
    error::Error,
    normalizer::normalize_all,
    render::{Report, ReportRenderer},
    scheduler::{PipelineJob, Shutdown},
    source::{CheckWindow, EventSource, GithubSource, SourceClient},
    subscription::SubscriptionStore,
};

/// Counters and delivery records of a completed run.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct RunSummary
{
    /// Subscriptions fetched.
    pub repositories: usize,
    /// Repositories with at least one event in the window.
    pub with_updates: usize,
    pub deliveries:   Vec<ChannelDelivery,>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub enum RunOutcome
{
    /// Nothing is subscribed; no report is produced.
    NoSubscriptions,
    /// A stop was requested before every repository was fetched.
    Cancelled,
    /// The subscription list could not be read.
    Aborted(String,),
    Completed(RunSummary,),
}

/// The update pipeline over an [`EventSource`].
pub struct Pipeline<S,>
{
    store:         SubscriptionStore,
    client:        Arc<SourceClient<S,>,>,
    renderer:      ReportRenderer,
    dispatcher:    Dispatcher,
    frequency:     CheckFrequency,
    show_progress: bool,
}

impl Pipeline<GithubSource,>
{
    /// Builds a pipeline against the GitHub API described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] when the API client cannot be created.
    pub fn from_config(
        config: &SentinelConfig,
        token: &str,
        store: SubscriptionStore,
    ) -> Result<Self, Error,>
    {
        let source = GithubSource::new(token, &config.api_base_url, config.fetch.timeout(),)?;
        let dispatcher = Dispatcher::from_settings(&config.notification,);
        Ok(Self::new(store, source, config, dispatcher,).with_progress(true,),)
    }
}

impl<S: EventSource,> Pipeline<S,>
{
    pub fn new(
        store: SubscriptionStore,
        source: S,
        config: &SentinelConfig,
        dispatcher: Dispatcher,
    ) -> Self
    {
        Self {
            store,
            client: Arc::new(SourceClient::new(source, &config.fetch,),),
            renderer: ReportRenderer::new(config.web_base_url.clone(),),
            dispatcher,
            frequency: config.check_frequency,
            show_progress: false,
        }
    }

    /// Enables the terminal progress bar during fetches.
    pub fn with_progress(mut self, show_progress: bool,) -> Self
    {
        self.show_progress = show_progress;
        self
    }

    /// Runs the pipeline with `now` as window end and report timestamp.
    pub async fn run_at(&self, now: DateTime<Utc,>, shutdown: &Shutdown,) -> RunOutcome
    {
        let subscriptions = match self.store.list() {
            Ok(subscriptions,) => subscriptions,
            Err(e,) => {
                error!("Failed to read subscriptions: {}", e);
                return RunOutcome::Aborted(e.to_display_string(),);
            }
        };
        if subscriptions.is_empty() {
            info!("No subscriptions configured, skipping run");
            return RunOutcome::NoSubscriptions;
        }

        let window = CheckWindow::ending_at(now, self.frequency,);
        info!(
            "Checking {} repositories for activity between {} and {}",
            subscriptions.len(),
            window.start,
            window.end
        );

        let progress = self.progress_bar(subscriptions.len(),);
        let Some(raws,) = self.client.fetch_all(&subscriptions, &window, shutdown, &progress,).await
        else {
            progress.abandon_with_message("cancelled",);
            info!("Stop requested, abandoning run before rendering");
            return RunOutcome::Cancelled;
        };
        progress.finish_and_clear();

        let digests = retain_active(normalize_all(raws,),);
        let with_updates = digests.len();
        let report = Report::new(now, self.frequency, digests,);
        let rendered = self.renderer.render(&report,);
        let deliveries = self.dispatcher.dispatch(&report, &rendered,).await;

        info!(
            "Run complete: {}/{} repositories with updates",
            with_updates,
            subscriptions.len()
        );
        RunOutcome::Completed(RunSummary {
            repositories: subscriptions.len(),
            with_updates,
            deliveries,
        },)
    }

    fn progress_bar(&self, total: usize,) -> ProgressBar
    {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64,);
        if let Ok(style,) = ProgressStyle::with_template(
            "{spinner:.yellow} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
        ) {
            pb.set_style(style,);
        }
        pb.enable_steady_tick(Duration::from_millis(120,),);
        pb
    }
}

impl<S: EventSource,> PipelineJob for Pipeline<S,>
{
    async fn run_once(&self, shutdown: Shutdown,) -> RunOutcome
    {
        self.run_at(Utc::now(), &shutdown,).await
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Mutex;

    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::*;
    use crate::{
        dispatch::{Channel, ConsoleChannel, DispatchOutcome},
        event::EventKind,
        render::{NO_UPDATES_NOTICE, tests::at},
        scheduler::shutdown_channel,
        source::tests::FakeSource,
        subscription::Subscription,
    };

    fn commit_payload() -> Value
    {
        json!({
            "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e",
            "html_url": "https://github.com/octocat/hello-world/commit/6dcb09b",
            "commit": {
                "message": "Fix all the bugs",
                "author": { "name": "Monalisa Octocat", "email": "support@github.com", "date": "2025-03-14T08:00:00Z" }
            }
        })
    }

    fn pipeline(
        subscriptions: Vec<Subscription,>,
        source: FakeSource,
    ) -> (Pipeline<FakeSource,>, Arc<Mutex<String,>,>,)
    {
        let buffer = Arc::new(Mutex::new(String::new(),),);
        let console = ConsoleChannel::buffered(Arc::clone(&buffer,),);
        let dispatcher = Dispatcher::new(Channel::Console(console.clone(),), console,);
        let pipeline = Pipeline::new(
            SubscriptionStore::in_memory(subscriptions,),
            source,
            &SentinelConfig::default(),
            dispatcher,
        );
        (pipeline, buffer,)
    }

    fn octocat() -> Subscription
    {
        Subscription::new("octocat", "hello-world", [EventKind::Commit],)
    }

    #[tokio::test]
    async fn single_commit_produces_one_section()
    {
        let source = FakeSource::default().with(
            "octocat/hello-world",
            EventKind::Commit,
            Ok(vec![commit_payload()]),
        );
        let (pipeline, buffer,) = pipeline(vec![octocat()], source,);
        let (_trigger, shutdown,) = shutdown_channel();

        let outcome = pipeline.run_at(at(9,), &shutdown,).await;

        let RunOutcome::Completed(summary,) = outcome else {
            panic!("expected completed run, got {outcome:?}");
        };
        assert_eq!(summary.repositories, 1);
        assert_eq!(summary.with_updates, 1);
        assert_eq!(summary.deliveries[0].outcome, DispatchOutcome::Delivered);

        let output = buffer.lock().expect("buffer lock",).clone();
        assert_eq!(output.matches("- Repository: octocat/hello-world").count(), 1);
        assert!(output.contains("  Commit (1):"));
        assert!(output.contains("6dcb09b (https://github.com/octocat/hello-world/commit/6dcb09b) Fix all the bugs"));
    }

    #[tokio::test]
    async fn quiet_repository_is_filtered_and_notice_rendered()
    {
        let (pipeline, buffer,) = pipeline(vec![octocat()], FakeSource::default(),);
        let (_trigger, shutdown,) = shutdown_channel();

        let outcome = pipeline.run_at(at(9,), &shutdown,).await;

        let RunOutcome::Completed(summary,) = outcome else {
            panic!("expected completed run, got {outcome:?}");
        };
        assert_eq!(summary.with_updates, 0);
        let output = buffer.lock().expect("buffer lock",).clone();
        assert!(output.contains(NO_UPDATES_NOTICE));
        assert!(!output.contains("Repository: octocat"));
    }

    #[tokio::test]
    async fn fetch_window_ends_at_run_instant()
    {
        let (pipeline, _,) = pipeline(vec![octocat()], FakeSource::default(),);
        let (_trigger, shutdown,) = shutdown_channel();

        pipeline.run_at(at(9,), &shutdown,).await;

        let queries = pipeline.client_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].since.as_deref(), Some("2025-03-13T09:00:00Z"));
        assert_eq!(queries[0].until.as_deref(), Some("2025-03-14T09:00:00Z"));
    }

    #[tokio::test]
    async fn no_subscriptions_skips_dispatch()
    {
        let (pipeline, buffer,) = pipeline(Vec::new(), FakeSource::default(),);
        let (_trigger, shutdown,) = shutdown_channel();

        assert_eq!(pipeline.run_at(at(9), &shutdown).await, RunOutcome::NoSubscriptions);
        assert!(buffer.lock().expect("buffer lock",).is_empty());
    }

    #[tokio::test]
    async fn stop_request_abandons_run_without_dispatch()
    {
        let (pipeline, buffer,) = pipeline(vec![octocat()], FakeSource::default(),);
        let (trigger, shutdown,) = shutdown_channel();
        trigger.trigger();

        assert_eq!(pipeline.run_at(at(9), &shutdown).await, RunOutcome::Cancelled);
        assert!(buffer.lock().expect("buffer lock",).is_empty());
    }

    #[tokio::test]
    async fn subscription_edits_are_picked_up_between_runs()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let path = temp.path().join("sentinel.yaml",);
        std::fs::write(&path, "github_token: ghp_example\n",).expect("failed to write config",);

        let buffer = Arc::new(Mutex::new(String::new(),),);
        let console = ConsoleChannel::buffered(Arc::clone(&buffer,),);
        let pipeline = Pipeline::new(
            SubscriptionStore::file(&path,),
            FakeSource::default(),
            &SentinelConfig::default(),
            Dispatcher::new(Channel::Console(console.clone(),), console,),
        );
        let (_trigger, shutdown,) = shutdown_channel();

        assert_eq!(pipeline.run_at(at(9), &shutdown).await, RunOutcome::NoSubscriptions);

        SubscriptionStore::file(&path,)
            .add("octocat", "hello-world", [EventKind::Commit],)
            .expect("add",);
        let outcome = pipeline.run_at(at(9,), &shutdown,).await;
        assert!(matches!(outcome, RunOutcome::Completed(RunSummary { repositories: 1, .. })));
    }

    impl Pipeline<FakeSource,>
    {
        fn client_queries(&self,) -> Vec<crate::source::EventQuery,>
        {
            self.client
                .source()
                .queries
                .lock()
                .expect("queries lock",)
                .iter()
                .map(|(_, _, query,)| query.clone(),)
                .collect()
        }
    }
}
