//! Command-line interface for the repo-sentinel binary.
//!
//! The CLI manages subscriptions stored in the configuration file and runs
//! the update pipeline either once (`fetch`) or on the configured schedule
//! (`start`).

use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Args, Parser, Subcommand};
use repo_sentinel::{
    Error, EventKind, GITHUB_TOKEN_ENV, GithubSource, Pipeline, PipelineJob, RunOutcome, Scheduler,
    SentinelConfig, Subscription, SubscriptionStore, Trigger, describe_kinds, load_config,
    shutdown_channel,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "repo_sentinel=info";

/// Command line interface for polling subscribed repositories.
#[derive(Debug, Parser,)]
#[command(name = "repo-sentinel", version, about = "Periodic activity digests for GitHub repositories")]
struct Cli
{
    /// Path to the YAML configuration file. Created with defaults if missing.
    #[arg(
        long = "config",
        value_name = "PATH",
        env = "REPO_SENTINEL_CONFIG",
        default_value = "sentinel.yaml",
        global = true
    )]
    config: PathBuf,

    /// GitHub token; overrides `github_token` from the configuration.
    #[arg(long = "token", value_name = "TOKEN", env = GITHUB_TOKEN_ENV, hide_env_values = true, global = true)]
    token: Option<String,>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand,)]
/// Supported commands exposed by the CLI.
enum Command
{
    /// Run once immediately, then on every scheduled firing until interrupted.
    Start,
    /// Run the pipeline once and exit.
    Fetch,
    /// Subscribe to a repository.
    Add(SubscriptionArgs,),
    /// Replace the watched event kinds of an existing subscription.
    Update(SubscriptionArgs,),
    /// Unsubscribe from a repository.
    Remove(RepositoryArgs,),
    /// List subscriptions.
    List,
}

#[derive(Debug, Args,)]
struct RepositoryArgs
{
    /// Repository owner, e.g. `octocat`.
    owner: String,
    /// Repository name, e.g. `hello-world`.
    repo:  String,
}

#[derive(Debug, Args,)]
struct SubscriptionArgs
{
    #[command(flatten)]
    repository: RepositoryArgs,

    /// Event kinds to watch: commits, pull_requests, issues, releases.
    #[arg(long = "events", value_name = "KIND", num_args = 1.., value_delimiter = ',', required = true)]
    events: Vec<EventKind,>,
}

#[tokio::main]
async fn main()
{
    init_tracing();

    if let Err(error,) = run(Cli::parse(),).await {
        eprintln!("{}", error.to_display_string());
        process::exit(1,);
    }
}

fn init_tracing()
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER,),);
    tracing_subscriber::fmt().with_env_filter(filter,).with_writer(std::io::stderr,).init();
}

/// Executes the parsed command.
///
/// # Errors
///
/// Propagates configuration, validation and client construction errors.
async fn run(cli: Cli,) -> Result<(), Error,>
{
    let store = SubscriptionStore::file(&cli.config,);

    match cli.command {
        Command::Start => run_start(&cli.config, cli.token.as_deref(), store,).await,
        Command::Fetch => run_fetch(&cli.config, cli.token.as_deref(), store,).await,
        Command::Add(args,) => run_add(&store, args,),
        Command::Update(args,) => run_update(&store, args,),
        Command::Remove(args,) => run_remove(&store, &args,),
        Command::List => {
            print!("{}", format_subscriptions(&store.list()?));
            Ok((),)
        }
    }
}

fn build_pipeline(
    config_path: &Path,
    token: Option<&str,>,
    store: SubscriptionStore,
) -> Result<(Pipeline<GithubSource,>, SentinelConfig,), Error,>
{
    let config = load_config(config_path,)?;
    let token = config.resolve_token(token,)?;
    let pipeline = Pipeline::from_config(&config, &token, store,)?;
    Ok((pipeline, config,),)
}

async fn run_start(
    config_path: &Path,
    token: Option<&str,>,
    store: SubscriptionStore,
) -> Result<(), Error,>
{
    let (pipeline, config,) = build_pipeline(config_path, token, store,)?;
    let trigger = Trigger::from_settings(config.check_frequency, &config.schedule,)?;
    info!(
        "Starting {} checks with {} channel",
        config.check_frequency.as_str(),
        config.notification.channel
    );

    Scheduler::new(pipeline, trigger,).start_recurring(stop_signal(),).await;
    Ok((),)
}

async fn run_fetch(
    config_path: &Path,
    token: Option<&str,>,
    store: SubscriptionStore,
) -> Result<(), Error,>
{
    let (pipeline, _,) = build_pipeline(config_path, token, store,)?;
    let (trigger, shutdown,) = shutdown_channel();
    let watcher = tokio::spawn(async move {
        stop_signal().await;
        trigger.trigger();
    },);

    let outcome = pipeline.run_once(shutdown,).await;
    watcher.abort();

    match outcome {
        RunOutcome::Completed(summary,) => info!(
            "Checked {} repositories, {} with updates",
            summary.repositories, summary.with_updates
        ),
        RunOutcome::NoSubscriptions => {
            info!("No subscriptions; add one with `repo-sentinel add <owner> <repo> --events ...`")
        }
        RunOutcome::Cancelled => warn!("Fetch interrupted"),
        RunOutcome::Aborted(reason,) => return Err(Error::service(reason,),),
    }
    Ok((),)
}

fn run_add(store: &SubscriptionStore, args: SubscriptionArgs,) -> Result<(), Error,>
{
    let RepositoryArgs {
        owner,
        repo,
    } = args.repository;
    if store.add(&owner, &repo, args.events,)? {
        println!("Subscribed to {owner}/{repo}");
    } else {
        println!("{owner}/{repo} is already subscribed; use `update` to change its events");
    }
    Ok((),)
}

fn run_update(store: &SubscriptionStore, args: SubscriptionArgs,) -> Result<(), Error,>
{
    let RepositoryArgs {
        owner,
        repo,
    } = args.repository;
    if store.update_kinds(&owner, &repo, args.events,)? {
        println!("Updated {owner}/{repo}");
        Ok((),)
    } else {
        Err(Error::validation(format!("{owner}/{repo} is not subscribed"),),)
    }
}

fn run_remove(store: &SubscriptionStore, args: &RepositoryArgs,) -> Result<(), Error,>
{
    if store.remove(&args.owner, &args.repo,)? {
        println!("Unsubscribed from {}/{}", args.owner, args.repo);
        Ok((),)
    } else {
        Err(Error::validation(format!("{}/{} is not subscribed", args.owner, args.repo),),)
    }
}

fn format_subscriptions(subscriptions: &[Subscription],) -> String
{
    if subscriptions.is_empty() {
        return "No subscriptions\n".to_owned();
    }

    let mut out = String::from("Subscriptions:\n",);
    for (index, subscription,) in subscriptions.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   events: {}\n",
            index + 1,
            subscription.full_name(),
            describe_kinds(&subscription.watched_kinds)
        ),);
    }
    out
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn stop_signal()
{
    let ctrl_c = async {
        if let Err(e,) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<(),>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate(),) {
            Ok(mut signal,) => {
                signal.recv().await;
            }
            Err(e,) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<(),>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<(),>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests
{
    use std::path::Path;

    use clap::Parser;
    use repo_sentinel::{EventKind, Subscription, SubscriptionStore};
    use tempfile::tempdir;

    use super::{Cli, Command, RepositoryArgs, format_subscriptions, run_add, run_remove};

    #[test]
    fn cli_parses_add_with_comma_separated_events()
    {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "--config",
            "custom.yaml",
            "add",
            "octocat",
            "hello-world",
            "--events",
            "commits,issues",
        ],)
        .expect("failed to parse CLI",);

        assert_eq!(cli.config, Path::new("custom.yaml"));
        let Command::Add(args,) = cli.command else {
            panic!("unexpected command variant");
        };
        assert_eq!(args.repository.owner, "octocat");
        assert_eq!(args.events, [EventKind::Commit, EventKind::Issue]);
    }

    #[test]
    fn cli_parses_repeated_events()
    {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "update",
            "octocat",
            "hello-world",
            "--events",
            "pull_requests",
            "releases",
        ],)
        .expect("failed to parse CLI",);

        let Command::Update(args,) = cli.command else {
            panic!("unexpected command variant");
        };
        assert_eq!(args.events, [EventKind::PullRequest, EventKind::Release]);
    }

    #[test]
    fn cli_rejects_unknown_event_kind_and_missing_events()
    {
        assert!(
            Cli::try_parse_from([env!("CARGO_PKG_NAME"), "add", "o", "r", "--events", "stars"],)
                .is_err()
        );
        assert!(Cli::try_parse_from([env!("CARGO_PKG_NAME"), "add", "o", "r"],).is_err());
    }

    #[test]
    fn cli_config_defaults_to_local_file()
    {
        let cli = Cli::try_parse_from([env!("CARGO_PKG_NAME"), "list"],).expect("failed to parse CLI",);
        if std::env::var_os("REPO_SENTINEL_CONFIG",).is_none() {
            assert_eq!(cli.config, Path::new("sentinel.yaml"));
        }
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn add_and_remove_round_trip_through_config_file()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let path = temp.path().join("sentinel.yaml",);
        let store = SubscriptionStore::file(&path,);

        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "add",
            "octocat",
            "hello-world",
            "--events",
            "commits",
        ],)
        .expect("failed to parse CLI",);
        let Command::Add(args,) = cli.command else {
            panic!("unexpected command variant");
        };
        run_add(&store, args,).expect("add",);
        assert_eq!(store.list().expect("list",).len(), 1);

        let missing = RepositoryArgs {
            owner: "octocat".to_owned(),
            repo:  "missing".to_owned(),
        };
        let error = run_remove(&store, &missing,).expect_err("not subscribed",);
        assert!(error.to_string().contains("octocat/missing is not subscribed"));

        let existing = RepositoryArgs {
            owner: "octocat".to_owned(),
            repo:  "hello-world".to_owned(),
        };
        run_remove(&store, &existing,).expect("remove",);
        assert!(store.list().expect("list",).is_empty());
    }

    #[test]
    fn subscriptions_are_listed_with_events()
    {
        let listing = format_subscriptions(&[Subscription::new(
            "octocat",
            "hello-world",
            [EventKind::Release, EventKind::Commit],
        )],);
        assert_eq!(listing, "Subscriptions:\n1. octocat/hello-world\n   events: commits, releases\n");
        assert_eq!(format_subscriptions(&[]), "No subscriptions\n");
    }
}
