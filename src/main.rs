mod cache;
mod clockwork;
mod config;
mod error;
mod jira;
mod poll;
mod sched;
mod sync;
mod types;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{KvStore, SqliteStore, TimerCache, UserCache};
use crate::clockwork::ReportClient;
use crate::config::Config;
use crate::jira::DirectoryClient;
use crate::sync::{AuthorResolver, SyncPipeline};
use crate::types::{CacheSnapshot, ALL_OWNERS};

#[derive(Parser, Debug)]
#[command(name = "clocksync")]
#[command(about = "Active Clockwork timer cache, synced from Jira")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/clocksync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Jira domain override
  #[arg(short, long)]
  domain: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one sync pass and print the outcome
  Sync,
  /// Keep the cache fresh: sync on a fixed interval (SIGUSR1 queues an
  /// immediate extra run)
  Watch,
  /// Print cached active timers for an owner (or the global view)
  Active {
    /// Owner accountId; defaults to the "all" partition
    #[arg(long)]
    account_id: Option<String>,

    /// Keep polling and reprinting at the cache's poll cadence
    #[arg(long)]
    follow: bool,
  },
  /// Stop a running timer and invalidate its cache partitions
  Stop {
    /// Numeric Clockwork timer id
    #[arg(long)]
    timer_id: u64,

    /// Acting user's accountId, so their partition is invalidated too
    #[arg(long)]
    account_id: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_tracing();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let domain = args.domain.unwrap_or_else(|| config.jira.domain.clone());

  let store = Arc::new(open_store(&config)?);
  let timer_cache = TimerCache::new(
    Arc::clone(&store),
    chrono::Duration::seconds(config.cache.timer_ttl_secs as i64),
    chrono::Duration::seconds(config.cache.stop_marker_ttl_secs as i64),
  );

  match args.command {
    Command::Sync => {
      let pipeline = build_pipeline(&config, store, timer_cache)?;
      let outcome = pipeline.run(&domain).await?;
      println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    Command::Watch => {
      let pipeline = build_pipeline(&config, store, timer_cache)?;
      let interval = Duration::from_secs(config.sync.interval_secs);
      let run_timeout = Duration::from_secs(config.sync.run_timeout_secs);

      let (mut triggers, handle) = sched::TriggerSource::new(interval);
      spawn_signal_listener(handle);

      while let Some(trigger) = triggers.next().await {
        let run_domain = match &trigger {
          sched::Trigger::SyncRequested { domain: Some(d) } => d.clone(),
          _ => domain.clone(),
        };
        sched::run_with_retries(&pipeline, &run_domain, config.sync.retries, run_timeout).await;
      }
    }

    Command::Active { account_id, follow } => {
      let owner = account_id.unwrap_or_else(|| ALL_OWNERS.to_string());
      if follow {
        follow_active(&timer_cache, &owner).await;
      } else {
        let snapshot = timer_cache.read(&owner).await?;
        print_active(&owner, snapshot.as_ref())?;
      }
    }

    Command::Stop {
      timer_id,
      account_id,
    } => {
      let provider = ReportClient::new(http_client(&config)?, Config::get_session_cookie()?);
      sync::stop_and_invalidate(
        &provider,
        &timer_cache,
        &domain,
        timer_id,
        account_id.as_deref(),
      )
      .await?;
      println!("Timer {timer_id} stopped.");
    }
  }

  Ok(())
}

fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clocksync=info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn open_store(config: &Config) -> Result<SqliteStore, error::CacheError> {
  match &config.cache.path {
    Some(path) => SqliteStore::open(path),
    None => SqliteStore::open_default(),
  }
}

fn http_client(config: &Config) -> Result<reqwest::Client> {
  // One shared client; the request timeout bounds every upstream call.
  Ok(
    reqwest::Client::builder()
      .timeout(Duration::from_secs(config.sync.http_timeout_secs))
      .build()?,
  )
}

fn build_pipeline(
  config: &Config,
  store: Arc<SqliteStore>,
  timer_cache: TimerCache<SqliteStore>,
) -> Result<SyncPipeline<ReportClient, DirectoryClient, SqliteStore>> {
  let http = http_client(config)?;

  let provider = ReportClient::new(http.clone(), Config::get_session_cookie()?);
  let directory = DirectoryClient::new(
    http,
    config.jira.domain.clone(),
    config.jira.email.clone(),
    Config::get_api_token()?,
  );
  let users = UserCache::new(
    store,
    chrono::Duration::seconds(config.cache.user_ttl_secs as i64),
  );

  Ok(SyncPipeline::new(
    provider,
    AuthorResolver::new(directory, users),
    timer_cache,
  ))
}

#[cfg(unix)]
fn spawn_signal_listener(handle: sched::TriggerHandle) {
  use tokio::signal::unix::{signal, SignalKind};

  tokio::spawn(async move {
    let Ok(mut stream) = signal(SignalKind::user_defined1()) else {
      return;
    };
    while stream.recv().await.is_some() {
      handle.request_sync(None);
    }
  });
}

#[cfg(not(unix))]
fn spawn_signal_listener(_handle: sched::TriggerHandle) {}

fn print_active(owner: &str, snapshot: Option<&CacheSnapshot>) -> Result<()> {
  let timers = snapshot.map(|s| s.timers.clone()).unwrap_or_default();
  let cached_at = snapshot.map(|s| s.cached_at);
  let payload = serde_json::json!({
    "timers": timers,
    "cachedAt": cached_at,
    "accountId": owner,
  });
  println!("{}", serde_json::to_string_pretty(&payload)?);
  Ok(())
}

async fn follow_active<S: KvStore>(cache: &TimerCache<S>, owner: &str) {
  let mut poll = poll::TimerPoll::new();

  loop {
    match cache.read(owner).await {
      Ok(snapshot) => poll.on_read(snapshot),
      Err(err) => tracing::warn!(error = %err, "cache read failed"),
    }
    render_active(owner, poll.view().as_ref());
    tokio::time::sleep(poll.next_poll_delay(std::time::Instant::now())).await;
  }
}

fn render_active(owner: &str, snapshot: Option<&CacheSnapshot>) {
  let Some(snapshot) = snapshot else {
    println!("(no data for {owner})");
    return;
  };

  if snapshot.timers.is_empty() {
    println!("(no running timers for {owner})");
    return;
  }

  let now = chrono::Utc::now();
  for timer in &snapshot.timers {
    let elapsed = format_elapsed(timer.elapsed_as_of(snapshot.cached_at, now));
    let who = timer
      .author
      .as_ref()
      .and_then(|a| a.display_name.as_deref())
      .unwrap_or(timer.running_for.as_str());
    println!("{elapsed:>9}  {:<12}  {who}", timer.issue.key);
  }
}

fn format_elapsed(total_secs: u64) -> String {
  let h = total_secs / 3600;
  let m = (total_secs % 3600) / 60;
  let s = total_secs % 60;

  if h > 0 {
    format!("{h}:{m:02}:{s:02}")
  } else {
    format!("{m:02}:{s:02}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_elapsed() {
    assert_eq!(format_elapsed(59), "00:59");
    assert_eq!(format_elapsed(65), "01:05");
    assert_eq!(format_elapsed(3600), "1:00:00");
    assert_eq!(format_elapsed(3725), "1:02:05");
  }
}
