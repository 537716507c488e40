use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use clap::{ArgAction, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reviewcache::api::{ApiClient, Restaurant, RestaurantId, Review};
use reviewcache::config::Config;
use reviewcache::event::{dispatch, EventHandler};
use reviewcache::page::{PageContext, ReviewDraft};
use reviewcache::store::{DisabledStore, SqliteStore, Storage};
use reviewcache::sync::{DrainReport, Filter, SyncEngine, WriteOutcome};
use reviewcache::worker::{proxy, HttpFetcher, Request, ResponseCache, ServiceWorker};
use reviewcache::Error;

/// Name of the persistent store holding the mirror and the pending queues
const STORE_NAME: &str = "restaurantsDB";

#[derive(Parser, Debug)]
#[command(name = "reviewcache")]
#[command(about = "Offline-first cache and sync client for a restaurant review API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/reviewcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List restaurants, optionally filtered
  Restaurants {
    #[arg(long)]
    cuisine: Option<String>,
    #[arg(long)]
    neighborhood: Option<String>,
  },
  /// Show one restaurant
  Restaurant { id: RestaurantId },
  /// List neighborhoods
  Neighborhoods,
  /// List cuisines
  Cuisines,
  /// Show the reviews of a restaurant
  Reviews { restaurant_id: RestaurantId },
  /// Submit a review
  Review {
    restaurant_id: RestaurantId,
    #[arg(long)]
    name: String,
    #[arg(long)]
    rating: u8,
    #[arg(long, default_value = "")]
    comments: String,
    /// Leave it for `worker sync` instead of sending now
    #[arg(long)]
    background: bool,
  },
  /// Mark or unmark a restaurant as favorite
  Favorite {
    restaurant_id: RestaurantId,
    #[arg(action = ArgAction::Set)]
    is_favorite: bool,
  },
  /// Replay pending writes
  Drain,
  /// List pending writes
  Pending,
  /// Watch connectivity and drain whenever it comes back
  Watch,
  /// Request interception layer
  Worker {
    #[command(subcommand)]
    command: WorkerCommand,
  },
  /// Run the interception proxy
  Serve {
    /// Address to listen on (default from config)
    #[arg(long)]
    listen: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
  /// Precache the asset manifest
  Install,
  /// Send reviews queued for background sync
  Sync,
  /// Fetch a path through the response cache
  Fetch { path: String },
}

/// Log to a daily file under the data directory, and to stderr with `--verbose`.
fn init_tracing(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  let appender = RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix("reviewcache")
    .filename_suffix("log")
    .build(log_dir)
    .map_err(|e| eyre!("Failed to open log directory {}: {}", log_dir.display(), e))?;
  let (writer, guard) = tracing_appender::non_blocking(appender);

  // RUST_LOG wins, e.g. RUST_LOG=reviewcache=debug
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reviewcache=info"));
  let stderr = verbose.then(|| fmt::layer().with_writer(io::stderr));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(stderr)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _guard = init_tracing(&data_dir.join("logs"), args.verbose)?;

  let gateway = Arc::new(ApiClient::new(&config.api)?);
  info!(api = %gateway.base_url(), "Starting");

  // Without a store the engine still works, network-only
  match SqliteStore::open_named(&data_dir, STORE_NAME) {
    Ok(store) => run(args.command, &config, &data_dir, gateway, Arc::new(store)).await,
    Err(e) => {
      warn!(error = %e, "Persistent store unavailable, running without cache");
      let store = Arc::new(DisabledStore::new(e.to_string()));
      run(args.command, &config, &data_dir, gateway, store).await
    }
  }
}

async fn run<S: Storage + 'static>(
  command: Command,
  config: &Config,
  data_dir: &Path,
  gateway: Arc<ApiClient>,
  store: Arc<S>,
) -> Result<()> {
  let engine = SyncEngine::with_shared(Arc::clone(&gateway), Arc::clone(&store));

  match command {
    Command::Restaurants {
      cuisine,
      neighborhood,
    } => {
      let restaurants = engine
        .restaurants_by_cuisine_and_neighborhood(&Filter::from(cuisine), &Filter::from(neighborhood))
        .await;
      match or_empty(restaurants)? {
        Some(restaurants) if !restaurants.is_empty() => {
          for restaurant in &restaurants {
            print_restaurant_line(restaurant);
          }
        }
        _ => println!("No restaurants found"),
      }
    }
    Command::Restaurant { id } => {
      if let Some(restaurant) = or_missing(engine.restaurant_by_id(id).await)? {
        print_restaurant(&restaurant);
      }
    }
    Command::Neighborhoods => print_list(or_empty(engine.neighborhoods().await)?),
    Command::Cuisines => print_list(or_empty(engine.cuisines().await)?),
    Command::Reviews { restaurant_id } => {
      let page = PageContext::new(engine, restaurant_id);
      let reviews = page.reviews().await;
      if reviews.is_empty() {
        println!("No reviews yet!");
      }
      for review in &reviews {
        print_review(review);
      }
    }
    Command::Review {
      restaurant_id,
      name,
      rating,
      comments,
      background,
    } => {
      let mut page = PageContext::new(engine, restaurant_id);
      let draft = ReviewDraft {
        name,
        rating,
        comments,
      };

      if background {
        let review = page.submit_in_background(draft)?;
        println!("Review {} queued for background sync", review.id);
      } else {
        let (review, outcome) = page.submit_review(draft).await?;
        match outcome {
          WriteOutcome::Delivered => println!("Review {} sent", review.id),
          WriteOutcome::Queued => println!("Offline: review {} will be sent when back online", review.id),
          WriteOutcome::Dropped => return Err(eyre!("Review could not be sent or saved")),
        }
      }
    }
    Command::Favorite {
      restaurant_id,
      is_favorite,
    } => match engine.update_favorite(restaurant_id, is_favorite).await {
      WriteOutcome::Delivered => println!("Restaurant {} favorite: {}", restaurant_id, is_favorite),
      WriteOutcome::Queued => println!("Offline: favorite change for {} queued", restaurant_id),
      WriteOutcome::Dropped => return Err(eyre!("Favorite change could not be sent or saved")),
    },
    Command::Drain => print_drain(&engine.drain().await),
    Command::Pending => {
      let reviews = engine.pending_reviews()?;
      let updates = engine.pending_status_updates()?;
      if reviews.is_empty() && updates.is_empty() {
        println!("Nothing pending");
      }
      for review in &reviews {
        println!(
          "review {:>14}  restaurant {:>3}  {} ({}/5)",
          review.id, review.restaurant_id, review.name, review.rating
        );
      }
      for update in &updates {
        println!(
          "favorite  restaurant {:>3}  -> {}",
          update.restaurant_id, update.is_favorite
        );
      }
    }
    Command::Watch => watch(engine, config).await?,
    Command::Worker { command } => {
      let worker = service_worker(config, data_dir, gateway, store)?;
      match command {
        WorkerCommand::Install => {
          let report = worker.install(&config.worker.manifest).await;
          println!(
            "Cached {} of {} assets in '{}'",
            report.cached.len(),
            config.worker.manifest.len(),
            worker.cache().name()
          );
          for failure in &report.failures {
            println!("  {}", failure);
          }
        }
        WorkerCommand::Sync => {
          let report = worker.sync().await;
          println!("Sent {} review(s), {} failed", report.sent, report.failed);
        }
        WorkerCommand::Fetch { path } => {
          let response = worker.fetch(&Request::get(worker.resolve(&path)?)).await?;
          eprintln!("HTTP {}", response.status);
          for (name, value) in &response.headers {
            eprintln!("{}: {}", name, value);
          }
          io::stdout().write_all(&response.body)?;
        }
      }
    }
    Command::Serve { listen } => {
      let worker = service_worker(config, data_dir, gateway, store)?;
      let listen = listen.unwrap_or_else(|| config.worker.listen.clone());
      proxy::serve(Arc::new(worker), &listen).await?;
    }
  }

  Ok(())
}

/// Offline with nothing cached is an expected state, not a failure.
fn or_empty<T>(result: reviewcache::Result<T>) -> Result<Option<T>> {
  match result {
    Ok(value) => Ok(Some(value)),
    Err(Error::DataUnavailable) => {
      println!("Offline and nothing cached yet");
      Ok(None)
    }
    Err(e) => Err(e.into()),
  }
}

/// Like `or_empty`, for lookups of a single record.
fn or_missing<T>(result: reviewcache::Result<T>) -> Result<Option<T>> {
  match result {
    Err(Error::NotFound(id)) => {
      println!("Restaurant {} not found", id);
      Ok(None)
    }
    result => or_empty(result),
  }
}

async fn watch<S: Storage + 'static>(engine: SyncEngine<ApiClient, S>, config: &Config) -> Result<()> {
  let gateway = Arc::clone(engine.gateway());
  let mut events = EventHandler::new(Duration::from_secs(config.watch.interval_secs), move || {
    let gateway = Arc::clone(&gateway);
    async move { gateway.probe().await }
  });

  println!("Watching {} (Ctrl-C to stop)", engine.gateway().base_url());
  loop {
    tokio::select! {
      event = events.next() => {
        let Some(event) = event else { break };
        if let Some(report) = dispatch(&engine, event).await {
          print_drain(&report);
        }
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }
  Ok(())
}

fn service_worker<S: Storage>(
  config: &Config,
  data_dir: &Path,
  gateway: Arc<ApiClient>,
  store: Arc<S>,
) -> Result<ServiceWorker<HttpFetcher, ApiClient, S>> {
  let fetcher = HttpFetcher::new(Duration::from_secs(config.api.timeout_secs))?;
  let cache = ResponseCache::open(&ResponseCache::path_for(data_dir), &config.worker.cache_name)?;
  Ok(ServiceWorker::new(fetcher, cache, &config.origin, gateway, store)?)
}

fn print_drain(report: &DrainReport) {
  if report.is_empty() {
    println!("Nothing to drain");
    return;
  }
  println!(
    "Reviews: {} sent, {} still pending. Favorites: {} sent, {} still pending.",
    report.reviews.delivered,
    report.reviews.requeued,
    report.status_updates.delivered,
    report.status_updates.requeued
  );
  let dropped = report.reviews.dropped + report.status_updates.dropped;
  if dropped > 0 {
    println!("{} write(s) could not be requeued and were lost", dropped);
  }
}

fn print_list(values: Option<Vec<String>>) {
  for value in values.unwrap_or_default() {
    println!("{}", value);
  }
}

fn print_restaurant_line(restaurant: &Restaurant) {
  println!(
    "{:>3}  {}{}  ({}, {})",
    restaurant.id,
    restaurant.name,
    if restaurant.is_favorite { " *" } else { "" },
    restaurant.cuisine_type,
    restaurant.neighborhood
  );
}

fn print_restaurant(restaurant: &Restaurant) {
  println!("{}{}", restaurant.name, if restaurant.is_favorite { " *" } else { "" });
  println!("  Cuisine:      {}", restaurant.cuisine_type);
  println!("  Neighborhood: {}", restaurant.neighborhood);
  println!("  Address:      {}", restaurant.address);
  println!("  Page:         {}", restaurant.page_path());
  println!("  Image:        {}", restaurant.image_path());
  for (day, hours) in &restaurant.operating_hours {
    println!("  {:<10}    {}", day, hours);
  }
}

fn print_review(review: &Review) {
  let date = review
    .created_at
    .and_then(DateTime::from_timestamp_millis)
    .map(|d| d.format("%B %-d, %Y").to_string())
    .unwrap_or_default();
  println!("{}  {}  Rating: {}", review.name, date, review.rating);
  println!("  {}", review.comments);
  println!();
}
