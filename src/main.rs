use clap::{Parser, Subcommand};
use color_eyre::Result;
use restcache::cache::{open_store, StoreLifecycle};
use restcache::codec::JsonCodec;
use restcache::config::{self, Config};
use restcache::{CachedClient, ResourceFilter, ResultSource};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "restcache")]
#[command(about = "Cache-through REST client: cached answer first, network answer second")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/restcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read a resource, printing the cached answer and then the network answer
  Get {
    /// Resource path, e.g. item/42
    path: String,

    /// Query parameters as key=value
    #[arg(short, long = "query", value_parser = parse_param)]
    query: Vec<(String, String)>,
  },
  /// Erase the local cache
  Erase,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let _log_guard = restcache::logging::init(&config::data_dir()?.join("logs"))?;

  match args.command {
    Command::Get { path, query } => get(&config, &path, query).await,
    Command::Erase => {
      open_store(&config)?.erase();
      println!("cache erased");
      Ok(())
    }
  }
}

async fn get(config: &Config, path: &str, query: Vec<(String, String)>) -> Result<()> {
  let client = CachedClient::open(config)?;

  let filter = query
    .into_iter()
    .fold(ResourceFilter::path(path), |filter, (k, v)| filter.param(k, v));
  let descriptor = config.endpoint().read(&filter)?;

  let mut deliveries = client.perform(descriptor, JsonCodec::<serde_json::Value>::new());

  while let Some(delivery) = deliveries.next().await {
    let label = match delivery.source {
      ResultSource::Cache => "cached",
      ResultSource::Network => "network",
    };

    match (delivery.result.success, delivery.result.item) {
      (true, Some(item)) => println!("[{}]\n{}", label, serde_json::to_string_pretty(&item)?),
      (true, None) => println!("[{}] (empty)", label),
      (false, _) => match delivery.result.message {
        Some(message) => eprintln!("[{}] failed: {}", label, message),
        None => println!("[{}] nothing cached", label),
      },
    }
  }

  Ok(())
}
