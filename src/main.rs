mod api;
mod app;
mod cache;
mod commands;
mod config;
mod derive;
mod error;
mod event;
mod forms;
mod logging;
mod mutation;
mod seed;
mod session;
mod ui;

use api::{ApiClient, Credentials, Transport};
use cache::ResourceCache;
use clap::Parser;
use color_eyre::Result;
use mutation::MutationExecutor;
use session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "booklend")]
#[command(about = "A terminal client for the BookLend library")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/booklend/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the library API
  #[arg(long, env = "BOOKLEND_API_URL")]
  api_url: Option<String>,

  /// Username to sign in as, together with BOOKLEND_PASSWORD
  #[arg(short, long)]
  username: Option<String>,

  /// Create an account for --username (an email) before starting
  #[arg(long, requires = "username")]
  register: bool,

  /// First name for --register
  #[arg(long, default_value = "")]
  first_name: String,

  /// Last name for --register
  #[arg(long, default_value = "")]
  last_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration, command line wins
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.url = url;
  }
  if let Some(username) = args.username {
    config.api.username = Some(username);
  }

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config.log)?;

  let credentials = Credentials::default();
  let client = ApiClient::new(&config, credentials.clone())?;
  info!(api = %client.base_url(), "starting booklend");

  let transport: Arc<dyn Transport> = Arc::new(client);
  let cache =
    ResourceCache::new(Arc::clone(&transport)).with_keep_unused_for(config.cache.keep_unused_for());
  let executor = MutationExecutor::new(transport, cache);

  let session = if args.register {
    Session::start_registered(&config, credentials, &executor, args.first_name, args.last_name).await
  } else {
    Session::start(&config, credentials, &executor).await
  };

  // Initialize and run the app
  let mut app = app::App::new(config, executor, session);
  app.run().await?;

  Ok(())
}
