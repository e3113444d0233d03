use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use http::StatusCode;
use tower_http::compression::CompressionLayer;
use waymark::{
    Router, build_stack,
    config::{DispatcherConfig, DispatcherConfigValidator, load_config},
    get_param, get_query, handler_fn, tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the dispatcher (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = if Path::new(config_path).exists() {
        load_config(config_path)
            .with_context(|| format!("Failed to load config from {config_path}"))?
    } else {
        DispatcherConfig::default()
    };

    tracing_setup::init_from_config(&config.logging)
        .wrap_err("Failed to initialize tracing")?;
    if !Path::new(config_path).exists() {
        tracing::warn!(path = %config_path, "Config file not found, using defaults");
    }

    DispatcherConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    let mut router = Router::new();
    for middleware in build_stack(&config).context("Failed to build middleware stack")? {
        router.use_middleware(middleware);
    }
    register_demo_routes(&mut router).context("Failed to register routes")?;
    let dispatcher = router.into_dispatcher();

    let app = axum::Router::new()
        .fallback_service(dispatcher)
        .layer(CompressionLayer::new());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "waymark listening");

    let shutdown = Arc::new(GracefulShutdown::new());
    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown.listen_for_signals().await {
                tracing::error!("Signal handler failed: {e:?}");
                shutdown.trigger_shutdown();
            }
        })
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.wait().await }
    })
    .await
    .context("Server error")?;

    signals.abort();
    tracing::info!("waymark stopped");
    Ok(())
}

fn register_demo_routes(router: &mut Router) -> Result<(), waymark::RouteError> {
    router.get(
        "/health",
        handler_fn(|_req| async { axum::Json(serde_json::json!({ "status": "ok" })) }),
    )?;
    router.get(
        "/hello/{name}",
        handler_fn(|req| async move {
            let greeting = match get_query(&req, "greeting") {
                greeting if greeting.is_empty() => "Hello".to_string(),
                greeting => greeting,
            };
            format!("{greeting}, {}!", get_param(&req, "name"))
        }),
    )?;
    router.route("/api", |api| {
        api.get(
            "/items/{id}",
            handler_fn(|req| async move {
                axum::Json(serde_json::json!({ "id": get_param(&req, "id") }))
            }),
        )?;
        api.post(
            "/items",
            handler_fn(|_req| async { (StatusCode::CREATED, "created") }),
        )?;
        api.get(
            "/files/*",
            handler_fn(|req| async move { format!("file: {}", req.uri().path()) }),
        )?;
        Ok(())
    })?;
    Ok(())
}

/// Validate a configuration file and print a summary
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:?}");
            std::process::exit(1);
        }
    };

    match DispatcherConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • CORS: {}", config.cors.is_some());
            println!(
                "   • Throttle: {}",
                config
                    .throttle
                    .map(|t| t.limit.to_string())
                    .unwrap_or_else(|| "off".to_string())
            );
            println!(
                "   • Rate Limit: {}",
                config
                    .rate_limit
                    .as_ref()
                    .map(|r| format!("1 request / {} per client", r.interval))
                    .unwrap_or_else(|| "off".to_string())
            );
            println!("   • Required Env: {:?}", config.required_env);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Use humantime intervals such as \"1s\" or \"500ms\"");
            println!("   • Keep throttle limit and rate limit capacity above 0");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# waymark dispatcher configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Catch handler panics and answer 500
recover_panics = true

# Refuse requests while any of these variables is unset
required_env = []

[logging]
level = "info"
json = false
request_log = true

[cors]
allowed_origins = ["https://*.example.com"]
allowed_methods = ["GET", "POST", "PUT", "DELETE"]
allowed_headers = ["content-type", "authorization"]
max_age = 600
allow_credentials = true

# Bound concurrently running handlers
# [throttle]
# limit = 64

# One accepted request per client address per interval
# [rate_limit]
# interval = "1s"
# capacity = 10000
# on_missing_key = "allow"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'waymark serve --config {config_path}' to start the server");
    Ok(())
}
