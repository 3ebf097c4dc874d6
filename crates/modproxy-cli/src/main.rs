use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hyper::{Body, Request};
use modproxy_config::{init_tracing, ConfigError, ConfigValidationError, ProxyConfig};
use modproxy_server::FallbackRouter;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(
    name = "modproxy",
    version,
    about = "Go module proxy backed by the local toolchain with upstream fallback"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the module proxy
    Serve(ServeArgs),
    /// Print the effective configuration and validate it
    Config(ConfigArgs),
    /// Run a single request path through the proxy and print a summary
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct ConfigSource {
    /// Config file (defaults to `$MODPROXY_CONFIG`, then `./modproxy.toml`)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override `upstream.url`
    #[arg(long)]
    upstream: Option<Url>,
    /// Override `toolchain.go`
    #[arg(long)]
    go: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    source: ConfigSource,
    /// Override `server.listen`
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(flatten)]
    source: ConfigSource,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ResolveArgs {
    /// Request path, e.g. `/golang.org/x/mod/@latest`
    path: String,
    #[command(flatten)]
    source: ConfigSource,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Config(args) => show_config(args),
        Command::Resolve(args) => resolve(args),
    }
}

fn load_config(source: &ConfigSource) -> Result<(ProxyConfig, Option<PathBuf>)> {
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let (mut config, path) = modproxy_config::load(source.config.as_deref(), &cwd)?;

    if let Some(url) = &source.upstream {
        config.upstream.url = url.clone();
    }
    if let Some(go) = &source.go {
        config.toolchain.go = go.clone();
    }
    Ok((config, path))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

fn serve(args: ServeArgs) -> Result<i32> {
    let (mut config, path) = load_config(&args.source)?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config.validate()?;

    init_tracing(&config.logging);
    info!(
        config = %describe_source(path.as_deref()),
        upstream = %config.upstream.url,
        go = %config.toolchain.go.display(),
        "starting module proxy"
    );

    let runtime = runtime()?;
    runtime.block_on(async {
        let router = FallbackRouter::from_config(&config)?;
        let listener = modproxy_server::bind(config.server.listen)?;
        modproxy_server::serve(listener, router, shutdown_signal()).await?;
        Ok::<_, anyhow::Error>(())
    })?;
    Ok(0)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C; shutting down"),
        Err(err) => {
            warn!(error = %err, "failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    path: Option<&'a Path>,
    valid: bool,
    errors: &'a [ConfigValidationError],
    config: &'a ProxyConfig,
}

fn show_config(args: ConfigArgs) -> Result<i32> {
    let (config, path) = load_config(&args.source)?;
    let errors = match config.validate() {
        Ok(()) => Vec::new(),
        Err(ConfigError::Invalid(errors)) => errors,
        Err(err) => return Err(err.into()),
    };

    if args.json {
        let report = ConfigReport {
            path: path.as_deref(),
            valid: errors.is_empty(),
            errors: &errors,
            config: &config,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("# source: {}", describe_source(path.as_deref()));
        print!(
            "{}",
            toml::to_string_pretty(&config).context("failed to render config as TOML")?
        );
        for error in &errors {
            eprintln!("invalid: {error}");
        }
    }

    Ok(if errors.is_empty() { 0 } else { 1 })
}

fn resolve(args: ResolveArgs) -> Result<i32> {
    let (config, _) = load_config(&args.source)?;
    config.validate()?;
    init_tracing(&config.logging);

    let path = if args.path.starts_with('/') {
        args.path
    } else {
        format!("/{}", args.path)
    };

    let runtime = runtime()?;
    let (status, content_type, body) = runtime.block_on(async {
        let router = FallbackRouter::from_config(&config)?;
        let request = Request::get(path.as_str())
            .body(Body::empty())
            .with_context(|| format!("invalid request path `{path}`"))?;
        let response = router.handle(request).await;

        let status = response.status();
        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_owned();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("failed to read response body")?;
        Ok::<_, anyhow::Error>((status, content_type, body))
    })?;

    println!("status: {status}");
    println!("content-type: {content_type}");
    println!("bytes: {}", body.len());
    if !status.is_success() {
        println!("body: {}", String::from_utf8_lossy(&body).trim_end());
    }

    Ok(if status.is_success() { 0 } else { 1 })
}

fn describe_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_owned(),
    }
}
