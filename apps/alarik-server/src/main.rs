//! Alarik server binary.
//!
//! Reads its configuration from the environment, opens the metadata
//! store, bootstraps the service state, and serves S3 plus the admin
//! JSON API on one listener.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STORAGE_ROOT` | *(required)* | Root directory for bucket storage |
//! | `LISTEN_ADDR` | `0.0.0.0:8080` | Bind address |
//! | `JWT_SECRET` | *(required)* | Admin bearer-token secret |
//! | `DEFAULT_ADMIN_USERNAME` | `admin` | Bootstrap admin account |
//! | `DEFAULT_ADMIN_PASSWORD` | *(unset)* | Bootstrap admin password |
//! | `REGION` | `us-east-1` | SigV4 region |
//! | `S3_DOMAIN` | `s3.localhost` | Virtual-hosted-style base domain |
//! | `REQUEST_TIMEOUT_SECS` | `600` | Per-request deadline |
//! | `LOG_LEVEL` / `RUST_LOG` | `info` | Log filtering |
//!
//! # Exit codes
//!
//! 0 clean shutdown, 1 configuration error, 2 storage root
//! inaccessible, 3 metadata store unavailable.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use alarik_core::{CredentialCache, MetadataStore, ServerConfig};
use alarik_s3_core::{AlarikS3, CacheBackedCredentials, FsStore};
use alarik_s3_http::{AlarikHttpService, HttpConfig};

/// Exit code: configuration error.
const EXIT_CONFIG: i32 = 1;
/// Exit code: storage root inaccessible.
const EXIT_STORAGE: i32 = 2;
/// Exit code: metadata store unavailable.
const EXIT_METADATA: i32 = 3;

/// Internal directory under the storage root for the metadata store
/// and write staging. Bucket names cannot collide with it.
const INTERNAL_DIR: &str = ".tmp";

fn init_tracing(log_level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Accept loop with graceful drain on ctrl-c.
async fn serve(listener: TcpListener, service: AlarikHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        warn!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => break,
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");
    Ok(())
}

/// Create the bootstrap admin account on first start.
fn bootstrap_admin(store: &MetadataStore, config: &ServerConfig) -> Result<()> {
    let Some(password) = &config.default_admin_password else {
        return Ok(());
    };
    if store
        .user_by_name(&config.default_admin_username)?
        .is_some()
    {
        return Ok(());
    }
    let user = store.create_user(&config.default_admin_username, password, true)?;
    info!(username = %user.username, "created bootstrap admin user");
    Ok(())
}

async fn run(config: ServerConfig) -> Result<()> {
    let root = &config.storage_root;
    let internal = root.join(INTERNAL_DIR);
    std::fs::create_dir_all(&internal)
        .with_context(|| format!("cannot prepare {}", internal.display()))?;

    let store = match MetadataStore::open(&internal.join("alarik.db")) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "metadata store unavailable");
            std::process::exit(EXIT_METADATA);
        }
    };

    if let Err(e) = bootstrap_admin(&store, &config) {
        error!(error = %e, "failed to bootstrap admin user");
        std::process::exit(EXIT_METADATA);
    }

    let cache = Arc::new(CredentialCache::new());
    let s3 = Arc::new(AlarikS3::new(
        config.region.clone(),
        FsStore::new(root.clone()),
        store.clone(),
        Arc::clone(&cache),
    ));
    if let Err(e) = s3.bootstrap().await {
        error!(error = %e, "service bootstrap failed");
        std::process::exit(EXIT_METADATA);
    }

    let credentials = Arc::new(CacheBackedCredentials::new(cache, store));
    let http_config = HttpConfig {
        domain: std::env::var("S3_DOMAIN").unwrap_or_else(|_| "s3.localhost".to_owned()),
        virtual_hosting: true,
        jwt_secret: config.jwt_secret.clone(),
        request_timeout: config.request_timeout,
    };
    let service = AlarikHttpService::new(s3, credentials, http_config);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        storage_root = %root.display(),
        region = %config.region,
        "Alarik listening"
    );
    serve(listener, service).await
}

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    init_tracing(&config.log_level);

    if !config.storage_root.is_dir() {
        error!(
            storage_root = %config.storage_root.display(),
            "storage root is missing or not a directory"
        );
        std::process::exit(EXIT_STORAGE);
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "server failed");
        std::process::exit(EXIT_CONFIG);
    }
}
