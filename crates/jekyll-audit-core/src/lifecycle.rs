//! Build and serve lifecycle.
//!
//! [`SiteLifecycle::acquire_staged`] builds the site, starts the local
//! static server and returns the base URL to audit, reporting each stage
//! it enters. [`SiteLifecycle::release`]
//! stops the server; it is idempotent and safe to call when nothing was
//! started.

use std::net::{Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::context::ExecContext;
use crate::error::{AuditError, Result};
use crate::options::RunOptions;
use crate::pipeline::Stage;
use crate::process::{CommandRunner, CommandSpec};

/// A running static file server.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bind `host:port` (port 0 picks a free one) and serve `root`.
    ///
    /// The listener is bound before this returns, so the server is
    /// reachable as soon as the caller gets the handle.
    pub async fn start(root: &Path, host: &str, port: u16) -> Result<Self> {
        if !root.is_dir() {
            return Err(AuditError::BuildDirMissing(root.to_path_buf()));
        }

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| AuditError::ServerBind {
                addr: host_port(host, port),
                source,
            })?;
        let local = listener.local_addr()?;

        let app = Router::new().fallback_service(ServeDir::new(root));
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Static server stopped with error");
            }
        });

        info!(root = %root.display(), addr = %local, "Serving build output");
        Ok(Self {
            addr: local,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    /// Bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and wait for the serve task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Static server task did not exit cleanly");
            }
        }
        debug!(addr = %self.addr, "Static server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the build step and the local server for one run.
pub struct SiteLifecycle {
    runner: Arc<dyn CommandRunner>,
    server: Option<ServerHandle>,
}

impl SiteLifecycle {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            server: None,
        }
    }

    /// Whether a server is currently running.
    pub fn is_serving(&self) -> bool {
        self.server.is_some()
    }

    /// Address of the running server, if any.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::addr)
    }

    /// Produce a reachable base URL, building and serving as configured.
    pub async fn acquire(&mut self, options: &RunOptions, ctx: &ExecContext) -> Result<String> {
        self.acquire_staged(options, ctx, |_| {}).await
    }

    /// [`acquire`](Self::acquire), calling `on_stage` with `Building`,
    /// `Serving` and, on error, `Failed` as they are entered.
    pub async fn acquire_staged<F>(
        &mut self,
        options: &RunOptions,
        ctx: &ExecContext,
        mut on_stage: F,
    ) -> Result<String>
    where
        F: FnMut(Stage) + Send,
    {
        if let Some(base_url) = &options.base_url {
            info!(base_url = %base_url, "Using supplied base URL, skipping build and serve");
            return Ok(base_url.clone());
        }

        if options.skip_build {
            info!("Skipping build");
        } else {
            on_stage(Stage::Building);
            if let Err(e) = self.build(options, ctx).await {
                on_stage(Stage::Failed);
                error!(error = %e, "Build failed");
                return Err(e);
            }
        }

        on_stage(Stage::Serving);
        match self.serve(options, ctx).await {
            Ok(base_url) => {
                info!(base_url = %base_url, "Site is being served");
                Ok(base_url)
            }
            Err(e) => {
                on_stage(Stage::Failed);
                error!(error = %e, "Could not serve site");
                Err(e)
            }
        }
    }

    /// Run the configured build command to completion.
    pub async fn build(&self, options: &RunOptions, ctx: &ExecContext) -> Result<()> {
        let mut spec = CommandSpec::parse(&options.build_command)?
            .in_context(ctx)
            .current_dir(ctx.resolve(&options.source_dir));
        for (key, value) in &options.build_env {
            spec = spec.env(key, value);
        }

        let command = spec.display();
        info!(command = %command, "Building site");
        let code = self
            .runner
            .status(&spec)
            .await
            .map_err(|source| AuditError::BuildSpawn {
                command: command.clone(),
                source,
            })?;

        match code {
            Some(0) => {
                info!("Build finished");
                Ok(())
            }
            other => Err(AuditError::build_failed(command, other)),
        }
    }

    /// Start the static server over the build output and return its base URL.
    pub async fn serve(&mut self, options: &RunOptions, ctx: &ExecContext) -> Result<String> {
        if options.skip_serve {
            warn!("Serving skipped without a base URL; serving the build output anyway");
        }
        let root = ctx.resolve(&options.build_dir);
        let server = ServerHandle::start(&root, &options.host, options.port.unwrap_or(0)).await?;
        let origin = format!("http://{}", host_port(&options.host, server.addr().port()));
        self.server = Some(server);

        let base_path = detect_base_path(&ctx.resolve(&options.source_dir));
        Ok(join_base_path(&origin, base_path.as_deref()))
    }

    /// Stop the server if one is running. Safe to call any number of times.
    pub async fn release(&mut self) {
        match self.server.take() {
            Some(server) => server.stop().await,
            None => debug!("No static server to release"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JekyllSiteConfig {
    baseurl: Option<String>,
}

/// The `baseurl` declared in `<source_dir>/_config.yml`, if non-empty.
///
/// A missing or unparsable file means the site lives at the root.
pub fn detect_base_path(source_dir: &Path) -> Option<String> {
    let path: PathBuf = source_dir.join("_config.yml");
    let raw = std::fs::read_to_string(&path).ok()?;
    let parsed: JekyllSiteConfig = match serde_yaml::from_str(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unparsable site config");
            return None;
        }
    };
    parsed
        .baseurl
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
}

/// `host:port`, with IPv6 literals bracketed.
fn host_port(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Append a site base path to a served origin.
pub fn join_base_path(origin: &str, base_path: Option<&str>) -> String {
    match base_path {
        Some(path) => {
            let origin = origin.strip_suffix('/').unwrap_or(origin);
            if path.starts_with('/') {
                format!("{}{}", origin, path)
            } else {
                format!("{}/{}", origin, path)
            }
        }
        None => origin.to_string(),
    }
}
