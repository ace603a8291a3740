// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pooled HTTP client over a worker's UNIX domain socket.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Uri};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::UnixStream;
use tokio::sync::Semaphore;

/// Concurrent connection cap per worker socket.
const MAX_CONNS_PER_HOST: usize = 10_000;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum ForwardError {
    Timeout,
    Transport(String),
}

/// Keep-alive client pool bound to one socket path.
pub struct WorkerSocketClient {
    path: PathBuf,
    client: Client<UnixConnector, Body>,
    permits: Semaphore,
}

impl WorkerSocketClient {
    pub fn new(path: PathBuf) -> Self {
        let connector = UnixConnector { path: Arc::new(path.clone()) };
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build::<_, Body>(connector);
        Self { path, client, permits: Semaphore::new(MAX_CONNS_PER_HOST) }
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Issue a request on the pool, bounded by the 30-second proxy deadline.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ForwardError::Transport("socket client closed".to_owned()))?;
        match tokio::time::timeout(PROXY_TIMEOUT, self.client.request(req)).await {
            Err(_) => Err(ForwardError::Timeout),
            Ok(Err(e)) => Err(ForwardError::Transport(e.to_string())),
            Ok(Ok(resp)) => Ok(resp.map(Body::new)),
        }
    }
}

/// Connector that dials the fixed socket path regardless of request URI.
#[derive(Clone)]
pub struct UnixConnector {
    path: Arc<PathBuf>,
}

impl tower::Service<Uri> for UnixConnector {
    type Response = UnixIo;
    type Error = std::io::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let path = Arc::clone(&self.path);
        Box::pin(async move {
            let stream = UnixStream::connect(path.as_path()).await?;
            Ok(UnixIo { inner: TokioIo::new(stream) })
        })
    }
}

/// IO adapter carrying the `Connection` metadata hyper's pool needs.
pub struct UnixIo {
    inner: TokioIo<UnixStream>,
}

impl Connection for UnixIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl hyper::rt::Read for UnixIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for UnixIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[std::io::IoSlice<'_>],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}

#[cfg(test)]
#[path = "unix_tests.rs"]
mod tests;
