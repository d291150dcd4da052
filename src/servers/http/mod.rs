mod error;
mod handler;
mod request;
mod response;

use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use log::{debug, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time;

use self::handler::RequestHandler;
use super::State;

/// How long open connections get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct HttpServer {}

impl HttpServer {
    /// Serves the gateway until `shutdown` resolves, then drains open connections.
    pub async fn start<S>(state: State, shutdown: S) -> io::Result<()>
    where
        S: Future<Output = ()>,
    {
        let config = state.config.clone();
        let addr = resolve(config.http_host(), config.http_port())?;
        let listener = bind(addr, config.connection_backlog_size())?;
        info!("HTTP server listening on {}", listener.local_addr()?);

        let limit = Arc::new(Semaphore::new(config.max_concurrent_connections().max(1)));
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("failed to accept connection: {}", err);
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };

            let permit = match limit.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("connection limit reached, dropping {}", peer);
                    continue;
                }
            };

            let handler = RequestHandler {
                state: state.clone(),
                addr: peer,
            };

            let mut builder = http1::Builder::new();
            builder
                .timer(TokioTimer::new())
                .keep_alive(config.is_keep_alive_enabled())
                .header_read_timeout(config.header_read_timeout());

            let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), handler));

            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    debug!("connection {} closed with error: {}", peer, err);
                }
                drop(permit);
            });
        }

        drop(listener);
        info!("HTTP server shutting down");

        tokio::select! {
            _ = graceful.shutdown() => info!("HTTP connections closed"),
            _ = time::sleep(SHUTDOWN_GRACE) => warn!("timed out waiting for HTTP connections to close"),
        }

        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("could not resolve {}:{}", host, port),
        )
    })
}

fn bind(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind(resolve("127.0.0.1", 0).unwrap(), 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
