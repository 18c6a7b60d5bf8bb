//! Control-endpoint reachability probing.
//!
//! The daemon's control plane is opaque beyond "responds to a connection";
//! a successful connect counts as a liveness signal.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use agora_config::ApiEndpoint;

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks whether the endpoint accepts connections.
///
/// Errors that indicate nothing is listening resolve to `Ok(false)`; other
/// errors are propagated so callers can distinguish "not up yet" from
/// genuinely broken probing.
pub fn endpoint_is_reachable(endpoint: &ApiEndpoint) -> io::Result<bool> {
    match try_connect(endpoint) {
        Ok(()) => Ok(true),
        Err(error) if indicates_quiet_endpoint(&error) => Ok(false),
        Err(error) => Err(error),
    }
}

fn try_connect(endpoint: &ApiEndpoint) -> io::Result<()> {
    match endpoint {
        ApiEndpoint::Tcp { host, port } => {
            let address = resolve_tcp(host, *port)?;
            TcpStream::connect_timeout(&address, PROBE_CONNECT_TIMEOUT).map(|_| ())
        }
        ApiEndpoint::Unix { path } => connect_unix(path.as_str()),
    }
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<()> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, PROBE_CONNECT_TIMEOUT)
}

#[cfg(not(unix))]
fn connect_unix(_path: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets unsupported on this platform",
    ))
}

/// Determines whether an I/O error means no process is listening.
///
/// `ConnectionReset` is intentionally excluded: a reset means something was
/// listening and closed the connection, which is a liveness signal.
fn indicates_quiet_endpoint(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}
