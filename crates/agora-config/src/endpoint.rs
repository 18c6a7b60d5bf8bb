use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Declarative configuration for the daemon's control endpoint.
///
/// The endpoint is where the external daemon exposes its control plane. The
/// supervisor only ever connects to it for liveness probing; the daemon owns
/// the listening side.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ApiEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// Loopback TCP endpoint.
    Tcp { host: String, port: u16 },
}

impl ApiEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{}", path),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for ApiEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(EndpointParseError::MissingUnixPath(input.to_string()));
                }
                Ok(Self::unix(path))
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| EndpointParseError::MissingHost(input.to_string()))?;
                let port = url
                    .port()
                    .ok_or_else(|| EndpointParseError::MissingPort(input.to_string()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(EndpointParseError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Errors encountered while parsing an [`ApiEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not recognised.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was missing.
    #[error("missing unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Input was not a valid URL.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::tcp("tcp://127.0.0.1:5001", ApiEndpoint::tcp("127.0.0.1", 5001))]
    #[case::unix("unix:///run/agora/api.sock", ApiEndpoint::unix("/run/agora/api.sock"))]
    fn parses_supported_schemes(#[case] input: &str, #[case] expected: ApiEndpoint) {
        let parsed: ApiEndpoint = input.parse().expect("endpoint should parse");
        assert_eq!(parsed, expected);
    }

    #[rstest]
    #[case::missing_port("tcp://127.0.0.1")]
    #[case::bad_scheme("http://127.0.0.1:5001")]
    fn rejects_unsupported_inputs(#[case] input: &str) {
        assert!(input.parse::<ApiEndpoint>().is_err());
    }

    #[test]
    fn display_round_trips_tcp() {
        let endpoint = ApiEndpoint::tcp("127.0.0.1", 5001);
        let rendered = endpoint.to_string();
        let parsed: ApiEndpoint = rendered.parse().expect("rendered endpoint should parse");
        assert_eq!(parsed, endpoint);
    }
}
