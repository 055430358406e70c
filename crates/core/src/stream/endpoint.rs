use crate::shared::error::StartupError;

/// Whether this side of the stream waits for a peer or dials out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointRole {
    Listen,
    Connect,
}

/// Configuration for one side of the relay: a `tcp://host:port` address
/// plus the socket role. Established once at startup and held for the
/// process lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEndpoint {
    host: String,
    port: u16,
    role: EndpointRole,
}

impl StreamEndpoint {
    /// Parses `tcp://host:port`. Other schemes are rejected; the relay
    /// carries an opaque bitstream over raw TCP in both directions.
    pub fn parse(url: &str, role: EndpointRole) -> Result<Self, StartupError> {
        let err = |message: &str| StartupError::Endpoint {
            url: url.to_string(),
            message: message.to_string(),
        };

        let rest = url
            .strip_prefix("tcp://")
            .ok_or_else(|| err("expected tcp:// scheme"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| err("expected host:port"))?;
        if host.is_empty() {
            return Err(err("empty host"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| err("port must be an integer in 1..=65535"))?;
        if port == 0 {
            return Err(err("port must be an integer in 1..=65535"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            role,
        })
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Renders the ffmpeg URL, carrying socket options as query
    /// parameters (`listen=1` for the serving side, a connect/IO
    /// timeout in microseconds for the dialing side).
    pub fn ffmpeg_url(&self, timeout_secs: u64) -> String {
        match self.role {
            EndpointRole::Listen => format!(
                "tcp://{}:{}?listen=1&listen_timeout={}",
                self.host,
                self.port,
                timeout_secs * 1000
            ),
            EndpointRole::Connect => format!(
                "tcp://{}:{}?timeout={}",
                self.host,
                self.port,
                timeout_secs * 1_000_000
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_connect_endpoint() {
        let ep = StreamEndpoint::parse("tcp://localhost:8553", EndpointRole::Connect).unwrap();
        assert_eq!(ep.address(), "localhost:8553");
        assert_eq!(ep.role(), EndpointRole::Connect);
    }

    #[test]
    fn test_ffmpeg_url_listen_carries_listen_options() {
        let ep = StreamEndpoint::parse("tcp://0.0.0.0:8554", EndpointRole::Listen).unwrap();
        let url = ep.ffmpeg_url(15);
        assert!(url.starts_with("tcp://0.0.0.0:8554?"));
        assert!(url.contains("listen=1"));
        assert!(url.contains("listen_timeout=15000"));
    }

    #[test]
    fn test_ffmpeg_url_connect_carries_timeout_in_micros() {
        let ep = StreamEndpoint::parse("tcp://example.com:9000", EndpointRole::Connect).unwrap();
        assert_eq!(
            ep.ffmpeg_url(5),
            "tcp://example.com:9000?timeout=5000000"
        );
    }

    #[rstest]
    #[case::wrong_scheme("udp://localhost:8553")]
    #[case::no_scheme("localhost:8553")]
    #[case::missing_port("tcp://localhost")]
    #[case::empty_host("tcp://:8553")]
    #[case::bad_port("tcp://localhost:video")]
    #[case::zero_port("tcp://localhost:0")]
    fn test_parse_rejects_malformed(#[case] url: &str) {
        assert!(StreamEndpoint::parse(url, EndpointRole::Connect).is_err());
    }

    #[test]
    fn test_parse_error_names_url() {
        let err = StreamEndpoint::parse("rtsp://x:1", EndpointRole::Listen).unwrap_err();
        assert!(err.to_string().contains("rtsp://x:1"));
    }
}
