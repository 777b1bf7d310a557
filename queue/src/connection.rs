use crate::errors::QueueError;
use std::str::FromStr;
use url::Url;

/// Where a queue binding sends and receives its messages.
#[derive(Clone, Debug, PartialEq)]
pub enum Connection {
    /// The broker owned by the current process.
    InProcess,
    /// A broker reachable over HTTP.
    Url(Url),
}

impl FromStr for Connection {
    type Err = QueueError;

    /// Accepts `inprocess`, a bare `http(s)://` URL, or the key/value form
    /// `Endpoint=http://host:port/;SharedAccessKeyName=...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("inprocess") {
            return Ok(Connection::InProcess);
        }

        let endpoint = if s.contains('=') {
            s.split(';')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| key.trim().eq_ignore_ascii_case("endpoint"))
                .map(|(_, value)| value.trim())
                .ok_or_else(|| QueueError::InvalidConnection("missing Endpoint".into()))?
        } else {
            s
        };

        // The raw string may carry credentials, so it is never echoed back.
        let url = Url::parse(endpoint)
            .map_err(|e| QueueError::InvalidConnection(format!("invalid endpoint: {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(Connection::Url(url)),
            other => Err(QueueError::InvalidConnection(format!(
                "unsupported scheme: {other}"
            ))),
        }
    }
}
