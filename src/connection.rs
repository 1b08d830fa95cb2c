/// A rolling request-rate budget: at most `request_count` requests per
/// `window_seconds` seconds.
///
/// Immutable once a limiter has been built from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Number of requests allowed per rolling window.
    pub request_count: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
}

/// Identifies one external connection and how its calls should be throttled.
///
/// Two connections share a limiter (and therefore a rate budget) when their
/// [`key`](Connection::key)s match; `niceness` travels with each submitted
/// request rather than with the limiter, so differently-prioritised callers
/// can share one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// A unique platform identifier.
    pub platform: String,
    /// A unique connection identifier within that platform.
    pub connection_id: String,
    /// Request priority; 0 is the highest, larger values yield to smaller.
    pub niceness: i32,
    /// The rate limit for the connection.
    pub rate_limit: RateLimit,
}

impl Connection {
    /// The identity key used to look up this connection's limiter.
    pub fn key(&self) -> String {
        format!("{}:{}", self.platform, self.connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_joins_platform_and_connection_id() {
        let conn = Connection {
            platform: "example".to_string(),
            connection_id: "conn1".to_string(),
            niceness: 0,
            rate_limit: RateLimit {
                request_count: 10,
                window_seconds: 60,
            },
        };
        assert_eq!(conn.key(), "example:conn1");
    }
}
