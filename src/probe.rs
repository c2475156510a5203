//! Host reachability probe
//!
//! Runs only on a [`HostToken`], after the hostname guard approved it. The
//! probe is a single TCP connection attempt, resolution included, under one
//! deadline. It never shells out.

use serde::Serialize;
use std::time::Instant;
use tokio::net::TcpStream;
use tracing::debug;

use crate::deadline::Deadline;
use crate::guards::HostToken;

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub host: String,
    pub port: u16,
    pub reachable: bool,

    /// Connect latency in milliseconds, when the connection succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    /// Why the host was unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Bounded TCP connect probe
#[derive(Debug, Clone)]
pub struct HostProbe {
    port: u16,
    deadline: Deadline,
}

impl HostProbe {
    pub fn new(port: u16, deadline: Deadline) -> Self {
        Self { port, deadline }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Attempt a connection; failures are reported, not raised
    pub async fn probe(&self, host: &HostToken) -> ProbeReport {
        let start = Instant::now();
        let attempt = TcpStream::connect((host.as_str(), self.port));

        let (reachable, reason) = match self.deadline.run(attempt).await {
            Ok(Ok(_stream)) => (true, None),
            Ok(Err(e)) => {
                debug!(host = %host, port = self.port, error = %e, "Probe connection failed");
                (false, Some("unreachable"))
            }
            Err(_) => (false, Some("timeout")),
        };

        ProbeReport {
            host: host.to_string(),
            port: self.port,
            reachable,
            latency_ms: reachable.then(|| start.elapsed().as_secs_f64() * 1000.0),
            reason,
        }
    }
}
