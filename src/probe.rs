//! Target readiness detection.
//!
//! The target counts as running when its SSH port accepts a TCP connection
//! within the configured timeout. With a local forward configured, the
//! forwarded port on 127.0.0.1 is probed instead.

use crate::config_file::TargetConfig;
use crate::dispatcher::ReadinessProbe;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use strum::Display;

/// Reachability of the target's command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetState {
    /// TCP connection succeeded
    Reachable,
    /// Resolution failed, or no address accepted a connection in time
    Unreachable,
}

impl TargetState {
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Probe connecting to `host:port` over TCP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpReadinessProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReadinessProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the endpoint SSH will use, including a local forward
    pub fn for_target(target: &TargetConfig) -> Self {
        let (host, port) = target.ssh_endpoint();
        Self::new(host, port, Duration::from_secs(target.connect_timeout_secs))
    }

    /// Try every resolved address until one accepts a connection.
    pub fn check(&self) -> TargetState {
        let addrs: Vec<SocketAddr> = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "failed to resolve target address");
                return TargetState::Unreachable;
            }
        };

        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(_stream) => {
                    tracing::debug!(%addr, "target accepted TCP connection");
                    return TargetState::Reachable;
                }
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "target connection check failed");
                }
            }
        }

        TargetState::Unreachable
    }
}

impl ReadinessProbe for TcpReadinessProbe {
    fn is_ready(&self) -> bool {
        let state = self.check();
        tracing::info!(host = %self.host, port = self.port, %state, "target readiness");
        state.is_reachable()
    }
}
