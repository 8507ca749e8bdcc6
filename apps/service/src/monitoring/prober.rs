use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;

use crate::database::models::{Host, HostKind, Proto};

/// Default per-probe network budget. One unreachable host must never
/// stall the rest of the batch.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single reachability check. Network and resolution failures
/// are folded in here and never surfaced as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// DNS lookup of a hostname-kind host failed; no port check was run.
    ResolutionFailed { reason: String },
    Reachable { addr: SocketAddr },
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

/// Stateless reachability prober: resolve, then connect-check.
pub struct Prober {
    timeout: Duration,
}

impl Prober {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probe one service snapshot. Pure with respect to shared state; the
    /// caller applies the outcome.
    pub async fn probe(&self, host: &Host, port: &str, proto: Proto) -> ProbeOutcome {
        let address = match host.kind {
            HostKind::Ip => match host.value.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(e) => {
                    return ProbeOutcome::Unreachable {
                        reason: format!("invalid address literal '{}': {e}", host.value),
                    };
                }
            },
            HostKind::Hostname => match self.resolve(&host.value).await {
                Ok(ip) => ip,
                Err(reason) => return ProbeOutcome::ResolutionFailed { reason },
            },
        };

        let port: u16 = match port.parse() {
            Ok(port) => port,
            Err(_) => {
                return ProbeOutcome::Unreachable { reason: format!("invalid port '{port}'") };
            }
        };
        let addr = SocketAddr::new(address, port);

        match proto {
            Proto::Tcp => self.tcp_open(addr).await,
            Proto::Udp => self.udp_open(addr).await,
        }
    }

    async fn resolve(&self, hostname: &str) -> Result<IpAddr, String> {
        match timeout(self.timeout, lookup_host((hostname, 0u16))).await {
            Ok(Ok(mut addrs)) => addrs
                .next()
                .map(|sock| sock.ip())
                .ok_or_else(|| format!("{hostname}: no addresses returned")),
            Ok(Err(e)) => Err(format!("{hostname}: {e}")),
            Err(_) => Err(format!("{hostname}: DNS lookup timed out")),
        }
    }

    /// A completed connect within the timeout means the port is open.
    async fn tcp_open(&self, addr: SocketAddr) -> ProbeOutcome {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => ProbeOutcome::Reachable { addr },
            Ok(Err(e)) => ProbeOutcome::Unreachable { reason: format!("connect failed: {e}") },
            Err(_) => ProbeOutcome::Unreachable { reason: "connection timed out".into() },
        }
    }

    /// UDP gives no handshake, so a probe datagram is sent and a reply is
    /// required within the timeout. Silence (open|filtered) counts as
    /// unreachable; an ICMP port-unreachable surfaces as a recv error.
    async fn udp_open(&self, addr: SocketAddr) -> ProbeOutcome {
        let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
            Ok(socket) => socket,
            Err(e) => {
                return ProbeOutcome::Unreachable { reason: format!("socket setup failed: {e}") };
            }
        };
        if let Err(e) = socket.connect(addr).await {
            return ProbeOutcome::Unreachable { reason: format!("socket setup failed: {e}") };
        }
        if let Err(e) = socket.send(&[0u8]).await {
            return ProbeOutcome::Unreachable { reason: format!("send failed: {e}") };
        }

        let mut buf = [0u8; 512];
        match timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(Ok(_)) => ProbeOutcome::Reachable { addr },
            Ok(Err(e)) => ProbeOutcome::Unreachable { reason: format!("port closed: {e}") },
            Err(_) => ProbeOutcome::Unreachable { reason: "no datagram reply".into() },
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}
