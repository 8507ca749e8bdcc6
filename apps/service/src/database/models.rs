use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the `host.value` field is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Hostname,
    Ip,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Hostname => write!(f, "hostname"),
            HostKind::Ip => write!(f, "ip"),
        }
    }
}

impl FromStr for HostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hostname" => Ok(HostKind::Hostname),
            "ip" => Ok(HostKind::Ip),
            other => Err(format!("unknown host kind '{other}'")),
        }
    }
}

/// Monitored endpoint address: a hostname to resolve or an IPv4 literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub kind: HostKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proto::Tcp => write!(f, "tcp"),
            Proto::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Proto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Proto::Tcp),
            "udp" => Ok(Proto::Udp),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Last-known reachability of a service.
///
/// Only the monitoring orchestrator and the decay sweep write this field;
/// API writes never set it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Up,
    Down,
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Up => write!(f, "up"),
            ServiceStatus::Down => write!(f, "down"),
            ServiceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ServiceStatus::Up),
            "down" => Ok(ServiceStatus::Down),
            "unknown" => Ok(ServiceStatus::Unknown),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub edited: DateTime<Utc>,
    pub last_tested: Option<DateTime<Utc>>,
    pub last_responded: Option<DateTime<Utc>>,
}

/// A monitored network service and its last-known status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Assigned by the registry on insert, immutable, monotonically
    /// increasing. Default sort and cursor key.
    pub id: i64,
    pub name: String,
    pub host: Host,
    pub port: String,
    pub proto: Proto,
    pub status: ServiceStatus,
    pub timestamps: Timestamps,
}

/// The mutable-through-the-API subset of a service, already validated.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: String,
    pub host: Host,
    pub port: String,
    pub proto: Proto,
}

/// Named schedule entry gating the periodic monitoring runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogSchedule {
    pub name: String,
    pub enabled: bool,
    pub interval_seconds: u64,
}
