//! Field-level validation for service payloads.
//!
//! Every field is checked independently and the failures are aggregated
//! into a map keyed by field name, so the API layer can report all
//! offending fields in one response.

use serde::Deserialize;

use crate::database::models::{Host, HostKind, Proto, ServiceDefinition};
use crate::error::FieldErrors;

/// Longest accepted service name.
pub const NAME_MAX_LEN: usize = 30;

/// Raw create/replace request body. Enum-like fields arrive as plain
/// strings so that bad values surface as field errors instead of
/// deserialization failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicePayload {
    pub name: String,
    pub host: HostPayload,
    pub port: String,
    pub proto: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostPayload {
    pub kind: String,
    pub value: String,
}

/// Raw partial-update request body. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub host: Option<HostPatch>,
    pub port: Option<String>,
    pub proto: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostPatch {
    pub kind: Option<String>,
    pub value: Option<String>,
}

impl ServicePatch {
    /// Overlay this patch onto an existing definition, producing the raw
    /// payload that is then validated as a whole.
    pub fn apply_to(&self, current: &ServiceDefinition) -> ServicePayload {
        let host = HostPayload {
            kind: self
                .host
                .as_ref()
                .and_then(|h| h.kind.clone())
                .unwrap_or_else(|| current.host.kind.to_string()),
            value: self
                .host
                .as_ref()
                .and_then(|h| h.value.clone())
                .unwrap_or_else(|| current.host.value.clone()),
        };
        ServicePayload {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            host,
            port: self.port.clone().unwrap_or_else(|| current.port.clone()),
            proto: self.proto.clone().unwrap_or_else(|| current.proto.to_string()),
        }
    }
}

/// Validate a raw payload into a typed service definition.
///
/// Uniqueness of `name` is a registry concern and is checked at write
/// time by the API layer, not here.
pub fn validate_payload(payload: &ServicePayload) -> Result<ServiceDefinition, FieldErrors> {
    let mut errors = FieldErrors::new();

    if let Err(message) = validate_name(&payload.name) {
        errors.entry("name".into()).or_default().push(message);
    }

    let kind = match payload.host.kind.parse::<HostKind>() {
        Ok(kind) => Some(kind),
        Err(_) => {
            errors
                .entry("host".into())
                .or_default()
                .push("Not valid host kind. Use hostname or ip".into());
            None
        }
    };
    if let Some(kind) = kind {
        let valid = match kind {
            HostKind::Hostname => is_valid_hostname(&payload.host.value),
            HostKind::Ip => is_valid_unicast_ipv4(&payload.host.value),
        };
        if !valid {
            let message = match kind {
                HostKind::Hostname => "Not valid hostname",
                HostKind::Ip => "Not valid IP address",
            };
            errors.entry("host".into()).or_default().push(message.into());
        }
    }

    if let Err(message) = validate_port(&payload.port) {
        errors.entry("port".into()).or_default().push(message);
    }

    let proto = match payload.proto.parse::<Proto>() {
        Ok(proto) => Some(proto),
        Err(_) => {
            errors
                .entry("proto".into())
                .or_default()
                .push("Not valid protocol. Use tcp or udp".into());
            None
        }
    };

    match (kind, proto) {
        (Some(kind), Some(proto)) if errors.is_empty() => Ok(ServiceDefinition {
            name: payload.name.trim().to_string(),
            host: Host { kind, value: payload.host.value.clone() },
            port: payload.port.clone(),
            proto,
        }),
        _ => Err(errors),
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name is required".into());
    }
    if trimmed.len() > NAME_MAX_LEN {
        return Err(format!("Name too long (max {NAME_MAX_LEN} characters)"));
    }
    Ok(())
}

/// Accepted port range is the IANA bound 0-65535.
pub fn validate_port(port: &str) -> Result<(), String> {
    // Reject leading '+', whitespace and similar forms u32 parsing allows.
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err("Not valid network port".into());
    }
    match port.parse::<u32>() {
        Ok(value) if value <= 65535 => Ok(()),
        _ => Err("Not valid network port".into()),
    }
}

/// DNS-label grammar: dot-separated labels of alphanumerics and hyphens,
/// no empty label, no leading or trailing hyphen, label length <= 63.
pub fn is_valid_hostname(value: &str) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    value.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Dotted-quad IPv4 with every octet <= 255 and first octet <= 223
/// (unicast range 0.0.0.0-223.255.255.255).
pub fn is_valid_unicast_ipv4(value: &str) -> bool {
    let octets: Vec<&str> = value.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    let mut parsed = [0u16; 4];
    for (i, octet) in octets.iter().enumerate() {
        if octet.is_empty() || octet.len() > 3 || !octet.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        match octet.parse::<u16>() {
            Ok(value) if value <= 255 => parsed[i] = value,
            _ => return false,
        }
    }
    parsed[0] <= 223
}
