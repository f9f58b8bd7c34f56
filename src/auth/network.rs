//! Per-company network restriction for self-service clocking.

use std::net::IpAddr;

use actix_web::HttpRequest;
use ipnet::IpNet;
use tracing::warn;

use crate::model::company::Company;

/// Where a company's employees may clock from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkPolicy {
    #[default]
    Open,
    /// A client matching either the IP or the range is admitted
    Restricted {
        ip: Option<IpAddr>,
        net: Option<IpNet>,
    },
}

pub fn parse_ip(raw: &str) -> Result<IpAddr, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a valid IP address", raw.trim()))
}

/// Host bits are tolerated: `192.168.0.7/24` means `192.168.0.0/24`.
pub fn parse_cidr(raw: &str) -> Result<IpNet, String> {
    raw.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| format!("'{}' is not a valid CIDR range", raw.trim()))
}

impl NetworkPolicy {
    /// Unparseable stored values fail closed: the company stays restricted
    /// but that value matches nothing.
    pub fn from_company(company: &Company) -> Self {
        if !company.restricts_network() {
            return NetworkPolicy::Open;
        }
        let ip = company.allowed_ip.as_deref().and_then(|raw| {
            parse_ip(raw)
                .map_err(|e| warn!(company_id = %company.id, error = %e, "Ignoring stored IP"))
                .ok()
        });
        let net = company.allowed_cidr.as_deref().and_then(|raw| {
            parse_cidr(raw)
                .map_err(|e| warn!(company_id = %company.id, error = %e, "Ignoring stored range"))
                .ok()
        });
        NetworkPolicy::Restricted { ip, net }
    }

    pub fn permits(&self, client: Option<IpAddr>) -> bool {
        match self {
            NetworkPolicy::Open => true,
            NetworkPolicy::Restricted { ip, net } => client.is_some_and(|client| {
                *ip == Some(client) || net.is_some_and(|net| net.contains(&client))
            }),
        }
    }
}

/// First hop of `X-Forwarded-For` when trusted, else the peer address.
pub fn client_ip(req: &HttpRequest, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        if let Some(forwarded) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
        {
            return forwarded
                .split(',')
                .next()
                .and_then(|first| first.trim().parse().ok());
        }
    }
    req.peer_addr().map(|addr| addr.ip())
}
