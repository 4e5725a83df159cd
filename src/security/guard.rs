//! Per-operation access guards
//!
//! A [`Guard`] permits a request when all of the following hold:
//! - the client IP is in the IP whitelist, or the whitelist is empty
//! - the path starts with a whitelisted root, or the root list is empty
//! - a valid token for the resource is presented, or no secret is set

use crate::common::{Config, Error, GuardConfig, Result};
use crate::security::jwt::verify_token;
use axum::http::Method;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Kinds of guarded operations, one per HTTP verb the filer serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Head,
    Delete,
    Put,
    Post,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Get,
        OperationKind::Head,
        OperationKind::Delete,
        OperationKind::Put,
        OperationKind::Post,
    ];

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(OperationKind::Get),
            Method::HEAD => Some(OperationKind::Head),
            Method::DELETE => Some(OperationKind::Delete),
            Method::PUT => Some(OperationKind::Put),
            Method::POST => Some(OperationKind::Post),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Get => write!(f, "get"),
            OperationKind::Head => write!(f, "head"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Put => write!(f, "put"),
            OperationKind::Post => write!(f, "post"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown operation kind '{}'", s)))
    }
}

/// Authorization policy for one operation kind
#[derive(Debug, Clone, Default)]
pub struct Guard {
    ip_whitelist: Vec<IpNet>,
    root_whitelist: Vec<String>,
    secret: String,
}

impl Guard {
    /// Entries containing `/` are CIDR ranges, anything else an exact IP
    pub fn new(ip_whitelist: &[String], root_whitelist: &[String], secret: &str) -> Result<Self> {
        let ip_whitelist = ip_whitelist
            .iter()
            .map(|entry| parse_ip_entry(entry.trim()))
            .collect::<Result<Vec<_>>>()?;
        let root_whitelist = root_whitelist
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        Ok(Self {
            ip_whitelist,
            root_whitelist,
            secret: secret.to_string(),
        })
    }

    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        Self::new(
            &config.ip_whitelist,
            &config.root_whitelist,
            &config.secure_key,
        )
    }

    /// No restrictions of any kind
    pub fn is_open(&self) -> bool {
        self.ip_whitelist.is_empty() && self.root_whitelist.is_empty() && self.secret.is_empty()
    }

    pub fn requires_token(&self) -> bool {
        !self.secret.is_empty()
    }

    pub fn check_whitelist(&self, client_ip: Option<IpAddr>) -> Result<()> {
        if self.ip_whitelist.is_empty() {
            return Ok(());
        }
        match client_ip {
            Some(ip) if self.ip_whitelist.iter().any(|net| net.contains(&ip)) => Ok(()),
            Some(ip) => Err(Error::Unauthorized(format!("not in whitelist: {}", ip))),
            None => Err(Error::Unauthorized("unknown client address".into())),
        }
    }

    pub fn check_root(&self, path: &str) -> Result<()> {
        if self.root_whitelist.is_empty()
            || self.root_whitelist.iter().any(|root| path.starts_with(root))
        {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!("path not allowed: {}", path)))
        }
    }

    pub fn check_token(&self, token: Option<&str>, resource_id: &str) -> Result<()> {
        if self.secret.is_empty() {
            return Ok(());
        }
        match token {
            Some(token) if !token.is_empty() => verify_token(&self.secret, token, resource_id),
            _ => Err(Error::Unauthorized("missing token".into())),
        }
    }

    /// Full decision for a request on `path` (also the token's resource id)
    pub fn authorize(&self, client_ip: Option<IpAddr>, path: &str, token: Option<&str>) -> Result<()> {
        self.check_whitelist(client_ip)?;
        self.check_root(path)?;
        self.check_token(token, path)
    }
}

fn parse_ip_entry(entry: &str) -> Result<IpNet> {
    if entry.contains('/') {
        entry
            .parse::<IpNet>()
            .map_err(|e| Error::InvalidConfig(format!("invalid CIDR {}: {}", entry, e)))
    } else {
        entry
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|e| Error::InvalidConfig(format!("invalid IP {}: {}", entry, e)))
    }
}

/// One guard per operation kind
#[derive(Debug, Clone)]
pub struct GuardSet {
    guards: BTreeMap<OperationKind, Guard>,
}

impl GuardSet {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut guards = BTreeMap::new();
        for kind in OperationKind::ALL {
            let guard = Guard::from_config(&config.guard(kind))?;
            if !guard.is_open() {
                tracing::info!("Guard for {} requests is active", kind);
            }
            guards.insert(kind, guard);
        }
        Ok(Self { guards })
    }

    /// Every operation kind unrestricted
    pub fn open() -> Self {
        Self {
            guards: OperationKind::ALL
                .into_iter()
                .map(|kind| (kind, Guard::default()))
                .collect(),
        }
    }

    pub fn with_guard(mut self, kind: OperationKind, guard: Guard) -> Self {
        self.guards.insert(kind, guard);
        self
    }

    pub fn get(&self, kind: OperationKind) -> Option<&Guard> {
        self.guards.get(&kind)
    }

    /// Decide a request; methods without a guard are rejected
    pub fn authorize(
        &self,
        method: &Method,
        client_ip: Option<IpAddr>,
        path: &str,
        token: Option<&str>,
    ) -> Result<()> {
        let guard = OperationKind::from_method(method)
            .and_then(|kind| self.guards.get(&kind))
            .ok_or_else(|| Error::Unauthorized(format!("method {} not allowed", method)))?;
        guard.authorize(client_ip, path, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::jwt::TokenIssuer;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_open_guard_permits_everything() {
        let guard = Guard::new(&[], &[], "").unwrap();
        assert!(guard.is_open());
        guard.authorize(ip("203.0.113.9"), "/any/path", None).unwrap();
        guard.authorize(None, "/", Some("garbage")).unwrap();
    }

    #[test]
    fn test_ip_whitelist_exact_and_cidr() {
        let guard = Guard::new(&strings(&["127.0.0.1", "10.0.0.0/8"]), &[], "").unwrap();
        guard.check_whitelist(ip("127.0.0.1")).unwrap();
        guard.check_whitelist(ip("10.20.30.40")).unwrap();
        assert!(guard.check_whitelist(ip("192.168.1.1")).is_err());
        assert!(guard.check_whitelist(None).is_err());
    }

    #[test]
    fn test_invalid_ip_entry_rejected() {
        assert!(matches!(
            Guard::new(&strings(&["10.0.0.0/99"]), &[], ""),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Guard::new(&strings(&["not-an-ip"]), &[], "").is_err());
    }

    #[test]
    fn test_root_whitelist() {
        let guard = Guard::new(&[], &strings(&["/public", "/shared/"]), "").unwrap();
        guard.check_root("/public/a.txt").unwrap();
        guard.check_root("/shared/x").unwrap();
        assert!(guard.check_root("/private/a.txt").is_err());
    }

    #[test]
    fn test_secret_requires_valid_token() {
        let guard = Guard::new(&[], &[], "secret").unwrap();
        assert!(guard.requires_token());

        assert!(guard.authorize(None, "/a.txt", None).is_err());

        let foreign = TokenIssuer::new("other").issue("/a.txt").unwrap();
        assert!(guard.authorize(None, "/a.txt", Some(foreign.as_str())).is_err());

        let valid = TokenIssuer::new("secret").issue("/a.txt").unwrap();
        guard.authorize(None, "/a.txt", Some(valid.as_str())).unwrap();
    }

    #[test]
    fn test_guard_set_routes_by_method() {
        let set = GuardSet::open().with_guard(
            OperationKind::Delete,
            Guard::new(&strings(&["127.0.0.1"]), &[], "").unwrap(),
        );

        set.authorize(&Method::GET, ip("192.168.1.1"), "/a", None).unwrap();
        assert!(set.authorize(&Method::DELETE, ip("192.168.1.1"), "/a", None).is_err());
        set.authorize(&Method::DELETE, ip("127.0.0.1"), "/a", None).unwrap();
        assert!(set.authorize(&Method::PATCH, ip("127.0.0.1"), "/a", None).is_err());
    }

    #[test]
    fn test_guard_set_from_config() {
        let mut config = Config::default();
        config.guards.insert(
            OperationKind::Put,
            GuardConfig {
                secure_key: "k".into(),
                ..Default::default()
            },
        );
        let set = GuardSet::from_config(&config).unwrap();
        assert!(set.get(OperationKind::Put).unwrap().requires_token());
        for kind in [OperationKind::Get, OperationKind::Head, OperationKind::Delete, OperationKind::Post] {
            assert!(set.get(kind).unwrap().is_open());
        }
    }

    #[test]
    fn test_operation_kind_serde() {
        let kind: OperationKind = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(kind, OperationKind::Delete);
        assert_eq!(OperationKind::from_method(&Method::HEAD), Some(OperationKind::Head));
        assert_eq!("PUT".parse::<OperationKind>().unwrap(), OperationKind::Put);
        assert!("patch".parse::<OperationKind>().is_err());
    }
}
