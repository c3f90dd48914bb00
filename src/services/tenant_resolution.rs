//! Mapping a request host to a tenant.

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::net::IpAddr;

use crate::db::entities::tenant;

/// Labels that name platform hosts and can never be a tenant subdomain.
pub const RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "app", "admin", "mail", "static", "widget"];

const PLATFORM_HOSTS: &[&str] = &["www", "api", "app"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKind {
    /// The platform itself: bare base domain, platform labels, localhost, IPs.
    Platform,
    Subdomain(String),
    CustomDomain(String),
}

/// Lowercases and strips the port from a `Host` header value.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal: "[::1]:8080"
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    }
}

pub fn classify_host(host: &str, base_domain: &str) -> HostKind {
    let host = normalize_host(host);
    if host.is_empty() || host == "localhost" || host.parse::<IpAddr>().is_ok() || host == base_domain {
        return HostKind::Platform;
    }

    if let Some(prefix) = host.strip_suffix(base_domain).and_then(|p| p.strip_suffix('.')) {
        if prefix.contains('.') {
            // Deeper nesting under the base domain is not a tenant address.
            return HostKind::Platform;
        }
        if PLATFORM_HOSTS.contains(&prefix) {
            return HostKind::Platform;
        }
        return HostKind::Subdomain(prefix.to_string());
    }

    if host.ends_with(".localhost") {
        return HostKind::Platform;
    }

    HostKind::CustomDomain(host)
}

/// Subdomain rules for signup: 3..=63 chars of `[a-z0-9-]`, no edge hyphens, not reserved.
pub fn validate_subdomain(subdomain: &str) -> Result<(), String> {
    let len = subdomain.len();
    if !(3..=63).contains(&len) {
        return Err("Subdomain must be between 3 and 63 characters.".to_string());
    }
    if !subdomain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Subdomain may only contain lowercase letters, digits and hyphens.".to_string());
    }
    if subdomain.starts_with('-') || subdomain.ends_with('-') {
        return Err("Subdomain cannot start or end with a hyphen.".to_string());
    }
    if RESERVED_SUBDOMAINS.contains(&subdomain) {
        return Err(format!("Subdomain '{subdomain}' is reserved."));
    }
    Ok(())
}

pub fn validate_custom_domain(domain: &str, base_domain: &str) -> Result<String, String> {
    let domain = normalize_host(domain);
    if domain.len() > 253 || !domain.contains('.') {
        return Err("Custom domain must be a fully qualified host name.".to_string());
    }
    if domain == base_domain || domain.ends_with(&format!(".{base_domain}")) {
        return Err("Custom domain cannot be part of the platform domain.".to_string());
    }
    let labels_ok = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if !labels_ok {
        return Err("Custom domain contains an invalid label.".to_string());
    }
    Ok(domain)
}

/// Resolves the host to a tenant. Unknown subdomains and domains resolve to `None`.
pub async fn resolve_tenant(
    db: &DatabaseConnection,
    host: &str,
    base_domain: &str,
) -> Result<Option<tenant::Model>, DbErr> {
    match classify_host(host, base_domain) {
        HostKind::Platform => Ok(None),
        HostKind::Subdomain(sub) => {
            tenant::Entity::find()
                .filter(tenant::Column::Subdomain.eq(sub))
                .one(db)
                .await
        }
        HostKind::CustomDomain(domain) => {
            tenant::Entity::find()
                .filter(tenant::Column::CustomDomain.eq(domain))
                .one(db)
                .await
        }
    }
}
