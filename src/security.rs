//! Endpoint checks applied to identity provider configuration.
//!
//! Bearer tokens are forwarded to the provider on every cold resolution, so the provider
//! endpoint must not be downgraded to plain HTTP or pointed at an unexpected host.

// std
use std::collections::HashSet;
// crates.io
use serde::{Deserialize, de::Deserializer};
use url::Url;
// self
use crate::_prelude::*;

/// Canonicalise a DNS name: trimmed, without trailing dot, lowercase.
pub fn canonicalize_dns_name(value: &str) -> Option<String> {
	let trimmed = value.trim().trim_end_matches('.');

	if trimmed.is_empty() {
		return None;
	}

	Some(trimmed.to_ascii_lowercase())
}

/// Canonicalise allowlist entries, dropping empties and duplicates.
pub fn normalize_allowlist(domains: Vec<String>) -> Vec<String> {
	let mut seen = HashSet::new();

	domains
		.iter()
		.filter_map(|domain| canonicalize_dns_name(domain))
		.filter(|domain| seen.insert(domain.clone()))
		.collect()
}

/// `serde` helper normalising `allowed_domains` while deserialising.
pub fn deserialize_allowed_domains<'de, D>(
	deserializer: D,
) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Vec::<String>::deserialize(deserializer).map(normalize_allowlist)
}

/// Ensure the URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Provider endpoint {url} must use HTTPS.")))
	}
}

/// Whether `host` equals or is a subdomain of an allowlisted domain.
///
/// An empty allowlist admits every host.
pub fn host_is_allowed(host: &str, allowed_domains: &[String]) -> bool {
	if allowed_domains.is_empty() {
		return true;
	}

	let Some(host) = canonicalize_dns_name(host) else {
		return false;
	};

	allowed_domains.iter().filter_map(|domain| canonicalize_dns_name(domain)).any(|domain| {
		host == domain
			|| host.strip_suffix(&domain).is_some_and(|prefix| prefix.ends_with('.'))
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn allowlist_matches_subdomains_case_insensitively() {
		let domains = normalize_allowlist(vec!["GoogleAPIs.com.".into(), "googleapis.com".into()]);

		assert_eq!(domains, vec!["googleapis.com".to_owned()]);
		assert!(host_is_allowed("identitytoolkit.GOOGLEAPIS.com", &domains));
		assert!(host_is_allowed("googleapis.com.", &domains));
		assert!(!host_is_allowed("evilgoogleapis.com", &domains));
		assert!(host_is_allowed("anything.test", &[]));
	}

	#[test]
	fn plain_http_is_refused() {
		let http = Url::parse("http://identitytoolkit.googleapis.com/").expect("url");
		let https = Url::parse("https://identitytoolkit.googleapis.com/").expect("url");

		assert!(matches!(enforce_https(&http), Err(Error::Security(_))));
		assert!(enforce_https(&https).is_ok());
	}
}
