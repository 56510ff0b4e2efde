use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{ProxyRoute, constants};
use crate::error::PlayerError;

/// Build the request URL for fetching `target` through `route`.
pub fn proxied_url(route: &ProxyRoute, target: &str) -> Result<Url> {
  match route {
    ProxyRoute::Query { base, param } => Url::parse_with_params(base, &[(param.as_str(), target)])
      .with_context(|| format!("Invalid proxy base URL: {}", base)),
    ProxyRoute::Prefix(prefix) => {
      Url::parse(&format!("{}{}", prefix, target)).with_context(|| format!("Invalid proxy prefix: {}", prefix))
    }
  }
}

/// Every URL to try for `target`, direct request first.
pub fn fetch_chain(target: &str, routes: &[ProxyRoute]) -> Vec<Url> {
  let direct = Url::parse(target).ok();
  direct
    .into_iter()
    .chain(routes.iter().filter_map(|route| match proxied_url(route, target) {
      Ok(url) => Some(url),
      Err(e) => {
        warn!(err = %e, "skipping proxy route");
        None
      }
    }))
    .collect()
}

async fn fetch_text(client: &Client, url: Url, timeout: Duration) -> Result<String> {
  let response = client.get(url).timeout(timeout).send().await.context("Request failed")?;
  let response = response.error_for_status().context("Bad status")?;
  response.text().await.context("Failed to read response body")
}

/// Fetch playlist text, falling back through the configured proxies.
pub async fn fetch_playlist(client: &Client, url: &str) -> Result<String, PlayerError> {
  let c = constants();
  let timeout = Duration::from_secs(c.fetch_timeout_secs);
  let chain = fetch_chain(url, &c.fetch_proxies);
  let mut reason = format!("invalid URL: {}", url);

  for (attempt, request_url) in chain.into_iter().enumerate() {
    debug!(attempt, url = %request_url, "fetching playlist");
    match fetch_text(client, request_url, timeout).await {
      Ok(text) => {
        info!(attempt, bytes = text.len(), "playlist fetched");
        return Ok(text);
      }
      Err(e) => {
        warn!(attempt, err = format!("{:#}", e), "playlist fetch failed");
        reason = format!("{:#}", e);
      }
    }
  }

  Err(PlayerError::PlaylistFetchFailed { url: url.to_string(), reason })
}

/// Download and decode a channel logo.
pub async fn fetch_logo(client: &Client, url: &str) -> Result<DynamicImage> {
  let timeout = Duration::from_secs(constants().fetch_timeout_secs);
  let response = client.get(url).timeout(timeout).send().await.with_context(|| format!("Failed to fetch logo {}", url))?;
  if !response.status().is_success() {
    return Err(anyhow!("Logo request returned {} for {}", response.status(), url));
  }
  let bytes = response.bytes().await.with_context(|| format!("Failed to read logo bytes from {}", url))?;
  image::load_from_memory(&bytes).with_context(|| format!("Failed to decode logo (URL: {})", url))
}

#[cfg(test)]
mod tests {
  use super::*;

  const TARGET: &str = "https://iptv-org.github.io/iptv/languages/sin.m3u";

  #[test]
  fn query_route_encodes_target() {
    let route = ProxyRoute::Query { base: "https://api.codetabs.com/v1/proxy".to_string(), param: "quest".to_string() };
    let url = proxied_url(&route, TARGET).unwrap();
    assert_eq!(url.host_str(), Some("api.codetabs.com"));
    let pairs: Vec<_> = url.query_pairs().into_owned().collect();
    assert_eq!(pairs, vec![("quest".to_string(), TARGET.to_string())]);
    assert!(url.as_str().contains("quest=https%3A%2F%2Fiptv-org"));
  }

  #[test]
  fn prefix_route_appends_target() {
    let route = ProxyRoute::Prefix("https://cors-anywhere.herokuapp.com/".to_string());
    let url = proxied_url(&route, TARGET).unwrap();
    assert!(url.as_str().starts_with("https://cors-anywhere.herokuapp.com/https:"));
    assert!(url.as_str().ends_with("/languages/sin.m3u"));
  }

  #[test]
  fn chain_is_direct_then_configured_proxies() {
    let chain = fetch_chain(TARGET, &constants().fetch_proxies);
    assert_eq!(chain.len(), 1 + constants().fetch_proxies.len());
    assert_eq!(chain[0].as_str(), TARGET);
    assert_eq!(chain[1].host_str(), Some("api.codetabs.com"));
  }

  #[test]
  fn chain_skips_unparseable_target() {
    let chain = fetch_chain("not a url", &[ProxyRoute::Prefix("https://p.example/".to_string())]);
    // The prefixed form still parses; only the direct hop is dropped.
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].host_str(), Some("p.example"));
  }

  #[test]
  fn invalid_proxy_base_is_error() {
    let route = ProxyRoute::Query { base: "::nope".to_string(), param: "q".to_string() };
    assert!(proxied_url(&route, TARGET).is_err());
  }
}
