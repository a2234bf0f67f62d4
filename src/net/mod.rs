//! HTTP client plumbing for the site scraper (C3). Grounded on the teacher's
//! `download.rs` request builder (user-agent header, `Accept-Language`
//! header, bounded timeouts) but without its retry middleware — §4.3 is
//! explicit that the scraper makes no retries of its own.

pub mod dns;

use std::time::Duration;

use anyhow::Context;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;

use dns::CloudflareDohResolver;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENTS[0])
}

fn random_timeout() -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(5..=10))
}

/// Builds a one-off client for a single scrape call: a fresh user agent, a
/// timeout randomized in the 5-10s window, and (when `doh` is set)
/// resolution scoped to Cloudflare's DNS-over-HTTPS resolver instead of the
/// system resolver.
pub fn build_scrape_client(doh: bool) -> Result<Client, anyhow::Error> {
    let mut builder = Client::builder()
        .user_agent(random_user_agent())
        .timeout(random_timeout())
        .gzip(true);

    if doh {
        builder = builder.dns_resolver(std::sync::Arc::new(CloudflareDohResolver::new()));
    }

    builder.build().context("failed to build scrape HTTP client")
}

/// Fetches `url` as text with a fresh scoped client. Single attempt, no
/// retries — callers decide whether a failed fetch ends the operation.
pub async fn get_text(url: &str) -> Result<String, anyhow::Error> {
    let client = build_scrape_client(true)?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT_LANGUAGE, "de-DE,de;q=0.9,en;q=0.5")
        .send()
        .await
        .with_context(|| format!("request failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("non-success status: {url}"))?;

    response.text().await.with_context(|| format!("failed to read response body: {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_timeout_stays_in_spec_window() {
        for _ in 0..50 {
            let timeout = random_timeout();
            assert!(timeout >= Duration::from_secs(5) && timeout <= Duration::from_secs(10));
        }
    }

    #[test]
    fn user_agent_pool_is_nonempty() {
        assert!(!random_user_agent().is_empty());
    }
}
