//! Per-call DNS override through Cloudflare's DNS-over-HTTPS resolver
//! (1.1.1.1), per §5 — a scoped `reqwest::dns::Resolve` implementation
//! attached to one client, not a process-global patch of name resolution.

use std::net::SocketAddr;
use std::sync::Arc;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use reqwest::dns::{Name, Resolve, Resolving};

/// Resolves hostnames via Cloudflare's DoH endpoint instead of the system
/// resolver. Attach to a client with `ClientBuilder::dns_resolver`; clients
/// that don't need the override keep using the system resolver.
#[derive(Clone)]
pub struct CloudflareDohResolver {
    inner: Arc<TokioAsyncResolver>,
}

impl CloudflareDohResolver {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare_https(), ResolverOpts::default());
        Self { inner: Arc::new(resolver) }
    }
}

impl Default for CloudflareDohResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for CloudflareDohResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.inner.clone();
        Box::pin(async move {
            let lookup = resolver.lookup_ip(name.as_str()).await?;
            let addrs: Vec<SocketAddr> = lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            Ok(Box::new(addrs.into_iter()) as Box<dyn Iterator<Item = SocketAddr> + Send>)
        })
    }
}
