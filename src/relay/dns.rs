//! MX resolution for relay destinations.

use std::{future::Future, pin::Pin};

use hickory_resolver::{
    config::ResolverConfig, name_server::TokioConnectionProvider, TokioResolver,
};

use crate::internal;

/// Answers "which hosts accept mail for this domain", in preference order.
/// A lookup failure is reported as an empty list; the caller falls back to
/// the domain itself.
pub trait MxResolver: Send + Sync + std::fmt::Debug {
    fn mx(&self, host: String) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + '_>>;
}

/// MX resolution through the system resolver (Cloudflare fallback when the
/// system configuration cannot be read).
#[derive(Debug)]
pub struct MxLookup {
    resolver: TokioResolver,
}

impl Default for MxLookup {
    fn default() -> Self {
        let resolver = match TokioResolver::builder(TokioConnectionProvider::default()) {
            Ok(builder) => builder.build(),
            Err(err) => {
                internal!(
                    level = WARN,
                    "system DNS configuration failed ({err}), using Cloudflare fallback"
                );
                TokioResolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };

        Self { resolver }
    }
}

impl MxLookup {
    async fn lookup(&self, host: &str) -> Vec<String> {
        match self.resolver.mx_lookup(host).await {
            Ok(lookup) => {
                let mut records: Vec<_> = lookup
                    .iter()
                    .map(|mx| (mx.preference(), mx.exchange().to_utf8()))
                    .collect();
                records.sort_by_key(|(preference, _)| *preference);

                records
                    .into_iter()
                    .map(|(_, name)| name.trim_end_matches('.').to_string())
                    .collect()
            }
            Err(err) => {
                internal!(level = WARN, "MX lookup for {host} failed: {err}");
                Vec::new()
            }
        }
    }
}

impl MxResolver for MxLookup {
    fn mx(&self, host: String) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + '_>> {
        Box::pin(async move { self.lookup(&host).await })
    }
}
