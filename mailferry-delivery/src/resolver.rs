//! The resolver seam between the engine and DNS.
//!
//! The engine consumes MX resolution through this trait so tests can
//! substitute a scripted resolver; simulated resolution never lives in the
//! production delivery path.

use async_trait::async_trait;

use mailferry_dns::{MxRecord, ResolveError, Resolver};

#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Resolves the MX records for `domain`.
    async fn resolve(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError>;
}

#[async_trait]
impl MxResolver for Resolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        Self::resolve(self, domain).await
    }
}
