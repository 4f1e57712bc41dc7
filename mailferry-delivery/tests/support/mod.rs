//! Test doubles for the delivery engine. Simulation lives here, behind the
//! same seams the production engine uses, never in the delivery path.
#![allow(dead_code)] // shared between integration test binaries

pub mod mock_server;

use async_trait::async_trait;

use mailferry_delivery::MxResolver;
use mailferry_dns::{MxRecord, ResolveError};

/// A scripted resolver returning a fixed MX answer.
pub struct StaticMxResolver {
    records: Vec<MxRecord>,
    error: Option<ResolveError>,
}

impl StaticMxResolver {
    pub fn with_records(records: Vec<MxRecord>) -> Self {
        Self {
            records,
            error: None,
        }
    }

    pub fn failing_with(error: ResolveError) -> Self {
        Self {
            records: Vec::new(),
            error: Some(error),
        }
    }
}

#[async_trait]
impl MxResolver for StaticMxResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        match &self.error {
            Some(ResolveError::NoRecords(_)) => Err(ResolveError::NoRecords(domain.to_string())),
            Some(ResolveError::UpstreamsExhausted { last_error, .. }) => {
                Err(ResolveError::UpstreamsExhausted {
                    domain: domain.to_string(),
                    last_error: last_error.clone(),
                })
            }
            None => Ok(self.records.clone()),
        }
    }
}
