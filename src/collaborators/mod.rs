//! Production collaborator wiring. `http` holds the real network-backed
//! adapters; the logging builder here backs the CLI's `--dry-run` flag.

pub mod http;

use async_trait::async_trait;

use crate::buildset::Buildset;
use crate::external::ComparisonBuilder;

/// A `ComparisonBuilder` that logs every buildset instead of submitting it,
/// for `--dry-run` invocations of the CLI harness.
#[derive(Debug, Default)]
pub struct LoggingComparisonBuilder;

#[async_trait]
impl ComparisonBuilder for LoggingComparisonBuilder {
    async fn submit(&self, buildset: Buildset) -> Result<(), anyhow::Error> {
        tracing::info!(
            kind = ?buildset.kind,
            reason = buildset.reason.as_deref().unwrap_or(""),
            properties = ?buildset.properties,
            "dry run: would submit buildset"
        );
        Ok(())
    }
}
