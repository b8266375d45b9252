use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::Doi;
use crate::error::AcquireError;
use crate::strategy::{Strategy, StrategyOutcome};

/// A strategy together with the time budget it gets per attempt.
pub struct ChainLink {
    strategy: Box<dyn Strategy>,
    timeout: Duration,
}

impl ChainLink {
    pub fn new(strategy: impl Strategy + 'static, timeout: Duration) -> Self {
        Self {
            strategy: Box::new(strategy),
            timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }
}

/// Tries strategies in priority order until one produces the artifact.
pub struct StrategyChain {
    links: Vec<ChainLink>,
}

impl StrategyChain {
    pub fn new(links: Vec<ChainLink>) -> Self {
        Self { links }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.links.iter().map(ChainLink::name).collect()
    }

    pub fn resolve(&self, doi: &Doi, destination: &Path) -> StrategyOutcome {
        self.resolve_with_progress(doi, destination, |_, _| {})
    }

    /// Like [`StrategyChain::resolve`], reporting each attempt to `progress` as
    /// `(strategy name, outcome)`.
    pub fn resolve_with_progress<F>(
        &self,
        doi: &Doi,
        destination: &Path,
        mut progress: F,
    ) -> StrategyOutcome
    where
        F: FnMut(&str, &StrategyOutcome),
    {
        let mut last = StrategyOutcome::failed(AcquireError::ArtifactNotProduced(
            "no acquisition strategy enabled".to_string(),
        ));
        for link in &self.links {
            debug!(strategy = link.name(), %doi, "trying strategy");
            let outcome = link.strategy.acquire(doi, destination, link.timeout);
            progress(link.name(), &outcome);
            match outcome.failure_reason() {
                None => return outcome,
                Some(reason) => {
                    warn!(strategy = link.name(), %doi, kind = reason.kind(), "{reason}");
                }
            }
            last = outcome;
        }
        last
    }
}
