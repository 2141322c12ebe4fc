use std::fs;
use std::path::Path;

use flightsurety_core::{units, GovernanceEngine, Identity, SuretyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const HOUR: i64 = 60 * 60;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed plan IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("seed plan serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("seed step {index} ({action}) failed: {source}")]
    Step {
        index: usize,
        action: &'static str,
        #[source]
        source: SuretyError,
    },
}

/// One startup action, executed as `caller` through the public engine API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SeedStep {
    FundAirline {
        airline: Identity,
        /// Whole units.
        units: u64,
    },
    RegisterAirline {
        caller: Identity,
        candidate: Identity,
    },
    Vote {
        caller: Identity,
        candidate: Identity,
    },
    RegisterFlight {
        airline: Identity,
        code: String,
        /// Departure relative to the engine clock at apply time.
        departs_in_hours: i64,
    },
}

impl SeedStep {
    pub fn action(&self) -> &'static str {
        match self {
            SeedStep::FundAirline { .. } => "fund_airline",
            SeedStep::RegisterAirline { .. } => "register_airline",
            SeedStep::Vote { .. } => "vote",
            SeedStep::RegisterFlight { .. } => "register_flight",
        }
    }

    async fn apply(&self, engine: &GovernanceEngine) -> Result<(), SuretyError> {
        match self {
            SeedStep::FundAirline { airline, units: n } => {
                engine.fund_airline(airline, units(*n as u128)).await
            }
            SeedStep::RegisterAirline { caller, candidate } => {
                engine.register_airline(caller, candidate).await
            }
            SeedStep::Vote { caller, candidate } => {
                engine.vote(caller, candidate).await.map(|_| ())
            }
            SeedStep::RegisterFlight {
                airline,
                code,
                departs_in_hours,
            } => {
                let departure = engine
                    .now_unix()
                    .saturating_add(departs_in_hours.saturating_mul(HOUR));
                engine
                    .register_flight(airline, code, departure)
                    .await
                    .map(|_| ())
            }
        }
    }
}

/// Ordered list of actions applied once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPlan {
    pub steps: Vec<SeedStep>,
}

impl SeedPlan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let bytes = fs::read(path.as_ref())?;
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Apply every step in order. The first failure aborts with its index.
    pub async fn apply(&self, engine: &GovernanceEngine) -> Result<usize, SeedError> {
        for (index, step) in self.steps.iter().enumerate() {
            step.apply(engine).await.map_err(|source| SeedError::Step {
                index,
                action: step.action(),
                source,
            })?;
        }
        info!(steps = self.steps.len(), "Seed plan applied");
        Ok(self.steps.len())
    }
}
