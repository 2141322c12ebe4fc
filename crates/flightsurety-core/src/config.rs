use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SuretyError;
use crate::types::{units, Amount, Identity};

/// Governance engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SuretyConfig {
    /// Minimum single funding payment that admits an airline to participate.
    pub minimum_funding: Amount,
    /// Registered-airline count from which admission requires votes.
    pub consensus_threshold: usize,
    /// Minimum distance between registration time and departure.
    pub min_departure_lead_secs: i64,
    /// Payout multiplier applied to unsettled coverage, as a ratio.
    pub payout_numerator: u32,
    pub payout_denominator: u32,
    /// Identity allowed to deliver flight-status resolutions.
    pub oracle_gateway: Identity,
    /// Per-subscriber notification channel capacity.
    pub notification_buffer: usize,
}

impl Default for SuretyConfig {
    fn default() -> Self {
        Self {
            minimum_funding: units(10),
            consensus_threshold: 4,
            min_departure_lead_secs: 24 * 60 * 60,
            // Placeholder 1.5x ratio pending product confirmation.
            payout_numerator: 3,
            payout_denominator: 2,
            oracle_gateway: Identity::new("oracle-gateway"),
            notification_buffer: 1024,
        }
    }
}

impl SuretyConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SuretyError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            SuretyError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| {
            SuretyError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SuretyError> {
        if self.payout_denominator == 0 {
            return Err(SuretyError::InvalidConfig(
                "payout_denominator must be non-zero".into(),
            ));
        }
        if self.minimum_funding == 0 {
            return Err(SuretyError::InvalidConfig(
                "minimum_funding must be non-zero".into(),
            ));
        }
        if self.notification_buffer == 0 {
            return Err(SuretyError::InvalidConfig(
                "notification_buffer must be non-zero".into(),
            ));
        }
        if self.min_departure_lead_secs < 0 {
            return Err(SuretyError::InvalidConfig(
                "min_departure_lead_secs must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Payout owed on `unsettled` coverage, rounded down. `None` when the
    /// product does not fit in an [`Amount`].
    pub fn payout_for(&self, unsettled: Amount) -> Option<Amount> {
        unsettled
            .checked_mul(Amount::from(self.payout_numerator))?
            .checked_div(Amount::from(self.payout_denominator))
    }

    /// Votes required to admit a candidate when `registered` airlines exist.
    ///
    /// Zero below the consensus threshold, otherwise half the registered
    /// count rounded up.
    pub fn required_votes(&self, registered: usize) -> usize {
        if registered < self.consensus_threshold {
            0
        } else {
            registered.div_ceil(2)
        }
    }
}
