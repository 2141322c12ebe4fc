//! FlightSurety core: airline governance and insurance escrow.
//!
//! A single [`LedgerStore`] owns all surety state and only accepts writes from
//! authorized callers while the system is operational. The
//! [`GovernanceEngine`] layers the business rules on top (airline admission
//! by consensus, participation funding, flight registration, insurance
//! purchases, payout crediting on airline-fault delays and withdrawals) and
//! publishes every committed transition to a hash-chained notification
//! journal.

#![deny(unsafe_code)]

pub mod access;
pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod journal;
pub mod oracle;
pub mod store;
pub mod transfer;
pub mod types;

pub use access::CallerRole;
pub use bus::{Notification, NotificationBus, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SuretyConfig;
pub use engine::{GovernanceEngine, ReserveSnapshot};
pub use error::SuretyError;
pub use events::{EventKind, SuretyEvent};
pub use journal::{EventJournal, JournalEntry};
pub use oracle::{IgnoredReason, Resolution, StatusRequest, RESPONDER_GROUPS};
pub use store::{Credit, LedgerStore, StoreHandle};
pub use transfer::{InMemoryTransfer, TransferReceipt, ValueTransfer};
pub use types::{
    milli_units, units, AirlineRecord, AirlineState, Amount, FlightKey, FlightRecord,
    FlightStatus, Identity, InsurancePolicy, UNIT,
};
