use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::access::{require_operational, CallerRole};
use crate::bus::{Notification, NotificationBus, SubscriptionId};
use crate::clock::Clock;
use crate::config::SuretyConfig;
use crate::error::SuretyError;
use crate::events::{EventKind, SuretyEvent};
use crate::journal::JournalEntry;
use crate::oracle::{IgnoredReason, Resolution, StatusRequest};
use crate::store::{LedgerStore, StoreHandle};
use crate::transfer::{TransferReceipt, ValueTransfer};
use crate::types::{AirlineRecord, Amount, FlightKey, FlightRecord, FlightStatus, Identity};

/// Point-in-time view of escrow totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub held_funds: Amount,
    pub total_received: Amount,
    pub outstanding: Amount,
}

/// Governance engine: the public surface of the surety system.
///
/// Each operation locks the store, resolves the caller's role, validates the
/// request against that snapshot, writes through the store as the engine
/// identity and publishes its notifications before releasing the lock.
pub struct GovernanceEngine {
    store: StoreHandle,
    identity: Identity,
    config: SuretyConfig,
    clock: Arc<dyn Clock>,
    transfer: Arc<dyn ValueTransfer>,
    bus: Arc<NotificationBus>,
    request_nonce: AtomicU64,
}

impl GovernanceEngine {
    /// Attach an engine to an existing store.
    ///
    /// The store owner must authorize `identity` before writes succeed.
    pub fn new(
        store: StoreHandle,
        identity: Identity,
        config: SuretyConfig,
        clock: Arc<dyn Clock>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Result<Self, SuretyError> {
        config.validate()?;
        let bus = Arc::new(NotificationBus::new(config.notification_buffer));
        Ok(Self {
            store,
            identity,
            config,
            clock,
            transfer,
            bus,
            request_nonce: AtomicU64::new(0),
        })
    }

    /// Create a fresh store seeded with `first_airline`, attach an engine
    /// and authorize it as `owner`.
    pub async fn bootstrap(
        owner: Identity,
        first_airline: Identity,
        identity: Identity,
        config: SuretyConfig,
        clock: Arc<dyn Clock>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Result<Self, SuretyError> {
        let store = LedgerStore::initialize(owner.clone(), first_airline).into_handle();
        let engine = Self::new(store, identity.clone(), config, clock, transfer)?;
        engine.authorize_caller(&owner, identity).await?;
        info!(
            engine = %engine.identity,
            rail = engine.transfer.rail(),
            "Governance engine bootstrapped"
        );
        Ok(engine)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &SuretyConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<NotificationBus> {
        self.bus.clone()
    }

    /// Current time on the engine's clock, in unix seconds.
    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub async fn is_operational(&self) -> bool {
        self.store.lock().await.is_operational()
    }

    /// Owner-only. Not subject to the operational gate.
    pub async fn set_operating_status(
        &self,
        caller: &Identity,
        operational: bool,
    ) -> Result<(), SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = store
            .set_operating_status(caller, operational)
            .map(|()| {
                info!(operational, "Operating status changed");
                ((), vec![SuretyEvent::OperatingStatusChanged { operational }])
            });
        self.settle("set_operating_status", caller, outcome).await
    }

    /// Owner-only and idempotent. Returns false when `identity` was already
    /// authorized.
    pub async fn authorize_caller(
        &self,
        caller: &Identity,
        identity: Identity,
    ) -> Result<bool, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = store
            .authorize_caller(caller, identity.clone())
            .map(|added| {
                if added {
                    info!(identity = %identity, "Caller authorized");
                    (true, vec![SuretyEvent::CallerAuthorized { identity }])
                } else {
                    (false, Vec::new())
                }
            });
        self.settle("authorize_caller", caller, outcome).await
    }

    // =========================================================================
    // AIRLINES
    // =========================================================================

    /// Register `candidate` as `caller`.
    ///
    /// Below the consensus threshold a funded airline registers directly;
    /// from then on the candidate needs prior votes from half the registered
    /// airlines, rounded up.
    pub async fn register_airline(
        &self,
        caller: &Identity,
        candidate: &Identity,
    ) -> Result<(), SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_register_airline(&mut store, caller, candidate);
        self.settle("register_airline", caller, outcome).await
    }

    fn apply_register_airline(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        candidate: &Identity,
    ) -> Result<((), Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        let role = CallerRole::resolve(store, caller);
        role.require_registered(caller)?;
        role.require_funded(caller)?;

        if store.is_airline_registered(candidate) {
            return Err(SuretyError::AirlineAlreadyRegistered(candidate.clone()));
        }

        let required = self.config.required_votes(store.registered_airline_count());
        let votes = store.num_votes(candidate);
        if votes < required {
            return Err(SuretyError::ConsensusRequired {
                candidate: candidate.clone(),
                votes,
                required,
            });
        }

        store.register_airline(&self.identity, candidate)?;
        info!(
            airline = %candidate,
            registered_by = %caller,
            votes,
            registered = store.registered_airline_count(),
            "Airline registered"
        );
        Ok((
            (),
            vec![SuretyEvent::AirlineRegistered {
                airline: candidate.clone(),
                registered_by: caller.clone(),
            }],
        ))
    }

    /// Vote for a pending candidate. Returns the candidate's vote count.
    pub async fn vote(&self, caller: &Identity, candidate: &Identity) -> Result<usize, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_vote(&mut store, caller, candidate);
        self.settle("vote", caller, outcome).await
    }

    fn apply_vote(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        candidate: &Identity,
    ) -> Result<(usize, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        CallerRole::resolve(store, caller).require_funded(caller)?;

        if store.is_airline_registered(candidate) {
            return Err(SuretyError::AirlineAlreadyRegistered(candidate.clone()));
        }
        if store.has_voted(candidate, caller) {
            return Err(SuretyError::DuplicateVote {
                candidate: candidate.clone(),
                voter: caller.clone(),
            });
        }

        let votes = store.record_vote(&self.identity, candidate, caller)?;
        info!(candidate = %candidate, voter = %caller, votes, "Airline vote recorded");
        Ok((
            votes,
            vec![SuretyEvent::AirlineVoted {
                candidate: candidate.clone(),
                voter: caller.clone(),
                votes,
            }],
        ))
    }

    /// Pay a participation deposit. Each payment must meet the minimum on
    /// its own; a funded airline may top up.
    pub async fn fund_airline(&self, caller: &Identity, amount: Amount) -> Result<(), SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_fund_airline(&mut store, caller, amount);
        self.settle("fund_airline", caller, outcome).await
    }

    fn apply_fund_airline(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        amount: Amount,
    ) -> Result<((), Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        CallerRole::resolve(store, caller).require_registered(caller)?;

        if amount < self.config.minimum_funding {
            return Err(SuretyError::InsufficientFunding {
                required: self.config.minimum_funding,
                offered: amount,
            });
        }

        store.fund_airline(&self.identity, caller, amount)?;
        info!(airline = %caller, amount, held = store.held_funds(), "Airline funded");
        Ok((
            (),
            vec![SuretyEvent::AirlineFunded {
                airline: caller.clone(),
                amount,
            }],
        ))
    }

    pub async fn is_airline_registered(&self, airline: &Identity) -> bool {
        self.store.lock().await.is_airline_registered(airline)
    }

    pub async fn is_airline_funded(&self, airline: &Identity) -> bool {
        self.store.lock().await.is_airline_funded(airline)
    }

    pub async fn num_registered_airlines(&self) -> usize {
        self.store.lock().await.registered_airline_count()
    }

    pub async fn num_votes(&self, candidate: &Identity) -> usize {
        self.store.lock().await.num_votes(candidate)
    }

    /// Snapshot of one airline's record, read under a single lock. Unknown
    /// identities yield an unregistered record.
    pub async fn airline(&self, airline: &Identity) -> AirlineRecord {
        self.store
            .lock()
            .await
            .airline(airline)
            .cloned()
            .unwrap_or_default()
    }

    /// Every airline or candidate the store knows, sorted by identity.
    pub async fn airlines(&self) -> Vec<(Identity, AirlineRecord)> {
        let store = self.store.lock().await;
        let mut airlines: Vec<(Identity, AirlineRecord)> = store
            .airlines()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        airlines.sort_by(|a, b| a.0.cmp(&b.0));
        airlines
    }

    // =========================================================================
    // FLIGHTS
    // =========================================================================

    /// Register (or overwrite) one of the caller's flights. Returns its key.
    pub async fn register_flight(
        &self,
        caller: &Identity,
        code: &str,
        departure: i64,
    ) -> Result<FlightKey, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_register_flight(&mut store, caller, code, departure);
        self.settle("register_flight", caller, outcome).await
    }

    fn apply_register_flight(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        code: &str,
        departure: i64,
    ) -> Result<(FlightKey, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        CallerRole::resolve(store, caller).require_funded(caller)?;

        let now = self.clock.now_unix();
        let lead_secs = self.config.min_departure_lead_secs;
        if departure < now.saturating_add(lead_secs) {
            return Err(SuretyError::DepartureTooSoon {
                departure,
                now,
                lead_secs,
            });
        }

        let key = FlightKey::new(caller.clone(), code, departure);
        store.register_flight(&self.identity, key.clone(), now)?;
        info!(flight = %key, "Flight registered");
        Ok((key.clone(), vec![SuretyEvent::FlightRegistered { key }]))
    }

    pub async fn flight(&self, key: &FlightKey) -> Option<FlightRecord> {
        self.store.lock().await.flight(key).cloned()
    }

    pub async fn flights_of(&self, airline: &Identity) -> Vec<(FlightKey, FlightRecord)> {
        self.store.lock().await.flights_of(airline)
    }

    // =========================================================================
    // INSURANCE
    // =========================================================================

    /// Add `amount` to the caller's coverage on `key`. Returns the new total.
    pub async fn buy_insurance(
        &self,
        caller: &Identity,
        key: &FlightKey,
        amount: Amount,
    ) -> Result<Amount, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_buy_insurance(&mut store, caller, key, amount);
        self.settle("buy_insurance", caller, outcome).await
    }

    fn apply_buy_insurance(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        key: &FlightKey,
        amount: Amount,
    ) -> Result<(Amount, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;

        let flight = store
            .flight(key)
            .filter(|flight| flight.registered)
            .ok_or_else(|| SuretyError::FlightNotRegistered(key.clone()))?;
        if flight.status.is_final() {
            return Err(SuretyError::FlightAlreadyResolved(key.clone()));
        }
        if amount == 0 {
            return Err(SuretyError::ZeroPremium);
        }

        let total = store.buy_insurance(&self.identity, caller, key, amount)?;
        info!(passenger = %caller, flight = %key, amount, total, "Insurance purchased");
        Ok((
            total,
            vec![SuretyEvent::InsurancePurchased {
                passenger: caller.clone(),
                key: key.clone(),
                amount,
                total,
            }],
        ))
    }

    pub async fn insurance_amount(&self, passenger: &Identity, key: &FlightKey) -> Amount {
        self.store.lock().await.insurance_amount(passenger, key)
    }

    // =========================================================================
    // BALANCES
    // =========================================================================

    pub async fn passenger_balance(&self, passenger: &Identity) -> Amount {
        self.store.lock().await.passenger_balance(passenger)
    }

    pub async fn reserves(&self) -> ReserveSnapshot {
        let store = self.store.lock().await;
        ReserveSnapshot {
            held_funds: store.held_funds(),
            total_received: store.total_received(),
            outstanding: store.outstanding_balances(),
        }
    }

    /// Withdraw the caller's whole balance through the transfer rail.
    ///
    /// The transfer runs under the store lock. If it fails the debit is
    /// restored before the lock is released.
    pub async fn pay(&self, caller: &Identity) -> Result<TransferReceipt, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_pay(&mut store, caller).await;
        self.settle("pay", caller, outcome).await
    }

    async fn apply_pay(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
    ) -> Result<(TransferReceipt, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        if store.passenger_balance(caller) == 0 {
            return Err(SuretyError::ZeroBalance(caller.clone()));
        }

        let amount = store.debit_balance(&self.identity, caller)?;
        match self.transfer.send(caller, amount).await {
            Ok(receipt) => {
                info!(
                    passenger = %caller,
                    amount,
                    transfer_id = %receipt.transfer_id,
                    rail = self.transfer.rail(),
                    "Balance withdrawn"
                );
                Ok((
                    receipt,
                    vec![SuretyEvent::Withdrawal {
                        passenger: caller.clone(),
                        amount,
                    }],
                ))
            }
            Err(reason) => {
                store.restore_balance(&self.identity, caller, amount)?;
                Err(SuretyError::TransferFailed {
                    recipient: caller.clone(),
                    reason,
                })
            }
        }
    }

    // =========================================================================
    // ORACLE BOUNDARY
    // =========================================================================

    /// Open a status request for `key` and announce it to responders.
    ///
    /// The flight does not have to be registered; resolutions for unknown
    /// flights are ignored.
    pub async fn fetch_flight_status(
        &self,
        caller: &Identity,
        key: &FlightKey,
    ) -> Result<StatusRequest, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_fetch_flight_status(&mut store, caller, key);
        self.settle("fetch_flight_status", caller, outcome).await
    }

    fn apply_fetch_flight_status(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        key: &FlightKey,
    ) -> Result<(StatusRequest, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        let nonce = self.request_nonce.fetch_add(1, Ordering::Relaxed);
        let request = StatusRequest::new(key.clone(), caller.clone(), self.clock.now_unix(), nonce);
        store.record_status_request(&self.identity, request.clone())?;
        info!(flight = %key, index = request.index, requester = %caller, "Oracle request opened");
        Ok((
            request.clone(),
            vec![SuretyEvent::OracleRequest {
                index: request.index,
                key: request.key,
                requester: request.requester,
            }],
        ))
    }

    pub async fn open_status_requests(&self) -> Vec<StatusRequest> {
        self.store.lock().await.open_status_requests()
    }

    /// Apply a status code delivered by the oracle gateway.
    ///
    /// The first final status wins. A `LateAirline` status credits every
    /// insuree before the status is written; if reserves cannot cover the
    /// credits nothing changes.
    pub async fn resolve_flight_status(
        &self,
        caller: &Identity,
        key: &FlightKey,
        code: u8,
    ) -> Result<Resolution, SuretyError> {
        let mut store = self.store.lock().await;
        let outcome = self.apply_resolution(&mut store, caller, key, code);
        self.settle("resolve_flight_status", caller, outcome).await
    }

    fn apply_resolution(
        &self,
        store: &mut LedgerStore,
        caller: &Identity,
        key: &FlightKey,
        code: u8,
    ) -> Result<(Resolution, Vec<SuretyEvent>), SuretyError> {
        self.open_gates(store)?;
        if *caller != self.config.oracle_gateway && caller != store.owner() {
            return Err(SuretyError::Unauthorized(caller.clone()));
        }
        let status = FlightStatus::try_from(code)?;

        let current = match store.flight(key).filter(|flight| flight.registered) {
            Some(flight) => flight.status,
            None => return Ok(ignored(key, IgnoredReason::UnknownFlight)),
        };
        if status == FlightStatus::Unknown {
            return Ok(ignored(key, IgnoredReason::NoInformation));
        }
        if current.is_final() {
            return Ok(ignored(key, IgnoredReason::AlreadyResolved));
        }

        let credited = if status.is_payable() {
            store.credit_insurees(&self.identity, key, |unsettled| {
                self.config.payout_for(unsettled)
            })?
        } else {
            Vec::new()
        };
        store.set_flight_status(&self.identity, key, status, self.clock.now_unix())?;
        info!(
            flight = %key,
            status = %status,
            credited = credited.len(),
            "Flight status applied"
        );

        let mut events = vec![SuretyEvent::FlightStatusInfo {
            key: key.clone(),
            status,
        }];
        events.extend(credited.iter().map(|credit| SuretyEvent::InsureeCredited {
            passenger: credit.passenger.clone(),
            key: key.clone(),
            amount: credit.amount,
        }));
        Ok((Resolution::Applied { status, credited }, events))
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    pub async fn subscribe(
        &self,
        kinds: Option<Vec<EventKind>>,
    ) -> (SubscriptionId, mpsc::Receiver<Notification>) {
        self.bus.subscribe(kinds).await
    }

    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        self.bus.unsubscribe(id).await
    }

    /// Journal entries with `index >= from`.
    pub async fn journal(&self, from: u64) -> Vec<JournalEntry> {
        self.bus.journal_since(from).await
    }

    pub async fn verify_journal(&self) -> bool {
        self.bus.verify_journal().await
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn open_gates(&self, store: &LedgerStore) -> Result<(), SuretyError> {
        require_operational(store)?;
        if !store.is_caller_authorized(&self.identity) {
            return Err(SuretyError::CallerNotAuthorized(self.identity.clone()));
        }
        Ok(())
    }

    /// Publish a committed outcome's events, or log the rejection.
    /// Callers hold the store lock so notifications keep commit order.
    async fn settle<T>(
        &self,
        operation: &'static str,
        caller: &Identity,
        outcome: Result<(T, Vec<SuretyEvent>), SuretyError>,
    ) -> Result<T, SuretyError> {
        match outcome {
            Ok((value, events)) => {
                self.bus.publish_all(events).await;
                Ok(value)
            }
            Err(err) => {
                warn!(
                    operation,
                    caller = %caller,
                    kind = err.kind(),
                    error = %err,
                    "Operation rejected"
                );
                Err(err)
            }
        }
    }
}

fn ignored(key: &FlightKey, reason: IgnoredReason) -> (Resolution, Vec<SuretyEvent>) {
    debug!(flight = %key, ?reason, "Resolution ignored");
    (Resolution::Ignored(reason), Vec::new())
}
