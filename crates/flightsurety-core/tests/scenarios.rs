use std::sync::Arc;

use flightsurety_core::{
    milli_units, units, EventKind, FlightKey, FlightStatus, GovernanceEngine, Identity,
    InMemoryTransfer, IgnoredReason, ManualClock, Resolution, SuretyConfig, SuretyError,
    SuretyEvent,
};

const NOW: i64 = 1_700_000_000;
const HOUR: i64 = 3_600;

fn id(name: &str) -> Identity {
    Identity::new(name)
}

struct Harness {
    engine: GovernanceEngine,
    clock: Arc<ManualClock>,
    rail: Arc<InMemoryTransfer>,
}

async fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let rail = Arc::new(InMemoryTransfer::new());
    let engine = GovernanceEngine::bootstrap(
        id("owner"),
        id("a1"),
        id("app"),
        SuretyConfig::default(),
        clock.clone(),
        rail.clone(),
    )
    .await
    .expect("bootstrap");
    Harness {
        engine,
        clock,
        rail,
    }
}

/// Four registered airlines, all funded.
async fn four_funded_airlines(engine: &GovernanceEngine) {
    engine.fund_airline(&id("a1"), units(10)).await.unwrap();
    for name in ["a2", "a3", "a4"] {
        engine.register_airline(&id("a1"), &id(name)).await.unwrap();
        engine.fund_airline(&id(name), units(10)).await.unwrap();
    }
    assert_eq!(engine.num_registered_airlines().await, 4);
}

#[tokio::test]
async fn registered_but_unfunded_airline_cannot_register_others() {
    let h = harness().await;
    let e = &h.engine;

    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    assert!(e.is_airline_funded(&id("a1")).await);

    e.register_airline(&id("a1"), &id("a2")).await.unwrap();
    assert!(e.is_airline_registered(&id("a2")).await);
    assert!(!e.is_airline_funded(&id("a2")).await);

    let err = e.register_airline(&id("a2"), &id("a3")).await.unwrap_err();
    assert_eq!(err, SuretyError::CallerNotFunded(id("a2")));
    assert!(!e.is_airline_registered(&id("a3")).await);
}

#[tokio::test]
async fn unregistered_caller_cannot_fund_or_register() {
    let h = harness().await;
    let e = &h.engine;

    assert_eq!(
        e.fund_airline(&id("x"), units(10)).await,
        Err(SuretyError::CallerNotRegistered(id("x")))
    );
    assert_eq!(
        e.register_airline(&id("x"), &id("y")).await,
        Err(SuretyError::CallerNotRegistered(id("x")))
    );
    assert_eq!(e.reserves().await.held_funds, 0);
}

#[tokio::test]
async fn fifth_airline_needs_consensus() {
    let h = harness().await;
    let e = &h.engine;
    four_funded_airlines(e).await;

    let err = e.register_airline(&id("a1"), &id("a5")).await.unwrap_err();
    assert_eq!(
        err,
        SuretyError::ConsensusRequired {
            candidate: id("a5"),
            votes: 0,
            required: 2,
        }
    );
    assert!(err.to_string().contains("multi-party consensus of 50% is required"));

    assert_eq!(e.vote(&id("a1"), &id("a5")).await.unwrap(), 1);
    assert!(matches!(
        e.register_airline(&id("a1"), &id("a5")).await,
        Err(SuretyError::ConsensusRequired { votes: 1, .. })
    ));

    assert_eq!(e.vote(&id("a2"), &id("a5")).await.unwrap(), 2);
    e.register_airline(&id("a1"), &id("a5")).await.unwrap();
    assert!(e.is_airline_registered(&id("a5")).await);
    assert_eq!(e.num_registered_airlines().await, 5);
    assert_eq!(e.num_votes(&id("a5")).await, 0);
}

#[tokio::test]
async fn duplicate_vote_is_not_counted() {
    let h = harness().await;
    let e = &h.engine;
    four_funded_airlines(e).await;

    e.vote(&id("a1"), &id("a5")).await.unwrap();
    assert_eq!(
        e.vote(&id("a1"), &id("a5")).await,
        Err(SuretyError::DuplicateVote {
            candidate: id("a5"),
            voter: id("a1"),
        })
    );
    assert_eq!(e.num_votes(&id("a5")).await, 1);
}

#[tokio::test]
async fn unfunded_airline_cannot_vote() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    e.register_airline(&id("a1"), &id("a2")).await.unwrap();

    assert_eq!(
        e.vote(&id("a2"), &id("a9")).await,
        Err(SuretyError::CallerNotFunded(id("a2")))
    );
    assert_eq!(e.num_votes(&id("a9")).await, 0);
}

#[tokio::test]
async fn departure_window_follows_clock() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();

    let too_soon = NOW + 24 * HOUR - 1;
    assert!(matches!(
        e.register_flight(&id("a1"), "ND1310", too_soon).await,
        Err(SuretyError::DepartureTooSoon { .. })
    ));

    let key = e
        .register_flight(&id("a1"), "ND1310", NOW + 24 * HOUR)
        .await
        .unwrap();
    assert_eq!(e.flight(&key).await.unwrap().status, FlightStatus::Unknown);

    h.clock.advance(HOUR);
    assert!(matches!(
        e.register_flight(&id("a1"), "ND1311", NOW + 24 * HOUR).await,
        Err(SuretyError::DepartureTooSoon { .. })
    ));
}

#[tokio::test]
async fn unfunded_airline_cannot_register_flights() {
    let h = harness().await;
    assert_eq!(
        h.engine
            .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
            .await,
        Err(SuretyError::CallerNotFunded(id("a1")))
    );
}

#[tokio::test]
async fn insurance_purchases_accumulate() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = e
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();

    let p1 = id("p1");
    assert_eq!(e.buy_insurance(&p1, &key, milli_units(500)).await.unwrap(), milli_units(500));
    assert_eq!(e.buy_insurance(&p1, &key, milli_units(300)).await.unwrap(), milli_units(800));
    assert_eq!(e.insurance_amount(&p1, &key).await, milli_units(800));
    assert_eq!(e.insurance_amount(&id("p2"), &key).await, 0);
    assert_eq!(e.reserves().await.held_funds, units(10) + milli_units(800));
}

#[tokio::test]
async fn pause_blocks_writes_until_resumed() {
    let h = harness().await;
    let e = &h.engine;

    assert_eq!(
        e.set_operating_status(&id("a1"), false).await,
        Err(SuretyError::Unauthorized(id("a1")))
    );

    e.set_operating_status(&id("owner"), false).await.unwrap();
    assert!(!e.is_operational().await);
    assert_eq!(
        e.fund_airline(&id("a1"), units(10)).await,
        Err(SuretyError::NotOperational)
    );
    assert!(!e.is_airline_funded(&id("a1")).await);
    assert_eq!(e.reserves().await.held_funds, 0);

    e.set_operating_status(&id("owner"), true).await.unwrap();
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    assert!(e.is_airline_funded(&id("a1")).await);
}

#[tokio::test]
async fn payouts_only_for_airline_fault() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    let gateway = e.config().oracle_gateway.clone();

    for (i, status) in [
        FlightStatus::OnTime,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ]
    .into_iter()
    .enumerate()
    {
        let key = e
            .register_flight(&id("a1"), &format!("NP{i}"), NOW + 48 * HOUR)
            .await
            .unwrap();
        e.buy_insurance(&id("p1"), &key, units(1)).await.unwrap();
        let resolution = e
            .resolve_flight_status(&gateway, &key, status.code())
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Applied {
                status,
                credited: Vec::new()
            }
        );
    }
    assert_eq!(e.passenger_balance(&id("p1")).await, 0);
    assert_eq!(
        e.pay(&id("p1")).await,
        Err(SuretyError::ZeroBalance(id("p1")))
    );
}

#[tokio::test]
async fn late_airline_credits_every_insuree_once() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = e
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();
    e.buy_insurance(&id("p1"), &key, milli_units(500)).await.unwrap();
    e.buy_insurance(&id("p2"), &key, units(1)).await.unwrap();

    let (_sub, mut credited_rx) = e.subscribe(Some(vec![EventKind::InsureeCredited])).await;
    let gateway = e.config().oracle_gateway.clone();
    for _ in 0..3 {
        e.resolve_flight_status(&gateway, &key, FlightStatus::LateAirline.code())
            .await
            .unwrap();
    }

    assert_eq!(e.passenger_balance(&id("p1")).await, milli_units(750));
    assert_eq!(e.passenger_balance(&id("p2")).await, milli_units(1_500));
    let mut credited = Vec::new();
    while let Ok(note) = credited_rx.try_recv() {
        credited.push(note.event);
    }
    assert_eq!(credited.len(), 2);

    let reserves = e.reserves().await;
    assert_eq!(reserves.outstanding, milli_units(2_250));
    assert!(reserves.outstanding <= reserves.held_funds);

    let receipt = e.pay(&id("p2")).await.unwrap();
    assert_eq!(receipt.amount, milli_units(1_500));
    assert_eq!(h.rail.total_sent_to(&id("p2")), milli_units(1_500));
    assert_eq!(e.passenger_balance(&id("p2")).await, 0);
    assert!(e.verify_journal().await);
}

#[tokio::test]
async fn credit_beyond_reserves_changes_nothing() {
    let clock = Arc::new(ManualClock::new(NOW));
    let config = SuretyConfig {
        payout_numerator: 3,
        payout_denominator: 1,
        ..SuretyConfig::default()
    };
    let engine = GovernanceEngine::bootstrap(
        id("owner"),
        id("a1"),
        id("app"),
        config,
        clock,
        Arc::new(InMemoryTransfer::new()),
    )
    .await
    .unwrap();
    engine.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = engine
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();
    engine.buy_insurance(&id("p1"), &key, units(6)).await.unwrap();

    let err = engine
        .resolve_flight_status(&id("owner"), &key, FlightStatus::LateAirline.code())
        .await
        .unwrap_err();
    assert!(matches!(err, SuretyError::InsufficientReserves { .. }));
    assert_eq!(engine.flight(&key).await.unwrap().status, FlightStatus::Unknown);
    assert_eq!(engine.passenger_balance(&id("p1")).await, 0);
}

#[tokio::test]
async fn failing_transfer_keeps_balance() {
    let h = harness().await;
    let e = &h.engine;
    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = e
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();
    e.buy_insurance(&id("p1"), &key, units(1)).await.unwrap();
    e.resolve_flight_status(&id("owner"), &key, 20).await.unwrap();

    h.rail.set_failing(true);
    assert!(matches!(
        e.pay(&id("p1")).await,
        Err(SuretyError::TransferFailed { .. })
    ));
    assert_eq!(e.passenger_balance(&id("p1")).await, milli_units(1_500));

    h.rail.set_failing(false);
    e.pay(&id("p1")).await.unwrap();
    assert_eq!(e.passenger_balance(&id("p1")).await, 0);
}

#[tokio::test]
async fn unknown_flight_resolution_is_ignored() {
    let h = harness().await;
    let key = FlightKey::new(id("a1"), "GHOST", NOW);
    let before = h.engine.journal(0).await.len();
    assert_eq!(
        h.engine
            .resolve_flight_status(&id("oracle-gateway"), &key, 20)
            .await,
        Ok(Resolution::Ignored(IgnoredReason::UnknownFlight))
    );
    assert_eq!(h.engine.journal(0).await.len(), before);
}

#[tokio::test]
async fn notifications_follow_commit_order() {
    let h = harness().await;
    let e = &h.engine;
    let (_sub, mut rx) = e.subscribe(None).await;

    e.fund_airline(&id("a1"), units(10)).await.unwrap();
    e.register_airline(&id("a1"), &id("a2")).await.unwrap();
    let _ = e.register_airline(&id("a2"), &id("a3")).await;
    let key = e
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();
    e.fetch_flight_status(&id("p1"), &key).await.unwrap();

    let mut kinds = Vec::new();
    let mut indexes = Vec::new();
    while let Ok(note) = rx.try_recv() {
        kinds.push(note.event.kind());
        indexes.push(note.index);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::AirlineFunded,
            EventKind::AirlineRegistered,
            EventKind::FlightRegistered,
            EventKind::OracleRequest,
        ]
    );
    assert!(indexes.windows(2).all(|w| w[1] == w[0] + 1));

    let journal = e.journal(0).await;
    assert!(matches!(
        journal[1].event,
        SuretyEvent::AirlineFunded { ref airline, .. } if *airline == id("a1")
    ));
    assert!(e.verify_journal().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_purchases_all_land() {
    let h = harness().await;
    let engine = Arc::new(h.engine);
    engine.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = engine
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .buy_insurance(&Identity::new("p1"), &key, milli_units(100))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.insurance_amount(&id("p1"), &key).await, milli_units(1_600));
    assert!(engine.verify_journal().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_withdrawals_pay_exactly_once() {
    let h = harness().await;
    let rail = h.rail.clone();
    let engine = Arc::new(h.engine);
    let p1 = id("p1");
    engine.fund_airline(&id("a1"), units(10)).await.unwrap();
    let key = engine
        .register_flight(&id("a1"), "ND1310", NOW + 48 * HOUR)
        .await
        .unwrap();
    engine.buy_insurance(&p1, &key, units(1)).await.unwrap();
    engine
        .resolve_flight_status(&id("owner"), &key, FlightStatus::LateAirline.code())
        .await
        .unwrap();
    assert_eq!(engine.passenger_balance(&p1).await, milli_units(1_500));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let engine = engine.clone();
        let p1 = p1.clone();
        tasks.push(tokio::spawn(async move { engine.pay(&p1).await }));
    }
    let mut paid = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => {
                assert_eq!(receipt.amount, milli_units(1_500));
                paid += 1;
            }
            Err(err) => assert_eq!(err, SuretyError::ZeroBalance(p1.clone())),
        }
    }

    assert_eq!(paid, 1);
    assert_eq!(rail.receipts().len(), 1);
    assert_eq!(rail.total_sent_to(&p1), milli_units(1_500));
    assert_eq!(engine.passenger_balance(&p1).await, 0);
    let reserves = engine.reserves().await;
    assert_eq!(reserves.outstanding, 0);
    assert_eq!(reserves.held_funds, units(11) - milli_units(1_500));
    assert!(engine.verify_journal().await);
}
