//! Integration tests for redemptions.
//!
//! A redemption is validated against a fresh derivation, appended to the
//! log, and then reflected in the ledger through a single-player refresh.

use bp_ledger_core::{
    audit::{AuditAction, AuditStatus, MemoryAuditSink},
    clock::FixedClock,
    engine::Ledger,
    error::LedgerError,
    redemption::RedemptionRequest,
    sheet::Cell,
};
use chrono::Duration;

fn build() -> (Ledger, MemoryAuditSink, FixedClock) {
    let audit = MemoryAuditSink::new();
    let clock = FixedClock::epoch();
    let ledger = Ledger::build_test()
        .expect("build_test failed")
        .with_audit(Box::new(audit.clone()))
        .with_clock(Box::new(clock.clone()));
    (ledger, audit, clock)
}

/// Ada with 10 attendance and 5 flag points, reconciled.
fn with_ada(ledger: &mut Ledger) {
    for (table, header, pts) in [
        ("Player Roster", None, 0),
        ("Attendance Missions", Some("Attendance Points"), 10),
        ("Flag Missions", Some("Flag Points"), 5),
    ] {
        let mut headers = vec!["Player Name".to_string()];
        let mut cells = vec![("Player Name".to_string(), Cell::from("Ada"))];
        if let Some(h) = header {
            headers.push(h.to_string());
            cells.push((h.to_string(), Cell::from(pts)));
        }
        ledger.store.create_table(table, &headers).unwrap();
        ledger.store.append_row(table, &cells).unwrap();
    }
    ledger.reconcile_all().unwrap();
}

#[test]
fn redemption_lowers_current_and_raises_redeemed() {
    let (mut ledger, audit, _) = build();
    with_ada(&mut ledger);

    let record = ledger
        .record_redemption(RedemptionRequest::new("Ada", 5, "T-shirt"))
        .unwrap();
    assert_eq!(record.player_name, "Ada");
    assert_eq!(record.amount, 5);
    assert!(!record.row_id.is_empty());

    let ada = ledger.get_breakdown("Ada").unwrap();
    assert_eq!(ada.historical, 15);
    assert_eq!(ada.redeemed, 5);
    assert_eq!(ada.current, 10);
    assert_eq!(ledger.total_redeemed("Ada").unwrap(), 5);

    assert_eq!(audit.count(AuditAction::Redemption, AuditStatus::Success), 1);
    assert_eq!(audit.count(AuditAction::ReconcileOne, AuditStatus::Success), 1);
}

#[test]
fn overspend_is_rejected_without_side_effects() {
    let (mut ledger, audit, _) = build();
    with_ada(&mut ledger);
    let before = ledger.get_breakdown("Ada").unwrap();

    match ledger.record_redemption(RedemptionRequest::new("Ada", 20, "Hoodie")) {
        Err(LedgerError::InsufficientBalance {
            name,
            requested,
            available,
        }) => {
            assert_eq!(name, "Ada");
            assert_eq!(requested, 20);
            assert_eq!(available, 15);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    assert_eq!(ledger.get_breakdown("Ada").unwrap(), before);
    assert!(ledger.redemption_history("Ada").unwrap().is_empty());
    assert_eq!(audit.count(AuditAction::Redemption, AuditStatus::Failed), 1);
}

#[test]
fn spending_the_whole_balance_is_allowed() {
    let (mut ledger, _, _) = build();
    with_ada(&mut ledger);

    ledger
        .record_redemption(RedemptionRequest::new("Ada", 15, "Trophy"))
        .unwrap();
    assert_eq!(ledger.get_balance("Ada").unwrap(), 0);

    let err = ledger
        .record_redemption(RedemptionRequest::new("Ada", 1, "Sticker"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { available: 0, .. }));
}

#[test]
fn non_positive_amounts_are_rejected() {
    let (mut ledger, _, _) = build();
    with_ada(&mut ledger);

    for amount in [0, -3] {
        let err = ledger
            .record_redemption(RedemptionRequest::new("Ada", amount, "Nothing"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        assert!(err.is_validation());
    }
    assert_eq!(ledger.total_redeemed("Ada").unwrap(), 0);
}

#[test]
fn guard_uses_sources_not_a_stale_ledger_row() {
    let (mut ledger, _, _) = build();
    with_ada(&mut ledger);

    // New points land in a source table; the ledger row is not refreshed.
    ledger
        .store
        .append_row(
            "Attendance Missions",
            &[
                ("Player Name".into(), Cell::from("Ada")),
                ("Attendance Points".into(), Cell::from(10)),
            ],
        )
        .unwrap();
    assert_eq!(ledger.get_balance("Ada").unwrap(), 15);

    ledger
        .record_redemption(RedemptionRequest::new("Ada", 20, "Hoodie"))
        .unwrap();
    assert_eq!(ledger.get_balance("Ada").unwrap(), 5);
}

#[test]
fn redeemed_equals_sum_of_log() {
    let (mut ledger, _, clock) = build();
    with_ada(&mut ledger);

    for amount in [2, 3, 4] {
        clock.advance(Duration::minutes(5));
        ledger
            .record_redemption(RedemptionRequest::new("Ada", amount, "Snack"))
            .unwrap();
    }

    assert_eq!(ledger.total_redeemed("Ada").unwrap(), 9);
    assert_eq!(ledger.get_breakdown("Ada").unwrap().redeemed, 9);

    // A full pass agrees with the incremental refreshes.
    assert_eq!(ledger.reconcile_all().unwrap().touched(), 0);
}

#[test]
fn history_is_most_recent_first() {
    let (mut ledger, _, clock) = build();
    with_ada(&mut ledger);

    for reason in ["first", "second", "third"] {
        clock.advance(Duration::hours(1));
        ledger
            .record_redemption(RedemptionRequest::new("Ada", 1, reason))
            .unwrap();
    }

    let reasons: Vec<String> = ledger
        .redemption_history("Ada")
        .unwrap()
        .into_iter()
        .map(|r| r.reason)
        .collect();
    assert_eq!(reasons, vec!["third", "second", "first"]);

    let recent = ledger.recent_redemptions(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].reason, "third");
}

#[test]
fn optional_fields_are_stored() {
    let (mut ledger, _, _) = build();
    with_ada(&mut ledger);

    let mut request = RedemptionRequest::new("Ada", 3, "Dice bag");
    request.category = "merch".into();
    request.event_id = "game-night-12".into();
    request.staff = "Lin".into();
    ledger.record_redemption(request).unwrap();

    let history = ledger.redemption_history("Ada").unwrap();
    assert_eq!(history[0].category, "merch");
    assert_eq!(history[0].event_id, "game-night-12");
    assert_eq!(history[0].staff, "Lin");
    assert!(history[0].timestamp.is_some());
}

#[test]
fn hand_entered_log_rows_count_towards_redeemed() {
    let (mut ledger, _, _) = build();
    with_ada(&mut ledger);
    ledger
        .store
        .create_table("BP_Redemptions", &["Name".to_string(), "Amount".to_string()])
        .unwrap();
    ledger
        .store
        .append_row(
            "BP_Redemptions",
            &[("Name".into(), Cell::from("Ada")), ("Amount".into(), Cell::from(4))],
        )
        .unwrap();

    ledger.reconcile_one("Ada").unwrap();
    assert_eq!(ledger.get_balance("Ada").unwrap(), 11);

    let history = ledger.redemption_history("Ada").unwrap();
    assert_eq!(history[0].row_id, "row-1");
}
