//! Integration tests for schema resolution against hand-maintained tables.

use bp_ledger_core::{
    audit::{AuditAction, AuditStatus, MemoryAuditSink},
    engine::Ledger,
    schema::{LEDGER_FIELDS, REDEMPTION_FIELDS},
    sheet::Cell,
};

fn build() -> (Ledger, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let ledger = Ledger::build_test()
        .expect("build_test failed")
        .with_audit(Box::new(audit.clone()));
    (ledger, audit)
}

fn table(ledger: &Ledger, name: &str, headers: &[&str], row: Vec<Cell>) {
    let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    ledger.store.create_table(name, &headers).unwrap();
    let cells: Vec<(String, Cell)> = headers.into_iter().zip(row).collect();
    ledger.store.append_row(name, &cells).unwrap();
}

#[test]
fn ensure_schema_creates_canonical_tables() {
    let (mut ledger, audit) = build();
    ledger.ensure_schema().unwrap();

    let headers = ledger.store.table_headers("BP_Total").unwrap();
    assert_eq!(headers.len(), LEDGER_FIELDS.len());
    assert_eq!(headers[0], "Player Name");
    assert!(headers.contains(&"BP_Current".to_string()));
    assert!(headers.contains(&"BP_Overflow".to_string()));

    let headers = ledger.store.table_headers("BP_Redemptions").unwrap();
    assert_eq!(headers.len(), REDEMPTION_FIELDS.len());
    assert_eq!(audit.count(AuditAction::EnsureSchema, AuditStatus::Success), 1);
}

#[test]
fn ensure_schema_is_idempotent() {
    let (mut ledger, _) = build();
    ledger.ensure_schema().unwrap();
    let first = ledger.store.table_headers("BP_Total").unwrap();
    ledger.ensure_schema().unwrap();
    assert_eq!(ledger.store.table_headers("BP_Total").unwrap(), first);
}

#[test]
fn legacy_ledger_headers_are_kept_and_completed() {
    let (mut ledger, _) = build();
    table(
        &ledger,
        "BP_Total",
        &["Name", "Team", "Current BP", "Historical BP"],
        vec![Cell::from("Ada"), Cell::from("Red"), Cell::from(0), Cell::from(0)],
    );
    table(&ledger, "Player Roster", &["Member"], vec![Cell::from("Ada")]);
    table(
        &ledger,
        "Attendance Missions",
        &["Participant", "Attendance BP"],
        vec![Cell::from("Ada"), Cell::from(12)],
    );

    ledger.reconcile_all().unwrap();

    let headers = ledger.store.table_headers("BP_Total").unwrap();
    assert_eq!(&headers[..4], &["Name", "Team", "Current BP", "Historical BP"]);
    assert!(!headers.contains(&"BP_Current".to_string()));
    assert!(headers.contains(&"BP_Redeemed".to_string()));

    let sheet = ledger.store.read_table("BP_Total").unwrap();
    assert_eq!(sheet.rows.len(), 1);
    assert_eq!(sheet.rows[0].cell(1), &Cell::text("Red"));
    assert_eq!(sheet.rows[0].cell(2).as_points(), 12);
    assert_eq!(ledger.get_balance("Ada").unwrap(), 12);
}

#[test]
fn synonym_headers_aggregate_like_canonical_ones() {
    let (mut canonical, _) = build();
    table(&canonical, "Player Roster", &["Player Name"], vec![Cell::from("Ada")]);
    table(
        &canonical,
        "Flag Missions",
        &["Player Name", "Flag Mission Points"],
        vec![Cell::from("Ada"), Cell::from(7)],
    );

    let (mut legacy, _) = build();
    table(&legacy, "Player Roster", &["Name"], vec![Cell::from("Ada")]);
    table(
        &legacy,
        "Flag Missions",
        &["player_name", "flag points"],
        vec![Cell::from("Ada"), Cell::from(7)],
    );

    canonical.reconcile_all().unwrap();
    legacy.reconcile_all().unwrap();

    let a = canonical.get_breakdown("Ada").unwrap();
    let b = legacy.get_breakdown("Ada").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.flag, 7);
}

#[test]
fn duplicate_ledger_rows_use_the_first() {
    let (mut ledger, _) = build();
    table(&ledger, "Player Roster", &["Player Name"], vec![Cell::from("Ada")]);
    table(
        &ledger,
        "Attendance Missions",
        &["Player Name", "Attendance Points"],
        vec![Cell::from("Ada"), Cell::from(4)],
    );
    ledger.ensure_schema().unwrap();
    for _ in 0..2 {
        ledger
            .store
            .append_row("BP_Total", &[("Player Name".into(), Cell::from("Ada"))])
            .unwrap();
    }

    let summary = ledger.reconcile_all().unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.inserted, 0);

    let sheet = ledger.store.read_table("BP_Total").unwrap();
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(ledger.get_balance("Ada").unwrap(), 4);
}

#[test]
fn file_backed_ledger_persists_audit_rows() {
    let mut ledger = Ledger::open(
        "file:schema_audit_test?mode=memory&cache=shared",
        Default::default(),
    )
    .unwrap();
    ledger.ensure_schema().unwrap();
    assert_eq!(ledger.store.audit_count("ENSURE_SCHEMA").unwrap(), 1);

    let rows = ledger.store.recent_audit(5).unwrap();
    assert_eq!(rows[0].status, "SUCCESS");
}

#[test]
fn plain_memory_ledger_audits_into_its_own_database() {
    let mut ledger = Ledger::open(":memory:", Default::default()).unwrap();
    ledger.ensure_schema().unwrap();
    assert_eq!(ledger.store.audit_count("ENSURE_SCHEMA").unwrap(), 1);

    // Two plain in-memory ledgers never share tables.
    let other = Ledger::open(":memory:", Default::default()).unwrap();
    assert_eq!(other.store.audit_count("ENSURE_SCHEMA").unwrap(), 0);
}
