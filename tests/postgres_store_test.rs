//! Postgres store against a live database
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use atlas_console::config::DatabaseConfig;
use atlas_console::dns::record::{NewZone, RecordCandidate, RecordFilter, RecordKey, RecordType, TenantId};
use atlas_console::store::{AuditLogEntry, AuditOperation, PgStore, Store};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let config = DatabaseConfig {
        url: Some(url),
        ..Default::default()
    };
    let store = PgStore::connect(&config).await.unwrap();
    store.migrate().await.unwrap();
    store
}

fn unique_tenant(prefix: &str) -> TenantId {
    TenantId::new(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

#[tokio::test]
#[ignore]
async fn test_row_level_tenant_isolation() {
    let store = store().await;
    let a = unique_tenant("a");
    let b = unique_tenant("b");
    let zone = NewZone::new("example.com", "ns1.example.com", "admin@example.com");

    store.create_zone(&a, &zone, "test").await.unwrap();
    store.create_zone(&b, &zone, "test").await.unwrap();
    store
        .create_record(&a, "example.com", &RecordCandidate::new("www", RecordType::A, "93.184.216.34"), "test")
        .await
        .unwrap();

    let seen_by_b = store.get_records(&b, "example.com", &RecordFilter::default()).await.unwrap();
    assert!(seen_by_b.is_empty());
    let seen_by_a = store.get_records(&a, "example.com", &RecordFilter::default()).await.unwrap();
    assert_eq!(seen_by_a.len(), 1);

    store.delete_zone(&a, "example.com").await.unwrap();
    store.delete_zone(&b, "example.com").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_soft_delete_and_serial_bump() {
    let store = store().await;
    let tenant = unique_tenant("serial");
    let zone = store
        .create_zone(&tenant, &NewZone::new("example.org", "ns1.example.org", "admin@example.org"), "test")
        .await
        .unwrap();

    store
        .create_record(&tenant, "example.org", &RecordCandidate::new("www", RecordType::A, "93.184.216.34"), "test")
        .await
        .unwrap();
    let deleted = store
        .delete_record(&tenant, "example.org", &RecordKey::new("www", RecordType::A))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(store
        .get_records(&tenant, "example.org", &RecordFilter::default())
        .await
        .unwrap()
        .is_empty());

    let after = store.get_zone(&tenant, "example.org").await.unwrap();
    assert!(after.serial > zone.serial);

    store
        .append_audit(&AuditLogEntry::new(&tenant, "test", AuditOperation::RecordDeleted, "record"))
        .await
        .unwrap();
    assert_eq!(store.list_audit(&tenant, 10).await.unwrap().len(), 1);

    store.delete_zone(&tenant, "example.org").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_update_into_existing_record_conflicts() {
    let store = store().await;
    let tenant = unique_tenant("dup");
    store
        .create_zone(&tenant, &NewZone::new("example.net", "ns1.example.net", "admin@example.net"), "test")
        .await
        .unwrap();
    for value in ["93.184.216.34", "93.184.216.35"] {
        store
            .create_record(&tenant, "example.net", &RecordCandidate::new("www", RecordType::A, value), "test")
            .await
            .unwrap();
    }

    let key = RecordKey::new("www", RecordType::A).with_value("93.184.216.35");
    let update = atlas_console::dns::record::RecordUpdate {
        value: Some("93.184.216.34".into()),
        ..Default::default()
    };
    let err = store.update_record(&tenant, "example.net", &key, &update).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let records = store.get_records(&tenant, "example.net", &RecordFilter::default()).await.unwrap();
    assert_eq!(records.len(), 2);

    store.delete_zone(&tenant, "example.net").await.unwrap();
}
