use idsstarly::models::{LogRecord, VerdictLabel};
use idsstarly::store::{AlertStore, SqliteStore};
use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

fn record(label: VerdictLabel, descricao: &str) -> LogRecord {
    LogRecord {
        timestamp: SystemTime::now(),
        src_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        src_port: None,
        dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        dst_port: None,
        label,
        descricao: descricao.to_string(),
    }
}

#[tokio::test]
async fn test_sequential_ids() {
    let store = SqliteStore::open_in_memory().unwrap();

    let first = store
        .insert_log(&record(VerdictLabel::Normal, "Trafic ICMP normal"))
        .await
        .unwrap();
    let second = store
        .insert_log(&record(VerdictLabel::IcmpFlood, "Attaque ICMP Flood"))
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    let rows = store.all_logs().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[1].id, 2);
    assert_eq!(rows[0].label, "Normal");
    assert_eq!(rows[1].label, "ICMP Flood");
}

#[tokio::test]
async fn test_missing_ports_stored_as_na() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
        .insert_log(&record(VerdictLabel::Normal, "Trafic ICMP normal"))
        .await
        .unwrap();

    let rows = store.recent_logs(1).unwrap();
    assert_eq!(rows[0].src_port, "N/A");
    assert_eq!(rows[0].dst_port, "N/A");
    assert_eq!(rows[0].src_ip, "203.0.113.7");
}

#[tokio::test]
async fn test_blacklist_dedup_per_ip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

    let first = store
        .upsert_blacklist(SystemTime::now(), ip, "Attaque ICMP Flood")
        .await
        .unwrap();
    assert!(first.is_insertion());
    assert_eq!(first.row_id(), 1);

    // La même IP rafraîchit la ligne existante au lieu d'en créer une autre
    let second = store
        .upsert_blacklist(SystemTime::now(), ip, "Attaque SYN Flood")
        .await
        .unwrap();
    assert!(!second.is_insertion());
    assert_eq!(second.row_id(), 1);
    assert_eq!(store.count_blacklist().unwrap(), 1);

    let rows = store.blacklist_rows(10).unwrap();
    assert!(rows[0].descricao.contains("SYN Flood"));

    // Une IP différente obtient sa propre ligne
    let other = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 8));
    let third = store
        .upsert_blacklist(SystemTime::now(), other, "Attaque ICMP Flood")
        .await
        .unwrap();
    assert!(third.is_insertion());
    assert_eq!(third.row_id(), 2);
}

#[tokio::test]
async fn test_clear_resets_tables_and_ids() {
    let store = SqliteStore::open_in_memory().unwrap();
    let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

    for _ in 0..3 {
        store
            .insert_log(&record(VerdictLabel::Normal, "Trafic ICMP normal"))
            .await
            .unwrap();
    }
    store
        .upsert_blacklist(SystemTime::now(), ip, "Attaque ICMP Flood")
        .await
        .unwrap();

    store.clear_history().await.unwrap();
    assert_eq!(store.count_logs().unwrap(), 0);
    assert_eq!(store.count_blacklist().unwrap(), 0);

    // La numérotation reprend à 1 après la purge
    let id = store
        .insert_log(&record(VerdictLabel::Normal, "Trafic ICMP normal"))
        .await
        .unwrap();
    assert_eq!(id, 1);
    let outcome = store
        .upsert_blacklist(SystemTime::now(), ip, "Attaque ICMP Flood")
        .await
        .unwrap();
    assert_eq!(outcome.row_id(), 1);
}

#[tokio::test]
async fn test_persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idsstarly.db");

    {
        let store = SqliteStore::new(&path).unwrap();
        store
            .insert_log(&record(VerdictLabel::IcmpFlood, "Attaque ICMP Flood"))
            .await
            .unwrap();
    }

    // Les données survivent à la fermeture de la connexion
    let reopened = SqliteStore::new(&path).unwrap();
    assert_eq!(reopened.count_logs().unwrap(), 1);
    let rows = reopened.all_logs().unwrap();
    assert_eq!(rows[0].label, "ICMP Flood");
}
