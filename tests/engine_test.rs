use async_trait::async_trait;
use idsstarly::config::Config;
use idsstarly::engine::IntrusionDetectionEngine;
use idsstarly::log_mode::LogMode;
use idsstarly::logger::Logger;
use idsstarly::models::{LogRecord, PacketRecord, PacketType};
use idsstarly::store::{AlertStore, BlacklistOutcome, SqliteStore, StoreError};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

fn test_config() -> Config {
    let mut config = Config::default();
    config.window_secs = 60;
    config.retention_secs = 120;
    config.limite_icmp = 10;
    config.limite_syn = 20;
    config.escalation_threshold = 1;
    config.escalation_window_secs = 60;
    config.persist_retry_attempts = 3;
    config.persist_retry_delay_ms = 5;
    config.analyzer_threads = 1;
    config.stats_interval_secs = 0;
    config
}

fn make_engine(config: &Config) -> (Arc<IntrusionDetectionEngine>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let journal = Arc::new(Logger::new_with_mode(
        String::new(),
        LogMode::SystemdJournal,
    ));
    let engine = Arc::new(IntrusionDetectionEngine::new(config, store.clone(), journal));
    (engine, store)
}

fn icmp(src: IpAddr, timestamp: SystemTime) -> PacketRecord {
    PacketRecord {
        timestamp,
        src_ip: src,
        src_port: None,
        dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst_port: None,
        protocol: PacketType::Icmp,
        tcp_flags: None,
        icmp_type: Some(8),
    }
}

fn syn(src: IpAddr, timestamp: SystemTime) -> PacketRecord {
    PacketRecord {
        timestamp,
        src_ip: src,
        src_port: Some(42000),
        dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst_port: Some(443),
        protocol: PacketType::Tcp,
        tcp_flags: Some(vec!["SYN".to_string()]),
        icmp_type: None,
    }
}

fn attacker() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, 66))
}

#[tokio::test]
async fn test_icmp_flood_alert_and_blacklist() {
    let config = test_config();
    let (engine, store) = make_engine(&config);
    let t0 = SystemTime::now();

    // 11 paquets ICMP dans la même fenêtre, limite à 10
    for i in 0..11u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(i * 100)));
    }
    engine.flush().await;

    // Une ligne de log par paquet, la dernière seule en ICMP Flood
    let rows = store.all_logs().unwrap();
    assert_eq!(rows.len(), 11);
    for row in &rows[..10] {
        assert_eq!(row.label, "Normal");
    }
    assert_eq!(rows[10].label, "ICMP Flood");
    assert_eq!(rows[10].src_ip, "203.0.113.66");
    assert_eq!(rows[10].src_port, "N/A");
    assert!(rows[10].descricao.contains("11 paquets ICMP"));

    // Une seule entrée en liste noire pour l'IP fautive
    let blacklist = store.blacklist_rows(10).unwrap();
    assert_eq!(blacklist.len(), 1);
    assert_eq!(blacklist[0].ip, "203.0.113.66");
    assert!(blacklist[0].descricao.contains("ICMP Flood"));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.icmp_flood_verdicts, 1);
    assert_eq!(snapshot.normal_verdicts, 10);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_syn_below_limit_stays_normal() {
    let config = test_config();
    let (engine, store) = make_engine(&config);
    let t0 = SystemTime::now();

    // 15 SYN avec une limite à 20: aucun dépassement
    for i in 0..15u64 {
        engine.process_packet(&syn(attacker(), t0 + Duration::from_millis(i * 100)));
    }
    engine.flush().await;

    let rows = store.all_logs().unwrap();
    assert_eq!(rows.len(), 15);
    assert!(rows.iter().all(|row| row.label == "Normal"));
    assert_eq!(store.count_blacklist().unwrap(), 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_window_boundary_fresh_count() {
    let config = test_config();
    let (engine, store) = make_engine(&config);
    let t0 = SystemTime::now();

    // 10 paquets dans la première fenêtre: la limite est atteinte sans
    // être dépassée
    for i in 0..10u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_secs(i)));
    }
    // Un paquet exactement à la borne repart sur une fenêtre neuve
    engine.process_packet(&icmp(attacker(), t0 + Duration::from_secs(60)));
    engine.flush().await;

    assert_eq!(engine.snapshot().icmp_flood_verdicts, 0);
    let rows = store.all_logs().unwrap();
    assert_eq!(rows.len(), 11);
    assert!(rows.iter().all(|row| row.label == "Normal"));

    // 10 paquets de plus dans la seconde fenêtre: 11 au total, dépassement
    for i in 0..10u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_secs(61 + i)));
    }
    engine.flush().await;
    assert_eq!(engine.snapshot().icmp_flood_verdicts, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_malformed_packet_dropped() {
    let config = test_config();
    let (engine, store) = make_engine(&config);

    // Paquet TCP sans drapeaux ni ports: écarté avant analyse
    let malformed = PacketRecord {
        timestamp: SystemTime::now(),
        src_ip: attacker(),
        src_port: None,
        dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst_port: None,
        protocol: PacketType::Tcp,
        tcp_flags: None,
        icmp_type: None,
    };
    engine.process_packet(&malformed);
    engine.flush().await;

    assert_eq!(store.count_logs().unwrap(), 0);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.malformed_packets, 1);
    assert_eq!(snapshot.tracked_ips, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_setters_reject_out_of_range() {
    let config = test_config();
    let (engine, _store) = make_engine(&config);

    assert_eq!(engine.get_limite_icmp(), 10);
    assert_eq!(engine.get_limite_syn(), 20);

    // Valeurs hors de l'intervalle: refusées, limites inchangées
    assert!(engine.set_limite_icmp(9).is_err());
    assert!(engine.set_limite_icmp(1001).is_err());
    assert!(engine.set_limite_syn(0).is_err());
    assert_eq!(engine.get_limite_icmp(), 10);
    assert_eq!(engine.get_limite_syn(), 20);

    // Les bornes elles-mêmes passent
    engine.set_limite_icmp(1000).unwrap();
    engine.set_limite_syn(10).unwrap();
    assert_eq!(engine.get_limite_icmp(), 1000);
    assert_eq!(engine.get_limite_syn(), 10);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_clear_during_live_traffic() {
    let mut config = test_config();
    config.limite_icmp = 60;
    let (engine, store) = make_engine(&config);
    let t0 = SystemTime::now();

    // 50 paquets avant la remise à zéro, tous sous la limite
    for i in 0..50u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(i * 100)));
    }

    // La remise à zéro s'intercale dans la file après les 50 premiers
    engine.clear_history().await.unwrap();

    // 30 paquets de plus: les compteurs de flux ne sont pas remis à zéro,
    // l'attaque en cours reste visible (comptes 51 à 80)
    for i in 50..80u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(i * 100)));
    }
    engine.flush().await;

    // Seules les 30 lignes postérieures subsistent, renumérotées depuis 1
    let rows = store.all_logs().unwrap();
    assert_eq!(rows.len(), 30);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[29].id, 30);
    // Comptes 51 à 60: normaux; comptes 61 à 80: dépassement
    for row in &rows[..10] {
        assert_eq!(row.label, "Normal");
    }
    for row in &rows[10..] {
        assert_eq!(row.label, "ICMP Flood");
    }

    let blacklist = store.blacklist_rows(10).unwrap();
    assert_eq!(blacklist.len(), 1);
    assert_eq!(blacklist[0].id, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_escalation_threshold_delays_blacklist() {
    let mut config = test_config();
    config.escalation_threshold = 2;
    let (engine, store) = make_engine(&config);
    let t0 = SystemTime::now();

    // 11 paquets: un seul verdict d'intrusion, sous le seuil d'escalade
    for i in 0..11u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(i * 100)));
    }
    engine.flush().await;
    assert_eq!(store.count_blacklist().unwrap(), 0);

    // Le deuxième verdict d'intrusion déclenche l'inscription
    engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(1100)));
    engine.flush().await;
    assert_eq!(store.count_blacklist().unwrap(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_feed() {
    let config = test_config();
    let (engine, store) = make_engine(&config);
    let (feed_tx, feed_rx) = mpsc::channel(256);
    engine.clone().start(feed_rx).await;

    // 100 paquets d'IPs distinctes injectés par le canal d'alimentation
    let t0 = SystemTime::now();
    for i in 0..100u32 {
        let src = IpAddr::V4(Ipv4Addr::new(10, 1, (i / 250) as u8, (i % 250 + 1) as u8));
        feed_tx.send(icmp(src, t0)).await.unwrap();
    }
    drop(feed_tx);

    // L'arrêt n'acquitte qu'une fois le canal épuisé et la base écrite
    engine.shutdown().await;

    assert_eq!(store.count_logs().unwrap(), 100);
    assert_eq!(engine.snapshot().packets_processed, 100);
}

#[tokio::test]
async fn test_purge_inactive_flows() {
    let config = test_config();
    let (engine, _store) = make_engine(&config);
    let t0 = SystemTime::now();

    engine.process_packet(&icmp(attacker(), t0));
    assert_eq!(engine.snapshot().tracked_ips, 1);

    // Au-delà de la rétention de 120 s, l'entrée disparaît
    engine.run_purge(t0 + Duration::from_secs(121));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.tracked_ips, 0);
    assert_eq!(snapshot.purged_entries, 1);
    assert!(snapshot.purge_runs >= 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_file_mode_alert_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alertes.log");
    let config = test_config();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let journal = Arc::new(Logger::new(path.to_string_lossy().to_string()));
    let engine = Arc::new(IntrusionDetectionEngine::new(&config, store.clone(), journal));

    let t0 = SystemTime::now();
    for i in 0..11u64 {
        engine.process_packet(&icmp(attacker(), t0 + Duration::from_millis(i * 100)));
    }
    engine.flush().await;

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[ALERT]"));
    assert!(contents.contains("[BLACKLIST]"));
    assert!(contents.contains("203.0.113.66"));

    engine.shutdown().await;
}

// Persistance qui échoue systématiquement, pour observer les reprises
struct FailingStore {
    insert_calls: AtomicU32,
    upsert_calls: AtomicU32,
}

fn panne() -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "panne simulée",
    ))
}

#[async_trait]
impl AlertStore for FailingStore {
    async fn insert_log(&self, _record: &LogRecord) -> Result<i64, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        Err(panne())
    }

    async fn upsert_blacklist(
        &self,
        _timestamp: SystemTime,
        _ip: IpAddr,
        _descricao: &str,
    ) -> Result<BlacklistOutcome, StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Err(panne())
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_retry_then_drop() {
    let config = test_config();
    let store = Arc::new(FailingStore {
        insert_calls: AtomicU32::new(0),
        upsert_calls: AtomicU32::new(0),
    });
    let journal = Arc::new(Logger::new_with_mode(
        String::new(),
        LogMode::SystemdJournal,
    ));
    let engine = Arc::new(IntrusionDetectionEngine::new(&config, store.clone(), journal));

    engine.process_packet(&icmp(attacker(), SystemTime::now()));
    engine.flush().await;

    // 3 tentatives d'écriture, puis abandon signalé
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 0);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.persistence_retries, 2);
    assert_eq!(snapshot.alerts_dropped, 1);
    assert_eq!(snapshot.alerts_persisted, 0);

    engine.shutdown().await;
}

// Persistance qui échoue un nombre donné de fois avant de fonctionner
struct FlakyStore {
    inner: SqliteStore,
    failures_left: AtomicU32,
}

#[async_trait]
impl AlertStore for FlakyStore {
    async fn insert_log(&self, record: &LogRecord) -> Result<i64, StoreError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(panne());
        }
        self.inner.insert_log(record).await
    }

    async fn upsert_blacklist(
        &self,
        timestamp: SystemTime,
        ip: IpAddr,
        descricao: &str,
    ) -> Result<BlacklistOutcome, StoreError> {
        self.inner.upsert_blacklist(timestamp, ip, descricao).await
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        self.inner.clear_history().await
    }
}

#[tokio::test]
async fn test_recovery_after_transient_failures() {
    let config = test_config();
    let store = Arc::new(FlakyStore {
        inner: SqliteStore::open_in_memory().unwrap(),
        failures_left: AtomicU32::new(2),
    });
    let journal = Arc::new(Logger::new_with_mode(
        String::new(),
        LogMode::SystemdJournal,
    ));
    let engine = Arc::new(IntrusionDetectionEngine::new(&config, store.clone(), journal));

    engine.process_packet(&icmp(attacker(), SystemTime::now()));
    engine.flush().await;

    // Deux reprises puis écriture réussie à la troisième tentative
    assert_eq!(store.inner.count_logs().unwrap(), 1);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.persistence_retries, 2);
    assert_eq!(snapshot.alerts_persisted, 1);
    assert_eq!(snapshot.alerts_dropped, 0);

    engine.shutdown().await;
}
