//! Moteur de détection d'intrusions
//!
//! Le moteur relie la source de paquets aux trois étages de traitement:
//! suivi des compteurs par IP, verdict selon les seuils, persistance par
//! le collecteur d'alertes. Il porte aussi les tâches périodiques (purge
//! des flux inactifs, résumé des statistiques) et l'arrêt ordonné.

use crate::config::Config;
use crate::logger::Logger;
use crate::models::{AlertEvent, LogRecord, PacketRecord, VerdictLabel};
use crate::policy::{ThresholdError, ThresholdPolicy};
use crate::sink::{AlertSink, SinkSettings};
use crate::stats::{CountersSnapshot, EngineCounters};
use crate::store::{AlertStore, StoreError};
use crate::tracker::FlowStatTracker;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;

pub struct IntrusionDetectionEngine {
    tracker: FlowStatTracker,
    policy: ThresholdPolicy,
    sink: AlertSink,
    counters: Arc<EngineCounters>,
    shutdown_tx: watch::Sender<bool>,
    tasks: TokioMutex<Vec<JoinHandle<()>>>,
    purge_interval: Duration,
    /// Période du résumé de statistiques, 0 pour le désactiver
    stats_interval: Duration,
    analyzer_threads: usize,
}

impl IntrusionDetectionEngine {
    pub fn new(config: &Config, store: Arc<dyn AlertStore>, journal: Arc<Logger>) -> Self {
        let counters = Arc::new(EngineCounters::new());
        let tracker = FlowStatTracker::new(
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.retention_secs),
            config.max_tracked_ips,
        );
        let policy = ThresholdPolicy::new(config.limite_icmp, config.limite_syn, config.window_secs);
        let sink = AlertSink::spawn(
            store,
            journal,
            counters.clone(),
            SinkSettings::from_config(config),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            tracker,
            policy,
            sink,
            counters,
            shutdown_tx,
            tasks: TokioMutex::new(Vec::new()),
            purge_interval: Duration::from_secs(config.purge_interval_secs.max(1)),
            stats_interval: Duration::from_secs(config.stats_interval_secs),
            analyzer_threads: config.analyzer_threads.max(1),
        }
    }

    /// Démarre les tâches d'analyse et les tâches périodiques. Les paquets
    /// arrivent par `feed`; la fermeture de ce canal épuise puis termine
    /// les tâches d'analyse.
    pub async fn start(self: Arc<Self>, feed: mpsc::Receiver<PacketRecord>) {
        let mut tasks = self.tasks.lock().await;
        let feed = Arc::new(TokioMutex::new(feed));

        // Tâches d'analyse: elles se partagent le canal de paquets et
        // s'arrêtent quand il est fermé et vidé
        for worker_id in 0..self.analyzer_threads {
            let engine = Arc::clone(&self);
            let feed = Arc::clone(&feed);
            tasks.push(tokio::spawn(async move {
                loop {
                    let packet = {
                        let mut feed = feed.lock().await;
                        feed.recv().await
                    };
                    match packet {
                        Some(packet) => engine.process_packet(&packet),
                        None => break,
                    }
                }
                debug!("Tâche d'analyse {} terminée", worker_id);
            }));
        }
        info!("{} tâches d'analyse démarrées", self.analyzer_threads);

        // Purge périodique des flux inactifs, indépendante du trafic
        {
            let engine = Arc::clone(&self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(engine.purge_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            engine.run_purge(SystemTime::now());
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        // Résumé périodique des statistiques
        if !self.stats_interval.is_zero() {
            let engine = Arc::clone(&self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(engine.stats_interval);
                // Le premier déclenchement est immédiat, le passer
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            engine.snapshot().log_summary();
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Analyse un paquet: mise à jour des compteurs de son IP source,
    /// verdict, puis soumission au collecteur. Une ligne de log est émise
    /// pour chaque paquet bien formé, trafic normal compris.
    pub fn process_packet(&self, packet: &PacketRecord) {
        self.counters.packets_processed.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = packet.validate() {
            self.counters.malformed_packets.fetch_add(1, Ordering::Relaxed);
            debug!("Paquet de {} écarté: {}", packet.src_ip, err);
            return;
        }

        let flow = self.tracker.update(packet);
        let verdict = self.policy.evaluate(packet, &flow);

        match verdict.label {
            VerdictLabel::Normal => {
                self.counters.normal_verdicts.fetch_add(1, Ordering::Relaxed);
            }
            VerdictLabel::IcmpFlood => {
                self.counters.icmp_flood_verdicts.fetch_add(1, Ordering::Relaxed);
                warn!("{}", verdict.descricao);
            }
            VerdictLabel::SynFlood => {
                self.counters.syn_flood_verdicts.fetch_add(1, Ordering::Relaxed);
                warn!("{}", verdict.descricao);
            }
        }

        let severity = verdict.severity;
        let record = LogRecord::new(packet, &verdict);
        self.sink.submit(AlertEvent { record, severity });
    }

    /// Purge les flux inactifs et propage l'instant au collecteur pour le
    /// nettoyage de ses compteurs d'escalade.
    pub fn run_purge(&self, now: SystemTime) {
        let removed = self.tracker.purge_expired(now);
        self.counters.purge_runs.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            self.counters
                .purged_entries
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Purge: {} flux inactifs retirés", removed);
        }
        self.sink.sweep(now);
    }

    pub fn get_limite_icmp(&self) -> u32 {
        self.policy.limite_icmp()
    }

    pub fn get_limite_syn(&self) -> u32 {
        self.policy.limite_syn()
    }

    pub fn set_limite_icmp(&self, value: u32) -> Result<(), ThresholdError> {
        self.policy.set_limite_icmp(value)
    }

    pub fn set_limite_syn(&self, value: u32) -> Result<(), ThresholdError> {
        self.policy.set_limite_syn(value)
    }

    /// Vide les tables `logs` et `blacklist`. Les compteurs de flux en
    /// mémoire ne sont pas touchés: une attaque en cours reste détectée.
    pub async fn clear_history(&self) -> Result<(), StoreError> {
        self.sink.clear().await
    }

    /// Attend que tous les verdicts déjà soumis soient persistés
    pub async fn flush(&self) {
        self.sink.flush().await;
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        self.counters.snapshot(self.tracker.len())
    }

    /// Récepteur du signal d'arrêt, à distribuer aux sources de paquets
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Arrêt ordonné: signal aux sources, épuisement du canal de paquets
    /// par les tâches d'analyse, puis drainage complet du collecteur.
    /// Au retour, tout paquet accepté avant l'appel a sa ligne en base.
    pub async fn shutdown(&self) {
        info!("Arrêt du moteur de détection en cours...");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        join_all(handles).await;

        self.sink.shutdown().await;
        info!("Moteur de détection arrêté");
    }
}
