//! Collecteur d'alertes
//!
//! Tous les verdicts convergent vers une tâche d'écriture unique à travers
//! une file bornée. L'unicité de l'écrivain garantit que les lignes `logs`
//! sont insérées dans l'ordre de soumission et que la remise à zéro de
//! l'historique s'intercale précisément entre les verdicts qui la
//! précèdent et ceux qui la suivent.

use crate::config::Config;
use crate::logger::Logger;
use crate::models::{AlertEvent, LogRecord};
use crate::stats::EngineCounters;
use crate::store::{AlertStore, BlacklistOutcome, StoreError};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

pub enum SinkCommand {
    /// Verdict à persister
    Alert(AlertEvent),
    /// Nettoyage des compteurs d'escalade périmés
    Sweep { now: SystemTime },
    /// Remise à zéro de l'historique, acquittée une fois faite
    Clear {
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
    /// Point de synchronisation: l'acquittement signifie que tout ce qui
    /// précédait dans la file a été traité
    Flush { ack: oneshot::Sender<()> },
    /// Arrêt: la file est fermée, écoulée, puis l'arrêt est acquitté
    Shutdown { ack: oneshot::Sender<()> },
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub queue_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Nombre de verdicts d'intrusion requis dans la fenêtre d'escalade
    /// avant inscription en liste noire
    pub escalation_threshold: u32,
    pub escalation_window: Duration,
}

impl SinkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_size: config.alert_queue_size,
            retry_attempts: config.persist_retry_attempts,
            retry_delay: Duration::from_millis(config.persist_retry_delay_ms),
            escalation_threshold: config.escalation_threshold,
            escalation_window: Duration::from_secs(config.escalation_window_secs),
        }
    }
}

/// Poignée de soumission vers la tâche d'écriture
#[derive(Clone)]
pub struct AlertSink {
    tx: mpsc::Sender<SinkCommand>,
    counters: Arc<EngineCounters>,
}

impl AlertSink {
    /// Démarre la tâche d'écriture et retourne la poignée de soumission
    pub fn spawn(
        store: Arc<dyn AlertStore>,
        journal: Arc<Logger>,
        counters: Arc<EngineCounters>,
        settings: SinkSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_size.max(1));
        info!(
            "Collecteur d'alertes démarré (file de {} verdicts, {} tentatives d'écriture)",
            settings.queue_size, settings.retry_attempts
        );

        let writer = SinkWriter {
            store,
            journal,
            counters: counters.clone(),
            settings,
            escalations: HashMap::new(),
        };
        tokio::spawn(writer.run(rx));

        Self { tx, counters }
    }

    /// Soumet un verdict sans bloquer le chemin d'analyse. Quand la file
    /// est pleine le verdict est écarté et compté.
    pub fn submit(&self, event: AlertEvent) {
        match self.tx.try_send(SinkCommand::Alert(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.queue_overflows.fetch_add(1, Ordering::Relaxed);
                warn!("File du collecteur pleine, verdict écarté");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Collecteur d'alertes arrêté, verdict écarté");
            }
        }
    }

    /// Demande le nettoyage des compteurs d'escalade périmés
    pub fn sweep(&self, now: SystemTime) {
        let _ = self.tx.try_send(SinkCommand::Sweep { now });
    }

    /// Vide l'historique. Les verdicts soumis avant cet appel sont écrits
    /// puis effacés, ceux soumis après survivent.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(SinkCommand::Clear { ack: ack_tx })
            .await
            .is_err()
        {
            return Err(stopped_error());
        }
        ack_rx.await.unwrap_or_else(|_| Err(stopped_error()))
    }

    /// Attend que tous les verdicts déjà soumis soient traités
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(SinkCommand::Flush { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Arrête la tâche d'écriture. Au retour, tous les verdicts encore en
    /// file ont été persistés.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(SinkCommand::Shutdown { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

fn stopped_error() -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "le collecteur d'alertes est arrêté",
    ))
}

struct SinkWriter {
    store: Arc<dyn AlertStore>,
    journal: Arc<Logger>,
    counters: Arc<EngineCounters>,
    settings: SinkSettings,
    /// Verdicts d'intrusion par IP dans la fenêtre d'escalade courante
    escalations: HashMap<IpAddr, (u32, SystemTime)>,
}

impl SinkWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<SinkCommand>) {
        while let Some(command) = rx.recv().await {
            if let SinkCommand::Shutdown { ack } = command {
                // Fermer la file puis écouler ce qui reste avant d'acquitter
                rx.close();
                while let Ok(command) = rx.try_recv() {
                    self.process(command).await;
                }
                let _ = ack.send(());
                break;
            }
            self.process(command).await;
        }
        debug!("Tâche d'écriture du collecteur terminée");
    }

    async fn process(&mut self, command: SinkCommand) {
        match command {
            SinkCommand::Alert(event) => self.persist(event).await,
            SinkCommand::Sweep { now } => self.sweep_escalations(now),
            SinkCommand::Clear { ack } => {
                let result = self.store.clear_history().await;
                if result.is_ok() {
                    self.escalations.clear();
                    self.journal.log_clear();
                    info!("Historique vidé, identifiants réinitialisés");
                }
                let _ = ack.send(result);
            }
            SinkCommand::Flush { ack } => {
                let _ = ack.send(());
            }
            SinkCommand::Shutdown { ack } => {
                // Arrêt déjà engagé par un autre appelant, acquitter simplement
                let _ = ack.send(());
            }
        }
    }

    /// Écrit la ligne `logs` du verdict puis, pour une intrusion ayant
    /// atteint le seuil d'escalade, inscrit l'IP en liste noire.
    async fn persist(&mut self, event: AlertEvent) {
        match self.insert_with_retry(&event.record).await {
            Ok(_) => {
                self.counters.alerts_persisted.fetch_add(1, Ordering::Relaxed);
            }
            Err((attempts, err)) => {
                self.counters.alerts_dropped.fetch_add(1, Ordering::Relaxed);
                self.journal
                    .log_persistence_failure(&event.record, attempts, &err);
                error!(
                    "Verdict pour l'IP {} abandonné après {} tentatives: {}",
                    event.record.src_ip, attempts, err
                );
                return;
            }
        }

        if !event.record.label.is_intrusion() {
            return;
        }
        self.journal.log_alert(&event);

        if !self.should_escalate(&event) {
            return;
        }

        match self.upsert_with_retry(&event).await {
            Ok(BlacklistOutcome::Inserted(_)) => {
                self.counters.blacklist_inserted.fetch_add(1, Ordering::Relaxed);
                self.journal
                    .log_blacklist(event.record.src_ip, &event.record.descricao, true);
                warn!("IP {} inscrite en liste noire", event.record.src_ip);
            }
            Ok(BlacklistOutcome::Updated(_)) => {
                self.counters.blacklist_updated.fetch_add(1, Ordering::Relaxed);
                self.journal
                    .log_blacklist(event.record.src_ip, &event.record.descricao, false);
            }
            Err((attempts, err)) => {
                error!(
                    "Inscription en liste noire de l'IP {} abandonnée après {} tentatives: {}",
                    event.record.src_ip, attempts, err
                );
            }
        }
    }

    /// Compte les verdicts d'intrusion de l'IP dans la fenêtre d'escalade
    /// et indique si le seuil d'inscription est atteint.
    fn should_escalate(&mut self, event: &AlertEvent) -> bool {
        let now = event.record.timestamp;
        let entry = self
            .escalations
            .entry(event.record.src_ip)
            .or_insert((0, now));

        // Fenêtre d'escalade écoulée: repartir de zéro
        if let Ok(elapsed) = now.duration_since(entry.1) {
            if elapsed >= self.settings.escalation_window {
                *entry = (0, now);
            }
        }

        entry.0 += 1;
        entry.0 >= self.settings.escalation_threshold
    }

    /// Retire les compteurs d'escalade dont la fenêtre est écoulée
    fn sweep_escalations(&mut self, now: SystemTime) {
        let window = self.settings.escalation_window;
        self.escalations.retain(|_, (_, start)| {
            match now.duration_since(*start) {
                Ok(elapsed) => elapsed < window,
                Err(_) => true,
            }
        });
    }

    async fn insert_with_retry(&self, record: &LogRecord) -> Result<i64, (u32, StoreError)> {
        let mut delay = self.settings.retry_delay;
        let mut attempt = 1;
        loop {
            match self.store.insert_log(record).await {
                Ok(id) => return Ok(id),
                Err(err) => {
                    if attempt >= self.settings.retry_attempts {
                        return Err((attempt, err));
                    }
                    self.counters
                        .persistence_retries
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Échec d'écriture du verdict (tentative {}/{}): {}",
                        attempt, self.settings.retry_attempts, err
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    async fn upsert_with_retry(
        &self,
        event: &AlertEvent,
    ) -> Result<BlacklistOutcome, (u32, StoreError)> {
        let mut delay = self.settings.retry_delay;
        let mut attempt = 1;
        loop {
            match self
                .store
                .upsert_blacklist(
                    event.record.timestamp,
                    event.record.src_ip,
                    &event.record.descricao,
                )
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if attempt >= self.settings.retry_attempts {
                        return Err((attempt, err));
                    }
                    self.counters
                        .persistence_retries
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Échec d'inscription en liste noire (tentative {}/{}): {}",
                        attempt, self.settings.retry_attempts, err
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
