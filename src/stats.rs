//! Compteurs internes du moteur
//!
//! Les compteurs sont des atomiques incrémentés directement sur le chemin
//! d'analyse, sans verrou. Un instantané sérialisable est exposé par l'API
//! de contrôle et résumé périodiquement dans le journal.

use log::{info, warn};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Instant de démarrage du processus, pour le calcul du temps de fonctionnement
static START: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Default)]
pub struct EngineCounters {
    /// Paquets acceptés sur la file d'analyse
    pub packets_processed: AtomicU64,
    /// Paquets écartés avant analyse car incomplets
    pub malformed_packets: AtomicU64,
    pub normal_verdicts: AtomicU64,
    pub icmp_flood_verdicts: AtomicU64,
    pub syn_flood_verdicts: AtomicU64,
    /// Lignes écrites dans la table `logs`
    pub alerts_persisted: AtomicU64,
    /// Verdicts abandonnés après épuisement des tentatives d'écriture
    pub alerts_dropped: AtomicU64,
    /// Verdicts refusés car la file du collecteur était pleine
    pub queue_overflows: AtomicU64,
    pub persistence_retries: AtomicU64,
    pub blacklist_inserted: AtomicU64,
    pub blacklist_updated: AtomicU64,
    pub purge_runs: AtomicU64,
    pub purged_entries: AtomicU64,
}

impl EngineCounters {
    pub fn new() -> Self {
        // Matérialise l'instant de départ dès la création des compteurs
        Lazy::force(&START);
        Self::default()
    }

    pub fn snapshot(&self, tracked_ips: usize) -> CountersSnapshot {
        CountersSnapshot {
            uptime_secs: START.elapsed().as_secs(),
            tracked_ips,
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            normal_verdicts: self.normal_verdicts.load(Ordering::Relaxed),
            icmp_flood_verdicts: self.icmp_flood_verdicts.load(Ordering::Relaxed),
            syn_flood_verdicts: self.syn_flood_verdicts.load(Ordering::Relaxed),
            alerts_persisted: self.alerts_persisted.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            persistence_retries: self.persistence_retries.load(Ordering::Relaxed),
            blacklist_inserted: self.blacklist_inserted.load(Ordering::Relaxed),
            blacklist_updated: self.blacklist_updated.load(Ordering::Relaxed),
            purge_runs: self.purge_runs.load(Ordering::Relaxed),
            purged_entries: self.purged_entries.load(Ordering::Relaxed),
        }
    }
}

/// Instantané des compteurs, exposé par l'API de contrôle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub uptime_secs: u64,
    pub tracked_ips: usize,
    pub packets_processed: u64,
    pub malformed_packets: u64,
    pub normal_verdicts: u64,
    pub icmp_flood_verdicts: u64,
    pub syn_flood_verdicts: u64,
    pub alerts_persisted: u64,
    pub alerts_dropped: u64,
    pub queue_overflows: u64,
    pub persistence_retries: u64,
    pub blacklist_inserted: u64,
    pub blacklist_updated: u64,
    pub purge_runs: u64,
    pub purged_entries: u64,
}

impl CountersSnapshot {
    /// Résumé périodique dans le journal
    pub fn log_summary(&self) {
        info!(
            "Statistiques: {} paquets traités, {} normaux, {} ICMP Flood, {} SYN Flood, {} IPs suivies",
            self.packets_processed.to_formatted_string(&Locale::fr),
            self.normal_verdicts.to_formatted_string(&Locale::fr),
            self.icmp_flood_verdicts.to_formatted_string(&Locale::fr),
            self.syn_flood_verdicts.to_formatted_string(&Locale::fr),
            self.tracked_ips.to_formatted_string(&Locale::fr),
        );
        if self.queue_overflows > 0 || self.alerts_dropped > 0 {
            warn!(
                "Pertes: {} verdicts refusés par la file, {} abandonnés après échec d'écriture",
                self.queue_overflows.to_formatted_string(&Locale::fr),
                self.alerts_dropped.to_formatted_string(&Locale::fr),
            );
        }
    }
}
