//! Bibliothèque IdsStarly de détection d'intrusions réseau
//!
//! Cette bibliothèque observe le trafic par IP source dans des fenêtres
//! d'analyse de durée fixe et signale les dépassements des seuils ICMP
//! et SYN. Chaque paquet analysé laisse une ligne dans la table `logs`,
//! et les IP escaladées sont inscrites dans une liste noire dédupliquée.

// Modules principaux
pub mod config;  // Configuration du système
pub mod engine;  // Orchestration du moteur
pub mod models;  // Structures de données du moteur
pub mod policy;  // Seuils et verdicts
pub mod sink;    // Collecteur d'alertes
pub mod store;   // Persistance SQLite
pub mod tracker; // Compteurs de flux par IP source

// Sources de paquets
pub mod capture;   // Capture sur interfaces réseau
pub mod simulator; // Trafic simulé

// Modules utilitaires et services
pub mod api;      // API de contrôle HTTP
pub mod cli;      // Interface en ligne de commande
pub mod log_mode; // Modes de journalisation
pub mod logger;   // Journal des événements
pub mod stats;    // Compteurs internes

// Re-export des structures principales pour faciliter l'utilisation
pub use config::{Config, LIMITE_MAX, LIMITE_MIN};
pub use engine::IntrusionDetectionEngine;
pub use log_mode::LogMode;
pub use logger::Logger;
pub use models::{
    AlertEvent, FlowCounters, LogRecord, PacketRecord, PacketType, Verdict, VerdictLabel,
};
pub use policy::{ThresholdError, ThresholdPolicy};
pub use sink::{AlertSink, SinkSettings};
pub use store::{AlertStore, BlacklistOutcome, SqliteStore, StoreError};
pub use tracker::FlowStatTracker;
