use crate::log_mode::LogMode;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "/etc/idsstarly/config.json";

/// Bornes autorisées pour les seuils de détection
pub const LIMITE_MIN: u32 = 10;
pub const LIMITE_MAX: u32 = 1000;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Version actuelle du logiciel
    pub version: String,

    /// Interfaces réseau à surveiller
    pub interfaces: Vec<String>,

    /// Durée de la fenêtre d'analyse en secondes
    pub window_secs: u64,

    /// Intervalle de purge des compteurs de flux en secondes
    pub purge_interval_secs: u64,

    /// Durée de rétention des compteurs inactifs en secondes
    pub retention_secs: u64,

    /// Nombre maximal d'IPs suivies simultanément
    pub max_tracked_ips: usize,

    /// Seuil de paquets ICMP par fenêtre avant alerte
    pub limite_icmp: u32,

    /// Seuil de paquets SYN par fenêtre avant alerte
    pub limite_syn: u32,

    /// Nombre d'intrusions avant inscription en liste noire
    pub escalation_threshold: u32,

    /// Fenêtre de comptage des intrusions en secondes
    pub escalation_window_secs: u64,

    /// Chemin de la base SQLite contenant les tables logs et blacklist
    pub db_path: String,

    /// Chemin du journal des événements
    pub log_file: String,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation (fichier ou systemd-journal)
    pub log_mode: LogMode,

    /// Adresse d'écoute de l'API de contrôle
    pub api_listen: String,

    /// Taille de la file d'arrivée des paquets
    pub packet_queue_size: usize,

    /// Taille de la file de persistance des alertes
    pub alert_queue_size: usize,

    /// Nombre de tentatives d'écriture avant abandon d'une alerte
    pub persist_retry_attempts: u32,

    /// Délai initial entre deux tentatives d'écriture en millisecondes
    pub persist_retry_delay_ms: u64,

    /// Nombre de tâches d'analyse de paquets
    pub analyzer_threads: usize,

    /// Intervalle du résumé périodique de statistiques en secondes
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: env!("CARGO_PKG_VERSION").to_string(),
            interfaces: vec!["eth0".to_string()],
            window_secs: 60,
            purge_interval_secs: 30,
            retention_secs: 120,
            max_tracked_ips: 100_000,
            limite_icmp: 100,
            limite_syn: 200,
            escalation_threshold: 1,
            escalation_window_secs: 60,
            db_path: "/var/lib/idsstarly/idsstarly.db".to_string(),
            log_file: "/var/log/idsstarly/idsstarly.log".to_string(),
            log_level: "info".to_string(),
            log_mode: LogMode::File,
            api_listen: "127.0.0.1:8942".to_string(),
            packet_queue_size: 10000,
            alert_queue_size: 10000,
            persist_retry_attempts: 3,
            persist_retry_delay_ms: 100,
            analyzer_threads: num_cpus::get(),
            stats_interval_secs: 60,
        }
    }
}

impl Config {
    /// Charge la configuration depuis le fichier système.
    /// Si le fichier n'existe pas encore, une configuration par défaut
    /// est créée puis sauvegardée.
    pub fn load() -> Result<Self> {
        if !Path::new(CONFIG_FILE).exists() {
            let default_config = Config::default();
            default_config.save()?;
            return Ok(default_config);
        }
        Self::load_from(CONFIG_FILE)
    }

    /// Charge la configuration depuis un chemin explicite
    pub fn load_from(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Sauvegarde la configuration dans le fichier système
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = Path::new(CONFIG_FILE).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let config_json = serde_json::to_string_pretty(self)?;
        fs::write(CONFIG_FILE, config_json)?;
        Ok(())
    }

    /// Vérifie la cohérence des paramètres avant le démarrage du moteur
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.window_secs >= 1,
            "la fenêtre d'analyse doit durer au moins une seconde"
        );
        ensure!(
            self.retention_secs >= self.window_secs,
            "la rétention ({} s) ne peut pas être plus courte que la fenêtre ({} s)",
            self.retention_secs,
            self.window_secs
        );
        ensure!(
            (LIMITE_MIN..=LIMITE_MAX).contains(&self.limite_icmp),
            "limite_icmp {} hors de l'intervalle [{}, {}]",
            self.limite_icmp,
            LIMITE_MIN,
            LIMITE_MAX
        );
        ensure!(
            (LIMITE_MIN..=LIMITE_MAX).contains(&self.limite_syn),
            "limite_syn {} hors de l'intervalle [{}, {}]",
            self.limite_syn,
            LIMITE_MIN,
            LIMITE_MAX
        );
        ensure!(
            self.escalation_threshold >= 1,
            "escalation_threshold doit valoir au moins 1"
        );
        ensure!(
            self.max_tracked_ips >= 1,
            "max_tracked_ips doit valoir au moins 1"
        );
        ensure!(
            self.analyzer_threads >= 1,
            "analyzer_threads doit valoir au moins 1"
        );
        ensure!(
            self.packet_queue_size >= 1 && self.alert_queue_size >= 1,
            "les tailles de files doivent valoir au moins 1"
        );
        ensure!(
            self.persist_retry_attempts >= 1,
            "persist_retry_attempts doit valoir au moins 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_short_retention() {
        let mut config = Config::default();
        config.window_secs = 60;
        config.retention_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_limit_bounds() {
        let mut config = Config::default();
        config.limite_icmp = 5;
        assert!(config.validate().is_err());

        config.limite_icmp = 100;
        config.limite_syn = 2000;
        assert!(config.validate().is_err());
    }
}
