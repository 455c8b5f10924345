use crate::log_mode::LogMode;
use crate::models::{AlertEvent, LogRecord};
use crate::store::StoreError;
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

/// Journal des événements du moteur, écrit dans un fichier plat ou relayé
/// vers systemd-journal selon le mode configuré.
pub struct Logger {
    log_file: Mutex<Option<File>>,
    log_path: String,
    log_mode: LogMode,
}

impl Logger {
    pub fn new(log_path: String) -> Self {
        Self::new_with_mode(log_path, LogMode::File)
    }

    pub fn new_with_mode(log_path: String, log_mode: LogMode) -> Self {
        // Si le mode de journalisation est fichier, initialiser le fichier de log
        let file = if log_mode == LogMode::File {
            // Créer le répertoire si nécessaire
            if let Some(parent) = Path::new(&log_path).parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Erreur lors de la création du répertoire de logs: {}", e);
                }
            }

            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                Ok(file) => Some(file),
                Err(e) => {
                    error!("Erreur lors de l'ouverture du fichier de log {}: {}", log_path, e);
                    None
                }
            }
        } else {
            // En mode systemd-journal, pas besoin de fichier
            None
        };

        Self {
            log_file: Mutex::new(file),
            log_path,
            log_mode,
        }
    }

    /// Trace une escalade d'intrusion, avec l'horodatage du paquet déclencheur
    pub fn log_alert(&self, event: &AlertEvent) {
        let log_entry = format!(
            "[{}] [ALERT] [IP: {}] {} (sévérité {}/10)",
            Self::format_time(event.record.timestamp),
            event.record.src_ip,
            event.record.descricao,
            event.severity
        );

        match self.log_mode {
            LogMode::File => {
                self.write_to_log(&format!("{}\n", log_entry));
            }
            LogMode::SystemdJournal => {
                warn!("{}", log_entry);
            }
        }
    }

    /// Trace l'ajout ou le rafraîchissement d'une IP dans la liste noire
    pub fn log_blacklist(&self, ip: IpAddr, descricao: &str, inserted: bool) {
        let action = if inserted {
            "ajoutée à la liste noire"
        } else {
            "déjà listée, entrée rafraîchie"
        };
        let log_entry = format!(
            "[{}] [BLACKLIST] IP {} {}: {}",
            Self::format_time(SystemTime::now()),
            ip,
            action,
            descricao
        );

        match self.log_mode {
            LogMode::File => {
                self.write_to_log(&format!("{}\n", log_entry));
            }
            LogMode::SystemdJournal => {
                if inserted {
                    warn!("{}", log_entry);
                } else {
                    info!("{}", log_entry);
                }
            }
        }
    }

    /// Trace l'abandon d'un verdict après épuisement des tentatives d'écriture
    pub fn log_persistence_failure(&self, record: &LogRecord, attempts: u32, err: &StoreError) {
        let log_entry = format!(
            "[{}] [DROP] Verdict {} pour l'IP {} abandonné après {} tentatives: {}",
            Self::format_time(SystemTime::now()),
            record.label,
            record.src_ip,
            attempts,
            err
        );

        match self.log_mode {
            LogMode::File => {
                self.write_to_log(&format!("{}\n", log_entry));
            }
            LogMode::SystemdJournal => {
                error!("{}", log_entry);
            }
        }
    }

    /// Trace la remise à zéro de l'historique
    pub fn log_clear(&self) {
        let log_entry = format!(
            "[{}] [CLEAR] Historique vidé: tables logs et blacklist réinitialisées",
            Self::format_time(SystemTime::now())
        );

        match self.log_mode {
            LogMode::File => {
                self.write_to_log(&format!("{}\n", log_entry));
            }
            LogMode::SystemdJournal => {
                info!("{}", log_entry);
            }
        }
    }

    fn format_time(timestamp: SystemTime) -> String {
        let datetime: DateTime<Local> = timestamp.into();
        datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    fn write_to_log(&self, message: &str) {
        // Ne rien faire si on est en mode systemd-journal
        if self.log_mode == LogMode::SystemdJournal {
            return;
        }

        let mut log_file_guard = match self.log_file.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Erreur lors de l'acquisition du verrou pour le fichier de log: {}", e);
                return;
            }
        };

        if let Some(file) = log_file_guard.as_mut() {
            if let Err(e) = file.write_all(message.as_bytes()) {
                error!("Erreur lors de l'écriture dans le fichier de log: {}", e);

                // Essayer de réouvrir le fichier
                *log_file_guard = match OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)
                {
                    Ok(file) => Some(file),
                    Err(e) => {
                        error!("Erreur lors de la réouverture du fichier de log: {}", e);
                        None
                    }
                };
            }
        }
    }
}
