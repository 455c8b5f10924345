//! Persistance SQLite des verdicts et de la liste noire
//!
//! Deux tables portent l'historique du moteur: `logs` reçoit une ligne
//! par paquet analysé (y compris le trafic normal) et `blacklist` garde
//! une ligne par IP escaladée, mise à jour à chaque nouvelle escalade.
//! Les identifiants sont attribués par AUTOINCREMENT et repartent de 1
//! après une remise à zéro de l'historique.

use crate::models::LogRecord;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("erreur SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("erreur d'entrée/sortie: {0}")]
    Io(#[from] std::io::Error),
}

/// Ligne de la table `logs`
#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub timestamp: String,
    pub src_ip: String,
    pub src_port: String,
    pub dst_ip: String,
    pub dst_port: String,
    pub label: String,
    pub descricao: String,
}

/// Ligne de la table `blacklist`
#[derive(Debug, Clone, Serialize)]
pub struct BlacklistRow {
    pub id: i64,
    pub timestamp: String,
    pub ip: String,
    pub descricao: String,
}

/// Résultat d'une escalade vers la liste noire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistOutcome {
    /// L'IP n'était pas listée, une ligne a été créée
    Inserted(i64),
    /// L'IP était déjà listée, sa ligne a été rafraîchie
    Updated(i64),
}

impl BlacklistOutcome {
    pub fn row_id(&self) -> i64 {
        match self {
            BlacklistOutcome::Inserted(id) | BlacklistOutcome::Updated(id) => *id,
        }
    }

    pub fn is_insertion(&self) -> bool {
        matches!(self, BlacklistOutcome::Inserted(_))
    }
}

/// Opérations de persistance utilisées par le collecteur d'alertes
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insère une ligne dans `logs` et retourne son identifiant
    async fn insert_log(&self, record: &LogRecord) -> Result<i64, StoreError>;

    /// Insère ou rafraîchit la ligne `blacklist` d'une IP
    async fn upsert_blacklist(
        &self,
        timestamp: SystemTime,
        ip: IpAddr,
        descricao: &str,
    ) -> Result<BlacklistOutcome, StoreError>;

    /// Vide `logs` et `blacklist` et réinitialise leurs identifiants
    async fn clear_history(&self) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Base volatile pour les tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS logs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  TEXT NOT NULL,
                src_ip     TEXT NOT NULL,
                src_port   TEXT NOT NULL,
                dst_ip     TEXT NOT NULL,
                dst_port   TEXT NOT NULL,
                label      TEXT NOT NULL,
                descricao  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS blacklist (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  TEXT NOT NULL,
                ip         TEXT NOT NULL,
                descricao  TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Dernières lignes de `logs`, de la plus récente à la plus ancienne
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogRow>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, src_ip, src_port, dst_ip, dst_port, label, descricao
             FROM logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                src_ip: row.get(2)?,
                src_port: row.get(3)?,
                dst_ip: row.get(4)?,
                dst_port: row.get(5)?,
                label: row.get(6)?,
                descricao: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Toutes les lignes de `logs` dans l'ordre d'insertion
    pub fn all_logs(&self) -> Result<Vec<LogRow>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, src_ip, src_port, dst_ip, dst_port, label, descricao
             FROM logs ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                src_ip: row.get(2)?,
                src_port: row.get(3)?,
                dst_ip: row.get(4)?,
                dst_port: row.get(5)?,
                label: row.get(6)?,
                descricao: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Lignes de `blacklist`, de la plus récente à la plus ancienne
    pub fn blacklist_rows(&self, limit: usize) -> Result<Vec<BlacklistRow>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, ip, descricao
             FROM blacklist ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(BlacklistRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                ip: row.get(2)?,
                descricao: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_logs(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        Ok(conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?)
    }

    pub fn count_blacklist(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        Ok(conn.query_row("SELECT COUNT(*) FROM blacklist", [], |row| row.get(0))?)
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn insert_log(&self, record: &LogRecord) -> Result<i64, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO logs (timestamp, src_ip, src_port, dst_ip, dst_port, label, descricao)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format_timestamp(record.timestamp),
                record.src_ip.to_string(),
                port_text(record.src_port),
                record.dst_ip.to_string(),
                port_text(record.dst_port),
                record.label.as_str(),
                record.descricao,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn upsert_blacklist(
        &self,
        timestamp: SystemTime,
        ip: IpAddr,
        descricao: &str,
    ) -> Result<BlacklistOutcome, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let ip_text = ip.to_string();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM blacklist WHERE ip = ?1",
                params![ip_text],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE blacklist SET timestamp = ?1, descricao = ?2 WHERE id = ?3",
                    params![format_timestamp(timestamp), descricao, id],
                )?;
                Ok(BlacklistOutcome::Updated(id))
            }
            None => {
                conn.execute(
                    "INSERT INTO blacklist (timestamp, ip, descricao) VALUES (?1, ?2, ?3)",
                    params![format_timestamp(timestamp), ip_text, descricao],
                )?;
                Ok(BlacklistOutcome::Inserted(conn.last_insert_rowid()))
            }
        }
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute_batch(
            "
            DELETE FROM logs;
            DELETE FROM blacklist;
            DELETE FROM sqlite_sequence WHERE name IN ('logs', 'blacklist');
            ",
        )?;
        Ok(())
    }
}

/// Représentation texte d'un port, `N/A` quand le protocole n'en a pas
pub fn port_text(port: Option<u16>) -> String {
    match port {
        Some(port) => port.to_string(),
        None => "N/A".to_string(),
    }
}

pub fn format_timestamp(timestamp: SystemTime) -> String {
    DateTime::<Local>::from(timestamp)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
