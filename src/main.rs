use anyhow::Context;
use clap::Parser;
use idsstarly::cli::{Cli, Command};
use idsstarly::config::Config;
use idsstarly::engine::IntrusionDetectionEngine;
use idsstarly::log_mode::LogMode;
use idsstarly::logger::Logger;
use idsstarly::store::{AlertStore, SqliteStore};
use idsstarly::{api, capture, simulator};
use log::{error, info};
use num_format::{Locale, ToFormattedString};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Analyser les arguments de ligne de commande
    let cli = Cli::parse();

    // Charger la configuration pour déterminer le mode de log
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("impossible de charger la configuration {}", path))?,
        None => Config::load().unwrap_or_else(|_| Config::default()),
    };
    config.validate()?;

    // Initialiser le logger approprié
    init_logging(&config);

    match cli.command {
        Command::Start {
            simulate,
            interface,
        } => {
            let interfaces = if interface.is_empty() {
                config.interfaces.clone()
            } else {
                interface
            };
            run_engine(config, simulate, interfaces).await
        }
        Command::Status { limit } => show_status(&config, limit),
        Command::Clear => {
            let store = SqliteStore::new(Path::new(&config.db_path))?;
            store.clear_history().await?;
            println!("Historique vidé: tables logs et blacklist réinitialisées");
            Ok(())
        }
    }
}

fn init_logging(config: &Config) {
    match config.log_mode {
        LogMode::File => {
            // Initialiser le logger de fichier standard
            env_logger::init_from_env(
                env_logger::Env::default().default_filter_or(&config.log_level),
            );
        }
        LogMode::SystemdJournal => {
            // Initialiser le logger systemd-journal uniquement si la feature est activée
            #[cfg(feature = "systemd")]
            {
                use systemd_journal_logger::JournalLog;

                let log_level = match config.log_level.to_lowercase().as_str() {
                    "trace" => log::LevelFilter::Trace,
                    "debug" => log::LevelFilter::Debug,
                    "info" => log::LevelFilter::Info,
                    "warn" => log::LevelFilter::Warn,
                    "error" => log::LevelFilter::Error,
                    _ => log::LevelFilter::Info,
                };

                match JournalLog::new() {
                    Ok(logger) => {
                        if let Err(e) = logger
                            .with_syslog_identifier("idsstarly".to_string())
                            .install()
                        {
                            eprintln!("Erreur lors de l'installation du logger systemd: {}", e);
                            env_logger::init_from_env(
                                env_logger::Env::default().default_filter_or(&config.log_level),
                            );
                        } else {
                            log::set_max_level(log_level);
                            info!("Logger systemd initialisé avec niveau: {}", config.log_level);
                        }
                    }
                    Err(e) => {
                        eprintln!("Erreur lors de l'initialisation du logger systemd: {}", e);
                        env_logger::init_from_env(
                            env_logger::Env::default().default_filter_or(&config.log_level),
                        );
                    }
                }
            }

            // Fallback si la feature systemd n'est pas activée
            #[cfg(not(feature = "systemd"))]
            {
                eprintln!("AVERTISSEMENT: Le mode SystemdJournal n'est pas disponible (feature 'systemd' non activée). Utilisation du logger standard à la place.");
                env_logger::init_from_env(
                    env_logger::Env::default().default_filter_or(&config.log_level),
                );
            }
        }
    }
}

/// Assemble le moteur, branche la source de paquets et l'API de contrôle,
/// puis attend Ctrl+C avant l'arrêt ordonné.
async fn run_engine(config: Config, simulate: bool, interfaces: Vec<String>) -> anyhow::Result<()> {
    info!("Démarrage d'IdsStarly v{}", config.version);

    let store = Arc::new(
        SqliteStore::new(Path::new(&config.db_path))
            .with_context(|| format!("impossible d'ouvrir la base {}", config.db_path))?,
    );
    let journal = Arc::new(Logger::new_with_mode(
        config.log_file.clone(),
        config.log_mode,
    ));
    let engine = Arc::new(IntrusionDetectionEngine::new(
        &config,
        store.clone(),
        journal,
    ));

    // Canal d'alimentation en paquets
    let (feed_tx, feed_rx) = mpsc::channel(config.packet_queue_size);
    engine.clone().start(feed_rx).await;

    // Source des paquets: capture réelle ou trafic simulé
    let mut capture_threads = Vec::new();
    if simulate {
        let feed_tx = feed_tx.clone();
        let shutdown_rx = engine.shutdown_signal();
        tokio::spawn(async move {
            simulator::run_simulator(feed_tx, shutdown_rx).await;
        });
    } else {
        anyhow::ensure!(!interfaces.is_empty(), "aucune interface à surveiller");
        capture_threads =
            capture::start_packet_capture(&interfaces, feed_tx.clone(), engine.shutdown_signal());
    }
    // Les tâches d'analyse ne doivent voir la fermeture du canal qu'une
    // fois toutes les sources arrêtées
    drop(feed_tx);

    // API de contrôle
    {
        let engine = engine.clone();
        let listen = config.api_listen.clone();
        let shutdown_rx = engine.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&listen, engine, shutdown_rx).await {
                error!("Erreur de l'API de contrôle: {}", e);
            }
        });
    }

    info!("Moteur en marche, Ctrl+C pour arrêter");
    tokio::signal::ctrl_c().await?;

    engine.shutdown().await;
    for handle in capture_threads {
        let _ = handle.join();
    }

    let snapshot = engine.snapshot();
    info!(
        "{} paquets traités, {} verdicts persistés",
        snapshot.packets_processed.to_formatted_string(&Locale::fr),
        snapshot.alerts_persisted.to_formatted_string(&Locale::fr),
    );
    Ok(())
}

/// Affiche l'état de la configuration et le contenu récent des tables
fn show_status(config: &Config, limit: usize) -> anyhow::Result<()> {
    let store = SqliteStore::new(Path::new(&config.db_path))?;

    println!("=== Statut d'IdsStarly ===");
    println!("Version: {}", config.version);
    println!("Interfaces surveillées: {}", config.interfaces.join(", "));
    println!("Fenêtre d'analyse: {} secondes", config.window_secs);
    println!("Limite ICMP: {} paquets par fenêtre", config.limite_icmp);
    println!("Limite SYN: {} paquets par fenêtre", config.limite_syn);
    println!("Base de données: {}", config.db_path);

    println!("\n=== Historique ===");
    println!(
        "Lignes de log: {}",
        store.count_logs()?.to_formatted_string(&Locale::fr)
    );
    println!(
        "IPs en liste noire: {}",
        store.count_blacklist()?.to_formatted_string(&Locale::fr)
    );

    let logs = store.recent_logs(limit)?;
    if !logs.is_empty() {
        println!("\n=== Dernières détections ===");
        for row in &logs {
            println!(
                "{}. [{}] {} | {}:{} -> {}:{} | {}",
                row.id,
                row.timestamp,
                row.label,
                row.src_ip,
                row.src_port,
                row.dst_ip,
                row.dst_port,
                row.descricao
            );
        }
    }

    let blacklist = store.blacklist_rows(limit)?;
    println!("\n=== Liste noire ===");
    if blacklist.is_empty() {
        println!("Aucune IP en liste noire");
    } else {
        for row in &blacklist {
            println!(
                "{}. [{}] {} | {}",
                row.id, row.timestamp, row.ip, row.descricao
            );
        }
    }

    Ok(())
}
