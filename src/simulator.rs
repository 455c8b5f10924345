//! Générateur de trafic simulé
//!
//! Remplace la capture réseau pour les démonstrations et les essais sur
//! machine de développement: un fond de trafic anodin, entrecoupé de
//! rafales ICMP ou SYN depuis une IP d'attaque, de quoi faire réagir les
//! seuils sans toucher à une interface réelle.

use crate::models::{PacketRecord, PacketType};
use log::info;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};

pub async fn run_simulator(
    feed_tx: mpsc::Sender<PacketRecord>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Mode simulation: génération de trafic aléatoire");

    loop {
        // Construire la rafale hors de tout await, le générateur aléatoire
        // ne pouvant pas traverser un point de suspension
        let batch = build_batch();

        for record in batch {
            if feed_tx.send(record).await.is_err() {
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Simulation arrêtée");
                    return;
                }
            }
        }
    }
}

/// Un lot de trafic de fond, avec parfois une rafale d'attaque
fn build_batch() -> Vec<PacketRecord> {
    let mut rng = rand::rng();
    let mut batch = Vec::new();

    for _ in 0..rng.random_range(5..20) {
        batch.push(random_packet(&mut rng));
    }

    if rng.random_bool(0.1) {
        let attacker = IpAddr::V4(Ipv4Addr::new(203, 0, 113, rng.random_range(1..255)));
        let icmp = rng.random_bool(0.5);
        let burst = rng.random_range(30..80);
        for _ in 0..burst {
            batch.push(if icmp {
                flood_icmp(attacker)
            } else {
                flood_syn(attacker, &mut rng)
            });
        }
    }

    batch
}

/// Simule la réception d'un paquet réseau anodin
fn random_packet(rng: &mut impl Rng) -> PacketRecord {
    // Simuler différents types de paquets avec différentes probabilités
    let packet_type = match rng.random_range(0..100) {
        0..=70 => PacketType::Tcp,
        71..=85 => PacketType::Udp,
        _ => PacketType::Icmp,
    };

    // Générer une IP source aléatoire
    let src_ip = IpAddr::V4(Ipv4Addr::new(
        rng.random_range(1..255),
        rng.random_range(0..255),
        rng.random_range(0..255),
        rng.random_range(1..255),
    ));

    let src_port = match packet_type {
        PacketType::Tcp | PacketType::Udp => Some(rng.random_range(1024..65535)),
        _ => None,
    };

    let dst_port = match packet_type {
        PacketType::Tcp | PacketType::Udp => Some(rng.random_range(1..65535)),
        _ => None,
    };

    PacketRecord {
        timestamp: SystemTime::now(),
        src_ip,
        src_port,
        dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), // IP de destination fixe pour la simulation
        dst_port,
        protocol: packet_type,
        tcp_flags: if packet_type == PacketType::Tcp {
            // Trafic établi, pas des ouvertures de connexion
            Some(vec!["ACK".to_string()])
        } else {
            None
        },
        icmp_type: if packet_type == PacketType::Icmp {
            Some(8)
        } else {
            None
        },
    }
}

fn flood_icmp(attacker: IpAddr) -> PacketRecord {
    PacketRecord {
        timestamp: SystemTime::now(),
        src_ip: attacker,
        src_port: None,
        dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        dst_port: None,
        protocol: PacketType::Icmp,
        tcp_flags: None,
        icmp_type: Some(8),
    }
}

fn flood_syn(attacker: IpAddr, rng: &mut impl Rng) -> PacketRecord {
    PacketRecord {
        timestamp: SystemTime::now(),
        src_ip: attacker,
        src_port: Some(rng.random_range(1024..65535)),
        dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        dst_port: Some(80),
        protocol: PacketType::Tcp,
        tcp_flags: Some(vec!["SYN".to_string()]),
        icmp_type: None,
    }
}
