//! Capture réseau
//!
//! Un thread de capture par interface lit les trames brutes, en extrait
//! les champs utiles à la détection et les pousse sur le canal d'analyse
//! partagé. La lecture est armée d'un délai d'une seconde pour que le
//! signal d'arrêt soit observé même sans trafic.

use crate::models::{PacketRecord, PacketType};
use log::{error, info};
use pnet::datalink::{self, Channel};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};

/// Démarre la capture sur les interfaces configurées. Chaque thread rend
/// la main quand le signal d'arrêt passe à vrai ou quand le canal
/// d'analyse est fermé.
pub fn start_packet_capture(
    interfaces: &[String],
    feed_tx: mpsc::Sender<PacketRecord>,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();

    for interface_name in interfaces {
        let interface_name = interface_name.clone();
        let feed_tx = feed_tx.clone();
        let shutdown_rx = shutdown_rx.clone();

        handles.push(thread::spawn(move || {
            capture_on_interface(&interface_name, feed_tx, shutdown_rx);
        }));
    }

    info!("Capture de paquets démarrée sur {} interface(s)", handles.len());
    handles
}

// Boucle de capture d'une seule interface
fn capture_on_interface(
    interface_name: &str,
    feed_tx: mpsc::Sender<PacketRecord>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let interface = match datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface_name)
    {
        Some(interface) => interface,
        None => {
            error!("Interface {} non trouvée", interface_name);
            return;
        }
    };

    let config = datalink::Config {
        promiscuous: true,
        read_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };

    let mut rx = match datalink::channel(&interface, config) {
        Ok(Channel::Ethernet(_, rx)) => rx,
        Ok(_) => {
            error!("Type de canal non géré pour l'interface {}", interface_name);
            return;
        }
        Err(e) => {
            error!(
                "Erreur lors de l'ouverture de l'interface {}: {}",
                interface_name, e
            );
            return;
        }
    };

    info!("Capture démarrée sur l'interface {}", interface_name);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match rx.next() {
            Ok(frame) => {
                if let Some(record) = parse_packet(frame) {
                    // Canal d'analyse fermé: plus personne pour consommer
                    if feed_tx.blocking_send(record).is_err() {
                        break;
                    }
                }
            }
            // Le délai de lecture permet de revérifier le signal d'arrêt
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("Erreur lors de la capture sur {}: {}", interface_name, e);
                break;
            }
        }
    }

    info!("Capture arrêtée sur l'interface {}", interface_name);
}

/// Extrait d'une trame Ethernet les champs utiles à la détection
pub fn parse_packet(frame: &[u8]) -> Option<PacketRecord> {
    let ethernet = EthernetPacket::new(frame)?;
    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ipv4 = Ipv4Packet::new(ethernet.payload())?;
            parse_ip_packet(
                IpAddr::V4(ipv4.get_source()),
                IpAddr::V4(ipv4.get_destination()),
                ipv4.get_next_level_protocol(),
                ipv4.payload(),
            )
        }
        EtherTypes::Ipv6 => {
            let ipv6 = Ipv6Packet::new(ethernet.payload())?;
            parse_ip_packet(
                IpAddr::V6(ipv6.get_source()),
                IpAddr::V6(ipv6.get_destination()),
                ipv6.get_next_header(),
                ipv6.payload(),
            )
        }
        // Trame non IP
        _ => None,
    }
}

fn parse_ip_packet(
    src_ip: IpAddr,
    dst_ip: IpAddr,
    protocol: IpNextHeaderProtocol,
    payload: &[u8],
) -> Option<PacketRecord> {
    let (protocol, src_port, dst_port, tcp_flags, icmp_type) = match protocol {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(payload) {
                (
                    PacketType::Tcp,
                    Some(tcp.get_source()),
                    Some(tcp.get_destination()),
                    Some(flag_names(tcp.get_flags())),
                    None,
                )
            } else {
                // En-tête TCP tronqué, le paquet sera écarté à la validation
                (PacketType::Tcp, None, None, None, None)
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(payload) {
                (
                    PacketType::Udp,
                    Some(udp.get_source()),
                    Some(udp.get_destination()),
                    None,
                    None,
                )
            } else {
                (PacketType::Udp, None, None, None, None)
            }
        }
        IpNextHeaderProtocols::Icmp => {
            let icmp_type = IcmpPacket::new(payload).map(|icmp| icmp.get_icmp_type().0);
            (PacketType::Icmp, None, None, None, icmp_type)
        }
        IpNextHeaderProtocols::Icmpv6 => {
            let icmp_type = Icmpv6Packet::new(payload).map(|icmp| icmp.get_icmpv6_type().0);
            (PacketType::Icmp, None, None, None, icmp_type)
        }
        _ => (PacketType::Other, None, None, None, None),
    };

    Some(PacketRecord {
        timestamp: SystemTime::now(),
        src_ip,
        src_port,
        dst_ip,
        dst_port,
        protocol,
        tcp_flags,
        icmp_type,
    })
}

/// Noms des drapeaux TCP actifs
fn flag_names(flags: u8) -> Vec<String> {
    let mut names = Vec::new();
    if flags & TcpFlags::SYN != 0 {
        names.push("SYN".to_string());
    }
    if flags & TcpFlags::ACK != 0 {
        names.push("ACK".to_string());
    }
    if flags & TcpFlags::FIN != 0 {
        names.push("FIN".to_string());
    }
    if flags & TcpFlags::RST != 0 {
        names.push("RST".to_string());
    }
    if flags & TcpFlags::PSH != 0 {
        names.push("PSH".to_string());
    }
    if flags & TcpFlags::URG != 0 {
        names.push("URG".to_string());
    }
    names
}
