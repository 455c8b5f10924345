use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;
use thiserror::Error;

/// Type de paquets analysés
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Copy)]
pub enum PacketType {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Tcp => "TCP",
            PacketType::Udp => "UDP",
            PacketType::Icmp => "ICMP",
            PacketType::Other => "OTHER",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Champ obligatoire absent d'un enregistrement de paquet
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("paquet TCP sans drapeaux")]
    MissingTcpFlags,
    #[error("paquet TCP sans ports")]
    MissingTcpPorts,
    #[error("paquet UDP sans ports")]
    MissingUdpPorts,
    #[error("paquet ICMP sans type")]
    MissingIcmpType,
}

/// Enregistrement d'un paquet déjà décodé par la couche de capture.
///
/// Les ports sont absents pour les protocoles qui n'en ont pas, les drapeaux
/// TCP ne sont présents que pour le TCP et le type ICMP que pour l'ICMP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub timestamp: SystemTime,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub dst_ip: IpAddr,
    pub dst_port: Option<u16>,
    pub protocol: PacketType,
    pub tcp_flags: Option<Vec<String>>,
    pub icmp_type: Option<u8>,
}

impl PacketRecord {
    /// Vérifie que les champs exigés par le protocole sont présents
    pub fn validate(&self) -> Result<(), MalformedRecord> {
        match self.protocol {
            PacketType::Tcp => {
                if self.tcp_flags.is_none() {
                    return Err(MalformedRecord::MissingTcpFlags);
                }
                if self.src_port.is_none() || self.dst_port.is_none() {
                    return Err(MalformedRecord::MissingTcpPorts);
                }
            }
            PacketType::Udp => {
                if self.src_port.is_none() || self.dst_port.is_none() {
                    return Err(MalformedRecord::MissingUdpPorts);
                }
            }
            PacketType::Icmp => {
                if self.icmp_type.is_none() {
                    return Err(MalformedRecord::MissingIcmpType);
                }
            }
            PacketType::Other => {}
        }
        Ok(())
    }

    /// Un paquet compte comme SYN s'il porte le drapeau SYN sans ACK,
    /// ce qui exclut les réponses SYN-ACK légitimes
    pub fn is_syn(&self) -> bool {
        if self.protocol != PacketType::Tcp {
            return false;
        }
        match &self.tcp_flags {
            Some(flags) => {
                flags.contains(&"SYN".to_string()) && !flags.contains(&"ACK".to_string())
            }
            None => false,
        }
    }
}

/// Compteurs d'une IP source sur la fenêtre d'analyse courante
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowCounters {
    pub icmp_count: u32,
    pub syn_count: u32,
    pub packet_count: u64,
    pub window_start: SystemTime,
    pub last_seen: SystemTime,
}

impl FlowCounters {
    pub fn new(window_start: SystemTime) -> Self {
        Self {
            icmp_count: 0,
            syn_count: 0,
            packet_count: 0,
            window_start,
            last_seen: window_start,
        }
    }
}

/// Étiquette attribuée à un paquet par la politique de seuils
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictLabel {
    IcmpFlood,
    SynFlood,
    Normal,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::IcmpFlood => "ICMP Flood",
            VerdictLabel::SynFlood => "SYN Flood",
            VerdictLabel::Normal => "Normal",
        }
    }

    pub fn is_intrusion(&self) -> bool {
        !matches!(self, VerdictLabel::Normal)
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Résultat de la classification d'un paquet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub label: VerdictLabel,
    pub descricao: String,
    pub severity: u8, // 0-10, 10 étant le plus sévère
}

/// Ligne prête à être insérée dans la table `logs`.
/// L'identifiant est attribué par la base au moment de l'insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub dst_ip: IpAddr,
    pub dst_port: Option<u16>,
    pub label: VerdictLabel,
    pub descricao: String,
}

impl LogRecord {
    pub fn new(packet: &PacketRecord, verdict: &Verdict) -> Self {
        Self {
            timestamp: packet.timestamp,
            src_ip: packet.src_ip,
            src_port: packet.src_port,
            dst_ip: packet.dst_ip,
            dst_port: packet.dst_port,
            label: verdict.label,
            descricao: verdict.descricao.clone(),
        }
    }
}

/// Événement transmis au puits d'alertes pour persistance
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub record: LogRecord,
    pub severity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn base_record(protocol: PacketType) -> PacketRecord {
        PacketRecord {
            timestamp: SystemTime::now(),
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            src_port: None,
            dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            dst_port: None,
            protocol,
            tcp_flags: None,
            icmp_type: None,
        }
    }

    #[test]
    fn test_validate_tcp_without_flags() {
        let mut record = base_record(PacketType::Tcp);
        record.src_port = Some(4242);
        record.dst_port = Some(80);
        assert_eq!(record.validate(), Err(MalformedRecord::MissingTcpFlags));

        record.tcp_flags = Some(vec!["SYN".to_string()]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_icmp_without_type() {
        let mut record = base_record(PacketType::Icmp);
        assert_eq!(record.validate(), Err(MalformedRecord::MissingIcmpType));

        record.icmp_type = Some(8);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_syn_ack_not_counted_as_syn() {
        let mut record = base_record(PacketType::Tcp);
        record.src_port = Some(4242);
        record.dst_port = Some(443);
        record.tcp_flags = Some(vec!["SYN".to_string(), "ACK".to_string()]);
        assert!(!record.is_syn());

        record.tcp_flags = Some(vec!["SYN".to_string()]);
        assert!(record.is_syn());
    }
}
