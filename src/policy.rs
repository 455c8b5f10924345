//! Politique de seuils de détection
//!
//! Les limites ICMP et SYN sont stockées dans des compteurs atomiques et
//! peuvent être ajustées pendant que le moteur tourne, sans interrompre
//! l'analyse en cours. Quand les deux limites sont franchies dans la même
//! fenêtre, le verdict ICMP Flood prime sur le SYN Flood.

use crate::config::{LIMITE_MAX, LIMITE_MIN};
use crate::models::{FlowCounters, PacketRecord, Verdict, VerdictLabel};
use log::info;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ThresholdError {
    /// La valeur proposée sort de l'intervalle autorisé, la limite
    /// précédente reste en vigueur.
    #[error("limite {name} rejetée: {value} est hors de l'intervalle [10, 1000]")]
    OutOfRange { name: &'static str, value: u32 },
}

pub struct ThresholdPolicy {
    limite_icmp: AtomicU32,
    limite_syn: AtomicU32,
    /// Durée de la fenêtre d'analyse, reprise dans les descriptions
    window_secs: u64,
}

impl ThresholdPolicy {
    pub fn new(limite_icmp: u32, limite_syn: u32, window_secs: u64) -> Self {
        Self {
            limite_icmp: AtomicU32::new(limite_icmp),
            limite_syn: AtomicU32::new(limite_syn),
            window_secs,
        }
    }

    pub fn limite_icmp(&self) -> u32 {
        self.limite_icmp.load(Ordering::Relaxed)
    }

    pub fn limite_syn(&self) -> u32 {
        self.limite_syn.load(Ordering::Relaxed)
    }

    /// Remplace la limite ICMP. Une valeur hors bornes est refusée et
    /// la limite courante est conservée.
    pub fn set_limite_icmp(&self, value: u32) -> Result<(), ThresholdError> {
        Self::check("ICMP", value)?;
        self.limite_icmp.store(value, Ordering::Relaxed);
        info!("Limite ICMP mise à jour: {} paquets par fenêtre", value);
        Ok(())
    }

    /// Remplace la limite SYN. Une valeur hors bornes est refusée et
    /// la limite courante est conservée.
    pub fn set_limite_syn(&self, value: u32) -> Result<(), ThresholdError> {
        Self::check("SYN", value)?;
        self.limite_syn.store(value, Ordering::Relaxed);
        info!("Limite SYN mise à jour: {} paquets par fenêtre", value);
        Ok(())
    }

    fn check(name: &'static str, value: u32) -> Result<(), ThresholdError> {
        if !(LIMITE_MIN..=LIMITE_MAX).contains(&value) {
            return Err(ThresholdError::OutOfRange { name, value });
        }
        Ok(())
    }

    /// Rend le verdict pour un paquet à partir des compteurs de son IP
    /// source. Le dépassement exige un compte strictement supérieur à la
    /// limite, et les compteurs sont confrontés aux deux limites quel que
    /// soit le protocole du paquet examiné.
    pub fn evaluate(&self, packet: &PacketRecord, counters: &FlowCounters) -> Verdict {
        let limite_icmp = self.limite_icmp();
        if counters.icmp_count > limite_icmp {
            return Verdict {
                label: VerdictLabel::IcmpFlood,
                descricao: format!(
                    "Attaque ICMP Flood détectée depuis l'IP {} ({} paquets ICMP en {} secondes, limite {})",
                    packet.src_ip, counters.icmp_count, self.window_secs, limite_icmp
                ),
                severity: Self::severity(counters.icmp_count, limite_icmp),
            };
        }

        let limite_syn = self.limite_syn();
        if counters.syn_count > limite_syn {
            return Verdict {
                label: VerdictLabel::SynFlood,
                descricao: format!(
                    "Attaque SYN Flood détectée depuis l'IP {} ({} paquets SYN en {} secondes, limite {})",
                    packet.src_ip, counters.syn_count, self.window_secs, limite_syn
                ),
                severity: Self::severity(counters.syn_count, limite_syn),
            };
        }

        Verdict {
            label: VerdictLabel::Normal,
            descricao: format!("Trafic {} normal", packet.protocol),
            severity: 0,
        }
    }

    /// Sévérité croissante avec l'ampleur du dépassement, plafonnée à 10
    fn severity(count: u32, limite: u32) -> u8 {
        let ratio = count / limite.max(1);
        (7 + ratio).min(10) as u8
    }
}
