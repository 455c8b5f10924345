//! Suivi des compteurs de flux par IP source
//!
//! Chaque IP source possède un jeu de compteurs rattaché à une fenêtre
//! d'analyse de durée fixe. La fenêtre est pilotée par l'horodatage des
//! paquets eux-mêmes, ce qui rend le comportement reproductible quel que
//! soit le rythme d'arrivée réel.

use crate::models::{FlowCounters, PacketRecord, PacketType};
use dashmap::DashMap;
use log::debug;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

pub struct FlowStatTracker {
    /// Compteurs par IP source
    flows: DashMap<IpAddr, FlowCounters>,
    /// Durée de la fenêtre d'analyse
    window: Duration,
    /// Durée d'inactivité avant éviction d'une entrée
    retention: Duration,
    /// Plafond d'IPs suivies simultanément
    max_tracked_ips: usize,
}

impl FlowStatTracker {
    pub fn new(window: Duration, retention: Duration, max_tracked_ips: usize) -> Self {
        Self {
            flows: DashMap::new(),
            window,
            // La rétention ne peut pas être plus courte que la fenêtre,
            // sinon des compteurs actifs seraient purgés
            retention: retention.max(window),
            max_tracked_ips: max_tracked_ips.max(1),
        }
    }

    /// Met à jour les compteurs de l'IP source du paquet et retourne
    /// leur état après prise en compte du paquet.
    ///
    /// Quand la fenêtre courante est écoulée (horodatage du paquet à
    /// `window_start + window` ou au-delà), les compteurs repartent de
    /// zéro et le paquet ouvre la fenêtre suivante. Un paquet antérieur à
    /// `window_start` (réordonnancement réseau) est compté dans la
    /// fenêtre courante sans la réinitialiser.
    pub fn update(&self, packet: &PacketRecord) -> FlowCounters {
        if !self.flows.contains_key(&packet.src_ip) && self.flows.len() >= self.max_tracked_ips {
            self.make_room(packet.timestamp);
        }

        let mut entry = self
            .flows
            .entry(packet.src_ip)
            .or_insert_with(|| FlowCounters::new(packet.timestamp));

        // Réinitialiser les compteurs si la fenêtre d'analyse est écoulée
        if let Ok(elapsed) = packet.timestamp.duration_since(entry.window_start) {
            if elapsed >= self.window {
                *entry = FlowCounters::new(packet.timestamp);
            }
        }

        entry.packet_count += 1;
        entry.last_seen = packet.timestamp;
        match packet.protocol {
            PacketType::Icmp => entry.icmp_count += 1,
            PacketType::Tcp if packet.is_syn() => entry.syn_count += 1,
            _ => {}
        }

        *entry
    }

    /// Supprime les entrées inactives depuis plus longtemps que la durée
    /// de rétention et retourne le nombre d'entrées retirées.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let before = self.flows.len();
        self.flows.retain(|_, counters| {
            match now.duration_since(counters.last_seen) {
                Ok(elapsed) => elapsed <= self.retention,
                // Entrée plus récente que l'instant de purge: conserver
                Err(_) => true,
            }
        });
        before - self.flows.len()
    }

    /// Libère une place pour une nouvelle IP quand le plafond est atteint.
    /// La purge normale est tentée d'abord, puis l'entrée la plus ancienne
    /// est évincée en dernier recours.
    fn make_room(&self, now: SystemTime) {
        if self.purge_expired(now) > 0 && self.flows.len() < self.max_tracked_ips {
            return;
        }

        let stalest = self
            .flows
            .iter()
            .min_by_key(|entry| entry.value().last_seen)
            .map(|entry| *entry.key());
        if let Some(ip) = stalest {
            self.flows.remove(&ip);
            debug!("Plafond de suivi atteint, éviction de l'IP {}", ip);
        }
    }

    /// Nombre d'IPs actuellement suivies
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// État courant des compteurs d'une IP, sans le modifier
    pub fn counters_for(&self, ip: &IpAddr) -> Option<FlowCounters> {
        self.flows.get(ip).map(|entry| *entry.value())
    }
}
