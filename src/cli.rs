//! Interface en ligne de commande

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "idsstarly",
    version,
    about = "Moteur de détection d'intrusions réseau par seuils ICMP et SYN"
)]
pub struct Cli {
    /// Chemin du fichier de configuration
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Démarre le moteur de détection
    Start {
        /// Génère du trafic simulé au lieu de capturer les interfaces
        #[arg(long)]
        simulate: bool,

        /// Interfaces à surveiller, remplace celles de la configuration
        #[arg(short, long)]
        interface: Vec<String>,
    },
    /// Affiche l'état du moteur et les dernières détections
    Status {
        /// Nombre de lignes d'historique à afficher
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Vide les tables logs et blacklist et réinitialise leurs identifiants
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start_parsing() {
        let cli = Cli::try_parse_from(["idsstarly", "start", "--simulate", "-i", "eth0"]).unwrap();
        match cli.command {
            Command::Start { simulate, interface } => {
                assert!(simulate);
                assert_eq!(interface, vec!["eth0".to_string()]);
            }
            _ => panic!("commande inattendue"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli =
            Cli::try_parse_from(["idsstarly", "status", "--config", "/tmp/essai.json"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/essai.json"));
    }
}
