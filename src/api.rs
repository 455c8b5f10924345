//! API de contrôle HTTP
//!
//! Expose la consultation et l'ajustement des limites pendant que le
//! moteur tourne, l'instantané des compteurs et la remise à zéro de
//! l'historique.

use crate::engine::IntrusionDetectionEngine;
use crate::stats::CountersSnapshot;
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Serialize, Deserialize)]
pub struct LimitsView {
    limite_icmp: u32,
    limite_syn: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LimitUpdate {
    value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    success: bool,
    message: String,
}

pub fn create_router(engine: Arc<IntrusionDetectionEngine>) -> Router {
    Router::new()
        .route("/api/v1/limits", get(get_limits))
        .route("/api/v1/limits/icmp", put(set_limite_icmp))
        .route("/api/v1/limits/syn", put(set_limite_syn))
        .route("/api/v1/stats", get(get_stats))
        .route("/api/v1/clear", post(clear_history))
        .with_state(engine)
}

/// Sert l'API jusqu'au signal d'arrêt
pub async fn serve(
    listen: &str,
    engine: Arc<IntrusionDetectionEngine>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let router = create_router(engine);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("API de contrôle en écoute sur {}", listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    info!("API de contrôle arrêtée");
    Ok(())
}

async fn get_limits(
    state: axum::extract::State<Arc<IntrusionDetectionEngine>>,
) -> Json<LimitsView> {
    Json(LimitsView {
        limite_icmp: state.get_limite_icmp(),
        limite_syn: state.get_limite_syn(),
    })
}

async fn set_limite_icmp(
    state: axum::extract::State<Arc<IntrusionDetectionEngine>>,
    Json(payload): Json<LimitUpdate>,
) -> Json<ApiResponse> {
    match state.set_limite_icmp(payload.value) {
        Ok(()) => Json(ApiResponse {
            success: true,
            message: format!("Limite ICMP fixée à {} paquets par fenêtre", payload.value),
        }),
        Err(e) => Json(ApiResponse {
            success: false,
            message: format!("Erreur lors de la mise à jour de la limite ICMP: {}", e),
        }),
    }
}

async fn set_limite_syn(
    state: axum::extract::State<Arc<IntrusionDetectionEngine>>,
    Json(payload): Json<LimitUpdate>,
) -> Json<ApiResponse> {
    match state.set_limite_syn(payload.value) {
        Ok(()) => Json(ApiResponse {
            success: true,
            message: format!("Limite SYN fixée à {} paquets par fenêtre", payload.value),
        }),
        Err(e) => Json(ApiResponse {
            success: false,
            message: format!("Erreur lors de la mise à jour de la limite SYN: {}", e),
        }),
    }
}

async fn get_stats(
    state: axum::extract::State<Arc<IntrusionDetectionEngine>>,
) -> Json<CountersSnapshot> {
    Json(state.snapshot())
}

async fn clear_history(
    state: axum::extract::State<Arc<IntrusionDetectionEngine>>,
) -> Json<ApiResponse> {
    match state.clear_history().await {
        Ok(()) => Json(ApiResponse {
            success: true,
            message: "Historique vidé, identifiants réinitialisés".to_string(),
        }),
        Err(e) => Json(ApiResponse {
            success: false,
            message: format!("Erreur lors de la remise à zéro de l'historique: {}", e),
        }),
    }
}
