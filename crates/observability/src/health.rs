//! Health-Check-Endpunkt fuer Voxlink
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Kennzahlen des Signaling-Zustands

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server faehrt herunter, nimmt keine neuen Verbindungen mehr an
    Draining,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub registered_users: usize,
    pub active_calls: usize,
}

/// Quelle fuer die Kennzahlen des Health-Checks
///
/// Wird vom Signaling-Zustand implementiert, damit dieses Crate nichts
/// ueber dessen Interna wissen muss.
pub trait ZustandsQuelle: Send + Sync + 'static {
    fn verbindungen(&self) -> usize;
    fn registrierte_benutzer(&self) -> usize;
    fn aktive_anrufe(&self) -> usize;
    fn faehrt_herunter(&self) -> bool;
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub quelle: Arc<dyn ZustandsQuelle>,
}

impl HealthState {
    pub fn neu(quelle: Arc<dyn ZustandsQuelle>) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            quelle,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Erstellt die Antwort aus dem aktuellen Zustand
    pub fn antwort(&self) -> HealthResponse {
        let status = if self.quelle.faehrt_herunter() {
            HealthStatus::Draining
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connections: self.quelle.verbindungen(),
            registered_users: self.quelle.registrierte_benutzer(),
            active_calls: self.quelle.aktive_anrufe(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(quelle: Arc<dyn ZustandsQuelle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::neu(quelle))
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Draining => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    struct FesteQuelle {
        herunterfahren: AtomicBool,
    }

    impl ZustandsQuelle for FesteQuelle {
        fn verbindungen(&self) -> usize {
            3
        }
        fn registrierte_benutzer(&self) -> usize {
            2
        }
        fn aktive_anrufe(&self) -> usize {
            1
        }
        fn faehrt_herunter(&self) -> bool {
            self.herunterfahren.load(Ordering::Relaxed)
        }
    }

    fn quelle() -> Arc<FesteQuelle> {
        Arc::new(FesteQuelle {
            herunterfahren: AtomicBool::new(false),
        })
    }

    #[test]
    fn antwort_enthaelt_kennzahlen() {
        let state = HealthState::neu(quelle());
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert_eq!(antwort.connections, 3);
        assert_eq!(antwort.registered_users, 2);
        assert_eq!(antwort.active_calls, 1);
        assert!(antwort.uptime_seconds < 5);
    }

    #[test]
    fn health_response_serialisierung() {
        let json = serde_json::to_string(&HealthState::neu(quelle()).antwort()).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"active_calls\":1"));
    }

    #[tokio::test]
    async fn endpunkt_liefert_200() {
        let antwort = health_router(quelle())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let body = axum::body::to_bytes(antwort.into_body(), 4096).await.unwrap();
        let parsed: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.registered_users, 2);
    }

    #[tokio::test]
    async fn endpunkt_beim_herunterfahren_503() {
        let q = quelle();
        q.herunterfahren.store(true, Ordering::Relaxed);
        let antwort = health_router(q)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
