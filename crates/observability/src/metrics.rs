//! Prometheus-kompatible Metriken fuer Voxlink
//!
//! Registrierte Metriken:
//! - `voxlink_connections` – Gauge: Offene Transport-Verbindungen
//! - `voxlink_registered_users` – Gauge: Registrierte Benutzernamen
//! - `voxlink_active_calls` – Gauge: Laufende Anrufe (Paare)
//! - `voxlink_calls_total` – Counter: Angenommene Anrufe
//! - `voxlink_signaling_messages_total` – Counter: Weitergeleitete Signale (kind)
//! - `voxlink_rejections_total` – Counter: Abgelehnte Anfragen (reason)
//! - `voxlink_dropped_messages_total` – Counter: Verworfene Nachrichten (reason)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Voxlink-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metrik-Handles.
#[derive(Clone)]
pub struct VoxlinkMetrics {
    pub registry: Arc<Registry>,

    pub verbindungen: IntGauge,
    pub registrierte_benutzer: IntGauge,
    pub aktive_anrufe: IntGauge,
    pub anrufe_gesamt: IntCounter,
    pub signale_gesamt: IntCounterVec,
    pub ablehnungen_gesamt: IntCounterVec,
    pub verworfen_gesamt: IntCounterVec,
}

impl VoxlinkMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let verbindungen = IntGauge::with_opts(Opts::new(
            "voxlink_connections",
            "Anzahl offener Transport-Verbindungen",
        ))?;
        registry.register(Box::new(verbindungen.clone()))?;

        let registrierte_benutzer = IntGauge::with_opts(Opts::new(
            "voxlink_registered_users",
            "Anzahl registrierter Benutzernamen",
        ))?;
        registry.register(Box::new(registrierte_benutzer.clone()))?;

        let aktive_anrufe = IntGauge::with_opts(Opts::new(
            "voxlink_active_calls",
            "Anzahl laufender Anrufe",
        ))?;
        registry.register(Box::new(aktive_anrufe.clone()))?;

        let anrufe_gesamt = IntCounter::with_opts(Opts::new(
            "voxlink_calls_total",
            "Gesamtanzahl angenommener Anrufe",
        ))?;
        registry.register(Box::new(anrufe_gesamt.clone()))?;

        let signale_gesamt = IntCounterVec::new(
            Opts::new(
                "voxlink_signaling_messages_total",
                "Weitergeleitete Signaling-Nachrichten",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(signale_gesamt.clone()))?;

        let ablehnungen_gesamt = IntCounterVec::new(
            Opts::new("voxlink_rejections_total", "Abgelehnte Client-Anfragen"),
            &["reason"],
        )?;
        registry.register(Box::new(ablehnungen_gesamt.clone()))?;

        let verworfen_gesamt = IntCounterVec::new(
            Opts::new(
                "voxlink_dropped_messages_total",
                "Nicht zugestellte Nachrichten",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(verworfen_gesamt.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen,
            registrierte_benutzer,
            aktive_anrufe,
            anrufe_gesamt,
            signale_gesamt,
            ablehnungen_gesamt,
            verworfen_gesamt,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: VoxlinkMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<VoxlinkMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = VoxlinkMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zwei_instanzen_sind_unabhaengig() {
        let a = VoxlinkMetrics::neu().unwrap();
        let b = VoxlinkMetrics::neu().unwrap();
        a.verbindungen.set(3);
        assert_eq!(b.verbindungen.get(), 0);
    }

    #[test]
    fn signale_mit_labels() {
        let metriken = VoxlinkMetrics::neu().unwrap();
        metriken.signale_gesamt.with_label_values(&["offer"]).inc();
        metriken.signale_gesamt.with_label_values(&["offer"]).inc();
        assert_eq!(metriken.signale_gesamt.with_label_values(&["offer"]).get(), 2);
        assert_eq!(metriken.signale_gesamt.with_label_values(&["answer"]).get(), 0);
    }

    #[test]
    fn export_prometheus_format() {
        let metriken = VoxlinkMetrics::neu().unwrap();
        metriken.aktive_anrufe.set(1);
        metriken
            .ablehnungen_gesamt
            .with_label_values(&["already_in_call"])
            .inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("voxlink_active_calls 1"));
        assert!(output.contains("voxlink_rejections_total{reason=\"already_in_call\"} 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
