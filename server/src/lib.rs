//! voxlink-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use voxlink_observability::{
    observability_router, observability_server_starten, VoxlinkMetrics, ZustandsQuelle,
};
use voxlink_signaling::{ws_router, ws_server_starten, SignalingServer, SignalingState};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.starten_bis(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            }
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft bis `signal` endet
    ///
    /// Reihenfolge:
    /// 1. Metriken und gemeinsamen Zustand anlegen
    /// 2. WebSocket-Server starten
    /// 3. TCP-Listener starten (optional)
    /// 4. Observability-Server starten (optional)
    /// 5. Auf das Shutdown-Signal warten, dann alle Verbindungen schliessen
    pub async fn starten_bis<S>(self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let config = &self.config;
        let metriken = VoxlinkMetrics::neu()?;
        let state = SignalingState::neu(config.signaling_config(), metriken.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            server_name = %config.server.name,
            max_verbindungen = config.server.max_verbindungen,
            "Server startet"
        );

        let mut subsysteme: JoinSet<Result<()>> = JoinSet::new();

        // WebSocket
        let ws_addr = config.ws_bind_adresse()?;
        let app = ws_router(Arc::clone(&state), &config.ws_optionen(), shutdown_rx.clone());
        let rx = shutdown_rx.clone();
        subsysteme.spawn(async move {
            ws_server_starten(ws_addr, app, rx).await?;
            Ok(())
        });

        // TCP
        if config.netzwerk.tcp_aktiviert {
            let tcp_addr = config.tcp_bind_adresse()?;
            let server = SignalingServer::neu(Arc::clone(&state), tcp_addr);
            let rx = shutdown_rx.clone();
            subsysteme.spawn(async move {
                server.starten(rx).await?;
                Ok(())
            });
        }

        // Observability
        if config.observability.aktiviert {
            let obs_addr = config.observability_bind_adresse()?;
            let quelle: Arc<dyn ZustandsQuelle> = Arc::clone(&state) as Arc<dyn ZustandsQuelle>;
            let app = observability_router(metriken, quelle);
            let rx = shutdown_rx.clone();
            subsysteme.spawn(observability_server_starten(obs_addr, app, rx));
        }

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal...");

        let mut erster_fehler = None;
        tokio::select! {
            _ = signal => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            Some(ergebnis) = subsysteme.join_next() => {
                tracing::error!("Subsystem unerwartet beendet, Server wird beendet");
                erster_fehler = fehler_aus(ergebnis);
            }
        }

        state.herunterfahren_einleiten();
        let _ = shutdown_tx.send(true);

        while let Some(ergebnis) = subsysteme.join_next().await {
            if let Some(fehler) = fehler_aus(ergebnis) {
                tracing::error!(fehler = %fehler, "Subsystem mit Fehler beendet");
                erster_fehler.get_or_insert(fehler);
            }
        }

        tracing::info!("Server gestoppt");
        match erster_fehler {
            Some(fehler) => Err(fehler),
            None => Ok(()),
        }
    }
}

fn fehler_aus(ergebnis: Result<Result<()>, tokio::task::JoinError>) -> Option<anyhow::Error> {
    match ergebnis {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(anyhow::anyhow!("Subsystem-Task abgebrochen: {e}")),
    }
}
