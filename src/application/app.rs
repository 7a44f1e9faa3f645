use crate::application::env::GatewayEnv;
use crate::config::Settings;
use crate::domain::FeedbackQueueMessage;
use crate::error::{Error, Result};
use crate::proxy::GatewayService;
use crate::queue::{QueueMessage, QueueWorker};
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    env: GatewayEnv,
    feedback_rx: mpsc::Receiver<QueueMessage<FeedbackQueueMessage>>,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let (env, feedback_rx) = GatewayEnv::from_settings(settings)?;
        Ok(Self { env, feedback_rx })
    }

    pub fn env(&self) -> &GatewayEnv {
        &self.env
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.env.settings.bind_address()).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves, then
    /// stop the queue worker and wait for it to flush
    #[instrument(skip_all)]
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self { env, feedback_rx } = self;
        let settings = env.settings.clone();

        if let Some(clickhouse) = &env.clickhouse {
            if let Err(e) = clickhouse.ensure_schema().await {
                warn!(error = %e, "Could not prepare columnar store schema, continuing");
            }
        }

        let (worker, worker_shutdown) = QueueWorker::new(
            settings.queue.feedback_queue_id.clone(),
            env.feedback_consumer(),
            feedback_rx,
            &settings.queue,
        );
        let worker = tokio::spawn(worker.run());

        let router = GatewayService::new(settings.clone(), env.pipelines()?).into_router();

        info!(
            address = %listener.local_addr()?,
            environment = %settings.application.environment,
            role = ?settings.worker.role,
            "Starting relay gateway"
        );

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        if worker_shutdown.send(()).await.is_err() {
            warn!("Queue worker already stopped");
        }
        match worker.await {
            Ok(stats) => info!(
                acked = stats.acked,
                retried = stats.retried,
                dead_lettered = stats.dead_lettered,
                ignored = stats.ignored,
                "Queue worker stopped"
            ),
            Err(e) => error!(error = %e, "Queue worker panicked"),
        }

        served.map_err(Error::from)?;
        info!("Relay gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn test_settings() -> Settings {
        let mut settings = Settings::defaults().unwrap();
        settings.application.host = "127.0.0.1".to_string();
        settings.application.port = 0;
        settings
    }

    #[tokio::test]
    async fn test_application_can_be_created() {
        let app = Application::from_settings(test_settings()).unwrap();
        assert_eq!(app.env().settings.application.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_serves_health_until_shutdown() {
        let app = Application::from_settings(test_settings()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(app.serve(listener, async move {
            let _ = stop_rx.await;
        }));

        let body = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
