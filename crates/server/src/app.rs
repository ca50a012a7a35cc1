use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use faultline_dispatch::ChannelDispatcher;
use faultline_discord::DiscordChannel;
use faultline_email::{EmailBackend, SmtpBackend, StubBackend};
use faultline_ingest::{AnalyticsInvalidator, Ingestor};
use faultline_mailer::{
    DigestProcessor, DigestScheduler, EmailChannel, EmailPipeline, MailerConfig,
};
use faultline_notify::{NotificationEngine, NotifyConfig};
use faultline_pipeline::{ContextEnricher, TriggerConfig, TriggerPipeline};
use faultline_provider::ChannelRegistry;
use faultline_slack::{SlackChannel, SlackConfig};
use faultline_storage::{
    MemoryDeploymentStore, MemoryDigestQueue, MemoryIssueStore, MemoryMemberStore,
    MemoryOccurrenceStore, MemoryProjectStore, MemoryRuleStore, ProjectStore,
};
use faultline_teams::TeamsChannel;
use faultline_webhook::{WebhookChannel, WebhookConfig};

use crate::api;
use crate::config::{FileConfig, ServerConfig};
use crate::error::ServerError;
use crate::retention::{RetentionScheduler, RetentionSweeper};
use crate::state_factory::build_state_store;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectStore>,
    pub ingestor: Arc<Ingestor>,
    pub engine: NotificationEngine,
}

/// Background schedulers owned by the running server.
#[derive(Debug)]
pub struct BackgroundTasks {
    digest: DigestScheduler,
    retention: RetentionScheduler,
}

impl BackgroundTasks {
    /// Stop all schedulers.
    pub fn stop(&self) {
        self.digest.stop();
        self.retention.stop();
    }
}

/// Analytics cache invalidation is an external collaborator; the in-core
/// hook only records that it was invoked.
struct LoggingAnalytics;

#[async_trait]
impl AnalyticsInvalidator for LoggingAnalytics {
    async fn invalidate(&self, project_id: &faultline_core::ProjectId) {
        debug!(project_id = %project_id, "analytics cache invalidation requested");
    }
}

/// Build the HTTP router over the shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::health::healthz))
        .route("/api/errors", post(api::errors::ingest_error))
        .route(
            "/api/alerts/{id}/acknowledge",
            post(api::alerts::acknowledge_alert),
        )
        .route("/api/alerts/{id}/resolve", post(api::alerts::resolve_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the whole pipeline from configuration.
///
/// Returns the handler state and the background schedulers; the engine is
/// already started (recovered from the state store).
pub async fn build_app(config: &ServerConfig) -> Result<(AppState, BackgroundTasks), ServerError> {
    let file = match &config.config_path {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    // Repositories.
    let projects = Arc::new(MemoryProjectStore::new());
    let rules = Arc::new(MemoryRuleStore::new());
    let issues = Arc::new(MemoryIssueStore::new());
    let occurrences = Arc::new(MemoryOccurrenceStore::new());
    let deployments = Arc::new(MemoryDeploymentStore::new());
    let members = Arc::new(MemoryMemberStore::new());
    let digests = Arc::new(MemoryDigestQueue::new());

    for seed in file.projects {
        projects.upsert(seed.into_project());
    }
    for rule in file.rules {
        rules.upsert(rule);
    }
    for member in file.members {
        members.upsert(member);
    }

    // Email transport: SMTP when configured, the logging stub otherwise.
    let backend: Arc<dyn EmailBackend> = match &file.smtp {
        Some(smtp) => Arc::new(
            SmtpBackend::new(smtp).map_err(|e| ServerError::Config(e.to_string()))?,
        ),
        None => {
            info!("no SMTP configuration, using stub email backend");
            Arc::new(StubBackend::new())
        }
    };

    let mailer_config = match &file.mailer {
        Some(seed) => {
            let mut mailer = MailerConfig::new(seed.from.clone());
            if let Some(url) = &seed.unsubscribe_base_url {
                mailer = mailer.with_unsubscribe_base_url(url.clone());
            }
            if let Some(url) = &config.dashboard_base_url {
                mailer = mailer.with_dashboard_base_url(url.clone());
            }
            mailer
        }
        None => MailerConfig::new("alerts@faultline.local"),
    };
    let email_pipeline = Arc::new(EmailPipeline::new(
        backend,
        members.clone(),
        digests.clone(),
        mailer_config,
    ));

    // Channel registry and dispatcher.
    let mut registry = ChannelRegistry::new();
    registry.register(Arc::new(WebhookChannel::new(
        WebhookConfig::new().with_timeout(config.webhook_timeout),
    )));
    registry.register(Arc::new(SlackChannel::new(
        SlackConfig::new().with_timeout(config.webhook_timeout),
    )));
    registry.register(Arc::new(DiscordChannel::new(config.webhook_timeout)));
    registry.register(Arc::new(TeamsChannel::new(config.webhook_timeout)));
    registry.register(Arc::new(EmailChannel::new(email_pipeline.clone())));
    let dispatcher = Arc::new(ChannelDispatcher::new(registry));

    // Notification engine with durable state.
    let store = build_state_store(config).await?;
    let engine = NotificationEngine::new(
        NotifyConfig::default()
            .with_aggregation_window(config.aggregation_window)
            .with_default_cooldown_minutes(config.cooldown_minutes)
            .with_default_escalation_minutes(config.escalation_minutes),
        dispatcher,
        store,
    );
    engine.start().await;

    // Trigger pipeline and ingestion.
    let lookback = chrono::Duration::from_std(config.deployment_lookback)
        .map_err(|e| ServerError::Config(format!("invalid deployment lookback: {e}")))?;
    let enricher =
        ContextEnricher::new(deployments.clone(), issues.clone()).with_lookback(lookback);
    let pipeline = Arc::new(TriggerPipeline::new(
        rules.clone(),
        occurrences.clone(),
        enricher,
        engine.clone(),
        TriggerConfig {
            dashboard_base_url: config.dashboard_base_url.clone(),
            api_base_url: config.api_base_url.clone(),
        },
    ));
    let ingestor = Arc::new(
        Ingestor::new(issues.clone(), occurrences.clone())
            .with_pipeline(pipeline)
            .with_analytics(Arc::new(LoggingAnalytics)),
    );

    // Background schedulers.
    let digest = DigestScheduler::spawn(
        Arc::new(DigestProcessor::new(email_pipeline, projects.clone())),
        config.digest_interval,
    );
    let retention = RetentionScheduler::spawn(
        Arc::new(RetentionSweeper::new(
            projects.clone(),
            issues,
            occurrences,
        )),
        config.retention_interval,
    );

    let state = AppState {
        projects,
        ingestor,
        engine,
    };
    Ok((state, BackgroundTasks { digest, retention }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::util::ServiceExt;

    /// Handler state over fresh memory stores with one known project.
    fn state_with_project() -> AppState {
        let projects = Arc::new(MemoryProjectStore::new());
        projects.upsert(faultline_core::Project::new(
            "p1", "Checkout", "test-key", "salt",
        ));
        let issues = Arc::new(MemoryIssueStore::new());
        let occurrences = Arc::new(MemoryOccurrenceStore::new());
        let ingestor = Arc::new(Ingestor::new(issues, occurrences));
        let engine = NotificationEngine::new(
            NotifyConfig::default(),
            Arc::new(ChannelDispatcher::new(ChannelRegistry::new())),
            Arc::new(faultline_state_memory::MemoryStateStore::new()),
        );
        AppState {
            projects,
            ingestor,
            engine,
        }
    }

    fn ingest_request(token: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/errors")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let router = build_router(state_with_project());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/errors")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"boom"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_credential_is_unauthorized() {
        let router = build_router(state_with_project());
        let response = router
            .oneshot(ingest_request("nope", r#"{"message":"boom"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_event_returns_201_with_grouping_outcome() {
        let router = build_router(state_with_project());
        let body = r#"{
            "message": "boom",
            "environment": "production",
            "stackTrace": [{"file": "a.js", "line": 1}]
        }"#;

        let response = router
            .clone()
            .oneshot(ingest_request("test-key", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["isNew"], true);
        assert_eq!(json["data"]["count"], 1);
        assert_eq!(json["data"]["status"], "new");
        assert_eq!(json["data"]["fingerprint"].as_str().unwrap().len(), 32);

        // Same event again groups into the existing issue.
        let response = router
            .oneshot(ingest_request("test-key", body))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["isNew"], false);
        assert_eq!(json["data"]["count"], 2);
    }

    #[tokio::test]
    async fn empty_message_is_unprocessable() {
        let router = build_router(state_with_project());
        let response = router
            .oneshot(ingest_request("test-key", r#"{"message": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn acknowledge_unknown_alert_reports_not_found() {
        let router = build_router(state_with_project());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/alerts/missing/acknowledge")
                    .header(header::AUTHORIZATION, "Bearer test-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["found"], false);
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let router = build_router(state_with_project());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
