mod analysis;
mod config;
mod error;
mod locale;
mod notify;
mod report;
mod routes;
mod storage;
mod survey;
#[cfg(test)]
mod testing;

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;

use analysis::advisory::AdvisoryGenerator;
use analysis::gemini::GeminiClient;
use analysis::kindwise::KindwiseClient;
use analysis::service::PlantAnalyzer;
use config::AppConfig;
use locale::LocaleTable;
use notify::mqtt::MqttNotifier;
use notify::{LogNotifier, Notifier};
use routes::configure_routes;
use storage::accumulation::LocalAccumulationStore;
use storage::artifact::{ArtifactStore, LocalArtifactStore};
use storage::s3_service::S3Service;
use survey::aggregator::{SurveyAggregator, SurveyCollaborators};
use survey::sweeper::start_sweeper;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{context}: {e}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let locales = match &config.locales_config {
        Some(path) => {
            LocaleTable::load(path).map_err(|e| startup_error("Failed to load locales", e))?
        }
        None => LocaleTable::builtin(),
    };
    let locales = Arc::new(locales.with_fonts(&config.fonts_dir));

    if !config.api_keys_configured() {
        log::warn!(
            "KINDWISE_API_KEY or GEMINI_API_KEY is not set; analysis requests will fail until configured."
        );
    }

    let http_client = reqwest::Client::new();
    let classifier = Arc::new(KindwiseClient::new(
        http_client.clone(),
        config.kindwise_api_url.clone(),
        config.kindwise_api_key.clone(),
    ));
    let advisor = AdvisoryGenerator::new(Arc::new(GeminiClient::new(
        http_client,
        &config.gemini_api_url,
        config.gemini_model.clone(),
        config.gemini_api_key.clone(),
    )));

    let notifier: Arc<dyn Notifier> = match config.mqtt.clone() {
        Some(mqtt) => {
            log::info!("Publishing report notifications to {}:{}", mqtt.hostname, mqtt.port);
            Arc::new(MqttNotifier::new(mqtt))
        }
        None => {
            log::warn!("MQTT_HOSTNAME is not set; report notifications will only be logged.");
            Arc::new(LogNotifier)
        }
    };

    let artifacts: Arc<dyn ArtifactStore> = match config.s3_bucket.clone() {
        Some(bucket) => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            log::info!("Storing reports in S3 bucket {}", bucket);
            Arc::new(S3Service::new(S3Client::new(&aws_config), bucket))
        }
        None => {
            log::info!("Storing reports under {}", config.reports_dir.display());
            Arc::new(LocalArtifactStore::new(config.reports_dir.clone()))
        }
    };

    let aggregator = SurveyAggregator::new(
        SurveyCollaborators {
            accumulation: Arc::new(LocalAccumulationStore::new(config.upload_dir.clone())),
            artifacts,
            classifier: classifier.clone(),
            advisor: advisor.clone(),
            notifier,
        },
        locales.clone(),
        config.notify_topic.clone(),
    )
    .with_record_limit(config.job_record_limit);
    let analyzer = PlantAnalyzer::new(classifier, advisor, locales);

    if let Some(max_age) = config.sweep_max_age {
        start_sweeper(aggregator.clone(), max_age);
    }

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(aggregator.clone()))
            .app_data(web::Data::new(analyzer.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
