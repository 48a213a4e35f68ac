use std::time::Duration;

use actix_web::{
    dev::Server,
    http::KeepAlive,
    middleware::Logger,
    web,
    web::ServiceConfig,
    App,
    HttpServer,
};
use checkout_engine::{events::EventProducers, CheckoutDatabase, CheckoutFlowApi, SqliteDatabase};
use log::*;

use crate::{
    config::{PaymentWebhookConfig, ServerConfig},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    middleware::HmacMiddlewareFactory,
    routes::{health, CancelCheckoutRoute, CheckoutStatusRoute, CreateCheckoutRoute, PaymentConfirmedRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    info!("🗃️ Connected to {}", db.url());
    let api = CheckoutFlowApi::new(db.clone(), EventProducers::default()).with_policy(config.policy);
    let worker = start_expiry_worker(api.clone(), config.reaper_interval);
    let srv = create_server_instance(config, api)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    worker.shutdown().await;
    db.close().await;
    result
}

pub fn create_server_instance<B>(config: ServerConfig, api: CheckoutFlowApi<B>) -> Result<Server, ServerError>
where B: CheckoutDatabase + 'static {
    let webhook_config = config.payment_webhook.clone();
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("tcg::access_log"))
            .configure(|cfg| configure_checkout_app(cfg, api.clone(), &webhook_config))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every checkout route, the JSON error handlers and the HMAC-guarded webhook scope on an app.
pub fn configure_checkout_app<B>(cfg: &mut ServiceConfig, api: CheckoutFlowApi<B>, webhook: &PaymentWebhookConfig)
where B: CheckoutDatabase + 'static {
    let payment_scope = web::scope("/webhook")
        .wrap(HmacMiddlewareFactory::for_payments(webhook.hmac_secret.clone(), webhook.hmac_checks))
        .service(PaymentConfirmedRoute::<B>::new());
    cfg.app_data(web::Data::new(api))
        .app_data(
            web::JsonConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestQuery(err.to_string()).into()),
        )
        .service(health)
        .service(CreateCheckoutRoute::<B>::new())
        .service(CheckoutStatusRoute::<B>::new())
        .service(CancelCheckoutRoute::<B>::new())
        .service(payment_scope);
}
