use crate::adapters::api::handlers::{health_check, ws::connect_ws};
use crate::core::ports::auth::TokenVerifierPort;
use crate::messaging::registry::ConnectionRegistry;
use crate::utils::error::{NotifierError, NotifierResult};
use actix_web::{middleware, web, App, HttpServer};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the WebSocket endpoint.
pub struct WsState {
    pub verifier: Arc<dyn TokenVerifierPort>,
    pub registry: Arc<ConnectionRegistry>,
    /// Name of the HttpOnly cookie carrying the bearer token.
    pub cookie_name: String,
    /// How long a cookieless client may take to send its auth message.
    pub handshake_timeout: Duration,
}

/// Launches the Actix-web server hosting the event-stream endpoint.
///
/// This function creates and runs an HTTP server that listens on the
/// specified host and port. It registers the health check and the `/ws`
/// upgrade endpoint; everything else about the CRM (the CRUD surface, the
/// producers) lives in other services that talk to this one only through the
/// broker.
///
/// # Arguments
///
/// * `host` - The IP address on which the server should listen.
/// * `port` - The port on which the server should accept connections.
/// * `state` - Shared WebSocket state: token verifier, connection registry,
///   cookie name, and handshake timeout.
///
/// # Returns
///
/// A `NotifierResult<()>` which is `Ok(())` once the server has shut down, or
/// a `NotifierError` if binding or running the server fails.
pub async fn launch_api_server(
    host: Ipv4Addr,
    port: u16,
    state: Arc<WsState>,
) -> NotifierResult<()> {
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::new(
                middleware::TrailingSlash::Trim,
            ))
            .wrap(middleware::DefaultHeaders::new().add(("X-Version", "1.0")))
            .app_data(web::Data::new(state.clone()))
            .service(health_check)
            .service(connect_ws)
    })
    .bind((host, port))
    .map_err(|e| NotifierError::Api(e.to_string()))?
    .run()
    .await
    .map_err(|e| NotifierError::Api(e.to_string()))?;

    Ok(())
}
