use crate::adapters::api::server::WsState;
use crate::core::domain::auth::AuthClaims;
use crate::core::ports::auth::TokenVerifierPort;
use crate::messaging::registry::{ConnectionRegistry, OutboundFrame};
use crate::utils::error::{NotifierError, NotifierResult};
use actix::prelude::*;
use actix_web::{get, web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use web::Data;

/// The handshake states a session moves through.
///
/// `Rejected` is terminal and only reachable from `Authenticating`; a
/// rejected session is never registered and never reaches `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Connecting,
    Authenticating,
    Open,
    Closing,
    Closed,
    Rejected,
}

/// Result of the spawned token verification, reported back to the actor.
#[derive(Message)]
#[rtype(result = "()")]
struct AuthOutcome(NotifierResult<AuthClaims>);

/// Confirmation that the session was registered with the registry.
#[derive(Message)]
#[rtype(result = "()")]
struct Registered {
    connection_id: u64,
    tenant_id: String,
    user_id: String,
}

/// Identity of a registered session, kept for cleanup.
struct SessionIdentity {
    connection_id: u64,
    tenant_id: String,
    user_id: String,
}

/// First client message when no cookie was supplied:
/// `{"type": "auth", "token": "..."}`.
#[derive(Debug, Deserialize)]
struct AuthFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    token: Option<String>,
}

/// Decision taken on the first client frame of a cookieless handshake.
enum AuthFrameOutcome {
    Token(String),
    Reject(ws::CloseCode, &'static str),
}

/// Classifies the first client frame of the auth handshake.
///
/// Malformed JSON closes with the unsupported-data code; a well-formed
/// message of the wrong type, or one without a token, closes with the
/// policy-violation code.
fn classify_auth_frame(raw: &str) -> AuthFrameOutcome {
    let frame: AuthFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => {
            return AuthFrameOutcome::Reject(ws::CloseCode::Unsupported, "malformed auth message")
        }
    };
    if frame.kind != "auth" {
        return AuthFrameOutcome::Reject(ws::CloseCode::Policy, "expected auth message");
    }
    match frame.token {
        Some(token) if !token.is_empty() => AuthFrameOutcome::Token(token),
        _ => AuthFrameOutcome::Reject(ws::CloseCode::Policy, "missing token"),
    }
}

/// A WebSocket actor carrying one client connection through the handshake
/// and into the delivery state.
///
/// The protocol is server-to-client push only: after authentication the only
/// client-initiated input accepted is a keep-alive ping. The actor's
/// `stopped` hook is the single, guaranteed cleanup path; it runs on every
/// exit, whichever handshake step failed.
pub struct WsSession {
    state: HandshakeState,
    /// Token taken from the HttpOnly cookie during the upgrade, if present.
    cookie_token: Option<String>,
    /// True from the moment a token is accepted until the session is
    /// registered or rejected. While set, neither the handshake deadline nor
    /// another auth frame can interleave with the in-flight verification and
    /// registration.
    auth_pending: bool,
    identity: Option<SessionIdentity>,
    verifier: Arc<dyn TokenVerifierPort>,
    registry: Arc<ConnectionRegistry>,
    handshake_timeout: Duration,
}

impl WsSession {
    pub fn new(
        cookie_token: Option<String>,
        verifier: Arc<dyn TokenVerifierPort>,
        registry: Arc<ConnectionRegistry>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            state: HandshakeState::Connecting,
            cookie_token,
            auth_pending: false,
            identity: None,
            verifier,
            registry,
            handshake_timeout,
        }
    }

    /// True while the session may still accept an auth frame. Once a token
    /// has been taken the window stays closed through verification and
    /// registration, whichever way they end.
    fn awaiting_token(&self) -> bool {
        self.state == HandshakeState::Authenticating && !self.auth_pending
    }

    /// Spawns token verification and reports the outcome back to the actor.
    fn begin_verification(&mut self, token: String, ctx: &mut ws::WebsocketContext<Self>) {
        self.auth_pending = true;
        let verifier = self.verifier.clone();
        let addr = ctx.address();

        actix_web::rt::spawn(async move {
            let outcome = verifier.verify(&token).await;
            addr.do_send(AuthOutcome(outcome));
        });
    }

    /// Rejects the handshake: best-effort error frame, close code, stop.
    fn reject(&mut self, ctx: &mut ws::WebsocketContext<Self>, code: ws::CloseCode, reason: &str) {
        self.state = HandshakeState::Rejected;
        warn!(reason, "websocket handshake rejected");

        let error = serde_json::json!({"type": "error", "message": reason});
        ctx.text(error.to_string());
        ctx.close(Some(ws::CloseReason {
            code,
            description: Some(reason.to_string()),
        }));
        ctx.stop();
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    /// Accepted socket: enter `Authenticating`.
    ///
    /// With a cookie token verification starts immediately. Without one the
    /// client gets `handshake_timeout` to send its auth message; the armed
    /// deadline rejects the session if neither a token nor an in-flight
    /// verification exists when it fires.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.state = HandshakeState::Authenticating;

        if let Some(token) = self.cookie_token.take() {
            self.begin_verification(token, ctx);
            return;
        }

        ctx.run_later(self.handshake_timeout, |act, ctx| {
            if act.awaiting_token() {
                act.reject(ctx, ws::CloseCode::Policy, "authentication timeout");
            }
        });
    }

    /// Guaranteed cleanup: deregister if the session ever registered.
    ///
    /// This is the only path by which a connection's resources are released,
    /// and the actor system runs it on every termination, including ones
    /// caused by stream errors mid-handshake.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state = HandshakeState::Closed;

        if let Some(identity) = self.identity.take() {
            let registry = self.registry.clone();
            actix_web::rt::spawn(async move {
                registry
                    .disconnect(identity.connection_id, &identity.tenant_id, &identity.user_id)
                    .await;
            });
        }
    }
}

impl Handler<AuthOutcome> for WsSession {
    type Result = ();

    /// Applies the verification result: register on success, reject on
    /// failure. Auth failures are never retried server-side.
    ///
    /// On success `auth_pending` stays set until `Registered` arrives, so a
    /// second auth frame cannot start another registration and the handshake
    /// deadline cannot reject a session whose token already verified.
    fn handle(&mut self, msg: AuthOutcome, ctx: &mut Self::Context) {
        if self.state != HandshakeState::Authenticating {
            return;
        }

        match msg.0 {
            Ok(claims) => {
                let registry = self.registry.clone();
                let recipient = ctx.address().recipient();
                let addr = ctx.address();

                actix_web::rt::spawn(async move {
                    let connection_id = registry
                        .connect(&claims.tenant_id, &claims.user_id, recipient)
                        .await;
                    let registered = Registered {
                        connection_id,
                        tenant_id: claims.tenant_id.clone(),
                        user_id: claims.user_id.clone(),
                    };
                    if addr.try_send(registered).is_err() {
                        // The session went away while registering; undo.
                        registry
                            .disconnect(connection_id, &claims.tenant_id, &claims.user_id)
                            .await;
                    }
                });
            }
            Err(e) => {
                self.auth_pending = false;
                self.reject(ctx, ws::CloseCode::Policy, &e.to_string());
            }
        }
    }
}

impl Handler<Registered> for WsSession {
    type Result = ();

    /// `Authenticating` -> `Open`: confirm the connection to the client.
    fn handle(&mut self, msg: Registered, ctx: &mut Self::Context) {
        self.state = HandshakeState::Open;
        self.auth_pending = false;

        let established = serde_json::json!({
            "type": "connection.established",
            "tenant_id": msg.tenant_id,
            "user_id": msg.user_id,
            "message": "real-time event stream connected",
        });
        ctx.text(established.to_string());
        info!(
            tenant_id = msg.tenant_id.as_str(),
            user_id = msg.user_id.as_str(),
            connection_id = msg.connection_id,
            "websocket session open"
        );

        self.identity = Some(SessionIdentity {
            connection_id: msg.connection_id,
            tenant_id: msg.tenant_id,
            user_id: msg.user_id,
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    /// Writes a frame pushed by the registry onto the socket.
    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    /// Processes incoming WebSocket messages.
    ///
    /// A plain-text `"ping"` is answered with `"pong"` in any state without
    /// touching auth or the broker. Before authentication the only other
    /// accepted input is the auth message; once open, client text is ignored
    /// because this channel is server-push only.
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                if text.trim() == "ping" {
                    ctx.text("pong");
                    return;
                }

                if self.awaiting_token() {
                    match classify_auth_frame(&text) {
                        AuthFrameOutcome::Token(token) => self.begin_verification(token, ctx),
                        AuthFrameOutcome::Reject(code, reason) => self.reject(ctx, code, reason),
                    }
                }
            }
            Ok(ws::Message::Close(reason)) => {
                self.state = HandshakeState::Closing;
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("websocket protocol error: {e}");
                self.state = HandshakeState::Closing;
                ctx.stop();
            }
            _ => (),
        }
    }
}

/// HTTP handler upgrading a request to the event-stream WebSocket.
///
/// The bearer token is preferred from the configured HttpOnly cookie, which
/// the browser attaches to the upgrade request automatically and which never
/// appears in a URL. Without a cookie the session waits for a single auth
/// message, bounded by the configured handshake timeout.
#[get("/ws")]
pub async fn connect_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: Data<Arc<WsState>>,
) -> Result<HttpResponse, NotifierError> {
    let cookie_token = req
        .cookie(&state.cookie_name)
        .map(|cookie| cookie.value().to_string());

    let session = WsSession::new(
        cookie_token,
        state.verifier.clone(),
        state.registry.clone(),
        state.handshake_timeout,
    );
    ws::start(session, &req, stream).map_err(|e| NotifierError::Api(e.to_string()))
}
