use actix_web::{get, HttpResponse, Responder};

pub mod ws;

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}
