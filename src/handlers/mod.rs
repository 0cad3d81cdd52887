pub mod relay;
pub mod upload;

pub use relay::*;

use crate::health;
use actix_web::web;

/// Register every route the relay serves.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/transcribe", web::post().to(transcribe))
        .route("/process-video", web::post().to(process_video))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics));
}
