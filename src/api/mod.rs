//! HTTP endpoints for the portfolio shield.
//!
//! Page rendering and content storage live elsewhere; this module only
//! exposes the health check, metrics, and the contact endpoint the rate
//! limiter protects.

pub mod middleware;

use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use log::info;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::core::rate_limiter::CONTACT_PATH;
use crate::core::SameOriginGuard;
use crate::models::ContactForm;

pub use middleware::{ContactRateLimit, SecurityHeaders, SuspiciousActivity};

/// Register routes. With `origin_root` set, contact submissions must come
/// from that origin.
pub fn config(cfg: &mut web::ServiceConfig, origin_root: Option<&str>) {
    let submit = match origin_root {
        Some(root) => web::post().guard(SameOriginGuard::new(root)),
        None => web::post(),
    };

    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/metrics").route(web::get().to(render_metrics)))
        .service(
            web::resource(CONTACT_PATH)
                .route(web::get().to(contact_page))
                .route(submit.to(submit_contact)),
        );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn render_metrics(handle: Option<web::Data<PrometheusHandle>>) -> impl Responder {
    match handle {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn contact_page() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Contact form")
}

/// Accepts a contact submission and redirects back to the form
async fn submit_contact(form: web::Form<ContactForm>) -> impl Responder {
    let form = form.into_inner();
    info!(
        "Contact submission from {} <{}>: {}",
        form.name, form.email, form.subject
    );
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, CONTACT_PATH))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn contact_form() -> ContactForm {
        ContactForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            message: "Nice site".to_string(),
        }
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().configure(|cfg| config(cfg, None))).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_metrics_without_recorder() {
        let app = test::init_service(App::new().configure(|cfg| config(cfg, None))).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_contact_submission_redirects() {
        let app = test::init_service(App::new().configure(|cfg| config(cfg, None))).await;

        let req = test::TestRequest::post()
            .uri("/contact/")
            .set_form(contact_form())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/contact/");
    }

    #[actix_web::test]
    async fn test_contact_origin_guard() {
        let app = test::init_service(
            App::new().configure(|cfg| config(cfg, Some("https://example.com"))),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/contact/")
            .insert_header((header::ORIGIN, "https://example.com"))
            .set_form(contact_form())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let req = test::TestRequest::post()
            .uri("/contact/")
            .insert_header((header::ORIGIN, "https://evil.test"))
            .set_form(contact_form())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_client_error());
    }
}
