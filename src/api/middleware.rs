//! Actix middleware for the request protection chain.
//!
//! Wrap order matters: actix runs the last `wrap` first, so register
//! [`ContactRateLimit`], then [`SuspiciousActivity`], then [`SecurityHeaders`]
//! to get headers on every response, rejections included.

use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{Error, HttpResponse};
use futures::future::LocalBoxFuture;
use log::{debug, error, info};
use metrics::increment_counter;

use crate::core::{
    apply_security_headers, decode_path, Classification, ClientIdentity, RateLimitError,
    RateLimiter, SuspiciousActivityDetector,
};

/// Body of the response sent to blocked clients
pub const ACCESS_DENIED: &str = "Access denied";

fn client_id(identity: &ClientIdentity, req: &ServiceRequest) -> String {
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    identity.client_id(forwarded_for, req.peer_addr().map(|addr| addr.ip()))
}

/// Adds the security header set to every response.
///
/// Errors raised further down the chain are rendered here so they carry the
/// headers too.
pub struct SecurityHeaders;

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddleware { service }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let http_req = req.request().clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = match fut.await {
                Ok(res) => res.map_into_left_body(),
                Err(e) => ServiceResponse::from_err(e, http_req).map_into_right_body(),
            };
            apply_security_headers(res.headers_mut());
            Ok(res)
        })
    }
}

/// Rejects requests from scanners and lookups of sensitive paths
#[derive(Clone)]
pub struct SuspiciousActivity {
    detector: Arc<SuspiciousActivityDetector>,
    identity: ClientIdentity,
}

impl SuspiciousActivity {
    pub fn new(detector: Arc<SuspiciousActivityDetector>, identity: ClientIdentity) -> Self {
        Self { detector, identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SuspiciousActivity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SuspiciousActivityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SuspiciousActivityMiddleware {
            service: Rc::new(service),
            detector: self.detector.clone(),
            identity: self.identity.clone(),
        }))
    }
}

pub struct SuspiciousActivityMiddleware<S> {
    service: Rc<S>,
    detector: Arc<SuspiciousActivityDetector>,
    identity: ClientIdentity,
}

impl<S, B> Service<ServiceRequest> for SuspiciousActivityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let detector = self.detector.clone();
        let client_id = client_id(&self.identity, &req);

        Box::pin(async move {
            // Non-ASCII bytes must not blank out the header
            let user_agent = req
                .headers()
                .get(header::USER_AGENT)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .unwrap_or_default();
            let path = decode_path(req.path());

            let classification = detector.inspect(&client_id, &user_agent, &path).await;
            if let Classification::Reject(_) = classification {
                let res = HttpResponse::Forbidden()
                    .content_type("text/plain; charset=utf-8")
                    .body(ACCESS_DENIED);
                return Ok(req.into_response(res).map_into_right_body());
            }

            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}

/// Caps contact-form submissions per client
#[derive(Clone)]
pub struct ContactRateLimit {
    limiter: Arc<RateLimiter>,
    identity: ClientIdentity,
}

impl ContactRateLimit {
    pub fn new(limiter: Arc<RateLimiter>, identity: ClientIdentity) -> Self {
        Self { limiter, identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ContactRateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ContactRateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ContactRateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            identity: self.identity.clone(),
        }))
    }
}

pub struct ContactRateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    identity: ClientIdentity,
}

impl<S, B> Service<ServiceRequest> for ContactRateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if !RateLimiter::applies_to(req.method(), req.path()) {
            return Box::pin(async move {
                service.call(req).await.map(ServiceResponse::map_into_left_body)
            });
        }

        let limiter = self.limiter.clone();
        let client_id = client_id(&self.identity, &req);

        Box::pin(async move {
            match limiter.check_rate_limit(&client_id).await {
                Ok(count) => {
                    debug!("Contact submission {} from {}", count, client_id);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(e) => {
                    match &e {
                        RateLimitError::ExceededLimit => {
                            info!("Rate limit exceeded for {}", client_id);
                            increment_counter!(
                                "portfolio_requests_blocked_total",
                                "reason" => "rate_limit"
                            );
                        }
                        RateLimitError::CacheError(cause) => {
                            error!("Rate limit check failed for {}: {}", client_id, cause);
                        }
                    }
                    Ok(req.error_response(e).map_into_right_body())
                }
            }
        })
    }
}
