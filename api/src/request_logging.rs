use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::{
    Error,
    body::MessageBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::HeaderMap,
};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

/// Middleware opening one span per request, tagged with a fresh request id, and logging
/// the request start and completion.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();

        let span = tracing::info_span!(
            "HTTP request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.path(),
            user_agent = %header(req.headers(), "user-agent"),
            remote_addr = %req.connection_info().peer_addr().unwrap_or("unknown"),
        );

        {
            let _enter = span.enter();
            info!("HTTP request received");
        }

        let fut = self.service.call(req);

        Box::pin(
            async move {
                let res = fut.await;
                let duration = start_time.elapsed();

                match res {
                    Ok(response) => {
                        info!(
                            status_code = response.status().as_u16(),
                            duration_ms = duration.as_millis() as u64,
                            "HTTP request completed"
                        );

                        Ok(response)
                    }
                    Err(error) => {
                        warn!(
                            %error,
                            duration_ms = duration.as_millis() as u64,
                            "HTTP request completed with error"
                        );

                        Err(error)
                    }
                }
            }
            .instrument(span),
        )
    }
}
