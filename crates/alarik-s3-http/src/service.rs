//! The hyper service: request pipeline from socket to handler.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, warn};

use alarik_s3_auth::error::AuthError;
use alarik_s3_auth::{CredentialProvider, chunked, hash_payload, verify_sigv4};
use alarik_s3_core::{AlarikS3, AuthContext};
use alarik_s3_model::error::{S3Error, S3ErrorCode};

use crate::admin;
use crate::body::ResponseBody;
use crate::dispatch::dispatch;
use crate::response::{add_common_headers, error_response};
use crate::router::S3Router;

/// HTTP-layer configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base domain for virtual-hosted-style addressing.
    pub domain: String,
    /// Whether virtual hosting is honored.
    pub virtual_hosting: bool,
    /// Secret for admin bearer tokens.
    pub jwt_secret: String,
    /// Per-request wall-clock deadline, body transfer included.
    pub request_timeout: Duration,
}

/// The Alarik HTTP service.
pub struct AlarikHttpService {
    s3: Arc<AlarikS3>,
    credentials: Arc<dyn CredentialProvider>,
    router: S3Router,
    config: Arc<HttpConfig>,
}

impl std::fmt::Debug for AlarikHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarikHttpService")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Clone for AlarikHttpService {
    fn clone(&self) -> Self {
        Self {
            s3: Arc::clone(&self.s3),
            credentials: Arc::clone(&self.credentials),
            router: self.router.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl AlarikHttpService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        s3: Arc<AlarikS3>,
        credentials: Arc<dyn CredentialProvider>,
        config: HttpConfig,
    ) -> Self {
        let router = S3Router::new(&config.domain, config.virtual_hosting);
        Self {
            s3,
            credentials,
            router,
            config: Arc::new(config),
        }
    }
}

impl Service<http::Request<Incoming>> for AlarikHttpService {
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let request_id = alarik_s3_core::utils::generate_request_id();
            let method = req.method().clone();
            let timeout = service.config.request_timeout;

            let response =
                match tokio::time::timeout(timeout, service.process(req, &request_id)).await {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(request_id = %request_id, "request exceeded deadline");
                        error_response(
                            &S3Error::internal("Request deadline exceeded"),
                            &request_id,
                        )
                    }
                };

            let mut response = add_common_headers(response, &request_id);
            // HEAD responses carry headers only, even for errors.
            if method == http::Method::HEAD {
                *response.body_mut() = ResponseBody::empty();
            }
            Ok(response)
        })
    }
}

impl AlarikHttpService {
    async fn process(
        &self,
        req: http::Request<Incoming>,
        request_id: &str,
    ) -> http::Response<ResponseBody> {
        let path = req.uri().path().to_owned();

        // Admin JSON routes live on their own prefix with their own
        // error envelope.
        if path.starts_with("/api/v1/") {
            return admin::handle(&self.s3, &self.config.jwt_secret, req, request_id).await;
        }

        // Route before reading the body; routing only needs the head.
        let ctx = match self.router.resolve(&req) {
            Ok(ctx) => ctx,
            Err(err) => {
                debug!(path, error = %err, request_id, "failed to route request");
                return error_response(&err, request_id);
            }
        };

        let (parts, incoming) = req.into_parts();
        let body = match incoming.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                // Client went away or the stream broke mid-transfer;
                // nothing has been committed at this point.
                debug!(error = %e, request_id, "failed to read request body");
                return error_response(
                    &S3Error::internal("Failed to read request body"),
                    request_id,
                );
            }
        };

        match self.authenticate(&parts, body).await {
            Ok((auth, body)) => {
                match dispatch(&self.s3, &auth, &ctx, &parts, body, request_id).await {
                    Ok(response) => response,
                    Err(err) => {
                        debug!(
                            operation = %ctx.operation,
                            error = %err,
                            request_id,
                            "operation failed"
                        );
                        error_response(&err, request_id)
                    }
                }
            }
            Err(err) => {
                warn!(error = %err.message, request_id, "authentication failed");
                error_response(&err, request_id)
            }
        }
    }

    /// Verify the request signature and, for `aws-chunked` payloads,
    /// verify and strip the chunk framing.
    async fn authenticate(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
    ) -> Result<(AuthContext, Bytes), S3Error> {
        let body_hash = hash_payload(&body);
        let auth = verify_sigv4(parts, &body_hash, self.credentials.as_ref(), Utc::now())
            .map_err(map_auth_error)?;

        let body = if auth.is_streaming() {
            chunked::verify_and_decode(&body, &auth).map_err(map_auth_error)?
        } else {
            body
        };

        Ok((
            AuthContext {
                user_id: auth.user_id,
                is_admin: false,
            },
            body,
        ))
    }
}

/// Map authentication failures onto the S3 error taxonomy.
fn map_auth_error(err: AuthError) -> S3Error {
    let code = match &err {
        AuthError::MissingAuthHeader | AuthError::ExpiredAccessKey(_) | AuthError::InvalidToken => {
            S3ErrorCode::AccessDenied
        }
        AuthError::MalformedAuthHeader
        | AuthError::UnsupportedAlgorithm(_)
        | AuthError::InvalidCredentialScope
        | AuthError::MissingHeader(_) => S3ErrorCode::AuthorizationHeaderMalformed,
        AuthError::UnknownAccessKey(_) => S3ErrorCode::InvalidAccessKeyId,
        AuthError::SignatureMismatch | AuthError::InvalidChunk(_) => {
            S3ErrorCode::SignatureDoesNotMatch
        }
        AuthError::TimeTooSkewed(_) => S3ErrorCode::RequestTimeTooSkewed,
    };
    S3Error::with_message(code, err.to_string())
}
