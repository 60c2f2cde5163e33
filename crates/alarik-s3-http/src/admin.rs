//! The admin JSON API consumed by the management console.
//!
//! All routes live under `/api/v1/`. Errors use the JSON envelope
//! `{"reason": "..."}`. Apart from login, every route requires a
//! bearer token whose claims carry the admin flag.

use std::collections::HashSet;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use alarik_core::types::AccessKey;
use alarik_s3_auth::token::{TokenClaims, issue_token, verify_token};
use alarik_s3_core::{AlarikS3, AuthContext};

use crate::body::ResponseBody;

/// Characters allowed in an access key id.
const ACCESS_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed prefix of generated access key ids.
const ACCESS_KEY_PREFIX: &str = "AKIA";

/// Default page size for the user listing.
const DEFAULT_PER_PAGE: u64 = 20;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct UserView {
    id: i64,
    username: String,
    #[serde(rename = "isAdmin")]
    is_admin: bool,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

impl From<alarik_core::types::User> for UserView {
    fn from(user: alarik_core::types::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct UserPageView {
    users: Vec<UserView>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(rename = "isAdmin", default)]
    is_admin: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    id: i64,
    username: Option<String>,
    password: Option<String>,
    #[serde(rename = "isAdmin")]
    is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CreateAccessKeyRequest {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct AccessKeyCreatedView {
    #[serde(rename = "accessKeyId")]
    access_key_id: String,
    /// Returned exactly once, at creation.
    #[serde(rename = "secretKey")]
    secret_key: String,
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct AccessKeyView {
    #[serde(rename = "accessKeyId")]
    access_key_id: String,
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StorageStatsView {
    #[serde(rename = "totalBytes")]
    total_bytes: u64,
    #[serde(rename = "availableBytes")]
    available_bytes: u64,
    #[serde(rename = "usedBytes")]
    used_bytes: u64,
    #[serde(rename = "alarikUsedBytes")]
    alarik_used_bytes: u64,
    #[serde(rename = "bucketCount")]
    bucket_count: u64,
    #[serde(rename = "userCount")]
    user_count: u64,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Handle an admin-API request. Never panics; every failure becomes a
/// JSON error envelope.
pub async fn handle(
    s3: &AlarikS3,
    jwt_secret: &str,
    req: http::Request<Incoming>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();

    let (parts, incoming) = req.into_parts();
    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, request_id, "failed to read admin request body");
            return json_error(StatusCode::BAD_REQUEST, "failed to read request body");
        }
    };

    // Login is the only route that works without a token.
    if method == Method::POST && path == "/api/v1/auth/login" {
        return login(s3, jwt_secret, &body);
    }

    let claims = match bearer_claims(&parts.headers, jwt_secret) {
        Ok(claims) => claims,
        Err(response) => return *response,
    };
    if !claims.admin {
        return json_error(StatusCode::FORBIDDEN, "admin privileges required");
    }

    let segments: Vec<&str> = path
        .trim_start_matches("/api/v1/admin")
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (method, segments.as_slice()) {
        (Method::GET, ["users"]) => list_users(s3, &query),
        (Method::POST, ["users"]) => create_user(s3, &body),
        (Method::PUT, ["users"]) => update_user(s3, &body),
        (Method::DELETE, ["users", id]) => delete_user(s3, &claims, id).await,
        (Method::DELETE, ["buckets", name]) => force_delete_bucket(s3, &claims, name).await,
        (Method::GET, ["storageStats"]) => storage_stats(s3).await,
        (Method::GET, ["accessKeys"]) => list_access_keys(s3, &query),
        (Method::POST, ["accessKeys"]) => create_access_key(s3, &body),
        (Method::DELETE, ["accessKeys", id]) => delete_access_key(s3, id),
        _ => json_error(StatusCode::NOT_FOUND, "unknown admin route"),
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn login(s3: &AlarikS3, jwt_secret: &str, body: &Bytes) -> http::Response<ResponseBody> {
    let Ok(request) = serde_json::from_slice::<LoginRequest>(body) else {
        return json_error(StatusCode::BAD_REQUEST, "malformed login request");
    };

    let user = match s3.store().user_by_name(&request.username) {
        Ok(Some(user)) => user,
        Ok(None) => return json_error(StatusCode::UNAUTHORIZED, "invalid credentials"),
        Err(e) => {
            warn!(error = %e, "login lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login failed");
        }
    };

    if !bcrypt::verify(&request.password, &user.password_hash).unwrap_or(false) {
        return json_error(StatusCode::UNAUTHORIZED, "invalid credentials");
    }

    match issue_token(jwt_secret, user.id, user.is_admin) {
        Ok(token) => {
            info!(user = %user.username, "console login");
            json_response(StatusCode::OK, &LoginResponse { token })
        }
        Err(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to issue token"),
    }
}

fn bearer_claims(
    headers: &http::HeaderMap,
    jwt_secret: &str,
) -> Result<TokenClaims, Box<http::Response<ResponseBody>>> {
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            Box::new(json_error(
                StatusCode::UNAUTHORIZED,
                "missing bearer token",
            ))
        })?;

    verify_token(jwt_secret, token)
        .map_err(|_| Box::new(json_error(StatusCode::UNAUTHORIZED, "invalid bearer token")))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn list_users(s3: &AlarikS3, query: &str) -> http::Response<ResponseBody> {
    let page = query_u64(query, "page").unwrap_or(1).max(1);
    let per_page = query_u64(query, "perPage")
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, 1000);

    match s3.store().list_users(per_page, (page - 1) * per_page) {
        Ok(page) => json_response(
            StatusCode::OK,
            &UserPageView {
                users: page.users.into_iter().map(UserView::from).collect(),
                total: page.total,
            },
        ),
        Err(e) => {
            warn!(error = %e, "user listing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "user listing failed")
        }
    }
}

fn create_user(s3: &AlarikS3, body: &Bytes) -> http::Response<ResponseBody> {
    let Ok(request) = serde_json::from_slice::<CreateUserRequest>(body) else {
        return json_error(StatusCode::BAD_REQUEST, "malformed user request");
    };
    if request.username.is_empty() || request.password.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "username and password are required");
    }

    match s3
        .store()
        .create_user(&request.username, &request.password, request.is_admin)
    {
        Ok(user) => {
            info!(user = %user.username, is_admin = user.is_admin, "created user");
            json_response(StatusCode::CREATED, &UserView::from(user))
        }
        Err(alarik_core::MetadataError::AlreadyExists { .. }) => {
            json_error(StatusCode::CONFLICT, "username is taken")
        }
        Err(e) => {
            warn!(error = %e, "user creation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "user creation failed")
        }
    }
}

fn update_user(s3: &AlarikS3, body: &Bytes) -> http::Response<ResponseBody> {
    let Ok(request) = serde_json::from_slice::<UpdateUserRequest>(body) else {
        return json_error(StatusCode::BAD_REQUEST, "malformed user request");
    };

    match s3.store().update_user(
        request.id,
        request.username.as_deref(),
        request.password.as_deref(),
        request.is_admin,
    ) {
        Ok(user) => json_response(StatusCode::OK, &UserView::from(user)),
        Err(alarik_core::MetadataError::NotFound { .. }) => {
            json_error(StatusCode::NOT_FOUND, "user not found")
        }
        Err(e) => {
            warn!(error = %e, "user update failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "user update failed")
        }
    }
}

async fn delete_user(
    s3: &AlarikS3,
    claims: &TokenClaims,
    raw_id: &str,
) -> http::Response<ResponseBody> {
    let Ok(id) = raw_id.parse::<i64>() else {
        return json_error(StatusCode::BAD_REQUEST, "user id must be numeric");
    };
    if id == claims.sub {
        return json_error(StatusCode::FORBIDDEN, "deleting your own account is not allowed");
    }

    let (buckets, keys) = match s3.store().delete_user_cascade(id) {
        Ok(removed) => removed,
        Err(alarik_core::MetadataError::NotFound { .. }) => {
            return json_error(StatusCode::NOT_FOUND, "user not found");
        }
        Err(e) => {
            warn!(error = %e, "user delete failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "user delete failed");
        }
    };

    // Metadata is gone; now evict caches and wipe storage.
    s3.cache().remove_user(id);
    for key in &keys {
        s3.cache().remove_key(key);
    }
    for bucket in &buckets {
        s3.cache().remove_bucket(bucket);
        if let Err(e) = s3.fs().remove_bucket_dir(bucket).await {
            warn!(bucket = %bucket, error = %e, "failed to remove bucket directory during cascade");
        }
    }

    info!(
        user_id = id,
        buckets = buckets.len(),
        access_keys = keys.len(),
        "deleted user with cascade"
    );
    no_content()
}

// ---------------------------------------------------------------------------
// Buckets / stats
// ---------------------------------------------------------------------------

async fn force_delete_bucket(
    s3: &AlarikS3,
    claims: &TokenClaims,
    name: &str,
) -> http::Response<ResponseBody> {
    let auth = AuthContext {
        user_id: claims.sub,
        is_admin: true,
    };
    match s3.delete_bucket(&auth, name, true).await {
        Ok(()) => no_content(),
        Err(err) if err.code == alarik_s3_model::S3ErrorCode::NoSuchBucket => {
            json_error(StatusCode::NOT_FOUND, "bucket not found")
        }
        Err(err) => {
            warn!(bucket = name, error = %err, "force delete failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "bucket delete failed")
        }
    }
}

async fn storage_stats(s3: &AlarikS3) -> http::Response<ResponseBody> {
    let (total_bytes, available_bytes) = match s3.fs().filesystem_stats() {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "statvfs failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage stats failed");
        }
    };
    let alarik_used_bytes = match s3.fs().disk_usage().await {
        Ok(used) => used,
        Err(e) => {
            warn!(error = %e, "disk usage walk failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage stats failed");
        }
    };
    let (bucket_count, user_count) =
        match (s3.store().count_buckets(), s3.store().count_users()) {
            (Ok(buckets), Ok(users)) => (buckets, users),
            _ => return json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage stats failed"),
        };

    json_response(
        StatusCode::OK,
        &StorageStatsView {
            total_bytes,
            available_bytes,
            used_bytes: total_bytes.saturating_sub(available_bytes),
            alarik_used_bytes,
            bucket_count,
            user_count,
        },
    )
}

// ---------------------------------------------------------------------------
// Access keys
// ---------------------------------------------------------------------------

fn list_access_keys(s3: &AlarikS3, query: &str) -> http::Response<ResponseBody> {
    let user_id = query_u64(query, "userId").map(|v| v as i64);
    match s3.store().all_access_keys() {
        Ok(keys) => {
            let views: Vec<AccessKeyView> = keys
                .into_iter()
                .filter(|k| user_id.is_none_or(|id| k.user_id == id))
                .map(|k| AccessKeyView {
                    access_key_id: k.access_key_id,
                    user_id: k.user_id,
                    expires_at: k.expires_at,
                })
                .collect();
            json_response(StatusCode::OK, &views)
        }
        Err(e) => {
            warn!(error = %e, "access key listing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "access key listing failed")
        }
    }
}

fn create_access_key(s3: &AlarikS3, body: &Bytes) -> http::Response<ResponseBody> {
    let Ok(request) = serde_json::from_slice::<CreateAccessKeyRequest>(body) else {
        return json_error(StatusCode::BAD_REQUEST, "malformed access key request");
    };

    let owner = match s3.store().user_by_id(request.user_id) {
        Ok(Some(user)) => user,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => {
            warn!(error = %e, "access key owner lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "access key creation failed");
        }
    };

    let key = AccessKey {
        access_key_id: generate_access_key_id(),
        secret_key: generate_secret_key(),
        user_id: owner.id,
        expires_at: request.expires_at,
    };

    if let Err(e) = s3.store().create_access_key(&key) {
        warn!(error = %e, "access key insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "access key creation failed");
    }

    // Seed the cache with the owner's buckets, so the new key works on
    // its next request without a metadata hit.
    let owned: HashSet<String> = s3
        .store()
        .list_buckets(Some(owner.id))
        .map(|buckets| buckets.into_iter().map(|b| b.name).collect())
        .unwrap_or_default();
    s3.cache().insert_key_with_buckets(&key, owned);

    info!(access_key_id = %key.access_key_id, user_id = owner.id, "created access key");
    json_response(
        StatusCode::CREATED,
        &AccessKeyCreatedView {
            access_key_id: key.access_key_id,
            secret_key: key.secret_key,
            user_id: key.user_id,
            expires_at: key.expires_at,
        },
    )
}

fn delete_access_key(s3: &AlarikS3, access_key_id: &str) -> http::Response<ResponseBody> {
    match s3.store().delete_access_key(access_key_id) {
        Ok(()) => {
            s3.cache().remove_key(access_key_id);
            no_content()
        }
        Err(alarik_core::MetadataError::NotFound { .. }) => {
            json_error(StatusCode::NOT_FOUND, "access key not found")
        }
        Err(e) => {
            warn!(error = %e, "access key delete failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "access key delete failed")
        }
    }
}

/// Generate a 20-character access key id (`AKIA` + 16 random chars).
fn generate_access_key_id() -> String {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(20);
    id.push_str(ACCESS_KEY_PREFIX);
    for _ in 0..16 {
        let idx = rng.random_range(0..ACCESS_KEY_CHARSET.len());
        id.push(ACCESS_KEY_CHARSET[idx] as char);
    }
    id
}

/// Generate a 40-character secret key.
fn generate_secret_key() -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut rng = rand::rng();
    (0..40)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON plumbing
// ---------------------------------------------------------------------------

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> http::Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(json) => http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(ResponseBody::from_bytes(json))
            .unwrap_or_else(|_| fallback_500()),
        Err(e) => {
            warn!(error = %e, "JSON serialization failed");
            fallback_500()
        }
    }
}

fn json_error(status: StatusCode, reason: &str) -> http::Response<ResponseBody> {
    let body = serde_json::json!({ "reason": reason }).to_string();
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(ResponseBody::from_bytes(body))
        .unwrap_or_else(|_| fallback_500())
}

fn no_content() -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(ResponseBody::empty())
        .unwrap_or_else(|_| fallback_500())
}

fn fallback_500() -> http::Response<ResponseBody> {
    let mut response = http::Response::new(ResponseBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn query_u64(query: &str, name: &str) -> Option<u64> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .and_then(|(_, v)| v.parse().ok())
}
