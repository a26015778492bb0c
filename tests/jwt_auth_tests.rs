// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session token tests against the auth middleware.
//!
//! Tokens are minted here the way the login frontend mints them, so a change
//! to the claims layout or algorithm on either side shows up as a 401.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tower::ServiceExt;
use tubesync::middleware::auth::Claims;

mod common;
use common::{create_test_app, Harness};

fn sign(claims: &Claims, key: &[u8], algorithm: Algorithm) -> String {
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(key),
    )
    .unwrap()
}

fn claims(sub: &str, exp_offset_secs: i64) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: sub.to_string(),
        iat: now as usize,
        exp: (now + exp_offset_secs) as usize,
    }
}

async fn status_for(app: Router, token: &str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .uri("/api/cache/channels")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let h = Harness::new();
    let (app, state) = create_test_app(&h);
    let token = sign(
        &claims("u1", 3600),
        &state.config.jwt_signing_key,
        Algorithm::HS256,
    );

    assert_eq!(status_for(app, &token).await, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let h = Harness::new();
    let (app, state) = create_test_app(&h);
    // Well past the default leeway.
    let token = sign(
        &claims("u1", -3600),
        &state.config.jwt_signing_key,
        Algorithm::HS256,
    );

    assert_eq!(status_for(app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_subject_is_rejected() {
    let h = Harness::new();
    let (app, state) = create_test_app(&h);
    let token = sign(
        &claims("", 3600),
        &state.config.jwt_signing_key,
        Algorithm::HS256,
    );

    assert_eq!(status_for(app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_algorithm_is_rejected() {
    let h = Harness::new();
    let (app, state) = create_test_app(&h);
    let token = sign(
        &claims("u1", 3600),
        &state.config.jwt_signing_key,
        Algorithm::HS512,
    );

    assert_eq!(status_for(app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_token_is_rejected() {
    let h = Harness::new();
    let (app, _) = create_test_app(&h);

    assert_eq!(status_for(app, "not.a.jwt").await, StatusCode::UNAUTHORIZED);
}
