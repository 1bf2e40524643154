mod common;

use actix_web::{test, web, App};
use chat_relay_service::routes;
use chat_relay_service::websocket::RoomId;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn sign(secret: &str, sub: &str) -> String {
    let claims = TestClaims {
        sub: sub.into(),
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[actix_rt::test]
async fn handshake_fails_closed_without_credential() {
    let (state, _store) = common::test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(routes::wsroute::ws_handler),
    )
    .await;

    let req = test::TestRequest::get().uri("/ws").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_rt::test]
async fn handshake_rejects_malformed_and_forged_credentials() {
    let (state, _store) = common::test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(routes::wsroute::ws_handler),
    )
    .await;

    // Structurally invalid: not three segments.
    let req = test::TestRequest::get()
        .uri("/ws?token=garbage")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    // Signed with the wrong secret.
    let forged = sign("wrong-secret", &Uuid::new_v4().to_string());
    let req = test::TestRequest::get()
        .uri("/ws")
        .insert_header(("Authorization", format!("Bearer {forged}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_rt::test]
async fn failed_upgrade_registers_no_session_state() {
    let (state, _store) = common::test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(routes::wsroute::ws_handler),
    )
    .await;

    // Authenticated, but a plain GET with no upgrade headers: the WebSocket
    // handshake is refused after authentication succeeds.
    let user = Uuid::new_v4();
    let token = sign("test-secret", &user.to_string());
    let req = test::TestRequest::get()
        .uri(&format!("/ws?token={token}"))
        .to_request();
    let _ = test::try_call_service(&app, req).await;

    assert_eq!(
        state.registry.member_count(RoomId::User(user)).await,
        0,
        "a refused upgrade must leave no session behind"
    );
}

#[actix_rt::test]
async fn valid_credential_passes_authentication() {
    let (state, _store) = common::test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(routes::wsroute::ws_handler),
    )
    .await;

    // A well-signed token clears authentication; the request then fails the
    // WebSocket upgrade (no upgrade headers here), which is not a 401.
    let token = sign("test-secret", &Uuid::new_v4().to_string());
    let req = test::TestRequest::get()
        .uri(&format!("/ws?token={token}"))
        .to_request();
    let resp = test::try_call_service(&app, req).await;
    match resp {
        Ok(resp) => assert_ne!(resp.status().as_u16(), 401),
        Err(e) => assert_ne!(e.as_response_error().status_code().as_u16(), 401),
    }
}
