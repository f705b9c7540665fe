//! Integration tests for the towers server

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use towers::common::config::{JwtConfig, TowersConfig};
use towers::functions::Dispatcher;
use towers::http::routes::{self, RouteConfig};
use towers::http::cors;
use towers::{builtin, TowersServer};

const CONFIG: &str = r#"
[server]
endpoint = "api/"
allow_origin = "https://app.example.com"
manifest_path = "/_manifest"

[auth.api_keys.reader-key]
principal = "reader"

[auth.api_keys.admin-key]
principal = "root"
rights = { admin = ["write"] }
"#;

fn load_config(contents: &str) -> TowersConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    TowersConfig::load(file.path()).unwrap()
}

fn server(config: TowersConfig) -> TowersServer {
    let mut builder = Dispatcher::builder();
    builtin::register(&mut builder).unwrap();
    TowersServer::new(config, builder).unwrap()
}

macro_rules! app {
    ($server:expr) => {{
        let server = &$server;
        test::init_service(
            App::new()
                .wrap(cors::headers(&server.config().server.allow_origin))
                .configure(routes::configure(
                    server.dispatcher(),
                    RouteConfig::from_config(&server.config().server),
                )),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_api_key_pipeline() {
    let server = server(load_config(CONFIG));
    let app = app!(server);

    // Public function, no key
    let req = test::TestRequest::get().uri("/api/ping").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://app.example.com"
    );

    // Unknown function
    let req = test::TestRequest::post().uri("/api/ghost").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body, json!({"error": "Function not found: ghost"}));

    // Missing key
    let req = test::TestRequest::get().uri("/api/whoami").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Known key
    let req = test::TestRequest::get()
        .uri("/api/whoami")
        .insert_header(("X-API-KEY", "reader-key"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["principal"], "reader");

    // Authenticated without the right
    let req = test::TestRequest::post()
        .uri("/api/admin-echo")
        .insert_header(("X-API-KEY", "reader-key"))
        .set_json(json!({"op": "drop"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body, json!({"error": "Missing permission 'write' on 'admin'"}));

    // Authenticated with the right
    let req = test::TestRequest::post()
        .uri("/api/admin-echo")
        .insert_header(("X-API-KEY", "admin-key"))
        .set_json(json!({"op": "drop"}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["body"], json!({"op": "drop"}));
    assert_eq!(body["principal"], "root");
}

#[actix_web::test]
async fn test_multipart_upload_through_server() {
    let server = server(load_config(CONFIG));
    let app = app!(server);

    let boundary = "integration-boundary";
    let payload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nquarterly\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"a.csv\"\r\nContent-Type: text/csv\r\n\r\n1,2,3\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"b.csv\"\r\nContent-Type: text/csv\r\n\r\n4,5\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header(("X-API-KEY", "reader-key"))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        ))
        .set_payload(payload)
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["count"], 2);
    assert_eq!(body["totalBytes"], 8);
    assert_eq!(body["files"][0]["contentType"], "text/csv");
}

#[actix_web::test]
async fn test_bearer_token_rights() {
    let mut config = TowersConfig::default();
    config.auth.jwt = Some(JwtConfig {
        secret: "integration-secret".into(),
        issuer: None,
        audience: "authenticated".into(),
    });
    let server = server(config);
    let app = app!(server);

    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    let token = |rights: serde_json::Value| {
        encode(
            &Header::default(),
            &json!({"sub": "u-1", "aud": "authenticated", "exp": exp, "rights": rights}),
            &EncodingKey::from_secret(b"integration-secret"),
        )
        .unwrap()
    };

    let req = test::TestRequest::get()
        .uri("/functions/admin-echo?x=1")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token(json!({"admin": ["*"]})))))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["body"], json!({"x": "1"}));
    assert_eq!(body["principal"], "u-1");

    let req = test::TestRequest::get()
        .uri("/functions/admin-echo")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token(json!({"admin": ["read"]})))))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/functions/admin-echo")
        .insert_header((header::AUTHORIZATION, "Bearer not-a-token"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_manifest_lists_builtin_functions() {
    let server = server(load_config(CONFIG));
    let app = app!(server);

    let req = test::TestRequest::get().uri("/_manifest").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let functions = body.as_array().unwrap();
    let names: Vec<_> = functions.iter().map(|f| f["name"].as_str().unwrap()).collect();

    assert_eq!(names, vec!["admin-echo", "echo", "ping", "upload", "whoami"]);
    assert_eq!(functions[0]["rights"], json!({"admin": ["write"]}));
    assert_eq!(functions[2]["auth"], false);
    assert_eq!(functions[3]["maxFiles"], builtin::MAX_UPLOAD_FILES);
}

#[actix_web::test]
async fn test_root_mount() {
    let mut config = TowersConfig::default();
    config.server.endpoint = "/".into();
    let server = server(config);
    let app = app!(server);

    let req = test::TestRequest::get().uri("/ping").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"message": "pong"}));

    let req = test::TestRequest::get().uri("/functions/ping").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
