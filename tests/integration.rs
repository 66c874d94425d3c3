use axum::{
  body::Body,
  http::{header, Request, StatusCode},
  Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use rusty_stash::{config, http, storage};
use std::io::Cursor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

const BOUNDARY: &str = "rusty-stash-test-boundary";

fn app_config(max_body_size_mb: usize) -> config::AppConfig {
  config::AppConfig {
    listen: "127.0.0.1:0".to_string(),
    metrics_listen: "127.0.0.1:0".to_string(),
    max_body_size_mb,
    enable_openapi: Some(true),
  }
}

fn bootstrap_with(storage_client: Arc<dyn storage::Storage>) -> Router {
  http::router(&app_config(10), http::AppState::new(storage_client)).expect("failed creating router")
}

fn bootstrap() -> (Router, Arc<storage::memory::Client>) {
  let store = Arc::new(storage::memory::Client::new());
  (bootstrap_with(store.clone()), store)
}

fn png_fixture(width: u32, height: u32) -> Vec<u8> {
  let img = RgbaImage::from_fn(width, height, |x, y| {
    Rgba([(x * 2) as u8, (y * 5) as u8, 128, (255 - x) as u8])
  });
  let mut out = Cursor::new(Vec::new());
  DynamicImage::ImageRgba8(img)
    .write_to(&mut out, ImageFormat::Png)
    .unwrap();
  out.into_inner()
}

fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
  let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255])))
    .to_rgb8();
  let mut out = Vec::new();
  JpegEncoder::new_with_quality(&mut out, 90)
    .encode_image(&img)
    .unwrap();
  out
}

fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

  Request::builder()
    .method("POST")
    .uri("/upload")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(body))
    .unwrap()
}

async fn upload(router: &Router, data: &[u8]) -> (StatusCode, String) {
  let response = router
    .clone()
    .oneshot(multipart_request(http::UPLOAD_FIELD, data))
    .await
    .unwrap();

  let status = response.status();
  let body = response.into_body().collect().await.unwrap().to_bytes();
  (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Bytes) {
  let response = router
    .clone()
    .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
    .await
    .unwrap();

  let status = response.status();
  let content_type = response
    .headers()
    .get(header::CONTENT_TYPE)
    .map(|v| v.to_str().unwrap().to_owned());
  let body = response.into_body().collect().await.unwrap().to_bytes();
  (status, content_type, body)
}

fn id_from_link(body: &str) -> String {
  let start = body.find("href=\"/").expect("no link in response") + "href=\"/".len();
  let end = start + body[start..].find('"').unwrap();
  let id = body[start..end].to_owned();
  assert_eq!(body, format!(r#"<a href="/{id}">{id}</a>"#));
  id
}

#[tokio::test]
async fn png_upload_is_served_as_jpeg() {
  let (router, store) = bootstrap();

  let (status, body) = upload(&router, &png_fixture(100, 50)).await;
  assert_eq!(status, StatusCode::OK);

  let id = id_from_link(&body);
  assert_eq!(id.len(), 64);
  assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
  assert_eq!(store.len().await, 1);

  let (status, content_type, data) = get(&router, &format!("/{}", id)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(content_type.as_deref(), Some("image/jpeg"));

  let decoded = image::load_from_memory_with_format(&data, ImageFormat::Jpeg).unwrap();
  assert_eq!(decoded.dimensions(), (100, 50));
}

#[tokio::test]
async fn repeated_upload_returns_same_id() {
  let (router, store) = bootstrap();
  let png = png_fixture(100, 50);

  let (_, first) = upload(&router, &png).await;
  let first = id_from_link(&first);
  let (_, _, stored_first) = get(&router, &format!("/{}", first)).await;

  let (status, second) = upload(&router, &png).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(id_from_link(&second), first);

  // One object, untouched by the second write
  assert_eq!(store.len().await, 1);
  let (_, _, stored_second) = get(&router, &format!("/{}", first)).await;
  assert_eq!(stored_first, stored_second);
}

#[tokio::test]
async fn jpeg_upload_is_stored_verbatim() {
  let dir = tempfile::tempdir().unwrap();
  let router = bootstrap_with(Arc::new(storage::local::Client::new(dir.path().to_path_buf())));
  let jpeg = jpeg_fixture(40, 30);

  let (status, body) = upload(&router, &jpeg).await;
  assert_eq!(status, StatusCode::OK);
  let id = id_from_link(&body);

  let (status, _, data) = get(&router, &format!("/{}", id)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(data.len(), jpeg.len());
  assert_eq!(data, jpeg);

  let on_disk = std::fs::read(dir.path().join(format!("{}.jpeg", id))).unwrap();
  assert_eq!(on_disk, jpeg);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
  let (router, store) = bootstrap();

  let (status, _, _) = get(&router, "/doesnotexist").await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let well_formed = "0".repeat(64);
  let (status, _, _) = get(&router, &format!("/{}", well_formed)).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  assert!(store.is_empty().await);
}

#[tokio::test]
async fn traversal_attempt_is_not_found() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  std::fs::create_dir_all(&images).unwrap();
  std::fs::write(dir.path().join("secret.jpeg"), b"outside the store").unwrap();
  let router = bootstrap_with(Arc::new(storage::local::Client::new(images)));

  let (status, _, body) = get(&router, "/..%2Fsecret").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_ne!(&body[..], b"outside the store");
}

#[tokio::test]
async fn corrupt_png_is_server_error() {
  let (router, store) = bootstrap();

  let png = png_fixture(100, 50);
  let idat = png.windows(4).position(|w| w == b"IDAT").unwrap();
  let (status, body) = upload(&router, &png[..idat + 12]).await;

  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert!(body.starts_with("failed to decode image"), "{}", body);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn text_upload_is_rejected() {
  let (router, store) = bootstrap();

  let (status, body) = upload(&router, b"definitely not an image\n").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body.contains("unsupported image format"), "{}", body);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn missing_file_field_is_bad_request() {
  let (router, store) = bootstrap();

  let response = router
    .clone()
    .oneshot(multipart_request("picture", &png_fixture(4, 4)))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn non_multipart_upload_is_bad_request() {
  let (router, _) = bootstrap();

  let response = router
    .clone()
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
  let store = Arc::new(storage::memory::Client::new());
  let router = http::router(&app_config(1), http::AppState::new(store.clone())).unwrap();

  let response = router
    .oneshot(multipart_request(http::UPLOAD_FIELD, &vec![0u8; 2 * 1024 * 1024]))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn index_and_openapi() {
  let (router, _) = bootstrap();

  let (status, content_type, body) = get(&router, "/").await;
  assert_eq!(status, StatusCode::OK);
  assert!(content_type.unwrap().starts_with("text/html"));
  assert!(String::from_utf8_lossy(&body).contains("name=\"file\""));

  let (status, _, body) = get(&router, "/api-docs/openapi.json").await;
  assert_eq!(status, StatusCode::OK);
  let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
  assert!(doc["paths"]["/upload"]["post"].is_object());
  assert!(doc["paths"]["/{id}"]["get"].is_object());
}

#[tokio::test]
async fn favicon_is_served() {
  let (router, store) = bootstrap();

  let (status, content_type, body) = get(&router, "/favicon.ico").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(content_type.as_deref(), Some("image/png"));
  let icon = image::load_from_memory_with_format(&body, ImageFormat::Png).unwrap();
  assert_eq!(icon.dimensions(), (16, 16));
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn png_with_broken_header_is_rejected_as_unsupported() {
  let (router, store) = bootstrap();

  // Valid signature and IHDR chunk frame, nonsense header fields
  let mut png = png_fixture(100, 50);
  png[16..29].copy_from_slice(&[0u8; 13]);
  let (status, body) = upload(&router, &png).await;

  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body.contains("unsupported image format"), "{}", body);
  assert!(store.is_empty().await);
}

#[test]
fn overflowing_body_limit_fails_router() {
  let store = Arc::new(storage::memory::Client::new());
  let res = http::router(&app_config(usize::MAX), http::AppState::new(store));
  assert!(res.is_err());
}

#[tokio::test]
async fn upload_over_http() {
  let (router, _) = bootstrap();

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });

  let file_part = reqwest::multipart::Part::bytes(png_fixture(100, 50))
    .file_name("pixels.png")
    .mime_str("image/png")
    .unwrap();
  let form = reqwest::multipart::Form::new().part(http::UPLOAD_FIELD, file_part);

  let client = reqwest::Client::new();
  let response = client
    .post(format!("http://{}/upload", addr))
    .multipart(form)
    .send()
    .await
    .expect("failed to send request");

  assert_eq!(response.status(), reqwest::StatusCode::OK);
  assert_eq!(
    response.headers()[reqwest::header::CONTENT_TYPE],
    "text/html; charset=utf-8"
  );
  let id = id_from_link(&response.text().await.unwrap());

  let fetched = client
    .get(format!("http://{}/{}", addr, id))
    .send()
    .await
    .unwrap();
  assert_eq!(fetched.status(), reqwest::StatusCode::OK);
  assert_eq!(fetched.headers()[reqwest::header::CONTENT_TYPE], "image/jpeg");

  let data = fetched.bytes().await.unwrap();
  let decoded = image::load_from_memory(&data).unwrap();
  assert_eq!(decoded.dimensions(), (100, 50));
}
