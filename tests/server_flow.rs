//! End-to-end flows: the client stack driving a live catalog server over
//! real HTTP. Each test spawns its own server on an ephemeral port with a
//! fresh database and payload directory.

use bytes::Bytes;
use fileshelf::{
    ShelfSession,
    catalog::{CatalogError, CatalogService, RestCatalog},
    config::UploadPolicy,
    handlers::ServerState,
    key::KeyCodec,
    routes,
    services::{
        hierarchy_cache::ScopeListing, presign::UrlSigner, store::StoreService,
        transfer_broker::TransferError,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn spawn_server() -> (String, TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let tmp = TempDir::new().unwrap();
    let objects_dir = tmp.path().join("objects");
    std::fs::create_dir_all(&objects_dir).unwrap();
    let options = SqliteConnectOptions::new()
        .filename(tmp.path().join("meta.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap();
    StoreService::migrate(&pool).await.unwrap();

    let codec = KeyCodec::default();
    let state = ServerState {
        store: StoreService::new(Arc::new(pool), objects_dir, codec.clone()),
        signer: UrlSigner::new(b"e2e-secret".to_vec(), base_url.clone(), 300),
        policy: UploadPolicy::default(),
        codec,
    };
    let app = routes::routes::routes().with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, tmp)
}

fn client_session(base_url: &str) -> ShelfSession {
    let codec = KeyCodec::default();
    let catalog: Arc<dyn CatalogService> = Arc::new(RestCatalog::new(base_url, codec.clone()));
    ShelfSession::new(catalog, codec, UploadPolicy::default())
}

async fn upload(session: &ShelfSession, field: &str, category: &str, filename: &str, body: &str) {
    session
        .broker
        .upload(
            field,
            category,
            filename,
            "application/pdf",
            Bytes::from(body.to_string()),
            |_| {},
        )
        .await
        .unwrap();
}

fn names(listing: &ScopeListing) -> Vec<String> {
    match listing {
        ScopeListing::Names(names) => names.to_vec(),
        ScopeListing::Files(files) => files.iter().map(|f| f.filename.clone()).collect(),
    }
}

#[tokio::test]
async fn upload_browse_download_round_trip() {
    let (base_url, _tmp) = spawn_server().await;
    let mut session = client_session(&base_url);

    // Big enough for several progress chunks.
    let payload = Bytes::from(vec![0xAB; 200 * 1024]);
    let progress: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let transfer = session
        .broker
        .upload(
            "IT",
            "Linux Notes",
            "setup.pdf",
            "application/pdf",
            payload.clone(),
            move |percent| sink.lock().unwrap().push(percent),
        )
        .await
        .unwrap();
    assert_eq!(transfer.key, "uploadedfiles/IT/Linux Notes/setup.pdf");

    let progress = progress.lock().unwrap().clone();
    assert!(!progress.is_empty());
    assert_eq!(*progress.last().unwrap(), 100);
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));

    upload(&session, "IT", "Linux Notes", "report.docx", "quarterly report").await;

    // Browse down the hierarchy the way a UI driver would.
    assert!(session.navigator.load(&session.cache).await.unwrap());
    assert_eq!(names(session.navigator.visible().unwrap()), vec!["IT"]);

    session.navigator.select_field("IT");
    assert!(session.navigator.load(&session.cache).await.unwrap());
    assert_eq!(
        names(session.navigator.visible().unwrap()),
        vec!["Linux Notes"]
    );

    session.navigator.select_category("Linux Notes").unwrap();
    assert!(session.navigator.load(&session.cache).await.unwrap());
    match session.navigator.visible().unwrap() {
        ScopeListing::Files(files) => {
            // Server sorts by lowercase filename.
            let filenames: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
            assert_eq!(filenames, vec!["report.docx", "setup.pdf"]);
            assert_eq!(files[1].size, Some(payload.len() as i64));
            assert!(files[0].last_modified.is_some());
        }
        ScopeListing::Names(_) => panic!("file listing expected"),
    }

    // Round-trip the big payload back down.
    let download = session
        .broker
        .request_download("IT", "Linux Notes", "setup.pdf")
        .await
        .unwrap();
    let bytes = session.broker.perform_download(&download).await.unwrap();
    assert_eq!(bytes, payload);
}

#[tokio::test]
async fn search_scopes_widen_from_category_to_global() {
    let (base_url, _tmp) = spawn_server().await;
    let session = client_session(&base_url);

    upload(&session, "IT", "Linux Notes", "report.docx", "it linux").await;
    upload(&session, "IT", "Security", "Incident Report.pdf", "it sec").await;
    upload(&session, "HR", "Payroll", "annual-report.pdf", "hr pay").await;
    upload(&session, "HR", "Payroll", "roster.pdf", "hr roster").await;

    let category_hits = session
        .search
        .search_category("IT", "Linux Notes", "report")
        .await
        .unwrap();
    assert_eq!(category_hits.len(), 1);
    assert_eq!(category_hits[0].filename, "report.docx");

    let field_hits = session.search.search_field("IT", "report").await.unwrap();
    assert_eq!(field_hits.len(), 2);

    // Case-insensitive, and the widest scope sees every match.
    let global_hits = session.search.search_global("REPORT").await.unwrap();
    assert_eq!(global_hits.len(), 3);
    assert!(global_hits.iter().any(|hit| hit.field == "HR"));
}

#[tokio::test]
async fn upload_into_new_category_shows_up_in_the_next_listing() {
    let (base_url, _tmp) = spawn_server().await;
    let session = client_session(&base_url);

    upload(&session, "IT", "Linux Notes", "setup.pdf", "x").await;
    let categories = session.cache.categories_of("IT").await.unwrap();
    assert_eq!(categories.as_slice(), ["Linux Notes"]);

    // A fresh category: the broker must invalidate the category listing.
    upload(&session, "IT", "Docker", "guide.pdf", "y").await;
    let categories = session.cache.categories_of("IT").await.unwrap();
    assert_eq!(categories.as_slice(), ["Docker", "Linux Notes"]);

    // And a fresh field invalidates the field listing.
    let fields = session.cache.fields().await.unwrap();
    assert_eq!(fields.as_slice(), ["IT"]);
    upload(&session, "HR", "Payroll", "jan.pdf", "z").await;
    let fields = session.cache.fields().await.unwrap();
    assert_eq!(fields.as_slice(), ["HR", "IT"]);
}

#[tokio::test]
async fn server_enforces_the_upload_policy_itself() {
    let (base_url, _tmp) = spawn_server().await;
    let codec = KeyCodec::default();
    let catalog = RestCatalog::new(&base_url, codec);

    // Straight to the catalog, skipping the broker's client-side checks.
    let err = catalog
        .presign_upload("IT", "Tools", "tool.exe", "application/octet-stream")
        .await
        .unwrap_err();
    match err {
        CatalogError::PresignRejected(detail) => assert!(detail.contains("not allowed")),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = catalog
        .presign_upload("", "Tools", "doc.pdf", "application/pdf")
        .await
        .unwrap_err();
    match err {
        CatalogError::PresignRejected(detail) => assert!(detail.contains("required")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn tampered_upload_url_is_refused_and_stores_nothing() {
    let (base_url, _tmp) = spawn_server().await;
    let session = client_session(&base_url);

    let mut transfer = session
        .broker
        .request_upload("IT", "Linux Notes", "setup.pdf", "application/pdf")
        .await
        .unwrap();
    // The signature is the final query param; extra bytes change it for sure.
    transfer.url.push_str("AA");

    let err = session
        .broker
        .perform_upload(&transfer, Bytes::from_static(b"data"), |_| {})
        .await
        .unwrap_err();
    match err {
        TransferError::TransferFailed(detail) => assert!(detail.contains("403")),
        other => panic!("unexpected error: {other:?}"),
    }

    let files = session.cache.files_of("IT", "Linux Notes").await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn download_of_a_missing_object_reports_the_status() {
    let (base_url, _tmp) = spawn_server().await;
    let session = client_session(&base_url);

    let transfer = session
        .broker
        .request_download("IT", "Linux Notes", "ghost.pdf")
        .await
        .unwrap();
    let err = session.broker.perform_download(&transfer).await.unwrap_err();
    match err {
        TransferError::TransferFailed(detail) => assert!(detail.contains("404")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (base_url, _tmp) = spawn_server().await;

    let response = reqwest::get(format!("{base_url}/healthz")).await.unwrap();
    assert!(response.status().is_success());

    let response = reqwest::get(format!("{base_url}/readyz")).await.unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
