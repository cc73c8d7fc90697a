//! HttpStore against an in-process mock of the vector service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use ragbot_core::RagError;
use ragbot_store::wire::{Ack, DeleteRequest, GetRequest, GetResponse, SetRequest, SourceMeta, StoreRequest};
use ragbot_store::{HttpStore, SourceFilter, VectorBackend, VectorStore};

#[derive(Clone)]
struct Record {
    content: String,
    embedding: Vec<f32>,
    source: String,
}

#[derive(Default)]
struct Service {
    namespaces: Mutex<HashMap<String, Vec<Record>>>,
    next_ids: Mutex<HashMap<String, u64>>,
    start_ids: Mutex<Vec<u64>>,
    fail_store: AtomicBool,
    report_next_id: AtomicBool,
}

type Shared = Arc<Service>;

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    1.0 - dot / (na * nb)
}

fn ack_for(service: &Service, namespace: &str, records: Option<&Vec<Record>>) -> Ack {
    let next_id = service
        .report_next_id
        .load(Ordering::SeqCst)
        .then(|| service.next_ids.lock().unwrap().get(namespace).copied().unwrap_or(0));

    Ack {
        count: Some(records.map_or(0, |r| r.len() as u64)),
        next_id,
        dimension: records.and_then(|r| r.first()).map(|r| r.embedding.len()),
        deleted: None,
    }
}

async fn set(State(service): State<Shared>, Json(req): Json<SetRequest>) -> Json<Ack> {
    let mut namespaces = service.namespaces.lock().unwrap();
    if req.reset {
        namespaces.insert(req.namespace.clone(), Vec::new());
        service.next_ids.lock().unwrap().remove(&req.namespace);
    }
    Json(ack_for(&service, &req.namespace, namespaces.get(&req.namespace)))
}

async fn store(
    State(service): State<Shared>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<Ack>, StatusCode> {
    if service.fail_store.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    service.start_ids.lock().unwrap().push(req.start_id);
    {
        let mut next_ids = service.next_ids.lock().unwrap();
        let next = next_ids.entry(req.namespace.clone()).or_default();
        *next = (*next).max(req.start_id + req.contents.len() as u64);
    }

    let namespace = req.namespace.clone();
    let mut namespaces = service.namespaces.lock().unwrap();
    let records = namespaces.entry(req.namespace.clone()).or_default();
    for ((content, embedding), meta) in req.contents.into_iter().zip(req.embeddings).zip(req.sources) {
        records.push(Record {
            content,
            embedding,
            source: meta.source,
        });
    }

    Ok(Json(ack_for(&service, &namespace, Some(records))))
}

async fn search(
    State(service): State<Shared>,
    Json(req): Json<GetRequest>,
) -> Result<Json<GetResponse>, StatusCode> {
    let namespaces = service.namespaces.lock().unwrap();
    let records = namespaces.get(&req.namespace).ok_or(StatusCode::NOT_FOUND)?;

    let mut scored: Vec<(f32, &Record)> = records
        .iter()
        .filter(|r| req.filter.as_ref().map_or(true, |f| f.contains(&r.source)))
        .map(|r| (cosine_distance(&req.embedding, &r.embedding), r))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.truncate(req.k);

    Ok(Json(GetResponse {
        documents: vec![scored.iter().map(|(_, r)| r.content.clone()).collect()],
        distances: vec![scored.iter().map(|(d, _)| *d).collect()],
        metadatas: vec![scored
            .iter()
            .map(|(_, r)| Some(SourceMeta::new(r.source.clone())))
            .collect()],
    }))
}

async fn delete(State(service): State<Shared>, Json(req): Json<DeleteRequest>) -> Json<Ack> {
    let mut namespaces = service.namespaces.lock().unwrap();
    let records = namespaces.entry(req.namespace).or_default();
    let before = records.len();
    records.retain(|r| r.source != req.source);

    Json(Ack {
        count: Some(records.len() as u64),
        next_id: None,
        dimension: None,
        deleted: Some((before - records.len()) as u64),
    })
}

async fn spawn_service(with_delete: bool) -> (String, Shared) {
    let service: Shared = Arc::new(Service::default());

    let mut app = Router::new()
        .route("/set", post(set))
        .route("/store", post(store))
        .route("/get", get(search));
    if with_delete {
        app = app.route("/delete", post(delete));
    }
    let app = app.with_state(service.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), service)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn insert_pets(store: &mut VectorStore) {
    store
        .insert_batch(
            strings(&["cats are mammals", "dogs bark"]),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            strings(&["catA", "dogA"]),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_end_to_end_ranking() {
    let (url, _service) = spawn_service(true).await;
    let backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "docs");

    insert_pets(&mut store).await;

    let hits = store
        .search(&[0.9, 0.1], &SourceFilter::from_sources(["catA", "dogA"]), 2)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].content, "cats are mammals");
    assert!(hits[0].score > hits[1].score);

    let exact = store.search(&[0.0, 1.0], &SourceFilter::all(), 1).await.unwrap();
    assert_eq!(exact[0].content, "dogs bark");
    assert!((exact[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_filter_and_isolation() {
    let (url, _service) = spawn_service(true).await;
    let backend = HttpStore::connect_url(url, "alpha", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "alpha");

    insert_pets(&mut store).await;

    let hits = store
        .search(&[1.0, 0.0], &SourceFilter::from_sources(["dogA"]), 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, "dogA");

    store.switch_namespace("beta").await.unwrap();
    assert!(matches!(
        store.search(&[1.0, 0.0], &SourceFilter::all(), 5).await,
        Err(RagError::NamespaceNotFound { .. })
    ));

    store.reset_namespace().await.unwrap();
    assert!(store
        .search(&[1.0, 0.0], &SourceFilter::all(), 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cursor_advances_only_on_ack() {
    let (url, service) = spawn_service(true).await;
    let mut backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    assert_eq!(backend.cursor(), 0);

    let batch = ragbot_core::RecordBatch::new(
        strings(&["a", "b"]),
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        strings(&["s", "s"]),
    )
    .unwrap();

    backend.insert_batch(&batch).await.unwrap();
    assert_eq!(backend.cursor(), 2);

    service.fail_store.store(true, Ordering::SeqCst);
    assert!(matches!(
        backend.insert_batch(&batch).await,
        Err(RagError::BackendUnavailable { .. })
    ));
    assert_eq!(backend.cursor(), 2);

    service.fail_store.store(false, Ordering::SeqCst);
    backend.insert_batch(&batch).await.unwrap();
    assert_eq!(backend.cursor(), 4);
    assert_eq!(*service.start_ids.lock().unwrap(), vec![0, 2]);

    backend.reset_namespace().await.unwrap();
    assert_eq!(backend.cursor(), 0);
}

#[tokio::test]
async fn test_switch_reconciles_cursor_and_dimension() {
    let (url, _service) = spawn_service(true).await;
    let mut backend = HttpStore::connect_url(url.clone(), "docs", true).await.unwrap();

    let batch = ragbot_core::RecordBatch::new(
        strings(&["a", "b", "c"]),
        vec![vec![1.0, 0.0, 0.0]; 3],
        strings(&["s", "s", "s"]),
    )
    .unwrap();
    backend.insert_batch(&batch).await.unwrap();

    let other = HttpStore::connect_url(url, "docs", false).await.unwrap();
    assert_eq!(other.cursor(), 3);
    assert_eq!(other.dimension(), Some(3));
}

#[tokio::test]
async fn test_dimension_mismatch_is_local() {
    let (url, service) = spawn_service(true).await;
    let backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "docs");

    insert_pets(&mut store).await;

    let err = store
        .insert_batch(strings(&["wide"]), vec![vec![1.0, 0.0, 0.0]], strings(&["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(service.start_ids.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_by_source() {
    let (url, _service) = spawn_service(true).await;
    let backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "docs");

    insert_pets(&mut store).await;
    assert_eq!(store.delete_by_source("catA").await.unwrap(), 1);

    let hits = store.search(&[1.0, 0.0], &SourceFilter::all(), 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, "dogA");
}

#[tokio::test]
async fn test_ids_not_reused_after_delete() {
    let (url, service) = spawn_service(true).await;
    let backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "docs");

    insert_pets(&mut store).await;
    store.delete_by_source("catA").await.unwrap();

    for text in ["birds sing", "fish swim"] {
        store
            .insert_batch(strings(&[text]), vec![vec![0.5, 0.5]], strings(&["misc"]))
            .await
            .unwrap();
    }
    assert_eq!(*service.start_ids.lock().unwrap(), vec![0, 2, 3]);

    // The service now counts 3 records but identifiers 0..4 were issued.
    store.switch_namespace("other").await.unwrap();
    store.switch_namespace("docs").await.unwrap();
    store
        .insert_batch(strings(&["frogs croak"]), vec![vec![0.2, 0.8]], strings(&["misc"]))
        .await
        .unwrap();
    assert_eq!(*service.start_ids.lock().unwrap(), vec![0, 2, 3, 4]);
}

#[tokio::test]
async fn test_new_client_resumes_from_reported_next_id() {
    let (url, service) = spawn_service(true).await;
    service.report_next_id.store(true, Ordering::SeqCst);

    let mut first = HttpStore::connect_url(url.clone(), "docs", true).await.unwrap();
    let batch = ragbot_core::RecordBatch::new(
        strings(&["a", "b", "c"]),
        vec![vec![1.0, 0.0]; 3],
        strings(&["old", "old", "new"]),
    )
    .unwrap();
    first.insert_batch(&batch).await.unwrap();
    first.delete_by_source("old").await.unwrap();

    let second = HttpStore::connect_url(url, "docs", false).await.unwrap();
    assert_eq!(second.cursor(), 3);
}

#[tokio::test]
async fn test_delete_unsupported_by_service() {
    let (url, _service) = spawn_service(false).await;
    let backend = HttpStore::connect_url(url, "docs", true).await.unwrap();
    let mut store = VectorStore::new(Box::new(backend), "docs");

    assert!(matches!(
        store.delete_by_source("catA").await,
        Err(RagError::UnsupportedOperation { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_service() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = HttpStore::connect_url(format!("http://{}", addr), "docs", true).await;
    assert!(matches!(result, Err(RagError::BackendUnavailable { .. })));
}
