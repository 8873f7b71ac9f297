//! Offline integration tests for the conversion pipeline.
//!
//! Everything here runs without a network, a cluster, or a pdfium library:
//! the object store is an in-memory double keyed by URL, the engine is a
//! scripted double with call counters, and the event logger collects into
//! a vector. The one exception is the `HttpObjectStore` coverage at the
//! bottom, which talks to a local wiremock server.

use async_trait::async_trait;
use corpus2md::cluster::JobRange;
use corpus2md::config::RunOptions;
use corpus2md::engine::{ConversionEngine, ConvertedDocument, EngineError, EngineLoader};
use corpus2md::error::Corpus2MdError;
use corpus2md::events::{Event, EventLogger, EventSink};
use corpus2md::manifest::ManifestEntry;
use corpus2md::pipeline::{
    convert_one, run_minibatch, ConversionOutcome, PipelineContext, RangePipeline, SkipReason,
};
use corpus2md::storage::{redact, HttpObjectStore, ObjectStore, StorageLocation, StoreError};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

// ── Doubles ──────────────────────────────────────────────────────────────

/// Object store backed by a map from redacted URL to bytes.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn insert(&self, url: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), StoreError> {
        let key = redact(url.as_str());
        match self.get(&key) {
            Some(bytes) => tokio::fs::write(dest, bytes).await.map_err(|e| StoreError::Io {
                path: dest.to_path_buf(),
                source: e,
            }),
            None => Err(StoreError::Status {
                url: key,
                status: 404,
            }),
        }
    }

    async fn upload(&self, local: &Path, url: &Url) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(local).await.map_err(|e| StoreError::Io {
            path: local.to_path_buf(),
            source: e,
        })?;
        self.insert(&redact(url.as_str()), &bytes);
        Ok(())
    }
}

/// What the scripted engine should do for one document (keyed by its
/// local basename).
struct DocScript {
    embedded_length: usize,
    result: Result<String, String>,
}

#[derive(Default)]
struct EnginePlan {
    scripts: Mutex<HashMap<String, DocScript>>,
    loads: AtomicUsize,
    length_calls: AtomicUsize,
    convert_calls: AtomicUsize,
}

impl EnginePlan {
    fn script(self: Arc<Self>, basename: &str, script: DocScript) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(basename.to_string(), script);
        self
    }
}

struct ScriptedEngine {
    plan: Arc<EnginePlan>,
}

impl ConversionEngine for ScriptedEngine {
    fn embedded_text_length(&self, document: &Path) -> Result<usize, EngineError> {
        self.plan.length_calls.fetch_add(1, Ordering::SeqCst);
        let name = document.file_name().unwrap().to_string_lossy().to_string();
        Ok(self
            .plan
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .map(|s| s.embedded_length)
            .unwrap_or(10_000))
    }

    fn convert(&self, document: &Path) -> Result<ConvertedDocument, EngineError> {
        self.plan.convert_calls.fetch_add(1, Ordering::SeqCst);
        let name = document.file_name().unwrap().to_string_lossy().to_string();
        let scripts = self.plan.scripts.lock().unwrap();
        match scripts.get(&name).map(|s| &s.result) {
            Some(Ok(text)) => Ok(ConvertedDocument {
                text: text.clone(),
                metadata: json!({ "source": name }),
            }),
            Some(Err(detail)) => Err(EngineError::Extract(detail.clone())),
            None => Ok(ConvertedDocument {
                text: format!("converted {name}"),
                metadata: json!({ "source": name }),
            }),
        }
    }
}

struct ScriptedLoader {
    plan: Arc<EnginePlan>,
}

impl EngineLoader for ScriptedLoader {
    fn load(&self) -> Result<Box<dyn ConversionEngine>, Corpus2MdError> {
        self.plan.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            plan: Arc::clone(&self.plan),
        }))
    }
}

/// Loader that always fails, for the worker-fatal path.
struct BrokenLoader;

impl EngineLoader for BrokenLoader {
    fn load(&self) -> Result<Box<dyn ConversionEngine>, Corpus2MdError> {
        Err(Corpus2MdError::EngineLoad("no engine available".into()))
    }
}

#[derive(Default)]
struct CollectingLogger {
    events: Mutex<Vec<Event>>,
}

impl CollectingLogger {
    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    fn error_count(&self) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.is_error).count()
    }
}

impl EventLogger for CollectingLogger {
    fn log(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Fixture helpers ──────────────────────────────────────────────────────

const INDEX_URL: &str = "https://store.test/corpus/index.txt";
const SRC_URL: &str = "https://store.test/src";
const DST_URL: &str = "https://store.test/dst";

fn seeded_store(manifest: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store.insert(INDEX_URL, manifest.as_bytes());
    for line in manifest.lines().filter(|l| !l.trim().is_empty()) {
        store.insert(&format!("{SRC_URL}/{}", line.trim()), b"%PDF-stub");
    }
    store
}

fn pipeline(
    store: Arc<MemoryStore>,
    plan: Arc<EnginePlan>,
    options: RunOptions,
    logger: Arc<CollectingLogger>,
) -> RangePipeline {
    RangePipeline {
        store,
        loader: Arc::new(ScriptedLoader { plan }),
        index: StorageLocation::parse(INDEX_URL).unwrap(),
        source: StorageLocation::parse(SRC_URL).unwrap(),
        dest: StorageLocation::parse(DST_URL).unwrap(),
        options,
        logger,
    }
}

fn context(
    store: Arc<MemoryStore>,
    plan: Arc<EnginePlan>,
    min_length: Option<usize>,
    logger: Arc<CollectingLogger>,
) -> PipelineContext {
    PipelineContext {
        store,
        loader: Arc::new(ScriptedLoader { plan }),
        source: StorageLocation::parse(SRC_URL).unwrap(),
        dest: StorageLocation::parse(DST_URL).unwrap(),
        min_length,
        write_metadata: false,
        sink: EventSink::Direct(logger),
    }
}

// ── End-to-end range execution ───────────────────────────────────────────

/// The worked example: offset 1, length 2 over a three-entry manifest.
/// One document converts to non-empty text and is uploaded with its
/// extension swapped; the other converts to whitespace and is skipped
/// with an informational event, no upload.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn end_to_end_example_range() {
    let store = seeded_store("A/1.pdf\nA/2.pdf\nB/3.pdf\n");
    let plan = Arc::new(EnginePlan::default())
        .script(
            "2.pdf",
            DocScript {
                embedded_length: 10_000,
                result: Ok("# Document two".into()),
            },
        )
        .script(
            "3.pdf",
            DocScript {
                embedded_length: 10_000,
                result: Ok("   \n\t".into()),
            },
        );
    let logger = Arc::new(CollectingLogger::default());

    let summary = pipeline(
        Arc::clone(&store),
        plan,
        RunOptions::default(),
        Arc::clone(&logger),
    )
    .run(JobRange {
        offset: 1,
        length: 2,
    })
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    // A/2.pdf -> A/2.md, mirrored directory, swapped extension.
    assert_eq!(
        store.get(&format!("{DST_URL}/A/2.md")).as_deref(),
        Some("# Document two".as_bytes())
    );
    // The empty result produced no artifact at all.
    assert!(store.get(&format!("{DST_URL}/B/3.md")).is_none());
    // A/1.pdf was outside the range and must not have been touched.
    assert!(store.get(&format!("{DST_URL}/A/1.md")).is_none());

    // Events arrive in manifest order: converting/uploaded for A/2.pdf,
    // then converting/skip for B/3.pdf. The skip is informational.
    let messages = logger.messages();
    assert_eq!(messages.len(), 4);
    assert!(messages[0].contains("converting A/2.pdf"));
    assert!(messages[1].contains("uploaded A/2.md"));
    assert!(messages[2].contains("converting B/3.pdf"));
    assert!(messages[3].contains("empty conversion result for B/3.pdf"));
    assert_eq!(logger.error_count(), 0);
}

/// A range reaching past the end of the manifest clamps instead of
/// failing; a range entirely past the end is a clean no-op.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ranges_clamp_to_the_manifest() {
    let store = seeded_store("A/1.pdf\nA/2.pdf\nB/3.pdf\n");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());

    let summary = pipeline(
        Arc::clone(&store),
        Arc::clone(&plan),
        RunOptions::default(),
        Arc::clone(&logger),
    )
    .run(JobRange {
        offset: 2,
        length: 500,
    })
    .await
    .unwrap();
    assert_eq!(summary.total(), 1);

    let summary = pipeline(store, plan, RunOptions::default(), logger)
        .run(JobRange {
            offset: 10,
            length: 5,
        })
        .await
        .unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(summary.minibatches, 0);
}

/// Exactly one entry triggers an engine failure; the worker still
/// processes the other N-1 and reports one failure, and the failure event
/// names the entry.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fault_isolation_within_a_minibatch() {
    let manifest = "d/a.pdf\nd/b.pdf\nd/c.pdf\nd/d.pdf\nd/e.pdf\n";
    let store = seeded_store(manifest);
    let plan = Arc::new(EnginePlan::default()).script(
        "c.pdf",
        DocScript {
            embedded_length: 10_000,
            result: Err("glyph table corrupt".into()),
        },
    );
    let logger = Arc::new(CollectingLogger::default());

    let summary = pipeline(
        Arc::clone(&store),
        plan,
        RunOptions::default(),
        Arc::clone(&logger),
    )
    .run(JobRange {
        offset: 0,
        length: 5,
    })
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(logger.error_count(), 1);
    let errors: Vec<String> = logger
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.is_error)
        .map(|e| e.message.clone())
        .collect();
    assert!(errors[0].contains("d/c.pdf"));
    assert!(errors[0].contains("glyph table corrupt"));

    // The failed document is absent from the output set; the rest landed.
    let uploads = store.keys();
    assert!(uploads.contains(&format!("{DST_URL}/d/a.md")));
    assert!(!uploads.contains(&format!("{DST_URL}/d/c.md")));
}

/// A fetch failure (missing source object) is contained the same way.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_source_document_is_a_contained_failure() {
    let store = seeded_store("d/a.pdf\nd/b.pdf\n");
    // Remove one source object so the fetch 404s.
    store.objects.lock().unwrap().remove(&format!("{SRC_URL}/d/b.pdf"));
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());

    let summary = pipeline(store, plan, RunOptions::default(), Arc::clone(&logger))
        .run(JobRange {
            offset: 0,
            length: 2,
        })
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(logger.error_count(), 1);
}

/// Engine-load failure aborts the run before any document is touched.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_load_failure_is_worker_fatal() {
    let store = seeded_store("d/a.pdf\nd/b.pdf\n");
    let logger = Arc::new(CollectingLogger::default());

    let result = RangePipeline {
        store: Arc::clone(&store) as Arc<dyn ObjectStore>,
        loader: Arc::new(BrokenLoader),
        index: StorageLocation::parse(INDEX_URL).unwrap(),
        source: StorageLocation::parse(SRC_URL).unwrap(),
        dest: StorageLocation::parse(DST_URL).unwrap(),
        options: RunOptions::default(),
        logger,
    }
    .run(JobRange {
        offset: 0,
        length: 2,
    })
    .await;

    assert!(matches!(result, Err(Corpus2MdError::EngineLoad(_))));
    // Nothing was uploaded.
    assert_eq!(store.keys().len(), 3); // index + the two seeded sources
}

// ── Pooled execution ─────────────────────────────────────────────────────

/// Twelve documents across three workers: every document is processed
/// exactly once, every event is drained through the aggregator before the
/// run returns, and every minibatch paid exactly one engine load.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_run_processes_everything_and_drains_events() {
    let manifest: String = (0..12).map(|i| format!("d/doc{i}.pdf\n")).collect();
    let store = seeded_store(&manifest);
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());

    let options = RunOptions {
        workers: 3,
        minibatch_size: Some(2),
        ..RunOptions::default()
    };
    let summary = pipeline(
        Arc::clone(&store),
        Arc::clone(&plan),
        options,
        Arc::clone(&logger),
    )
    .run(JobRange {
        offset: 0,
        length: 12,
    })
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 12);
    assert_eq!(summary.minibatches, 6);

    // One engine load per minibatch, one conversion per document.
    assert_eq!(plan.loads.load(Ordering::SeqCst), 6);
    assert_eq!(plan.convert_calls.load(Ordering::SeqCst), 12);

    // Two events per document (converting + uploaded), all drained.
    let messages = logger.messages();
    assert_eq!(messages.len(), 24);
    for i in 0..12 {
        assert!(
            messages.iter().any(|m| m.contains(&format!("doc{i}.md"))),
            "missing upload event for doc{i}"
        );
    }

    // Every artifact landed.
    for i in 0..12 {
        assert!(store.get(&format!("{DST_URL}/d/doc{i}.md")).is_some());
    }
}

// ── Document-level properties ────────────────────────────────────────────

/// Below the threshold the outcome is a skip and the full conversion is
/// never invoked — observable on the call counter.
#[tokio::test]
async fn quality_filter_short_circuits_the_engine() {
    let store = seeded_store("d/scan.pdf\n");
    let plan = Arc::new(EnginePlan::default()).script(
        "scan.pdf",
        DocScript {
            embedded_length: 50,
            result: Ok("never reached".into()),
        },
    );
    let logger = Arc::new(CollectingLogger::default());
    let ctx = context(store, Arc::clone(&plan), Some(2000), Arc::clone(&logger));
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();

    let outcome = convert_one(
        &ManifestEntry::new("d/scan.pdf"),
        &ctx,
        &engine,
        scratch.path(),
    )
    .await;

    assert!(matches!(
        outcome,
        ConversionOutcome::Skipped(SkipReason::BelowMinLength {
            length: 50,
            min_length: 2000
        })
    ));
    assert_eq!(plan.length_calls.load(Ordering::SeqCst), 1);
    assert_eq!(plan.convert_calls.load(Ordering::SeqCst), 0);
    // Informational, not error.
    assert_eq!(logger.error_count(), 0);
}

/// With the gate disabled the pre-check itself never runs.
#[tokio::test]
async fn disabled_quality_filter_never_prechecks() {
    let store = seeded_store("d/doc.pdf\n");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());
    let ctx = context(store, Arc::clone(&plan), None, logger);
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();

    let outcome = convert_one(&ManifestEntry::new("d/doc.pdf"), &ctx, &engine, scratch.path()).await;

    assert!(matches!(outcome, ConversionOutcome::Success { .. }));
    assert_eq!(plan.length_calls.load(Ordering::SeqCst), 0);
    assert_eq!(plan.convert_calls.load(Ordering::SeqCst), 1);
}

/// Converting the same document twice with unchanged inputs yields the
/// same outcome kind; conversion has no side effect on its input.
#[tokio::test]
async fn conversion_outcome_kinds_are_idempotent() {
    let store = seeded_store("d/good.pdf\nd/bad.pdf\n");
    let plan = Arc::new(EnginePlan::default()).script(
        "bad.pdf",
        DocScript {
            embedded_length: 10_000,
            result: Err("broken".into()),
        },
    );
    let logger = Arc::new(CollectingLogger::default());
    let ctx = context(store, Arc::clone(&plan), None, logger);
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();

    for entry in ["d/good.pdf", "d/bad.pdf"] {
        let entry = ManifestEntry::new(entry);
        let first = convert_one(&entry, &ctx, &engine, scratch.path()).await;
        let second = convert_one(&entry, &ctx, &engine, scratch.path()).await;
        assert_eq!(first.kind(), second.kind(), "outcome kind changed for {entry}");
    }
}

/// Paths with URL-hostile characters are percent-encoded on the wire and
/// mirrored into the artifact path.
#[tokio::test]
async fn entries_are_percent_encoded_when_embedded_in_urls() {
    let store = Arc::new(MemoryStore::default());
    store.insert(&format!("{SRC_URL}/A/my%20doc.pdf"), b"%PDF-stub");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());
    let ctx = context(Arc::clone(&store), Arc::clone(&plan), None, logger);
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();

    let outcome = convert_one(
        &ManifestEntry::new("A/my doc.pdf"),
        &ctx,
        &engine,
        scratch.path(),
    )
    .await;

    assert!(matches!(outcome, ConversionOutcome::Success { .. }));
    assert!(store.get(&format!("{DST_URL}/A/my%20doc.md")).is_some());
}

/// The metadata sidecar is written and uploaded only when configured.
#[tokio::test]
async fn metadata_sidecar_is_optional() {
    let store = seeded_store("d/doc.pdf\n");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());
    let mut ctx = context(
        Arc::clone(&store),
        Arc::clone(&plan),
        None,
        Arc::clone(&logger),
    );
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();
    let entry = ManifestEntry::new("d/doc.pdf");

    convert_one(&entry, &ctx, &engine, scratch.path()).await;
    assert!(store.get(&format!("{DST_URL}/d/doc_meta.json")).is_none());

    ctx.write_metadata = true;
    convert_one(&entry, &ctx, &engine, scratch.path()).await;
    let sidecar = store
        .get(&format!("{DST_URL}/d/doc_meta.json"))
        .expect("sidecar uploaded");
    let parsed: serde_json::Value = serde_json::from_slice(&sidecar).unwrap();
    assert_eq!(parsed["source"], "doc.pdf");
}

/// An upload failure is a contained `Failed` outcome, not a panic or a
/// propagated error.
#[tokio::test]
async fn upload_failure_is_contained() {
    /// Store whose uploads always fail.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl ObjectStore for ReadOnlyStore {
        async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), StoreError> {
            self.0.fetch(url, dest).await
        }
        async fn upload(&self, _local: &Path, url: &Url) -> Result<(), StoreError> {
            Err(StoreError::Status {
                url: redact(url.as_str()),
                status: 403,
            })
        }
    }

    let inner = MemoryStore::default();
    inner.insert(&format!("{SRC_URL}/d/doc.pdf"), b"%PDF-stub");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());
    let ctx = PipelineContext {
        store: Arc::new(ReadOnlyStore(inner)),
        loader: Arc::new(ScriptedLoader {
            plan: Arc::clone(&plan),
        }),
        source: StorageLocation::parse(SRC_URL).unwrap(),
        dest: StorageLocation::parse(DST_URL).unwrap(),
        min_length: None,
        write_metadata: false,
        sink: EventSink::Direct(Arc::clone(&logger) as Arc<dyn EventLogger>),
    };
    let engine = ScriptedEngine {
        plan: Arc::clone(&plan),
    };
    let scratch = tempfile::tempdir().unwrap();

    let outcome = convert_one(&ManifestEntry::new("d/doc.pdf"), &ctx, &engine, scratch.path()).await;

    match outcome {
        ConversionOutcome::Failed(e) => {
            assert!(e.to_string().contains("403"));
            assert_eq!(e.entry(), "d/doc.pdf");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(logger.error_count(), 1);
}

// ── run_minibatch directly ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn minibatch_processes_in_order_with_one_load() {
    let store = seeded_store("d/a.pdf\nd/b.pdf\nd/c.pdf\n");
    let plan = Arc::new(EnginePlan::default());
    let logger = Arc::new(CollectingLogger::default());
    let ctx = context(store, Arc::clone(&plan), None, Arc::clone(&logger));

    let entries = vec![
        ManifestEntry::new("d/a.pdf"),
        ManifestEntry::new("d/b.pdf"),
        ManifestEntry::new("d/c.pdf"),
    ];
    let report = run_minibatch(entries, ctx).await.unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(plan.loads.load(Ordering::SeqCst), 1);

    let messages = logger.messages();
    let converting: Vec<&String> = messages.iter().filter(|m| m.contains("converting")).collect();
    assert_eq!(converting.len(), 3);
    assert!(converting[0].contains("d/a.pdf"));
    assert!(converting[1].contains("d/b.pdf"));
    assert!(converting[2].contains("d/c.pdf"));
}

// ── HttpObjectStore against wiremock ─────────────────────────────────────

mod http_store {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_writes_the_body_to_the_destination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/corpus/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-sample".to_vec()))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(10).unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("doc.pdf");
        let url = Url::parse(&format!("{}/corpus/doc.pdf", server.uri())).unwrap();

        store.fetch(&url, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-sample");
    }

    #[tokio::test]
    async fn fetch_of_a_missing_object_is_a_status_error() {
        let server = MockServer::start().await;
        let store = HttpObjectStore::new(10).unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/corpus/missing.pdf", server.uri())).unwrap();

        let err = store
            .fetch(&url, &scratch.path().join("missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn upload_puts_with_the_blob_type_header() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/dst/doc.md"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(body_string("# converted"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(10).unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("doc.md");
        std::fs::write(&local, "# converted").unwrap();
        let url = Url::parse(&format!("{}/dst/doc.md", server.uri())).unwrap();

        store.upload(&local, &url).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_upload_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(10).unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("doc.md");
        std::fs::write(&local, "# converted").unwrap();
        let url = Url::parse(&format!("{}/dst/doc.md", server.uri())).unwrap();

        let err = store.upload(&local, &url).await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 403, .. }));
    }
}
