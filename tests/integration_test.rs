/// End-to-end integration tests for mechanic-rag.
///
/// Tests the complete flow:
///   Config → manuals → Ingestor → local index → tools → Pipeline
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use mechanic_rag::config::{Config, IngestConfig};
use mechanic_rag::db::Db;
use mechanic_rag::embedder::Embedder;
use mechanic_rag::embedder::mock::MockEmbedder;
use mechanic_rag::index::ManualIndex;
use mechanic_rag::index::local::LocalStore;
use mechanic_rag::ingest::Ingestor;
use mechanic_rag::llm::mock::MockModel;
use mechanic_rag::pipeline::{Pipeline, PipelineError, Stage};
use mechanic_rag::tools::{ManualQaTool, ManualSqlTool, PartsSearchTool, Tool, ToolBox};
use tempfile::tempdir;

const DIMS: usize = 32;

fn write_manuals(dir: &std::path::Path) {
    fs::create_dir_all(dir.join("Toyota")).unwrap();
    fs::write(
        dir.join("Toyota/camry_2012.txt"),
        "Brake system.\n\nFront brake pad minimum thickness is 1.0 mm. Replace pads in axle sets.\n\n\
         Tighten caliper bolts to 34 N·m. Pump the brake pedal before driving.",
    )
    .unwrap();
    fs::write(
        dir.join("Toyota/corolla_2015.md"),
        "# Cooling system\n\nUse Toyota Super Long Life Coolant. The first replacement is at 100,000 miles.\n\n\
         Never open the radiator cap while the engine is hot.",
    )
    .unwrap();
}

fn ingest_config(work_dir: &std::path::Path) -> IngestConfig {
    IngestConfig {
        chunk_size: 120,
        chunk_overlap: 20,
        batch_size: 2,
        max_workers: 2,
        work_dir: work_dir.to_string_lossy().into_owned(),
        ..IngestConfig::default()
    }
}

/// Ingest twice: the second run must do no embedding or upsert work.
#[test]
fn test_ingestion_is_resumable() {
    let temp = tempdir().unwrap();
    let manuals = temp.path().join("manuals");
    write_manuals(&manuals);
    let cfg = ingest_config(temp.path());

    let embedder = MockEmbedder::new(DIMS);
    let store = LocalStore::new(Db::open(temp.path().join("manuals.db"), DIMS).unwrap());

    let first = Ingestor::new(&embedder, &store, &cfg).run(&manuals).unwrap();
    assert_eq!(first.documents, 2);
    assert_eq!(first.failed_documents, 0);
    assert!(first.chunks >= 4, "expected several chunks, got {}", first.chunks);
    assert_eq!(first.upserted, first.chunks);
    assert_eq!(store.len().unwrap(), first.chunks);

    let checkpoint = fs::read_to_string(cfg.progress_path()).unwrap();
    let embedded = embedder.embedded_count();

    let second = Ingestor::new(&embedder, &store, &cfg).run(&manuals).unwrap();
    assert_eq!(second.upserted, 0);
    assert_eq!(second.skipped, first.chunks);
    assert_eq!(second.processed_total, first.chunks);
    assert_eq!(embedder.embedded_count(), embedded);
    assert_eq!(fs::read_to_string(cfg.progress_path()).unwrap(), checkpoint);
}

/// Chunks written by ingestion are what retrieval finds.
#[test]
fn test_ingested_chunks_are_retrievable() {
    let temp = tempdir().unwrap();
    let manuals = temp.path().join("manuals");
    write_manuals(&manuals);
    let cfg = ingest_config(temp.path());

    let embedder = Arc::new(MockEmbedder::new(DIMS));
    let store = Arc::new(LocalStore::new(Db::open_in_memory(DIMS).unwrap()));
    Ingestor::new(embedder.as_ref(), store.as_ref(), &cfg)
        .run(&manuals)
        .unwrap();

    let cache: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(cfg.chunks_path()).unwrap()).unwrap();
    assert_eq!(cache["documents"], 2);
    let exact = cache["chunks"][1]["text"].as_str().unwrap().to_string();

    let index = ManualIndex::new(embedder, store);
    let hits = index.find_relevant(&exact, 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].text, exact);
    assert!(hits[0].score >= hits[1].score);
    assert!(hits[1].score >= hits[2].score);
    assert!(index.find_relevant(&exact, 0).unwrap().is_empty());
}

/// Full pipeline over a real local index with a scripted model.
#[test]
fn test_pipeline_end_to_end() {
    let temp = tempdir().unwrap();
    let manuals = temp.path().join("manuals");
    write_manuals(&manuals);
    let cfg = ingest_config(temp.path());

    let embedder = Arc::new(MockEmbedder::new(DIMS));
    let store = Arc::new(LocalStore::new(Db::open_in_memory(DIMS).unwrap()));
    Ingestor::new(embedder.as_ref(), store.as_ref(), &cfg)
        .run(&manuals)
        .unwrap();

    let llm = Arc::new(MockModel::scripted([
        "2012 Toyota Camry, grinding when braking",
        "Replace pads below 1.0 mm and torque caliper bolts to 34 N·m.",
        "Diagnosis: front pads worn to the backing plate. Estimated cost $150-$250.",
        "front brake pads, brake cleaner, torque wrench",
        "Here is the record:\n```json\n{\"diagnosis\": \"Front brake pads worn out\", \"cost\": \"$150-$250\", \
         \"parts\": [\"front brake pads\", \"brake cleaner\", \"torque wrench\"], \
         \"links\": {\"amazon\": \"https://evil.example\"}, \
         \"guide\": \"1. Remove wheel\\n2. Replace pads\\n3. Torque bolts to 34 N·m\"}\n```",
    ]));
    let index = Arc::new(ManualIndex::new(embedder, store));
    let qa = Arc::new(ManualQaTool::new(index, llm.clone(), 4));
    let pipeline = Pipeline::new(llm.clone(), qa);

    let transcript = pipeline.run_stages("My 2012 Camry grinds when I brake").unwrap();
    assert_eq!(
        transcript.iter().map(|s| s.stage).collect::<Vec<_>>(),
        Stage::ALL.to_vec()
    );
    // Retrieved manual text reached the Q&A prompt
    assert!(llm.prompts()[1].contains("Camry") || llm.prompts()[1].contains("camry_2012"));

    let result = Pipeline::result_from(&transcript).unwrap();
    assert_eq!(result.diagnosis, "Front brake pads worn out");
    assert_eq!(result.parts.len(), 3);
    assert_eq!(
        result.links["amazon"],
        "https://www.amazon.com/s?k=front+brake+pads+brake+cleaner+torque+wrench"
    );
    assert!(result.guide.contains("2. Replace pads"));

    let json = serde_json::to_value(&result).unwrap();
    for key in ["diagnosis", "cost", "parts", "links", "guide"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

/// Empty queries never reach the model.
#[test]
fn test_empty_query_rejected() {
    let llm = Arc::new(MockModel::scripted(Vec::<String>::new()));
    let index = Arc::new(ManualIndex::new(
        Arc::new(MockEmbedder::new(8)),
        Arc::new(LocalStore::new(Db::open_in_memory(8).unwrap())),
    ));
    let qa = Arc::new(ManualQaTool::new(index, llm.clone(), 4));
    let pipeline = Pipeline::new(llm.clone(), qa);

    assert!(matches!(pipeline.run("   "), Err(PipelineError::EmptyQuery)));
    assert_eq!(llm.call_count(), 0);
}

/// Manifest setup followed by the legacy SQL tool.
#[test]
fn test_manifest_setup_and_sql_tool() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("manuals.db");
    let csv = "make,model,year,bundle_url\n\
               Toyota,Camry,2012,https://charm.li/Toyota/2012/Camry\n\
               Toyota,Corolla,,https://charm.li/Toyota/2015/Corolla\n\
               Honda,Civic,2016,https://charm.li/Honda/2016/Civic\n";

    {
        let mut db = Db::open(&db_path, DIMS).unwrap();
        let import = db.load_manifest_csv(csv.as_bytes()).unwrap();
        assert_eq!(import.inserted, 2);
        assert_eq!(import.skipped, 1);
    }

    let tool = ManualSqlTool::new(Db::open_read_only(&db_path).unwrap());
    let out = tool
        .call("SELECT make, model FROM manifest ORDER BY make")
        .unwrap();
    assert_eq!(out, "make,model\nHonda,Civic\nToyota,Camry\n");
    assert_eq!(
        tool.call("SELECT * FROM manifest WHERE year = '1999'").unwrap(),
        ""
    );
    assert!(tool.call("UPDATE manifest SET year = '2000'").is_err());
}

/// Parts search through the tool registry.
#[test]
fn test_parts_search_tool() {
    let mut tools = ToolBox::new();
    tools.register(Arc::new(PartsSearchTool));

    let out = tools.call("parts_search", "oil filter, air filter").unwrap();
    let urls: BTreeMap<String, String> = serde_json::from_str(&out).unwrap();
    assert_eq!(urls.len(), 3);
    for key in ["amazon", "autozone", "oreilly"] {
        assert!(urls[key].contains("oil+filter+air+filter"), "{key}");
    }
}

/// Test config defaults and validation
#[test]
fn test_config_defaults_and_validation() {
    let config = Config::default();

    assert_eq!(config.ingest.chunk_size, 2000);
    assert_eq!(config.ingest.chunk_overlap, 300);
    assert_eq!(config.index.top_k, 4);
    assert_eq!(config.bind, "0.0.0.0:5000");
    assert!(config.validate().is_ok());

    let mut bad_config = Config::default();
    bad_config.ingest.batch_size = 0;
    assert!(bad_config.validate().is_err());
}

/// Test MockEmbedder produces consistent results
#[test]
fn test_mock_embedder_consistency() {
    let embedder = MockEmbedder::default();

    let v1 = embedder.embed("hello world").unwrap();
    let v2 = embedder.embed("hello world").unwrap();

    assert_eq!(v1, v2, "Same input should produce same embedding");
    assert_eq!(v1.len(), embedder.dimensions(), "Should match dimensions");

    let v3 = embedder.embed("different text").unwrap();
    assert_ne!(v1, v3, "Different input should produce different embedding");
}
