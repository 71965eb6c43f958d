//! End-to-end import scenarios against mocked external services.
//!
//! Every provider and source base URL points at one wiremock server;
//! the library lives in a temp directory. PDFs served by the mocks are
//! built with lopdf so the extraction stage sees real page content.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paperdock_core::{
    AcquireConfig, AcquisitionPipeline, ImportErrorKind, ImportOutcome, Library, Missing,
    SearchIndex, UploadOutcome,
};

/// Builds a single-page PDF whose page shows `text`.
fn pdf_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn pdf_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/pdf")
        .set_body_bytes(pdf_with_text(text))
}

fn pipeline_against(server: &MockServer) -> (TempDir, AcquisitionPipeline) {
    let dir = TempDir::new().unwrap();
    let library = Library::open(dir.path()).unwrap();
    let config = AcquireConfig {
        mirror_base_url: server.uri(),
        max_pdf_bytes: 10 * 1024 * 1024,
        unpaywall_email: "reader@example.org".to_string(),
        fetch_timeout: Duration::from_secs(2),
        semantic_scholar_base_url: server.uri(),
        crossref_base_url: server.uri(),
        unpaywall_base_url: server.uri(),
        arxiv_base_url: server.uri(),
        biorxiv_base_url: server.uri(),
        plos_base_url: server.uri(),
        elife_cdn_base_url: server.uri(),
        jneurosci_base_url: server.uri(),
    };
    (dir, AcquisitionPipeline::new(library, &config))
}

async fn mount_semantic_scholar_doi(server: &MockServer, doi: &str, title: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/paper/{doi}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": title,
            "authors": [{"name": "Ada Lovelace"}],
            "abstract": "We prove several things.",
            "venue": "Nature",
            "year": 2024,
            "url": format!("https://doi.org/{doi}")
        })))
        .mount(server)
        .await;
}

// ==================== Full Import Scenarios ====================

#[tokio::test]
async fn test_doi_import_succeeds_with_metadata_and_pdf() {
    let server = MockServer::start().await;
    let doi = "10.1038/nature12345";
    mount_semantic_scholar_doi(&server, doi, "A Complete Paper").await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/{doi}")))
        .and(query_param("email", "reader@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "best_oa_location": {"url_for_pdf": format!("{}/oa/paper.pdf", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oa/paper.pdf"))
        .respond_with(pdf_response("A Complete Paper, full text."))
        .mount(&server)
        .await;

    let (_dir, pipeline) = pipeline_against(&server);
    let outcome = pipeline.import(doi).await;

    let key = match outcome {
        ImportOutcome::Success { key, message } => {
            assert!(message.contains("A Complete Paper"));
            key
        }
        other => panic!("expected success, got {other:?}"),
    };

    let record = pipeline.library().load(&key).unwrap();
    assert_eq!(record.key.as_str(), "10-1038-nature12345");
    assert_eq!(record.title.as_deref(), Some("A Complete Paper"));
    assert_eq!(record.metadata_source.as_deref(), Some("semantic_scholar"));
    let pdf = record.pdf.as_ref().unwrap();
    assert!(!pdf.oversize);
    let text = record.text.as_ref().unwrap();
    assert!(text.searchable);
    assert!(pipeline.library().pdf_path(&key).is_some());
    let cached = pipeline.library().cached_text(&key).unwrap().unwrap();
    assert!(cached.joined().contains("full text"));
}

#[tokio::test]
async fn test_same_doi_twice_is_duplicate_with_existing_id() {
    let server = MockServer::start().await;
    let doi = "10.1038/nature12345";
    mount_semantic_scholar_doi(&server, doi, "A Paper").await;
    // No PDF anywhere; first run is partial but still committed.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, pipeline) = pipeline_against(&server);
    let first = pipeline.import(doi).await;
    let first_key = match first {
        ImportOutcome::Partial { key, .. } => key,
        other => panic!("expected partial, got {other:?}"),
    };

    // Same paper by doi.org URL must hit the same record.
    let second = pipeline
        .import(&format!("https://doi.org/{doi}"))
        .await;
    match second {
        ImportOutcome::Error {
            kind: ImportErrorKind::Duplicate,
            existing_id: Some(existing),
            message,
        } => {
            assert_eq!(existing, first_key);
            assert!(message.contains("already in your library"));
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(pipeline.library().list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metadata_only_partial_commits_record() {
    let server = MockServer::start().await;
    let doi = "10.1038/nature12345";
    mount_semantic_scholar_doi(&server, doi, "Metadata Only").await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, pipeline) = pipeline_against(&server);
    let outcome = pipeline.import(doi).await;

    match outcome {
        ImportOutcome::Partial {
            key,
            missing,
            message,
        } => {
            assert_eq!(missing, vec![Missing::Pdf]);
            assert!(message.contains("upload manually"));
            let record = pipeline.library().load(&key).unwrap();
            assert_eq!(record.title.as_deref(), Some("Metadata Only"));
            assert!(record.pdf.is_none());
            assert!(pipeline.library().pdf_path(&key).is_none());
        }
        other => panic!("expected partial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_input_commits_nothing() {
    let server = MockServer::start().await;
    let (_dir, pipeline) = pipeline_against(&server);

    let outcome = pipeline.import("not a url or doi").await;
    match outcome {
        ImportOutcome::Error {
            kind: ImportErrorKind::InvalidFormat,
            existing_id: None,
            ..
        } => {}
        other => panic!("expected invalid format, got {other:?}"),
    }
    assert!(pipeline.library().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_source_falls_through_to_next() {
    let server = MockServer::start().await;
    // Metadata providers fail for this arXiv id; unpaywall is not
    // applicable; the repository link works after the earlier sources
    // return errors.
    Mock::given(method("GET"))
        .and(path("/pdf/2001.08361.pdf"))
        .respond_with(pdf_response("Scaling laws, full text."))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, pipeline) = pipeline_against(&server);
    let outcome = pipeline.import("https://arxiv.org/abs/2001.08361").await;

    match outcome {
        ImportOutcome::Partial { key, missing, .. } => {
            assert_eq!(missing, vec![Missing::Metadata]);
            let record = pipeline.library().load(&key).unwrap();
            assert_eq!(record.arxiv_id.as_deref(), Some("2001.08361"));
            assert_eq!(record.pdf.as_ref().unwrap().source, "repository");
        }
        other => panic!("expected partial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pdf_without_text_layer_is_flagged_unsearchable() {
    let server = MockServer::start().await;
    let doi = "10.1038/nature12345";
    mount_semantic_scholar_doi(&server, doi, "Scanned Paper").await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/{doi}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "best_oa_location": {"url_for_pdf": format!("{}/oa/scan.pdf", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oa/scan.pdf"))
        .respond_with(pdf_response(""))
        .mount(&server)
        .await;

    let (_dir, pipeline) = pipeline_against(&server);
    let outcome = pipeline.import(doi).await;

    match outcome {
        ImportOutcome::Success { key, message } => {
            assert!(message.contains("no text layer"));
            let record = pipeline.library().load(&key).unwrap();
            assert!(!record.text.as_ref().unwrap().searchable);

            // Unsearchable records must not surface on full-text queries.
            let mut index = SearchIndex::new();
            index.rebuild(pipeline.library()).unwrap();
            assert_eq!(index.search("Scanned", 10).len(), 1, "title still indexed");
        }
        other => panic!("expected success, got {other:?}"),
    }
}

// ==================== Upload Scenarios ====================

#[tokio::test]
async fn test_upload_with_doi_on_first_page_fetches_metadata() {
    let server = MockServer::start().await;
    let doi = "10.1002/andp.19053221004";
    mount_semantic_scholar_doi(&server, doi, "Uploaded Classic").await;

    let (_dir, pipeline) = pipeline_against(&server);
    let bytes = pdf_with_text("On bodies. doi: 10.1002/andp.19053221004");
    let outcome = pipeline.import_pdf(bytes).await;

    match outcome {
        UploadOutcome::Success {
            key,
            metadata_source,
            preview,
            ..
        } => {
            assert_eq!(metadata_source, "semantic_scholar");
            assert!(preview.unwrap().contains("On bodies"));
            let record = pipeline.library().load(&key).unwrap();
            assert_eq!(record.doi.as_deref(), Some(doi));
            assert_eq!(record.pdf.as_ref().unwrap().source, "upload");
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_upload_then_import_same_doi_is_duplicate() {
    let server = MockServer::start().await;
    let doi = "10.1002/andp.19053221004";
    mount_semantic_scholar_doi(&server, doi, "Uploaded Classic").await;

    let (_dir, pipeline) = pipeline_against(&server);
    let bytes = pdf_with_text("doi: 10.1002/andp.19053221004");
    let first = pipeline.import_pdf(bytes).await;
    assert!(matches!(first, UploadOutcome::Success { .. }));

    let second = pipeline.import(doi).await;
    assert!(matches!(
        second,
        ImportOutcome::Error {
            kind: ImportErrorKind::Duplicate,
            ..
        }
    ));
}

#[tokio::test]
async fn test_upload_without_doi_needs_metadata_under_opaque_key() {
    let server = MockServer::start().await;
    let (_dir, pipeline) = pipeline_against(&server);

    let bytes = pdf_with_text("Handwritten notes with no identifier at all.");
    let outcome = pipeline.import_pdf(bytes).await;

    match outcome {
        UploadOutcome::NeedsMetadata { key, message, .. } => {
            assert!(key.as_str().starts_with("uuid-"));
            assert!(message.contains("add the metadata manually"));
            let record = pipeline.library().load(&key).unwrap();
            assert!(record.doi.is_none());
            assert!(record.title.is_none());
            assert!(pipeline.library().pdf_path(&key).is_some());
        }
        other => panic!("expected needs_metadata, got {other:?}"),
    }
}
