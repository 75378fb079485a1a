//! Deterministic collaborators shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragline::config::Config;
use ragline::loader::FileLoader;
use ragline::service::Service;
use ragline_core::embedding::Embedder;
use ragline_core::loader::DocumentLoader;
use ragline_core::models::{EmbeddingVector, SourceUnit};
use ragline_core::store::VectorStore;
use ragline_core::synthesize::{ChatMessage, CompletionParams, LanguageModel};

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed (FNV-1a) into one
/// of `DIMS` buckets. Texts sharing words get high cosine similarity.
pub struct HashEmbedder;

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn embed_text(text: &str) -> EmbeddingVector {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        v[(fnv1a(&word) % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Answers from the context it was given, and admits when there is none.
#[derive(Default)]
pub struct EchoLlm {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl LanguageModel for EchoLlm {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &CompletionParams,
    ) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let user = &messages[messages.len() - 1].content;
        let context = user
            .split("Context (retrieved):\n")
            .nth(1)
            .unwrap_or_default();
        if context.trim().is_empty() {
            Ok("The provided context is insufficient to answer this question.".to_string())
        } else {
            Ok(format!("Based on the context: {}", context.lines().next().unwrap_or("")))
        }
    }
}

/// [`FileLoader`] that waits before reading, so concurrent requests overlap.
pub struct SlowLoader(pub Duration);

#[async_trait]
impl DocumentLoader for SlowLoader {
    async fn load(&self, source: &Path) -> anyhow::Result<Vec<SourceUnit>> {
        tokio::time::sleep(self.0).await;
        FileLoader::new().load(source).await
    }
}

pub fn service(config: Config, store: Arc<dyn VectorStore>) -> (Service, Arc<EchoLlm>) {
    service_with_loader(config, store, Arc::new(FileLoader::new()))
}

pub fn service_with_loader(
    config: Config,
    store: Arc<dyn VectorStore>,
    loader: Arc<dyn DocumentLoader>,
) -> (Service, Arc<EchoLlm>) {
    let llm = Arc::new(EchoLlm::default());
    let service = Service::from_parts(config, loader, Arc::new(HashEmbedder), store, llm.clone());
    (service, llm)
}

/// A PDF with one text line per entry of `pages`, in standard Helvetica.
pub fn pdf_with_pages(pages: &[String]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

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

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![20.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
