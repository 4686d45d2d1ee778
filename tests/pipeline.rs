use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use local_rag::chat::ChatSession;
use local_rag::chunk::ChunkParams;
use local_rag::embedding::Embedder;
use local_rag::index::{IndexState, CHUNKS_FILE, VECTORS_FILE};
use local_rag::ingest::Ingestor;
use local_rag::llm::LanguageModel;
use local_rag::models::History;
use local_rag::prompt::PromptFormat;
use local_rag::retriever::Retriever;
use local_rag::RagError;
use tempfile::TempDir;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of 64 buckets.
struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-64"
    }

    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 64];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut h: u32 = 2166136261;
        for b in word.to_lowercase().bytes() {
            h = (h ^ b as u32).wrapping_mul(16777619);
        }
        v[(h % 64) as usize] += 1.0;
    }
    v
}

/// Fails any batch containing the word "offline".
struct FlakyEmbedder;

impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky-64"
    }

    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("offline")) {
            anyhow::bail!("embedding server went away");
        }
        HashEmbedder.embed(texts)
    }
}

struct EchoModel {
    prompts: Rc<RefCell<Vec<String>>>,
}

impl LanguageModel for EchoModel {
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok("the answer".to_string())
    }
}

fn retriever(chunk_size: usize, overlap: usize) -> Retriever {
    let ingestor = Ingestor::new(ChunkParams::new(chunk_size, overlap).unwrap());
    Retriever::new(ingestor, Box::new(HashEmbedder))
}

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("rust.txt"), "cargo builds crates").unwrap();
    fs::write(dir.join("python.md"), "pip installs packages").unwrap();
    fs::write(dir.join("ops.rst"), "kubernetes schedules pods").unwrap();
    fs::write(dir.join("notes.txt"), "cargo and pip and kubernetes").unwrap();
}

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, body) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

#[test]
fn persisted_index_answers_like_the_original() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    let store = tmp.path().join("store");
    write_corpus(&docs);

    let mut built = retriever(200, 20);
    assert_eq!(built.index_documents(&docs, &store).unwrap(), 4);
    assert!(store.join(VECTORS_FILE).is_file());
    assert!(store.join(CHUNKS_FILE).is_file());

    let mut loaded = retriever(200, 20);
    assert!(loaded.load_index(&store).unwrap());
    assert_eq!(loaded.index().state(), IndexState::Loaded);

    for query in ["cargo", "pip packages", "kubernetes pods", "unrelated words"] {
        assert_eq!(
            built.retrieve(query, 3).unwrap(),
            loaded.retrieve(query, 3).unwrap(),
            "query {query:?}"
        );
    }
    assert_eq!(loaded.retrieve("cargo builds crates", 1).unwrap(), vec!["cargo builds crates"]);
}

#[test]
fn top_k_beyond_corpus_returns_every_chunk_once() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    write_corpus(&docs);

    let mut r = retriever(200, 20);
    r.index_documents(&docs, &tmp.path().join("store")).unwrap();
    let mut hits = r.retrieve("cargo", 100).unwrap();
    assert_eq!(hits.len(), 4);
    hits.sort();
    hits.dedup();
    assert_eq!(hits.len(), 4);
}

#[test]
fn missing_index_then_fresh_build() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("missing_dir");
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("only.txt"), "a single small document").unwrap();

    let mut r = retriever(500, 100);
    assert!(!r.load_index(&store).unwrap());
    assert_eq!(r.index_documents(&docs, &store).unwrap(), 1);
    assert_eq!(
        r.retrieve("small document", 5).unwrap(),
        vec!["a single small document"]
    );
}

#[test]
fn half_written_index_is_not_accepted() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    let store = tmp.path().join("store");
    write_corpus(&docs);
    retriever(200, 20).index_documents(&docs, &store).unwrap();
    fs::remove_file(store.join(VECTORS_FILE)).unwrap();

    // A missing half reads as "no index yet".
    let mut r = retriever(200, 20);
    assert!(!r.load_index(&store).unwrap());
    assert!(matches!(r.retrieve("cargo", 1), Err(RagError::NotInitialized)));
}

#[test]
fn corrupt_archive_does_not_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("broken.zip"), b"PK\x03\x04 truncated garbage").unwrap();
    write_zip(
        &docs.join("good.zip"),
        &[("inner/manual.txt", "zip manual text")],
    );
    write_tar_gz(&docs.join("more.tar.gz"), &[("guide.md", "tarball guide text")]);
    fs::write(docs.join("plain.txt"), "plain file text").unwrap();

    let chunks = Ingestor::new(ChunkParams::new(500, 50).unwrap())
        .ingest(&docs)
        .unwrap();
    assert_eq!(
        chunks,
        vec!["zip manual text", "tarball guide text", "plain file text"]
    );
}

#[test]
fn chat_turn_puts_retrieved_context_in_the_system_block() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    write_corpus(&docs);
    let mut r = retriever(200, 20);
    r.index_documents(&docs, &tmp.path().join("store")).unwrap();

    let prompts = Rc::new(RefCell::new(Vec::new()));
    let model = EchoModel {
        prompts: prompts.clone(),
    };
    let chat = ChatSession::new(Box::new(model), PromptFormat::PlainText)
        .with_system_message("Answer from context.")
        .with_retriever(r, 1);

    let outcome = chat
        .turn(&History::new(), "cargo builds crates")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reply, "the answer");
    assert_eq!(
        prompts.borrow()[0],
        "Answer from context.\n\nContext:\ncargo builds crates\nUser: cargo builds crates"
    );

    assert!(chat.turn(&outcome.history, "   ").unwrap().is_none());
    assert_eq!(prompts.borrow().len(), 1);
}

#[test]
fn failed_prompt_build_leaves_the_session_usable() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    write_corpus(&docs);
    let ingestor = Ingestor::new(ChunkParams::new(200, 20).unwrap());
    let mut r = Retriever::new(ingestor, Box::new(FlakyEmbedder));
    r.index_documents(&docs, &tmp.path().join("store")).unwrap();

    let prompts = Rc::new(RefCell::new(Vec::new()));
    let model = EchoModel {
        prompts: prompts.clone(),
    };
    let chat = ChatSession::new(Box::new(model), PromptFormat::PlainText).with_retriever(r, 1);

    let history = History::new();
    assert!(chat.build_prompt(&history, "are you offline").is_err());
    assert!(prompts.borrow().is_empty());

    let prompt = chat.build_prompt(&history, "cargo").unwrap();
    let outcome = chat.complete_turn(&history, "cargo", &prompt).unwrap();
    assert_eq!(outcome.reply, "the answer");
    assert_eq!(outcome.history.turns().len(), 2);
}
