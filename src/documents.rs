use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::{Embedder, LlmError};

const INDEX_FILE: &str = "index.json";

/// A raw document read from the document source.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

/// Read `.txt`, `.md` and `.pdf` documents from a single file or a directory.
pub fn load_documents<P: AsRef<Path>>(source: P) -> Result<Vec<Document>> {
    let source = source.as_ref();
    let metadata = std::fs::metadata(source)
        .with_context(|| format!("Document source not found: {}", source.display()))?;

    let mut paths: Vec<PathBuf> = if metadata.is_dir() {
        std::fs::read_dir(source)
            .with_context(|| format!("Failed to read document directory {}", source.display()))?
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.path()),
                Err(e) => {
                    log::warn!("Documents: failed to read dir entry: {}", e);
                    None
                }
            })
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("txt" | "md" | "pdf")))
            .collect()
    } else {
        vec![source.to_path_buf()]
    };
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = read_document(&path)?;
        documents.push(Document {
            source: path.file_name().unwrap_or_default().to_string_lossy().to_string(),
            text,
        });
    }

    if documents.is_empty() {
        anyhow::bail!("No documents found in {}", source.display());
    }

    log::info!("Documents: loaded {} document(s) from {}", documents.len(), source.display());
    Ok(documents)
}

fn read_document(path: &Path) -> Result<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => pdf_extract::extract_text(path)
            .map_err(|e| anyhow::anyhow!("Failed to extract text from {}: {:?}", path.display(), e)),
        _ => std::fs::read_to_string(path).with_context(|| format!("Failed to read document {}", path.display())),
    }
}

/// Split text into chunks of at most `chunk_size` characters, packing whole
/// paragraphs where possible. Paragraphs longer than `chunk_size` are split
/// on character boundaries.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = paragraph.chars().count();

        if para_len > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(chunk_size) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { para_len } else { current.chars().count() + 2 + para_len };
        if needed > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Embedded document chunks, persisted as JSON under an index directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
    pub chunks: Vec<DocumentChunk>,
}

impl DocumentIndex {
    /// Chunk and embed documents.
    pub async fn build(documents: &[Document], embedder: &dyn Embedder, chunk_size: usize) -> Result<Self> {
        let mut pieces: Vec<(String, String)> = Vec::new();
        for doc in documents {
            for chunk in chunk_text(&doc.text, chunk_size) {
                pieces.push((doc.source.clone(), chunk));
            }
        }

        let texts: Vec<String> = pieces.iter().map(|(_, text)| text.clone()).collect();
        log::info!("Documents: embedding {} chunk(s) with {}", texts.len(), embedder.model_name());
        let embeddings = embedder
            .embed(&texts)
            .await
            .context("Failed to embed document chunks")?;

        if embeddings.len() != pieces.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                pieces.len()
            );
        }

        let chunks = pieces
            .into_iter()
            .zip(embeddings)
            .map(|((source, text), embedding)| DocumentChunk { source, text, embedding })
            .collect();

        Ok(Self {
            embedding_model: embedder.model_name().to_string(),
            built_at: Utc::now(),
            chunks,
        })
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(INDEX_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse index {}", path.display()))
    }

    pub fn persist<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;
        let path = dir.join(INDEX_FILE);
        let content = serde_json::to_string(self).context("Failed to serialize index")?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write index {}", path.display()))?;
        log::info!("Documents: index persisted to {}", path.display());
        Ok(())
    }

    /// Reuse the persisted index when it was built with the same embedding
    /// model, otherwise build from `source` and persist.
    pub async fn load_or_build(
        source: &Path,
        index_dir: &Path,
        embedder: &dyn Embedder,
        chunk_size: usize,
    ) -> Result<Self> {
        if index_dir.join(INDEX_FILE).exists() {
            match Self::load(index_dir) {
                Ok(index) if index.embedding_model == embedder.model_name() => {
                    log::info!(
                        "Documents: loaded index from {} ({} chunks, built {})",
                        index_dir.display(),
                        index.chunks.len(),
                        index.built_at.format("%Y-%m-%d %H:%M")
                    );
                    return Ok(index);
                }
                Ok(index) => log::warn!(
                    "Documents: index built with {}, rebuilding for {}",
                    index.embedding_model,
                    embedder.model_name()
                ),
                Err(e) => log::warn!("Documents: ignoring unreadable index: {:#}", e),
            }
        }

        let documents = load_documents(source)?;
        let index = Self::build(&documents, embedder, chunk_size).await?;
        index.persist(index_dir)?;
        Ok(index)
    }

    /// The `top_k` chunks most similar to `query`, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<&DocumentChunk>, LlmError> {
        let query_vector = embedder
            .embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or(LlmError::EmptyResponse)?;

        let mut scored: Vec<(f32, &DocumentChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_vector, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(top_k).map(|(_, chunk)| chunk).collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
