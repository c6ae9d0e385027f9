use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::document::model::{Document, DocumentId};
use crate::fs_json::{list_json_files, read_json, write_json_atomic};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: &Document) -> anyhow::Result<()>;
    async fn get(&self, id: DocumentId) -> anyhow::Result<Option<Document>>;
    async fn put(&self, document: &Document) -> anyhow::Result<()>;
    async fn list(&self) -> anyhow::Result<Vec<Document>>;
}

#[derive(Debug, Clone)]
pub struct LocalFsDocumentStore {
    base_dir: PathBuf,
}

impl LocalFsDocumentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn documents_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }

    fn document_path(&self, id: DocumentId) -> PathBuf {
        self.documents_dir().join(format!("{id}.json"))
    }
}

#[async_trait]
impl DocumentStore for LocalFsDocumentStore {
    async fn create(&self, document: &Document) -> anyhow::Result<()> {
        let path = self.document_path(document.id);
        if tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            anyhow::bail!("document already exists: {}", document.id);
        }
        write_json_atomic(&path, document)
            .await
            .context("write document json")
    }

    async fn get(&self, id: DocumentId) -> anyhow::Result<Option<Document>> {
        let path = self.document_path(id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, document: &Document) -> anyhow::Result<()> {
        write_json_atomic(&self.document_path(document.id), document)
            .await
            .context("write document json")
    }

    async fn list(&self) -> anyhow::Result<Vec<Document>> {
        let mut documents = Vec::new();
        for path in list_json_files(&self.documents_dir()).await? {
            if let Some(document) = read_json::<Document>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                documents.push(document);
            }
        }
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }
}
