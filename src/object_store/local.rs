use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{ObjectStore, ObjectStoreError, ObjectWriter};

/// Local filesystem object store.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn partial_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.partial"))
    }
}

/// Writes go to `<key>.partial` and are renamed into place on finish, so a
/// crashed or aborted upload never leaves a readable object.
pub struct LocalWriter {
    file: tokio::fs::File,
    partial: PathBuf,
    target: PathBuf,
}

#[async_trait]
impl ObjectWriter for LocalWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), ObjectStoreError> {
        self.file.write_all(&chunk).await?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(), ObjectStoreError> {
        let flushed = async {
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        drop(self.file);

        let result = match flushed {
            Ok(()) => tokio::fs::rename(&self.partial, &self.target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&self.partial).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), ObjectStoreError> {
        drop(self.file);
        if self.partial.exists() {
            tokio::fs::remove_file(&self.partial).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>, ObjectStoreError> {
        let partial = self.partial_path(key);
        let target = self.object_path(key);
        let file = tokio::fs::File::create(&partial).await?;
        Ok(Box::new(LocalWriter {
            file,
            partial,
            target,
        }))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key);
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key);
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn reader(
        &self,
        key: &str,
    ) -> Result<BoxStream<'static, std::io::Result<Bytes>>, ObjectStoreError> {
        let path = self.object_path(key);
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        let file = tokio::fs::File::open(&path).await?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key);
        Ok(path.exists())
    }
}
