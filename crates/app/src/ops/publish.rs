use std::path::PathBuf;

use clap::Args;
use pubstore::{ChecksumInfo, PublishError, PublishedStorage};

/// Place local package files into a published directory, skipping files
/// that are already there unchanged.
#[derive(Args, Debug, Clone)]
pub struct Publish {
    /// Published directory, e.g. pool/main/h/hello
    pub directory: String,

    /// Package files to publish
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Overwrite published files whose content differs
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishOpError {
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("error reading {}: {source}", .path.display())]
    Checksum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::op::Op for Publish {
    type Error = PublishOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;

        let mut lines = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let checksums =
                ChecksumInfo::compute(path)
                    .await
                    .map_err(|source| PublishOpError::Checksum {
                        path: path.clone(),
                        source,
                    })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            storage
                .link_from_pool(&self.directory, &file_name, path, &checksums, self.force)
                .await?;
            lines.push(format!("{}/{}", self.directory, file_name));
        }

        Ok(lines.join("\n"))
    }
}
