use std::path::PathBuf;

use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination path under the publish prefix
    pub path: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Put {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        storage.put_file(&self.path, &self.source).await?;
        Ok(format!(
            "uploaded {} to {}/{}",
            self.source.display(),
            storage,
            self.path
        ))
    }
}
