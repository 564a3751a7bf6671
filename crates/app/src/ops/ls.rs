use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list, relative to the publish prefix
    #[arg(default_value = "")]
    pub prefix: String,

    /// Print the listing as a JSON array
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let files = ctx.storage().await?.filelist(&self.prefix).await?;
        if self.json {
            return Ok(serde_json::to_string_pretty(&files)?);
        }
        Ok(files.join("\n"))
    }
}
