use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Paths to remove
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[async_trait::async_trait]
impl crate::op::Op for Rm {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        for path in &self.paths {
            storage.remove(path).await?;
        }
        Ok(format!("removed {} file(s) from {}", self.paths.len(), storage))
    }
}
