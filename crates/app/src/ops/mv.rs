use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Mv {
    pub from: String,
    pub to: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Mv {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        storage.rename_file(&self.from, &self.to).await?;
        Ok(format!("renamed {} to {}", self.from, self.to))
    }
}
