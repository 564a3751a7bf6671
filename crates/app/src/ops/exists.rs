use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Exists {
    pub path: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Exists {
    type Error = PublishError;
    type Output = bool;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        ctx.storage().await?.file_exists(&self.path).await
    }
}
