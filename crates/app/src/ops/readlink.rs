use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Readlink {
    pub path: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Readlink {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        ctx.storage().await?.read_link(&self.path).await
    }
}
