use clap::Args;
use pubstore::{PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Ln {
    /// Existing file the link points at
    pub target: String,

    /// Path of the new link
    pub link: String,

    /// Create a hard link instead of a symbolic one
    #[arg(long)]
    pub hard: bool,
}

#[async_trait::async_trait]
impl crate::op::Op for Ln {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        if self.hard {
            storage.hard_link(&self.target, &self.link).await?;
        } else {
            storage.symlink(&self.target, &self.link).await?;
        }
        Ok(format!("{} -> {}", self.link, self.target))
    }
}
