use clap::Args;
use pubstore::PublishError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Path of the file to print
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("{0} does not exist")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        let bytes = storage
            .read_file(&self.path)
            .await?
            .ok_or_else(|| CatError::NotFound(self.path.clone()))?;

        // Binary content is shown as hex
        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Ok(format!(
                "Binary content ({} bytes, hex): {}",
                bytes.len(),
                bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ")
            )),
        }
    }
}
