use std::error::Error;

use pubstore::{ObjectPublishedStorage, PublishError, PublishedStorageConfig};
use tokio::sync::{watch, OnceCell};

pub struct OpContext {
    /// Storage settings, with command line overrides applied
    pub config: PublishedStorageConfig,
    shutdown: watch::Receiver<()>,
    storage: OnceCell<ObjectPublishedStorage>,
}

impl OpContext {
    pub fn new(config: PublishedStorageConfig, shutdown: watch::Receiver<()>) -> Self {
        Self {
            config,
            shutdown,
            storage: OnceCell::new(),
        }
    }

    /// The published storage, connected on first use.
    pub async fn storage(&self) -> Result<&ObjectPublishedStorage, PublishError> {
        self.storage
            .get_or_try_init(|| async {
                let storage = ObjectPublishedStorage::from_config(self.config.clone()).await?;
                Ok(storage.with_shutdown(self.shutdown.clone()))
            })
            .await
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
