#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },
}

impl EngineError {
    pub(crate) fn config(context: &'static str, detail: impl Into<String>) -> Self {
        EngineError::Config { context, detail: detail.into() }
    }
}
