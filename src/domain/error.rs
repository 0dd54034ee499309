//! Domain error types.

/// A rejected trigger expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("invalid expression '{expression}' at token {position} ('{token}'): {reason}")]
    InvalidExpression {
        expression: String,
        token: String,
        position: usize,
        reason: String,
    },

    #[error("expression is {len} characters long, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("forbidden token '{token}' in expression")]
    ForbiddenToken { token: String },
}

impl CompileError {
    /// Format the error with a caret under the offending token.
    pub fn display_with_context(&self, input: &str) -> String {
        match self {
            CompileError::InvalidExpression { position, .. } => {
                let offset: usize = input
                    .split_whitespace()
                    .take(*position)
                    .map(|t| t.len() + 1)
                    .sum();
                let caret = " ".repeat(offset) + "^";
                format!("{input}\n{caret}\n{self}")
            }
            _ => format!("{input}\n{self}"),
        }
    }
}

/// Top-level error type for optitrader.
#[derive(Debug, thiserror::Error)]
pub enum OptitraderError {
    #[error("invalid request field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown indicator '{name}' for alias '{alias}'")]
    UnknownIndicator { alias: String, name: String },

    #[error("invalid parameter range for '{name}': {reason}")]
    InvalidParameterRange { name: String, reason: String },

    #[error("unsupported objective '{name}'")]
    UnsupportedObjective { name: String },

    #[error("trigger pair '{pair}' {side} rejected: {source}")]
    Compile {
        pair: String,
        side: String,
        #[source]
        source: CompileError,
    },

    #[error("indicator run cache already holds key {key}")]
    DuplicateCacheKey { key: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol} at {timeframe}")]
    NoData { symbol: String, timeframe: String },

    #[error("insufficient data for {context}: have {bars} bars, need {minimum}")]
    InsufficientData {
        context: String,
        bars: usize,
        minimum: usize,
    },

    #[error("simulation failed: {reason}")]
    Simulation { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&OptitraderError> for std::process::ExitCode {
    fn from(err: &OptitraderError) -> Self {
        let code: u8 = match err {
            OptitraderError::Io(_) => 1,
            OptitraderError::ConfigParse { .. }
            | OptitraderError::ConfigMissing { .. }
            | OptitraderError::ConfigInvalid { .. } => 2,
            OptitraderError::Data { .. } | OptitraderError::NoData { .. } => 3,
            OptitraderError::Validation { .. }
            | OptitraderError::UnknownIndicator { .. }
            | OptitraderError::InvalidParameterRange { .. }
            | OptitraderError::UnsupportedObjective { .. }
            | OptitraderError::Compile { .. }
            | OptitraderError::Json(_) => 4,
            OptitraderError::InsufficientData { .. } => 5,
            OptitraderError::DuplicateCacheKey { .. } | OptitraderError::Simulation { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
