use std::fmt;

pub type SendableError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RuntimeError {
    code: String,
    message: String,
}

impl RuntimeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn boxed(code: impl Into<String>, message: impl Into<String>) -> SendableError {
        Box::new(Self::new(code, message))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
