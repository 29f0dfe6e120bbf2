use std::{convert::Infallible, fmt::Display};

use crate::{graph::OpId, DType, Dim};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A graph-construction argument was rejected before any node was built.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Rank, dtype or shape was read before the producing op inferred it.
    #[error("metadata `{field}` of tensor `{node}` has not been inferred")]
    UninferredMetadata { node: String, field: &'static str },

    /// A reduction axis is out of range or repeated.
    #[error("invalid axis {axis} for a tensor of rank {rank}: {reason}")]
    InvalidAxis {
        axis: isize,
        rank: usize,
        reason: &'static str,
    },

    #[error("compilation failed at {op}: {reason}")]
    CompilationFailure { op: String, reason: String },

    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    #[error("realized buffer for `{node}` does not match its inferred metadata: expected {expected}, got {actual}")]
    BufferShapeMismatch {
        node: String,
        expected: String,
        actual: String,
    },

    #[error("Message: {0}")]
    Msg(String),

    #[error("{inner}\n{backtrace}")]
    WithBacktrace {
        inner: Box<Self>,
        backtrace: Box<std::backtrace::Backtrace>,
    },

    #[error("IO error: {0}")]
    IoError(String),

    /// Arbitrary errors wrapping.
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),

    /// Arbitrary errors wrapping with context.
    #[error("{wrapped:?}\n{context:?}")]
    WrappedContext {
        wrapped: Box<dyn std::error::Error + Send + Sync>,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new error based on a printable error message.
    ///
    /// If the message implements `std::error::Error`, prefer using [`Error::wrap`] instead.
    pub fn msg<M: Display>(msg: M) -> Self {
        Self::Msg(msg.to_string()).bt()
    }

    pub fn wrap(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(err)).bt()
    }

    pub fn invalid_argument<M: Display>(msg: M) -> Self {
        Self::InvalidArgument(msg.to_string())
    }

    pub(crate) fn uninferred(node: &str, field: &'static str) -> Self {
        Self::UninferredMetadata {
            node: node.to_string(),
            field,
        }
    }

    pub(crate) fn compilation(op: OpId, kind: &str, reason: impl Display) -> Self {
        Self::CompilationFailure {
            op: format!("{kind} (op #{})", op.index()),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn shape_mismatch(
        node: &str,
        expected: (DType, &[Dim]),
        actual: (DType, &[usize]),
    ) -> Self {
        Self::BufferShapeMismatch {
            node: node.to_string(),
            expected: format!("{}{:?}", expected.0, expected.1),
            actual: format!("{}{:?}", actual.0, actual.1),
        }
    }

    /// Errors raised while building the graph, before any node for the
    /// failing call exists.
    pub fn is_construction_error(&self) -> bool {
        match self {
            Self::InvalidArgument(_) | Self::InvalidAxis { .. } | Self::UninferredMetadata { .. } => {
                true
            }
            Self::WithBacktrace { inner, .. } => inner.is_construction_error(),
            _ => false,
        }
    }

    pub fn bt(self) -> Self {
        let backtrace = std::backtrace::Backtrace::capture();
        match backtrace.status() {
            std::backtrace::BacktraceStatus::Disabled
            | std::backtrace::BacktraceStatus::Unsupported => self,
            _ => Self::WithBacktrace {
                inner: Box::new(self),
                backtrace: Box::new(backtrace),
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::IoError(value.to_string())
    }
}

#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::Error::Msg(format!($msg).into()).bt())
    };
    ($err:expr $(,)?) => {
        return Err($crate::Error::Msg(format!($err).into()).bt())
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($fmt, $($arg)*).into()).bt())
    };
}

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for std::result::Result<T, E> where E: std::error::Error {}
    impl<T> Sealed for Option<T> {}
}

/// Attach more context to an error.
///
/// Inspired by [`anyhow::Context`].
pub trait Context<T, E>: private::Sealed {
    /// Wrap the error value with additional context.
    fn context<C>(self, context: C) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static;

    /// Wrap the error value with additional context that is evaluated lazily
    /// only once an error does occur.
    fn with_context<C, F>(self, f: F) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
    {
        // Not using map_err to save 2 useless frames off the captured backtrace
        // in ext_context.
        match self {
            Ok(ok) => Ok(ok),
            Err(error) => Err(Error::WrappedContext {
                wrapped: Box::new(error),
                context: context.to_string(),
            }),
        }
    }

    fn with_context<C, F>(self, context: F) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Ok(ok) => Ok(ok),
            Err(error) => Err(Error::WrappedContext {
                wrapped: Box::new(error),
                context: context().to_string(),
            }),
        }
    }
}

impl<T> Context<T, Infallible> for Option<T> {
    fn context<C>(self, context: C) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
    {
        // Not using ok_or_else to save 2 useless frames off the captured
        // backtrace.
        match self {
            Some(ok) => Ok(ok),
            None => Err(Error::msg(context)),
        }
    }

    fn with_context<C, F>(self, context: F) -> std::result::Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Some(ok) => Ok(ok),
            None => Err(Error::msg(context())),
        }
    }
}
