//! Step algebra
//!
//! The outcome of one pull. Every consumer matches all three variants.

use std::fmt;

use super::Stream;

/// Result of pulling a [`Stream`] once.
pub enum Step<A: Send + 'static> {
    /// An element together with the rest of the stream.
    Emit(A, Stream<A>),
    /// No element this time; continue with the remainder.
    ///
    /// Lets filters and state transitions advance without producing a value.
    Skip(Stream<A>),
    /// The stream is exhausted.
    Done,
}

impl<A: Send + 'static> Step<A> {
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// The emitted element, if any.
    pub fn value(&self) -> Option<&A> {
        match self {
            Self::Emit(value, _) => Some(value),
            Self::Skip(_) | Self::Done => None,
        }
    }

    /// The continuation, if the stream is not exhausted.
    pub fn into_tail(self) -> Option<Stream<A>> {
        match self {
            Self::Emit(_, tail) | Self::Skip(tail) => Some(tail),
            Self::Done => None,
        }
    }
}

impl<A: Send + fmt::Debug + 'static> fmt::Debug for Step<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emit(value, _) => f.debug_tuple("Emit").field(value).finish(),
            Self::Skip(_) => f.write_str("Skip"),
            Self::Done => f.write_str("Done"),
        }
    }
}
