use std::fmt;
use std::sync::Arc;

/// The single error type crossing this crate's public API boundary.
///
/// Cheap to clone: the payload is `Arc`-wrapped so the same cause can be
/// shared between a settled task and its parent's dominant-cause cell
/// without re-allocating or requiring the user's error type to be `Clone`.
#[derive(Clone, thiserror::Error)]
pub struct Error(Arc<ErrorInner>);

#[derive(thiserror::Error)]
enum ErrorInner {
    #[error("halted")]
    Halted,
    #[error(transparent)]
    User(anyhow::Error),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Debug for ErrorInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorInner::Halted => write!(f, "Halted"),
            ErrorInner::User(e) => write!(f, "User({e:?})"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error {
    /// The sentinel cancellation error, surfaced with the stable message "halted".
    pub fn halted() -> Self {
        Error(Arc::new(ErrorInner::Halted))
    }

    /// Wrap an arbitrary user-raised failure.
    pub fn user(e: impl Into<anyhow::Error>) -> Self {
        Error(Arc::new(ErrorInner::User(e.into())))
    }

    pub fn is_halted(&self) -> bool {
        matches!(&*self.0, ErrorInner::Halted)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::user(e)
    }
}

/// Internal dominant-cause lattice: `None < Halted < Err`. Within `Err`,
/// later cleanup errors always replace earlier ones (see SPEC_FULL.md §9).
#[derive(Clone, Default)]
pub(crate) enum Cause {
    #[default]
    None,
    Halted,
    Err(Error),
}

impl Cause {
    /// A child's (or this task's own body's) terminal error. Per the §4.2
    /// tie-break rule, the first such error observed while no stronger
    /// cause is already pending wins; later ones are dropped (their own
    /// cleanup still ran, we simply don't record their error as the cause).
    pub fn observe_child_error(&mut self, e: Error) {
        if matches!(self, Cause::None | Cause::Halted) {
            *self = Cause::Err(e);
        }
    }

    /// A cleanup-block error. Always dominates, per §9's dominant-error rule.
    pub fn observe_cleanup_error(&mut self, e: Error) {
        *self = Cause::Err(e);
    }

    /// Record that this task is halting, unless a stronger cause (an
    /// already-pending error) is recorded.
    pub fn mark_halted(&mut self) {
        if matches!(self, Cause::None) {
            *self = Cause::Halted;
        }
    }

    pub fn is_halting(&self) -> bool {
        !matches!(self, Cause::None)
    }

    pub fn as_error(&self) -> Option<Error> {
        match self {
            Cause::None => None,
            Cause::Halted => Some(Error::halted()),
            Cause::Err(e) => Some(e.clone()),
        }
    }
}
