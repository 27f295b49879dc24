//! Exceptions, the per-call exception record, and error types.

use std::fmt;

use enough::StopReason;

use crate::format::Tag;

/// Category of a recorded exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ExceptionKind {
    /// No descriptor for the tag, or the descriptor lacks the requested direction.
    FormatNotSupported,
    /// A derived artifact (e.g. a clip mask) is absent and cannot be computed.
    ArtifactNotAvailable,
    /// The blob store could not open a stream.
    BlobOpenFailure,
    /// Writing to or closing an output stream failed.
    BlobWriteFailure,
    /// A nested decode failed; annotated with the delegating tag.
    UpstreamDecodeFailure,
    /// A nested encode failed; annotated with the delegating tag.
    UpstreamEncodeFailure,
    /// The progress monitor asked to stop.
    UserCancelled,
    /// Delegation nested deeper than [`Limits::max_delegation_depth`](crate::Limits).
    DelegationTooDeep,
    /// Handler-specific failure.
    CoderFailure,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionKind::FormatNotSupported => "format not supported",
            ExceptionKind::ArtifactNotAvailable => "artifact not available",
            ExceptionKind::BlobOpenFailure => "unable to open blob",
            ExceptionKind::BlobWriteFailure => "unable to write blob",
            ExceptionKind::UpstreamDecodeFailure => "upstream decode failed",
            ExceptionKind::UpstreamEncodeFailure => "upstream encode failed",
            ExceptionKind::UserCancelled => "cancelled",
            ExceptionKind::DelegationTooDeep => "delegation too deep",
            ExceptionKind::CoderFailure => "coder error",
        };
        f.write_str(name)
    }
}

/// How decisive an exception is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// One exception entry: kind, severity, message, and the tag it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exception {
    kind: ExceptionKind,
    severity: Severity,
    message: String,
    tag: Option<Tag>,
}

impl Exception {
    /// An error-severity exception.
    pub fn new(kind: ExceptionKind, tag: Option<&Tag>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            tag: tag.cloned(),
        }
    }

    /// A warning-severity exception.
    pub fn warning(kind: ExceptionKind, tag: Option<&Tag>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(kind, tag, message)
        }
    }

    /// No usable coder for `tag`, or no tag at all.
    pub fn format_not_supported(tag: Option<&Tag>, detail: impl Into<String>) -> Self {
        Self::new(ExceptionKind::FormatNotSupported, tag, detail)
    }

    /// The image carries no `artifact` and none could be computed.
    pub fn artifact_not_available(tag: &Tag, artifact: &str) -> Self {
        Self::new(
            ExceptionKind::ArtifactNotAvailable,
            Some(tag),
            format!("image does not have a {artifact}"),
        )
    }

    /// `path` could not be opened.
    pub fn blob_open(tag: &Tag, path: &str, error: &std::io::Error) -> Self {
        Self::new(
            ExceptionKind::BlobOpenFailure,
            Some(tag),
            format!("`{path}`: {error}"),
        )
    }

    /// Writing or closing an output stream failed.
    pub fn blob_write(tag: &Tag, error: &std::io::Error) -> Self {
        Self::new(
            ExceptionKind::BlobWriteFailure,
            Some(tag),
            error.to_string(),
        )
    }

    /// The progress monitor stopped the operation.
    pub fn cancelled(tag: &Tag, reason: StopReason) -> Self {
        Self::new(ExceptionKind::UserCancelled, Some(tag), reason.to_string())
    }

    /// What went wrong.
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// Whether the entry decides an outcome.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tag of the coder that raised this exception, if one was resolved.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Whether this entry decides the outcome of the call.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{} ({}): {}", self.kind, tag, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Exception {}

/// Append-only, ordered list of exceptions for one top-level call.
///
/// The record is handed down by `&mut` through every nested delegation, so
/// entries appear in the order they occurred. There is no way to remove or
/// reset entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionRecord {
    entries: Vec<Exception>,
}

impl ExceptionRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries are never removed.
    pub fn push(&mut self, exception: Exception) {
        tracing::debug!(
            kind = ?exception.kind,
            severity = ?exception.severity,
            tag = exception.tag.as_ref().map(Tag::as_str),
            message = %exception.message,
            "exception recorded"
        );
        self.entries.push(exception);
    }

    /// Entries in occurrence order.
    pub fn entries(&self) -> &[Exception] {
        &self.entries
    }

    /// Iterate entries in occurrence order.
    pub fn iter(&self) -> core::slice::Iter<'_, Exception> {
        self.entries.iter()
    }

    /// Number of entries, warnings included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any error-severity entry was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Exception::is_error)
    }

    /// The last decisive failure, which determines the call's outcome.
    pub fn last_error(&self) -> Option<&Exception> {
        self.entries.iter().rev().find(|e| e.is_error())
    }

    /// Highest severity recorded so far.
    pub fn severity(&self) -> Option<Severity> {
        self.entries.iter().map(Exception::severity).max()
    }

    /// Number of entries of `kind`.
    pub fn count(&self, kind: ExceptionKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Whether any entry is of `kind`.
    pub fn contains(&self, kind: ExceptionKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    /// Kinds in occurrence order.
    pub fn kinds(&self) -> Vec<ExceptionKind> {
        self.entries.iter().map(Exception::kind).collect()
    }
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("no exceptions recorded");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ExceptionRecord {
    type Item = &'a Exception;
    type IntoIter = core::slice::Iter<'a, Exception>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Registration failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("format tag must not be empty")]
    EmptyTag,
    #[error("format tag `{0}` must not contain `:` or whitespace")]
    InvalidTag(String),
}

/// Failure of a convenience [`Dispatcher::read`](crate::Dispatcher::read) or
/// [`Dispatcher::write`](crate::Dispatcher::write) call, carrying the full
/// exception record.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{record}")]
pub struct DispatchError {
    record: ExceptionRecord,
}

impl DispatchError {
    pub(crate) fn new(record: ExceptionRecord) -> Self {
        Self { record }
    }

    /// Every exception recorded during the call, in occurrence order.
    pub fn exceptions(&self) -> &ExceptionRecord {
        &self.record
    }

    /// Kind of the last decisive failure.
    pub fn kind(&self) -> Option<ExceptionKind> {
        self.record.last_error().map(Exception::kind)
    }

    /// Take ownership of the record.
    pub fn into_exceptions(self) -> ExceptionRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> Tag {
        Tag::new(s).unwrap()
    }

    #[test]
    fn record_keeps_occurrence_order() {
        let mut record = ExceptionRecord::new();
        record.push(Exception::warning(
            ExceptionKind::CoderFailure,
            Some(&tag("MIFF")),
            "odd header",
        ));
        record.push(Exception::format_not_supported(
            Some(&tag("XYZ")),
            "no decoder",
        ));
        record.push(Exception::new(
            ExceptionKind::UpstreamDecodeFailure,
            Some(&tag("CLIP")),
            "nested",
        ));

        assert_eq!(
            record.kinds(),
            vec![
                ExceptionKind::CoderFailure,
                ExceptionKind::FormatNotSupported,
                ExceptionKind::UpstreamDecodeFailure,
            ]
        );
        assert_eq!(
            record.last_error().map(Exception::kind),
            Some(ExceptionKind::UpstreamDecodeFailure)
        );
        assert_eq!(record.severity(), Some(Severity::Error));
    }

    #[test]
    fn warnings_are_not_decisive() {
        let mut record = ExceptionRecord::new();
        record.push(Exception::warning(ExceptionKind::CoderFailure, None, "w"));
        assert!(!record.has_errors());
        assert!(record.last_error().is_none());
        assert_eq!(record.severity(), Some(Severity::Warning));
    }

    #[test]
    fn display_includes_tag() {
        let e = Exception::artifact_not_available(&tag("clip"), "clip mask");
        assert_eq!(
            e.to_string(),
            "artifact not available (CLIP): image does not have a clip mask"
        );
        let e = Exception::format_not_supported(None, "no tag for `foo`");
        assert_eq!(e.to_string(), "format not supported: no tag for `foo`");
    }

    #[test]
    fn dispatch_error_reports_last_kind() {
        let mut record = ExceptionRecord::new();
        record.push(Exception::cancelled(&tag("DEBUG"), StopReason::Cancelled));
        let error = DispatchError::new(record);
        assert_eq!(error.kind(), Some(ExceptionKind::UserCancelled));
        assert_eq!(error.exceptions().len(), 1);

        let record = error.into_exceptions();
        assert!(record.contains(ExceptionKind::UserCancelled));
        assert_eq!(record.entries()[0].tag().map(Tag::as_str), Some("DEBUG"));
    }
}
