//! Read/write requests and destination-name handling.

use std::sync::Arc;

use crate::format::Tag;

/// Where to read from or write to, and how.
///
/// Requests are cheap to clone. Delegating coders always clone and then
/// adjust the copy; the caller's request is never modified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    target: String,
    tag: Option<Tag>,
    adjoin: bool,
    blob: Option<Arc<[u8]>>,
}

impl ImageRequest {
    /// A request for `target`, which may carry a `tag:` prefix.
    ///
    /// Adjoin defaults to `true`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tag: None,
            adjoin: true,
            blob: None,
        }
    }

    /// Force the format tag, overriding any prefix or sniffing.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Drop the explicit tag so the target name is resolved again.
    pub fn without_tag(mut self) -> Self {
        self.tag = None;
        self
    }

    /// Replace the target name, prefix included.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Whether several frames may be written into one destination.
    pub fn with_adjoin(mut self, adjoin: bool) -> Self {
        self.adjoin = adjoin;
        self
    }

    /// Read from (or describe) in-memory bytes instead of the target path.
    pub fn with_blob(mut self, blob: impl Into<Arc<[u8]>>) -> Self {
        self.blob = Some(blob.into());
        self
    }

    /// Clear any embedded blob.
    pub fn without_blob(mut self) -> Self {
        self.blob = None;
        self
    }

    /// The target as given, prefix included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The explicitly forced tag, if any.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Whether several frames may share one destination.
    pub fn adjoin(&self) -> bool {
        self.adjoin
    }

    /// Embedded bytes, if any.
    pub fn blob(&self) -> Option<&Arc<[u8]>> {
        self.blob.as_ref()
    }

    /// The `tag` part of a `tag:path` target.
    ///
    /// Only prefixes of two or more ASCII alphanumerics count, so Windows
    /// drive letters (`C:\x`) are not mistaken for tags.
    pub fn prefix(&self) -> Option<&str> {
        split_prefix(&self.target).map(|(prefix, _)| prefix)
    }

    /// The target with any `tag:` prefix removed.
    pub fn path(&self) -> &str {
        split_prefix(&self.target).map_or(self.target.as_str(), |(_, path)| path)
    }

    /// Extension of the final path component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let path = self.path();
        let name = &path[file_name_start(path)..];
        let dot = name.rfind('.')?;
        let ext = &name[dot + 1..];
        if dot == 0 || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    /// Destination name for frame `index` when frames go to separate files.
    ///
    /// A `%d` (or zero-padded `%0Nd`) placeholder in the name is replaced by
    /// the index. Otherwise `-<index>` is inserted before the extension of the
    /// final path component: `out.ext` → `out-3.ext`, `out` → `out-3`. Any
    /// `tag:` prefix is kept.
    pub fn frame_target(&self, index: usize) -> String {
        let (prefix, path) = match split_prefix(&self.target) {
            Some((prefix, path)) => (&self.target[..prefix.len() + 1], path),
            None => ("", self.target.as_str()),
        };
        if let Some(substituted) = substitute_index(path, index) {
            return format!("{prefix}{substituted}");
        }
        let name_start = file_name_start(path);
        let name = &path[name_start..];
        match name.rfind('.') {
            Some(dot) if dot > 0 => {
                let split = name_start + dot;
                format!("{prefix}{}-{index}{}", &path[..split], &path[split..])
            }
            _ => format!("{prefix}{path}-{index}"),
        }
    }
}

fn split_prefix(target: &str) -> Option<(&str, &str)> {
    let (prefix, path) = target.split_once(':')?;
    if prefix.len() >= 2 && prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Some((prefix, path))
    } else {
        None
    }
}

fn file_name_start(path: &str) -> usize {
    path.rfind(['/', '\\']).map_or(0, |i| i + 1)
}

/// Widest zero-padding honored in a `%0Nd` placeholder.
const MAX_INDEX_WIDTH: usize = 20;

/// Replace the first `%d` / `%0Nd` in `path` with `index`.
fn substitute_index(path: &str, index: usize) -> Option<String> {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'd' {
                let spec = &path[i + 1..j];
                let width: usize = if spec.is_empty() {
                    0
                } else {
                    spec.parse().ok().filter(|&w| w <= MAX_INDEX_WIDTH)?
                };
                let number = if spec.starts_with('0') {
                    format!("{index:0width$}")
                } else {
                    format!("{index:width$}")
                };
                return Some(format!("{}{}{}", &path[..i], number, &path[j + 1..]));
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefix_and_path() {
        let request = ImageRequest::new("miff:out.miff");
        assert_eq!(request.prefix(), Some("miff"));
        assert_eq!(request.path(), "out.miff");

        let drive = ImageRequest::new("C:\\images\\out.png");
        assert_eq!(drive.prefix(), None);
        assert_eq!(drive.path(), "C:\\images\\out.png");

        let plain = ImageRequest::new("out");
        assert_eq!(plain.prefix(), None);
        assert_eq!(plain.extension(), None);
    }

    #[test]
    fn extension_of_final_component() {
        assert_eq!(ImageRequest::new("dir.v2/out").extension(), None);
        assert_eq!(ImageRequest::new("dir.v2/out.Png").extension(), Some("Png"));
        assert_eq!(ImageRequest::new(".hidden").extension(), None);
        assert_eq!(ImageRequest::new("clip:a.miff").extension(), Some("miff"));
    }

    #[test]
    fn frame_names_insert_index_before_extension() {
        let request = ImageRequest::new("out.ext");
        let names: Vec<_> = (0..12).map(|i| request.frame_target(i)).collect();
        assert_eq!(names[0], "out-0.ext");
        assert_eq!(names[11], "out-11.ext");
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn frame_names_keep_prefix_and_directories() {
        assert_eq!(
            ImageRequest::new("miff:dir.v1/out.miff").frame_target(2),
            "miff:dir.v1/out-2.miff"
        );
        assert_eq!(
            ImageRequest::new("dir.v1/out").frame_target(0),
            "dir.v1/out-0"
        );
        assert_eq!(ImageRequest::new("out").frame_target(7), "out-7");
    }

    #[test]
    fn frame_names_use_placeholder() {
        assert_eq!(
            ImageRequest::new("frame%d.png").frame_target(4),
            "frame4.png"
        );
        assert_eq!(
            ImageRequest::new("frame%03d.png").frame_target(4),
            "frame004.png"
        );
    }

    #[test]
    fn frame_names_collision_free_at_scale() {
        let request = ImageRequest::new("out.ext");
        let mut seen = HashSet::with_capacity(1_000_000);
        for i in 0..1_000_000 {
            assert!(seen.insert(request.frame_target(i)));
        }
    }

    #[test]
    fn clone_then_modify_leaves_original() {
        let original = ImageRequest::new("clip:out.miff").with_blob(vec![1u8, 2, 3]);
        let derived = original.clone().without_blob().with_adjoin(false);
        assert!(original.blob().is_some());
        assert!(original.adjoin());
        assert!(derived.blob().is_none());
        assert!(!derived.adjoin());
    }
}
