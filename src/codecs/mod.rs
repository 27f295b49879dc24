//! Built-in coders.
//!
//! Each module exposes `register`/`unregister` for its own tag.
//! [`register_all`] installs all of them with default settings.

pub mod clip;
pub mod debug;
pub mod fd;

use crate::registry::FormatRegistry;

/// Install CLIP (without a clip-path rasterizer), FD, and DEBUG.
pub fn register_all(registry: &mut FormatRegistry) {
    clip::register(registry, None);
    fd::register(registry);
    debug::register(registry, debug::DebugCoder::default());
}

/// Remove every built-in coder.
pub fn unregister_all(registry: &mut FormatRegistry) {
    clip::unregister(registry);
    fd::unregister(registry);
    debug::unregister(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister_all() {
        let mut registry = FormatRegistry::new();
        register_all(&mut registry);
        assert_eq!(registry.len(), 3);
        let tags: Vec<_> = registry
            .all_formats()
            .map(|d| d.tag().to_string())
            .collect();
        assert_eq!(tags, vec!["CLIP", "DEBUG", "FD"]);
        unregister_all(&mut registry);
        assert!(registry.is_empty());
    }
}
