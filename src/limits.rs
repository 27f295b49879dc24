//! Resource limits for dispatch calls.

/// Default cap on nested dispatch calls made through delegating coders.
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 8;

/// Resource limits applied by the dispatcher.
///
/// Guards against runaway delegation chains and oversized sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Deepest nesting level a delegating coder may reach.
    pub max_delegation_depth: usize,
    /// Maximum frames handed to one encode call.
    pub max_frames: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            max_frames: None,
        }
    }
}

impl Limits {
    /// Limits with no frame cap and the default delegation depth.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the deepest nesting level. Zero allows only top-level calls.
    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    /// Cap the number of frames per encode call.
    pub fn with_max_frames(mut self, frames: usize) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Deepest nesting level a delegating coder may reach.
    pub fn max_delegation_depth(&self) -> usize {
        self.max_delegation_depth
    }

    /// Check a nesting level. Returns `Err` with the limit if exceeded.
    pub fn check_delegation_depth(&self, depth: usize) -> Result<(), usize> {
        if depth > self.max_delegation_depth {
            return Err(self.max_delegation_depth);
        }
        Ok(())
    }

    /// Check a sequence length. Returns `Err` with the limit if exceeded.
    pub fn check_frames(&self, frames: usize) -> Result<(), usize> {
        if let Some(max_frames) = self.max_frames {
            if frames > max_frames {
                return Err(max_frames);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default() {
        let limits = Limits::none();
        let max = DEFAULT_MAX_DELEGATION_DEPTH;
        assert!(limits.check_frames(usize::MAX).is_ok());
        assert!(limits.check_delegation_depth(max).is_ok());
        assert_eq!(limits.check_delegation_depth(max + 1), Err(max));
    }

    #[test]
    fn limits_frames() {
        let limits = Limits::default().with_max_frames(4);
        assert!(limits.check_frames(4).is_ok());
        assert_eq!(limits.check_frames(5), Err(4));
    }

    #[test]
    fn zero_depth_allows_only_top_level() {
        let limits = Limits::default().with_max_delegation_depth(0);
        assert!(limits.check_delegation_depth(0).is_ok());
        assert!(limits.check_delegation_depth(1).is_err());
    }
}
