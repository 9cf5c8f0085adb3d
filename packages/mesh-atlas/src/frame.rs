//! Frame lifecycle state and per-frame results.

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Uninitialized,
    Ready,
    /// Viewport-sized targets are being recreated.
    Resizing,
    Rendering,
}

/// Tracks the orchestrator state and the viewport size the targets were built for.
#[derive(Debug, Clone)]
pub struct FrameStateMachine {
    state: FrameState,
    size: Option<(u32, u32)>,
    frames_rendered: u64,
}

impl Default for FrameStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStateMachine {
    pub fn new() -> Self {
        Self {
            state: FrameState::Uninitialized,
            size: None,
            frames_rendered: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Size the viewport targets were last built for.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// GPU resources exist; the first frame will still resize.
    pub fn initialize(&mut self) {
        if self.state == FrameState::Uninitialized {
            self.state = FrameState::Ready;
        }
    }

    /// Start a frame for a viewport of `size`. Returns true when the viewport
    /// targets must be recreated first (state is then `Resizing`).
    pub fn begin(&mut self, size: (u32, u32)) -> bool {
        debug_assert_eq!(self.state, FrameState::Ready, "frame started from {:?}", self.state);
        if self.size != Some(size) {
            self.state = FrameState::Resizing;
            true
        } else {
            self.state = FrameState::Rendering;
            false
        }
    }

    /// Viewport targets were rebuilt for `size`.
    pub fn resized(&mut self, size: (u32, u32)) {
        debug_assert_eq!(self.state, FrameState::Resizing);
        self.size = Some(size);
        self.state = FrameState::Rendering;
    }

    /// Unconditional return to `Ready` at the end of a frame.
    pub fn finish(&mut self) {
        debug_assert_eq!(self.state, FrameState::Rendering);
        self.frames_rendered += 1;
        self.state = FrameState::Ready;
    }
}

/// Why a frame did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The viewport provider reported no active 3D view.
    NoActiveViewport,
    /// The viewport has zero area.
    EmptyViewport,
}

/// Numbers gathered while rendering a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub viewport: (u32, u32),
    pub resized: bool,
    pub draws: usize,
    pub placed: usize,
    pub dropped: usize,
    pub shelf_height: u32,
}

/// Result of `render_frame`. A frame either completes or is skipped whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(FrameStats),
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn stats(&self) -> Option<&FrameStats> {
        match self {
            FrameOutcome::Rendered(stats) => Some(stats),
            FrameOutcome::Skipped(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_resizes() {
        let mut machine = FrameStateMachine::new();
        assert_eq!(machine.state(), FrameState::Uninitialized);
        machine.initialize();
        assert_eq!(machine.state(), FrameState::Ready);

        assert!(machine.begin((640, 480)));
        assert_eq!(machine.state(), FrameState::Resizing);
        machine.resized((640, 480));
        assert_eq!(machine.state(), FrameState::Rendering);
        machine.finish();
        assert_eq!(machine.state(), FrameState::Ready);
        assert_eq!(machine.frames_rendered(), 1);
    }

    #[test]
    fn test_same_size_skips_resize() {
        let mut machine = FrameStateMachine::new();
        machine.initialize();
        machine.begin((100, 100));
        machine.resized((100, 100));
        machine.finish();

        assert!(!machine.begin((100, 100)));
        machine.finish();
        assert!(machine.begin((200, 100)));
        machine.resized((200, 100));
        machine.finish();
        assert_eq!(machine.size(), Some((200, 100)));
        assert_eq!(machine.frames_rendered(), 3);
    }
}
