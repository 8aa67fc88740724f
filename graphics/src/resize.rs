//! Debounced window resizing.
//!
//! Dragging a window edge produces a burst of resize events. Each applied
//! resize drains the GPU and recreates every slot's targets, so
//! [`ResizeManager`] buffers the burst and reports a single resize once the
//! window has been quiet for the debounce period:
//!
//! ```text
//! events:  R R R R R R ... R [quiet >= debounce]
//!                                 │
//!                                 ▼
//!                     update() -> Some(ResizeEvent)
//! ```
//!
//! A zero-sized window (minimised) is tracked separately: it never produces
//! a resize, and [`ResizeManager::can_render`] is `false` until the window
//! gets a usable size again.

use std::time::{Duration, Instant};

/// Default quiet period before a resize is applied.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// A resize to apply, returned by [`ResizeManager::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// New width in pixels.
    pub width: u32,
    /// New height in pixels.
    pub height: u32,
    /// Width before the resize.
    pub previous_width: u32,
    /// Height before the resize.
    pub previous_height: u32,
}

/// Buffers window resize events until the window settles.
///
/// # Example
///
/// ```
/// use mapview_graphics::resize::ResizeManager;
/// use std::time::Duration;
///
/// let mut resize = ResizeManager::new((800, 600), Duration::from_millis(50));
/// resize.on_resize_event(1024, 768);
/// assert!(resize.is_pending());
/// // Still inside the quiet period.
/// assert!(resize.update().is_none());
/// ```
#[derive(Debug)]
pub struct ResizeManager {
    pending: Option<(u32, u32)>,
    last_event: Instant,
    debounce: Duration,
    current: (u32, u32),
    minimized: bool,
}

impl ResizeManager {
    /// Create a manager for a window of `initial_size`.
    pub fn new(initial_size: (u32, u32), debounce: Duration) -> Self {
        Self {
            pending: None,
            last_event: Instant::now(),
            debounce,
            current: initial_size,
            minimized: initial_size.0 == 0 || initial_size.1 == 0,
        }
    }

    /// Change the quiet period.
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// The quiet period.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a window resize event.
    pub fn on_resize_event(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            if !self.minimized {
                log::debug!("ResizeManager: window minimised");
            }
            self.minimized = true;
            return;
        }
        self.minimized = false;

        let size = (width, height);
        if size == self.current {
            // Resized back to where it started; nothing to apply.
            self.pending = None;
            return;
        }
        if self.pending == Some(size) {
            return;
        }
        self.pending = Some(size);
        self.last_event = Instant::now();
        log::trace!("ResizeManager: {width}x{height} pending");
    }

    /// Return the resize to apply once the quiet period has elapsed.
    ///
    /// Call once per frame, before beginning the frame.
    pub fn update(&mut self) -> Option<ResizeEvent> {
        if self.minimized || self.last_event.elapsed() < self.debounce {
            return None;
        }
        self.apply_pending()
    }

    /// Apply a pending resize immediately.
    pub fn force_resize(&mut self) -> Option<ResizeEvent> {
        if self.minimized {
            return None;
        }
        self.apply_pending()
    }

    fn apply_pending(&mut self) -> Option<ResizeEvent> {
        let (width, height) = self.pending.take()?;
        let (previous_width, previous_height) = self.current;
        self.current = (width, height);
        log::info!("Resize: {previous_width}x{previous_height} -> {width}x{height}");
        Some(ResizeEvent {
            width,
            height,
            previous_width,
            previous_height,
        })
    }

    /// Drop a pending resize.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Whether a resize is waiting for the quiet period.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the window is minimised.
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Whether frames should be rendered. `false` while minimised.
    pub fn can_render(&self) -> bool {
        !self.minimized
    }

    /// Size of the targets as last applied.
    pub fn current_size(&self) -> (u32, u32) {
        self.current
    }

    /// Size waiting to be applied.
    pub fn pending_size(&self) -> Option<(u32, u32)> {
        self.pending
    }

    /// Time left before the pending resize is applied.
    pub fn remaining_debounce(&self) -> Option<Duration> {
        self.pending?;
        Some(self.debounce.saturating_sub(self.last_event.elapsed()))
    }
}
