//! Scroll decisions for a message list
//!
//! The controller never touches a real view. The host reports layout
//! metrics and applies the returned [`ScrollAction`].

/// Layout snapshot of the scrolling message list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ViewportMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    Stay,
    ScrollToBottom,
    /// Set `scroll_top` to this offset
    ScrollTo(f64),
}

#[derive(Debug, Clone)]
pub struct ScrollController {
    stick_threshold: f64,
    initial_scroll_done: bool,
    prepend_anchor: Option<ViewportMetrics>,
}

impl ScrollController {
    pub fn new(stick_threshold: f64) -> Self {
        Self {
            stick_threshold,
            initial_scroll_done: false,
            prepend_anchor: None,
        }
    }

    /// Decide how to react to a tail update.
    ///
    /// `before` must be measured before the new messages were laid out.
    pub fn on_tail_update(&mut self, before: ViewportMetrics, grew_at_bottom: bool) -> ScrollAction {
        if !self.initial_scroll_done {
            self.initial_scroll_done = true;
            return ScrollAction::ScrollToBottom;
        }

        if grew_at_bottom && before.distance_from_bottom() < self.stick_threshold {
            ScrollAction::ScrollToBottom
        } else {
            ScrollAction::Stay
        }
    }

    /// Remember the layout right before older messages are prepended
    pub fn begin_prepend(&mut self, before: ViewportMetrics) {
        self.prepend_anchor = Some(before);
    }

    /// Offset that keeps the previously topmost message in place
    pub fn finish_prepend(&mut self, after: ViewportMetrics) -> ScrollAction {
        match self.prepend_anchor.take() {
            Some(before) => {
                let delta = after.scroll_height - before.scroll_height;
                ScrollAction::ScrollTo(before.scroll_top + delta)
            }
            None => ScrollAction::Stay,
        }
    }
}
