//! Tunables for the chat engine

/// Configuration for membership rules, paging and the viewport contract
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Messages kept in the live tail window (default: 30)
    pub tail_window: usize,

    /// Messages fetched per backward page (default: 30)
    pub page_size: usize,

    /// Smallest group, creator included (default: 2)
    pub min_group_size: usize,

    /// Largest group, creator included (default: 5)
    pub max_group_size: usize,

    /// Group names are trimmed then cut to this many characters (default: 50)
    pub group_name_max_chars: usize,

    /// Reply previews longer than this are cut and get an ellipsis (default: 80)
    pub reply_preview_max_chars: usize,

    /// Distance from the bottom, in layout units, within which tail updates
    /// keep the view pinned to the newest message (default: 150)
    pub stick_to_bottom_threshold: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            tail_window: 30,
            page_size: 30,
            min_group_size: 2,
            max_group_size: 5,
            group_name_max_chars: 50,
            reply_preview_max_chars: 80,
            stick_to_bottom_threshold: 150.0,
        }
    }
}
