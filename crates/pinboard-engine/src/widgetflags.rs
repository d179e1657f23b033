/// Flags returned to the UI widget that holds the engine.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WidgetFlags {
    /// Needs surface redrawing.
    pub redraw: bool,
    /// Needs surface resizing.
    pub resize: bool,
    /// Refresh the UI with the engine state.
    pub refresh_ui: bool,
    /// Indicates that the store was modified, i.e. nodes inserted, moved, deleted, etc. .
    pub store_modified: bool,
    /// Update the current view offset and size.
    pub view_modified: bool,
    /// Indicates that the camera has changed its zoom.
    pub zoomed: bool,
    /// Is Some when undo button visibility should be changed. Is None if should not be changed.
    pub hide_undo: Option<bool>,
    /// Is Some when redo button visibility should be changed. Is None if should not be changed.
    pub hide_redo: Option<bool>,
}

impl Default for WidgetFlags {
    fn default() -> Self {
        Self {
            redraw: false,
            resize: false,
            refresh_ui: false,
            store_modified: false,
            view_modified: false,
            zoomed: false,
            hide_undo: None,
            hide_redo: None,
        }
    }
}

impl std::ops::BitOr for WidgetFlags {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self |= rhs;
        self
    }
}

impl std::ops::BitOrAssign for WidgetFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.redraw |= rhs.redraw;
        self.resize |= rhs.resize;
        self.refresh_ui |= rhs.refresh_ui;
        self.store_modified |= rhs.store_modified;
        self.view_modified |= rhs.view_modified;
        self.zoomed |= rhs.zoomed;
        if rhs.hide_undo.is_some() {
            self.hide_undo = rhs.hide_undo;
        }
        if rhs.hide_redo.is_some() {
            self.hide_redo = rhs.hide_redo;
        }
    }
}
