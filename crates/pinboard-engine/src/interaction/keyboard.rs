// Imports
use super::InteractionState;
use crate::align::AlignAxis;
use crate::engine::Engine;
use crate::WidgetFlags;
use pinboard_compose::eventresult::{EventPropagation, EventResult};
use pinboard_compose::inputevent::{GestureProgress, KeyboardKey, ModifierKey};
use std::collections::HashSet;
use std::time::Instant;

impl Engine {
    /// The keyboard shortcut surface.
    ///
    /// While a title or text edit is live, keys feed the edit buffer and the shortcut
    /// catalog is suppressed.
    pub(crate) fn handle_key_pressed(
        &mut self,
        keyboard_key: KeyboardKey,
        modifier_keys: &HashSet<ModifierKey>,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let mut widget_flags = WidgetFlags::default();
        let keyboard_key = keyboard_key.filter_convert_unicode_control_chars();
        let ctrl = modifier_keys.contains(&ModifierKey::KeyboardCtrl);
        let shift = modifier_keys.contains(&ModifierKey::KeyboardShift);

        if self.interaction.is_editing() {
            let handled = match keyboard_key {
                KeyboardKey::BackSpace => {
                    if let InteractionState::EditTitle { buffer, .. }
                    | InteractionState::EditText { buffer, .. } = &mut self.interaction
                    {
                        buffer.pop();
                    }
                    widget_flags.redraw = true;
                    true
                }
                KeyboardKey::CarriageReturn | KeyboardKey::Linefeed | KeyboardKey::Escape => {
                    widget_flags |= self.commit_editing(now);
                    true
                }
                KeyboardKey::Unicode(c) if !ctrl => {
                    if let InteractionState::EditTitle { buffer, .. }
                    | InteractionState::EditText { buffer, .. } = &mut self.interaction
                    {
                        buffer.push(c);
                    }
                    widget_flags.redraw = true;
                    true
                }
                _ => false,
            };
            return keyboard_result(handled, widget_flags);
        }

        let handled = match keyboard_key {
            KeyboardKey::Delete | KeyboardKey::BackSpace => {
                widget_flags |= self.delete_selection(now);
                true
            }
            KeyboardKey::Unicode(c) => match (c.to_ascii_lowercase(), ctrl, shift) {
                ('c', true, _) => {
                    widget_flags |= self.copy_selection();
                    true
                }
                ('x', true, _) => {
                    widget_flags |= self.cut_selection(now);
                    true
                }
                ('v', true, _) => {
                    let paste_pos = self.camera.screen_to_world(self.cursor_pos);
                    widget_flags |= self.paste_clipboard(paste_pos, now);
                    true
                }
                ('d', true, _) => {
                    widget_flags |= self.duplicate_selection_in_place(now);
                    true
                }
                ('a', true, _) => {
                    widget_flags |= self.select_all();
                    true
                }
                ('z', true, true) => {
                    widget_flags |= self.redo(now);
                    true
                }
                ('z', true, false) => {
                    widget_flags |= self.undo(now);
                    true
                }
                ('f', false, _) => {
                    widget_flags |= self.fit_view();
                    true
                }
                ('h', false, _) => {
                    widget_flags |= self.camera.reset_to_origin();
                    self.schedule_viewport_persist();
                    true
                }
                ('[', false, _) => {
                    widget_flags |= self.z_step_selection(false, now);
                    true
                }
                (']', false, _) => {
                    widget_flags |= self.z_step_selection(true, now);
                    true
                }
                ('1', false, _) => {
                    widget_flags |= self.align_selection(AlignAxis::Horizontal);
                    true
                }
                ('2', false, _) => {
                    widget_flags |= self.align_selection(AlignAxis::Vertical);
                    true
                }
                ('t', false, true) => {
                    widget_flags |= self.toggle_selection_titles(now);
                    true
                }
                ('t', false, false) => {
                    let pos = self.camera.screen_to_world(self.cursor_pos);
                    widget_flags |= self.create_text_node(pos, now);
                    true
                }
                ('g', false, false) => {
                    let pos = self.camera.screen_to_world(self.cursor_pos);
                    widget_flags |= self.create_groupbox(pos, now);
                    true
                }
                _ => false,
            },
            _ => false,
        };

        keyboard_result(handled, widget_flags)
    }

    /// Committed text input. Feeds a live title/text edit, ignored otherwise.
    pub(crate) fn handle_text(
        &mut self,
        text: String,
        _now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let mut widget_flags = WidgetFlags::default();
        let handled = match &mut self.interaction {
            InteractionState::EditTitle { buffer, .. }
            | InteractionState::EditText { buffer, .. } => {
                buffer.push_str(&text);
                widget_flags.redraw = true;
                true
            }
            _ => false,
        };
        keyboard_result(handled, widget_flags)
    }
}

fn keyboard_result(
    handled: bool,
    widget_flags: WidgetFlags,
) -> (EventResult<GestureProgress>, WidgetFlags) {
    (
        EventResult {
            handled,
            propagate: if handled {
                EventPropagation::Stop
            } else {
                EventPropagation::Proceed
            },
            progress: if handled {
                GestureProgress::InProgress
            } else {
                GestureProgress::Idle
            },
        },
        widget_flags,
    )
}
