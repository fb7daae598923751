use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::warn;
use thiserror::Error;

/// Every named action a key can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    CloseView,
    Select,
    Next,
    Previous,
    Resize,
    ScrollDown,
    ScrollUp,
    JumpTop,
    JumpBottom,
    NextChapter,
    PreviousChapter,
    OpenToc,
    OpenBookmarks,
    OpenCommandLine,
    DeleteBookmark,
    Noop,
}

impl Action {
    const ALL: [Action; 17] = [
        Action::Quit,
        Action::CloseView,
        Action::Select,
        Action::Next,
        Action::Previous,
        Action::Resize,
        Action::ScrollDown,
        Action::ScrollUp,
        Action::JumpTop,
        Action::JumpBottom,
        Action::NextChapter,
        Action::PreviousChapter,
        Action::OpenToc,
        Action::OpenBookmarks,
        Action::OpenCommandLine,
        Action::DeleteBookmark,
        Action::Noop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Quit => "quit",
            Action::CloseView => "close_view",
            Action::Select => "select",
            Action::Next => "next",
            Action::Previous => "previous",
            Action::Resize => "resize",
            Action::ScrollDown => "scroll_down",
            Action::ScrollUp => "scroll_up",
            Action::JumpTop => "jump_top",
            Action::JumpBottom => "jump_bottom",
            Action::NextChapter => "next_chapter",
            Action::PreviousChapter => "previous_chapter",
            Action::OpenToc => "open_toc",
            Action::OpenBookmarks => "open_bookmarks",
            Action::OpenCommandLine => "open_command_line",
            Action::DeleteBookmark => "delete_bookmark",
            Action::Noop => "noop",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Self::ALL.into_iter().find(|action| action.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeySpecError {
    #[error("empty key spec")]
    Empty,
    #[error("unknown key {0:?}")]
    UnknownKey(String),
}

/// A key plus the modifiers that matter for dispatch (ctrl and alt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self {
            code,
            modifiers: modifiers & (KeyModifiers::CONTROL | KeyModifiers::ALT),
        }
    }

    /// Parses `"j"`, `"G"`, `"enter"`, `"ctrl+c"`, `"alt+left"` and the like.
    pub fn parse(spec: &str) -> Result<Self, KeySpecError> {
        let mut rest = spec.trim();
        let mut modifiers = KeyModifiers::NONE;
        loop {
            let lower = rest.to_ascii_lowercase();
            if lower.starts_with("ctrl+") && rest.len() > "ctrl+".len() {
                modifiers |= KeyModifiers::CONTROL;
                rest = &rest["ctrl+".len()..];
            } else if lower.starts_with("alt+") && rest.len() > "alt+".len() {
                modifiers |= KeyModifiers::ALT;
                rest = &rest["alt+".len()..];
            } else {
                break;
            }
        }

        let mut chars = rest.chars();
        let code = match (chars.next(), chars.next()) {
            (None, _) => return Err(KeySpecError::Empty),
            (Some(c), None) => KeyCode::Char(c),
            _ => match rest.to_ascii_lowercase().as_str() {
                "enter" => KeyCode::Enter,
                "esc" | "escape" => KeyCode::Esc,
                "backspace" => KeyCode::Backspace,
                "tab" => KeyCode::Tab,
                "space" => KeyCode::Char(' '),
                "up" => KeyCode::Up,
                "down" => KeyCode::Down,
                "left" => KeyCode::Left,
                "right" => KeyCode::Right,
                "pageup" => KeyCode::PageUp,
                "pagedown" => KeyCode::PageDown,
                "home" => KeyCode::Home,
                "end" => KeyCode::End,
                _ => return Err(KeySpecError::UnknownKey(spec.to_string())),
            },
        };
        Ok(Self::new(code, modifiers))
    }

    /// Shift is folded into the character itself, so `G` matches shift+g.
    pub fn from_event(event: &KeyEvent) -> Self {
        Self::new(event.code, event.modifiers)
    }
}

/// Key to action table for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    bindings: HashMap<KeyBinding, Action>,
}

impl Keymap {
    /// Builds a table from known-good specs.
    fn from_specs(specs: &[(&str, Action)]) -> Self {
        let mut keymap = Self::default();
        for (spec, action) in specs {
            if let Ok(binding) = KeyBinding::parse(spec) {
                keymap.bind(binding, *action);
            }
        }
        keymap
    }

    pub fn bind(&mut self, binding: KeyBinding, action: Action) {
        self.bindings.insert(binding, action);
    }

    pub fn action_for(&self, event: &KeyEvent) -> Option<Action> {
        self.bindings.get(&KeyBinding::from_event(event)).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Layers user bindings over the current ones.
    ///
    /// Bad key specs are skipped and unknown action names become
    /// [`Action::Noop`], both with a warning.
    pub fn apply_overrides(&mut self, context: &str, overrides: &BTreeMap<String, String>) {
        for (spec, name) in overrides {
            let binding = match KeyBinding::parse(spec) {
                Ok(binding) => binding,
                Err(e) => {
                    warn!("[{context}] ignoring binding for {spec:?}: {e}");
                    continue;
                }
            };
            let action = Action::from_name(name).unwrap_or_else(|| {
                warn!("[{context}] unknown action {name:?} for {spec:?}, binding it to noop");
                Action::Noop
            });
            self.bind(binding, action);
        }
    }
}

const LIST_BINDINGS: [(&str, Action); 8] = [
    ("q", Action::Quit),
    ("ctrl+c", Action::Quit),
    ("j", Action::Next),
    ("down", Action::Next),
    ("k", Action::Previous),
    ("up", Action::Previous),
    ("o", Action::Select),
    ("enter", Action::Select),
];

/// The key tables of every view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymaps {
    pub reader: Keymap,
    pub toc: Keymap,
    pub bookmarks: Keymap,
    /// Used by dialogs without a table of their own.
    pub list: Keymap,
}

impl Default for Keymaps {
    fn default() -> Self {
        let reader = Keymap::from_specs(&[
            ("q", Action::Quit),
            ("ctrl+c", Action::Quit),
            ("j", Action::ScrollDown),
            ("down", Action::ScrollDown),
            ("k", Action::ScrollUp),
            ("up", Action::ScrollUp),
            ("l", Action::NextChapter),
            ("right", Action::NextChapter),
            ("h", Action::PreviousChapter),
            ("left", Action::PreviousChapter),
            ("g", Action::JumpTop),
            ("home", Action::JumpTop),
            ("G", Action::JumpBottom),
            ("end", Action::JumpBottom),
            ("t", Action::OpenToc),
            ("B", Action::OpenBookmarks),
            (":", Action::OpenCommandLine),
        ]);

        let mut list = Keymap::from_specs(&LIST_BINDINGS);
        list.bind(KeyBinding::new(KeyCode::Esc, KeyModifiers::NONE), Action::CloseView);

        let mut toc = list.clone();
        toc.bind(KeyBinding::new(KeyCode::Char('t'), KeyModifiers::NONE), Action::CloseView);

        let mut bookmarks = list.clone();
        bookmarks.bind(KeyBinding::new(KeyCode::Char('B'), KeyModifiers::NONE), Action::CloseView);
        bookmarks.bind(
            KeyBinding::new(KeyCode::Char('d'), KeyModifiers::NONE),
            Action::DeleteBookmark,
        );

        Self {
            reader,
            toc,
            bookmarks,
            list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_parse_key_specs() {
        assert_eq!(
            KeyBinding::parse("j"),
            Ok(KeyBinding::new(KeyCode::Char('j'), KeyModifiers::NONE))
        );
        assert_eq!(
            KeyBinding::parse("ctrl+c"),
            Ok(KeyBinding::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
        );
        assert_eq!(
            KeyBinding::parse("Alt+Left"),
            Ok(KeyBinding::new(KeyCode::Left, KeyModifiers::ALT))
        );
        assert_eq!(
            KeyBinding::parse("space"),
            Ok(KeyBinding::new(KeyCode::Char(' '), KeyModifiers::NONE))
        );
        assert_eq!(
            KeyBinding::parse("+"),
            Ok(KeyBinding::new(KeyCode::Char('+'), KeyModifiers::NONE))
        );
        assert_eq!(KeyBinding::parse(""), Err(KeySpecError::Empty));
        assert!(matches!(
            KeyBinding::parse("hyper+x"),
            Err(KeySpecError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_shift_is_ignored_for_characters() {
        let keymaps = Keymaps::default();
        let shifted_g = press(KeyCode::Char('G'), KeyModifiers::SHIFT);
        assert_eq!(keymaps.reader.action_for(&shifted_g), Some(Action::JumpBottom));
        let g = press(KeyCode::Char('g'), KeyModifiers::NONE);
        assert_eq!(keymaps.reader.action_for(&g), Some(Action::JumpTop));
    }

    #[test]
    fn test_default_tables() {
        let keymaps = Keymaps::default();
        let ctrl_c = press(KeyCode::Char('c'), KeyModifiers::CONTROL);
        for keymap in [&keymaps.reader, &keymaps.toc, &keymaps.bookmarks, &keymaps.list] {
            assert_eq!(keymap.action_for(&ctrl_c), Some(Action::Quit));
        }
        let t = press(KeyCode::Char('t'), KeyModifiers::NONE);
        assert_eq!(keymaps.reader.action_for(&t), Some(Action::OpenToc));
        assert_eq!(keymaps.toc.action_for(&t), Some(Action::CloseView));
        assert_eq!(keymaps.list.action_for(&t), None);

        let d = press(KeyCode::Char('d'), KeyModifiers::NONE);
        assert_eq!(keymaps.bookmarks.action_for(&d), Some(Action::DeleteBookmark));
        assert_eq!(keymaps.toc.action_for(&d), None);
    }

    #[test]
    fn test_overrides_resolve_unknown_actions_to_noop() {
        let mut keymap = Keymaps::default().reader;
        let overrides = BTreeMap::from([
            ("n".to_string(), "scroll_down".to_string()),
            ("j".to_string(), "fly_away".to_string()),
            ("hyper+x".to_string(), "quit".to_string()),
        ]);
        keymap.apply_overrides("reader", &overrides);

        let n = press(KeyCode::Char('n'), KeyModifiers::NONE);
        assert_eq!(keymap.action_for(&n), Some(Action::ScrollDown));
        let j = press(KeyCode::Char('j'), KeyModifiers::NONE);
        assert_eq!(keymap.action_for(&j), Some(Action::Noop));
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_name("nope"), None);
    }
}
