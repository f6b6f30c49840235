//! Key definitions, modifier tracking and the global shortcut table
//!
//! Global shortcuts:
//! - F1: start a voice command
//! - H: help
//! - Alt+0..4: jump to home/document/braille/quiz/history
//! - Escape: close the topmost overlay
//! - Ctrl+C: quit
//!
//! While text is being typed, H, Escape and plain digits belong to the text.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::commands::Route;

/// A key, independent of the terminal backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    F(u8),
    Enter,
    Esc,
    Backspace,
    Tab,
    Left,
    Right,
    Other,
}

/// Tracks which modifier keys are held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    /// Control key is held
    pub control: bool,
    /// Alt/Option key is held
    pub alt: bool,
    /// Shift key is held
    pub shift: bool,
}

impl ModifierState {
    /// Create a ModifierState from crossterm modifier flags
    pub fn from_flags(flags: KeyModifiers) -> Self {
        Self {
            control: flags.contains(KeyModifiers::CONTROL),
            alt: flags.contains(KeyModifiers::ALT),
            shift: flags.contains(KeyModifiers::SHIFT),
        }
    }

    /// Check if no modifier is held (Shift is ignored)
    pub fn is_empty(&self) -> bool {
        !self.control && !self.alt
    }

    /// Check if only Alt is held (for direct navigation)
    pub fn is_alt_only(&self) -> bool {
        self.alt && !self.control
    }

    /// Check if only Control is held
    pub fn is_control_only(&self) -> bool {
        self.control && !self.alt
    }
}

/// A key press with the modifiers held at the time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: ModifierState,
}

impl KeyPress {
    /// Key press with no modifiers
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: ModifierState::default(),
        }
    }

    pub fn alt(key: Key) -> Self {
        Self {
            key,
            modifiers: ModifierState {
                alt: true,
                ..ModifierState::default()
            },
        }
    }

    pub fn control(key: Key) -> Self {
        Self {
            key,
            modifiers: ModifierState {
                control: true,
                ..ModifierState::default()
            },
        }
    }

    /// Convert a crossterm key event
    pub fn from_event(event: &KeyEvent) -> Self {
        let key = match event.code {
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::F(n) => Key::F(n),
            KeyCode::Enter => Key::Enter,
            KeyCode::Esc => Key::Esc,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            _ => Key::Other,
        };
        Self {
            key,
            modifiers: ModifierState::from_flags(event.modifiers),
        }
    }

    /// Ctrl+C
    pub fn is_interrupt(&self) -> bool {
        self.modifiers.is_control_only() && matches!(self.key, Key::Char('c') | Key::Char('C'))
    }
}

/// Actions reachable from anywhere in the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    StartVoiceCommand,
    ShowHelp,
    /// Direct navigation, bypassing the phrase table
    Navigate(Route),
    CloseOverlay,
    /// A plain digit; selects a picker entry while the picker is open
    Digit(u8),
    Quit,
}

/// Route bound to Alt+`digit`
pub fn route_for_digit(digit: char) -> Option<Route> {
    match digit {
        '0' => Some(Route::Home),
        '1' => Some(Route::DocumentUpload),
        '2' => Some(Route::Braille),
        '3' => Some(Route::Quiz),
        '4' => Some(Route::History),
        _ => None,
    }
}

/// Classify a key press against the global shortcut table.
///
/// `text_focus` is true while keys are being typed into a text field. Keys
/// that produce text (H, Escape, plain digits) are left to the field then;
/// F1, Alt combinations and Ctrl+C still work.
pub fn global_shortcut(press: &KeyPress, text_focus: bool) -> Option<Shortcut> {
    if press.is_interrupt() {
        return Some(Shortcut::Quit);
    }

    match press.key {
        Key::F(1) => Some(Shortcut::StartVoiceCommand),
        Key::Char(c) if press.modifiers.is_alt_only() => route_for_digit(c).map(Shortcut::Navigate),
        _ if text_focus => None,
        Key::Esc => Some(Shortcut::CloseOverlay),
        Key::Char('h') | Key::Char('H') if !press.modifiers.control => Some(Shortcut::ShowHelp),
        Key::Char(c) if press.modifiers.is_empty() && c.is_ascii_digit() => {
            c.to_digit(10).map(|d| Shortcut::Digit(d as u8))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state() {
        let state = ModifierState::default();
        assert!(state.is_empty());
        assert!(!state.is_alt_only());
        assert!(!state.is_control_only());
    }

    #[test]
    fn test_from_flags() {
        let state = ModifierState::from_flags(KeyModifiers::ALT | KeyModifiers::SHIFT);
        assert!(state.alt);
        assert!(state.shift);
        assert!(!state.control);
        assert!(state.is_alt_only());
    }

    #[test]
    fn test_function_and_help_keys() {
        assert_eq!(
            global_shortcut(&KeyPress::plain(Key::F(1)), false),
            Some(Shortcut::StartVoiceCommand)
        );
        assert_eq!(
            global_shortcut(&KeyPress::plain(Key::Char('H')), false),
            Some(Shortcut::ShowHelp)
        );
        assert_eq!(global_shortcut(&KeyPress::plain(Key::Char('h')), true), None);
    }

    #[test]
    fn test_text_focus_keeps_text_keys() {
        assert_eq!(global_shortcut(&KeyPress::plain(Key::Char('H')), true), None);
        assert_eq!(global_shortcut(&KeyPress::plain(Key::Esc), true), None);
        assert_eq!(global_shortcut(&KeyPress::plain(Key::Char('2')), true), None);

        assert_eq!(
            global_shortcut(&KeyPress::alt(Key::Char('3')), true),
            Some(Shortcut::Navigate(Route::Quiz))
        );
        assert_eq!(
            global_shortcut(&KeyPress::plain(Key::F(1)), true),
            Some(Shortcut::StartVoiceCommand)
        );
        assert_eq!(
            global_shortcut(&KeyPress::control(Key::Char('c')), true),
            Some(Shortcut::Quit)
        );
    }

    #[test]
    fn test_alt_digits_navigate() {
        assert_eq!(
            global_shortcut(&KeyPress::alt(Key::Char('0')), false),
            Some(Shortcut::Navigate(Route::Home))
        );
        assert_eq!(
            global_shortcut(&KeyPress::alt(Key::Char('3')), false),
            Some(Shortcut::Navigate(Route::Quiz))
        );
        assert_eq!(global_shortcut(&KeyPress::alt(Key::Char('7')), false), None);
    }

    #[test]
    fn test_plain_digits_and_quit() {
        assert_eq!(
            global_shortcut(&KeyPress::plain(Key::Char('2')), false),
            Some(Shortcut::Digit(2))
        );
        assert_eq!(
            global_shortcut(&KeyPress::control(Key::Char('c')), false),
            Some(Shortcut::Quit)
        );
        assert_eq!(global_shortcut(&KeyPress::plain(Key::Char('x')), false), None);
    }

    #[test]
    fn test_from_event() {
        let event = KeyEvent::new(KeyCode::F(1), KeyModifiers::NONE);
        assert_eq!(KeyPress::from_event(&event), KeyPress::plain(Key::F(1)));

        let event = KeyEvent::new(KeyCode::Right, KeyModifiers::NONE);
        assert_eq!(KeyPress::from_event(&event), KeyPress::plain(Key::Right));
    }
}
