//! Terminal-independent key model consumed by the reducer

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    /// Character pressed with Ctrl held
    Ctrl(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Backspace,
    Delete,
    F(u8),
}

impl Key {
    /// Keys honoured while a long-running operation is in flight
    pub fn is_quit(&self) -> bool {
        matches!(self, Key::Char('q') | Key::Esc | Key::Ctrl('c'))
    }
}
