use log::debug;

/// Whether the phone currently accepts answer input.
///
/// Driven only by Focus/Blur input callbacks, never polled from the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    Unfocused,
    #[default]
    Focused,
}

impl Focus {
    pub fn gain(&mut self) {
        if *self == Focus::Unfocused {
            debug!("Phone focused");
        }
        *self = Focus::Focused;
    }

    pub fn lose(&mut self) {
        if *self == Focus::Focused {
            debug!("Phone unfocused");
        }
        *self = Focus::Unfocused;
    }

    pub fn is_focused(&self) -> bool {
        *self == Focus::Focused
    }
}
