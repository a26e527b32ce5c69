// Menu state and top-level application flow

use crate::ui::OverlayMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Menu,
    /// Queued for, or playing, an online match
    Online,
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    FindMatch,
    Quit,
}

impl MenuItem {
    pub fn display_text(&self) -> &'static str {
        match self {
            MenuItem::FindMatch => "Find Online Match",
            MenuItem::Quit => "Quit",
        }
    }

    pub fn all() -> Vec<MenuItem> {
        vec![MenuItem::FindMatch, MenuItem::Quit]
    }
}

pub struct MenuState {
    pub selected_index: usize,
    pub items: Vec<MenuItem>,
    /// Shown over the menu until dismissed, e.g. a recovered forfeit
    pub notice: Option<OverlayMessage>,
}

impl MenuState {
    pub fn new() -> Self {
        Self {
            selected_index: 0,
            items: MenuItem::all(),
            notice: None,
        }
    }

    pub fn with_notice(notice: OverlayMessage) -> Self {
        Self {
            notice: Some(notice),
            ..Self::new()
        }
    }

    pub fn selected_item(&self) -> MenuItem {
        self.items[self.selected_index]
    }

    pub fn select_previous(&mut self) {
        self.selected_index = self
            .selected_index
            .checked_sub(1)
            .unwrap_or(self.items.len() - 1);
    }

    pub fn select_next(&mut self) {
        self.selected_index = (self.selected_index + 1) % self.items.len();
    }

    pub fn dismiss_notice(&mut self) -> bool {
        self.notice.take().is_some()
    }
}

impl Default for MenuState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_wraps() {
        let mut menu = MenuState::new();
        assert_eq!(menu.selected_item(), MenuItem::FindMatch);
        menu.select_previous();
        assert_eq!(menu.selected_item(), MenuItem::Quit);
        menu.select_next();
        assert_eq!(menu.selected_item(), MenuItem::FindMatch);
    }
}
