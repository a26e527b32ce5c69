// Main menu: find an online match or quit

pub mod input;
pub mod render;
pub mod state;

pub use input::{handle_menu_input, MenuAction};
pub use render::{render_lobby, render_menu};
pub use state::{AppState, MenuItem, MenuState};
