pub mod terminal_preview;
