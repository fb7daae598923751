pub mod book;
pub mod bookmarks;
pub mod command_prompt;
pub mod config;
pub mod epub_provider;
pub mod event_source;
pub mod keymap;
pub mod list_view;
pub mod overlay;
pub mod panic_handler;
pub mod paths;
pub mod reader_session;
pub mod session_store;
pub mod table_of_contents;
pub mod viewport;
pub mod word_count;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
