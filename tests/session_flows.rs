use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use nuber::book::TermSize;
use nuber::bookmarks::BookPosition;
use nuber::keymap::Keymaps;
use nuber::overlay::compositor::{CompositorLog, RecordingCompositor};
use nuber::reader_session::{Input, ModeKind, ReaderSession, SessionContext};
use nuber::session_store::SessionStore;
use nuber::test_utils::test_helpers::{
    MemoryBook, TestScenarioBuilder, capture_terminal_state, create_test_terminal,
};
use ratatui::backend::TestBackend;
use tempfile::TempDir;

const BOOK: &str = "/books/novel.epub";

fn store(temp: &TempDir) -> SessionStore {
    SessionStore::new(temp.path().join("state.json"))
}

fn open_session(temp: &TempDir, book: MemoryBook) -> ReaderSession {
    ReaderSession::new(
        Box::new(book),
        BOOK,
        store(temp),
        Keymaps::default(),
        TermSize::new(80, 24),
    )
    .unwrap()
}

fn context() -> (SessionContext<TestBackend>, CompositorLog) {
    let (compositor, log) = RecordingCompositor::new();
    (
        SessionContext::new(create_test_terminal(80, 24), Box::new(compositor)),
        log,
    )
}

fn run(session: &mut ReaderSession, scenario: TestScenarioBuilder) -> CompositorLog {
    let (mut ctx, log) = context();
    let mut events = scenario.build();
    session.run(&mut ctx, &mut events).unwrap();
    log
}

/// Hands every scripted event to the session without the run loop.
fn feed(session: &mut ReaderSession, scenario: TestScenarioBuilder) {
    for event in scenario.events() {
        if let Some(input) = Input::from_event(event.clone()) {
            session.handle_input(input).unwrap();
        }
    }
}

fn book_key() -> PathBuf {
    Path::new(BOOK).to_path_buf()
}

#[test]
fn test_toc_selection_jumps_to_chapter_start() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));

    // scroll two rows, open the TOC, pick the second chapter
    let scenario = TestScenarioBuilder::new()
        .navigate_down(2)
        .open_toc()
        .navigate_down(1)
        .press_enter()
        .quit();
    run(&mut session, scenario);

    assert_eq!(session.active_mode(), ModeKind::Reading);
    assert_eq!(session.viewport().state().chapter_index, 1);
    assert_eq!(session.viewport().state().line_offset, 0);

    let record = store(&temp).load(&book_key());
    assert_eq!(record.chapter_index, 1);
    // chapter 0 was left at row 2: three words per row, rows 0..=2
    assert_eq!(record.positions, vec![9, 3, 0]);
}

#[test]
fn test_bookmark_added_from_command_line_is_persisted() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));

    let scenario = TestScenarioBuilder::new()
        .navigate_down(4)
        .command("bookmark add chase scene")
        .quit();
    run(&mut session, scenario);

    let record = store(&temp).load(&book_key());
    assert_eq!(record.bookmarks.len(), 1);
    assert_eq!(record.bookmarks[0].label, "chase scene");
    assert_eq!(record.bookmarks[0].payload, BookPosition::new(0, 15));

    // a fresh session picks the bookmark and the position back up
    let reopened = open_session(&temp, MemoryBook::numbered(3, 40));
    assert_eq!(reopened.bookmarks().bookmarks().len(), 1);
    assert_eq!(reopened.viewport().state().line_offset, 4);
}

#[test]
fn test_selecting_a_bookmark_jumps_to_it() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));

    let scenario = TestScenarioBuilder::new()
        .navigate_down(3)
        .command("bookmark add here")
        .next_chapter()
        .next_chapter()
        .open_bookmarks()
        .press_enter()
        .quit();
    run(&mut session, scenario);

    let state = session.viewport().state();
    assert_eq!(state.chapter_index, 0);
    assert_eq!(state.line_offset, 3);
}

#[test]
fn test_bookmark_deleted_after_confirmation() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));

    let scenario = TestScenarioBuilder::new()
        .command("bookmark add first")
        .navigate_down(5)
        .command("bookmark add second")
        .open_bookmarks()
        .press_char('d')
        .press_enter()
        .press_esc()
        .quit();
    run(&mut session, scenario);

    // the list opened on the bookmark at the reading position
    let labels: Vec<_> = session
        .bookmarks()
        .bookmarks()
        .iter()
        .map(|b| b.label.as_str())
        .collect();
    assert_eq!(labels, vec!["first"]);
    assert_eq!(store(&temp).load(&book_key()).bookmarks.len(), 1);
}

#[test]
fn test_declining_confirmation_keeps_bookmark() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(2, 40));

    let scenario = TestScenarioBuilder::new()
        .command("bookmark add keep")
        .open_bookmarks()
        .press_char('d')
        .navigate_down(1)
        .press_enter();
    feed(&mut session, scenario);

    assert_eq!(session.active_mode(), ModeKind::Bookmarks);
    assert_eq!(session.bookmarks().bookmarks().len(), 1);
}

#[test]
fn test_resize_closes_modals_and_keeps_position() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));

    let scenario = TestScenarioBuilder::new()
        .navigate_down(6)
        .open_toc()
        .resize(40, 30)
        .quit();
    run(&mut session, scenario);

    assert_eq!(session.active_mode(), ModeKind::Reading);
    assert_eq!(session.viewport().cols(), 40);
    assert_eq!(session.viewport().rows(), 29);
    // 480 cells rescaled to 960, clamped to row 40 - 29
    assert_eq!(session.viewport().state().line_offset, 11);
}

#[test]
fn test_command_prompt_cancel_keeps_reading_state() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(2, 40));

    let scenario = TestScenarioBuilder::new()
        .press_char(':')
        .type_text("bookmark add nope")
        .press_esc()
        .press_char(':')
        .press_backspace()
        .quit();
    run(&mut session, scenario);

    assert!(session.bookmarks().bookmarks().is_empty());
    assert_eq!(session.active_mode(), ModeKind::Reading);
}

#[test]
fn test_exhausted_input_ends_session() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(2, 40));

    // no quit key: the exhausted source answers with ctrl+c
    run(&mut session, TestScenarioBuilder::new().open_toc());

    assert!(store(&temp).file_path().exists());
}

#[test]
fn test_shutdown_flag_quits_and_saves() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(2, 40))
        .with_shutdown_flag(Arc::new(AtomicBool::new(true)));

    let mut events = TestScenarioBuilder::new().navigate_down(3).build();
    let (mut ctx, _log) = context();
    session.run(&mut ctx, &mut events).unwrap();

    // nothing was read
    assert!(!events.is_exhausted());
    assert_eq!(session.viewport().state().line_offset, 0);
    assert_eq!(store(&temp).load(&book_key()).positions, vec![3, 0]);
}

#[test]
fn test_screen_shows_text_and_status_line() {
    let temp = TempDir::new().unwrap();
    let session = open_session(&temp, MemoryBook::numbered(3, 40));
    let (mut ctx, _log) = context();

    session.draw(&mut ctx).unwrap();
    let screen = capture_terminal_state(ctx.terminal());
    let lines: Vec<_> = screen.lines().collect();

    assert_eq!(lines[0], "c0 line 1");
    assert_eq!(lines[22], "c0 line 23");
    // 23 of 120 lines
    assert!(lines[23].starts_with(" 1/3"));
    assert!(lines[23].ends_with("19%"));
}

#[test]
fn test_toc_is_drawn_over_the_text() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40));
    let (mut ctx, _log) = context();

    feed(&mut session, TestScenarioBuilder::new().open_toc());
    session.draw(&mut ctx).unwrap();

    let screen = capture_terminal_state(ctx.terminal());
    assert!(screen.contains("Table of Contents"));
    assert!(screen.contains("Chapter 3"));
}

#[test]
fn test_unreadable_chapter_does_not_end_session() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(3, 40).with_broken_chapter(1));

    let scenario = TestScenarioBuilder::new()
        .navigate_down(5)
        .command("bookmark add mine")
        .next_chapter()
        .quit();
    run(&mut session, scenario);

    let state = session.viewport().state();
    assert_eq!(state.chapter_index, 0);
    assert_eq!(state.line_offset, 5);
    assert_eq!(session.viewport().book().current_chapter(), 0);

    let record = store(&temp).load(&book_key());
    assert_eq!(record.chapter_index, 0);
    assert_eq!(record.positions[0], 18);
    assert_eq!(record.bookmarks.len(), 1);
    assert_eq!(record.bookmarks[0].payload, BookPosition::new(0, 18));
}

#[test]
fn test_session_is_saved_when_loop_fails() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(&temp, MemoryBook::numbered(2, 40).with_failing_relayout());

    let mut events = TestScenarioBuilder::new()
        .navigate_down(3)
        .command("bookmark add before resize")
        .resize(60, 20)
        .quit()
        .build();
    let (mut ctx, _log) = context();
    assert!(session.run(&mut ctx, &mut events).is_err());

    let record = store(&temp).load(&book_key());
    assert_eq!(record.positions, vec![12, 0]);
    assert_eq!(record.bookmarks.len(), 1);
    assert_eq!(record.bookmarks[0].label, "before resize");
}
