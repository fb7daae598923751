use std::io::{BufWriter, Write};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::json;

use super::{OverlayBatch, PlacementCommand};

/// External process that draws images on top of the terminal.
pub trait Compositor {
    /// Applies every command of `batch` as a single frame.
    fn commit(&mut self, batch: &OverlayBatch) -> Result<()>;

    /// Releases the compositor; called once when the session ends.
    fn shutdown(&mut self) {}
}

/// Used when no compositor is available: images are simply not drawn.
#[derive(Debug, Default)]
pub struct NullCompositor;

impl Compositor for NullCompositor {
    fn commit(&mut self, batch: &OverlayBatch) -> Result<()> {
        debug!("Dropping overlay batch of {} commands", batch.len());
        Ok(())
    }
}

/// Drives `ueberzug layer` through its JSON line protocol.
pub struct UeberzugCompositor {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
}

impl UeberzugCompositor {
    pub fn spawn() -> Result<Self> {
        let mut child = Command::new("ueberzug")
            .args(["layer", "--silent", "--parser", "json"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to start ueberzug")?;
        let stdin = child
            .stdin
            .take()
            .context("ueberzug started without a stdin pipe")?;
        info!("Started ueberzug (pid {})", child.id());
        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
        })
    }

    fn encode(command: &PlacementCommand) -> serde_json::Value {
        match command {
            PlacementCommand::Show(placement) => json!({
                "action": "add",
                "identifier": placement.id.as_str(),
                "path": placement.path,
                "x": placement.x,
                "y": placement.y,
                "width": placement.width,
                "height": placement.height,
            }),
            PlacementCommand::Hide(id) => json!({
                "action": "remove",
                "identifier": id.as_str(),
            }),
        }
    }
}

impl Compositor for UeberzugCompositor {
    fn commit(&mut self, batch: &OverlayBatch) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        for command in batch.commands() {
            serde_json::to_writer(&mut *stdin, &Self::encode(command))?;
            stdin.write_all(b"\n")?;
        }
        stdin.flush().context("Failed to flush ueberzug commands")?;
        Ok(())
    }

    fn shutdown(&mut self) {
        // closing stdin makes ueberzug exit on its own
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush();
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.kill() {
                    warn!("Failed to stop ueberzug: {e}");
                }
                let _ = self.child.wait();
            }
        }
    }
}

impl Drop for UeberzugCompositor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts ueberzug, or falls back to [`NullCompositor`] when it is missing.
pub fn spawn_default() -> Box<dyn Compositor> {
    match UeberzugCompositor::spawn() {
        Ok(compositor) => Box::new(compositor),
        Err(e) => {
            warn!("Images disabled: {e:#}");
            Box::new(NullCompositor)
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::{CompositorLog, RecordingCompositor};

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::Result;

    use super::Compositor;
    use crate::overlay::{OverlayBatch, PlacementCommand};

    /// Shared view of everything a [`RecordingCompositor`] received.
    #[derive(Clone, Default)]
    pub struct CompositorLog {
        batches: Rc<RefCell<Vec<Vec<PlacementCommand>>>>,
        shut_down: Rc<RefCell<bool>>,
    }

    impl CompositorLog {
        pub fn batches(&self) -> Vec<Vec<PlacementCommand>> {
            self.batches.borrow().clone()
        }

        pub fn is_shut_down(&self) -> bool {
            *self.shut_down.borrow()
        }
    }

    /// Test compositor that keeps every committed batch.
    pub struct RecordingCompositor {
        log: CompositorLog,
    }

    impl RecordingCompositor {
        pub fn new() -> (Self, CompositorLog) {
            let log = CompositorLog::default();
            (Self { log: log.clone() }, log)
        }
    }

    impl Compositor for RecordingCompositor {
        fn commit(&mut self, batch: &OverlayBatch) -> Result<()> {
            self.log.batches.borrow_mut().push(batch.commands().to_vec());
            Ok(())
        }

        fn shutdown(&mut self) {
            *self.log.shut_down.borrow_mut() = true;
        }
    }
}
