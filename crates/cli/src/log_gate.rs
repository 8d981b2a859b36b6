//! Log output that can be held back while the terminal preview owns the
//! screen and replayed once it is restored.
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

struct GateState {
    out: Box<dyn Write + Send>,
    held: Option<Vec<u8>>,
}

/// A shared `Write` handle for `env_logger::Target::Pipe`. Clones share
/// the same state.
#[derive(Clone)]
pub struct LogGate {
    state: Arc<Mutex<GateState>>,
}

impl LogGate {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                out: Box::new(out),
                held: None,
            })),
        }
    }

    /// Buffers everything written from now until `release`.
    pub fn hold(&self) {
        let mut state = self.lock();
        if state.held.is_none() {
            state.held = Some(Vec::new());
        }
    }

    /// Writes out what was held and passes later output straight through.
    pub fn release(&self) -> io::Result<()> {
        let mut state = self.lock();
        if let Some(held) = state.held.take() {
            state.out.write_all(&held)?;
            state.out.flush()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // A poisoned gate still holds valid bytes.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Write for LogGate {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        match state.held.as_mut() {
            Some(held) => held.extend_from_slice(buf),
            None => state.out.write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        if state.held.is_some() {
            return Ok(());
        }
        state.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_passes_through_when_open() {
        let out = Shared::default();
        let mut gate = LogGate::new(out.clone());
        writeln!(gate, "hello").unwrap();
        assert_eq!(out.text(), "hello\n");
    }

    #[test]
    fn test_holds_until_release() {
        let out = Shared::default();
        let mut gate = LogGate::new(out.clone());

        gate.hold();
        writeln!(gate, "Skip frame 3").unwrap();
        writeln!(gate, "Frames processed: 25").unwrap();
        gate.flush().unwrap();
        assert_eq!(out.text(), "");

        gate.release().unwrap();
        assert_eq!(out.text(), "Skip frame 3\nFrames processed: 25\n");

        writeln!(gate, "after").unwrap();
        assert!(out.text().ends_with("after\n"));
    }

    #[test]
    fn test_clones_share_state() {
        let out = Shared::default();
        let gate = LogGate::new(out.clone());
        let mut writer = gate.clone();

        gate.hold();
        writeln!(writer, "held").unwrap();
        assert_eq!(out.text(), "");
        gate.release().unwrap();
        assert_eq!(out.text(), "held\n");
    }

    #[test]
    fn test_release_without_hold_is_noop() {
        let out = Shared::default();
        let gate = LogGate::new(out.clone());
        gate.release().unwrap();
        gate.release().unwrap();
        assert_eq!(out.text(), "");
    }
}
