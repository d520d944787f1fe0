#![allow(unused)]

use spin::Mutex;
use std::{io, sync::Arc};
use tracing_subscriber::fmt::MakeWriter;

/// Captures everything a subscriber writes, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MakeMockWriter {
    buffer: Arc<Mutex<String>>,
}

#[derive(Debug, Clone)]
pub struct MockWriter {
    buffer: Arc<Mutex<String>>,
}

impl io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MakeMockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> String {
        self.buffer.lock().clone()
    }

    /// The captured lines emitted by the given target.
    pub fn lines_of(&self, target: &str) -> Vec<String> {
        let needle = format!(" {target}: ");
        self.buffer
            .lock()
            .lines()
            .filter(|line| line.contains(&needle))
            .map(str::to_string)
            .collect()
    }
}

impl<'a> MakeWriter<'a> for MakeMockWriter {
    type Writer = MockWriter;
    fn make_writer(&'a self) -> Self::Writer {
        MockWriter {
            buffer: self.buffer.clone(),
        }
    }
}
