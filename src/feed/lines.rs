/// Splits raw stdin bytes into newline-terminated lines.
///
/// A partial line that grows to `max_line` bytes is emitted as-is, so a
/// writer that never sends a newline cannot grow memory without bound.
#[derive(Debug)]
pub struct LineSplitter {
    partial: Vec<u8>,
    max_line: usize,
}

impl LineSplitter {
    pub fn new(max_line: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    /// Append a chunk and return every line it completed, terminators kept
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            self.partial.push(byte);
            if byte == b'\n' || self.partial.len() >= self.max_line {
                lines.push(self.take());
            }
        }
        lines
    }

    /// Input is exhausted: return the unterminated tail, if any
    pub fn finish(&mut self) -> Option<String> {
        (!self.partial.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> String {
        let bytes = std::mem::take(&mut self.partial);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
