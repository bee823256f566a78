use std::io;

const INCREMENT: usize = 4096;
const THRESHOLD: usize = 100;

/// Growable read buffer over a blocking reader.
///
/// `fill_more()` reads once more from the reader, `consume()` drops
/// what has been parsed from the front.
pub(crate) struct FillMoreBuffer<Read> {
    buffer: Vec<u8>,
    pos: usize,
    reader: Option<Read>,
}

impl<Read: io::Read> FillMoreBuffer<Read> {
    pub fn new(reader: Read) -> Self {
        Self {
            buffer: vec![0; INCREMENT],
            pos: 0,
            reader: Some(reader),
        }
    }

    /// Read more input. Returns the amount read, where 0 means the peer closed.
    pub fn fill_more(&mut self) -> io::Result<usize> {
        let Some(reader) = &mut self.reader else {
            return Ok(0);
        };

        if self.pos > self.buffer.len() - THRESHOLD {
            self.buffer.resize(self.buffer.len() + INCREMENT, 0);
        }

        let n = loop {
            match reader.read(&mut self.buffer[self.pos..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.pos += n;

        if n == 0 {
            // Free readers as soon as possible.
            self.reader = None;
        }

        Ok(n)
    }

    pub fn consume(&mut self, amount: usize) {
        let max = amount.min(self.pos);
        self.buffer.copy_within(max..self.pos, 0);
        self.pos -= max;
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}
