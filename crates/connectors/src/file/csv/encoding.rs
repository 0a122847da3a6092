use encoding_rs::{CoderResult, Encoder, Encoding, UTF_8};
use std::io::{self, Write};
use tracing::warn;

const CHUNK: usize = 8 * 1024;

/// Transcodes the UTF-8 text written by the CSV writer into the configured
/// output encoding. UTF-8 output passes straight through.
///
/// Characters the target encoding cannot represent are written as HTML
/// numeric character references.
pub struct EncodedWriter<W: Write> {
    inner: W,
    encoder: Option<Encoder>,
    pending: Vec<u8>,
    replaced: bool,
}

impl<W: Write> EncodedWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        let encoder = (encoding != UTF_8).then(|| encoding.new_encoder());
        Self {
            inner,
            encoder,
            pending: Vec::new(),
            replaced: false,
        }
    }

    /// Flushes the encoder state and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "truncated UTF-8 sequence at end of output",
            ));
        }
        if let Some(encoder) = self.encoder.as_mut() {
            self.replaced |= encode_into(encoder, "", true, &mut self.inner)?;
        }
        if self.replaced {
            warn!("Some characters are not representable in the output encoding and were escaped");
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncodedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(encoder) = self.encoder.as_mut() else {
            return self.inner.write(buf);
        };

        self.pending.extend_from_slice(buf);
        // A multi-byte character may be split across two writes; keep the
        // incomplete tail for the next call.
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        };
        if complete > 0 {
            let text = std::str::from_utf8(&self.pending[..complete])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.replaced |= encode_into(encoder, text, false, &mut self.inner)?;
            self.pending.drain(..complete);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn encode_into<W: Write>(
    encoder: &mut Encoder,
    mut text: &str,
    last: bool,
    out: &mut W,
) -> io::Result<bool> {
    let mut buf = [0u8; CHUNK];
    let mut replaced = false;
    loop {
        let (result, read, written, had_replacements) =
            encoder.encode_from_utf8(text, &mut buf, last);
        out.write_all(&buf[..written])?;
        replaced |= had_replacements;
        text = &text[read..];
        match result {
            CoderResult::InputEmpty => return Ok(replaced),
            CoderResult::OutputFull => continue,
        }
    }
}

/// Decodes a whole result file written in `encoding` back to UTF-8.
pub fn decode_file(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        warn!(encoding = encoding.name(), "Result file contains malformed sequences");
    }
    text.into_owned()
}
