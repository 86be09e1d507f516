// Streaming sentence parser.
//
// Drives the codec over a byte stream with unknown framing boundaries. Once
// the prefix of a queue-packet/got-packet sentence has been seen, the
// declared number of payload bytes is consumed verbatim (the holdoff
// window), so terminators inside binary payloads do not end the sentence.

use super::{DIR_CMD, DIR_RESP, SOP, Sentence, is_eop};
use crate::ModemResult;
use bytes::{BufMut, BytesMut};
use log::trace;

/// Detects the complete prefix of a binary-payload sentence, `w`, a
/// direction, `q` or `p`, and a comma-delimited decimal length. Only an
/// exact match up to the second comma starts a holdoff window.
fn binary_payload_len(buf: &[u8]) -> Option<usize> {
    // Shortest trigger is `wcq,N,`
    if buf.len() < 6 || *buf.last()? != b',' {
        return None;
    }
    if buf[0] != SOP
        || !matches!(buf[1], DIR_CMD | DIR_RESP)
        || !matches!(buf[2], b'q' | b'p')
        || buf[3] != b','
    {
        return None;
    }
    let digits = &buf[4..buf.len() - 1];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let len = std::str::from_utf8(digits).ok()?.parse::<usize>().ok()?;
    (len > 0).then_some(len)
}

/// Incremental sentence parser.
///
/// Feed bytes as they arrive; a sentence is returned once its terminator (or
/// for binary payloads, its final declared byte plus a terminator) has been
/// seen. Parse and checksum failures reset the buffer so the stream
/// resynchronizes on the next start-of-packet.
#[derive(Debug, Default)]
pub struct StreamParser {
    buf: BytesMut,
    holdoff: usize,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one byte. Returns a sentence when one completes, `None` when
    /// more input is needed.
    pub fn push(&mut self, byte: u8) -> ModemResult<Option<Sentence>> {
        if self.buf.is_empty() && is_eop(byte) {
            // Absorbs the second half of CRLF and leading noise
            trace!("swallow {:#04x}", byte);
            return Ok(None);
        }

        let mut ready = false;
        if self.holdoff > 0 {
            self.buf.put_u8(byte);
            self.holdoff -= 1;
            trace!("holdoff {} {:?}", self.holdoff, self.buf);
        } else if is_eop(byte) {
            ready = true;
        } else {
            self.buf.put_u8(byte);
        }

        if self.holdoff == 0 {
            if let Some(len) = binary_payload_len(&self.buf) {
                // Next `len` bytes are binary payload
                self.holdoff = len;
            }
        }

        if self.holdoff > 0 || !ready {
            return Ok(None);
        }

        trace!("parse {:?}", self.buf);
        let result = Sentence::decode(&self.buf);
        self.reset();
        result.map(Some)
    }

    /// Drops any partial sentence and leaves the parser ready for new input.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.holdoff = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::protocol::Code;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn feed(parser: &mut StreamParser, data: &[u8]) -> Vec<Sentence> {
        let mut out = Vec::new();
        for &b in data {
            if let Some(s) = parser.push(b).unwrap() {
                out.push(s);
            }
        }
        out
    }

    #[test]
    fn payload_may_contain_terminator() {
        let mut parser = StreamParser::new();
        let got = feed(&mut parser, b"wrp,8,Hi\nThere\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, Code::GotPacket);
        assert_eq!(
            got[0].options,
            vec![Bytes::from_static(b"8"), Bytes::from_static(b"Hi\nThere")]
        );
    }

    #[test]
    fn partial_input_resumes() {
        let mut parser = StreamParser::new();
        assert!(feed(&mut parser, b"wrp,8,Hello").is_empty());
        let got = feed(&mut parser, b"Sea\n");
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0].options,
            vec![Bytes::from_static(b"8"), Bytes::from_static(b"HelloSea")]
        );
    }

    #[test]
    fn any_terminator_convention_works() {
        let mut parser = StreamParser::new();
        let got = feed(&mut parser, b"wcv\r\nwcv\rwcv\n");
        assert_eq!(got.len(), 3);
        for s in got {
            assert_eq!(s.code, Code::Version);
        }
    }

    #[test]
    fn chunking_does_not_change_output() {
        let stream = b"wrp,8,12345678\nwrl,3\nwrv,1,0,1*44\n";
        let mut whole = StreamParser::new();
        let expected = feed(&mut whole, stream);
        assert_eq!(expected.len(), 3);

        for split_at in 1..stream.len() {
            let mut parser = StreamParser::new();
            let mut got = feed(&mut parser, &stream[..split_at]);
            got.extend(feed(&mut parser, &stream[split_at..]));
            assert_eq!(got, expected, "split at {}", split_at);
        }
    }

    #[test]
    fn multi_digit_payload_length_holds_off() {
        let mut parser = StreamParser::new();
        let payload = b"Hello\nSea\n12";
        let mut stream = b"wrp,12,".to_vec();
        stream.extend_from_slice(payload);
        stream.push(b'\n');

        let got = feed(&mut parser, &stream);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].options[1], Bytes::copy_from_slice(payload));
    }

    #[test]
    fn error_resets_and_resynchronizes() {
        let mut parser = StreamParser::new();
        for &b in b"wzx" {
            assert!(parser.push(b).unwrap().is_none());
        }
        assert!(matches!(parser.push(b'\n'), Err(Error::Parse(_))));

        // The stream recovers on the next sentence
        let got = feed(&mut parser, b"wcv\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, Code::Version);
    }

    #[test]
    fn checksum_error_surfaces() {
        let mut parser = StreamParser::new();
        let mut err = None;
        for &b in b"wrp,8,HelloSea*ff\n" {
            if let Err(e) = parser.push(b) {
                err = Some(e);
            }
        }
        assert!(matches!(err, Some(Error::Checksum { .. })));
    }

    #[test]
    fn leading_noise_terminators_are_swallowed() {
        let mut parser = StreamParser::new();
        let got = feed(&mut parser, b"\r\n\nwcn\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, Code::PayloadSize);
    }
}
