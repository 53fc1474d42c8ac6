use thiserror::Error;

/// A byte sequence in the stream that is not valid UTF-8
#[derive(Debug, Error)]
#[error("invalid utf-8 sequence in response stream")]
pub struct DecodeError;

/// Incremental UTF-8 decoder for byte chunks arriving off a stream.
///
/// A multi-byte character split across two chunks is carried over and
/// reassembled on the next call rather than dropped or rejected, so the
/// decoded output is independent of where the transport happens to cut
/// its chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Trailing bytes of an incomplete character from the previous chunk
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all complete characters seen so far.
    ///
    /// Bytes that form the prefix of a multi-byte character are held back
    /// until the rest arrives. Genuinely invalid bytes are an error.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(chunk);

        match std::str::from_utf8(&data) {
            Ok(text) => Ok(text.to_string()),
            Err(err) => {
                if err.error_len().is_some() {
                    // Invalid sequence, not an incomplete one
                    return Err(DecodeError);
                }
                let valid = err.valid_up_to();
                self.carry = data[valid..].to_vec();
                Ok(String::from_utf8_lossy(&data[..valid]).into_owned())
            }
        }
    }

    /// Signal end-of-stream. A dangling partial character is an error.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            self.carry.clear();
            Err(DecodeError)
        }
    }
}
