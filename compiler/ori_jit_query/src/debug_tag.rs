//! Allocation-free debug tags for log and trace lines.

use std::fmt::{self, Write};

use crate::view::FunctionSnapshot;

/// Size of the buffer [`FunctionSnapshot::debug_number_set`] writes into.
pub const MAX_FUNCTION_BODY_DEBUG_STRING_SIZE: usize = 42;

/// Every well-formed tag is longer than this.
const MIN_TAG_LEN: usize = 8;

/// `fmt::Write` into a fixed byte buffer; fails instead of truncating.
struct SliceWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        let Some(dest) = self.buf.get_mut(self.len..end) else {
            return Err(fmt::Error);
        };
        dest.copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

impl FunctionSnapshot<'_> {
    /// Write ` (#<source context>.<local function>), #<function number>`
    /// into `buf` and return the written part.
    ///
    /// The source context id prints as a signed 32-bit value.
    ///
    /// # Panics
    ///
    /// Panics if the function has no body.
    pub fn debug_number_set<'b>(
        self,
        buf: &'b mut [u8; MAX_FUNCTION_BODY_DEBUG_STRING_SIZE],
    ) -> &'b str {
        let body = self.body_or_panic("debug_number_set");
        let source = i32::from_ne_bytes(body.source_context_id().raw().to_ne_bytes());

        let mut writer = SliceWriter {
            buf: &mut buf[..],
            len: 0,
        };
        let written = write!(
            writer,
            " (#{source}.{}), #{}",
            self.local_function_id(),
            body.function_number()
        );
        let len = writer.len;
        assert!(
            written.is_ok() && len > MIN_TAG_LEN,
            "malformed debug tag for node {:?} ({len} bytes)",
            self.id()
        );

        let buf: &'b [u8; MAX_FUNCTION_BODY_DEBUG_STRING_SIZE] = buf;
        match std::str::from_utf8(&buf[..len]) {
            Ok(tag) => tag,
            Err(err) => panic!("debug tag is not UTF-8: {err}"),
        }
    }
}
