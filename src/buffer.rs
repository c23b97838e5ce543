use core::cmp::min;

use crate::error::Error;

/// Largest chunk a transport delivers at once, and the size of the
/// slack area behind the page.
pub const CHUNK_SIZE: usize = 64;

/// RAM copy of one flash page, filled by the host before a page
/// program command is issued.
///
/// A page program always commits the whole `PAGE_SIZE` region from
/// offset 0, no matter how many chunks were appended. Host is expected
/// to fill the page completely before it asks for a commit.
pub struct PageBuffer<const PAGE_SIZE: usize> {
    page: [u8; PAGE_SIZE],
    // receives the tail of a chunk that crosses the page end
    slack: [u8; CHUNK_SIZE],
    cursor: u16,
}

impl<const PAGE_SIZE: usize> PageBuffer<PAGE_SIZE> {
    const GEOMETRY: () = assert!(
        PAGE_SIZE.is_power_of_two() && PAGE_SIZE >= CHUNK_SIZE && PAGE_SIZE <= 0x8000,
        "page size must be a power of two between CHUNK_SIZE and 32K"
    );

    /// Creates an empty buffer with the cursor at offset 0.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::GEOMETRY;
        Self {
            page: [0; PAGE_SIZE],
            slack: [0; CHUNK_SIZE],
            cursor: 0,
        }
    }

    /// Copy `chunk` at the cursor and advance the cursor, wrapping it at the page end.
    ///
    /// Bytes that do not fit in the page end up in the slack area, anything
    /// longer than [`CHUNK_SIZE`] past the page end is dropped.
    pub fn append(&mut self, chunk: &[u8]) {
        let start = self.cursor as usize;
        let in_page = min(chunk.len(), PAGE_SIZE - start);
        self.page[start..start + in_page].copy_from_slice(&chunk[..in_page]);

        let spill = min(chunk.len() - in_page, CHUNK_SIZE);
        self.slack[..spill].copy_from_slice(&chunk[in_page..in_page + spill]);

        self.cursor = ((start + chunk.len()) & (PAGE_SIZE - 1)) as u16;
    }

    /// Copy `data` at `offset`. The whole range must be inside the page.
    ///
    /// Cursor is left just past the copied data.
    pub fn write_at(&mut self, offset: u16, data: &[u8]) -> Result<(), Error> {
        let start = offset as usize;
        if start >= PAGE_SIZE || data.len() > PAGE_SIZE - start {
            return Err(Error::OutOfRange);
        }
        self.page[start..start + data.len()].copy_from_slice(data);
        self.cursor = ((start + data.len()) & (PAGE_SIZE - 1)) as u16;
        Ok(())
    }

    /// Move the cursor. Offsets past the page end are rejected.
    pub fn set_cursor(&mut self, cursor: u16) -> Result<(), Error> {
        if cursor as usize >= PAGE_SIZE {
            return Err(Error::InvalidParameter);
        }
        self.cursor = cursor;
        Ok(())
    }

    /// Move the cursor back to the page start.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Current fill cursor.
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    /// Tail of the last chunk that crossed the page end.
    pub fn slack(&self) -> &[u8; CHUNK_SIZE] {
        &self.slack
    }

    /// Full page, as committed by a program command.
    pub fn page(&self) -> &[u8; PAGE_SIZE] {
        &self.page
    }
}

impl<const PAGE_SIZE: usize> Default for PageBuffer<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
