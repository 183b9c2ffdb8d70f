use bit_vec::BitVec;

use crate::{
    buffer_pool::BufferPool,
    error::DbError,
    io::{decode_bitmap, encode_bitmap, read_exact, PageWriter},
    page_id::PageID,
    storage::{
        schema::Schema,
        tuple::{Tuple, WrappedTuple},
    },
    types::{DbResult, Pod},
    utils::{ceil_div, HandyRwLock},
};

/// A heap page: a slot bitmap followed by fixed-size tuple slots, in
/// unspecified order.
///
/// Block layout: slot bitmap (`⌈numSlots/8⌉` bytes, bit i set = slot i
/// occupied, LSB first) | `numSlots` tuple slots (free slots zero-filled).
pub struct HeapPage {
    pid: PageID,

    schema: Schema,

    slot_count: usize,

    // slot status, true means occupied
    header: BitVec<u32>,

    // all tuple slots, including the empty ones
    tuples: Vec<Tuple>,

    before_image: Option<Vec<u8>>,
}

impl HeapPage {
    pub fn new(pid: &PageID, bytes: &[u8], schema: &Schema) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);
        let tuple_size = schema.get_size();

        let mut reader = std::io::Cursor::new(bytes);
        let header = decode_bitmap(&read_exact(&mut reader, header_size), slot_count);

        let mut tuples = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let tuple_bytes = read_exact(&mut reader, tuple_size);
            tuples.push(Tuple::new(schema, &tuple_bytes));
        }

        Self {
            pid: *pid,
            schema: schema.clone(),
            slot_count,
            header,
            tuples,
            before_image: None,
        }
    }

    pub fn new_empty_page(pid: &PageID, schema: &Schema) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        Self {
            pid: *pid,
            schema: schema.clone(),
            slot_count,
            header: BitVec::from_elem(slot_count, false),
            tuples: vec![Tuple::new_int_tuple(0, 0); slot_count],
            before_image: None,
        }
    }

    /// Tuples per page: each tuple costs its payload plus one header bit.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        (BufferPool::get_page_size() * 8) / (schema.get_size() * 8 + 1)
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        ceil_div(slot_count, 8)
    }

    pub fn get_pid(&self) -> PageID {
        self.pid
    }

    pub fn get_page_data(&self) -> Vec<u8> {
        let mut writer = PageWriter::new();
        writer.write_bytes(&encode_bitmap(
            &self.header,
            Self::calculate_header_size(self.slot_count),
        ));
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                writer.write(&self.tuples[i]);
            } else {
                writer.write_bytes(&vec![0; self.schema.get_size()]);
            }
        }
        writer.to_padded_bytes(BufferPool::get_page_size())
    }

    pub fn set_before_image(&mut self) {
        self.before_image = Some(self.get_page_data());
    }

    pub fn get_before_image(&self) -> Vec<u8> {
        match &self.before_image {
            Some(data) => data.clone(),
            None => vec![0; BufferPool::get_page_size()],
        }
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    /// Place the tuple into the first free slot and return that slot.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<usize, DbError> {
        let slot = (0..self.slot_count)
            .find(|&i| !self.is_slot_used(i))
            .ok_or_else(|| {
                DbError::new(&format!("no empty slot on heap page {:?}", self.pid))
            })?;

        self.tuples[slot] = tuple.clone();
        self.header.set(slot, true);
        Ok(slot)
    }

    pub fn delete_tuple(&mut self, slot_index: usize) -> DbResult {
        if slot_index >= self.slot_count {
            return Err(DbError::invalid_argument(&format!(
                "slot {} out of range, page {:?} has {} slots",
                slot_index, self.pid, self.slot_count
            )));
        }
        if !self.is_slot_used(slot_index) {
            return Err(DbError::new(&format!(
                "tuple not on page, pid: {:?}, slot: {}",
                self.pid, slot_index
            )));
        }
        self.header.set(slot_index, false);
        Ok(())
    }

    pub fn get_tuple(&self, slot_index: usize) -> Option<Tuple> {
        if self.is_slot_used(slot_index) {
            return Some(self.tuples[slot_index].clone());
        }
        None
    }
}

/// Iterator over the live tuples of a shared heap page.
pub struct HeapPageIterator {
    page: Pod<HeapPage>,
    cursor: i64,
}

impl HeapPageIterator {
    pub fn new(page: Pod<HeapPage>) -> Self {
        Self { page, cursor: -1 }
    }
}

impl Iterator for HeapPageIterator {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.cursor += 1;
            if self.cursor >= page.slot_count as i64 {
                return None;
            }

            let cursor = self.cursor as usize;
            if page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(
                    page.tuples[cursor].clone(),
                    cursor,
                    page.get_pid(),
                ));
            }
        }
    }
}
