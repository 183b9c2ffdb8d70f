use bit_vec::BitVec;

use super::{BTreeBasePage, BTreePage};
use crate::{
    buffer_pool::BufferPool,
    io::{decode_bitmap, encode_bitmap, read_exact, Decodeable, PageWriter},
    page_id::{PageCategory, PageID, EMPTY_PAGE_INDEX},
    storage::schema::Schema,
};

/// A header page tracks which data-page numbers of the file are in use
/// (set bit = in use). Header pages form a doubly-linked chain; page *k*
/// of the chain covers the global page numbers
/// `[k * slots, (k + 1) * slots)`.
///
/// Block layout: category tag (4) | prev header index (4) | next header
/// index (4) | bitmap.
pub struct BTreeHeaderPage {
    base: BTreeBasePage,

    // slot status, true means the page is in use
    header: BitVec<u32>,

    slot_count: usize,

    prev_header_index: u32,
    next_header_index: u32,
}

impl BTreePage for BTreeHeaderPage {
    fn new(pid: &PageID, bytes: &[u8], _schema: &Schema, _key_field: usize) -> Self {
        let slot_count = Self::get_slots_cap();

        let mut reader = std::io::Cursor::new(bytes);
        let category = PageCategory::from_bytes(&read_exact(&mut reader, 4));
        if category != PageCategory::Header {
            panic!("not a header page image: {:?}, pid: {:?}", category, pid);
        }

        let prev_header_index = u32::read_from(&mut reader);
        let next_header_index = u32::read_from(&mut reader);
        let header = decode_bitmap(
            &read_exact(&mut reader, BufferPool::get_page_size() - 12),
            slot_count,
        );

        Self {
            base: BTreeBasePage::new(pid),
            header,
            slot_count,
            prev_header_index,
            next_header_index,
        }
    }

    fn get_pid(&self) -> PageID {
        self.base.get_pid()
    }

    fn get_parent_pid(&self) -> PageID {
        self.base.get_parent_pid()
    }

    fn set_parent_pid(&mut self, pid: &PageID) {
        self.base.set_parent_pid(pid)
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut writer = PageWriter::new();
        writer.write_bytes(&PageCategory::Header.to_bytes());
        writer.write(&self.prev_header_index);
        writer.write(&self.next_header_index);
        writer.write_bytes(&encode_bitmap(
            &self.header,
            BufferPool::get_page_size() - 12,
        ));
        writer.to_padded_bytes(BufferPool::get_page_size())
    }

    fn set_before_image(&mut self) {
        let data = self.get_page_data();
        self.base.set_before_image(data);
    }

    fn get_before_image(&self) -> Vec<u8> {
        self.base.get_before_image()
    }
}

impl BTreeHeaderPage {
    /// A fresh header page reports every covered page as in use; only
    /// explicitly freed slots become available.
    pub fn new_empty_page(pid: &PageID) -> Self {
        let slot_count = Self::get_slots_cap();
        Self {
            base: BTreeBasePage::new(pid),
            header: BitVec::from_elem(slot_count, true),
            slot_count,
            prev_header_index: EMPTY_PAGE_INDEX,
            next_header_index: EMPTY_PAGE_INDEX,
        }
    }

    pub fn get_slots_cap() -> usize {
        (BufferPool::get_page_size() - 12) * 8
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    // mark the slot as used/free
    pub fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    pub fn get_empty_slot(&self) -> Option<usize> {
        (0..self.slot_count).find(|&i| !self.header[i])
    }

    pub fn get_prev_pid(&self) -> Option<PageID> {
        if self.prev_header_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageID::new(
            PageCategory::Header,
            self.get_pid().table_id,
            self.prev_header_index,
        ))
    }

    pub fn set_prev_pid(&mut self, pid: Option<&PageID>) {
        self.prev_header_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    pub fn get_next_pid(&self) -> Option<PageID> {
        if self.next_header_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageID::new(
            PageCategory::Header,
            self.get_pid().table_id,
            self.next_header_index,
        ))
    }

    pub fn set_next_pid(&mut self, pid: Option<&PageID>) {
        self.next_header_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }
}
