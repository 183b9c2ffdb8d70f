use std::sync::{Arc, RwLock};

use bit_vec::BitVec;
use log::debug;

use super::{BTreeBasePage, BTreePage};
use crate::{
    buffer_pool::BufferPool,
    error::DbError,
    io::{decode_bitmap, encode_bitmap, read_exact, Decodeable, PageWriter},
    page_id::{PageCategory, PageID, EMPTY_PAGE_INDEX},
    storage::{
        schema::Schema,
        tuple::{Cell, Tuple, WrappedTuple},
    },
    types::DbResult,
    utils::{ceil_div, HandyRwLock},
};

/// A leaf page: tuples sorted by the key field, chained to its siblings.
///
/// Block layout: category tag (4) | parent index (4) | left sibling (4) |
/// right sibling (4) | slot bitmap | slot array.
pub struct BTreeLeafPage {
    page: BTreeBasePage,

    slot_count: usize,

    // slot status, true means occupied
    header: BitVec<u32>,

    // all tuple slots, including the empty ones
    tuples: Vec<Tuple>,

    schema: Schema,

    // plain page indexes instead of Option<PageID>, 0 meaning "none"
    right_sibling_index: u32,
    left_sibling_index: u32,

    key_field: usize,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreePage for BTreeLeafPage {
    fn new(pid: &PageID, bytes: &[u8], schema: &Schema, key_field: usize) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);
        let tuple_size = schema.get_size();

        let mut reader = std::io::Cursor::new(bytes);
        let category = PageCategory::from_bytes(&read_exact(&mut reader, 4));
        if category != PageCategory::Leaf {
            panic!("not a leaf page image: {:?}, pid: {:?}", category, pid);
        }

        let parent_index = u32::read_from(&mut reader);
        let left_sibling_index = u32::read_from(&mut reader);
        let right_sibling_index = u32::read_from(&mut reader);

        let header = decode_bitmap(&read_exact(&mut reader, header_size), slot_count);

        let mut tuples = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let tuple_bytes = read_exact(&mut reader, tuple_size);
            tuples.push(Tuple::new(schema, &tuple_bytes));
        }

        let mut page = Self {
            page: BTreeBasePage::new(pid),
            slot_count,
            header,
            tuples,
            schema: schema.clone(),
            right_sibling_index,
            left_sibling_index,
            key_field,
        };
        page.page
            .set_parent_pid(&PageID::new(PageCategory::Internal, pid.table_id, parent_index));
        page
    }

    fn get_pid(&self) -> PageID {
        self.page.get_pid()
    }

    fn get_parent_pid(&self) -> PageID {
        self.page.get_parent_pid()
    }

    fn set_parent_pid(&mut self, pid: &PageID) {
        self.page.set_parent_pid(pid)
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut writer = PageWriter::new();
        writer.write_bytes(&PageCategory::Leaf.to_bytes());
        writer.write(&self.get_parent_pid().page_index);
        writer.write(&self.left_sibling_index);
        writer.write(&self.right_sibling_index);
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

    fn set_before_image(&mut self) {
        let data = self.get_page_data();
        self.page.set_before_image(data);
    }

    fn get_before_image(&self) -> Vec<u8> {
        self.page.get_before_image()
    }
}

impl BTreeLeafPage {
    pub fn new_empty_page(pid: &PageID, schema: &Schema, key_field: usize) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        Self {
            page: BTreeBasePage::new(pid),
            slot_count,
            header: BitVec::from_elem(slot_count, false),
            tuples: vec![Tuple::new_int_tuple(0, 0); slot_count],
            schema: schema.clone(),
            right_sibling_index: EMPTY_PAGE_INDEX,
            left_sibling_index: EMPTY_PAGE_INDEX,
            key_field,
        }
    }

    /// The maximum number of tuples the page can hold: every tuple costs
    /// its payload plus one header bit, and the page starts with four
    /// 4-byte index fields (category, parent, both siblings) plus header
    /// rounding slack.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_tuple_including_header = schema.get_size() * 8 + 1;
        let extra_bits = 4 * 4 * 8 + 8;
        (BufferPool::get_page_size() * 8 - extra_bits) / bits_per_tuple_including_header
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        slot_count / 8 + 1
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

    /// Minimum-occupancy check; the root leaf is exempt.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.tuples_count() >= ceil_div(self.slot_count, 2)
    }

    pub fn set_right_pid(&mut self, pid: Option<PageID>) {
        self.right_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    pub fn get_right_pid(&self) -> Option<PageID> {
        if self.right_sibling_index == EMPTY_PAGE_INDEX {
            None
        } else {
            Some(PageID::new(
                PageCategory::Leaf,
                self.get_pid().table_id,
                self.right_sibling_index,
            ))
        }
    }

    pub fn set_left_pid(&mut self, pid: Option<PageID>) {
        self.left_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    pub fn get_left_pid(&self) -> Option<PageID> {
        if self.left_sibling_index == EMPTY_PAGE_INDEX {
            None
        } else {
            Some(PageID::new(
                PageCategory::Leaf,
                self.get_pid().table_id,
                self.left_sibling_index,
            ))
        }
    }

    pub fn get_key(&self, slot_index: usize) -> Cell {
        self.tuples[slot_index].get_cell(self.key_field)
    }

    /// Add the tuple such that all records stay in sorted key order.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> DbResult {
        // find the first empty slot
        let first_empty_slot = match (0..self.slot_count).find(|&i| !self.is_slot_used(i)) {
            Some(i) => i as i64,
            None => {
                return Err(DbError::new(&format!(
                    "no empty slot on leaf page {:?}",
                    self.get_pid()
                )))
            }
        };

        // Find the last slot whose key is less than the key being
        // inserted; -1 means the tuple belongs in slot 0.
        let key = tuple.get_cell(self.key_field);
        let mut last_less_slot: i64 = -1;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                if self.tuples[i].get_cell(self.key_field) < key {
                    last_less_slot = i as i64;
                } else {
                    break;
                }
            }
        }

        // shift records towards the empty slot to make room while keeping
        // the sorted order
        let good_slot: usize;
        if first_empty_slot < last_less_slot {
            for i in first_empty_slot..last_less_slot {
                self.move_tuple((i + 1) as usize, i as usize);
            }
            good_slot = last_less_slot as usize;
        } else {
            for i in ((last_less_slot + 1)..first_empty_slot).rev() {
                self.move_tuple(i as usize, (i + 1) as usize);
            }
            good_slot = (last_less_slot + 1) as usize;
        }

        self.tuples[good_slot] = tuple.clone();
        self.mark_slot_status(good_slot, true);

        debug!(
            "tuple inserted, pid: {:?}, slot: {}, first empty: {}, last less: {}",
            self.get_pid(),
            good_slot,
            first_empty_slot,
            last_less_slot
        );
        Ok(())
    }

    // move a tuple between slots, destination must be empty
    fn move_tuple(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) {
            return;
        }

        self.tuples[to] = self.tuples[from].clone();
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    pub fn get_tuple(&self, slot_index: usize) -> Option<Tuple> {
        if self.is_slot_used(slot_index) {
            return Some(self.tuples[slot_index].clone());
        }
        None
    }

    pub fn delete_tuple(&mut self, slot_index: usize) -> DbResult {
        if !self.is_slot_used(slot_index) {
            return Err(DbError::new(&format!(
                "tuple not on page, pid: {:?}, slot: {}",
                self.get_pid(),
                slot_index
            )));
        }
        self.mark_slot_status(slot_index, false);
        Ok(())
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    pub fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    /// Panics when the page violates its local invariants: leaf category,
    /// expected parent, sorted keys inside the given bounds, and (when
    /// requested) minimum occupancy for non-root pages.
    pub fn check_integrity(
        &self,
        parent_pid: &PageID,
        lower_bound: Option<&Cell>,
        upper_bound: Option<&Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Leaf);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound.cloned();
        for tuple in BTreeLeafPageIterator::new(self) {
            let key = tuple.get_cell(self.key_field);
            if let Some(previous) = &previous {
                assert!(
                    previous <= &key,
                    "leaf keys out of order, pid: {:?}, {:?} > {:?}",
                    self.get_pid(),
                    previous,
                    key,
                );
            }
            previous = Some(key);
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            assert!(
                previous <= upper_bound,
                "leaf key exceeds upper bound, pid: {:?}, {:?} > {:?}",
                self.get_pid(),
                previous,
                upper_bound,
            );
        }

        if check_occupancy && depth > 0 {
            assert!(
                self.tuples_count() >= ceil_div(self.slot_count, 2),
                "leaf below minimum occupancy, pid: {:?}, {}/{}",
                self.get_pid(),
                self.tuples_count(),
                self.slot_count,
            );
        }
    }
}

pub struct BTreeLeafPageIterator<'page> {
    page: &'page BTreeLeafPage,
    cursor: i64,
    reverse_cursor: i64,
}

impl<'page> BTreeLeafPageIterator<'page> {
    pub fn new(page: &'page BTreeLeafPage) -> Self {
        Self {
            page,
            cursor: -1,
            reverse_cursor: page.slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIterator<'_> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            if self.cursor >= self.reverse_cursor || self.cursor >= self.page.slot_count as i64 {
                return None;
            }

            let cursor = self.cursor as usize;
            if self.page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(
                    self.page.tuples[cursor].clone(),
                    cursor,
                    self.page.get_pid(),
                ));
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor <= self.cursor || self.reverse_cursor < 0 {
                return None;
            }

            let cursor = self.reverse_cursor as usize;
            if self.page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(
                    self.page.tuples[cursor].clone(),
                    cursor,
                    self.page.get_pid(),
                ));
            }
        }
    }
}


/// Iterator over a shared leaf page; locks the page for the duration of
/// each step only.
pub struct BTreeLeafPageIteratorRc {
    page: Arc<RwLock<BTreeLeafPage>>,
    cursor: i64,
    reverse_cursor: i64,
}

impl BTreeLeafPageIteratorRc {
    pub fn new(page: Arc<RwLock<BTreeLeafPage>>) -> Self {
        let slot_count = page.rl().get_slots_count();
        Self {
            page,
            cursor: -1,
            reverse_cursor: slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIteratorRc {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.cursor += 1;
            if self.cursor >= self.reverse_cursor || self.cursor >= page.slot_count as i64 {
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

impl DoubleEndedIterator for BTreeLeafPageIteratorRc {
    fn next_back(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor <= self.cursor || self.reverse_cursor < 0 {
                return None;
            }

            let cursor = self.reverse_cursor as usize;
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
