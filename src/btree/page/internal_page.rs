use std::fmt;

use bit_vec::BitVec;
use log::error;

use super::{BTreeBasePage, BTreePage};
use crate::{
    buffer_pool::BufferPool,
    error::DbError,
    io::{decode_bitmap, encode_bitmap, read_exact, Decodeable, Encodeable, PageWriter},
    page_id::{PageCategory, PageID},
    storage::{
        schema::{get_type_length, Schema},
        tuple::Cell,
    },
    types::DbResult,
};

/// An internal page: sorted keys with child pointers, where adjacent
/// entries share a child.
///
/// Block layout: category tag (4) | parent index (4) | child category (1) |
/// slot bitmap | child indexes | keys.
///
/// Note: the left child of the nth entry is not always located in slot
/// n-1, but in the nearest lower slot that is marked used.
pub struct BTreeInternalPage {
    page: BTreeBasePage,

    keys: Vec<Cell>,
    children: Vec<PageID>,

    /// entries capacity + 1; slot 0 carries only the leftmost child
    slot_count: usize,

    header: BitVec<u32>,

    key_size: usize,

    key_field: usize,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreePage for BTreeInternalPage {
    fn new(pid: &PageID, bytes: &[u8], schema: &Schema, key_field: usize) -> Self {
        let key_type = schema.get_field(key_field).t;
        let key_size = get_type_length(key_type);
        let slot_count = Self::get_children_cap(key_size);
        let header_size = Self::get_header_size(slot_count);

        let mut reader = std::io::Cursor::new(bytes);
        let category = PageCategory::from_bytes(&read_exact(&mut reader, 4));
        if category != PageCategory::Internal {
            panic!("not an internal page image: {:?}, pid: {:?}", category, pid);
        }

        let parent_index = u32::read_from(&mut reader);
        let child_category_tag = u8::read_from(&mut reader);
        let child_category = match child_category_tag {
            0 => PageCategory::Leaf,
            _ => PageCategory::Internal,
        };

        let header = decode_bitmap(&read_exact(&mut reader, header_size), slot_count);

        let mut children = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let index = u32::read_from(&mut reader);
            children.push(PageID::new(child_category, pid.table_id, index));
        }

        let mut keys = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let key_bytes = read_exact(&mut reader, key_size);
            let mut key_reader = std::io::Cursor::new(key_bytes);
            keys.push(Cell::read_from(&mut key_reader, key_type));
        }

        let mut page = Self {
            page: BTreeBasePage::new(pid),
            keys,
            children,
            slot_count,
            header,
            key_size,
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
        let child_category_tag: u8 = match self.get_children_category() {
            PageCategory::Leaf => 0,
            _ => 1,
        };

        let mut writer = PageWriter::new();
        writer.write_bytes(&PageCategory::Internal.to_bytes());
        writer.write(&self.get_parent_pid().page_index);
        writer.write(&child_category_tag);
        writer.write_bytes(&encode_bitmap(
            &self.header,
            Self::get_header_size(self.slot_count),
        ));
        for i in 0..self.slot_count {
            writer.write(&self.children[i].page_index);
        }
        for i in 0..self.slot_count {
            // slot 0 carries no key; unused slots stay zeroed
            if i > 0 && self.is_slot_used(i) {
                let key_bytes = self.keys[i].to_bytes();
                // a variable-width cell here would corrupt the slot
                // arithmetic
                assert_eq!(key_bytes.len(), self.key_size);
                writer.write_bytes(&key_bytes);
            } else {
                writer.write_bytes(&vec![0; self.key_size]);
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

impl BTreeInternalPage {
    pub fn new_empty_page(pid: &PageID, schema: &Schema, key_field: usize) -> Self {
        let key_type = schema.get_field(key_field).t;
        let key_size = get_type_length(key_type);
        let slot_count = Self::get_children_cap(key_size);

        Self {
            page: BTreeBasePage::new(pid),
            keys: vec![Cell::Int32(0); slot_count],
            children: vec![PageID::new(PageCategory::Leaf, pid.table_id, 0); slot_count],
            slot_count,
            header: BitVec::from_elem(slot_count, false),
            key_size,
            key_field,
        }
    }

    fn get_header_size(slot_count: usize) -> usize {
        slot_count / 8 + 1
    }

    /// The maximum number of children an internal page can hold: each
    /// child costs a 4-byte pointer, a key slot and a header bit; the
    /// fixed costs are the category tag, the parent pointer, the child
    /// category byte and header rounding slack.
    pub fn get_children_cap(key_size: usize) -> usize {
        (BufferPool::get_page_size() * 8 - 80) / (key_size * 8 + 33)
    }

    pub fn get_entries_cap(key_size: usize) -> usize {
        Self::get_children_cap(key_size) - 1
    }

    /// The maximum number of entries of this particular page.
    pub fn get_max_capacity(&self) -> usize {
        self.slot_count - 1
    }

    pub fn get_key_field(&self) -> usize {
        self.key_field
    }

    fn get_children_category(&self) -> PageCategory {
        // all children of a page live at the same depth; default for an
        // empty page does not matter
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                return self.children[i].category;
            }
        }
        PageCategory::Leaf
    }

    pub fn empty_slots_count(&self) -> usize {
        // slot 0 carries no key, a node with m keys has m+1 children
        (1..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn entries_count(&self) -> usize {
        self.slot_count - 1 - self.empty_slots_count()
    }

    /// Minimum-occupancy check; the root is exempt.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.entries_count() >= self.get_max_capacity() / 2
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn insert_entry(&mut self, e: &Entry) -> DbResult {
        if self.empty_slots_count() == 0 {
            return Err(DbError::new(&format!(
                "no empty slot on internal page {:?}",
                self.get_pid()
            )));
        }

        // the first entry occupies slot 0 (left child) and slot 1
        if self.entries_count() == 0 {
            self.children[0] = e.get_left_child();
            self.children[1] = e.get_right_child();
            self.keys[1] = e.get_key();
            self.mark_slot_status(0, true);
            self.mark_slot_status(1, true);
            return Ok(());
        }

        // find the first empty slot
        let mut empty_slot = 0;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                empty_slot = i;
                break;
            }
        }

        // find the slot holding the child pointer this entry attaches to
        let mut slot_just_ahead = usize::MAX;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                continue;
            }

            // case 1: the new entry goes right after the current one
            if self.children[i] == e.get_left_child() {
                slot_just_ahead = i;
                break;
            }

            // case 2: the new entry splits the current one, so the
            // current entry keeps the new entry's left child
            if self.children[i] == e.get_right_child() {
                slot_just_ahead = i;
                self.children[i] = e.get_left_child();
                break;
            }
        }

        if slot_just_ahead == usize::MAX {
            let err = DbError::new(&format!(
                "no slot found for entry {}, pid: {:?}, entries count: {}",
                e,
                self.get_pid(),
                self.entries_count()
            ));
            error!("{}", err);
            return Err(err);
        }

        // shift entries towards the empty slot to make room while keeping
        // the sorted order
        let good_slot: usize;
        if empty_slot < slot_just_ahead {
            for i in empty_slot..slot_just_ahead {
                self.move_entry(i + 1, i);
            }
            good_slot = slot_just_ahead;
        } else {
            for i in ((slot_just_ahead + 1)..empty_slot).rev() {
                self.move_entry(i, i + 1);
            }
            good_slot = slot_just_ahead + 1;
        }

        self.keys[good_slot] = e.get_key();
        self.children[good_slot] = e.get_right_child();
        self.mark_slot_status(good_slot, true);
        Ok(())
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        if self.is_slot_used(from) && !self.is_slot_used(to) {
            self.keys[to] = self.keys[from].clone();

            // the left-child slot needs no update: it is the nearest
            // *used* lower slot, not the adjacent one
            self.children[to] = self.children[from];

            self.mark_slot_status(from, false);
            self.mark_slot_status(to, true);
        }
    }

    pub fn get_entry(&self, slot_index: usize) -> Option<Entry> {
        BTreeInternalPageIterator::new(self).find(|e| e.get_record_id() == slot_index)
    }

    /// Remove the entry: its key and its right child pointer.
    pub fn delete_key_and_right_child(&mut self, record_id: usize) {
        self.mark_slot_status(record_id, false);
    }

    /// Remove the entry: its key and its left child pointer. The right
    /// child is re-attached to the nearest used lower slot.
    pub fn delete_key_and_left_child(&mut self, record_id: usize) {
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = self.children[record_id];
                self.mark_slot_status(record_id, false);
                return;
            }
        }
    }

    pub fn update_entry(&mut self, entry: &Entry) {
        let record_id = entry.get_record_id();

        // the left child lives in the nearest used lower slot
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = entry.get_left_child();
                break;
            }
        }

        self.children[record_id] = entry.get_right_child();
        self.keys[record_id] = entry.get_key();
    }

    /// Find the entry whose children match the given pids. Used by the
    /// delete path to locate the parent entry bridging two siblings.
    pub fn get_entry_by_children(
        &self,
        left_pid: Option<&PageID>,
        right_pid: Option<&PageID>,
    ) -> Option<Entry> {
        for e in BTreeInternalPageIterator::new(self) {
            if let Some(left) = left_pid {
                if &e.get_left_child() != left {
                    continue;
                }
            }
            if let Some(right) = right_pid {
                if &e.get_right_child() != right {
                    continue;
                }
            }
            return Some(e);
        }
        None
    }

    /// The leftmost child. A page whose entries were all deleted (a
    /// transient state during rebalancing) still carries its lone child
    /// in slot 0.
    pub fn get_first_child_pid(&self) -> PageID {
        if let Some(e) = BTreeInternalPageIterator::new(self).next() {
            return e.get_left_child();
        }
        if self.is_slot_used(0) {
            return self.children[0];
        }
        panic!("internal page {:?} has no children", self.get_pid());
    }

    pub fn get_last_child_pid(&self) -> PageID {
        if let Some(e) = BTreeInternalPageIterator::new(self).next_back() {
            return e.get_right_child();
        }
        if self.is_slot_used(0) {
            return self.children[0];
        }
        panic!("internal page {:?} has no children", self.get_pid());
    }

    pub fn check_integrity(
        &self,
        parent_pid: &PageID,
        lower_bound: Option<&Cell>,
        upper_bound: Option<&Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Internal);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound.cloned();
        for e in BTreeInternalPageIterator::new(self) {
            if let Some(previous) = &previous {
                assert!(
                    previous <= &e.get_key(),
                    "entries out of order, pid: {:?}, previous: {:?}, current: {}",
                    self.get_pid(),
                    previous,
                    e,
                );
            }
            previous = Some(e.get_key());
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            assert!(
                previous <= upper_bound,
                "entry key exceeds upper bound, pid: {:?}, {:?} > {:?}",
                self.get_pid(),
                previous,
                upper_bound,
            );
        }

        if check_occupancy && depth > 0 {
            // one entry of tolerance, since a page may sit just below
            // half full right after a split
            let minimal_stable = self.get_max_capacity() / 2 - 1;
            assert!(
                self.entries_count() >= minimal_stable,
                "internal page below minimum occupancy, pid: {:?}, {}/{}",
                self.get_pid(),
                self.entries_count(),
                self.get_max_capacity(),
            );
        }
    }
}

/// A view of one internal-page slot: the key plus both child pointers.
/// All keys reachable from the left child are <= the key, all keys
/// reachable from the right child are >= the key.
#[derive(Clone)]
pub struct Entry {
    key: Cell,
    left: PageID,
    right: PageID,

    // slot position in the page
    record_id: usize,
}

impl Entry {
    pub fn new(key: Cell, left: &PageID, right: &PageID) -> Self {
        Self {
            key,
            left: *left,
            right: *right,
            record_id: 0,
        }
    }

    pub fn set_record_id(&mut self, record_id: usize) {
        self.record_id = record_id;
    }

    pub fn get_record_id(&self) -> usize {
        self.record_id
    }

    pub fn get_key(&self) -> Cell {
        self.key.clone()
    }

    pub fn set_key(&mut self, key: Cell) {
        self.key = key;
    }

    pub fn get_left_child(&self) -> PageID {
        self.left
    }

    pub fn get_right_child(&self) -> PageID {
        self.right
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:?}, {}, {})", self.key, self.left, self.right)
    }
}


pub struct BTreeInternalPageIterator<'page> {
    page: &'page BTreeInternalPage,

    cursor: usize,
    left_child_position: usize,

    reverse_cursor: usize,
    right_child_position: usize,
}

impl<'page> BTreeInternalPageIterator<'page> {
    pub fn new(page: &'page BTreeInternalPage) -> Self {
        // position the reverse cursor on the last used slot
        let mut right_child_position = page.slot_count;
        loop {
            right_child_position -= 1;
            if right_child_position == 0 || page.is_slot_used(right_child_position) {
                break;
            }
        }

        Self {
            page,
            cursor: 0,
            left_child_position: 0,
            reverse_cursor: right_child_position,
            right_child_position,
        }
    }
}

impl Iterator for BTreeInternalPageIterator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            let cursor = self.cursor;
            if cursor >= self.page.slot_count {
                return None;
            }

            if !self.page.is_slot_used(cursor) {
                continue;
            }

            let mut e = Entry::new(
                self.page.keys[cursor].clone(),
                &self.page.children[self.left_child_position],
                &self.page.children[cursor],
            );
            e.set_record_id(cursor);

            self.left_child_position = cursor;
            return Some(e);
        }
    }
}

impl DoubleEndedIterator for BTreeInternalPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let left_index = match self.reverse_cursor.checked_sub(1) {
                Some(i) => i,
                None => return None,
            };
            self.reverse_cursor = left_index;

            if self.right_child_position == 0 {
                // the forward side consumed everything
                return None;
            }
            if !self.page.is_slot_used(left_index) {
                continue;
            }

            let mut e = Entry::new(
                self.page.keys[self.right_child_position].clone(),
                &self.page.children[left_index],
                &self.page.children[self.right_child_position],
            );
            e.set_record_id(self.right_child_position);

            self.right_child_position = left_index;
            return Some(e);
        }
    }
}
