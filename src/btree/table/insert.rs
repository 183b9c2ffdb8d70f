use log::debug;

use crate::{
    btree::page::{
        BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage, BTreeLeafPageIterator,
        BTreePage, Entry,
    },
    error::DbError,
    page_id::{PageCategory, PageID},
    storage::tuple::{Cell, Tuple},
    transaction::{Permission, Transaction},
    types::{DbResult, Pod, ResultPod},
    utils::HandyRwLock,
    BTreeTable, Database,
};

use super::SearchFor;

impl BTreeTable {
    /// Insert a tuple, keeping the tuples in sorted order. May cause
    /// pages to split if the leaf the tuple belongs to is full.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult {
        let root_pid = self.get_root_pid(tx)?;

        // find and lock the leaf page corresponding to the key field,
        // splitting it first when no slot is left
        let key = tuple.get_cell(self.key_field);
        let mut leaf_rc = self.find_leaf_page(
            tx,
            Permission::ReadWrite,
            root_pid,
            &SearchFor::Key(key.clone()),
        )?;

        if leaf_rc.rl().empty_slots_count() == 0 {
            leaf_rc = self.split_leaf_page(tx, leaf_rc, &key)?;
        }

        let leaf_pid = leaf_rc.rl().get_pid();
        leaf_rc.wl().insert_tuple(tuple)?;
        self.set_dirty(tx, &leaf_pid);
        Ok(())
    }

    /// Split a full leaf page to make room for the pending tuple,
    /// recursively splitting parents as needed to accommodate the new
    /// entry.
    ///
    /// The split point is chosen on the virtual page that includes the
    /// pending tuple, so both leaves satisfy minimum occupancy once it
    /// lands. The promoted key is the first key of the resulting
    /// right-hand page ("copy up": the key stays in the right leaf), and
    /// the new parent entry points at the two leaves. Sibling and parent
    /// pointers are rewired accordingly.
    ///
    /// Returns the leaf into which the pending tuple (key `key`) should
    /// be inserted.
    pub fn split_leaf_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeLeafPage>,
        key: &Cell,
    ) -> ResultPod<BTreeLeafPage> {
        let new_sibling_rc = self.get_empty_leaf_page(tx)?;
        let parent_pid: PageID;
        let promoted_key: Cell;
        let pending_goes_right: bool;

        // borrow of new_sibling_rc starts here
        // borrow of page_rc starts here
        {
            let mut new_sibling = new_sibling_rc.wl();
            let mut page = page_rc.wl();

            let count = page.tuples_count();
            // the final right page holds ⌈(n+1)/2⌉ of the n+1 tuples;
            // whether the pending one is among them decides how many
            // existing tuples move
            let right_final = (count + 2) / 2;
            let threshold_index = count - right_final;
            let threshold_key = BTreeLeafPageIterator::new(&page)
                .nth(threshold_index)
                .ok_or_else(|| DbError::new("split on an empty leaf"))?
                .get_cell(self.key_field);

            pending_goes_right = key > &threshold_key;
            let move_count = if pending_goes_right {
                count - threshold_index - 1
            } else {
                right_final
            };

            let mut it = BTreeLeafPageIterator::new(&page);
            let mut delete_indexes: Vec<usize> = Vec::new();
            for tuple in it.by_ref().rev().take(move_count) {
                delete_indexes.push(tuple.get_slot_index());
                new_sibling.insert_tuple(&tuple)?;
            }
            for i in delete_indexes {
                page.delete_tuple(i)?;
            }

            // the key promoted into the parent is the first key of the
            // right page once the pending tuple has landed
            let sibling_first = BTreeLeafPageIterator::new(&new_sibling)
                .next()
                .map(|t| t.get_cell(self.key_field));
            promoted_key = match (pending_goes_right, sibling_first) {
                (true, Some(first)) => std::cmp::min(key.clone(), first),
                (true, None) => key.clone(),
                (false, Some(first)) => first,
                (false, None) => {
                    return Err(DbError::new("leaf split moved no tuples"));
                }
            };

            parent_pid = page.get_parent_pid();
        }
        // borrow of new_sibling_rc ends here
        // borrow of page_rc ends here

        // Recursively split the parent as needed to accommodate the new
        // entry. This stays outside the borrow blocks: splitting the
        // parent locks a lot of children, possibly including this leaf.
        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid, key)?;

        // borrow of parent_rc starts here
        // borrow of page_rc starts here
        // borrow of new_sibling_rc starts here
        {
            let mut parent = parent_rc.wl();
            let mut page = page_rc.wl();
            let mut new_sibling = new_sibling_rc.wl();

            let entry = Entry::new(promoted_key, &page.get_pid(), &new_sibling.get_pid());
            parent.insert_entry(&entry)?;

            debug!(
                "leaf split, page: {}, new sibling: {}, parent: {}, promoted: {}",
                page.get_pid(),
                new_sibling.get_pid(),
                parent.get_pid(),
                entry,
            );

            // hook the new leaf into the sibling chain
            if let Some(old_right_pid) = page.get_right_pid() {
                let old_right_rc = Database::buffer_pool().get_leaf_page(
                    tx,
                    Permission::ReadWrite,
                    &old_right_pid,
                )?;
                old_right_rc.wl().set_left_pid(Some(new_sibling.get_pid()));
                self.set_dirty(tx, &old_right_pid);
            }

            new_sibling.set_right_pid(page.get_right_pid());
            new_sibling.set_left_pid(Some(page.get_pid()));
            page.set_right_pid(Some(new_sibling.get_pid()));

            page.set_parent_pid(&parent.get_pid());
            new_sibling.set_parent_pid(&parent.get_pid());

            self.set_dirty(tx, &page.get_pid());
            self.set_dirty(tx, &new_sibling.get_pid());
            self.set_dirty(tx, &parent.get_pid());
        }
        // borrow of parent_rc ends here
        // borrow of page_rc ends here
        // borrow of new_sibling_rc ends here

        if pending_goes_right {
            Ok(new_sibling_rc)
        } else {
            Ok(page_rc)
        }
    }

    /// Get a parent page ready to accept a new entry: create a new root
    /// when the page was the root, split the parent when it is full, or
    /// simply lock and return it.
    ///
    /// `key` is the key being inserted below; it decides which half is
    /// returned after a split.
    fn get_parent_with_empty_slots(
        &self,
        tx: &Transaction,
        parent_pid: PageID,
        key: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        match parent_pid.category {
            PageCategory::RootPointer => {
                // the split page was the root: a fresh internal page
                // becomes the new root
                let new_parent_rc = self.get_empty_internal_page(tx)?;
                let new_parent_pid = new_parent_rc.rl().get_pid();
                self.set_root_pid(tx, &new_parent_pid)?;
                Ok(new_parent_rc)
            }
            PageCategory::Internal => {
                let parent_rc =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;

                let empty_slots_count = parent_rc.rl().empty_slots_count();
                if empty_slots_count > 0 {
                    Ok(parent_rc)
                } else {
                    // no room for the entry: split the parent first
                    self.split_internal_page(tx, parent_rc, key)
                }
            }
            _ => Err(DbError::invalid_argument(&format!(
                "invalid parent category: {:?}",
                parent_pid.category
            ))),
        }
    }

    /// Split a full internal page, pushing its middle key up into the
    /// parent ("push up": the key is removed from both halves, its right
    /// child becoming the right page's leftmost child), and recursively
    /// splitting the parent as needed.
    ///
    /// Returns the half into which an entry with key `key` belongs.
    fn split_internal_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeInternalPage>,
        key: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        let sibling_rc = self.get_empty_internal_page(tx)?;
        let split_point: Cell;
        let mut parent_pid: PageID;
        let new_entry: Entry;

        // borrow of sibling_rc starts here
        // borrow of page_rc starts here
        {
            let mut sibling = sibling_rc.wl();
            let mut page = page_rc.wl();

            parent_pid = page.get_parent_pid();

            let entries_count = page.entries_count();
            let move_entries_count = entries_count / 2;

            // move the upper half of the entries, reparenting the
            // children that travel with them
            let mut delete_indexes: Vec<usize> = Vec::new();
            let mut it = BTreeInternalPageIterator::new(&page);
            for e in it.by_ref().rev().take(move_entries_count) {
                delete_indexes.push(e.get_record_id());
                sibling.insert_entry(&e)?;

                self.set_parent(tx, &e.get_right_child(), &sibling.get_pid())?;
            }

            // the next entry is pushed up: removed here, its key goes to
            // the parent, its right child becomes the sibling's leftmost
            // child
            let middle_entry = it
                .next_back()
                .ok_or_else(|| DbError::new("split on an internal page without entries"))?;
            delete_indexes.push(middle_entry.get_record_id());
            for i in delete_indexes {
                page.delete_key_and_right_child(i);
            }
            self.set_parent(tx, &middle_entry.get_right_child(), &sibling.get_pid())?;

            split_point = middle_entry.get_key();
            new_entry = Entry::new(split_point.clone(), &page.get_pid(), &sibling.get_pid());

            self.set_dirty(tx, &page.get_pid());
            self.set_dirty(tx, &sibling.get_pid());
        }
        // borrow of sibling_rc ends here
        // borrow of page_rc ends here

        if parent_pid.category == PageCategory::RootPointer {
            // the split page was the root: a fresh internal page becomes
            // the new root
            let new_root_rc = self.get_empty_internal_page(tx)?;
            parent_pid = new_root_rc.rl().get_pid();
            self.set_root_pid(tx, &parent_pid)?;
        }

        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid, key)?;
        let parent_pid = parent_rc.rl().get_pid();
        page_rc.wl().set_parent_pid(&parent_pid);
        sibling_rc.wl().set_parent_pid(&parent_pid);

        // borrow of parent_rc starts here
        {
            let mut parent = parent_rc.wl();
            parent.insert_entry(&new_entry)?;
            self.set_dirty(tx, &parent_pid);
        }
        // borrow of parent_rc ends here

        if key > &split_point {
            Ok(sibling_rc)
        } else {
            Ok(page_rc)
        }
    }
}
