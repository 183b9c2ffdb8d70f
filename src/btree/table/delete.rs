use log::debug;

use crate::{
    btree::page::{
        BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage, BTreeLeafPageIterator,
        BTreePage, Entry,
    },
    error::DbError,
    page_id::PageCategory,
    storage::tuple::WrappedTuple,
    transaction::{Permission, Transaction},
    types::{DbResult, Pod},
    utils::HandyRwLock,
    BTreeTable, Database,
};

/// delete-related methods
impl BTreeTable {
    /// Delete a tuple through its record id.
    ///
    /// May cause pages to merge or redistribute entries/tuples if pages
    /// drop below minimum occupancy.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &WrappedTuple) -> DbResult {
        let pid = tuple.get_pid();
        if pid.category != PageCategory::Leaf || pid.table_id != self.get_id() {
            return Err(DbError::invalid_argument(&format!(
                "tuple {:?} does not belong to this table",
                tuple
            )));
        }

        let leaf_rc = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;

        // hold the leaf page
        {
            let mut leaf = leaf_rc.wl();
            leaf.delete_tuple(tuple.get_slot_index())?;
        }
        // release the leaf page
        self.set_dirty(tx, &pid);

        if leaf_rc.rl().stable() {
            Ok(())
        } else {
            self.handle_unstable_leaf_page(tx, leaf_rc)
        }
    }

    /// Locate the page's siblings through the parent. Only pages bridged
    /// by a parent entry can redistribute or merge, so the raw leaf chain
    /// is not consulted here.
    ///
    /// Returns the parent page plus the bridging entry and the sibling,
    /// left-first when both exist.
    fn find_balance_partner<PAGE: BTreePage>(
        &self,
        tx: &Transaction,
        page_rc: &Pod<PAGE>,
    ) -> Result<(Pod<BTreeInternalPage>, Entry, bool), DbError> {
        let page_pid = page_rc.rl().get_pid();
        let parent_pid = page_rc.rl().get_parent_pid();

        let parent_rc =
            Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;

        // prefer the left sibling
        let left_entry = parent_rc.rl().get_entry_by_children(None, Some(&page_pid));
        if let Some(entry) = left_entry {
            return Ok((parent_rc, entry, true));
        }
        let right_entry = parent_rc.rl().get_entry_by_children(Some(&page_pid), None);
        if let Some(entry) = right_entry {
            return Ok((parent_rc, entry, false));
        }

        Err(DbError::new(&format!(
            "page {:?} not referenced by its parent {:?}",
            page_pid, parent_pid
        )))
    }

    /// Handle a leaf page that dropped below minimum occupancy: steal
    /// from a sibling when it has tuples to spare, merge with it
    /// otherwise.
    fn handle_unstable_leaf_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeLeafPage>,
    ) -> DbResult {
        if page_rc.rl().get_parent_pid().category == PageCategory::RootPointer {
            // the root leaf has no minimum occupancy
            return Ok(());
        }

        let (parent_rc, entry, sibling_on_left) = self.find_balance_partner(tx, &page_rc)?;

        if sibling_on_left {
            let left_pid = entry.get_left_child();
            let left_rc =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balancing_two_leaf_pages(tx, left_rc, page_rc, parent_rc, entry)
        } else {
            let right_pid = entry.get_right_child();
            let right_rc =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balancing_two_leaf_pages(tx, page_rc, right_rc, parent_rc, entry)
        }
    }

    /// Handle an internal page that dropped below minimum occupancy.
    fn handle_unstable_internal_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeInternalPage>,
    ) -> DbResult {
        if page_rc.rl().get_parent_pid().category == PageCategory::RootPointer {
            return Ok(());
        }

        let (parent_rc, entry, sibling_on_left) = self.find_balance_partner(tx, &page_rc)?;

        if sibling_on_left {
            let left_pid = entry.get_left_child();
            let left_rc =
                Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balancing_two_internal_pages(tx, left_rc, page_rc, parent_rc, entry)
        } else {
            let right_pid = entry.get_right_child();
            let right_rc =
                Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balancing_two_internal_pages(tx, page_rc, right_rc, parent_rc, entry)
        }
    }

    /// Redistribute or merge two leaf pages bridged by `entry`.
    ///
    /// Merges when both fit into one page; otherwise moves tuples until
    /// the counts are even and rewrites the parent key to the first key
    /// of the right page.
    fn balancing_two_leaf_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        mut entry: Entry,
    ) -> DbResult {
        let left_tuples = left_rc.rl().tuples_count();
        let right_tuples = right_rc.rl().tuples_count();

        if left_tuples + right_tuples <= left_rc.rl().get_slots_count() {
            return self.merge_leaf_page(tx, left_rc, right_rc, parent_rc, entry);
        }

        let move_count =
            (left_tuples + right_tuples) / 2 - std::cmp::min(left_tuples, right_tuples);
        if move_count == 0 {
            return Ok(());
        }

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            if left_tuples < right_tuples {
                // steal the head of the right page
                let mut deleted_indexes = Vec::new();
                for tuple in BTreeLeafPageIterator::new(&right).take(move_count) {
                    left.insert_tuple(&tuple)?;
                    deleted_indexes.push(tuple.get_slot_index());
                }
                for i in deleted_indexes {
                    right.delete_tuple(i)?;
                }
            } else {
                // steal the tail of the left page
                let mut deleted_indexes = Vec::new();
                for tuple in BTreeLeafPageIterator::new(&left).rev().take(move_count) {
                    right.insert_tuple(&tuple)?;
                    deleted_indexes.push(tuple.get_slot_index());
                }
                for i in deleted_indexes {
                    left.delete_tuple(i)?;
                }
            }

            // the bridging key follows the first tuple of the right page
            let new_key = BTreeLeafPageIterator::new(&right)
                .next()
                .ok_or_else(|| DbError::new("steal left the right page empty"))?
                .get_cell(self.key_field);
            entry.set_key(new_key);
            parent_rc.wl().update_entry(&entry);

            self.set_dirty(tx, &left.get_pid());
            self.set_dirty(tx, &right.get_pid());
        }
        // release the left and right page
        self.set_dirty(tx, &parent_rc.rl().get_pid());

        Ok(())
    }

    /// Fuse the right leaf into the left one: move the tuples, repair the
    /// sibling chain, release the right page to the free list and remove
    /// the bridging parent entry.
    fn merge_leaf_page(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: Entry,
    ) -> DbResult {
        let right_pid;

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();
            right_pid = right.get_pid();

            debug!("merging leaf {} into {}", right_pid, left.get_pid());

            let mut deleted = Vec::new();
            for tuple in BTreeLeafPageIterator::new(&right) {
                left.insert_tuple(&tuple)?;
                deleted.push(tuple.get_slot_index());
            }
            for slot in deleted {
                right.delete_tuple(slot)?;
            }

            // splice the right page out of the sibling chain
            left.set_right_pid(right.get_right_pid());
            if let Some(newer_right_pid) = right.get_right_pid() {
                let newer_right_rc = Database::buffer_pool().get_leaf_page(
                    tx,
                    Permission::ReadWrite,
                    &newer_right_pid,
                )?;
                newer_right_rc.wl().set_left_pid(Some(left.get_pid()));
                self.set_dirty(tx, &newer_right_pid);
            }

            self.set_dirty(tx, &left.get_pid());
        }
        // release the left and right page

        self.set_empty_page(tx, &right_pid)?;
        self.delete_parent_entry(tx, left_rc, parent_rc, entry)
    }

    /// Redistribute or merge two internal pages bridged by `entry`. Keys
    /// rotate through the parent: the bridging key is pulled down into
    /// the receiving page and the donated entry's key is pushed up to
    /// replace it.
    fn balancing_two_internal_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        mut entry: Entry,
    ) -> DbResult {
        let left_entries = left_rc.rl().entries_count();
        let right_entries = right_rc.rl().entries_count();

        // merging adds the pulled-down key on top of both pages' entries
        if left_entries + right_entries < left_rc.rl().get_max_capacity() {
            return self.merge_internal_page(tx, left_rc, right_rc, parent_rc, entry);
        }

        let move_count =
            (left_entries + right_entries) / 2 - std::cmp::min(left_entries, right_entries);
        if move_count == 0 {
            return Ok(());
        }

        let mut middle_key = entry.get_key();

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            if left_entries < right_entries {
                // rotate entries from the right page through the parent
                for _ in 0..move_count {
                    let donated = BTreeInternalPageIterator::new(&right)
                        .next()
                        .ok_or_else(|| DbError::new("steal from an empty internal page"))?;
                    let moved_child = donated.get_left_child();

                    let pulled_down =
                        Entry::new(middle_key.clone(), &left.get_last_child_pid(), &moved_child);
                    left.insert_entry(&pulled_down)?;
                    self.set_parent(tx, &moved_child, &left.get_pid())?;

                    middle_key = donated.get_key();
                    right.delete_key_and_left_child(donated.get_record_id());
                }
            } else {
                // mirror: rotate entries from the left page
                for _ in 0..move_count {
                    let donated = BTreeInternalPageIterator::new(&left)
                        .next_back()
                        .ok_or_else(|| DbError::new("steal from an empty internal page"))?;
                    let moved_child = donated.get_right_child();

                    let pulled_down =
                        Entry::new(middle_key.clone(), &moved_child, &right.get_first_child_pid());
                    right.insert_entry(&pulled_down)?;
                    self.set_parent(tx, &moved_child, &right.get_pid())?;

                    middle_key = donated.get_key();
                    left.delete_key_and_right_child(donated.get_record_id());
                }
            }

            self.set_dirty(tx, &left.get_pid());
            self.set_dirty(tx, &right.get_pid());
        }
        // release the left and right page

        entry.set_key(middle_key);
        parent_rc.wl().update_entry(&entry);
        self.set_dirty(tx, &parent_rc.rl().get_pid());

        Ok(())
    }

    /// Fuse the right internal page into the left one. The bridging
    /// parent key is pulled down to connect the two halves, moved
    /// children are reparented, and the right page goes to the free list.
    fn merge_internal_page(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: Entry,
    ) -> DbResult {
        let right_pid;

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();
            right_pid = right.get_pid();

            debug!("merging internal {} into {}", right_pid, left.get_pid());

            // stage 1: pull the bridging key down; it joins the left
            // page's last child to the right page's first child
            let pulled_down = Entry::new(
                entry.get_key(),
                &left.get_last_child_pid(),
                &right.get_first_child_pid(),
            );
            self.set_parent(tx, &right.get_first_child_pid(), &left.get_pid())?;
            left.insert_entry(&pulled_down)?;

            // stage 2: move the entries across, reparenting as we go
            let mut deleted_indexes = Vec::new();
            for e in BTreeInternalPageIterator::new(&right) {
                left.insert_entry(&e)?;
                self.set_parent(tx, &e.get_right_child(), &left.get_pid())?;
                deleted_indexes.push(e.get_record_id());
            }
            for i in deleted_indexes {
                right.delete_key_and_right_child(i);
            }

            self.set_dirty(tx, &left.get_pid());
        }
        // release the left and right page

        // stage 3: release the emptied page and drop the bridging entry
        self.set_empty_page(tx, &right_pid)?;
        self.delete_parent_entry(tx, left_rc, parent_rc, entry)
    }

    /// Remove an entry (key plus right-child pointer) from a parent page.
    ///
    /// An emptied root is replaced by its remaining child; a parent that
    /// dropped below minimum occupancy rebalances recursively.
    fn delete_parent_entry<PAGE: BTreePage>(
        &self,
        tx: &Transaction,
        left_rc: Pod<PAGE>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: Entry,
    ) -> DbResult {
        // hold the parent and left page
        {
            let mut parent = parent_rc.wl();
            let mut left = left_rc.wl();

            parent.delete_key_and_right_child(entry.get_record_id());
            self.set_dirty(tx, &parent.get_pid());

            if parent.entries_count() == 0
                && parent.get_parent_pid().category == PageCategory::RootPointer
            {
                // the parent was the root: its remaining child takes over
                let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;

                // hold the root pointer page
                {
                    let mut root_ptr = root_ptr_rc.wl();
                    left.set_parent_pid(&root_ptr.get_pid());
                    root_ptr.set_root_pid(&left.get_pid());
                }
                // release the root pointer page

                self.set_dirty(tx, &self.get_root_ptr_pid());
                self.set_dirty(tx, &left.get_pid());

                let parent_pid = parent.get_pid();
                drop(parent);
                drop(left);
                return self.set_empty_page(tx, &parent_pid);
            }

            if parent.stable() {
                return Ok(());
            }
        }
        // release the parent and left page

        self.handle_unstable_internal_page(tx, parent_rc)
    }
}
