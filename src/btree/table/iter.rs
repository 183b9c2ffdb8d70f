use std::sync::Arc;

use crate::{
    btree::page::{BTreeLeafPage, BTreeLeafPageIteratorRc},
    operator::{Op, Predicate},
    storage::tuple::WrappedTuple,
    transaction::{Permission, Transaction},
    types::Pod,
    utils::HandyRwLock,
    BTreeTable, Database,
};

use super::SearchFor;

/// Double-ended scan over the whole tree in key order, following the
/// leaf sibling chain under READ_ONLY latches.
pub struct BTreeTableIterator {
    tx: Transaction,
    table: Arc<BTreeTable>,

    page_rc: Pod<BTreeLeafPage>,
    last_page_rc: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,
    last_page_it: BTreeLeafPageIteratorRc,
}

impl BTreeTableIterator {
    pub fn new(tx: &Transaction, table: &Arc<BTreeTable>) -> Self {
        let page_rc = table.get_first_page(tx, Permission::ReadOnly).unwrap();
        let last_page_rc = table.get_last_page(tx, Permission::ReadOnly).unwrap();

        Self {
            tx: *tx,
            table: Arc::clone(table),
            page_rc: Arc::clone(&page_rc),
            last_page_rc: Arc::clone(&last_page_rc),
            page_it: BTreeLeafPageIteratorRc::new(Arc::clone(&page_rc)),
            last_page_it: BTreeLeafPageIteratorRc::new(Arc::clone(&last_page_rc)),
        }
    }

    pub fn rewind(&mut self) {
        let page_rc = self
            .table
            .get_first_page(&self.tx, Permission::ReadOnly)
            .unwrap();
        let last_page_rc = self
            .table
            .get_last_page(&self.tx, Permission::ReadOnly)
            .unwrap();

        self.page_rc = Arc::clone(&page_rc);
        self.last_page_rc = Arc::clone(&last_page_rc);
        self.page_it = BTreeLeafPageIteratorRc::new(page_rc);
        self.last_page_it = BTreeLeafPageIteratorRc::new(last_page_rc);
    }
}

impl Iterator for BTreeTableIterator {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(t) = self.page_it.next() {
                return Some(t);
            }

            let right = self.page_rc.rl().get_right_pid();
            match right {
                Some(right) => {
                    let sibling_rc = Database::buffer_pool()
                        .get_leaf_page(&self.tx, Permission::ReadOnly, &right)
                        .unwrap();
                    self.page_rc = Arc::clone(&sibling_rc);
                    self.page_it = BTreeLeafPageIteratorRc::new(sibling_rc);
                }
                None => return None,
            }
        }
    }
}

impl DoubleEndedIterator for BTreeTableIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(t) = self.last_page_it.next_back() {
                return Some(t);
            }

            let left = self.last_page_rc.rl().get_left_pid();
            match left {
                Some(left) => {
                    let sibling_rc = Database::buffer_pool()
                        .get_leaf_page(&self.tx, Permission::ReadOnly, &left)
                        .unwrap();
                    self.last_page_rc = Arc::clone(&sibling_rc);
                    self.last_page_it = BTreeLeafPageIteratorRc::new(sibling_rc);
                }
                None => return None,
            }
        }
    }
}

/// Forward scan restricted by a predicate on the key field. Starts at
/// the first leaf that can contain a match and stops as soon as no
/// further tuple can match in the traversal direction.
pub struct BTreeTableSearchIterator {
    tx: Transaction,

    current_page_rc: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,
    predicate: Predicate,
    key_field: usize,
}

impl BTreeTableSearchIterator {
    pub fn new(tx: &Transaction, table: &Arc<BTreeTable>, predicate: &Predicate) -> Self {
        let root_pid = table.get_root_pid(tx).unwrap();

        let start_rc = match predicate.op {
            Op::Equals | Op::GreaterThan | Op::GreaterThanOrEq => table
                .find_leaf_page(
                    tx,
                    Permission::ReadOnly,
                    root_pid,
                    &SearchFor::Key(predicate.cell.clone()),
                )
                .unwrap(),
            Op::LessThan | Op::LessThanOrEq | Op::NotEquals => table
                .find_leaf_page(tx, Permission::ReadOnly, root_pid, &SearchFor::LeftMost)
                .unwrap(),
        };

        Self {
            tx: *tx,
            current_page_rc: Arc::clone(&start_rc),
            page_it: BTreeLeafPageIteratorRc::new(start_rc),
            predicate: predicate.clone(),
            key_field: table.key_field,
        }
    }
}

impl Iterator for BTreeTableSearchIterator {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.page_it.next() {
                Some(t) => {
                    let cell = t.get_cell(self.key_field);
                    match self.predicate.op {
                        Op::Equals => {
                            if cell == self.predicate.cell {
                                return Some(t);
                            } else if cell > self.predicate.cell {
                                return None;
                            }
                        }
                        Op::GreaterThan => {
                            if cell > self.predicate.cell {
                                return Some(t);
                            }
                        }
                        Op::GreaterThanOrEq => {
                            if cell >= self.predicate.cell {
                                return Some(t);
                            }
                        }
                        Op::LessThan => {
                            if cell < self.predicate.cell {
                                return Some(t);
                            } else {
                                return None;
                            }
                        }
                        Op::LessThanOrEq => {
                            if cell <= self.predicate.cell {
                                return Some(t);
                            } else {
                                return None;
                            }
                        }
                        Op::NotEquals => {
                            if cell != self.predicate.cell {
                                return Some(t);
                            }
                        }
                    }
                }
                None => {
                    // this page is exhausted, move to the right sibling
                    let right = self.current_page_rc.rl().get_right_pid();
                    match right {
                        Some(pid) => {
                            let rc = Database::buffer_pool()
                                .get_leaf_page(&self.tx, Permission::ReadOnly, &pid)
                                .unwrap();
                            self.current_page_rc = Arc::clone(&rc);
                            self.page_it = BTreeLeafPageIteratorRc::new(rc);
                        }
                        None => return None,
                    }
                }
            }
        }
    }
}

/// Mirror of `BTreeTableSearchIterator`: yields matches in descending
/// key order, walking left siblings.
pub struct BTreeTableReverseSearchIterator {
    tx: Transaction,

    current_page_rc: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,
    predicate: Predicate,
    key_field: usize,
}

impl BTreeTableReverseSearchIterator {
    pub fn new(tx: &Transaction, table: &Arc<BTreeTable>, predicate: &Predicate) -> Self {
        let root_pid = table.get_root_pid(tx).unwrap();

        let start_rc = match predicate.op {
            Op::Equals | Op::LessThan | Op::LessThanOrEq => table
                .find_leaf_page_reverse(
                    tx,
                    Permission::ReadOnly,
                    root_pid,
                    &predicate.cell,
                )
                .unwrap(),
            Op::GreaterThan | Op::GreaterThanOrEq | Op::NotEquals => table
                .find_leaf_page(tx, Permission::ReadOnly, root_pid, &SearchFor::RightMost)
                .unwrap(),
        };

        Self {
            tx: *tx,
            current_page_rc: Arc::clone(&start_rc),
            page_it: BTreeLeafPageIteratorRc::new(start_rc),
            predicate: predicate.clone(),
            key_field: table.key_field,
        }
    }
}

impl Iterator for BTreeTableReverseSearchIterator {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.page_it.next_back() {
                Some(t) => {
                    let cell = t.get_cell(self.key_field);
                    match self.predicate.op {
                        Op::Equals => {
                            if cell == self.predicate.cell {
                                return Some(t);
                            } else if cell < self.predicate.cell {
                                return None;
                            }
                        }
                        Op::LessThan => {
                            if cell < self.predicate.cell {
                                return Some(t);
                            }
                        }
                        Op::LessThanOrEq => {
                            if cell <= self.predicate.cell {
                                return Some(t);
                            }
                        }
                        Op::GreaterThan => {
                            if cell > self.predicate.cell {
                                return Some(t);
                            } else {
                                return None;
                            }
                        }
                        Op::GreaterThanOrEq => {
                            if cell >= self.predicate.cell {
                                return Some(t);
                            } else {
                                return None;
                            }
                        }
                        Op::NotEquals => {
                            if cell != self.predicate.cell {
                                return Some(t);
                            }
                        }
                    }
                }
                None => {
                    // this page is exhausted, move to the left sibling
                    let left = self.current_page_rc.rl().get_left_pid();
                    match left {
                        Some(pid) => {
                            let rc = Database::buffer_pool()
                                .get_leaf_page(&self.tx, Permission::ReadOnly, &pid)
                                .unwrap();
                            self.current_page_rc = Arc::clone(&rc);
                            self.page_it = BTreeLeafPageIteratorRc::new(rc);
                        }
                        None => return None,
                    }
                }
            }
        }
    }
}
