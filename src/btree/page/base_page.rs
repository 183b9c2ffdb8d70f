use crate::{
    buffer_pool::BufferPool,
    page_id::{PageCategory, PageID, EMPTY_PAGE_INDEX},
    storage::schema::Schema,
};

/// The capability set shared by the four data-page shapes of a B+ tree
/// file: identity, parent linkage, serialization to a fixed-size byte
/// block, and the before-image snapshot taken at commit time.
pub trait BTreePage {
    fn new(pid: &PageID, bytes: &[u8], schema: &Schema, key_field: usize) -> Self
    where
        Self: Sized;

    fn get_pid(&self) -> PageID;

    fn get_parent_pid(&self) -> PageID;
    fn set_parent_pid(&mut self, pid: &PageID);

    /// Serialize the page into its on-disk block image.
    fn get_page_data(&self) -> Vec<u8>;

    fn set_before_image(&mut self);
    fn get_before_image(&self) -> Vec<u8>;
}

/// State common to every B+ tree page: its id, its parent pointer (an
/// index, 0 meaning the root pointer page) and the before-image.
pub struct BTreeBasePage {
    pid: PageID,
    parent_page_index: u32,

    before_image: Option<Vec<u8>>,
}

impl BTreeBasePage {
    pub fn new(pid: &PageID) -> BTreeBasePage {
        BTreeBasePage {
            pid: *pid,
            parent_page_index: EMPTY_PAGE_INDEX,
            before_image: None,
        }
    }

    pub fn get_pid(&self) -> PageID {
        self.pid
    }

    pub fn get_parent_pid(&self) -> PageID {
        let category = if self.parent_page_index == EMPTY_PAGE_INDEX {
            PageCategory::RootPointer
        } else {
            PageCategory::Internal
        };
        PageID::new(category, self.pid.get_table_id(), self.parent_page_index)
    }

    pub fn set_parent_pid(&mut self, pid: &PageID) {
        self.parent_page_index = pid.page_index;
    }

    pub fn set_before_image(&mut self, data: Vec<u8>) {
        self.before_image = Some(data);
    }

    pub fn get_before_image(&self) -> Vec<u8> {
        match &self.before_image {
            Some(data) => data.clone(),
            None => empty_page_data(),
        }
    }
}

pub fn empty_page_data() -> Vec<u8> {
    vec![0; BufferPool::get_page_size()]
}
