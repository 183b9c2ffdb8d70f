use super::{BTreeBasePage, BTreePage};
use crate::{
    io::{Decodeable, PageWriter},
    page_id::{PageCategory, PageID},
    storage::schema::Schema,
};

/// The size of the root pointer block at file offset 0. Independent of
/// the data page size.
pub const ROOT_POINTER_PAGE_SIZE: usize = 8;

/// The singleton page at offset 0: the packed id of the root page and of
/// the first header page (0 = no header pages yet).
pub struct BTreeRootPointerPage {
    base: BTreeBasePage,

    // mandatory, which avoids a lot of Option juggling; a fresh file
    // points at leaf page 1
    root_pid: PageID,

    header_pid: Option<PageID>,
}

impl BTreePage for BTreeRootPointerPage {
    fn new(pid: &PageID, bytes: &[u8], _schema: &Schema, _key_field: usize) -> Self {
        let mut reader = std::io::Cursor::new(bytes);
        let root_packed = u32::read_from(&mut reader);
        let header_packed = u32::read_from(&mut reader);

        let root_pid = PageID::decode(root_packed, pid.table_id);
        let header_pid = PageID::decode_opt(header_packed, pid.table_id);

        Self {
            base: BTreeBasePage::new(pid),
            root_pid,
            header_pid,
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
        writer.write(&self.root_pid.encode());
        writer.write(&PageID::encode_opt(&self.header_pid));
        writer.to_padded_bytes(ROOT_POINTER_PAGE_SIZE)
    }

    fn set_before_image(&mut self) {
        let data = self.get_page_data();
        self.base.set_before_image(data);
    }

    fn get_before_image(&self) -> Vec<u8> {
        self.base.get_before_image()
    }
}

impl BTreeRootPointerPage {
    /// The block image of a fresh file: root = leaf page 1, no headers.
    pub fn empty_page_data(table_id: u32) -> Vec<u8> {
        let root_pid = PageID::new(PageCategory::Leaf, table_id, 1);
        let mut writer = PageWriter::new();
        writer.write(&root_pid.encode());
        writer.write(&0u32);
        writer.to_padded_bytes(ROOT_POINTER_PAGE_SIZE)
    }

    pub fn get_root_pid(&self) -> PageID {
        self.root_pid
    }

    pub fn set_root_pid(&mut self, pid: &PageID) {
        self.root_pid = *pid;
    }

    /// The id of the first header page
    pub fn get_header_pid(&self) -> Option<PageID> {
        self.header_pid
    }

    pub fn set_header_pid(&mut self, pid: &PageID) {
        self.header_pid = Some(*pid);
    }
}
