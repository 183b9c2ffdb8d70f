use std::{cmp::Ordering, fmt, io::Cursor};

use crate::{
    io::{read_exact, Decodeable, Encodeable},
    page_id::PageID,
    storage::schema::{Schema, Type, CHAR_LEN},
};

/// A typed value. Cells of different variants do not compare; mixing them
/// is a programming error and panics.
#[derive(Debug, Clone)]
pub enum Cell {
    Int32(i32),
    String(String),
}

impl Cell {
    pub fn get_type(&self) -> Type {
        match self {
            Cell::Int32(_) => Type::Int,
            Cell::String(_) => Type::Char,
        }
    }

    pub fn get_int32(&self) -> i32 {
        match self {
            Cell::Int32(v) => *v,
            _ => panic!("not an int cell: {:?}", self),
        }
    }

    pub fn read_from<R: std::io::Read>(reader: &mut R, t: Type) -> Self {
        match t {
            Type::Int => Cell::Int32(i32::read_from(reader)),
            Type::Char => {
                let len = u32::read_from(reader) as usize;
                let payload = read_exact(reader, CHAR_LEN);
                let s = String::from_utf8(payload[..len.min(CHAR_LEN)].to_vec())
                    .unwrap_or_default();
                Cell::String(s)
            }
        }
    }
}

impl Encodeable for Cell {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Cell::Int32(v) => v.to_bytes(),
            Cell::String(v) => {
                let mut bytes = (v.len().min(CHAR_LEN) as u32).to_bytes();
                let mut payload = v.as_bytes().to_vec();
                payload.truncate(CHAR_LEN);
                payload.resize(CHAR_LEN, 0);
                bytes.extend_from_slice(&payload);
                bytes
            }
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Cell::Int32(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Cell::String(v) => {
                1u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Int32(a), Cell::Int32(b)) => a.cmp(b),
            (Cell::String(a), Cell::String(b)) => a.cmp(b),
            _ => panic!("cannot compare cells of different types: {:?} vs {:?}", self, other),
        }
    }
}

/// A record: an ordered sequence of cells conforming to some schema. The
/// cell slots are mutable; residence information lives in `WrappedTuple`.
#[derive(Clone)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new_from_cells(cells: &[Cell]) -> Self {
        Self {
            cells: cells.to_vec(),
        }
    }

    pub fn new(schema: &Schema, bytes: &[u8]) -> Self {
        let mut reader = Cursor::new(bytes);
        Self::read_from(&mut reader, schema)
    }

    pub fn read_from<R: std::io::Read>(reader: &mut R, schema: &Schema) -> Self {
        let mut cells: Vec<Cell> = Vec::new();
        for field in &schema.fields {
            cells.push(Cell::read_from(reader, field.t));
        }
        Tuple { cells }
    }

    /// A tuple of `width` int fields, all set to `value`.
    pub fn new_int_tuple(value: i32, width: usize) -> Self {
        Tuple {
            cells: vec![Cell::Int32(value); width],
        }
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    pub fn set_cell(&mut self, i: usize, cell: Cell) {
        self.cells[i] = cell;
    }

    pub fn get_cells(&self) -> Vec<Cell> {
        self.cells.clone()
    }

    pub fn cells_count(&self) -> usize {
        self.cells.len()
    }

    /// Concatenate two tuples, used by joins.
    pub fn merge(a: &Tuple, b: &Tuple) -> Tuple {
        let mut cells = a.cells.clone();
        cells.extend(b.cells.iter().cloned());
        Tuple { cells }
    }
}

impl Encodeable for Tuple {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for cell in &self.cells {
            bytes.extend_from_slice(&cell.to_bytes());
        }
        bytes
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut content: String = "{".to_owned();
        for cell in &self.cells {
            content.push_str(&format!("{:?}, ", cell));
        }
        if content.len() > 1 {
            content.truncate(content.len() - 2);
        }
        content.push('}');
        write!(f, "{}", content)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A tuple plus its physical residence (page id + slot), i.e. the record
/// id. Iterators yield wrapped tuples so deletions can find their page.
#[derive(Clone, PartialEq)]
pub struct WrappedTuple {
    internal: Tuple,
    slot_index: usize,
    pid: PageID,
}

impl std::ops::Deref for WrappedTuple {
    type Target = Tuple;
    fn deref(&self) -> &Self::Target {
        &self.internal
    }
}

impl std::ops::DerefMut for WrappedTuple {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.internal
    }
}

impl WrappedTuple {
    pub fn new(internal: Tuple, slot_index: usize, pid: PageID) -> WrappedTuple {
        WrappedTuple {
            internal,
            slot_index,
            pid,
        }
    }

    pub fn get_slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn get_pid(&self) -> PageID {
        self.pid
    }

    pub fn get_tuple(&self) -> &Tuple {
        &self.internal
    }
}

impl Eq for WrappedTuple {}

impl fmt::Display for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{:?}[{}]", self.internal, self.pid, self.slot_index)
    }
}

impl fmt::Debug for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{small_int_schema, FieldItem};

    #[test]
    fn test_tuple_round_trip() {
        let schema = small_int_schema(3, "t");
        let tuple = Tuple::new_int_tuple(35, 3);
        let bytes = tuple.to_bytes();
        assert_eq!(bytes.len(), schema.get_size());

        let decoded = Tuple::new(&schema, &bytes);
        assert_eq!(tuple, decoded);
    }

    #[test]
    fn test_char_cell_round_trip() {
        let schema = Schema::new(vec![
            FieldItem {
                t: Type::Int,
                name: "id".to_string(),
            },
            FieldItem {
                t: Type::Char,
                name: "name".to_string(),
            },
        ]);

        let tuple =
            Tuple::new_from_cells(&[Cell::Int32(7), Cell::String("alice".to_string())]);
        let bytes = tuple.to_bytes();
        assert_eq!(bytes.len(), schema.get_size());

        let decoded = Tuple::new(&schema, &bytes);
        assert_eq!(tuple, decoded);
    }

    #[test]
    fn test_cell_compare() {
        assert!(Cell::Int32(1) < Cell::Int32(2));
        assert!(Cell::String("a".to_string()) < Cell::String("b".to_string()));
        assert_eq!(Cell::Int32(5), Cell::Int32(5));
    }
}
