//! Rows, chunk boundaries and DML operations.
//!
//! Values travel through the pipeline in their raw textual wire form as
//! nullable byte strings. Keeping bytes rather than `String` preserves
//! binary column content that is not valid UTF-8; comparison and rendering
//! decide per column how to interpret the bytes.

/// One nullable column value in its textual wire form.
pub type Field = Option<Vec<u8>>;

/// A primary-key tuple. Key columns are null-free by construction
/// (a synthetic key is only elected from null-free indexes).
pub type KeyTuple = Vec<Vec<u8>>;

/// One table row: nullable values in table column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    /// Values in [`crate::schema::TableMeta`] column order.
    pub fields: Vec<Field>,
}

impl RowRecord {
    /// Create a row from its fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

/// A half-open primary-key range `[begin, end)` owned by exactly one chunk.
///
/// `begin` is absent for the first chunk of a table and `end` is absent for
/// the last one, so the chunk set covers the whole key space including
/// destination keys outside the source's observed range; a single-chunk
/// table has both bounds absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBoundary {
    /// Index into the compiled table list.
    pub table_id: usize,

    /// Monotonically increasing id, offset by `table_id * 100_000_000` so
    /// ids stay unique and sortable across interleaved tables.
    pub chunk_id: u64,

    /// Inclusive lower key bound.
    pub begin: Option<KeyTuple>,

    /// Exclusive upper key bound.
    pub end: Option<KeyTuple>,
}

impl ChunkBoundary {
    /// Base chunk id for a table.
    pub fn base_id(table_id: usize) -> u64 {
        table_id as u64 * 100_000_000
    }
}

/// The rows found inside one [`ChunkBoundary`] on one side.
#[derive(Debug)]
pub struct DataChunk {
    pub boundary: ChunkBoundary,
    pub rows: Vec<RowRecord>,
}

/// A matched source/destination pair for one chunk, ready to diff.
#[derive(Debug)]
pub struct ChunkPair {
    pub boundary: ChunkBoundary,
    pub source_rows: Vec<RowRecord>,
    pub dest_rows: Vec<RowRecord>,
}

/// DML operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

impl DmlKind {
    /// Lowercase keyword for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            DmlKind::Insert => "insert",
            DmlKind::Update => "update",
            DmlKind::Delete => "delete",
        }
    }
}

/// One row-level edit produced by the differ.
///
/// The match row for an Update carries the entire previously observed
/// destination row, not just its key: the generated WHERE clause matches
/// every column, so a concurrent destination write turns the statement into
/// a silent no-op instead of clobbering the newer value.
#[derive(Debug, Clone)]
pub struct DmlOp {
    pub table_id: usize,
    pub kind: DmlKind,

    /// New values (Insert and Update).
    pub new_row: Option<RowRecord>,

    /// Previously observed destination row (Update and Delete).
    pub match_row: Option<RowRecord>,
}

impl DmlOp {
    pub fn insert(table_id: usize, row: RowRecord) -> Self {
        Self {
            table_id,
            kind: DmlKind::Insert,
            new_row: Some(row),
            match_row: None,
        }
    }

    pub fn update(table_id: usize, new_row: RowRecord, match_row: RowRecord) -> Self {
        Self {
            table_id,
            kind: DmlKind::Update,
            new_row: Some(new_row),
            match_row: Some(match_row),
        }
    }

    pub fn delete(table_id: usize, match_row: RowRecord) -> Self {
        Self {
            table_id,
            kind: DmlKind::Delete,
            new_row: None,
            match_row: Some(match_row),
        }
    }
}

/// One chunk's worth of edits, in merge order.
#[derive(Debug)]
pub struct ChunkOps {
    pub table_id: usize,
    pub ops: Vec<DmlOp>,
}

/// A positional parameter bound to an executable statement.
///
/// NULLs are never bound; the generator inlines the `NULL` / `IS NULL`
/// keyword instead, so the parameter list only carries concrete values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementParam {
    /// Character or numeric value in textual form.
    Text(String),

    /// Binary column value bound as a byte sequence.
    Bytes(Vec<u8>),
}

/// A rendered, dialect-specific statement ready for the writer.
#[derive(Debug)]
pub struct ExecutableStatement {
    pub table_id: usize,
    pub kind: DmlKind,
    pub sql: String,
    pub params: Vec<StatementParam>,

    /// Number of rows this statement affects (greater than one for batched
    /// multi-row inserts).
    pub rows: u64,
}
